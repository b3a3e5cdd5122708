//! Top-level entry points: run one document upload from start to finish.
//!
//! A run has four phases:
//!
//! ```text
//! 1. preconditions  page count, structural type     (no I/O)
//! 2. checksums      optional MD5 pass               (local I/O only)
//! 3. open session   one request, never retried
//! 4. page loop      one PUT per page, retried, cancellable
//! ```
//!
//! Any failure after phase 1 writes a recovery snapshot of the last known
//! session (a no-op if the session was never opened) before the error is
//! returned. The snapshot write never changes the error the caller sees.

use crate::checksum;
use crate::config::UploadConfig;
use crate::document::Document;
use crate::error::{UploadError, UploadFailure};
use crate::pipeline::{open, pages};
use crate::progress::ProgressExt;
use crate::session::UploadSession;
use crate::snapshot;
use crate::structure::UploadType;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

/// Upload `document` with `config`.
///
/// `cancel` is polled before the session is opened and before each page.
/// An in-flight request is never interrupted.
///
/// # Returns
/// `Ok(UploadSession)`: the server's final view of the upload, carrying
/// the ingest job id once assigned.
///
/// # Errors
/// `Err(UploadFailure)` with the terminal [`UploadError`] and the last
/// session observed. Check [`UploadFailure::is_cancelled`] to tell a user
/// cancellation from a real failure.
pub async fn upload_document(
    document: Document,
    config: &UploadConfig,
    cancel: CancellationToken,
) -> Result<UploadSession, UploadFailure> {
    let folder = document.local_folder.clone();

    match run(document, config, cancel).await {
        Ok(session) => Ok(session),
        Err(failure) => {
            if failure.is_cancelled() {
                info!("Upload canceled: {}", folder.display());
            } else {
                error!("Upload failed! {}", failure.error);
            }

            if !failure.error.is_configuration() {
                snapshot::store_snapshot(failure.last_session.as_ref(), &folder, &config.snapshot_file_name)
                    .await;
            }
            Err(failure)
        }
    }
}

/// Check everything that can be checked without touching disk or network.
pub fn check_preconditions(document: &Document, config: &UploadConfig) -> Result<(), UploadError> {
    if document.page_count() == 0 {
        return Err(UploadError::EmptyDocument {
            folder: document.local_folder.clone(),
        });
    }
    if config.upload_type == UploadType::NoStructure {
        return Err(UploadError::UnsupportedUploadType {
            upload_type: config.upload_type,
        });
    }
    Ok(())
}

async fn run(
    document: Document,
    config: &UploadConfig,
    cancel: CancellationToken,
) -> Result<UploadSession, UploadFailure> {
    // ── Phase 1: preconditions ───────────────────────────────────────────
    check_preconditions(&document, config)?;

    let progress = &config.progress_callback;
    if let Some(cb) = progress {
        cb.begin_task(
            &format!("Uploading document at {}", document.local_folder.display()),
            100,
        );
    }

    // ── Phase 2: checksums ───────────────────────────────────────────────
    let document = if config.compute_checksums {
        checksum::compute_checksums(document, progress).await?
    } else {
        document
    };

    // ── Phase 3: open session ────────────────────────────────────────────
    if cancel.is_cancelled() {
        return Err(UploadError::Cancelled.into());
    }
    progress.status("Initiating upload...");
    let session = open::open_session(
        config.service.as_ref(),
        &document,
        config.collection_id,
        config.upload_type,
    )
    .await?;

    // ── Phase 4: pages ───────────────────────────────────────────────────
    progress.status(&format!("Uploading {} pages...", document.page_count()));
    let ctx = pages::PageLoopContext {
        service: config.service.as_ref(),
        retry: &config.retry,
        progress,
        cancel,
        download_timeout_secs: config.download_timeout_secs,
    };
    let session = pages::upload_pages(&document, session, ctx).await?;

    // The last PUT's response carries the job id.
    info!(
        upload_id = session.upload_id,
        "Ingest-job ID = {}",
        session.job_id.as_deref().unwrap_or("<none>")
    );
    progress.status("Upload done.");
    Ok(session)
}

/// A document upload running on a background task.
#[derive(Debug)]
pub struct UploadHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<UploadSession, UploadFailure>>,
}

impl UploadHandle {
    /// Ask the upload to stop at the next page boundary.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// A token that cancels this upload, e.g. for a signal handler.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Wait for the upload to finish.
    pub async fn join(self) -> Result<UploadSession, UploadFailure> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(UploadError::Internal(format!("upload task failed: {e}")).into()),
        }
    }
}

/// Run [`upload_document`] on a new tokio task.
///
/// The caller's task stays free to drive UI and to call
/// [`UploadHandle::cancel`]. Must be called from within a tokio runtime.
pub fn spawn_upload(document: Document, config: UploadConfig) -> UploadHandle {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let task = tokio::spawn(async move { upload_document(document, &config, token).await });
    UploadHandle { cancel, task }
}

/// Synchronous wrapper around [`upload_document`].
///
/// Creates a temporary tokio runtime internally; the run cannot be cancelled.
pub fn upload_document_blocking(
    document: Document,
    config: &UploadConfig,
) -> Result<UploadSession, UploadFailure> {
    tokio::runtime::Runtime::new()
        .map_err(|e| UploadError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(upload_document(document, config, CancellationToken::new()))
}
