//! Page upload loop: the long-running, network-bound heart of a run.
//!
//! Pages go up strictly one at a time in page-number order; the server
//! builds its ingest job from arrival order. For each page:
//!
//! 1. check the cancellation token (the only place it is checked);
//! 2. resolve image and transcript to local files;
//! 3. PUT the page, retrying per [`RetryPolicy`];
//! 4. replace the running session with the server's response;
//! 5. push `floor(100 / N * page_nr)` percent.
//!
//! The percent uses the *declared* page number, not the loop index, so
//! documents with gaps in their numbering report uneven progress.

use crate::client::UploadService;
use crate::document::Document;
use crate::error::{UploadError, UploadFailure};
use crate::pipeline::resolve::resolve_page;
use crate::progress::{ProgressCallback, ProgressExt};
use crate::retry::RetryPolicy;
use crate::session::UploadSession;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// Everything the loop needs besides the document and the session.
pub struct PageLoopContext<'a> {
    pub service: &'a dyn UploadService,
    pub retry: &'a RetryPolicy,
    pub progress: &'a Option<ProgressCallback>,
    pub cancel: CancellationToken,
    pub download_timeout_secs: u64,
}

/// Percent reported after the page with declared number `page_nr`:
/// `floor(100 / page_count * page_nr)`, computed exactly in integers.
pub fn page_percent(page_nr: u32, page_count: usize) -> u32 {
    let count = (page_count as u64).max(1);
    u32::try_from(u64::from(page_nr) * 100 / count).unwrap_or(u32::MAX)
}

/// Upload all pages of `doc` into the open `session`.
///
/// On success returns the last session the server sent back, which carries
/// the ingest job id once the server assigned one. On failure the returned
/// [`UploadFailure`] holds the session as of the last accepted page.
pub async fn upload_pages(
    doc: &Document,
    mut session: UploadSession,
    ctx: PageLoopContext<'_>,
) -> Result<UploadSession, UploadFailure> {
    let total = doc.page_count();
    if total == 0 {
        return Err(UploadFailure::new(
            UploadError::EmptyDocument {
                folder: doc.local_folder.clone(),
            },
            Some(session),
        ));
    }

    let upload_id = session.upload_id;

    for page in doc.pages() {
        if ctx.cancel.is_cancelled() {
            info!(upload_id, "Upload canceled before page {}", page.page_nr);
            return Err(UploadFailure::new(UploadError::Cancelled, Some(session)));
        }

        let resolved = match resolve_page(page, ctx.download_timeout_secs).await {
            Ok(r) => r,
            Err(e) => return Err(UploadFailure::new(e, Some(session))),
        };

        let label = format!("Page {}", page.page_nr);
        let files = &resolved.files;
        let service = ctx.service;
        match ctx.retry.run(&label, |_| service.put_page(upload_id, files)).await {
            Ok((updated, attempts)) => {
                debug!(upload_id, page = page.page_nr, attempts, "Page accepted");
                session = updated;
            }
            Err(exhausted) => {
                error!(
                    upload_id,
                    page = page.page_nr,
                    "Could not upload image '{}': {}",
                    files.image_name,
                    exhausted.last_error
                );
                let e = UploadError::PageUploadFailed {
                    page: page.page_nr,
                    attempts: exhausted.attempts,
                    source: Box::new(exhausted.last_error),
                };
                return Err(UploadFailure::new(e, Some(session)));
            }
        }
        drop(resolved);

        let percent = page_percent(page.page_nr, total);
        debug!("Page nr.: {} | percent = {}", page.page_nr, percent);
        ctx.progress.percent(percent);
        if let Some(cb) = ctx.progress {
            cb.on_page_uploaded(page.page_nr, total);
        }
    }

    Ok(session)
}
