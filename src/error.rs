//! Error types for the pageput library.
//!
//! Two types cover two different questions:
//!
//! * [`UploadError`]: *what* went wrong. Every fatal condition has a
//!   variant: bad configuration, checksum I/O, page resource resolution,
//!   transport and API failures, and user cancellation.
//!
//! * [`UploadFailure`]: *how far* the run got. It wraps the terminal
//!   [`UploadError`] together with the last [`UploadSession`] the pipeline
//!   observed, so callers can inspect partial progress (which pages the
//!   server already accepted) even when the run did not finish.
//!
//! Cancellation is an error variant but not a failure in the user-facing
//! sense: check [`UploadError::is_cancelled`] before showing an error dialog.

use crate::session::UploadSession;
use crate::structure::UploadType;
use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the pageput library.
#[derive(Debug, Error)]
pub enum UploadError {
    // ── Configuration errors ──────────────────────────────────────────────
    /// No upload service (server connection) was supplied to the builder.
    #[error("No upload service configured.\nProvide a connection with UploadConfig::builder().service(..).")]
    MissingService,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The selected structural encoding is declared but not implemented.
    #[error("Upload type {upload_type} is not implemented")]
    UnsupportedUploadType { upload_type: UploadType },

    /// The document has no pages; there is nothing to upload.
    #[error("Document at '{folder}' has no pages")]
    EmptyDocument { folder: PathBuf },

    // ── Local resource errors ─────────────────────────────────────────────
    /// Reading page content for the checksum stage failed.
    #[error("Checksum computation failed for page {page} ('{path}'): {source}")]
    ChecksumFailed {
        page: u32,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A page references a local file that does not exist.
    #[error("Page {page}: file not found: '{path}'")]
    ResourceNotFound { page: u32, path: PathBuf },

    /// A page references a local file the process cannot read.
    #[error("Page {page}: permission denied reading '{path}'")]
    PermissionDenied { page: u32, path: PathBuf },

    /// A page references a resource that cannot be turned into a local file.
    #[error("Page {page}: resource '{resource}' is unavailable: {reason}")]
    ResourceUnavailable {
        page: u32,
        resource: String,
        reason: String,
    },

    /// Building the METS or JSON structure for the session failed.
    #[error("Failed to encode document structure: {0}")]
    StructureEncoding(String),

    // ── Remote errors ─────────────────────────────────────────────────────
    /// The HTTP request could not be sent or its response could not be read.
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The ingestion service answered with a non-success status code.
    #[error("Upload service returned HTTP {status}: {body}")]
    Api { status: u16, body: String },

    /// The ingestion service answered 2xx but the body was not understood.
    #[error("Invalid response from upload service: {0}")]
    InvalidResponse(String),

    /// Every attempt to upload one page failed; `source` is the last attempt's error.
    #[error("Page {page}: upload failed after {attempts} attempts: {source}")]
    PageUploadFailed {
        page: u32,
        attempts: u32,
        #[source]
        source: Box<UploadError>,
    },

    // ── Cancellation ──────────────────────────────────────────────────────
    /// The caller cancelled the run. Not an error from the user's point of view.
    #[error("Upload canceled")]
    Cancelled,

    // ── I/O errors ────────────────────────────────────────────────────────
    /// A local file operation outside the checksum stage failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The recovery snapshot could not be encoded or decoded.
    #[error("Recovery snapshot error: {0}")]
    Snapshot(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl UploadError {
    /// `true` when the run stopped because the caller asked it to.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, UploadError::Cancelled)
    }

    /// `true` for errors raised before any remote call could have been made.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            UploadError::MissingService
                | UploadError::InvalidConfig(_)
                | UploadError::UnsupportedUploadType { .. }
                | UploadError::EmptyDocument { .. }
        )
    }
}

/// Terminal result of a failed or cancelled pipeline run.
///
/// `last_session` is `None` when the run stopped before the upload session
/// was opened (configuration, checksum, or session-open failures).
#[derive(Debug, Error)]
#[error("{error}")]
pub struct UploadFailure {
    #[source]
    pub error: UploadError,
    pub last_session: Option<UploadSession>,
}

impl UploadFailure {
    pub fn new(error: UploadError, last_session: Option<UploadSession>) -> Self {
        Self {
            error,
            last_session,
        }
    }

    /// Shorthand for `self.error.is_cancelled()`.
    pub fn is_cancelled(&self) -> bool {
        self.error.is_cancelled()
    }
}

impl From<UploadError> for UploadFailure {
    fn from(error: UploadError) -> Self {
        Self::new(error, None)
    }
}
