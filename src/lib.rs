//! # pageput
//!
//! Upload a locally staged multi-page document (page images plus optional
//! transcription files) to a remote ingestion service, one page per request.
//!
//! ## Why page by page?
//!
//! Scanned documents run to hundreds of large images. Sending them in one
//! multipart request means one network blip loses the whole upload. Sending
//! one request per page lets a failed page be retried on its own, reports
//! real progress, and leaves a recoverable record of how far the upload got.
//!
//! ## Pipeline Overview
//!
//! ```text
//! Document (staging folder)
//!  │
//!  ├─ 1. Check     page count > 0, structural type implemented
//!  ├─ 2. Checksum  optional MD5 of every image and current transcript
//!  ├─ 3. Open      POST structure (METS or JSON) → upload session
//!  ├─ 4. Pages     PUT image (+ transcript) per page, retry, progress
//!  └─ 5. Result    final session with ingest job id
//!                  └─ on failure/cancel: upload.xml snapshot in staging folder
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use pageput::{upload_document, Document, HttpUploadService, UploadConfig};
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = HttpUploadService::new("https://ingest.example.org/api", 300)?
//!         .with_bearer_token("secret");
//!     let config = UploadConfig::builder()
//!         .service(Arc::new(service))
//!         .collection_id(42)
//!         .compute_checksums(true)
//!         .build()?;
//!
//!     let json = std::fs::read_to_string("staging/letters/document.json")?;
//!     let document: Document = serde_json::from_str(&json)?;
//!
//!     match upload_document(document, &config, CancellationToken::new()).await {
//!         Ok(session) => println!("job id: {:?}", session.job_id),
//!         Err(f) if f.is_cancelled() => println!("canceled"),
//!         Err(f) => eprintln!("failed: {f}"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `pageput` binary (clap + anyhow + tracing-subscriber + indicatif) |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod checksum;
pub mod client;
pub mod config;
pub mod document;
pub mod error;
pub mod pipeline;
pub mod progress;
pub mod retry;
pub mod session;
pub mod snapshot;
pub mod structure;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use client::{HttpUploadService, PageFiles, UploadService};
pub use config::{UploadConfig, UploadConfigBuilder, UPLOAD_XML_NAME};
pub use document::{Document, DocumentMetadata, Page, Resource, Transcript};
pub use error::{UploadError, UploadFailure};
pub use progress::{NoopProgressCallback, ProgressCallback, UploadProgressCallback};
pub use retry::{Backoff, RetryPolicy, NR_OF_RETRIES_ON_FAIL};
pub use session::{PageUploadState, UploadSession};
pub use structure::{StructureDescriptor, UploadType};
pub use upload::{spawn_upload, upload_document, upload_document_blocking, UploadHandle};
