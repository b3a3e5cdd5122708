//! Pipeline stages for a document upload.
//!
//! Each submodule implements one step of the run driven by
//! [`crate::upload::upload_document`].
//!
//! ## Data Flow
//!
//! ```text
//! checksum ──▶ open ──▶ pages ──┬──▶ UploadSession (job id)
//!  (opt.)     (session)  (PUT×N) └──▶ snapshot on failure/cancel
//! ```
//!
//! 1. [`crate::checksum`]: optional MD5 pass over all page files
//! 2. [`open`]: build the structural encoding and open the remote session;
//!    never retried
//! 3. [`pages`]: sequential per-page PUT with retry, progress, and
//!    cooperative cancellation
//! 4. [`resolve`]: turn each page's resources into local files for the
//!    transport; used by `pages`

pub mod open;
pub mod pages;
pub mod resolve;
