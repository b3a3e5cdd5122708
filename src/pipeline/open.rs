//! Upload session initiator.
//!
//! Builds the structural encoding and opens the remote session. A failure
//! here is never retried.

use crate::client::UploadService;
use crate::document::Document;
use crate::error::UploadError;
use crate::session::UploadSession;
use crate::structure::{build_structure, UploadType};
use tracing::info;

/// Open a remote upload session for `doc` in `collection_id`.
pub async fn open_session(
    service: &dyn UploadService,
    doc: &Document,
    collection_id: i64,
    upload_type: UploadType,
) -> Result<UploadSession, UploadError> {
    let structure = build_structure(doc, upload_type)?;
    let session = service.open_upload_session(collection_id, &structure).await?;
    info!(
        upload_id = session.upload_id,
        collection_id,
        "Opened {} upload session for {} pages",
        upload_type,
        doc.page_count()
    );
    Ok(session)
}
