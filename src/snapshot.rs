//! Recovery snapshot: the last known upload state, saved next to the document.
//!
//! When a run fails or is cancelled after the session was opened, the
//! pipeline writes the last [`UploadSession`] it saw to
//! `<staging folder>/upload.xml`. A person (or a future resume tool) can
//! read it to see which upload id was used and which pages the server
//! already confirmed. The pipeline never reads it back on its own.
//!
//! Writing is best-effort: [`store_snapshot`] logs and swallows its own
//! errors so the error that triggered it is the one the caller sees.

use crate::config::UPLOAD_XML_NAME;
use crate::error::UploadError;
use crate::session::UploadSession;
use std::path::{Path, PathBuf};
use tracing::{error, info};

const ROOT_ELEMENT: &str = "trpUpload";
const XML_DECL: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#;

/// Serialise a session as snapshot XML.
pub fn to_xml(session: &UploadSession) -> Result<String, UploadError> {
    let body = quick_xml::se::to_string_with_root(ROOT_ELEMENT, session)
        .map_err(|e| UploadError::Snapshot(e.to_string()))?;
    Ok(format!("{XML_DECL}\n{body}\n"))
}

/// Parse snapshot XML.
pub fn from_xml(xml: &str) -> Result<UploadSession, UploadError> {
    quick_xml::de::from_str(xml).map_err(|e| UploadError::Snapshot(e.to_string()))
}

/// Write the snapshot, replacing any earlier one.
///
/// Uses write-to-temp + rename so a crash never leaves a half-written file.
pub async fn write_snapshot(
    session: &UploadSession,
    folder: &Path,
    file_name: &str,
) -> Result<PathBuf, UploadError> {
    let xml = to_xml(session)?;
    let path = folder.join(file_name);
    let tmp_path = folder.join(format!(".{file_name}.tmp"));

    tokio::fs::write(&tmp_path, xml.as_bytes())
        .await
        .map_err(|e| UploadError::Io {
            path: tmp_path.clone(),
            source: e,
        })?;

    if let Err(e) = tokio::fs::rename(&tmp_path, &path).await {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(UploadError::Io { path, source: e });
    }

    Ok(path)
}

/// Best-effort snapshot write used by the pipeline's failure path.
///
/// No-op when `session` is `None` (the run stopped before a session
/// existed). Returns the written path, or `None` if nothing was written.
pub async fn store_snapshot(
    session: Option<&UploadSession>,
    folder: &Path,
    file_name: &str,
) -> Option<PathBuf> {
    let session = session?;
    match write_snapshot(session, folder, file_name).await {
        Ok(path) => {
            info!(upload_id = session.upload_id, "Stored recovery snapshot at {}", path.display());
            Some(path)
        }
        Err(e) => {
            error!("Could not store {}: {}", file_name, e);
            None
        }
    }
}

/// Read the snapshot from `folder` (default file name), for manual inspection.
pub async fn read_snapshot(folder: &Path) -> Result<UploadSession, UploadError> {
    read_snapshot_named(folder, UPLOAD_XML_NAME).await
}

/// Read a snapshot with a custom file name.
pub async fn read_snapshot_named(folder: &Path, file_name: &str) -> Result<UploadSession, UploadError> {
    let path = folder.join(file_name);
    let xml = tokio::fs::read_to_string(&path)
        .await
        .map_err(|e| UploadError::Io { path, source: e })?;
    from_xml(&xml)
}
