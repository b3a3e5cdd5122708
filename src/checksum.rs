//! Checksum stage: MD5 sums for every page image and current transcript.
//!
//! Runs before any network call when enabled. Checksums are a precondition,
//! not a best-effort extra: the first read error aborts the whole run.
//! File reads are blocking, so each page is hashed on the blocking pool.

use crate::document::{Document, Resource};
use crate::error::UploadError;
use crate::progress::{ProgressCallback, ProgressExt};
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Hex MD5 digest of a file, streamed in 8 KiB chunks.
pub fn file_md5(path: impl AsRef<Path>) -> std::io::Result<String> {
    let mut file = std::fs::File::open(path.as_ref())?;
    let mut ctx = md5::Context::new();
    let mut buffer = [0u8; 8192];

    loop {
        let bytes_read = file.read(&mut buffer)?;
        if bytes_read == 0 {
            break;
        }
        ctx.consume(&buffer[..bytes_read]);
    }

    Ok(format!("{:x}", ctx.compute()))
}

/// Compute and attach checksums to every page of `doc`.
///
/// Pushes one status event and one percent event per page. Remote (http)
/// resources cannot be hashed locally and fail with
/// [`UploadError::ResourceUnavailable`].
pub async fn compute_checksums(
    mut doc: Document,
    progress: &Option<ProgressCallback>,
) -> Result<Document, UploadError> {
    let total = doc.page_count();
    progress.status("Computing checksums...");

    for (i, page) in doc.pages_mut().iter_mut().enumerate() {
        let page_nr = page.page_nr;
        let image = local_path(page_nr, &page.image)?;
        let transcript = page
            .current_transcript()
            .map(|t| local_path(page_nr, &t.resource))
            .transpose()?;

        let (img_sum, xml_sum) = tokio::task::spawn_blocking(move || hash_page(page_nr, image, transcript))
            .await
            .map_err(|e| UploadError::Internal(format!("checksum task failed: {e}")))??;

        debug!("Page {}: md5 {}", page_nr, img_sum);
        page.checksum = Some(img_sum);
        if let (Some(t), Some(sum)) = (page.current_transcript_mut(), xml_sum) {
            t.checksum = Some(sum);
        }

        progress.status(&format!("Computing checksums... {}/{}", i + 1, total));
        progress.percent(((i + 1) * 100 / total.max(1)) as u32);
    }

    Ok(doc)
}

fn hash_page(
    page_nr: u32,
    image: PathBuf,
    transcript: Option<PathBuf>,
) -> Result<(String, Option<String>), UploadError> {
    let hash = |path: PathBuf| {
        file_md5(&path).map_err(|source| UploadError::ChecksumFailed {
            page: page_nr,
            path,
            source,
        })
    };
    let img = hash(image)?;
    let xml = transcript.map(hash).transpose()?;
    Ok((img, xml))
}

fn local_path(page_nr: u32, resource: &Resource) -> Result<PathBuf, UploadError> {
    resource
        .local_path()
        .ok_or_else(|| UploadError::ResourceUnavailable {
            page: page_nr,
            resource: resource.to_string(),
            reason: "checksums can only be computed for local files".into(),
        })
}
