//! Resource resolution: turn a page's image and transcript into local files.
//!
//! The transport sends files from disk, so every resource must end up as a
//! readable local path. Local paths and `file://` URLs are checked in place;
//! `http(s)://` URLs are downloaded into a `TempDir` owned by the
//! [`ResolvedPage`]. Dropping the resolved page releases the download, so no
//! page's files outlive that page's upload.

use crate::client::PageFiles;
use crate::document::{Page, Resource};
use crate::error::UploadError;
use crate::structure::image_file_name;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info};

/// A page whose resources are available as local files.
#[derive(Debug)]
pub struct ResolvedPage {
    pub files: PageFiles,
    /// Keeps downloaded files alive until the page has been uploaded.
    _temp_dir: Option<TempDir>,
}

/// Check if the input string looks like an HTTP(S) URL.
pub fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

/// Resolve the image and current transcript of `page`.
///
/// A transcript that is present but cannot be located is an error; it is
/// never silently dropped from the upload.
pub async fn resolve_page(page: &Page, download_timeout_secs: u64) -> Result<ResolvedPage, UploadError> {
    let mut temp_dir = None;

    let image = resolve_resource(page.page_nr, "img", &page.image, &mut temp_dir, download_timeout_secs).await?;
    let image_name = image_file_name(page);

    let (transcript, transcript_name) = match page.current_transcript() {
        Some(t) => {
            let path = resolve_resource(page.page_nr, "xml", &t.resource, &mut temp_dir, download_timeout_secs).await?;
            let name = t
                .resource
                .file_name()
                .unwrap_or_else(|| format!("page_{:04}.xml", page.page_nr));
            (Some(path), Some(name))
        }
        None => (None, None),
    };

    Ok(ResolvedPage {
        files: PageFiles {
            page_nr: page.page_nr,
            image,
            image_name,
            transcript,
            transcript_name,
        },
        _temp_dir: temp_dir,
    })
}

/// `role` prefixes downloaded file names; image and transcript share one temp dir.
async fn resolve_resource(
    page_nr: u32,
    role: &str,
    resource: &Resource,
    temp_dir: &mut Option<TempDir>,
    timeout_secs: u64,
) -> Result<PathBuf, UploadError> {
    if let Some(path) = resource.local_path() {
        return resolve_local(page_nr, path).await;
    }

    match resource {
        Resource::Url(url) if is_remote(url) => {
            if temp_dir.is_none() {
                *temp_dir = Some(TempDir::new().map_err(|e| UploadError::Internal(e.to_string()))?);
            }
            let dir = match temp_dir.as_ref() {
                Some(d) => d.path().to_path_buf(),
                None => return Err(UploadError::Internal("temp dir missing".into())),
            };
            download(page_nr, url, &dir.join(role_file_name(role, url)), timeout_secs).await
        }
        other => Err(UploadError::ResourceUnavailable {
            page: page_nr,
            resource: other.to_string(),
            reason: "not a local path or an HTTP(S) URL".into(),
        }),
    }
}

/// Validate that a local file exists and is readable.
async fn resolve_local(page_nr: u32, path: PathBuf) -> Result<PathBuf, UploadError> {
    match tokio::fs::metadata(&path).await {
        Ok(meta) if meta.is_file() => {}
        _ => return Err(UploadError::ResourceNotFound { page: page_nr, path }),
    }

    match tokio::fs::File::open(&path).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(UploadError::PermissionDenied { page: page_nr, path });
        }
        Err(_) => {
            return Err(UploadError::ResourceNotFound { page: page_nr, path });
        }
    }

    debug!("Page {}: resolved local file {}", page_nr, path.display());
    Ok(path)
}

/// Name of a downloaded file inside the page's temp dir, e.g. `img_0001.jpg`.
fn role_file_name(role: &str, url: &str) -> String {
    let name = Resource::Url(url.to_string())
        .file_name()
        .unwrap_or_else(|| "download".to_string());
    format!("{role}_{name}")
}

/// Download a URL to `file_path`.
async fn download(page_nr: u32, url: &str, file_path: &Path, timeout_secs: u64) -> Result<PathBuf, UploadError> {
    info!("Page {}: downloading {}", page_nr, url);

    let unavailable = |reason: String| UploadError::ResourceUnavailable {
        page: page_nr,
        resource: url.to_string(),
        reason,
    };

    let client = reqwest::Client::builder()
        .timeout(std::time::Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| unavailable(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| unavailable(e.to_string()))?;

    if !response.status().is_success() {
        return Err(unavailable(format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| unavailable(e.to_string()))?;

    tokio::fs::write(file_path, &bytes)
        .await
        .map_err(|e| UploadError::Io {
            path: file_path.to_path_buf(),
            source: e,
        })?;

    debug!("Page {}: downloaded {} bytes to {}", page_nr, bytes.len(), file_path.display());
    Ok(file_path.to_path_buf())
}
