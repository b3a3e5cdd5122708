//! Configuration for a document upload run.
//!
//! Everything the pipeline needs besides the document itself lives in
//! [`UploadConfig`], built via [`UploadConfigBuilder`]. The builder checks
//! the inputs that are fatal when wrong, most importantly the service
//! connection, so a bad configuration fails at construction instead of
//! halfway through a long upload.

use crate::client::UploadService;
use crate::error::UploadError;
use crate::progress::ProgressCallback;
use crate::retry::RetryPolicy;
use crate::structure::UploadType;
use std::fmt;
use std::sync::Arc;

/// Default name of the recovery snapshot written into the staging folder.
pub const UPLOAD_XML_NAME: &str = "upload.xml";

/// Configuration for one document upload.
///
/// # Example
/// ```rust,no_run
/// use pageput::{HttpUploadService, UploadConfig, UploadType};
/// use std::sync::Arc;
///
/// let service = HttpUploadService::new("https://ingest.example.org/api", 120).unwrap();
/// let config = UploadConfig::builder()
///     .service(Arc::new(service))
///     .collection_id(42)
///     .upload_type(UploadType::Json)
///     .compute_checksums(true)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct UploadConfig {
    /// Remote ingestion service. Required.
    pub service: Arc<dyn UploadService>,

    /// Target collection on the server. Must be positive.
    pub collection_id: i64,

    /// Structural encoding sent when the session is opened. Default: METS.
    pub upload_type: UploadType,

    /// Compute MD5 checksums for all pages before uploading. Default: false.
    ///
    /// Checksums are a precondition when enabled: a read error aborts the
    /// run before any network call.
    pub compute_checksums: bool,

    /// Per-page retry policy. Default: 3 immediate retries.
    pub retry: RetryPolicy,

    /// File name of the recovery snapshot. Default: `upload.xml`.
    pub snapshot_file_name: String,

    /// Timeout for downloading `http(s)://` page resources, in seconds. Default: 120.
    pub download_timeout_secs: u64,

    /// Receives status and percent events. Default: none.
    pub progress_callback: Option<ProgressCallback>,
}

impl fmt::Debug for UploadConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadConfig")
            .field("service", &"<dyn UploadService>")
            .field("collection_id", &self.collection_id)
            .field("upload_type", &self.upload_type)
            .field("compute_checksums", &self.compute_checksums)
            .field("retry", &self.retry)
            .field("snapshot_file_name", &self.snapshot_file_name)
            .field("download_timeout_secs", &self.download_timeout_secs)
            .field(
                "progress_callback",
                &self.progress_callback.as_ref().map(|_| "<dyn UploadProgressCallback>"),
            )
            .finish()
    }
}

impl UploadConfig {
    /// Create a new builder for `UploadConfig`.
    pub fn builder() -> UploadConfigBuilder {
        UploadConfigBuilder::default()
    }
}

/// Builder for [`UploadConfig`].
pub struct UploadConfigBuilder {
    service: Option<Arc<dyn UploadService>>,
    collection_id: Option<i64>,
    upload_type: UploadType,
    compute_checksums: bool,
    retry: RetryPolicy,
    snapshot_file_name: String,
    download_timeout_secs: u64,
    progress_callback: Option<ProgressCallback>,
}

impl Default for UploadConfigBuilder {
    fn default() -> Self {
        Self {
            service: None,
            collection_id: None,
            upload_type: UploadType::default(),
            compute_checksums: false,
            retry: RetryPolicy::default(),
            snapshot_file_name: UPLOAD_XML_NAME.to_string(),
            download_timeout_secs: 120,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for UploadConfigBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UploadConfigBuilder")
            .field("service", &self.service.as_ref().map(|_| "<dyn UploadService>"))
            .field("collection_id", &self.collection_id)
            .field("upload_type", &self.upload_type)
            .field("compute_checksums", &self.compute_checksums)
            .finish_non_exhaustive()
    }
}

impl UploadConfigBuilder {
    pub fn service(mut self, service: Arc<dyn UploadService>) -> Self {
        self.service = Some(service);
        self
    }

    pub fn collection_id(mut self, id: i64) -> Self {
        self.collection_id = Some(id);
        self
    }

    pub fn upload_type(mut self, upload_type: UploadType) -> Self {
        self.upload_type = upload_type;
        self
    }

    pub fn compute_checksums(mut self, v: bool) -> Self {
        self.compute_checksums = v;
        self
    }

    pub fn retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.retry.max_retries = n;
        self
    }

    pub fn snapshot_file_name(mut self, name: impl Into<String>) -> Self {
        self.snapshot_file_name = name.into();
        self
    }

    pub fn download_timeout_secs(mut self, secs: u64) -> Self {
        self.download_timeout_secs = secs;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<UploadConfig, UploadError> {
        let service = self.service.ok_or(UploadError::MissingService)?;

        let collection_id = self
            .collection_id
            .ok_or_else(|| UploadError::InvalidConfig("collection id is required".into()))?;
        if collection_id <= 0 {
            return Err(UploadError::InvalidConfig(format!(
                "collection id must be positive, got {collection_id}"
            )));
        }

        let name = self.snapshot_file_name.trim();
        if name.is_empty() || name.contains(['/', '\\']) {
            return Err(UploadError::InvalidConfig(format!(
                "snapshot file name must be a plain file name, got {:?}",
                self.snapshot_file_name
            )));
        }

        Ok(UploadConfig {
            service,
            collection_id,
            upload_type: self.upload_type,
            compute_checksums: self.compute_checksums,
            retry: self.retry,
            snapshot_file_name: name.to_string(),
            download_timeout_secs: self.download_timeout_secs,
            progress_callback: self.progress_callback,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::PageFiles;
    use crate::session::UploadSession;
    use crate::structure::StructureDescriptor;
    use async_trait::async_trait;

    struct NullService;

    #[async_trait]
    impl UploadService for NullService {
        async fn open_upload_session(
            &self,
            _collection_id: i64,
            _structure: &StructureDescriptor,
        ) -> Result<UploadSession, UploadError> {
            Ok(UploadSession::new(1))
        }

        async fn put_page(&self, upload_id: i64, _page: &PageFiles) -> Result<UploadSession, UploadError> {
            Ok(UploadSession::new(upload_id))
        }

        async fn get_upload_status(&self, upload_id: i64) -> Result<UploadSession, UploadError> {
            Ok(UploadSession::new(upload_id))
        }
    }

    #[test]
    fn missing_service_is_fatal() {
        let err = UploadConfig::builder().collection_id(1).build().unwrap_err();
        assert!(matches!(err, UploadError::MissingService));
    }

    #[test]
    fn collection_id_is_required_and_positive() {
        let err = UploadConfig::builder()
            .service(Arc::new(NullService))
            .build()
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidConfig(_)));

        let err = UploadConfig::builder()
            .service(Arc::new(NullService))
            .collection_id(0)
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("positive"), "got: {err}");
    }

    #[test]
    fn defaults() {
        let c = UploadConfig::builder()
            .service(Arc::new(NullService))
            .collection_id(7)
            .build()
            .expect("valid config");
        assert_eq!(c.upload_type, UploadType::Mets);
        assert!(!c.compute_checksums);
        assert_eq!(c.retry.max_attempts(), 4);
        assert_eq!(c.snapshot_file_name, UPLOAD_XML_NAME);
        assert!(c.progress_callback.is_none());
        assert!(format!("{c:?}").contains("collection_id: 7"));
    }

    #[test]
    fn snapshot_name_must_be_plain() {
        let err = UploadConfig::builder()
            .service(Arc::new(NullService))
            .collection_id(7)
            .snapshot_file_name("../upload.xml")
            .build()
            .unwrap_err();
        assert!(matches!(err, UploadError::InvalidConfig(_)));
    }
}
