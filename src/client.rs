//! Remote ingestion service interface and its HTTP implementation.
//!
//! The pipeline talks to the server only through [`UploadService`], which
//! keeps it testable with in-memory fakes and lets hosts plug in their own
//! transport (an authenticated connection, a proxy, a recording client).
//!
//! [`HttpUploadService`] is the reqwest-backed implementation:
//!
//! | Operation | Request |
//! |-----------|---------|
//! | open session | `POST {base}/uploads?collId={id}` with METS XML or JSON descriptor |
//! | put page | `PUT {base}/uploads/{uploadId}` multipart: `img` + optional `xml` |
//! | status | `GET {base}/uploads/{uploadId}` |
//!
//! Every response body is a JSON [`UploadSession`].
//!
//! Page PUTs are not guaranteed to be idempotent on the server side. A retry
//! after a request that actually succeeded may submit the page twice.

use crate::error::UploadError;
use crate::session::UploadSession;
use crate::structure::{mime_type_for, StructureDescriptor};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// Default request timeout in seconds. Page images can be large.
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

/// Local files for one page, ready to be sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageFiles {
    pub page_nr: u32,
    pub image: PathBuf,
    pub image_name: String,
    pub transcript: Option<PathBuf>,
    pub transcript_name: Option<String>,
}

/// Operations of the remote ingestion service.
#[async_trait]
pub trait UploadService: Send + Sync {
    /// Open a new upload session in `collection_id` for the given structure.
    async fn open_upload_session(
        &self,
        collection_id: i64,
        structure: &StructureDescriptor,
    ) -> Result<UploadSession, UploadError>;

    /// Upload one page's image and optional transcript to an open session.
    async fn put_page(&self, upload_id: i64, page: &PageFiles) -> Result<UploadSession, UploadError>;

    /// Current server-side state of an upload, e.g. to poll for the ingest job id.
    async fn get_upload_status(&self, upload_id: i64) -> Result<UploadSession, UploadError>;
}

/// reqwest-backed [`UploadService`].
#[derive(Debug, Clone)]
pub struct HttpUploadService {
    client: Client,
    base_url: String,
    bearer_token: Option<String>,
}

impl HttpUploadService {
    /// Create a service for `base_url` with the given request timeout.
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self, UploadError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()?;
        Ok(Self::with_client(client, base_url))
    }

    /// Use a pre-configured client (proxy, cookies, custom TLS).
    pub fn with_client(client: Client, base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            bearer_token: None,
        }
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn with_bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn uploads_url(&self) -> String {
        format!("{}/uploads", self.base_url)
    }

    fn upload_url(&self, upload_id: i64) -> String {
        format!("{}/uploads/{}", self.base_url, upload_id)
    }

    fn authorize(&self, req: RequestBuilder) -> RequestBuilder {
        match self.bearer_token {
            Some(ref token) => req.bearer_auth(token),
            None => req,
        }
    }
}

#[async_trait]
impl UploadService for HttpUploadService {
    async fn open_upload_session(
        &self,
        collection_id: i64,
        structure: &StructureDescriptor,
    ) -> Result<UploadSession, UploadError> {
        let req = self
            .client
            .post(self.uploads_url())
            .query(&[("collId", collection_id)]);

        let req = match structure {
            StructureDescriptor::Mets(xml) => req
                .header(reqwest::header::CONTENT_TYPE, "application/xml")
                .body(xml.clone()),
            StructureDescriptor::Json(descriptor) => req.json(descriptor),
        };

        debug!(
            "Opening {} upload session in collection {}",
            structure.upload_type(),
            collection_id
        );
        let response = self.authorize(req).send().await?;
        parse_session(response).await
    }

    async fn put_page(&self, upload_id: i64, page: &PageFiles) -> Result<UploadSession, UploadError> {
        let mut form = Form::new().part("img", file_part(&page.image, &page.image_name).await?);
        if let Some(ref xml) = page.transcript {
            let name = page
                .transcript_name
                .clone()
                .unwrap_or_else(|| format!("{}.xml", page.page_nr));
            form = form.part("xml", file_part(xml, &name).await?);
        }

        debug!("PUT page {} to upload {}", page.page_nr, upload_id);
        let req = self.client.put(self.upload_url(upload_id)).multipart(form);
        let response = self.authorize(req).send().await?;
        parse_session(response).await
    }

    async fn get_upload_status(&self, upload_id: i64) -> Result<UploadSession, UploadError> {
        let req = self.client.get(self.upload_url(upload_id));
        let response = self.authorize(req).send().await?;
        parse_session(response).await
    }
}

/// Read a file into a multipart part. The bytes are dropped with the form.
async fn file_part(path: &Path, name: &str) -> Result<Part, UploadError> {
    let bytes = tokio::fs::read(path).await.map_err(|e| UploadError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;
    Ok(Part::bytes(bytes)
        .file_name(name.to_string())
        .mime_str(mime_type_for(name))?)
}

/// Map a response to an [`UploadSession`] or an API error.
async fn parse_session(response: Response) -> Result<UploadSession, UploadError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(UploadError::Api {
            status: status.as_u16(),
            body,
        });
    }

    serde_json::from_str(&body).map_err(|e| UploadError::InvalidResponse(format!("{e}: {body}")))
}
