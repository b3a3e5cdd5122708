//! Server-side upload record as seen by the client.
//!
//! The ingestion service returns an [`UploadSession`] from every call: when
//! the session is opened, after every accepted page, and from status polls.
//! The pipeline keeps only the most recent one; it is also what the
//! recovery snapshot persists.

use serde::{Deserialize, Serialize};

/// Upload state of a single page as tracked by the server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageUploadState {
    pub page_nr: u32,
    pub file_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_xml_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub img_checksum: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_xml_checksum: Option<String>,
    #[serde(default)]
    pub page_uploaded: bool,
}

/// Wrapper so the page list serialises as `<pageList><pages>..</pages></pageList>`
/// in XML and `{"pageList": {"pages": [..]}}` in JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageList {
    #[serde(default)]
    pub pages: Vec<PageUploadState>,
}

/// An in-progress (or finished) document upload on the remote service.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub upload_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub col_id: Option<i64>,
    /// Ingest job id; assigned by the server once all pages are in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub job_id: Option<String>,
    #[serde(default)]
    pub upload_complete: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nr_of_pages_total: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finished: Option<String>,
    #[serde(default)]
    pub page_list: PageList,
}

impl UploadSession {
    pub fn new(upload_id: i64) -> Self {
        Self {
            upload_id,
            ..Default::default()
        }
    }

    pub fn pages(&self) -> &[PageUploadState] {
        &self.page_list.pages
    }

    /// Number of pages the server has confirmed.
    pub fn pages_uploaded(&self) -> usize {
        self.page_list.pages.iter().filter(|p| p.page_uploaded).count()
    }

    /// `true` once the server has attached an ingest job id.
    pub fn has_job(&self) -> bool {
        self.job_id.as_deref().is_some_and(|j| !j.is_empty())
    }
}
