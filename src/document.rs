//! The locally staged document: pages, images, and transcripts.
//!
//! A [`Document`] is what the caller hands to the pipeline. Discovering and
//! loading documents from disk is the caller's job; this module only holds
//! the data and the few invariants the upload depends on:
//!
//! * pages are kept sorted by page number, which is also the upload order;
//! * at most one transcript per page is *current* and gets uploaded.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

/// Where a page image or transcript lives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Resource {
    /// A file on the local file system.
    Path(PathBuf),
    /// A `file://`, `http://`, or `https://` URL.
    Url(String),
}

impl Resource {
    /// Best-effort file name, used for multipart parts and structure descriptors.
    pub fn file_name(&self) -> Option<String> {
        match self {
            Resource::Path(p) => p.file_name().map(|n| n.to_string_lossy().into_owned()),
            Resource::Url(u) => {
                let path = u.split(['?', '#']).next().unwrap_or(u);
                path.rsplit('/')
                    .next()
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
            }
        }
    }

    /// Local path for `Path` resources and `file://` URLs.
    pub fn local_path(&self) -> Option<PathBuf> {
        match self {
            Resource::Path(p) => Some(p.clone()),
            Resource::Url(u) => reqwest::Url::parse(u)
                .ok()
                .filter(|url| url.scheme() == "file")
                .and_then(|url| url.to_file_path().ok()),
        }
    }

    /// Resolve a relative `Path` against `base`; URLs and absolute paths are unchanged.
    pub fn relative_to(self, base: &Path) -> Self {
        match self {
            Resource::Path(p) if p.is_relative() => Resource::Path(base.join(p)),
            other => other,
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Path(p) => write!(f, "{}", p.display()),
            Resource::Url(u) => f.write_str(u),
        }
    }
}

/// One version of a page's transcription (e.g. a PAGE XML file).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transcript {
    pub resource: Resource,
    /// Creation time in milliseconds since the epoch. The newest version is current.
    #[serde(default)]
    pub timestamp: Option<u64>,
    #[serde(default)]
    pub checksum: Option<String>,
}

impl Transcript {
    pub fn new(resource: Resource) -> Self {
        Self {
            resource,
            timestamp: None,
            checksum: None,
        }
    }
}

/// One page of a document, identified by its 1-based page number.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Page {
    pub page_nr: u32,
    pub image: Resource,
    #[serde(default)]
    pub transcripts: Vec<Transcript>,
    /// Image checksum, filled in by the checksum stage.
    #[serde(default)]
    pub checksum: Option<String>,
}

impl Page {
    pub fn new(page_nr: u32, image: Resource) -> Self {
        Self {
            page_nr,
            image,
            transcripts: Vec::new(),
            checksum: None,
        }
    }

    pub fn with_transcript(mut self, transcript: Transcript) -> Self {
        self.transcripts.push(transcript);
        self
    }

    /// The transcript that gets uploaded with this page.
    ///
    /// The one with the latest timestamp wins; among equal (or missing)
    /// timestamps the one added last wins.
    pub fn current_transcript(&self) -> Option<&Transcript> {
        self.current_index().map(|i| &self.transcripts[i])
    }

    pub(crate) fn current_transcript_mut(&mut self) -> Option<&mut Transcript> {
        let i = self.current_index()?;
        Some(&mut self.transcripts[i])
    }

    fn current_index(&self) -> Option<usize> {
        self.transcripts
            .iter()
            .enumerate()
            .max_by_key(|(i, t)| (t.timestamp.unwrap_or(0), *i))
            .map(|(i, _)| i)
    }
}

/// Document-level metadata sent along with the structure descriptor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMetadata {
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    /// Collections the document already belongs to.
    #[serde(default)]
    pub collection_ids: Vec<i64>,
}

/// A multi-page document staged in a local folder.
///
/// Pages are always held in page-number order, however the document was
/// built: [`Document::new`] and deserialisation both sort.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "RawDocument")]
pub struct Document {
    /// Staging directory; the recovery snapshot is written here.
    pub local_folder: PathBuf,
    pub metadata: DocumentMetadata,
    pages: Vec<Page>,
}

/// Wire shape of a [`Document`], before pages are ordered.
#[derive(Deserialize)]
struct RawDocument {
    #[serde(default)]
    local_folder: PathBuf,
    metadata: DocumentMetadata,
    #[serde(default)]
    pages: Vec<Page>,
}

impl From<RawDocument> for Document {
    fn from(raw: RawDocument) -> Self {
        Document::new(raw.local_folder, raw.metadata, raw.pages)
    }
}

impl Document {
    /// Create a document. Pages are sorted by page number (stable).
    pub fn new(local_folder: impl Into<PathBuf>, metadata: DocumentMetadata, pages: Vec<Page>) -> Self {
        let mut doc = Self {
            local_folder: local_folder.into(),
            metadata,
            pages,
        };
        doc.sort_pages();
        doc
    }

    pub fn pages(&self) -> &[Page] {
        &self.pages
    }

    /// In-place access for pipeline stages that fill in derived fields.
    /// Callers must not change `page_nr`.
    pub(crate) fn pages_mut(&mut self) -> &mut [Page] {
        &mut self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    /// Re-establish page ordering (stable).
    pub fn sort_pages(&mut self) {
        self.pages.sort_by_key(|p| p.page_nr);
    }

    /// Resolve every relative resource path against `local_folder`.
    pub fn resolve_relative_paths(&mut self) {
        let base = self.local_folder.clone();
        for page in &mut self.pages {
            page.image = page.image.clone().relative_to(&base);
            for t in &mut page.transcripts {
                t.resource = t.resource.clone().relative_to(&base);
            }
        }
    }
}
