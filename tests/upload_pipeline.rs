//! End-to-end pipeline tests against an in-memory ingestion service.
//!
//! The fake service records every call in order and can be scripted to fail
//! a page a given number of times, to fail the session-open request, or to
//! trip a cancellation token once a given page has been accepted.

use async_trait::async_trait;
use pageput::session::{PageList, PageUploadState};
use pageput::snapshot::read_snapshot;
use pageput::{
    spawn_upload, upload_document, upload_document_blocking, Document, DocumentMetadata, Page,
    PageFiles, Resource, StructureDescriptor, Transcript, UploadConfig, UploadError,
    UploadProgressCallback, UploadService, UploadSession, UploadType,
};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

const UPLOAD_ID: i64 = 77;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Call {
    Open(UploadType),
    Put(u32),
}

#[derive(Default)]
struct FakeService {
    calls: Mutex<Vec<Call>>,
    structures: Mutex<Vec<StructureDescriptor>>,
    /// Remaining failures per page number.
    failures: Mutex<HashMap<u32, usize>>,
    fail_open: bool,
    /// Cancel this token once the given page has been accepted.
    cancel_after: Option<(u32, CancellationToken)>,
    total_pages: u32,
    accepted: Mutex<Vec<PageUploadState>>,
}

impl FakeService {
    fn new(total_pages: u32) -> Self {
        Self {
            total_pages,
            ..Default::default()
        }
    }

    fn failing(self, page_nr: u32, times: usize) -> Self {
        self.failures.lock().unwrap().insert(page_nr, times);
        self
    }

    fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn puts_for(&self, page_nr: u32) -> usize {
        self.calls()
            .iter()
            .filter(|c| **c == Call::Put(page_nr))
            .count()
    }

    fn session(&self) -> UploadSession {
        let pages = self.accepted.lock().unwrap().clone();
        let done = pages.len() as u32 == self.total_pages;
        UploadSession {
            upload_id: UPLOAD_ID,
            col_id: Some(5),
            job_id: done.then(|| "job-1".to_string()),
            upload_complete: done,
            nr_of_pages_total: Some(self.total_pages),
            page_list: PageList { pages },
            ..Default::default()
        }
    }
}

#[async_trait]
impl UploadService for FakeService {
    async fn open_upload_session(
        &self,
        _collection_id: i64,
        structure: &StructureDescriptor,
    ) -> Result<UploadSession, UploadError> {
        self.calls
            .lock()
            .unwrap()
            .push(Call::Open(structure.upload_type()));
        self.structures.lock().unwrap().push(structure.clone());
        if self.fail_open {
            return Err(UploadError::Api {
                status: 500,
                body: "no".into(),
            });
        }
        Ok(self.session())
    }

    async fn put_page(&self, upload_id: i64, page: &PageFiles) -> Result<UploadSession, UploadError> {
        assert_eq!(upload_id, UPLOAD_ID);
        assert!(page.image.exists(), "image must be a local file");
        self.calls.lock().unwrap().push(Call::Put(page.page_nr));

        {
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&page.page_nr) {
                if *left > 0 {
                    *left -= 1;
                    return Err(UploadError::Api {
                        status: 503,
                        body: "busy".into(),
                    });
                }
            }
        }

        self.accepted.lock().unwrap().push(PageUploadState {
            page_nr: page.page_nr,
            file_name: page.image_name.clone(),
            page_xml_name: page.transcript_name.clone(),
            page_uploaded: true,
            ..Default::default()
        });
        if let Some((nr, token)) = &self.cancel_after {
            if *nr == page.page_nr {
                token.cancel();
            }
        }
        Ok(self.session())
    }

    async fn get_upload_status(&self, _upload_id: i64) -> Result<UploadSession, UploadError> {
        Ok(self.session())
    }
}

#[derive(Default)]
struct Recorder {
    begun: Mutex<Vec<(String, u32)>>,
    statuses: Mutex<Vec<String>>,
    percents: Mutex<Vec<u32>>,
    pages: Mutex<Vec<u32>>,
}

impl UploadProgressCallback for Recorder {
    fn begin_task(&self, description: &str, total_units: u32) {
        self.begun
            .lock()
            .unwrap()
            .push((description.to_string(), total_units));
    }

    fn update_status(&self, text: &str) {
        self.statuses.lock().unwrap().push(text.to_string());
    }

    fn update_percent(&self, percent: u32) {
        self.percents.lock().unwrap().push(percent);
    }

    fn on_page_uploaded(&self, page_nr: u32, _total_pages: usize) {
        self.pages.lock().unwrap().push(page_nr);
    }
}

/// Write `n` page images (and a transcript for each) into `dir`.
fn stage_in(dir: &Path, folder: &Path, n: u32) -> Document {
    let pages = (1..=n)
        .map(|nr| {
            let img = dir.join(format!("{nr:04}.jpg"));
            let xml = dir.join(format!("{nr:04}.xml"));
            std::fs::write(&img, format!("image {nr}")).unwrap();
            std::fs::write(&xml, format!("<PcGts>{nr}</PcGts>")).unwrap();
            Page::new(nr, Resource::Path(img)).with_transcript(Transcript::new(Resource::Path(xml)))
        })
        .collect();
    let md = DocumentMetadata {
        title: "Letters".into(),
        ..Default::default()
    };
    Document::new(folder, md, pages)
}

fn stage(n: u32) -> (TempDir, Document) {
    let dir = TempDir::new().unwrap();
    let doc = stage_in(dir.path(), dir.path(), n);
    (dir, doc)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn config(service: Arc<FakeService>) -> UploadConfig {
    init_tracing();
    UploadConfig::builder()
        .service(service)
        .collection_id(5)
        .build()
        .expect("valid config")
}

#[tokio::test]
async fn uploads_every_page_in_order() {
    let (dir, doc) = stage(4);
    let service = Arc::new(FakeService::new(4));

    let session = upload_document(doc, &config(service.clone()), CancellationToken::new())
        .await
        .expect("upload succeeds");

    assert_eq!(
        service.calls(),
        vec![
            Call::Open(UploadType::Mets),
            Call::Put(1),
            Call::Put(2),
            Call::Put(3),
            Call::Put(4),
        ]
    );
    assert_eq!(session.job_id.as_deref(), Some("job-1"));
    assert_eq!(session.pages_uploaded(), 4);
    assert!(!dir.path().join("upload.xml").exists());
}

#[tokio::test]
async fn pages_go_up_in_page_number_order() {
    let dir = TempDir::new().unwrap();
    let staged = stage_in(dir.path(), dir.path(), 3);
    let mut pages = staged.pages().to_vec();
    pages.reverse();
    let doc = Document::new(dir.path(), staged.metadata.clone(), pages);
    let service = Arc::new(FakeService::new(3));

    upload_document(doc, &config(service.clone()), CancellationToken::new())
        .await
        .expect("upload succeeds");

    let puts: Vec<Call> = service.calls().into_iter().skip(1).collect();
    assert_eq!(puts, vec![Call::Put(1), Call::Put(2), Call::Put(3)]);
}

#[tokio::test]
async fn unsorted_manifest_uploads_in_page_number_order() {
    let dir = TempDir::new().unwrap();
    stage_in(dir.path(), dir.path(), 3);
    let image = |nr: u32| dir.path().join(format!("{nr:04}.jpg"));
    let manifest = serde_json::json!({
        "local_folder": dir.path(),
        "metadata": { "title": "Letters" },
        "pages": [
            { "page_nr": 3, "image": { "path": image(3) } },
            { "page_nr": 1, "image": { "path": image(1) } },
            { "page_nr": 2, "image": { "path": image(2) } }
        ]
    });
    let doc: Document = serde_json::from_value(manifest).expect("valid manifest");
    let service = Arc::new(FakeService::new(3));

    upload_document(doc, &config(service.clone()), CancellationToken::new())
        .await
        .expect("upload succeeds");

    let puts: Vec<Call> = service.calls().into_iter().skip(1).collect();
    assert_eq!(puts, vec![Call::Put(1), Call::Put(2), Call::Put(3)]);
}

#[tokio::test]
async fn gapped_page_numbers_report_unclamped_percent() {
    let dir = TempDir::new().unwrap();
    let pages = [2u32, 3, 5]
        .into_iter()
        .map(|nr| {
            let img = dir.path().join(format!("{nr:04}.jpg"));
            std::fs::write(&img, format!("image {nr}")).unwrap();
            Page::new(nr, Resource::Path(img))
        })
        .collect();
    let doc = Document::new(dir.path(), DocumentMetadata::default(), pages);
    let recorder = Arc::new(Recorder::default());
    let service = Arc::new(FakeService::new(3));
    let config = UploadConfig::builder()
        .service(service.clone())
        .collection_id(5)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    upload_document(doc, &config, CancellationToken::new())
        .await
        .expect("upload succeeds");

    // floor(100 / 3 * P) for P = 2, 3, 5
    assert_eq!(*recorder.percents.lock().unwrap(), vec![66, 100, 166]);
    assert_eq!(*recorder.pages.lock().unwrap(), vec![2, 3, 5]);
    assert_eq!(service.puts_for(5), 1);
}

#[tokio::test]
async fn empty_document_is_rejected_before_any_call() {
    let dir = TempDir::new().unwrap();
    let doc = Document::new(dir.path(), DocumentMetadata::default(), vec![]);
    let service = Arc::new(FakeService::new(0));

    let failure = upload_document(doc, &config(service.clone()), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(failure.error, UploadError::EmptyDocument { .. }));
    assert!(failure.last_session.is_none());
    assert!(service.calls().is_empty());
    assert!(!dir.path().join("upload.xml").exists());
}

#[tokio::test]
async fn no_structure_fails_before_any_call() {
    let (_dir, doc) = stage(2);
    let service = Arc::new(FakeService::new(2));
    let config = UploadConfig::builder()
        .service(service.clone())
        .collection_id(5)
        .upload_type(UploadType::NoStructure)
        .build()
        .unwrap();

    let failure = upload_document(doc, &config, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(
        failure.error,
        UploadError::UnsupportedUploadType {
            upload_type: UploadType::NoStructure
        }
    ));
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn three_failures_then_success_recovers() {
    let (dir, doc) = stage(3);
    let service = Arc::new(FakeService::new(3).failing(2, 3));

    let session = upload_document(doc, &config(service.clone()), CancellationToken::new())
        .await
        .expect("fourth attempt succeeds");

    assert_eq!(service.puts_for(1), 1);
    assert_eq!(service.puts_for(2), 4);
    assert_eq!(service.puts_for(3), 1);
    assert_eq!(session.pages_uploaded(), 3);
    assert!(!dir.path().join("upload.xml").exists());
}

#[tokio::test]
async fn four_failures_abort_and_snapshot_previous_page() {
    let (dir, doc) = stage(4);
    let service = Arc::new(FakeService::new(4).failing(3, 4));

    let failure = upload_document(doc, &config(service.clone()), CancellationToken::new())
        .await
        .unwrap_err();

    match &failure.error {
        UploadError::PageUploadFailed { page, attempts, .. } => {
            assert_eq!(*page, 3);
            assert_eq!(*attempts, 4);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!failure.is_cancelled());

    // No call for page 4.
    assert_eq!(service.puts_for(3), 4);
    assert_eq!(service.puts_for(4), 0);

    let snapshot = read_snapshot(dir.path()).await.expect("snapshot written");
    assert_eq!(snapshot.upload_id, UPLOAD_ID);
    assert_eq!(snapshot.pages_uploaded(), 2);
    assert_eq!(Some(&snapshot), failure.last_session.as_ref());
}

#[tokio::test]
async fn first_page_failing_snapshots_the_opened_session() {
    let (dir, doc) = stage(2);
    let service = Arc::new(FakeService::new(2).failing(1, 4));

    let failure = upload_document(doc, &config(service.clone()), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(failure.error, UploadError::PageUploadFailed { page: 1, .. }));
    let snapshot = read_snapshot(dir.path()).await.expect("snapshot written");
    assert_eq!(snapshot.upload_id, UPLOAD_ID);
    assert_eq!(snapshot.pages_uploaded(), 0);
}

#[tokio::test]
async fn open_failure_is_not_retried_and_leaves_no_snapshot() {
    let (dir, doc) = stage(2);
    let service = Arc::new(FakeService {
        fail_open: true,
        ..FakeService::new(2)
    });

    let failure = upload_document(doc, &config(service.clone()), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(failure.error, UploadError::Api { status: 500, .. }));
    assert_eq!(service.calls(), vec![Call::Open(UploadType::Mets)]);
    assert!(!dir.path().join("upload.xml").exists());
}

#[tokio::test]
async fn cancellation_stops_before_next_page() {
    let (dir, doc) = stage(4);
    let token = CancellationToken::new();
    let service = Arc::new(FakeService {
        cancel_after: Some((2, token.clone())),
        ..FakeService::new(4)
    });

    let failure = upload_document(doc, &config(service.clone()), token)
        .await
        .unwrap_err();

    assert!(failure.is_cancelled());
    assert!(matches!(failure.error, UploadError::Cancelled));
    assert_eq!(
        service.calls(),
        vec![Call::Open(UploadType::Mets), Call::Put(1), Call::Put(2)]
    );

    let snapshot = read_snapshot(dir.path()).await.expect("snapshot written");
    assert_eq!(snapshot.pages_uploaded(), 2);
}

#[tokio::test]
async fn cancelled_before_start_makes_no_calls() {
    let (dir, doc) = stage(2);
    let service = Arc::new(FakeService::new(2));
    let token = CancellationToken::new();
    token.cancel();

    let failure = upload_document(doc, &config(service.clone()), token)
        .await
        .unwrap_err();

    assert!(failure.is_cancelled());
    assert!(service.calls().is_empty());
    assert!(!dir.path().join("upload.xml").exists());
}

#[tokio::test]
async fn progress_follows_declared_page_numbers() {
    let (_dir, doc) = stage(4);
    let service = Arc::new(FakeService::new(4));
    let recorder = Arc::new(Recorder::default());
    let config = UploadConfig::builder()
        .service(service)
        .collection_id(5)
        .progress_callback(recorder.clone())
        .build()
        .unwrap();

    upload_document(doc, &config, CancellationToken::new())
        .await
        .expect("upload succeeds");

    let begun = recorder.begun.lock().unwrap().clone();
    assert_eq!(begun.len(), 1);
    assert_eq!(begun[0].1, 100);
    assert_eq!(*recorder.percents.lock().unwrap(), vec![25, 50, 75, 100]);
    assert_eq!(*recorder.pages.lock().unwrap(), vec![1, 2, 3, 4]);

    let statuses = recorder.statuses.lock().unwrap().clone();
    assert_eq!(statuses.first().map(String::as_str), Some("Initiating upload..."));
    assert_eq!(statuses.last().map(String::as_str), Some("Upload done."));
}

#[tokio::test]
async fn checksums_reach_the_structure_descriptor() {
    let (_dir, doc) = stage(2);
    let service = Arc::new(FakeService::new(2));
    let config = UploadConfig::builder()
        .service(service.clone())
        .collection_id(5)
        .upload_type(UploadType::Json)
        .compute_checksums(true)
        .build()
        .unwrap();

    upload_document(doc, &config, CancellationToken::new())
        .await
        .expect("upload succeeds");

    let structures = service.structures.lock().unwrap().clone();
    let StructureDescriptor::Json(descriptor) = &structures[0] else {
        panic!("expected JSON structure");
    };
    assert_eq!(descriptor.page_list.len(), 2);
    for page in &descriptor.page_list {
        assert_eq!(page.img_checksum.as_ref().map(String::len), Some(32));
        assert_eq!(page.page_xml_checksum.as_ref().map(String::len), Some(32));
    }
    assert_eq!(descriptor.page_list[0].file_name, "0001.jpg");
    assert_eq!(descriptor.page_list[0].page_xml_name.as_deref(), Some("0001.xml"));
}

#[tokio::test]
async fn unreadable_image_fails_checksums_before_any_call() {
    let dir = TempDir::new().unwrap();
    let doc = Document::new(
        dir.path(),
        DocumentMetadata::default(),
        vec![Page::new(1, Resource::Path(dir.path().join("missing.jpg")))],
    );
    let service = Arc::new(FakeService::new(1));
    let config = UploadConfig::builder()
        .service(service.clone())
        .collection_id(5)
        .compute_checksums(true)
        .build()
        .unwrap();

    let failure = upload_document(doc, &config, CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(failure.error, UploadError::ChecksumFailed { page: 1, .. }));
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn snapshot_write_failure_keeps_the_original_error() {
    let images = TempDir::new().unwrap();
    let missing_folder = images.path().join("gone");
    let doc = stage_in(images.path(), &missing_folder, 2);
    let service = Arc::new(FakeService::new(2).failing(2, 4));

    let failure = upload_document(doc, &config(service), CancellationToken::new())
        .await
        .unwrap_err();

    assert!(matches!(failure.error, UploadError::PageUploadFailed { page: 2, .. }));
    assert!(!missing_folder.exists());
}

#[tokio::test]
async fn spawned_upload_can_be_cancelled_before_it_starts() {
    let (_dir, doc) = stage(3);
    let service = Arc::new(FakeService::new(3));

    let handle = spawn_upload(doc, config(service.clone()));
    handle.cancel();
    let failure = handle.join().await.unwrap_err();

    assert!(failure.is_cancelled());
    assert!(service.calls().is_empty());
}

#[tokio::test]
async fn spawned_upload_runs_to_completion() {
    let (_dir, doc) = stage(2);
    let service = Arc::new(FakeService::new(2));

    let session = spawn_upload(doc, config(service.clone()))
        .join()
        .await
        .expect("upload succeeds");

    assert!(session.has_job());
    assert_eq!(service.calls().len(), 3);
}

#[test]
fn blocking_wrapper_uploads() {
    let (_dir, doc) = stage(2);
    let service = Arc::new(FakeService::new(2));

    let session = upload_document_blocking(doc, &config(service.clone())).expect("upload succeeds");

    assert_eq!(session.pages_uploaded(), 2);
    assert_eq!(service.puts_for(2), 1);
}
