//! End-to-end session scenarios: navigation bounds, edits, deletes with
//! cursor clamping, the empty state, and local-first/remote-second sync

use async_trait::async_trait;
use mcqr_common::images::ImageLookup;
use mcqr_common::progress::{ProgressTracker, SqliteProgressTracker};
use mcqr_common::remote::{MemoryRemote, RemoteContent, RemoteRepository, RemoteSynchronizer, VersionToken};
use mcqr_common::session::{Action, AssignmentFilter, SessionCoordinator, SessionView, SyncStatus};
use mcqr_common::store::{CsvRecordStore, RecordStore, SqliteRecordStore};
use mcqr_common::{DatasetSnapshot, Error, Field, FieldEdits, Record};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const DATASET: &str = "\
id,title,reformatted_question,option a,option b,option c,option d,option e,option f,category,Subcategory,assigned_to
10,Rivers,Which river is longest?,Nile,Amazon,Yangtze,Danube,Volga,Congo,,geography,Amit
11,Peaks,Which peak is highest?,Everest,K2,Denali,Elbrus,Fuji,Kilimanjaro,geography,mountains,Amit
12,Kings,Who founded the Maurya empire?,Chandragupta,Asoka,Bindusara,Harsha,Kanishka,Samudragupta,history,india,Amit
13,Coins,Which metal is in a penny?,Copper,Zinc,Tin,Iron,Lead,Gold,science,metals,Yash
";

/// Progress tracker that counts calls, to prove which paths touch it
struct CountingTracker {
    inner: SqliteProgressTracker,
    calls: AtomicUsize,
}

#[async_trait]
impl ProgressTracker for CountingTracker {
    async fn get_cursor(&self, annotator: &str) -> mcqr_common::Result<usize> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.get_cursor(annotator).await
    }

    async fn set_cursor(&self, annotator: &str, value: usize) -> mcqr_common::Result<()> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.inner.set_cursor(annotator, value).await
    }
}

#[derive(Clone, Copy)]
enum Injected {
    /// Another writer commits between our fetch and our write
    ConcurrentWriter,
    /// The write lands but the response never arrives
    LostResponse,
}

/// Memory remote with one-shot failure injection on the next write
struct FlakyRemote {
    inner: MemoryRemote,
    next: Mutex<Option<Injected>>,
}

impl FlakyRemote {
    fn new(bytes: Vec<u8>) -> Self {
        Self {
            inner: MemoryRemote::new("temp.csv", bytes),
            next: Mutex::new(None),
        }
    }

    fn inject(&self, failure: Injected) {
        *self.next.lock().unwrap() = Some(failure);
    }
}

#[async_trait]
impl RemoteRepository for FlakyRemote {
    fn describe(&self) -> String {
        self.inner.describe()
    }

    async fn fetch(&self) -> mcqr_common::Result<RemoteContent> {
        self.inner.fetch().await
    }

    async fn put_conditional(
        &self,
        bytes: Vec<u8>,
        expected: VersionToken,
        message: &str,
    ) -> mcqr_common::Result<()> {
        let injected = self.next.lock().unwrap().take();
        match injected {
            None => self.inner.put_conditional(bytes, expected, message).await,
            Some(Injected::ConcurrentWriter) => {
                let current = self.inner.content().unwrap_or_default();
                self.inner.overwrite(current, "other writer");
                self.inner.put_conditional(bytes, expected, message).await
            }
            Some(Injected::LostResponse) => {
                self.inner.put_conditional(bytes, expected, message).await?;
                Err(Error::PushUnconfirmed("response lost".to_string()))
            }
        }
    }
}

struct Fixture {
    _dir: tempfile::TempDir,
    csv_path: PathBuf,
    store: Arc<CsvRecordStore>,
    tracker: Arc<CountingTracker>,
    images: ImageLookup,
}

impl Fixture {
    async fn new(dataset: &str) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let csv_path = dir.path().join("temp.csv");
        std::fs::write(&csv_path, dataset).unwrap();
        std::fs::create_dir_all(dir.path().join("images")).unwrap();
        std::fs::write(dir.path().join("images").join("10.jpg"), b"jpeg").unwrap();

        let tracker = Arc::new(CountingTracker {
            inner: SqliteProgressTracker::open(&dir.path().join("progress.db"))
                .await
                .unwrap(),
            calls: AtomicUsize::new(0),
        });

        Self {
            store: Arc::new(CsvRecordStore::new(&csv_path)),
            images: ImageLookup::new(dir.path().join("images"), "jpg"),
            csv_path,
            tracker,
            _dir: dir,
        }
    }

    fn coordinator(&self, annotator: &str) -> SessionCoordinator {
        SessionCoordinator::new(
            annotator,
            AssignmentFilter::Annotator(annotator.to_string()),
            self.store.clone(),
            self.tracker.clone(),
            self.images.clone(),
        )
    }

    fn lines(&self) -> Vec<String> {
        read_lines(&self.csv_path)
    }
}

fn read_lines(path: &Path) -> Vec<String> {
    std::fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(str::to_string)
        .collect()
}

fn current_id(view: &SessionView) -> &str {
    view.current().expect("a record view").record.id.as_str()
}

fn cursor(view: &SessionView) -> usize {
    view.current().expect("a record view").cursor
}

fn total(view: &SessionView) -> usize {
    view.current().expect("a record view").total
}

fn save(field: Field, value: &str) -> Action {
    let mut edits = FieldEdits::new();
    edits.insert(field, value.to_string());
    Action::Save(edits)
}

// =============================================================================
// Navigation and deletion
// =============================================================================

#[tokio::test]
async fn test_navigate_then_delete_clamps_cursor() {
    let fx = Fixture::new(DATASET).await;
    let amit = fx.coordinator("Amit");

    let view = amit.open().await.unwrap();
    assert_eq!(cursor(&view), 0);
    assert_eq!(current_id(&view), "10");
    assert!(view.current().unwrap().image.is_found());

    amit.handle(Action::Next).await.unwrap();
    let report = amit.handle(Action::Next).await.unwrap();
    assert_eq!(cursor(&report.view), 2);
    assert_eq!(current_id(&report.view), "12");
    assert!(matches!(report.sync, SyncStatus::NotRequired));

    let report = amit.handle(Action::Delete).await.unwrap();
    assert_eq!(cursor(&report.view), 1);
    assert_eq!(current_id(&report.view), "11");
    assert_eq!(total(&report.view), 2);
    assert!(matches!(report.sync, SyncStatus::Disabled));
    assert_eq!(fx.tracker.inner.get_cursor("Amit").await.unwrap(), 1);

    // Yash's record is untouched
    assert_eq!(fx.coordinator("Yash").assigned().await.unwrap().len(), 1);
}

#[tokio::test]
async fn test_navigation_never_leaves_range() {
    let fx = Fixture::new(DATASET).await;
    let amit = fx.coordinator("Amit");

    let report = amit.handle(Action::Previous).await.unwrap();
    assert_eq!(cursor(&report.view), 0);

    for _ in 0..5 {
        amit.handle(Action::Next).await.unwrap();
    }
    let view = amit.open().await.unwrap();
    assert_eq!(cursor(&view), 2);
    assert_eq!(fx.tracker.inner.get_cursor("Amit").await.unwrap(), 2);

    let report = amit.handle(Action::Previous).await.unwrap();
    assert_eq!(cursor(&report.view), 1);
    assert_eq!(current_id(&report.view), "11");
}

#[tokio::test]
async fn test_cursor_survives_coordinator_restart() {
    let fx = Fixture::new(DATASET).await;
    fx.coordinator("Amit").handle(Action::Next).await.unwrap();

    let reopened = fx.coordinator("Amit").open().await.unwrap();
    assert_eq!(current_id(&reopened), "11");
}

#[tokio::test]
async fn test_empty_assignment_is_terminal_without_cursor_access() {
    let fx = Fixture::new(DATASET).await;
    let xin = fx.coordinator("Xin");

    let view = xin.open().await.unwrap();
    assert!(view.is_empty());

    let report = xin.handle(save(Field::Category, "history")).await.unwrap();
    assert!(report.view.is_empty());
    assert!(matches!(report.sync, SyncStatus::NotRequired));

    assert_eq!(fx.tracker.calls.load(Ordering::SeqCst), 0);
    assert_eq!(std::fs::read_to_string(&fx.csv_path).unwrap(), DATASET);
}

#[tokio::test]
async fn test_deleting_last_records_enters_empty_state() {
    let fx = Fixture::new(DATASET).await;
    let yash = fx.coordinator("Yash");

    let report = yash.handle(Action::Delete).await.unwrap();
    assert!(report.view.is_empty());
    assert_eq!(fx.tracker.inner.get_cursor("Yash").await.unwrap(), 0);

    let report = yash.handle(Action::Next).await.unwrap();
    assert!(report.view.is_empty());
    assert_eq!(fx.coordinator("Amit").assigned().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_stale_cursor_is_clamped_on_open() {
    let fx = Fixture::new(DATASET).await;
    fx.tracker.inner.set_cursor("Amit", 7).await.unwrap();

    let view = fx.coordinator("Amit").open().await.unwrap();

    assert_eq!(cursor(&view), 2);
    assert_eq!(current_id(&view), "12");
    assert_eq!(fx.tracker.inner.get_cursor("Amit").await.unwrap(), 2);
}

#[tokio::test]
async fn test_missing_image_does_not_block_editing() {
    let fx = Fixture::new(DATASET).await;
    let amit = fx.coordinator("Amit");
    amit.handle(Action::Next).await.unwrap();

    let view = amit.open().await.unwrap();
    assert!(!view.current().unwrap().image.is_found());

    let report = amit.handle(save(Field::Title, "Summits")).await.unwrap();
    assert_eq!(report.view.current().unwrap().record.get(Field::Title), "Summits");
}

// =============================================================================
// Saving
// =============================================================================

#[tokio::test]
async fn test_save_category_leaves_everything_else_identical() {
    let fx = Fixture::new(DATASET).await;
    let amit = fx.coordinator("Amit");
    let before = fx.lines();
    let record_before: Record = amit.assigned().await.unwrap()[0].clone();

    let report = amit.handle(save(Field::Category, "history")).await.unwrap();

    let record = &report.view.current().unwrap().record;
    assert_eq!(record.id.as_str(), "10");
    assert_eq!(record.get(Field::Category), "history");
    for field in [
        Field::Question,
        Field::OptionA,
        Field::OptionB,
        Field::OptionC,
        Field::OptionD,
        Field::OptionE,
        Field::OptionF,
        Field::Subcategory,
    ] {
        assert_eq!(record.get(field), record_before.get(field), "{} changed", field);
    }

    let after = fx.lines();
    assert_eq!(after[0], before[0]);
    assert_ne!(after[1], before[1]);
    assert_eq!(after[2..], before[2..], "records 11, 12 and 13 must be byte-identical");
    assert_eq!(cursor(&report.view), 0);
}

#[tokio::test]
async fn test_store_corruption_aborts_save() {
    let dataset = "id,title,category,assigned_to\n10,a,,Amit\n10,b,,Amit\n";
    let fx = Fixture::new(dataset).await;
    let remote = Arc::new(MemoryRemote::new("temp.csv", dataset.as_bytes().to_vec()));
    let amit = fx
        .coordinator("Amit")
        .with_synchronizer(RemoteSynchronizer::new(remote.clone()));

    let err = amit.handle(save(Field::Category, "history")).await.unwrap_err();

    assert!(matches!(err, Error::StoreCorrupt(_)));
    assert_eq!(std::fs::read_to_string(&fx.csv_path).unwrap(), dataset);
    assert_eq!(remote.revision(), 0, "nothing is pushed after a failed local write");
}

// =============================================================================
// Remote synchronization
// =============================================================================

#[tokio::test]
async fn test_save_pushes_local_snapshot() {
    let fx = Fixture::new(DATASET).await;
    let remote = Arc::new(MemoryRemote::new("temp.csv", DATASET.as_bytes().to_vec()));
    let amit = fx
        .coordinator("Amit")
        .with_synchronizer(RemoteSynchronizer::new(remote.clone()));

    let report = amit.handle(save(Field::Category, "history")).await.unwrap();

    assert!(matches!(report.sync, SyncStatus::Synced));
    assert_eq!(remote.content().unwrap(), std::fs::read(&fx.csv_path).unwrap());
    let message = remote.last_message().unwrap();
    assert!(message.starts_with("Edit record 10 (Amit) at "), "{}", message);

    let report = amit.handle(Action::Delete).await.unwrap();
    assert!(matches!(report.sync, SyncStatus::Synced));
    assert_eq!(remote.revision(), 2);
    assert!(remote.last_message().unwrap().starts_with("Remove record 10 (Amit)"));
}

#[tokio::test]
async fn test_conflict_keeps_local_edit_and_resync_pushes() {
    let fx = Fixture::new(DATASET).await;
    let remote = Arc::new(FlakyRemote::new(DATASET.as_bytes().to_vec()));
    let amit = fx
        .coordinator("Amit")
        .with_synchronizer(RemoteSynchronizer::new(remote.clone()));

    remote.inject(Injected::ConcurrentWriter);
    let report = amit.handle(save(Field::Category, "history")).await.unwrap();

    assert!(report.sync.is_pending());
    let err = report.sync.error().expect("push must fail");
    assert!(matches!(err, Error::VersionConflict(_)));
    assert!(err.is_recoverable());
    // Saved locally, not yet synced
    assert_eq!(report.view.current().unwrap().record.get(Field::Category), "history");
    assert_ne!(remote.inner.content().unwrap(), std::fs::read(&fx.csv_path).unwrap());

    let status = amit.resync().await.unwrap();
    assert!(matches!(status, SyncStatus::Synced));
    assert_eq!(remote.inner.content().unwrap(), std::fs::read(&fx.csv_path).unwrap());
}

#[tokio::test]
async fn test_unconfirmed_push_is_verified_before_retry() {
    let fx = Fixture::new(DATASET).await;
    let remote = Arc::new(FlakyRemote::new(DATASET.as_bytes().to_vec()));
    let amit = fx
        .coordinator("Amit")
        .with_synchronizer(RemoteSynchronizer::new(remote.clone()));

    remote.inject(Injected::LostResponse);
    let report = amit.handle(Action::Delete).await.unwrap();
    assert!(matches!(report.sync.error(), Some(Error::PushUnconfirmed(_))));
    assert_eq!(remote.inner.revision(), 1);

    let status = amit.resync().await.unwrap();
    assert!(matches!(status, SyncStatus::Synced));
    assert_eq!(remote.inner.revision(), 1, "verified content is not pushed twice");
}

#[tokio::test]
async fn test_missing_remote_leaves_local_delete_committed() {
    let fx = Fixture::new(DATASET).await;
    let amit = fx
        .coordinator("Amit")
        .with_synchronizer(RemoteSynchronizer::new(Arc::new(MemoryRemote::missing("temp.csv"))));

    let report = amit.handle(Action::Delete).await.unwrap();

    assert!(matches!(report.sync.error(), Some(Error::RemoteResourceMissing(_))));
    assert_eq!(total(&report.view), 2);
    assert_eq!(fx.store.read_all().await.unwrap().len(), 3);
}

#[tokio::test]
async fn test_resync_without_remote_is_disabled() {
    let fx = Fixture::new(DATASET).await;
    let status = fx.coordinator("Amit").resync().await.unwrap();
    assert!(matches!(status, SyncStatus::Disabled));
}

// =============================================================================
// Per-annotator database variant
// =============================================================================

#[tokio::test]
async fn test_member_database_session() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(
        SqliteRecordStore::open(&dir.path().join("members").join("Gagan.db"))
            .await
            .unwrap(),
    );
    store
        .import(&DatasetSnapshot::with_catalogue_columns(vec![
            Record::new("20", "").with(Field::Category, "art"),
            Record::new("21", "").with(Field::Category, "art"),
            Record::new("22", "").with(Field::Category, "music"),
        ]))
        .await
        .unwrap();
    let tracker = Arc::new(
        SqliteProgressTracker::open(&dir.path().join("progress.db"))
            .await
            .unwrap(),
    );
    let remote = Arc::new(MemoryRemote::new("members/Gagan.csv", Vec::new()));
    let gagan = SessionCoordinator::new(
        "Gagan",
        AssignmentFilter::Everything,
        store.clone(),
        tracker.clone(),
        ImageLookup::new(dir.path().join("images"), "jpg"),
    )
    .with_synchronizer(RemoteSynchronizer::new(remote.clone()));

    let distribution = gagan.category_distribution().await.unwrap();
    assert_eq!(distribution.get("art"), Some(&2));
    assert_eq!(distribution.get("music"), Some(&1));

    gagan.handle(Action::Next).await.unwrap();
    let report = gagan.handle(save(Field::Subcategory, "painting")).await.unwrap();
    assert!(matches!(report.sync, SyncStatus::Synced));
    assert_eq!(current_id(&report.view), "21");

    let mirrored = DatasetSnapshot::from_csv(&remote.content().unwrap()).unwrap();
    assert_eq!(mirrored, store.read_all().await.unwrap());
    assert_eq!(mirrored.records[1].get(Field::Subcategory), "painting");
    assert_eq!(tracker.get_cursor("Gagan").await.unwrap(), 1);
}
