//! Session Coordinator
//!
//! One coordinator serves one annotator. Every call re-derives the
//! annotator's record sequence from the store and the cursor from the
//! progress tracker, applies one [`Action`], persists the new cursor and
//! returns the resulting view. Nothing is cached between calls, so the host
//! can re-invoke it on every user interaction.
//!
//! Mutations are local-first, remote-second: a failed push never undoes the
//! committed local change and is reported as [`SyncStatus::LocalOnly`].

use crate::images::{ImageLookup, ImageStatus};
use crate::progress::ProgressTracker;
use crate::record::{FieldEdits, Record, RecordId};
use crate::remote::RemoteSynchronizer;
use crate::snapshot::{category_distribution, DatasetSnapshot};
use crate::store::RecordStore;
use crate::{Error, ErrorKind, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Which records of a snapshot belong to the annotator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssignmentFilter {
    /// Records whose `assigned_to` equals the name
    Annotator(String),
    /// Every record (the store holds only this annotator's records)
    Everything,
}

impl AssignmentFilter {
    pub fn select(&self, snapshot: &DatasetSnapshot) -> Vec<Record> {
        match self {
            AssignmentFilter::Annotator(name) => snapshot.filter_by_assignment(name),
            AssignmentFilter::Everything => snapshot.records.clone(),
        }
    }
}

/// User-initiated step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Previous,
    Next,
    /// Overwrite fields of the current record
    Save(FieldEdits),
    /// Remove the current record
    Delete,
}

impl Action {
    fn label(&self) -> &'static str {
        match self {
            Action::Previous => "previous",
            Action::Next => "next",
            Action::Save(_) => "save",
            Action::Delete => "delete",
        }
    }
}

/// The current record with its position
#[derive(Debug, Clone, Serialize)]
pub struct RecordView {
    pub annotator: String,
    /// Zero-based position in the annotator's sequence
    pub cursor: usize,
    pub total: usize,
    pub record: Record,
    pub image: ImageStatus,
}

/// What the annotator sees
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionView {
    /// Nothing (left) to review
    Empty { annotator: String },
    Record(RecordView),
}

impl SessionView {
    pub fn is_empty(&self) -> bool {
        matches!(self, SessionView::Empty { .. })
    }

    pub fn current(&self) -> Option<&RecordView> {
        match self {
            SessionView::Record(view) => Some(view),
            SessionView::Empty { .. } => None,
        }
    }
}

/// Outcome of the remote half of a mutation
#[derive(Debug)]
pub enum SyncStatus {
    /// The action did not change data
    NotRequired,
    /// No remote is configured for this annotator
    Disabled,
    Synced,
    /// Committed locally; the push failed and can be retried on its own
    LocalOnly(Error),
}

impl SyncStatus {
    pub fn is_pending(&self) -> bool {
        matches!(self, SyncStatus::LocalOnly(_))
    }

    pub fn error(&self) -> Option<&Error> {
        match self {
            SyncStatus::LocalOnly(e) => Some(e),
            _ => None,
        }
    }
}

/// Serializable form of [`SyncStatus`]
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SyncReport {
    NotRequired,
    Disabled,
    Synced,
    LocalOnly {
        kind: ErrorKind,
        recoverable: bool,
        message: String,
    },
}

impl From<&SyncStatus> for SyncReport {
    fn from(status: &SyncStatus) -> Self {
        match status {
            SyncStatus::NotRequired => SyncReport::NotRequired,
            SyncStatus::Disabled => SyncReport::Disabled,
            SyncStatus::Synced => SyncReport::Synced,
            SyncStatus::LocalOnly(e) => SyncReport::LocalOnly {
                kind: e.kind(),
                recoverable: e.is_recoverable(),
                message: e.to_string(),
            },
        }
    }
}

#[derive(Debug)]
pub struct ActionReport {
    pub view: SessionView,
    pub sync: SyncStatus,
}

pub struct SessionCoordinator {
    annotator: String,
    filter: AssignmentFilter,
    store: Arc<dyn RecordStore>,
    progress: Arc<dyn ProgressTracker>,
    sync: Option<RemoteSynchronizer>,
    images: ImageLookup,
}

impl SessionCoordinator {
    pub fn new(
        annotator: impl Into<String>,
        filter: AssignmentFilter,
        store: Arc<dyn RecordStore>,
        progress: Arc<dyn ProgressTracker>,
        images: ImageLookup,
    ) -> Self {
        Self {
            annotator: annotator.into(),
            filter,
            store,
            progress,
            sync: None,
            images,
        }
    }

    pub fn with_synchronizer(mut self, sync: RemoteSynchronizer) -> Self {
        self.sync = Some(sync);
        self
    }

    pub fn annotator(&self) -> &str {
        &self.annotator
    }

    pub fn store(&self) -> &Arc<dyn RecordStore> {
        &self.store
    }

    pub fn synchronizer(&self) -> Option<&RemoteSynchronizer> {
        self.sync.as_ref()
    }

    /// The annotator's records in order, re-read from the store
    pub async fn assigned(&self) -> Result<Vec<Record>> {
        let snapshot = self.store.read_all().await?;
        Ok(self.filter.select(&snapshot))
    }

    /// Current view without changing anything but an out-of-range cursor
    ///
    /// An empty sequence yields [`SessionView::Empty`] without touching the
    /// progress tracker.
    pub async fn open(&self) -> Result<SessionView> {
        let records = self.assigned().await?;
        if records.is_empty() {
            info!("No questions remaining for {}", self.annotator);
            return Ok(self.empty_view());
        }

        let cursor = self.resolve_cursor(records.len()).await?;
        Ok(self.view(records, cursor))
    }

    /// Apply one action and return the resulting view
    ///
    /// Store failures abort the action and are returned as `Err`; the
    /// dataset is unchanged in that case.
    pub async fn handle(&self, action: Action) -> Result<ActionReport> {
        let records = self.assigned().await?;
        if records.is_empty() {
            debug!("Ignoring {} for {}: nothing to review", action.label(), self.annotator);
            return Ok(ActionReport {
                view: self.empty_view(),
                sync: SyncStatus::NotRequired,
            });
        }

        let mut cursor = self.resolve_cursor(records.len()).await?;
        let total = records.len();

        match action {
            Action::Previous => {
                if cursor > 0 {
                    cursor -= 1;
                    self.progress.set_cursor(&self.annotator, cursor).await?;
                }
                Ok(ActionReport {
                    view: self.view(records, cursor),
                    sync: SyncStatus::NotRequired,
                })
            }
            Action::Next => {
                if cursor + 1 < total {
                    cursor += 1;
                    self.progress.set_cursor(&self.annotator, cursor).await?;
                }
                Ok(ActionReport {
                    view: self.view(records, cursor),
                    sync: SyncStatus::NotRequired,
                })
            }
            Action::Save(edits) => {
                let id = records[cursor].id.clone();
                self.store.update_fields(&id, &edits).await?;
                let sync = self.publish("Edit", &id).await;
                let view = self.rederive(cursor).await?;
                Ok(ActionReport { view, sync })
            }
            Action::Delete => {
                let id = records[cursor].id.clone();
                self.store.delete(&id).await?;
                let sync = self.publish("Remove", &id).await;
                let view = self.rederive(cursor).await?;
                Ok(ActionReport { view, sync })
            }
        }
    }

    /// Retry only the remote half after a [`SyncStatus::LocalOnly`]
    ///
    /// Reads the remote first: when it already holds the local content (a
    /// push whose response was lost) nothing is written again.
    pub async fn resync(&self) -> Result<SyncStatus> {
        let Some(sync) = &self.sync else {
            return Ok(SyncStatus::Disabled);
        };

        let snapshot = self.store.read_all().await?;
        match sync.verify(&snapshot).await {
            Ok(true) => {
                info!("{} already holds the local dataset", sync.describe());
                return Ok(SyncStatus::Synced);
            }
            Ok(false) => {}
            Err(e) => return Ok(SyncStatus::LocalOnly(e)),
        }

        let message = self.commit_message("Resync", None);
        match sync.publish(self.store.as_ref(), &message).await {
            Ok(_) => Ok(SyncStatus::Synced),
            Err(e) => Ok(SyncStatus::LocalOnly(e)),
        }
    }

    /// Category → record count over the annotator's records
    pub async fn category_distribution(&self) -> Result<BTreeMap<String, usize>> {
        Ok(category_distribution(&self.assigned().await?))
    }

    /// Stored cursor clamped into `[0, len - 1]`; a clamp is persisted
    async fn resolve_cursor(&self, len: usize) -> Result<usize> {
        let stored = self.progress.get_cursor(&self.annotator).await?;
        if stored < len {
            return Ok(stored);
        }

        let clamped = len - 1;
        warn!(
            "Cursor {} for {} is past the end of {} records, clamping to {}",
            stored, self.annotator, len, clamped
        );
        self.progress.set_cursor(&self.annotator, clamped).await?;
        Ok(clamped)
    }

    /// Recompute the sequence after a mutation and clamp the cursor to it
    async fn rederive(&self, cursor: usize) -> Result<SessionView> {
        let records = self.assigned().await?;
        if records.is_empty() {
            self.progress.set_cursor(&self.annotator, 0).await?;
            info!("No questions remaining for {}", self.annotator);
            return Ok(self.empty_view());
        }

        let cursor = cursor.min(records.len() - 1);
        self.progress.set_cursor(&self.annotator, cursor).await?;
        Ok(self.view(records, cursor))
    }

    async fn publish(&self, verb: &str, id: &RecordId) -> SyncStatus {
        let Some(sync) = &self.sync else {
            return SyncStatus::Disabled;
        };

        let message = self.commit_message(verb, Some(id));
        match sync.publish(self.store.as_ref(), &message).await {
            Ok(_) => SyncStatus::Synced,
            Err(e) => {
                warn!(
                    "Record {} saved locally but not synced to {}: {}",
                    id,
                    sync.describe(),
                    e
                );
                SyncStatus::LocalOnly(e)
            }
        }
    }

    fn commit_message(&self, verb: &str, id: Option<&RecordId>) -> String {
        let at = chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
        match id {
            Some(id) => format!("{} record {} ({}) at {}", verb, id, self.annotator, at),
            None => format!("{} dataset ({}) at {}", verb, self.annotator, at),
        }
    }

    fn view(&self, mut records: Vec<Record>, cursor: usize) -> SessionView {
        let total = records.len();
        let record = records.swap_remove(cursor);
        let image = self.images.locate(&record.id);
        SessionView::Record(RecordView {
            annotator: self.annotator.clone(),
            cursor,
            total,
            record,
            image,
        })
    }

    fn empty_view(&self) -> SessionView {
        SessionView::Empty {
            annotator: self.annotator.clone(),
        }
    }
}
