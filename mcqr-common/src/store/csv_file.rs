//! Shared CSV file store

use super::RecordStore;
use crate::record::{FieldEdits, RecordId};
use crate::snapshot::DatasetSnapshot;
use crate::{Error, Result};
use async_trait::async_trait;
use std::io::Write;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Records kept in one CSV file shared by every annotator
///
/// The file is replaced atomically on every write: content goes to a temp
/// file in the same directory, is synced, then renamed over the original.
pub struct CsvRecordStore {
    path: PathBuf,
    /// Serializes read-modify-write cycles within this process
    write_lock: Mutex<()>,
}

impl CsvRecordStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Replace the file content with `snapshot`
    pub async fn write_snapshot(&self, snapshot: &DatasetSnapshot) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.persist(snapshot).await
    }

    async fn load(&self) -> Result<DatasetSnapshot> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| {
            Error::StoreUnavailable(format!("cannot read {}: {}", self.path.display(), e))
        })?;
        DatasetSnapshot::from_csv(&bytes)
    }

    async fn persist(&self, snapshot: &DatasetSnapshot) -> Result<()> {
        let bytes = snapshot.to_csv()?;
        let path = self.path.clone();

        tokio::task::spawn_blocking(move || write_atomically(&path, &bytes))
            .await
            .map_err(|e| Error::StoreUnavailable(format!("write task failed: {}", e)))?
    }

    /// Load, mutate and persist under the write lock
    async fn modify<F>(&self, mutate: F) -> Result<()>
    where
        F: FnOnce(&mut DatasetSnapshot) -> Result<()> + Send,
    {
        let _guard = self.write_lock.lock().await;
        let mut snapshot = self.load().await?;
        mutate(&mut snapshot)?;
        self.persist(&snapshot).await
    }
}

fn write_atomically(path: &Path, bytes: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut temp = tempfile::NamedTempFile::new_in(&dir)?;
    temp.write_all(bytes)?;
    temp.as_file().sync_all()?;
    temp.persist(path).map_err(|e| Error::Io(e.error))?;
    Ok(())
}

#[async_trait]
impl RecordStore for CsvRecordStore {
    fn describe(&self) -> String {
        format!("csv:{}", self.path.display())
    }

    async fn read_all(&self) -> Result<DatasetSnapshot> {
        let snapshot = self.load().await?;
        debug!("Read {} records from {}", snapshot.len(), self.path.display());
        Ok(snapshot)
    }

    async fn update_fields(&self, id: &RecordId, edits: &FieldEdits) -> Result<()> {
        self.modify(|snapshot| {
            let index = snapshot.locate(id)?;
            for field in edits.keys() {
                snapshot.ensure_column(*field);
            }
            snapshot.records[index].apply(edits);
            Ok(())
        })
        .await?;

        info!(
            "Updated {} field(s) of record {} in {}",
            edits.len(),
            id,
            self.path.display()
        );
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> Result<()> {
        self.modify(|snapshot| {
            let index = snapshot.locate(id)?;
            snapshot.records.remove(index);
            Ok(())
        })
        .await?;

        info!("Deleted record {} from {}", id, self.path.display());
        Ok(())
    }
}
