//! Record Store: the authoritative local dataset
//!
//! Mutations are all-or-nothing from the caller's point of view. The CSV
//! variant reads the full snapshot, mutates it in memory and rewrites the
//! whole file, so every mutation costs O(n) in dataset size; that is the
//! accepted scalability limit for small, human-edited datasets. The SQLite
//! variant checks identifier uniqueness and applies the change inside one
//! transaction.

mod csv_file;
mod sqlite;

pub use csv_file::CsvRecordStore;
pub use sqlite::SqliteRecordStore;

use crate::record::{FieldEdits, RecordId};
use crate::snapshot::DatasetSnapshot;
use crate::Result;
use async_trait::async_trait;

/// Backing medium for records
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Human readable location, used in logs and messages
    fn describe(&self) -> String;

    /// Every record in stable source order
    ///
    /// Missing optional fields read as empty strings. Fails with
    /// `StoreUnavailable` when the medium cannot be read at all.
    async fn read_all(&self) -> Result<DatasetSnapshot>;

    /// Overwrite exactly the named fields of the unique record `id`
    async fn update_fields(&self, id: &RecordId, edits: &FieldEdits) -> Result<()>;

    /// Remove the unique record `id`; later records shift down by one
    async fn delete(&self, id: &RecordId) -> Result<()>;
}
