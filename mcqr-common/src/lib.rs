//! # MCQR Common Library
//!
//! Persistence and synchronization layer of the question review tool:
//! - Record model, dataset snapshots and their CSV wire format
//! - Record stores (shared CSV file, per-annotator SQLite databases)
//! - Durable per-annotator progress cursors
//! - Optimistic-concurrency push to a remote copy
//! - Session coordinator driving navigation and mutations
//! - Configuration loading and the annotator registry

pub mod config;
pub mod db;
pub mod error;
pub mod images;
pub mod progress;
pub mod record;
pub mod registry;
pub mod remote;
pub mod session;
pub mod snapshot;
pub mod store;

pub use error::{Error, ErrorKind, Result};
pub use record::{Field, FieldEdits, Record, RecordId};
pub use snapshot::DatasetSnapshot;
