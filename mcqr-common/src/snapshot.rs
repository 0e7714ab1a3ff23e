//! Dataset snapshots and their CSV wire encoding
//!
//! A snapshot is the full in-memory materialization of a dataset: the column
//! layout of the source plus every record in source order. It is the unit
//! exchanged with the remote copy.

use crate::record::{Field, Record, RecordId, ASSIGNMENT_COLUMN, ID_COLUMN};
use crate::{Error, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// Complete set of records at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetSnapshot {
    /// Column headers in source order (always contains `id`)
    pub columns: Vec<String>,
    /// Records in source order
    pub records: Vec<Record>,
}

impl Default for DatasetSnapshot {
    fn default() -> Self {
        Self::with_catalogue_columns(Vec::new())
    }
}

impl DatasetSnapshot {
    /// Snapshot laid out with the key columns followed by every catalogue field
    ///
    /// Absent catalogue fields are filled with empty strings, so the result
    /// equals its own CSV round trip.
    pub fn with_catalogue_columns(mut records: Vec<Record>) -> Self {
        let mut columns = vec![ID_COLUMN.to_string(), ASSIGNMENT_COLUMN.to_string()];
        columns.extend(Field::ALL.iter().map(|f| f.header().to_string()));
        for record in &mut records {
            for field in Field::ALL {
                record
                    .values
                    .entry(field.header().to_string())
                    .or_default();
            }
        }
        Self { columns, records }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Records assigned to `annotator`, in source order
    pub fn filter_by_assignment(&self, annotator: &str) -> Vec<Record> {
        self.records
            .iter()
            .filter(|r| r.assigned_to == annotator)
            .cloned()
            .collect()
    }

    /// Position of the unique record carrying `id`
    ///
    /// Fails with `RecordNotFound` when absent and `StoreCorrupt` when the id
    /// occurs more than once.
    pub fn locate(&self, id: &RecordId) -> Result<usize> {
        let mut matches = self
            .records
            .iter()
            .enumerate()
            .filter(|(_, r)| &r.id == id)
            .map(|(i, _)| i);

        let first = matches
            .next()
            .ok_or_else(|| Error::RecordNotFound(id.to_string()))?;
        if matches.next().is_some() {
            return Err(Error::StoreCorrupt(format!(
                "identifier {} occurs more than once",
                id
            )));
        }
        Ok(first)
    }

    /// Append a header for `field` when the source layout lacks it
    pub fn ensure_column(&mut self, field: Field) {
        if !self.columns.iter().any(|c| c == field.header()) {
            self.columns.push(field.header().to_string());
        }
    }

    /// Encode as CSV: header row then one row per record
    pub fn to_csv(&self) -> Result<Vec<u8>> {
        let mut writer = csv::Writer::from_writer(Vec::new());
        writer.write_record(&self.columns)?;
        for record in &self.records {
            writer.write_record(self.columns.iter().map(|c| record.column(c)))?;
        }
        writer
            .into_inner()
            .map_err(|e| Error::Io(e.into_error()))
    }

    /// Decode CSV produced by [`DatasetSnapshot::to_csv`] or a spreadsheet export
    ///
    /// Short rows are padded with empty strings. A missing `id` header or a
    /// row without an id makes the data unusable.
    pub fn from_csv(bytes: &[u8]) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .from_reader(bytes);

        let columns: Vec<String> = reader
            .headers()?
            .iter()
            .map(|h| h.trim_start_matches('\u{feff}').to_string())
            .collect();

        let id_index = columns
            .iter()
            .position(|c| c == ID_COLUMN)
            .ok_or_else(|| Error::StoreUnavailable("dataset has no `id` column".to_string()))?;
        let assignment_index = columns.iter().position(|c| c == ASSIGNMENT_COLUMN);

        let mut records = Vec::new();
        for (row, result) in reader.records().enumerate() {
            let raw = result?;
            let id = raw.get(id_index).unwrap_or("");
            if id.trim().is_empty() {
                return Err(Error::StoreCorrupt(format!("row {} has no id", row + 1)));
            }

            let mut record = Record::new(id, "");
            if let Some(index) = assignment_index {
                record.assigned_to = raw.get(index).unwrap_or("").to_string();
            }
            for (index, header) in columns.iter().enumerate() {
                if index == id_index || Some(index) == assignment_index {
                    continue;
                }
                let value = raw.get(index).unwrap_or("");
                record.values.insert(header.clone(), value.to_string());
            }
            records.push(record);
        }

        Ok(Self { columns, records })
    }

    /// SHA-256 over the CSV encoding, hex encoded
    pub fn content_digest(&self) -> Result<String> {
        Ok(digest_hex(&self.to_csv()?))
    }
}

/// Count of records per category for one annotator
///
/// Records with an empty category are counted under `""`.
pub fn category_distribution(records: &[Record]) -> BTreeMap<String, usize> {
    let mut counts = BTreeMap::new();
    for record in records {
        *counts
            .entry(record.get(Field::Category).to_string())
            .or_insert(0) += 1;
    }
    counts
}

pub(crate) fn digest_hex(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}
