//! Per-annotator SQLite store

use super::RecordStore;
use crate::db::init_record_database;
use crate::record::{Field, FieldEdits, Record, RecordId};
use crate::snapshot::DatasetSnapshot;
use crate::{Error, Result};
use async_trait::async_trait;
use sqlx::{Row, Sqlite, SqlitePool, Transaction};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Records of one annotator kept in `records` of their own database file
#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
    path: PathBuf,
}

impl SqliteRecordStore {
    /// Open (creating if needed) the database at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        let pool = init_record_database(path).await.map_err(|e| {
            Error::StoreUnavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        Ok(Self {
            pool,
            path: path.to_path_buf(),
        })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Replace every row with the records of `snapshot`, in order
    ///
    /// Columns outside the field catalogue are not stored.
    pub async fn import(&self, snapshot: &DatasetSnapshot) -> Result<()> {
        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM records").execute(&mut *tx).await?;

        let columns: Vec<&str> = Field::ALL.iter().map(|f| f.column()).collect();
        let placeholders = vec!["?"; columns.len() + 2].join(", ");
        let sql = format!(
            "INSERT INTO records (id, assigned_to, {}) VALUES ({})",
            columns.join(", "),
            placeholders
        );

        for record in &snapshot.records {
            let mut query = sqlx::query(&sql)
                .bind(record.id.as_str())
                .bind(record.assigned_to.as_str());
            for field in Field::ALL {
                query = query.bind(record.get(field));
            }
            query.execute(&mut *tx).await?;
        }

        tx.commit().await?;
        info!(
            "Imported {} records into {}",
            snapshot.len(),
            self.path.display()
        );
        Ok(())
    }

    /// Count rows carrying `id` and reject anything but exactly one
    async fn ensure_unique(tx: &mut Transaction<'_, Sqlite>, id: &RecordId) -> Result<()> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM records WHERE id = ?")
            .bind(id.as_str())
            .fetch_one(&mut **tx)
            .await?;

        match count {
            0 => Err(Error::RecordNotFound(id.to_string())),
            1 => Ok(()),
            n => Err(Error::StoreCorrupt(format!(
                "identifier {} occurs {} times",
                id, n
            ))),
        }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    fn describe(&self) -> String {
        format!("sqlite:{}", self.path.display())
    }

    async fn read_all(&self) -> Result<DatasetSnapshot> {
        let columns: Vec<&str> = Field::ALL.iter().map(|f| f.column()).collect();
        let sql = format!(
            "SELECT id, assigned_to, {} FROM records ORDER BY rowid",
            columns.join(", ")
        );

        let rows = sqlx::query(&sql).fetch_all(&self.pool).await.map_err(|e| {
            Error::StoreUnavailable(format!("cannot read {}: {}", self.path.display(), e))
        })?;

        let mut records = Vec::with_capacity(rows.len());
        for row in rows {
            let id: String = row.try_get("id")?;
            let assigned_to: Option<String> = row.try_get("assigned_to")?;
            let mut record = Record::new(id, assigned_to.unwrap_or_default());
            for field in Field::ALL {
                let value: Option<String> = row.try_get(field.column())?;
                record.set(field, value.unwrap_or_default());
            }
            records.push(record);
        }

        debug!("Read {} records from {}", records.len(), self.path.display());
        Ok(DatasetSnapshot::with_catalogue_columns(records))
    }

    async fn update_fields(&self, id: &RecordId, edits: &FieldEdits) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::ensure_unique(&mut tx, id).await?;

        if !edits.is_empty() {
            let assignments: Vec<String> = edits
                .keys()
                .map(|f| format!("{} = ?", f.column()))
                .collect();
            let sql = format!(
                "UPDATE records SET {} WHERE id = ?",
                assignments.join(", ")
            );

            let mut query = sqlx::query(&sql);
            for value in edits.values() {
                query = query.bind(value.as_str());
            }
            query.bind(id.as_str()).execute(&mut *tx).await?;
        }

        tx.commit().await?;
        info!(
            "Updated {} field(s) of record {} in {}",
            edits.len(),
            id,
            self.path.display()
        );
        Ok(())
    }

    async fn delete(&self, id: &RecordId) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        Self::ensure_unique(&mut tx, id).await?;

        sqlx::query("DELETE FROM records WHERE id = ?")
            .bind(id.as_str())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!("Deleted record {} from {}", id, self.path.display());
        Ok(())
    }
}
