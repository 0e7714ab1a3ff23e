//! Progress Tracker: durable per-annotator cursors
//!
//! The tracker knows nothing about record content and never validates a
//! cursor against the current sequence length; range checks belong to the
//! session coordinator.

use crate::db::init_progress_database;
use crate::Result;
use async_trait::async_trait;
use sqlx::SqlitePool;
use std::path::Path;
use tracing::debug;

#[async_trait]
pub trait ProgressTracker: Send + Sync {
    /// Last stored cursor for `annotator`, or 0 on first visit
    async fn get_cursor(&self, annotator: &str) -> Result<usize>;

    /// Insert-or-overwrite the cursor for `annotator` in one statement
    async fn set_cursor(&self, annotator: &str, value: usize) -> Result<()>;
}

/// Cursors stored in the `progress` table
#[derive(Clone)]
pub struct SqliteProgressTracker {
    pool: SqlitePool,
}

impl SqliteProgressTracker {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Open (creating if needed) the progress database at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        Ok(Self::new(init_progress_database(path).await?))
    }
}

#[async_trait]
impl ProgressTracker for SqliteProgressTracker {
    async fn get_cursor(&self, annotator: &str) -> Result<usize> {
        let stored: Option<i64> =
            sqlx::query_scalar("SELECT cursor FROM progress WHERE annotator = ?")
                .bind(annotator)
                .fetch_optional(&self.pool)
                .await?;

        Ok(stored.map(|v| v.max(0) as usize).unwrap_or(0))
    }

    async fn set_cursor(&self, annotator: &str, value: usize) -> Result<()> {
        let value = i64::try_from(value).unwrap_or(i64::MAX);

        sqlx::query(
            r#"
            INSERT INTO progress (annotator, cursor, updated_at)
            VALUES (?, ?, CURRENT_TIMESTAMP)
            ON CONFLICT(annotator) DO UPDATE SET
                cursor = excluded.cursor,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(annotator)
        .bind(value)
        .execute(&self.pool)
        .await?;

        debug!("Stored cursor {} for {}", value, annotator);
        Ok(())
    }
}
