//! Database initialization
//!
//! Databases are created on first use. Table creation is idempotent so every
//! startup can run it.

use crate::record::Field;
use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::info;

/// Wait for a competing writer before reporting SQLITE_BUSY
const BUSY_TIMEOUT: Duration = Duration::from_millis(5000);

/// Open (creating if needed) a SQLite database with WAL and a busy timeout
pub async fn open_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    // Create parent directory if it doesn't exist
    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    // Pragmas set through the options apply to every pooled connection
    // WAL lets readers proceed while one writer commits
    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(BUSY_TIMEOUT);

    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    Ok(pool)
}

/// Open a per-annotator record database and make sure `records` exists
pub async fn init_record_database(db_path: &Path) -> Result<SqlitePool> {
    let pool = open_database(db_path).await?;
    create_records_table(&pool).await?;
    Ok(pool)
}

/// Open the progress database and make sure `progress` exists
pub async fn init_progress_database(db_path: &Path) -> Result<SqlitePool> {
    let pool = open_database(db_path).await?;
    create_progress_table(&pool).await?;
    Ok(pool)
}

/// `id` is intentionally not a key: imported data may repeat identifiers and
/// that has to surface as a corrupt store rather than a failed import.
pub async fn create_records_table(pool: &SqlitePool) -> Result<()> {
    let field_columns: Vec<String> = Field::ALL
        .iter()
        .map(|f| format!("{} TEXT", f.column()))
        .collect();

    let sql = format!(
        "CREATE TABLE IF NOT EXISTS records (
            id TEXT NOT NULL,
            assigned_to TEXT NOT NULL DEFAULT '',
            {}
        )",
        field_columns.join(",\n            ")
    );
    sqlx::query(&sql).execute(pool).await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_records_id ON records(id)")
        .execute(pool)
        .await?;

    Ok(())
}

pub async fn create_progress_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS progress (
            annotator TEXT PRIMARY KEY,
            cursor INTEGER NOT NULL DEFAULT 0,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}
