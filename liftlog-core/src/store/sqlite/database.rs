//! Connection pool for the document database.
//!
//! The schema is one table (`migrations/001_documents.sql`):
//!
//! | Column | Holds |
//! |--------|-------|
//! | `path` | full document path, primary key |
//! | `collection` | every segment before the last, indexed for `list` |
//! | `doc_id` | last path segment |
//! | `data` | the document as JSON text |
//! | `updated_at` | unix seconds of the last write |
//!
//! Several CLI invocations may hold the file at once (a quota check while a
//! session flushes), so connections wait on a locked database instead of
//! failing immediately.

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::store::PersistenceError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Pool over the `documents` table.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open or create the database file at `path` and bring its schema up
    /// to date.
    pub async fn open(path: &Path) -> Result<Self, PersistenceError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", path.display()))?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(BUSY_TIMEOUT);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        tracing::debug!(path = %path.display(), "Opened document database");
        Ok(db)
    }

    /// Private in-memory database for tests, schema applied.
    pub async fn new_in_memory() -> Result<Self, PersistenceError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?
            .journal_mode(SqliteJournalMode::Wal);

        // A second connection would see a different in-memory database.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        let db = Self { pool };
        db.run_migrations().await?;
        Ok(db)
    }

    async fn run_migrations(&self) -> Result<(), PersistenceError> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| PersistenceError::Migration(e.to_string()))?;
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}
