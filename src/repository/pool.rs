//! SQLite connection factory.
//!
//! Connections are cheap to open, so the pool hands out a fresh
//! `SyncConnectionWrapper` per operation instead of holding idle ones.

use std::path::Path;

use diesel::sqlite::SqliteConnection;
use diesel_async::sync_connection_wrapper::SyncConnectionWrapper;
use diesel_async::{AsyncConnection, SimpleAsyncConnection};

use super::util::to_diesel_error;

/// Diesel error type alias.
pub type DieselError = diesel::result::Error;

/// Async SQLite connection type.
pub type SqliteConn = SyncConnectionWrapper<SqliteConnection>;

/// Milliseconds a connection waits on a locked database before giving up.
const BUSY_TIMEOUT_MS: u32 = 30_000;

/// SQLite connection pool (creates connections on demand).
#[derive(Clone, Debug)]
pub struct DbPool {
    database_url: String,
}

impl DbPool {
    /// Create a pool from a database URL or bare file path.
    pub fn new(database_url: &str) -> Self {
        // Strip sqlite: prefix if present
        let url = database_url.strip_prefix("sqlite:").unwrap_or(database_url);
        Self {
            database_url: url.to_string(),
        }
    }

    /// Create pool from a file path.
    pub fn from_path(path: &Path) -> Self {
        Self::new(&path.display().to_string())
    }

    /// Open a connection with concurrency pragmas applied.
    pub async fn get(&self) -> Result<SqliteConn, DieselError> {
        let mut conn = SqliteConn::establish(&self.database_url)
            .await
            .map_err(to_diesel_error)?;
        conn.batch_execute(&format!(
            "PRAGMA busy_timeout = {BUSY_TIMEOUT_MS}; PRAGMA foreign_keys = ON;"
        ))
        .await?;
        Ok(conn)
    }

    /// Get the database URL.
    pub fn database_url(&self) -> &str {
        &self.database_url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strips_sqlite_prefix() {
        assert_eq!(DbPool::new("sqlite:/tmp/t.db").database_url(), "/tmp/t.db");
        assert_eq!(DbPool::new("/tmp/t.db").database_url(), "/tmp/t.db");
    }

    #[tokio::test]
    async fn test_get_opens_file_database() {
        let dir = tempfile::tempdir().unwrap();
        let pool = DbPool::from_path(&dir.path().join("pool.db"));
        let mut conn = pool.get().await.unwrap();
        conn.batch_execute("CREATE TABLE t (x INTEGER)").await.unwrap();
    }
}
