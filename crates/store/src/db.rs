//! Opening the mirror database.

use exn::ResultExt;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous};
use std::path::Path;
use std::time::Duration;
use tracing::instrument;

use crate::error::{ErrorKind, Result};

static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

// The synchronizer writes one batch at a time from a single task; the second
// slot is for a concurrent `status` reader.
const FILE_CONNECTIONS: u32 = 2;
// Each connection to ":memory:" opens a separate, empty database.
const MEMORY_CONNECTIONS: u32 = 1;
const BUSY_TIMEOUT: Duration = Duration::from_millis(1500);

/// Handle to the SQLite mirror, migrated to the current schema.
///
/// Cheap to clone. Hand it to [`Repository::from`](crate::Repository) to read
/// the cursor and write batches.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (or create) the mirror stored at `path`.
    pub async fn connect(path: impl AsRef<Path>) -> Result<Self> {
        let options = tuned().filename(path.as_ref()).create_if_missing(true);
        Self::open(options, FILE_CONNECTIONS).await
    }

    /// Open a throwaway mirror that lives as long as the pool.
    ///
    /// Not gated on `cfg(test)`: other crates build their test fixtures on it.
    pub async fn connect_in_memory() -> Result<Self> {
        let options = tuned().filename(":memory:");
        Self::open(options, MEMORY_CONNECTIONS).await
    }

    #[instrument(level = "debug", skip(options))]
    async fn open(options: SqliteConnectOptions, connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(connections)
            .connect_with(options)
            .await
            .or_raise(|| ErrorKind::Database)?;
        MIGRATOR.run(&pool).await.or_raise(|| ErrorKind::Migration)?;
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Refresh planner statistics, then wait for every connection to come
    /// back and close it.
    pub async fn close(&self) {
        if let Err(err) = sqlx::query("PRAGMA optimize").execute(&self.pool).await {
            tracing::debug!(%err, "skipping PRAGMA optimize");
        }
        self.pool.close().await;
    }
}

/// Connection settings shared by file and in-memory mirrors. Every entry is
/// applied to each connection the pool opens.
fn tuned() -> SqliteConnectOptions {
    SqliteConnectOptions::new()
        .journal_mode(SqliteJournalMode::Wal)
        .foreign_keys(true)
        // A batch lost to power failure is fetched again on the next run: the
        // cursor only ever comes from committed rows.
        .synchronous(SqliteSynchronous::Normal)
        .busy_timeout(BUSY_TIMEOUT)
        // Batches are up to 2000 rows plus their paths; checkpoint less often
        // than the default 1000 pages.
        .pragma("wal_autocheckpoint", "2000")
        .pragma("cache_size", "-16384")
        .pragma("temp_store", "MEMORY")
}
