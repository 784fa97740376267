//! Repository for the `paths` and `versions` tables.
//!
//! Paths and versions are written together: a version row cannot exist
//! without the path it refers to, and a path is only ever created because a
//! version referenced it.

use crate::Database;
use crate::error::{ErrorKind, Result};
use crate::models::RecordRow;
use exn::ResultExt;
use modindex_feed::{Record, VersionKind};
use sqlx::{SqliteConnection, SqlitePool};
use std::collections::{HashMap, HashSet};
use tracing::instrument;

/// Repository for reading the resume cursor and writing record batches.
///
/// # Relationships
///
/// - One path has many versions.
/// - A `(path, version)` pair is stored at most once; re-emitting it replaces
///   the stored timestamp.
/// - Nothing is ever deleted.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    dry_run: bool,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self { pool: db.pool().clone(), dry_run: false }
    }
}
impl Repository {
    /// Create a new repository with the given connection pool.
    pub fn new(pool: SqlitePool, dry_run: bool) -> Self {
        Self { pool, dry_run }
    }

    pub fn is_dry_run(&self) -> bool {
        self.dry_run
    }

    // =========================================================================
    // Cursor
    // =========================================================================

    /// The most recently published record in the store, or `None` for an
    /// empty store.
    ///
    /// This is the resume point of a synchronization: the feed is polled
    /// starting from its timestamp, and the feed's echo of it is expected as
    /// the first element of the response. Read-only.
    #[instrument(level = "debug", skip(self))]
    pub async fn last_record(&self) -> Result<Option<Record>> {
        let row: Option<RecordRow> = sqlx::query_as(include_str!("../queries/last_record.sql"))
            .fetch_optional(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        row.map(Record::try_from).transpose()
    }

    // =========================================================================
    // Insert
    // =========================================================================

    /// Write a batch of records in a single transaction, in the order given.
    ///
    /// Paths are looked up and created on first sighting. Versions use
    /// "insert or replace" on `(path, version)`, so a record the feed emits
    /// twice keeps the newest timestamp instead of failing the batch.
    ///
    /// Either every record is written or none is: any failure drops the
    /// transaction, which rolls it back. Returns the number of distinct
    /// `(path, version)` pairs written.
    #[instrument(skip_all, fields(records = records.len(), dry_run = self.dry_run))]
    pub async fn write_batch(&self, records: &[Record]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        if self.dry_run {
            let distinct: HashSet<(&str, &str)> =
                records.iter().map(|r| (r.path.as_str(), r.version.as_str())).collect();
            return u64::try_from(distinct.len()).or_raise(|| ErrorKind::InvalidData("batch size"));
        }
        let mut tx = self.pool.begin().await.or_raise(|| ErrorKind::Database)?;
        let mut path_ids: HashMap<&str, i64> = HashMap::new();
        let mut written: HashSet<(i64, &str)> = HashSet::new();
        for record in records {
            let path_id = match path_ids.get(record.path.as_str()) {
                Some(id) => *id,
                None => {
                    let id = Self::resolve_path(&mut tx, record).await?;
                    path_ids.insert(&record.path, id);
                    id
                },
            };
            let row = RecordRow::try_from(record)?;
            sqlx::query(include_str!("../queries/upsert_version.sql"))
                .bind(path_id)
                .bind(row.version)
                .bind(row.timestamp)
                .execute(&mut *tx)
                .await
                .or_raise(|| ErrorKind::Rejected(record.debug_string()))?;
            written.insert((path_id, record.version.as_str()));
        }
        tx.commit().await.or_raise(|| ErrorKind::Database)?;
        u64::try_from(written.len()).or_raise(|| ErrorKind::InvalidData("batch size"))
    }

    /// Find the id of the record's path, inserting it when this is the first
    /// sighting. Only the insert can reject the record; a failing lookup is a
    /// database problem.
    async fn resolve_path(conn: &mut SqliteConnection, record: &Record) -> Result<i64> {
        let path = record.path.as_str();
        let existing: Option<i64> = sqlx::query_scalar(include_str!("../queries/select_path_id.sql"))
            .bind(path)
            .fetch_optional(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Database)?;
        if let Some(id) = existing {
            return Ok(id);
        }
        tracing::trace!(path, "first sighting of path");
        let result = sqlx::query(include_str!("../queries/insert_path.sql"))
            .bind(path)
            .execute(&mut *conn)
            .await
            .or_raise(|| ErrorKind::Rejected(record.debug_string()))?;
        Ok(result.last_insert_rowid())
    }

    // =========================================================================
    // Counts
    // =========================================================================

    pub async fn count_paths(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_paths.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("path count"))
    }

    pub async fn count_versions(&self) -> Result<u64> {
        let count: i64 = sqlx::query_scalar(include_str!("../queries/count_versions.sql"))
            .fetch_one(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        u64::try_from(count).or_raise(|| ErrorKind::InvalidData("version count"))
    }

    // =========================================================================
    // Per-path
    // =========================================================================

    /// Every recorded version of `path`, oldest first.
    pub async fn versions_for_path(&self, path: impl AsRef<str>) -> Result<Vec<Record>> {
        let rows: Vec<RecordRow> = sqlx::query_as(include_str!("../queries/versions_for_path.sql"))
            .bind(path.as_ref())
            .fetch_all(&self.pool)
            .await
            .or_raise(|| ErrorKind::Database)?;
        rows.into_iter().map(Record::try_from).collect()
    }

    /// The version of `path` a user would most likely want: stable releases
    /// beat prereleases, which beat pseudo-versions. Within the same kind the
    /// most recently published wins.
    pub async fn latest_version(&self, path: impl AsRef<str>) -> Result<Option<Record>> {
        let versions = self.versions_for_path(path).await?;
        Ok(versions.into_iter().max_by(|a, b| {
            let a_key = (VersionKind::classify(&a.version), a.timestamp);
            let b_key = (VersionKind::classify(&b.version), b.timestamp);
            a_key.cmp(&b_key)
        }))
    }
}
