//! Repository pattern implementations for the three metadata stores.
//!
//! - [`PrimaryRepository`] - packages with their dependencies and primary files
//! - [`FilelistsRepository`] - complete file lists
//! - [`OtherRepository`] - changelogs
//!
//! All three are kept in step with the upstream documents through
//! [`IncrementalStore::sync`].

pub mod filelists;
pub mod other;
pub mod primary;

use std::collections::{HashMap, HashSet};

use diesel::{Connection, QueryResult, SqliteConnection};
use tracing::debug;

pub use filelists::FilelistsRepository;
pub use other::OtherRepository;
pub use primary::PrimaryRepository;

use crate::models::DbInfo;

/// Maximum number of keys bound in one `IN (...)` clause.
pub const DELETE_CHUNK: usize = 500;

/// Maximum number of rows in one multi-row insert.
pub const INSERT_CHUNK: usize = 1000;

/// Outcome of one incremental sync.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStats {
    /// Packages new in the document, inserted with their relation rows.
    pub added: usize,
    /// Packages no longer in the document, deleted with their relation rows.
    pub removed: usize,
    /// Packages present before and after; their rows were not touched.
    pub unchanged: usize,
    /// Repeated package ids within the document, ignored after the first.
    pub duplicates: usize,
}

/// A store whose package set is keyed by `pkg_id` and updated by diff.
pub trait IncrementalStore {
    /// Parsed record type this store persists.
    type Record;

    fn pkg_id(record: &Self::Record) -> &str;

    /// The `db_info` row, if a sync ever completed.
    fn info(conn: &mut SqliteConnection) -> QueryResult<Option<DbInfo>>;

    /// Replaces the `db_info` row with the current format version and
    /// `checksum`.
    fn set_info(conn: &mut SqliteConnection, checksum: &str) -> QueryResult<()>;

    /// Every stored `pkg_id` with its surrogate key.
    fn pkg_keys(conn: &mut SqliteConnection) -> QueryResult<HashMap<String, i32>>;

    /// Inserts a package and its relation rows, returning the new key.
    fn insert(conn: &mut SqliteConnection, record: &Self::Record) -> QueryResult<i32>;

    /// Deletes packages and every relation row referencing them.
    fn delete(conn: &mut SqliteConnection, pkg_keys: &[i32]) -> QueryResult<usize>;

    /// Brings the store in line with `records` and records `checksum`.
    ///
    /// Packages already stored are left untouched, new ones are inserted
    /// and those absent from `records` are deleted. Everything happens in
    /// one transaction: an `Err` from `records` or from the database rolls
    /// the store back to its previous contents and checksum.
    fn sync<I, E>(conn: &mut SqliteConnection, checksum: &str, records: I) -> Result<SyncStats, E>
    where
        I: IntoIterator<Item = Result<Self::Record, E>>,
        E: From<diesel::result::Error>,
    {
        conn.transaction(|conn| {
            let mut current = Self::pkg_keys(conn)?;
            let mut seen = HashSet::new();
            let mut stats = SyncStats::default();

            for record in records {
                let record = record?;
                let pkg_id = Self::pkg_id(&record);
                if !seen.insert(pkg_id.to_string()) {
                    stats.duplicates += 1;
                    continue;
                }
                if current.remove(pkg_id).is_some() {
                    stats.unchanged += 1;
                } else {
                    Self::insert(conn, &record)?;
                    stats.added += 1;
                }
            }

            let stale: Vec<i32> = current.into_values().collect();
            stats.removed = Self::delete(conn, &stale)?;
            Self::set_info(conn, checksum)?;

            debug!(
                added = stats.added,
                removed = stats.removed,
                unchanged = stats.unchanged,
                "store synchronized"
            );
            Ok(stats)
        })
    }
}
