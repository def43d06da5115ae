//! Database connection management.
//!
//! Each metadata type of each repository lives in its own SQLite file
//! (`primary.sqlite`, `filelists.sqlite`, `other.sqlite`). A store whose
//! recorded format version differs from [`DB_VERSION`], or which cannot be
//! opened or migrated at all, is deleted and recreated empty so the next
//! sync rebuilds it in full.

use std::path::{Path, PathBuf};

use diesel::{
    sql_query, sql_types::Integer, Connection, ConnectionError, QueryableByName, RunQueryDsl,
    SqliteConnection,
};
use repodex_config::MetadataType;
use repodex_utils::fs::safe_remove;
use tracing::{debug, warn};

use crate::{
    error::Result,
    migration::apply_migrations,
};

/// Format version of the row schema. Bump whenever the tables change.
pub const DB_VERSION: i32 = 10;

/// File name of the store for a metadata type.
pub fn store_file_name(kind: MetadataType) -> String {
    format!("{}.sqlite", kind.as_str())
}

#[derive(Debug, QueryableByName)]
struct VersionOnly {
    #[diesel(sql_type = Integer)]
    dbversion: i32,
}

/// Database connection wrapper with migration support.
pub struct DbConnection {
    conn: SqliteConnection,
    kind: MetadataType,
}

impl DbConnection {
    /// Opens a store and runs migrations.
    ///
    /// # Errors
    ///
    /// Returns an error if the connection fails or migrations fail.
    pub fn open<P: AsRef<Path>>(path: P, kind: MetadataType) -> std::result::Result<Self, ConnectionError> {
        let path_str = path.as_ref().to_string_lossy();
        let mut conn = SqliteConnection::establish(&path_str)?;

        // WAL mode for better concurrent access
        sql_query("PRAGMA journal_mode = WAL;")
            .execute(&mut conn)
            .map_err(|e| ConnectionError::BadConnection(e.to_string()))?;

        apply_migrations(&mut conn, kind)
            .map_err(|e| ConnectionError::BadConnection(e.to_string()))?;

        Ok(Self { conn, kind })
    }

    /// Opens a store, recreating it when it is unreadable or was written
    /// with a different [`DB_VERSION`].
    ///
    /// The second value is `true` when an existing store was discarded.
    pub fn open_checked<P: AsRef<Path>>(path: P, kind: MetadataType) -> Result<(Self, bool)> {
        let path = path.as_ref();

        let reason = match Self::open(path, kind) {
            Ok(mut db) => {
                match db.stored_version() {
                    Ok(None) => return Ok((db, false)),
                    Ok(Some(version)) if version == DB_VERSION => return Ok((db, false)),
                    Ok(Some(version)) => format!("format version {version}, expected {DB_VERSION}"),
                    Err(err) => err.to_string(),
                }
            }
            Err(err) => err.to_string(),
        };

        warn!(path = %path.display(), %reason, "discarding unusable {} store", kind);
        remove_store(path)?;

        let db = Self::open(path, kind)?;
        Ok((db, true))
    }

    /// Format version recorded in `db_info`, if a sync ever completed.
    pub fn stored_version(&mut self) -> Result<Option<i32>> {
        let rows = sql_query("SELECT dbversion FROM db_info LIMIT 1")
            .load::<VersionOnly>(&mut self.conn)?;
        Ok(rows.first().map(|r| r.dbversion))
    }

    pub fn kind(&self) -> MetadataType {
        self.kind
    }

    /// Gets a mutable reference to the underlying connection.
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.conn
    }
}

impl std::ops::Deref for DbConnection {
    type Target = SqliteConnection;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl std::ops::DerefMut for DbConnection {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

/// Removes a store file along with its WAL and shared-memory siblings.
pub fn remove_store(path: &Path) -> Result<()> {
    for suffix in ["", "-wal", "-shm"] {
        let mut file = PathBuf::from(path);
        file.as_mut_os_string().push(suffix);
        safe_remove(&file)?;
    }
    debug!(path = %path.display(), "removed store");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_creates_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(store_file_name(MetadataType::Primary));

        let (mut db, reset) = DbConnection::open_checked(&path, MetadataType::Primary).unwrap();
        assert!(!reset);
        assert_eq!(db.stored_version().unwrap(), None);
        assert!(path.exists());
    }

    #[test]
    fn test_version_mismatch_recreates_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(store_file_name(MetadataType::Other));

        {
            let mut db = DbConnection::open(&path, MetadataType::Other).unwrap();
            sql_query("INSERT INTO db_info (dbversion, checksum) VALUES (9, 'abc')")
                .execute(db.conn())
                .unwrap();
        }

        let (mut db, reset) = DbConnection::open_checked(&path, MetadataType::Other).unwrap();
        assert!(reset);
        assert_eq!(db.stored_version().unwrap(), None);
    }

    #[test]
    fn test_garbage_file_recreates_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(store_file_name(MetadataType::Filelists));
        std::fs::write(&path, b"definitely not sqlite, just some bytes padding the header out")
            .unwrap();

        let (_db, reset) = DbConnection::open_checked(&path, MetadataType::Filelists).unwrap();
        assert!(reset);
    }
}
