//! Shared handles to the relational metadata stores.

use std::{
    path::Path,
    sync::{Arc, Mutex, MutexGuard},
};

use diesel::{QueryResult, SqliteConnection};
use repodex_config::MetadataType;
use repodex_db::DbConnection;

use crate::error::{RepodexError, Result};

/// Thread-safe wrapper around one store connection.
pub struct StoreHandle {
    conn: Arc<Mutex<DbConnection>>,
    kind: MetadataType,
}

impl StoreHandle {
    /// Opens the store at `path`, recreating it when it cannot be used.
    pub fn open<P: AsRef<Path>>(path: P, kind: MetadataType) -> Result<Self> {
        let (conn, _) = DbConnection::open_checked(path, kind)?;
        Ok(Self::from_connection(conn))
    }

    pub fn from_connection(conn: DbConnection) -> Self {
        let kind = conn.kind();
        Self {
            conn: Arc::new(Mutex::new(conn)),
            kind,
        }
    }

    pub fn kind(&self) -> MetadataType {
        self.kind
    }

    /// Locks the connection.
    pub fn conn(&self) -> Result<MutexGuard<'_, DbConnection>> {
        self.conn.lock().map_err(|_| RepodexError::PoisonError)
    }

    /// Executes a function with the connection.
    pub fn with_conn<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut SqliteConnection) -> QueryResult<T>,
    {
        let mut conn = self.conn()?;
        Ok(f(conn.conn())?)
    }
}

impl Clone for StoreHandle {
    fn clone(&self) -> Self {
        Self {
            conn: self.conn.clone(),
            kind: self.kind,
        }
    }
}

#[cfg(test)]
mod tests {
    use repodex_db::{repository::IncrementalStore, PrimaryRepository};

    use super::*;

    #[test]
    fn test_with_conn_runs_queries() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreHandle::open(dir.path().join("primary.sqlite"), MetadataType::Primary)
            .unwrap();

        assert_eq!(store.kind(), MetadataType::Primary);
        assert_eq!(store.with_conn(PrimaryRepository::count).unwrap(), 0);
        assert!(store.with_conn(PrimaryRepository::info).unwrap().is_none());

        let shared = store.clone();
        assert_eq!(shared.with_conn(PrimaryRepository::count).unwrap(), 0);
    }
}
