//! Incremental SQLite cache.
//!
//! Each metadata type of a repository lives in its own store. A rebuild
//! diffs the document against the stored package ids: new packages are
//! inserted, vanished ones deleted and the rest left alone, all inside one
//! transaction that also records the new checksum. A store written with
//! another schema version is thrown away and rebuilt from scratch.

use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

use repodex_config::MetadataType;
use repodex_db::{
    repository::IncrementalStore, store_file_name, FilelistsRepository, OtherRepository,
    PrimaryRepository, SyncStats, DB_VERSION,
};
use repodex_events::{CacheStatus, RebuildStats};
use repodex_metadata::{MetadataEntry, RepoData};
use tracing::{debug, warn};

use super::{CacheStrategy, EntryStream};
use crate::{
    database::{SqliteSack, StoreHandle},
    error::{CacheError, RepodexError, Result},
    storage::RepoSack,
};

/// Relational cache for one repository.
pub struct RelationalCache {
    repo_id: String,
    dir: PathBuf,
    stores: BTreeMap<MetadataType, StoreHandle>,
}

impl RelationalCache {
    pub fn new(repo_id: impl Into<String>, dir: &Path) -> Self {
        Self {
            repo_id: repo_id.into(),
            dir: dir.to_path_buf(),
            stores: BTreeMap::new(),
        }
    }

    fn path(&self, kind: MetadataType) -> PathBuf {
        self.dir.join(store_file_name(kind))
    }

    fn store(&mut self, kind: MetadataType) -> Result<StoreHandle> {
        if let Some(store) = self.stores.get(&kind) {
            return Ok(store.clone());
        }
        let store = StoreHandle::open(self.path(kind), kind)?;
        self.stores.insert(kind, store.clone());
        Ok(store)
    }

    fn stored_checksum(store: &StoreHandle) -> Result<Option<(i32, String)>> {
        let info = match store.kind() {
            MetadataType::Primary => store.with_conn(PrimaryRepository::info)?,
            MetadataType::Filelists => store.with_conn(FilelistsRepository::info)?,
            MetadataType::Other => store.with_conn(OtherRepository::info)?,
        };
        Ok(info.map(|i| (i.dbversion, i.checksum)))
    }
}

fn rebuild_stats(stats: SyncStats) -> RebuildStats {
    RebuildStats {
        added: stats.added,
        removed: stats.removed,
        unchanged: stats.unchanged,
        skipped: stats.duplicates,
    }
}

fn sync_store<S, F>(
    store: &StoreHandle,
    checksum: &str,
    entries: &mut EntryStream<'_>,
    pick: F,
) -> Result<SyncStats>
where
    S: IncrementalStore,
    F: Fn(MetadataEntry) -> Option<S::Record>,
{
    let records = entries.filter_map(|entry| {
        match entry {
            Ok(entry) => pick(entry).map(Ok),
            Err(err) => Some(Err(RepodexError::from(err))),
        }
    });
    let mut conn = store.conn()?;
    S::sync::<_, RepodexError>(conn.conn(), checksum, records)
}

impl CacheStrategy for RelationalCache {
    fn state(&mut self, kind: MetadataType, data: &RepoData) -> CacheStatus {
        let stored = self
            .store(kind)
            .and_then(|store| Self::stored_checksum(&store));
        match stored {
            Ok(None) => CacheStatus::Missing,
            Ok(Some((version, checksum)))
                if version == DB_VERSION && checksum == data.checksum.value =>
            {
                CacheStatus::Fresh
            }
            Ok(Some(_)) => CacheStatus::Stale,
            Err(err) => {
                warn!(repo = %self.repo_id, %kind, "cannot read store: {err}");
                self.stores.remove(&kind);
                CacheStatus::Missing
            }
        }
    }

    fn load(&mut self, kind: MetadataType, data: &RepoData) -> std::result::Result<(), CacheError> {
        let path = self.path(kind);
        let corrupt = |reason: String| {
            CacheError::Corrupt {
                path: path.clone(),
                reason,
            }
        };
        let store = self.store(kind).map_err(|err| corrupt(err.to_string()))?;
        match Self::stored_checksum(&store).map_err(|err| corrupt(err.to_string()))? {
            Some((_, checksum)) if checksum == data.checksum.value => {
                debug!(repo = %self.repo_id, %kind, "using cached store");
                Ok(())
            }
            Some((_, checksum)) => Err(corrupt(format!("recorded checksum {checksum}"))),
            None => Err(corrupt("store is empty".to_string())),
        }
    }

    fn rebuild(
        &mut self,
        kind: MetadataType,
        data: &RepoData,
        entries: &mut EntryStream<'_>,
    ) -> Result<RebuildStats> {
        let store = self.store(kind)?;
        let checksum = &data.checksum.value;
        let stats = match kind {
            MetadataType::Primary => {
                sync_store::<PrimaryRepository, _>(&store, checksum, entries, |e| {
                    match e {
                        MetadataEntry::Primary(p) => Some(p),
                        _ => None,
                    }
                })?
            }
            MetadataType::Filelists => {
                sync_store::<FilelistsRepository, _>(&store, checksum, entries, |e| {
                    match e {
                        MetadataEntry::Filelist(f) => Some(f),
                        _ => None,
                    }
                })?
            }
            MetadataType::Other => {
                sync_store::<OtherRepository, _>(&store, checksum, entries, |e| {
                    match e {
                        MetadataEntry::Other(o) => Some(o),
                        _ => None,
                    }
                })?
            }
        };
        Ok(rebuild_stats(stats))
    }

    fn discard(&mut self, kind: MetadataType) {
        self.stores.remove(&kind);
    }

    fn finish(self: Box<Self>) -> Result<RepoSack> {
        let mut this = *self;
        let Some(primary) = this.stores.remove(&MetadataType::Primary) else {
            return Err(RepodexError::MissingMetadata {
                repo_id: this.repo_id,
                kind: MetadataType::Primary,
            });
        };
        let filelists = this.stores.remove(&MetadataType::Filelists);
        let other = this.stores.remove(&MetadataType::Other);

        Ok(RepoSack::Store(SqliteSack::new(
            this.repo_id,
            primary,
            filelists,
            other,
        )))
    }
}
