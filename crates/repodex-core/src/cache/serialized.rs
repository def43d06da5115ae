//! Whole-document snapshot cache.
//!
//! Each metadata document is kept as one snapshot tagged with the manifest
//! checksum it was built from. A fresh snapshot is deserialized and the
//! document is never parsed; any other state reparses the document in full,
//! deletes older generations and writes a new snapshot. Failing to write
//! the snapshot is logged and otherwise ignored, the parsed data is still
//! used for this run.

use std::{
    collections::{BTreeMap, HashMap},
    path::{Path, PathBuf},
    sync::Arc,
};

use repodex_config::MetadataType;
use repodex_events::{CacheStatus, RebuildStats};
use repodex_metadata::{ChangelogRecord, FilelistEntry, MetadataEntry, PackageRecord, RepoData};
use tracing::{debug, warn};

use super::{snapshot, CacheStrategy, EntryStream};
use crate::{
    error::{CacheError, RepodexError, Result},
    sack::PackageSack,
    storage::RepoSack,
};

/// Snapshot cache for one repository.
pub struct SerializedCache {
    repo_id: String,
    dir: PathBuf,
    primary: Option<Vec<PackageRecord>>,
    filelists: Option<Vec<FilelistEntry>>,
    other: Option<Vec<ChangelogRecord>>,
}

impl SerializedCache {
    pub fn new(repo_id: impl Into<String>, dir: &Path) -> Self {
        Self {
            repo_id: repo_id.into(),
            dir: dir.to_path_buf(),
            primary: None,
            filelists: None,
            other: None,
        }
    }

    fn persist<T: serde::Serialize>(&self, data: &RepoData, payload: &T) {
        let path = snapshot::snapshot_path(&self.dir, data);
        let purged = snapshot::purge(&self.dir, data, None);
        if purged > 0 {
            debug!(repo = %self.repo_id, purged, "purged stale snapshots");
        }

        if let Err(err) = snapshot::write(&path, &data.checksum.value, payload) {
            warn!(repo = %self.repo_id, "{err}; continuing without a cache");
        }
    }
}

fn collect<T>(
    entries: &mut EntryStream<'_>,
    pick: impl Fn(MetadataEntry) -> Option<T>,
) -> Result<Vec<T>> {
    let mut out = Vec::new();
    for entry in entries {
        if let Some(item) = pick(entry?) {
            out.push(item);
        }
    }
    Ok(out)
}

impl CacheStrategy for SerializedCache {
    fn state(&mut self, _kind: MetadataType, data: &RepoData) -> CacheStatus {
        let path = snapshot::snapshot_path(&self.dir, data);
        if path.is_file() {
            return match snapshot::read_checksum(&path) {
                Ok(stored) if stored == data.checksum.value => CacheStatus::Fresh,
                Ok(_) => CacheStatus::Stale,
                Err(err) => {
                    warn!(repo = %self.repo_id, "{err}");
                    CacheStatus::Missing
                }
            };
        }

        if snapshot::generations(&self.dir, data).is_empty() {
            CacheStatus::Missing
        } else {
            CacheStatus::Stale
        }
    }

    fn load(&mut self, kind: MetadataType, data: &RepoData) -> std::result::Result<(), CacheError> {
        let path = snapshot::snapshot_path(&self.dir, data);
        let checksum = &data.checksum.value;
        match kind {
            MetadataType::Primary => self.primary = Some(snapshot::read(&path, checksum)?),
            MetadataType::Filelists => self.filelists = Some(snapshot::read(&path, checksum)?),
            MetadataType::Other => self.other = Some(snapshot::read(&path, checksum)?),
        }
        debug!(repo = %self.repo_id, %kind, "loaded snapshot {}", path.display());
        Ok(())
    }

    fn rebuild(
        &mut self,
        kind: MetadataType,
        data: &RepoData,
        entries: &mut EntryStream<'_>,
    ) -> Result<RebuildStats> {
        let added = match kind {
            MetadataType::Primary => {
                let records = collect(entries, |e| {
                    match e {
                        MetadataEntry::Primary(p) => Some(p),
                        _ => None,
                    }
                })?;
                self.persist(data, &records);
                let added = records.len();
                self.primary = Some(records);
                added
            }
            MetadataType::Filelists => {
                let lists = collect(entries, |e| {
                    match e {
                        MetadataEntry::Filelist(f) => Some(f),
                        _ => None,
                    }
                })?;
                self.persist(data, &lists);
                let added = lists.len();
                self.filelists = Some(lists);
                added
            }
            MetadataType::Other => {
                let logs = collect(entries, |e| {
                    match e {
                        MetadataEntry::Other(o) => Some(o),
                        _ => None,
                    }
                })?;
                self.persist(data, &logs);
                let added = logs.len();
                self.other = Some(logs);
                added
            }
        };

        Ok(RebuildStats {
            added,
            ..RebuildStats::default()
        })
    }

    fn discard(&mut self, kind: MetadataType) {
        match kind {
            MetadataType::Primary => self.primary = None,
            MetadataType::Filelists => self.filelists = None,
            MetadataType::Other => self.other = None,
        }
    }

    fn finish(self: Box<Self>) -> Result<RepoSack> {
        let this = *self;
        let Some(primary) = this.primary else {
            return Err(RepodexError::MissingMetadata {
                repo_id: this.repo_id,
                kind: MetadataType::Primary,
            });
        };

        let mut filelists: HashMap<String, BTreeMap<_, _>> = this
            .filelists
            .unwrap_or_default()
            .into_iter()
            .map(|entry| (entry.pkg_id, entry.files))
            .collect();

        let mut sack = PackageSack::new();
        for mut record in primary {
            // primary snapshots may come from an older run under another tag
            record.repo_id.clone_from(&this.repo_id);
            if let Some(files) = filelists.remove(&record.pkg_id) {
                record.files.extend(files);
            }
            sack.add(Arc::new(record));
        }
        for log in this.other.unwrap_or_default() {
            if !sack.find_by_id(&log.pkg_id).is_empty() {
                sack.set_changelog(log.pkg_id, log.changelog);
            }
        }

        debug!(repo = %this.repo_id, packages = sack.len(), "built in-memory sack");
        Ok(RepoSack::Memory(sack))
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Cursor};

    use repodex_metadata::{Checksum, MetadataParser};

    use super::*;

    const PRIMARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="1">
<package type="rpm">
  <name>zsh</name>
  <arch>x86_64</arch>
  <version epoch="0" ver="5.9" rel="4.fc40"/>
  <checksum type="sha256" pkgid="YES">aaaa</checksum>
  <summary>Powerful interactive shell</summary>
  <location href="Packages/z/zsh-5.9-4.fc40.x86_64.rpm"/>
  <format>
    <rpm:provides><rpm:entry name="zsh" flags="EQ" epoch="0" ver="5.9" rel="4.fc40"/></rpm:provides>
    <file>/usr/bin/zsh</file>
  </format>
</package>
</metadata>"#;

    const FILELISTS: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<filelists xmlns="http://linux.duke.edu/metadata/filelists" packages="1">
<package pkgid="aaaa" name="zsh" arch="x86_64">
  <version epoch="0" ver="5.9" rel="4.fc40"/>
  <file>/usr/bin/zsh</file>
  <file type="dir">/usr/share/zsh</file>
</package>
</filelists>"#;

    fn data(kind: &str, checksum: &str) -> RepoData {
        RepoData {
            data_type: kind.to_string(),
            location_href: format!("repodata/{checksum}-{kind}.xml.gz"),
            location_base: None,
            checksum: Checksum::new("sha256", checksum),
            open_checksum: None,
            timestamp: None,
            size: None,
            open_size: None,
            database_version: None,
        }
    }

    fn rebuild(cache: &mut SerializedCache, kind: MetadataType, data: &RepoData, xml: &str) {
        let mut parser = MetadataParser::new(Cursor::new(xml.as_bytes()), "doc", "base").unwrap();
        cache.rebuild(kind, data, &mut parser).unwrap();
    }

    #[test]
    fn test_missing_then_fresh() {
        let dir = tempfile::tempdir().unwrap();
        let primary = data("primary", "0123456789abcdef");

        let mut cache = SerializedCache::new("base", dir.path());
        assert_eq!(cache.state(MetadataType::Primary, &primary), CacheStatus::Missing);
        rebuild(&mut cache, MetadataType::Primary, &primary, PRIMARY);

        let mut cache = SerializedCache::new("base", dir.path());
        assert_eq!(cache.state(MetadataType::Primary, &primary), CacheStatus::Fresh);
        cache.load(MetadataType::Primary, &primary).unwrap();
        let RepoSack::Memory(sack) = Box::new(cache).finish().unwrap() else {
            panic!("expected an in-memory sack");
        };
        assert_eq!(sack.find_providing("zsh").len(), 1);
    }

    #[test]
    fn test_stale_generation_is_purged() {
        let dir = tempfile::tempdir().unwrap();
        let old = data("primary", "0000000011111111");
        let new = data("primary", "2222222233333333");

        let mut cache = SerializedCache::new("base", dir.path());
        rebuild(&mut cache, MetadataType::Primary, &old, PRIMARY);
        assert_eq!(cache.state(MetadataType::Primary, &new), CacheStatus::Stale);

        rebuild(&mut cache, MetadataType::Primary, &new, PRIMARY);
        let names: Vec<_> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names, ["primary.xml.gz.2222222233333333.snap"]);
    }

    #[test]
    fn test_filelists_merge_into_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut cache = SerializedCache::new("base", dir.path());
        rebuild(
            &mut cache,
            MetadataType::Primary,
            &data("primary", "aaaaaaaa00000000"),
            PRIMARY,
        );
        rebuild(
            &mut cache,
            MetadataType::Filelists,
            &data("filelists", "bbbbbbbb00000000"),
            FILELISTS,
        );

        let RepoSack::Memory(sack) = Box::new(cache).finish().unwrap() else {
            panic!("expected an in-memory sack");
        };
        assert_eq!(sack.find_owning_file("/usr/share/zsh").len(), 1);
    }

    #[test]
    fn test_unwritable_directory_still_yields_sack() {
        let dir = tempfile::tempdir().unwrap();
        let blocked = dir.path().join("not-a-dir");
        fs::write(&blocked, b"").unwrap();

        let mut cache = SerializedCache::new("base", &blocked);
        rebuild(
            &mut cache,
            MetadataType::Primary,
            &data("primary", "cccccccc00000000"),
            PRIMARY,
        );
        let RepoSack::Memory(sack) = Box::new(cache).finish().unwrap() else {
            panic!("expected an in-memory sack");
        };
        assert_eq!(sack.len(), 1);
    }

    #[test]
    fn test_finish_without_primary_fails() {
        let dir = tempfile::tempdir().unwrap();
        let cache = SerializedCache::new("base", dir.path());
        assert!(matches!(
            Box::new(cache).finish(),
            Err(RepodexError::MissingMetadata { .. })
        ));
    }
}
