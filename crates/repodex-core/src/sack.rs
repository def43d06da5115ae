//! In-memory multi-index over package records.
//!
//! Every record is shared behind an `Arc` and entered into several hash
//! indices at once. [`PackageSack::remove`] is the exact inverse of
//! [`PackageSack::add`]: it drops the record from each index it was entered
//! into and prunes buckets that become empty.
//!
//! Two records are the same package when they carry the same repository
//! tag and `pkg_id`; adding a package that is already present is a no-op.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use repodex_metadata::{
    evr::normalize_epoch, ChangelogEntry, DepFlag, DepKind, Dependency, Evr, Nevra,
    PackageRecord,
};
use tracing::debug;

use crate::{
    error::Result,
    query::{self, match_package_names, NameMatches, PackageQuery},
    view::PackageView,
};

type Bucket = Vec<Arc<PackageRecord>>;

fn relation_slot(kind: DepKind) -> usize {
    match kind {
        DepKind::Provides => 0,
        DepKind::Requires => 1,
        DepKind::Conflicts => 2,
        DepKind::Obsoletes => 3,
    }
}

fn same(a: &PackageRecord, b: &PackageRecord) -> bool {
    a.pkg_id == b.pkg_id && a.repo_id == b.repo_id
}

fn push(index: &mut HashMap<String, Bucket>, key: &str, record: &Arc<PackageRecord>) {
    let bucket = index.entry(key.to_string()).or_default();
    if !bucket.iter().any(|r| Arc::ptr_eq(r, record)) {
        bucket.push(Arc::clone(record));
    }
}

fn pull(index: &mut HashMap<String, Bucket>, key: &str, record: &PackageRecord) {
    if let Some(bucket) = index.get_mut(key) {
        bucket.retain(|r| !same(r, record));
        if bucket.is_empty() {
            index.remove(key);
        }
    }
}

fn lookup(index: &HashMap<String, Bucket>, key: &str) -> Bucket {
    index.get(key).cloned().unwrap_or_default()
}

/// In-memory package index.
#[derive(Debug, Default, Clone)]
pub struct PackageSack {
    by_nevra: HashMap<Nevra, Bucket>,
    by_pkg_id: HashMap<String, Bucket>,
    by_name: HashMap<String, Bucket>,
    by_name_arch: HashMap<(String, String), Bucket>,
    relations: [HashMap<String, Bucket>; 4],
    files: HashMap<String, Bucket>,
    changelogs: HashMap<String, Vec<ChangelogEntry>>,
    count: usize,
}

impl PackageSack {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a sack from records, skipping repeated packages.
    pub fn from_records(records: impl IntoIterator<Item = PackageRecord>) -> Self {
        let mut sack = Self::new();
        for record in records {
            sack.add(Arc::new(record));
        }
        sack
    }

    pub fn contains(&self, record: &PackageRecord) -> bool {
        self.by_pkg_id
            .get(&record.pkg_id)
            .is_some_and(|bucket| bucket.iter().any(|r| same(r, record)))
    }

    /// Indexes `record` under every key it declares.
    ///
    /// Returns `false` if the package was already present.
    pub fn add(&mut self, record: Arc<PackageRecord>) -> bool {
        if self.contains(&record) {
            return false;
        }

        self.by_nevra
            .entry(record.nevra.clone())
            .or_default()
            .push(Arc::clone(&record));
        push(&mut self.by_pkg_id, &record.pkg_id, &record);
        push(&mut self.by_name, record.name(), &record);
        self.by_name_arch
            .entry((record.name().to_string(), record.arch().to_string()))
            .or_default()
            .push(Arc::clone(&record));

        for (kind, deps) in &record.relations {
            let index = &mut self.relations[relation_slot(*kind)];
            for dep in deps {
                push(index, &dep.name, &record);
            }
        }
        for path in record.files.keys() {
            push(&mut self.files, path, &record);
        }

        self.count += 1;
        true
    }

    /// Removes `record` from every index it was entered into.
    ///
    /// Returns `false` if the package was not present.
    ///
    /// Index keys are taken from the stored record, so a handle carrying only
    /// the package identity removes every entry the full record created.
    pub fn remove(&mut self, record: &PackageRecord) -> bool {
        let Some(stored) = self
            .by_pkg_id
            .get(&record.pkg_id)
            .and_then(|bucket| bucket.iter().find(|r| same(r, record)))
            .cloned()
        else {
            return false;
        };
        let record = stored.as_ref();

        if let Some(bucket) = self.by_nevra.get_mut(&record.nevra) {
            bucket.retain(|r| !same(r, record));
            if bucket.is_empty() {
                self.by_nevra.remove(&record.nevra);
            }
        }
        pull(&mut self.by_pkg_id, &record.pkg_id, record);
        pull(&mut self.by_name, record.name(), record);

        let name_arch = (record.name().to_string(), record.arch().to_string());
        if let Some(bucket) = self.by_name_arch.get_mut(&name_arch) {
            bucket.retain(|r| !same(r, record));
            if bucket.is_empty() {
                self.by_name_arch.remove(&name_arch);
            }
        }

        for (kind, deps) in &record.relations {
            let index = &mut self.relations[relation_slot(*kind)];
            for dep in deps {
                pull(index, &dep.name, record);
            }
        }
        for path in record.files.keys() {
            pull(&mut self.files, path, record);
        }

        if !self.by_pkg_id.contains_key(&record.pkg_id) {
            self.changelogs.remove(&record.pkg_id);
        }

        self.count -= 1;
        true
    }

    /// Attaches a changelog to a package id.
    pub fn set_changelog(&mut self, pkg_id: impl Into<String>, entries: Vec<ChangelogEntry>) {
        self.changelogs.insert(pkg_id.into(), entries);
    }

    pub fn changelog(&self, pkg_id: &str) -> &[ChangelogEntry] {
        self.changelogs
            .get(pkg_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every record, ordered by name then identity.
    pub fn packages(&self) -> Vec<Arc<PackageRecord>> {
        let mut all: Vec<_> = self.by_pkg_id.values().flatten().cloned().collect();
        all.sort_by(|a, b| a.nevra.cmp(&b.nevra).then_with(|| a.repo_id.cmp(&b.repo_id)));
        all
    }

    pub fn len(&self) -> usize {
        self.count
    }

    pub fn is_empty(&self) -> bool {
        self.count == 0
    }

    pub fn find_by_identity(&self, nevra: &Nevra) -> Bucket {
        self.by_nevra.get(nevra).cloned().unwrap_or_default()
    }

    /// Packages named `name`; all arches when `arch` is `None`.
    pub fn find_by_name_arch(&self, name: &str, arch: Option<&str>) -> Bucket {
        match arch {
            None => lookup(&self.by_name, name),
            Some(arch) => {
                self.by_name_arch
                    .get(&(name.to_string(), arch.to_string()))
                    .cloned()
                    .unwrap_or_default()
            }
        }
    }

    pub fn find_by_id(&self, pkg_id: &str) -> Bucket {
        lookup(&self.by_pkg_id, pkg_id)
    }

    pub fn find_by_relation(&self, kind: DepKind, name: &str) -> Bucket {
        lookup(&self.relations[relation_slot(kind)], name)
    }

    /// Providers of `name`, including owners of `name` when it is a path.
    pub fn find_providing(&self, name: &str) -> Bucket {
        let mut found = self.find_by_relation(DepKind::Provides, name);
        if name.starts_with('/') {
            for owner in lookup(&self.files, name) {
                if !found.iter().any(|f| Arc::ptr_eq(f, &owner)) {
                    found.push(owner);
                }
            }
        }
        found
    }

    pub fn find_requiring(&self, name: &str) -> Bucket {
        self.find_by_relation(DepKind::Requires, name)
    }

    pub fn find_conflicting_with(&self, name: &str) -> Bucket {
        self.find_by_relation(DepKind::Conflicts, name)
    }

    pub fn find_obsoleting(&self, name: &str) -> Bucket {
        self.find_by_relation(DepKind::Obsoletes, name)
    }

    pub fn find_owning_file(&self, path: &str) -> Bucket {
        lookup(&self.files, path)
    }

    /// Providers of `name` whose provided range overlaps `flags evr`.
    pub fn find_providing_versioned(&self, name: &str, flags: DepFlag, evr: &Evr) -> Bucket {
        let wanted = Dependency::versioned(
            name,
            flags,
            Some(&evr.epoch),
            &evr.version,
            Some(&evr.release),
        );
        let mut found: Bucket = self
            .find_providing(name)
            .into_iter()
            .filter(|r| (name.starts_with('/') && r.files.contains_key(name)) || r.provides(&wanted))
            .collect();
        // a package name is an implicit provide
        for record in lookup(&self.by_name, name) {
            if !found.iter().any(|f| Arc::ptr_eq(f, &record)) && record.provides(&wanted) {
                found.push(record);
            }
        }
        found
    }

    /// Newest records per (name, arch); ties keep every tied record.
    pub fn newest_by_name_arch(&self) -> BTreeMap<(String, String), Bucket> {
        query::newest_by_name_arch(self.by_pkg_id.values().flatten().cloned())
    }

    /// Newest records per name across arches; ties keep every tied record.
    pub fn newest_by_name(&self) -> BTreeMap<String, Bucket> {
        query::newest_by_name(self.by_pkg_id.values().flatten().cloned())
    }

    /// Records matching `name`, `epoch`, `version`, `release` and `arch`,
    /// each ignored when `None`.
    pub fn search_nevra(
        &self,
        name: Option<&str>,
        epoch: Option<&str>,
        version: Option<&str>,
        release: Option<&str>,
        arch: Option<&str>,
    ) -> Bucket {
        let candidates = match (name, arch) {
            (Some(name), arch) => self.find_by_name_arch(name, arch),
            (None, _) => self.packages(),
        };
        candidates
            .into_iter()
            .filter(|r| {
                let n = &r.nevra;
                epoch.map_or(true, |e| n.epoch == normalize_epoch(Some(e)))
                    && version.map_or(true, |v| n.version == v)
                    && release.map_or(true, |rel| n.release == rel)
                    && arch.map_or(true, |a| n.arch == a)
            })
            .collect()
    }

    /// Classifies `patterns` against the package names in the sack.
    pub fn match_package_names(&self, patterns: &[&str]) -> NameMatches {
        let mut names: Vec<&str> = self.by_name.keys().map(String::as_str).collect();
        names.sort_unstable();
        match_package_names(names, patterns)
    }

    /// Records whose name matches any of the glob `patterns`.
    pub fn search_names(&self, patterns: &[&str]) -> Bucket {
        let matches = self.match_package_names(patterns);
        let mut found: Bucket = matches
            .exact
            .iter()
            .chain(&matches.matched)
            .flat_map(|name| lookup(&self.by_name, name))
            .collect();
        found.sort_by(|a, b| a.nevra.cmp(&b.nevra));
        found
    }

    /// Removes every record whose name matches one of `patterns`.
    ///
    /// Returns the number of records removed.
    pub fn exclude(&mut self, patterns: &[&str]) -> usize {
        let doomed = self.search_names(patterns);
        let removed = doomed.iter().filter(|r| self.remove(r)).count();
        if removed > 0 {
            debug!(removed, ?patterns, "excluded packages");
        }
        removed
    }

    #[cfg(test)]
    fn index_keys(&self) -> BTreeMap<&'static str, Vec<String>> {
        fn sorted(mut keys: Vec<String>) -> Vec<String> {
            keys.sort();
            keys
        }

        let mut keys = BTreeMap::new();
        keys.insert(
            "nevra",
            sorted(self.by_nevra.keys().map(|n| n.to_string()).collect()),
        );
        keys.insert("pkg_id", sorted(self.by_pkg_id.keys().cloned().collect()));
        keys.insert("name", sorted(self.by_name.keys().cloned().collect()));
        keys.insert(
            "name_arch",
            sorted(
                self.by_name_arch
                    .keys()
                    .map(|(n, a)| format!("{n}.{a}"))
                    .collect(),
            ),
        );
        for kind in DepKind::ALL {
            keys.insert(
                kind.as_str(),
                sorted(self.relations[relation_slot(kind)].keys().cloned().collect()),
            );
        }
        keys.insert("files", sorted(self.files.keys().cloned().collect()));
        keys
    }

    #[cfg(test)]
    fn bucket_sizes(&self) -> usize {
        self.by_nevra.values().map(Vec::len).sum::<usize>()
            + self.by_pkg_id.values().map(Vec::len).sum::<usize>()
            + self.by_name.values().map(Vec::len).sum::<usize>()
            + self.by_name_arch.values().map(Vec::len).sum::<usize>()
            + self
                .relations
                .iter()
                .flat_map(|r| r.values())
                .map(Vec::len)
                .sum::<usize>()
            + self.files.values().map(Vec::len).sum::<usize>()
    }
}

fn views(records: Bucket) -> Vec<PackageView> {
    records.into_iter().map(PackageView::InMemory).collect()
}

impl PackageQuery for PackageSack {
    fn packages(&self) -> Result<Vec<PackageView>> {
        Ok(views(PackageSack::packages(self)))
    }

    fn len(&self) -> Result<usize> {
        Ok(self.count)
    }

    fn find_by_identity(&self, nevra: &Nevra) -> Result<Vec<PackageView>> {
        Ok(views(PackageSack::find_by_identity(self, nevra)))
    }

    fn find_by_name_arch(&self, name: &str, arch: Option<&str>) -> Result<Vec<PackageView>> {
        Ok(views(PackageSack::find_by_name_arch(self, name, arch)))
    }

    fn find_by_id(&self, pkg_id: &str) -> Result<Vec<PackageView>> {
        Ok(views(PackageSack::find_by_id(self, pkg_id)))
    }

    fn find_by_relation(&self, kind: DepKind, name: &str) -> Result<Vec<PackageView>> {
        Ok(views(PackageSack::find_by_relation(self, kind, name)))
    }

    fn find_owning_file(&self, path: &str) -> Result<Vec<PackageView>> {
        Ok(views(PackageSack::find_owning_file(self, path)))
    }

    fn find_providing_versioned(
        &self,
        name: &str,
        flags: DepFlag,
        evr: &Evr,
    ) -> Result<Vec<PackageView>> {
        Ok(views(PackageSack::find_providing_versioned(
            self, name, flags, evr,
        )))
    }

    fn search_names(&self, patterns: &[&str]) -> Result<Vec<PackageView>> {
        Ok(views(PackageSack::search_names(self, patterns)))
    }

    fn changelog(&self, pkg_id: &str) -> Result<Vec<ChangelogEntry>> {
        Ok(PackageSack::changelog(self, pkg_id).to_vec())
    }
}
