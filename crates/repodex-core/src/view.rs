//! Read-only views over packages from either kind of sack.
//!
//! [`PackageView::InMemory`] wraps a record shared with a
//! [`PackageSack`](crate::sack::PackageSack). [`PackageView::FromStore`] is
//! read from a relational store and starts out with only the columns of the
//! `packages` table; dependencies and files are [`Loadable::Pending`] until
//! [`SqliteSack::load_details`](crate::database::SqliteSack::load_details)
//! has run. An empty file list therefore never stands in for "not loaded".

use std::{collections::BTreeMap, fmt, sync::Arc};

use repodex_metadata::{DepKind, Dependency, Evr, FileKind, Nevra, PackageRecord};

/// A field that may not have been read from the store yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loadable<T> {
    Pending,
    Loaded(T),
}

impl<T> Loadable<T> {
    pub fn is_loaded(&self) -> bool {
        matches!(self, Loadable::Loaded(_))
    }

    pub fn as_ref(&self) -> Loadable<&T> {
        match self {
            Loadable::Pending => Loadable::Pending,
            Loadable::Loaded(value) => Loadable::Loaded(value),
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Loadable<U> {
        match self {
            Loadable::Pending => Loadable::Pending,
            Loadable::Loaded(value) => Loadable::Loaded(f(value)),
        }
    }

    /// The value, or `None` while pending.
    pub fn loaded(self) -> Option<T> {
        match self {
            Loadable::Pending => None,
            Loadable::Loaded(value) => Some(value),
        }
    }
}

/// A package row from a relational store.
#[derive(Debug, Clone)]
pub struct StoredPackage {
    pkg_key: i32,
    /// Scalar columns; `relations` and `files` of this record are unused.
    record: PackageRecord,
    relations: Loadable<BTreeMap<DepKind, Vec<Dependency>>>,
    files: Loadable<BTreeMap<String, FileKind>>,
}

impl StoredPackage {
    pub fn new(pkg_key: i32, record: PackageRecord) -> Self {
        Self {
            pkg_key,
            record,
            relations: Loadable::Pending,
            files: Loadable::Pending,
        }
    }

    /// Surrogate key of the row in the primary store.
    pub fn pkg_key(&self) -> i32 {
        self.pkg_key
    }

    /// Scalar columns of the row.
    pub fn scalars(&self) -> &PackageRecord {
        &self.record
    }

    pub(crate) fn set_relations(&mut self, relations: BTreeMap<DepKind, Vec<Dependency>>) {
        self.relations = Loadable::Loaded(relations);
    }

    pub(crate) fn set_files(&mut self, files: BTreeMap<String, FileKind>) {
        self.files = Loadable::Loaded(files);
    }

    pub fn is_loaded(&self) -> bool {
        self.relations.is_loaded() && self.files.is_loaded()
    }

    /// A complete record, once every lazy field has been loaded.
    pub fn to_record(&self) -> Option<PackageRecord> {
        let (Loadable::Loaded(relations), Loadable::Loaded(files)) = (&self.relations, &self.files)
        else {
            return None;
        };
        let mut record = self.record.clone();
        record.relations = relations.clone();
        record.files = files.clone();
        Some(record)
    }
}

/// A package from either an in-memory or a relational sack.
#[derive(Debug, Clone)]
pub enum PackageView {
    InMemory(Arc<PackageRecord>),
    FromStore(StoredPackage),
}

impl PackageView {
    /// Scalar fields, which both variants always carry.
    fn base(&self) -> &PackageRecord {
        match self {
            PackageView::InMemory(record) => record,
            PackageView::FromStore(stored) => &stored.record,
        }
    }

    /// Tag of the repository the package came from.
    pub fn repo_id(&self) -> &str {
        &self.base().repo_id
    }

    pub fn pkg_id(&self) -> &str {
        &self.base().pkg_id
    }

    pub fn nevra(&self) -> &Nevra {
        &self.base().nevra
    }

    pub fn name(&self) -> &str {
        self.base().name()
    }

    pub fn arch(&self) -> &str {
        self.base().arch()
    }

    pub fn evr(&self) -> Evr {
        self.base().evr()
    }

    pub fn summary(&self) -> Option<&str> {
        self.base().summary.as_deref()
    }

    pub fn description(&self) -> Option<&str> {
        self.base().description.as_deref()
    }

    pub fn url(&self) -> Option<&str> {
        self.base().url.as_deref()
    }

    pub fn license(&self) -> Option<&str> {
        self.base().license.as_deref()
    }

    pub fn vendor(&self) -> Option<&str> {
        self.base().vendor.as_deref()
    }

    pub fn group(&self) -> Option<&str> {
        self.base().group.as_deref()
    }

    pub fn sourcerpm(&self) -> Option<&str> {
        self.base().sourcerpm.as_deref()
    }

    pub fn size_package(&self) -> u64 {
        self.base().size_package
    }

    pub fn size_installed(&self) -> u64 {
        self.base().size_installed
    }

    pub fn time_build(&self) -> u64 {
        self.base().time_build
    }

    pub fn location_href(&self) -> &str {
        &self.base().location_href
    }

    /// Dependencies of one kind. Always loaded for in-memory packages.
    pub fn dependencies(&self, kind: DepKind) -> Loadable<&[Dependency]> {
        match self {
            PackageView::InMemory(record) => Loadable::Loaded(record.dependencies(kind)),
            PackageView::FromStore(stored) => {
                stored
                    .relations
                    .as_ref()
                    .map(|r| r.get(&kind).map(Vec::as_slice).unwrap_or(&[]))
            }
        }
    }

    /// Files owned by the package. Always loaded for in-memory packages.
    pub fn files(&self) -> Loadable<&BTreeMap<String, FileKind>> {
        match self {
            PackageView::InMemory(record) => Loadable::Loaded(&record.files),
            PackageView::FromStore(stored) => stored.files.as_ref(),
        }
    }

    pub fn is_loaded(&self) -> bool {
        match self {
            PackageView::InMemory(_) => true,
            PackageView::FromStore(stored) => stored.is_loaded(),
        }
    }

    /// The complete record, if every field is available.
    pub fn to_record(&self) -> Option<Arc<PackageRecord>> {
        match self {
            PackageView::InMemory(record) => Some(Arc::clone(record)),
            PackageView::FromStore(stored) => stored.to_record().map(Arc::new),
        }
    }

    /// Whether both views describe the same package of the same repository.
    pub fn same_package(&self, other: &PackageView) -> bool {
        self.repo_id() == other.repo_id() && self.pkg_id() == other.pkg_id()
    }
}

impl From<Arc<PackageRecord>> for PackageView {
    fn from(record: Arc<PackageRecord>) -> Self {
        PackageView::InMemory(record)
    }
}

impl fmt::Display for PackageView {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.nevra().fmt(f)
    }
}

#[cfg(test)]
mod tests {
    use repodex_metadata::DepFlag;

    use super::*;

    fn record() -> PackageRecord {
        PackageRecord::new(
            "base",
            "f00d",
            Nevra::new("bash", None, "5.2.26", "3.fc40", "x86_64"),
        )
        .with_dependency(
            DepKind::Provides,
            Dependency::versioned("bash", DepFlag::EQ, Some("0"), "5.2.26", Some("3.fc40")),
        )
        .with_file("/usr/bin/bash", FileKind::File)
    }

    #[test]
    fn test_in_memory_is_always_loaded() {
        let view = PackageView::from(Arc::new(record()));
        assert!(view.is_loaded());
        assert_eq!(
            view.dependencies(DepKind::Provides).loaded().map(<[_]>::len),
            Some(1)
        );
        assert_eq!(view.files().loaded().map(BTreeMap::len), Some(1));
    }

    #[test]
    fn test_stored_starts_pending() {
        let mut bare = record();
        bare.relations.clear();
        bare.files.clear();
        let mut stored = StoredPackage::new(7, bare);

        let view = PackageView::FromStore(stored.clone());
        assert!(!view.is_loaded());
        assert_eq!(view.files(), Loadable::Pending);
        assert_eq!(view.dependencies(DepKind::Requires), Loadable::Pending);
        assert!(view.to_record().is_none());

        stored.set_relations(BTreeMap::new());
        stored.set_files(BTreeMap::new());
        let view = PackageView::FromStore(stored);
        assert!(view.is_loaded());
        // loaded and empty is a real answer now
        assert_eq!(view.files().loaded().map(BTreeMap::len), Some(0));
        assert_eq!(view.dependencies(DepKind::Requires), Loadable::Loaded(&[][..]));
    }

    #[test]
    fn test_accessors_and_display() {
        let view = PackageView::from(Arc::new(record()));
        assert_eq!(view.repo_id(), "base");
        assert_eq!(view.name(), "bash");
        assert_eq!(view.to_string(), "bash-5.2.26-3.fc40.x86_64");

        let other = PackageView::FromStore(StoredPackage::new(1, record()));
        assert!(view.same_package(&other));
    }
}
