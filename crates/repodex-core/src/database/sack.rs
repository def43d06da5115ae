//! Package queries answered from the relational stores.
//!
//! Rows come back as [`PackageView::FromStore`] with only their scalar
//! columns filled; dependencies and file lists stay pending until
//! [`SqliteSack::load_details`] is called for the view.

use std::collections::{BTreeMap, HashSet};

use repodex_db::{
    models::primary::PackageRow,
    FilelistsRepository, OtherRepository, PrimaryRepository,
};
use repodex_metadata::{ChangelogEntry, DepFlag, DepKind, Dependency, Evr, Nevra};
use tracing::debug;

use super::connection::StoreHandle;
use crate::{
    error::Result,
    query::{is_glob, PackageQuery},
    view::{PackageView, StoredPackage},
};

/// One repository's packages, backed by its SQLite stores.
pub struct SqliteSack {
    repo_id: String,
    primary: StoreHandle,
    filelists: Option<StoreHandle>,
    other: Option<StoreHandle>,
    excluded: HashSet<i32>,
}

impl SqliteSack {
    pub fn new(
        repo_id: impl Into<String>,
        primary: StoreHandle,
        filelists: Option<StoreHandle>,
        other: Option<StoreHandle>,
    ) -> Self {
        Self {
            repo_id: repo_id.into(),
            primary,
            filelists,
            other,
            excluded: HashSet::new(),
        }
    }

    pub fn repo_id(&self) -> &str {
        &self.repo_id
    }

    fn views(&self, rows: Vec<PackageRow>) -> Vec<PackageView> {
        let mut seen = HashSet::new();
        rows.into_iter()
            .filter(|row| !self.excluded.contains(&row.pkg_key) && seen.insert(row.pkg_key))
            .map(|row| {
                let key = row.pkg_key;
                PackageView::FromStore(StoredPackage::new(key, row.into_record(&self.repo_id)))
            })
            .collect()
    }

    fn rows_named(&self, patterns: &[&str]) -> Result<Vec<PackageRow>> {
        let mut rows = Vec::new();
        for pattern in patterns {
            let pattern = *pattern;
            if is_glob(pattern) {
                rows.extend(
                    self.primary
                        .with_conn(|conn| PrimaryRepository::find_by_name_glob(conn, pattern))?,
                );
            } else {
                rows.extend(
                    self.primary
                        .with_conn(|conn| PrimaryRepository::find_by_name(conn, pattern, None))?,
                );
            }
        }
        Ok(rows)
    }

    /// Hides every package whose name matches one of `patterns`.
    ///
    /// The stores are left untouched; returns the number of packages newly
    /// hidden.
    pub fn exclude(&mut self, patterns: &[&str]) -> Result<usize> {
        let rows = self.rows_named(patterns)?;
        let hidden = rows
            .iter()
            .filter(|row| self.excluded.insert(row.pkg_key))
            .count();
        if hidden > 0 {
            debug!(repo = %self.repo_id, hidden, ?patterns, "excluded packages");
        }
        Ok(hidden)
    }

    /// Fills the pending dependency and file fields of `view`.
    ///
    /// Files come from the filelists store when it is available, otherwise
    /// from the subset primary carries. Views already loaded, or from
    /// another repository, are left as they are.
    pub fn load_details(&self, view: &mut PackageView) -> Result<()> {
        let PackageView::FromStore(stored) = view else {
            return Ok(());
        };
        if stored.is_loaded() || stored.scalars().repo_id != self.repo_id {
            return Ok(());
        }

        let key = stored.pkg_key();
        let relations = self.primary.with_conn(|conn| {
            let mut relations = BTreeMap::new();
            for kind in DepKind::ALL {
                let deps = PrimaryRepository::dependencies(conn, kind, key)?;
                if !deps.is_empty() {
                    relations.insert(kind, deps.iter().map(|d| d.to_dependency()).collect());
                }
            }
            Ok(relations)
        })?;

        let rows = match &self.filelists {
            Some(filelists) => {
                let pkg_id = stored.scalars().pkg_id.clone();
                filelists.with_conn(|conn| FilelistsRepository::files_for(conn, &pkg_id))?
            }
            None => self.primary.with_conn(|conn| PrimaryRepository::files(conn, key))?,
        };
        let files = rows
            .into_iter()
            .map(|row| {
                let kind = row.file_kind();
                (row.name, kind)
            })
            .collect();

        stored.set_relations(relations);
        stored.set_files(files);
        Ok(())
    }

    fn provides_of(&self, pkg_key: i32) -> Result<Vec<Dependency>> {
        let rows = self
            .primary
            .with_conn(|conn| PrimaryRepository::dependencies(conn, DepKind::Provides, pkg_key))?;
        Ok(rows.iter().map(|r| r.to_dependency()).collect())
    }
}

fn pkg_key(view: &PackageView) -> Option<i32> {
    match view {
        PackageView::FromStore(stored) => Some(stored.pkg_key()),
        PackageView::InMemory(_) => None,
    }
}

impl PackageQuery for SqliteSack {
    fn packages(&self) -> Result<Vec<PackageView>> {
        let rows = self.primary.with_conn(PrimaryRepository::list_all)?;
        Ok(self.views(rows))
    }

    fn len(&self) -> Result<usize> {
        let count = self.primary.with_conn(PrimaryRepository::count)?;
        Ok(usize::try_from(count).unwrap_or(0).saturating_sub(self.excluded.len()))
    }

    fn find_by_identity(&self, nevra: &Nevra) -> Result<Vec<PackageView>> {
        let rows = self
            .primary
            .with_conn(|conn| PrimaryRepository::find_by_nevra(conn, nevra))?;
        Ok(self.views(rows))
    }

    fn find_by_name_arch(&self, name: &str, arch: Option<&str>) -> Result<Vec<PackageView>> {
        let rows = self
            .primary
            .with_conn(|conn| PrimaryRepository::find_by_name(conn, name, arch))?;
        Ok(self.views(rows))
    }

    fn find_by_id(&self, pkg_id: &str) -> Result<Vec<PackageView>> {
        let row = self
            .primary
            .with_conn(|conn| PrimaryRepository::find_by_pkg_id(conn, pkg_id))?;
        Ok(self.views(row.into_iter().collect()))
    }

    fn find_by_relation(&self, kind: DepKind, name: &str) -> Result<Vec<PackageView>> {
        let rows = self
            .primary
            .with_conn(|conn| PrimaryRepository::find_with_dependency(conn, kind, name))?;
        Ok(self.views(rows))
    }

    /// Owners from the primary file subset and, when loaded, the full
    /// filelists.
    fn find_owning_file(&self, path: &str) -> Result<Vec<PackageView>> {
        let mut rows = self
            .primary
            .with_conn(|conn| PrimaryRepository::find_owning_file(conn, path))?;
        if let Some(filelists) = &self.filelists {
            let owners = filelists.with_conn(|conn| FilelistsRepository::owners(conn, path))?;
            if !owners.is_empty() {
                rows.extend(
                    self.primary
                        .with_conn(|conn| PrimaryRepository::find_by_pkg_ids(conn, &owners))?,
                );
            }
        }
        rows.sort_by_key(|row| row.pkg_key);
        Ok(self.views(rows))
    }

    fn find_providing_versioned(
        &self,
        name: &str,
        flags: DepFlag,
        evr: &Evr,
    ) -> Result<Vec<PackageView>> {
        let wanted = Dependency::versioned(
            name,
            flags,
            Some(&evr.epoch),
            &evr.version,
            Some(&evr.release),
        );

        let mut found = Vec::new();
        for view in self.find_by_relation(DepKind::Provides, name)? {
            let Some(key) = pkg_key(&view) else { continue };
            if self.provides_of(key)?.iter().any(|p| wanted.satisfied_by(p)) {
                found.push(view);
            }
        }
        if name.starts_with('/') {
            found.extend(self.find_owning_file(name)?);
        }
        // a package name is an implicit provide
        for view in self.find_by_name_arch(name, None)? {
            if wanted.matches_evr(&view.evr()) {
                found.push(view);
            }
        }

        let mut seen = HashSet::new();
        found.retain(|view| seen.insert(pkg_key(view)));
        Ok(found)
    }

    fn search_names(&self, patterns: &[&str]) -> Result<Vec<PackageView>> {
        let mut views = self.views(self.rows_named(patterns)?);
        views.sort_by(|a, b| a.nevra().cmp(b.nevra()));
        Ok(views)
    }

    fn changelog(&self, pkg_id: &str) -> Result<Vec<ChangelogEntry>> {
        let Some(other) = &self.other else {
            return Ok(Vec::new());
        };
        let rows = other.with_conn(|conn| OtherRepository::changelog_for(conn, pkg_id))?;
        Ok(rows.into_iter().map(ChangelogEntry::from).collect())
    }
}
