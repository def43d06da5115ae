//! Repository aggregation.
//!
//! [`RepoStorage`] owns one sack per configured repository and answers
//! queries over the union of the enabled ones. Every package it returns
//! carries the id of the repository it came from.
//!
//! Sacks are published behind a per-repository `RwLock`: readers never see
//! a sack in the middle of an exclude, and a sync only replaces a sack once
//! it is complete. Enabling or disabling a repository only drops the cached
//! list of enabled repositories.

use std::{
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, Mutex, PoisonError, RwLock,
    },
};

use rayon::prelude::*;
use repodex_config::{Config, Repository};
use repodex_events::{EventSinkHandle, NullSink};
use repodex_metadata::{ChangelogEntry, DepFlag, DepKind, Evr, Nevra};
use repodex_utils::fs::ensure_dir_exists;
use tracing::{debug, warn};

use crate::{
    database::SqliteSack,
    error::{RepodexError, Result},
    fetch::Fetcher,
    query::PackageQuery,
    sack::PackageSack,
    sync::{SyncOptions, SyncReport, Synchronizer},
    view::PackageView,
};

/// The sack of one repository, in memory or in its relational stores.
pub enum RepoSack {
    Memory(PackageSack),
    Store(SqliteSack),
}

impl RepoSack {
    fn query(&self) -> &dyn PackageQuery {
        match self {
            RepoSack::Memory(sack) => sack,
            RepoSack::Store(sack) => sack,
        }
    }

    /// Removes or hides every package whose name matches one of `patterns`.
    pub fn exclude(&mut self, patterns: &[&str]) -> Result<usize> {
        match self {
            RepoSack::Memory(sack) => Ok(sack.exclude(patterns)),
            RepoSack::Store(sack) => sack.exclude(patterns),
        }
    }

    /// Loads the lazy fields of a view from this sack's stores.
    pub fn load_details(&self, view: &mut PackageView) -> Result<()> {
        match self {
            RepoSack::Memory(_) => Ok(()),
            RepoSack::Store(sack) => sack.load_details(view),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            RepoSack::Memory(_) => "serialized",
            RepoSack::Store(_) => "relational",
        }
    }
}

impl PackageQuery for RepoSack {
    fn packages(&self) -> Result<Vec<PackageView>> {
        self.query().packages()
    }

    fn len(&self) -> Result<usize> {
        self.query().len()
    }

    fn find_by_identity(&self, nevra: &Nevra) -> Result<Vec<PackageView>> {
        self.query().find_by_identity(nevra)
    }

    fn find_by_name_arch(&self, name: &str, arch: Option<&str>) -> Result<Vec<PackageView>> {
        self.query().find_by_name_arch(name, arch)
    }

    fn find_by_id(&self, pkg_id: &str) -> Result<Vec<PackageView>> {
        self.query().find_by_id(pkg_id)
    }

    fn find_by_relation(&self, kind: DepKind, name: &str) -> Result<Vec<PackageView>> {
        self.query().find_by_relation(kind, name)
    }

    fn find_owning_file(&self, path: &str) -> Result<Vec<PackageView>> {
        self.query().find_owning_file(path)
    }

    fn find_providing_versioned(
        &self,
        name: &str,
        flags: DepFlag,
        evr: &Evr,
    ) -> Result<Vec<PackageView>> {
        self.query().find_providing_versioned(name, flags, evr)
    }

    fn search_names(&self, patterns: &[&str]) -> Result<Vec<PackageView>> {
        self.query().search_names(patterns)
    }

    fn changelog(&self, pkg_id: &str) -> Result<Vec<ChangelogEntry>> {
        self.query().changelog(pkg_id)
    }
}

struct RepoSlot {
    repo: Repository,
    enabled: AtomicBool,
    sack: RwLock<Option<RepoSack>>,
    report: Mutex<Option<SyncReport>>,
}

/// All configured repositories and their published sacks.
pub struct RepoStorage {
    config: Config,
    cache_root: PathBuf,
    fetcher: Arc<dyn Fetcher>,
    events: EventSinkHandle,
    repos: Vec<RepoSlot>,
    enabled_cache: Mutex<Option<Arc<Vec<usize>>>>,
}

impl RepoStorage {
    /// Prepares the cache directory and one empty slot per repository.
    ///
    /// Nothing is read from the network or the caches until
    /// [`RepoStorage::sync_all`].
    pub fn open(config: Config, fetcher: Arc<dyn Fetcher>) -> Result<Self> {
        let cache_root = config.get_cache_path()?;
        ensure_dir_exists(&cache_root)?;

        let repos = config
            .repositories
            .iter()
            .map(|repo| {
                RepoSlot {
                    enabled: AtomicBool::new(repo.is_enabled()),
                    repo: repo.clone(),
                    sack: RwLock::new(None),
                    report: Mutex::new(None),
                }
            })
            .collect::<Vec<_>>();
        debug!(
            cache = %cache_root.display(),
            repositories = repos.len(),
            "opened repository storage"
        );

        Ok(Self {
            config,
            cache_root,
            fetcher,
            events: Arc::new(NullSink),
            repos,
            enabled_cache: Mutex::new(None),
        })
    }

    /// Sends sync events to `events` instead of discarding them.
    pub fn with_events(mut self, events: EventSinkHandle) -> Self {
        self.events = events;
        self
    }

    pub fn cache_root(&self) -> &Path {
        &self.cache_root
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    fn slot(&self, repo_id: &str) -> Result<&RepoSlot> {
        self.repos
            .iter()
            .find(|slot| slot.repo.id == repo_id)
            .ok_or_else(|| RepodexError::UnknownRepository(repo_id.to_string()))
    }

    pub fn repository(&self, repo_id: &str) -> Option<&Repository> {
        self.slot(repo_id).ok().map(|slot| &slot.repo)
    }

    /// Every configured repository with its enabled flag, in config order.
    pub fn repositories(&self) -> impl Iterator<Item = (&Repository, bool)> {
        self.repos
            .iter()
            .map(|slot| (&slot.repo, slot.enabled.load(Ordering::Acquire)))
    }

    pub fn is_enabled(&self, repo_id: &str) -> bool {
        self.slot(repo_id)
            .is_ok_and(|slot| slot.enabled.load(Ordering::Acquire))
    }

    /// Enables or disables a repository without touching its sack.
    pub fn set_enabled(&self, repo_id: &str, enabled: bool) -> Result<()> {
        let slot = self.slot(repo_id)?;
        if slot.enabled.swap(enabled, Ordering::AcqRel) != enabled {
            *self.enabled_cache.lock()? = None;
            debug!(repo = repo_id, enabled, "repository toggled");
        }
        Ok(())
    }

    /// Indices of the enabled repositories, computed once per change.
    fn enabled(&self) -> Result<Arc<Vec<usize>>> {
        let mut cache = self.enabled_cache.lock()?;
        if let Some(enabled) = cache.as_ref() {
            return Ok(Arc::clone(enabled));
        }
        let enabled: Arc<Vec<usize>> = Arc::new(
            self.repos
                .iter()
                .enumerate()
                .filter(|(_, slot)| slot.enabled.load(Ordering::Acquire))
                .map(|(i, _)| i)
                .collect(),
        );
        *cache = Some(Arc::clone(&enabled));
        Ok(enabled)
    }

    /// Ids of the enabled repositories, in config order.
    pub fn enabled_ids(&self) -> Result<Vec<String>> {
        Ok(self
            .enabled()?
            .iter()
            .map(|&i| self.repos[i].repo.id.clone())
            .collect())
    }

    fn sync_slot(&self, slot: &RepoSlot, force: bool) -> Result<SyncReport> {
        let repo = &slot.repo;
        let options = SyncOptions {
            backend: self.config.backend(),
            kinds: self.config.metadata_types(),
            expire: repo.metadata_expire(self.config.metadata_expire.as_deref())?,
            force,
        };
        let dir = self.cache_root.join(&repo.id);
        let (mut report, sack) =
            Synchronizer::new(repo, &dir, options, self.fetcher.as_ref(), self.events.as_ref())
                .run();

        if let Some(mut sack) = sack {
            let patterns: Vec<&str> = repo.excludes().iter().map(String::as_str).collect();
            if !patterns.is_empty() {
                let hidden = sack.exclude(&patterns)?;
                report.package_count = report.package_count.saturating_sub(hidden);
            }
            debug!(
                repo = %repo.id,
                backend = sack.backend_name(),
                packages = report.package_count,
                "publishing package sack"
            );
            *slot.sack.write().unwrap_or_else(PoisonError::into_inner) = Some(sack);
        }
        *slot.report.lock().unwrap_or_else(PoisonError::into_inner) = Some(report.clone());
        Ok(report)
    }

    /// Synchronizes every enabled repository.
    ///
    /// A repository that fails keeps whatever sack it had before. The error
    /// of a failed repository is returned only when it is configured with
    /// `skip_if_unavailable = false`.
    pub fn sync_all(&self, force: bool) -> Result<Vec<SyncReport>> {
        let enabled = self.enabled()?;
        let run = |&i: &usize| {
            let slot = &self.repos[i];
            self.sync_slot(slot, force).map_err(|err| (slot, err))
        };

        let results: Vec<_> = if self.config.parallel() {
            enabled.par_iter().map(run).collect()
        } else {
            enabled.iter().map(run).collect()
        };

        let mut reports = Vec::with_capacity(results.len());
        for result in results {
            let report = match result {
                Ok(report) => report,
                Err((slot, err)) => {
                    warn!(repo = %slot.repo.id, "{err}");
                    if !slot.repo.skip_if_unavailable() {
                        return Err(err);
                    }
                    continue;
                }
            };
            if report.is_failed() && !self.repository_optional(&report.repo_id) {
                return Err(RepodexError::RepositoryUnavailable {
                    repo_id: report.repo_id.clone(),
                    reason: report.error.clone().unwrap_or_default(),
                });
            }
            reports.push(report);
        }

        debug!(
            repositories = reports.len(),
            failed = reports.iter().filter(|r| r.is_failed()).count(),
            "sync finished"
        );
        Ok(reports)
    }

    fn repository_optional(&self, repo_id: &str) -> bool {
        self.repository(repo_id)
            .map_or(true, Repository::skip_if_unavailable)
    }

    /// Report of the last sync of a repository.
    pub fn last_report(&self, repo_id: &str) -> Result<Option<SyncReport>> {
        Ok(self.slot(repo_id)?.report.lock()?.clone())
    }

    /// Whether a sack has been published for the repository.
    pub fn is_loaded(&self, repo_id: &str) -> Result<bool> {
        Ok(self.slot(repo_id)?.sack.read()?.is_some())
    }

    /// Excludes packages of one repository by name pattern.
    pub fn exclude(&self, repo_id: &str, patterns: &[&str]) -> Result<usize> {
        let slot = self.slot(repo_id)?;
        let mut guard = slot.sack.write()?;
        match guard.as_mut() {
            Some(sack) => sack.exclude(patterns),
            None => Ok(0),
        }
    }

    /// Loads the lazy fields of a view from the repository it came from.
    pub fn load_details(&self, view: &mut PackageView) -> Result<()> {
        let slot = self.slot(view.repo_id())?;
        let guard = slot.sack.read()?;
        match guard.as_ref() {
            Some(sack) => sack.load_details(view),
            None => Ok(()),
        }
    }

    fn union<F>(&self, query: F) -> Result<Vec<PackageView>>
    where
        F: Fn(&RepoSack) -> Result<Vec<PackageView>>,
    {
        let mut found = Vec::new();
        for &i in self.enabled()?.iter() {
            let guard = self.repos[i].sack.read()?;
            if let Some(sack) = guard.as_ref() {
                found.extend(query(sack)?);
            }
        }
        Ok(found)
    }

    /// Drops every published sack, closing the relational stores they hold,
    /// and releases the event sink so a channel receiver sees the hang-up.
    pub fn close(self) {
        let mut released = 0;
        for slot in self.repos {
            let sack = slot.sack.into_inner().unwrap_or_else(PoisonError::into_inner);
            if let Some(sack) = sack {
                debug!(repo = %slot.repo.id, backend = sack.backend_name(), "releasing sack");
                drop(sack);
                released += 1;
            }
        }
        drop(self.events);
        debug!(released, "repository storage closed");
    }
}

impl PackageQuery for RepoStorage {
    fn packages(&self) -> Result<Vec<PackageView>> {
        self.union(|sack| sack.packages())
    }

    fn len(&self) -> Result<usize> {
        let mut total = 0;
        for &i in self.enabled()?.iter() {
            if let Some(sack) = self.repos[i].sack.read()?.as_ref() {
                total += sack.len()?;
            }
        }
        Ok(total)
    }

    fn find_by_identity(&self, nevra: &Nevra) -> Result<Vec<PackageView>> {
        self.union(|sack| sack.find_by_identity(nevra))
    }

    fn find_by_name_arch(&self, name: &str, arch: Option<&str>) -> Result<Vec<PackageView>> {
        self.union(|sack| sack.find_by_name_arch(name, arch))
    }

    fn find_by_id(&self, pkg_id: &str) -> Result<Vec<PackageView>> {
        self.union(|sack| sack.find_by_id(pkg_id))
    }

    fn find_by_relation(&self, kind: DepKind, name: &str) -> Result<Vec<PackageView>> {
        self.union(|sack| sack.find_by_relation(kind, name))
    }

    fn find_owning_file(&self, path: &str) -> Result<Vec<PackageView>> {
        self.union(|sack| sack.find_owning_file(path))
    }

    fn find_providing(&self, name: &str) -> Result<Vec<PackageView>> {
        self.union(|sack| sack.find_providing(name))
    }

    fn find_providing_versioned(
        &self,
        name: &str,
        flags: DepFlag,
        evr: &Evr,
    ) -> Result<Vec<PackageView>> {
        self.union(|sack| sack.find_providing_versioned(name, flags, evr))
    }

    fn search_names(&self, patterns: &[&str]) -> Result<Vec<PackageView>> {
        let mut found = self.union(|sack| sack.search_names(patterns))?;
        found.sort_by(|a, b| {
            a.nevra()
                .cmp(b.nevra())
                .then_with(|| a.repo_id().cmp(b.repo_id()))
        });
        Ok(found)
    }

    /// Changelog of the first enabled repository that has one for `pkg_id`.
    fn changelog(&self, pkg_id: &str) -> Result<Vec<ChangelogEntry>> {
        for &i in self.enabled()?.iter() {
            if let Some(sack) = self.repos[i].sack.read()?.as_ref() {
                let log = sack.changelog(pkg_id)?;
                if !log.is_empty() {
                    return Ok(log);
                }
            }
        }
        Ok(Vec::new())
    }
}
