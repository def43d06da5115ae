//! Synchronization of one repository.
//!
//! A sync reads the manifest (reusing the cached `repomd.xml` inside the
//! expiry window), then decides per metadata type whether the cache is
//! fresh. Fresh caches are loaded as they are; anything else is
//! downloaded, verified, streamed through the parser and handed to the
//! cache strategy. Failures of `filelists` or `other` only degrade the
//! repository; without `primary` there is nothing to publish.

use std::{
    collections::BTreeMap,
    fmt,
    path::{Path, PathBuf},
    time::Duration,
};

use chrono::{DateTime, Utc};
use repodex_config::{CacheBackendKind, MetadataType, Repository};
use repodex_events::{CacheStatus, EventSink, ManifestSource, RebuildStats, SyncEvent};
use repodex_metadata::{MetadataEntry, MetadataParser, ParseError, RepoData, RepoMd};
use repodex_utils::fs::{ensure_dir_exists, file_age, safe_remove, write_atomic};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    cache::{open_strategy, CacheStrategy},
    constants::{DOWNLOAD_DIR, PROGRESS_INTERVAL, REPOMD_FILE, REPOMD_PATH},
    error::{FetchError, RepodexError, Result},
    failover::FailoverPolicy,
    fetch::{download_verified, fetch_bytes, resolve, Fetcher},
    query::PackageQuery,
    storage::RepoSack,
};

/// What happened to one metadata type during a sync.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KindOutcome {
    /// The cached copy matched the manifest and was reused.
    Fresh,
    /// The document was parsed into the cache.
    Rebuilt(RebuildStats),
    /// The manifest does not list the document.
    Absent,
    /// The document could not be synchronized.
    Failed(String),
}

impl fmt::Display for KindOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KindOutcome::Fresh => f.write_str("fresh"),
            KindOutcome::Rebuilt(stats) => {
                write!(
                    f,
                    "rebuilt (+{} -{} ={})",
                    stats.added, stats.removed, stats.unchanged
                )
            }
            KindOutcome::Absent => f.write_str("absent"),
            KindOutcome::Failed(cause) => write!(f, "failed: {cause}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepoStatus {
    Synced,
    /// Published, but some optional metadata is missing.
    Degraded,
    /// Nothing was published this cycle.
    Failed,
}

impl RepoStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepoStatus::Synced => "synced",
            RepoStatus::Degraded => "degraded",
            RepoStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for RepoStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-repository result of a sync.
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub repo_id: String,
    pub manifest: Option<ManifestSource>,
    pub revision: Option<String>,
    pub outcomes: BTreeMap<MetadataType, KindOutcome>,
    pub status: RepoStatus,
    /// Cause of a failed sync.
    pub error: Option<String>,
    pub package_count: usize,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    fn new(repo_id: &str) -> Self {
        Self {
            repo_id: repo_id.to_string(),
            manifest: None,
            revision: None,
            outcomes: BTreeMap::new(),
            status: RepoStatus::Failed,
            error: None,
            package_count: 0,
            finished_at: Utc::now(),
        }
    }

    pub fn is_failed(&self) -> bool {
        self.status == RepoStatus::Failed
    }
}

/// Settings of one synchronization run.
pub struct SyncOptions {
    pub backend: CacheBackendKind,
    pub kinds: Vec<MetadataType>,
    /// `None` trusts a cached manifest forever.
    pub expire: Option<Duration>,
    pub force: bool,
}

/// Synchronizes one repository into its cache directory.
pub struct Synchronizer<'a> {
    repo: &'a Repository,
    dir: PathBuf,
    options: SyncOptions,
    fetcher: &'a dyn Fetcher,
    events: &'a dyn EventSink,
}

/// Entry stream that drops per-package failures and reports progress.
struct Tracked<'a, I> {
    inner: I,
    repo_id: &'a str,
    kind: MetadataType,
    total: Option<u64>,
    events: &'a dyn EventSink,
    seen: u64,
    skipped: usize,
}

impl<I> Iterator for Tracked<'_, I>
where
    I: Iterator<Item = std::result::Result<MetadataEntry, ParseError>>,
{
    type Item = std::result::Result<MetadataEntry, ParseError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let item = self.inner.next()?;
            self.seen += 1;
            if self.seen % PROGRESS_INTERVAL == 0 {
                self.events.emit(SyncEvent::Progress {
                    repo_id: self.repo_id.to_string(),
                    kind: self.kind,
                    current: self.seen,
                    total: self.total,
                });
            }
            match item {
                Err(err) if !err.is_fatal() => {
                    warn!(repo = self.repo_id, kind = %self.kind, "skipping package: {err}");
                    self.skipped += 1;
                }
                item => return Some(item),
            }
        }
    }
}

impl<'a> Synchronizer<'a> {
    pub fn new(
        repo: &'a Repository,
        dir: &Path,
        options: SyncOptions,
        fetcher: &'a dyn Fetcher,
        events: &'a dyn EventSink,
    ) -> Self {
        Self {
            repo,
            dir: dir.to_path_buf(),
            options,
            fetcher,
            events,
        }
    }

    fn repo_id(&self) -> &str {
        &self.repo.id
    }

    /// Runs the sync. The sack is `None` when nothing could be published.
    pub fn run(self) -> (SyncReport, Option<RepoSack>) {
        let mut report = SyncReport::new(self.repo_id());
        self.events.emit(SyncEvent::RepoStarting {
            repo_id: self.repo_id().to_string(),
        });

        let result = self.sync(&mut report);
        report.finished_at = Utc::now();
        match result {
            Ok(sack) => {
                report.package_count = sack.len().unwrap_or(0);
                report.status = if report
                    .outcomes
                    .values()
                    .any(|o| matches!(o, KindOutcome::Failed(_)))
                {
                    RepoStatus::Degraded
                } else {
                    RepoStatus::Synced
                };
                info!(
                    repo = self.repo_id(),
                    packages = report.package_count,
                    status = %report.status,
                    "repository synchronized"
                );
                self.events.emit(SyncEvent::RepoComplete {
                    repo_id: self.repo_id().to_string(),
                    package_count: report.package_count,
                });
                (report, Some(sack))
            }
            Err(err) => {
                let cause = err.to_string();
                warn!(repo = self.repo_id(), "sync failed: {cause}");
                self.events.emit(SyncEvent::RepoFailed {
                    repo_id: self.repo_id().to_string(),
                    error: cause.clone(),
                });
                report.status = RepoStatus::Failed;
                report.error = Some(cause);
                (report, None)
            }
        }
    }

    fn sync(&self, report: &mut SyncReport) -> Result<RepoSack> {
        if let Err(err) = ensure_dir_exists(&self.dir) {
            warn!(repo = self.repo_id(), "{err}");
        }

        let mut policy = FailoverPolicy::new(self.repo.mirror_urls()?, self.repo.failover_method());
        let (manifest, source) = self.load_manifest(&mut policy)?;
        report.manifest = Some(source);
        report.revision.clone_from(&manifest.revision);
        self.events.emit(SyncEvent::ManifestLoaded {
            repo_id: self.repo_id().to_string(),
            source,
            revision: manifest.revision.clone(),
        });

        let mut strategy = open_strategy(self.options.backend, self.repo_id(), &self.dir);
        for &kind in &self.options.kinds {
            let outcome = self.sync_kind(strategy.as_mut(), &manifest, kind, &mut policy);
            let fatal = match &outcome {
                _ if kind != MetadataType::Primary => None,
                KindOutcome::Failed(cause) => Some(cause.clone()),
                KindOutcome::Absent => Some("is not listed in repomd.xml".to_string()),
                _ => None,
            };
            report.outcomes.insert(kind, outcome);
            if let Some(cause) = fatal {
                return Err(RepodexError::RepositoryUnavailable {
                    repo_id: self.repo_id().to_string(),
                    reason: format!("primary metadata {cause}"),
                });
            }
        }

        strategy.finish()
    }

    fn sync_kind(
        &self,
        strategy: &mut dyn CacheStrategy,
        manifest: &RepoMd,
        kind: MetadataType,
        policy: &mut FailoverPolicy,
    ) -> KindOutcome {
        let Some(data) = manifest.metadata(kind) else {
            debug!(repo = self.repo_id(), %kind, "not listed in manifest");
            strategy.discard(kind);
            return KindOutcome::Absent;
        };

        let state = strategy.state(kind, data);
        debug!(repo = self.repo_id(), %kind, ?state, "cache state");
        self.events.emit(SyncEvent::CacheStatus {
            repo_id: self.repo_id().to_string(),
            kind,
            state,
        });

        if state == CacheStatus::Fresh {
            match strategy.load(kind, data) {
                Ok(()) => return KindOutcome::Fresh,
                Err(err) => warn!(repo = self.repo_id(), %kind, "{err}"),
            }
        }

        match self.refresh(strategy, kind, data, policy) {
            Ok(stats) => {
                self.events.emit(SyncEvent::Rebuilt {
                    repo_id: self.repo_id().to_string(),
                    kind,
                    stats,
                });
                KindOutcome::Rebuilt(stats)
            }
            Err(err) => {
                let cause = err.to_string();
                warn!(repo = self.repo_id(), %kind, "{cause}");
                self.events.emit(SyncEvent::KindFailed {
                    repo_id: self.repo_id().to_string(),
                    kind,
                    error: cause.clone(),
                });
                strategy.discard(kind);
                KindOutcome::Failed(cause)
            }
        }
    }

    fn load_manifest(&self, policy: &mut FailoverPolicy) -> Result<(RepoMd, ManifestSource)> {
        let path = self.dir.join(REPOMD_FILE);

        if !self.options.force && self.manifest_is_recent(&path) {
            match RepoMd::load(&path) {
                Ok(manifest) => {
                    debug!(repo = self.repo_id(), "reusing cached repomd.xml");
                    return Ok((manifest, ManifestSource::Cached));
                }
                Err(err) => warn!(repo = self.repo_id(), "{err}"),
            }
        }

        let (url, bytes) = self.with_failover(policy, None, |base| -> std::result::Result<_, FetchError> {
            let url = resolve(base, REPOMD_PATH)?;
            self.fetching(None, &url);
            fetch_bytes(self.fetcher, &url).map(|bytes| (url, bytes))
        })?;
        let manifest = RepoMd::parse(bytes.as_slice(), url.as_str())?;

        if let Err(err) = write_atomic(&path, &bytes) {
            warn!(repo = self.repo_id(), "cannot cache repomd.xml: {err}");
        }
        Ok((manifest, ManifestSource::Downloaded))
    }

    fn manifest_is_recent(&self, path: &Path) -> bool {
        if !path.is_file() {
            return false;
        }
        match (self.options.expire, file_age(path)) {
            (None, _) => true,
            (Some(window), Some(age)) => age < window,
            (Some(_), None) => false,
        }
    }

    fn fetching(&self, kind: Option<MetadataType>, url: &Url) {
        self.events.emit(SyncEvent::Fetching {
            repo_id: self.repo_id().to_string(),
            kind,
            url: url.to_string(),
        });
    }

    /// Tries `attempt` against each mirror until one succeeds.
    fn with_failover<T>(
        &self,
        policy: &mut FailoverPolicy,
        kind: Option<MetadataType>,
        mut attempt: impl FnMut(&Url) -> std::result::Result<T, FetchError>,
    ) -> std::result::Result<T, FetchError> {
        policy.reset(0);
        let mut attempts = 0;
        let mut last = None;

        while let Some(base) = policy.get_server_url(None).cloned() {
            attempts += 1;
            match attempt(&base) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    warn!(
                        repo = self.repo_id(),
                        kind = kind.map(|k| k.as_str()),
                        mirror = %base,
                        "{err}"
                    );
                    self.events.emit(SyncEvent::MirrorFailed {
                        repo_id: self.repo_id().to_string(),
                        url: base.to_string(),
                        error: err.to_string(),
                    });
                    last = Some(Box::new(err));
                    policy.server_failed();
                }
            }
        }

        Err(FetchError::MirrorsExhausted {
            repo_id: self.repo_id().to_string(),
            attempts,
            last,
        })
    }

    fn download(
        &self,
        kind: MetadataType,
        data: &RepoData,
        policy: &mut FailoverPolicy,
    ) -> Result<PathBuf> {
        let downloads = self.dir.join(DOWNLOAD_DIR);
        ensure_dir_exists(&downloads)?;
        let dest = downloads.join(format!("{kind}-{}", data.basename()));
        let fetch_from = |base: &Url| -> std::result::Result<u64, FetchError> {
            let url = resolve(base, &data.location_href)?;
            self.fetching(Some(kind), &url);
            download_verified(self.fetcher, &url, &dest, &data.checksum)
        };

        // an explicit location base overrides the mirrors
        match &data.location_base {
            Some(base) => {
                let base = Url::parse(base).map_err(|source| {
                    FetchError::InvalidUrl {
                        url: base.clone(),
                        source,
                    }
                })?;
                fetch_from(&base)?;
            }
            None => {
                self.with_failover(policy, Some(kind), fetch_from)?;
            }
        }
        Ok(dest)
    }

    fn refresh(
        &self,
        strategy: &mut dyn CacheStrategy,
        kind: MetadataType,
        data: &RepoData,
        policy: &mut FailoverPolicy,
    ) -> Result<RebuildStats> {
        let path = self.download(kind, data, policy)?;
        let result = self.rebuild_from(strategy, kind, data, &path);
        if let Err(err) = safe_remove(&path) {
            warn!(repo = self.repo_id(), "{err}");
        }
        result
    }

    fn rebuild_from(
        &self,
        strategy: &mut dyn CacheStrategy,
        kind: MetadataType,
        data: &RepoData,
        path: &Path,
    ) -> Result<RebuildStats> {
        let parser = MetadataParser::open(path, self.repo_id())?;
        if parser.kind() != kind {
            return Err(RepodexError::UnexpectedDocument {
                document: data.location_href.clone(),
                expected: kind,
                found: parser.kind(),
            });
        }

        let mut tracked = Tracked {
            total: parser.expected_packages(),
            inner: parser,
            repo_id: self.repo_id(),
            kind,
            events: self.events,
            seen: 0,
            skipped: 0,
        };
        let mut stats = strategy.rebuild(kind, data, &mut tracked)?;
        stats.skipped += tracked.skipped;
        debug!(
            repo = self.repo_id(),
            %kind,
            packages = tracked.seen,
            skipped = tracked.skipped,
            "document parsed"
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use std::{fs, io::Write};

    use repodex_events::CollectorSink;
    use repodex_utils::hash::{calculate_checksum, ChecksumAlgorithm};

    use super::*;
    use crate::fetch::FileFetcher;

    const PRIMARY: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="2">
<package type="rpm">
  <name>tmux</name><arch>x86_64</arch>
  <version epoch="0" ver="3.4" rel="1"/>
  <checksum type="sha256" pkgid="YES">1111</checksum>
  <location href="Packages/tmux-3.4-1.x86_64.rpm"/>
</package>
<package type="rpm">
  <name>broken</name><arch>x86_64</arch>
  <version epoch="0" ver="1" rel="1"/>
  <location href="Packages/broken-1-1.x86_64.rpm"/>
</package>
</metadata>"#;

    /// Writes a repository with only a primary document under `root`.
    fn publish(root: &Path, filelists_href: Option<&str>) {
        let repodata = root.join("repodata");
        fs::create_dir_all(&repodata).unwrap();
        let primary = repodata.join("primary.xml");
        fs::write(&primary, PRIMARY).unwrap();
        let digest = calculate_checksum(&primary, ChecksumAlgorithm::Sha256).unwrap();

        let mut repomd = fs::File::create(repodata.join("repomd.xml")).unwrap();
        write!(
            repomd,
            r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <revision>42</revision>
  <data type="primary">
    <checksum type="sha256">{digest}</checksum>
    <location href="repodata/primary.xml"/>
  </data>"#
        )
        .unwrap();
        if let Some(href) = filelists_href {
            write!(
                repomd,
                r#"
  <data type="filelists">
    <checksum type="sha256">0000</checksum>
    <location href="{href}"/>
  </data>"#
            )
            .unwrap();
        }
        write!(repomd, "\n</repomd>").unwrap();
    }

    fn repo(root: &Path) -> Repository {
        Repository::new("local", vec![Url::from_directory_path(root).unwrap().to_string()])
    }

    fn options(kinds: &[MetadataType]) -> SyncOptions {
        SyncOptions {
            backend: CacheBackendKind::Serialized,
            kinds: kinds.to_vec(),
            expire: Some(Duration::from_secs(3600)),
            force: false,
        }
    }

    #[test]
    fn test_sync_skips_bad_packages() {
        let upstream = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        publish(upstream.path(), None);
        let repo = repo(upstream.path());
        let events = CollectorSink::default();

        let (report, sack) = Synchronizer::new(
            &repo,
            cache.path(),
            options(&[MetadataType::Primary]),
            &FileFetcher,
            &events,
        )
        .run();

        assert_eq!(report.status, RepoStatus::Synced);
        assert_eq!(report.manifest, Some(ManifestSource::Downloaded));
        assert_eq!(report.revision.as_deref(), Some("42"));
        assert_eq!(report.package_count, 1);
        let Some(KindOutcome::Rebuilt(stats)) = report.outcomes.get(&MetadataType::Primary) else {
            panic!("primary was not rebuilt");
        };
        assert_eq!(stats.added, 1);
        assert_eq!(stats.skipped, 1);
        assert!(sack.is_some());
        assert!(cache.path().join("repomd.xml").is_file());
        assert!(!cache.path().join("primary.xml").exists());
    }

    #[test]
    fn test_optional_failure_degrades() {
        let upstream = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        publish(upstream.path(), Some("repodata/missing-filelists.xml"));
        let repo = repo(upstream.path());
        let events = CollectorSink::default();

        let (report, sack) = Synchronizer::new(
            &repo,
            cache.path(),
            options(&[MetadataType::Primary, MetadataType::Filelists]),
            &FileFetcher,
            &events,
        )
        .run();

        assert_eq!(report.status, RepoStatus::Degraded);
        assert!(matches!(
            report.outcomes.get(&MetadataType::Filelists),
            Some(KindOutcome::Failed(_))
        ));
        assert!(sack.is_some());
        assert!(events
            .events()
            .iter()
            .any(|e| matches!(e, SyncEvent::MirrorFailed { .. })));
    }

    #[test]
    fn test_download_name_does_not_clobber_manifest() {
        let upstream = tempfile::tempdir().unwrap();
        let cache = tempfile::tempdir().unwrap();
        let nested = upstream.path().join("repodata").join("primary");
        fs::create_dir_all(&nested).unwrap();
        let primary = nested.join("repomd.xml");
        fs::write(&primary, PRIMARY).unwrap();
        let digest = calculate_checksum(&primary, ChecksumAlgorithm::Sha256).unwrap();
        fs::write(
            upstream.path().join("repodata").join("repomd.xml"),
            format!(
                r#"<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <data type="primary">
    <checksum type="sha256">{digest}</checksum>
    <location href="repodata/primary/repomd.xml"/>
  </data>
</repomd>"#
            ),
        )
        .unwrap();
        let repo = repo(upstream.path());
        let events = CollectorSink::default();

        let run = || {
            Synchronizer::new(
                &repo,
                cache.path(),
                options(&[MetadataType::Primary]),
                &FileFetcher,
                &events,
            )
            .run()
        };
        let (report, _) = run();
        assert_eq!(report.status, RepoStatus::Synced);
        assert!(cache.path().join(REPOMD_FILE).is_file());
        assert_eq!(fs::read_dir(cache.path().join(DOWNLOAD_DIR)).unwrap().count(), 0);

        let (report, _) = run();
        assert_eq!(report.manifest, Some(ManifestSource::Cached));
        assert_eq!(
            report.outcomes.get(&MetadataType::Primary),
            Some(&KindOutcome::Fresh)
        );
    }

    #[test]
    fn test_unreachable_repository_fails() {
        let cache = tempfile::tempdir().unwrap();
        let missing = cache.path().join("nowhere");
        let repo = repo(&missing);
        let events = CollectorSink::default();

        let (report, sack) = Synchronizer::new(
            &repo,
            &cache.path().join("local"),
            options(&[MetadataType::Primary]),
            &FileFetcher,
            &events,
        )
        .run();

        assert!(report.is_failed());
        assert!(sack.is_none());
        assert!(report.error.unwrap().contains("local"));
    }
}
