use std::{
    fs,
    path::{Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
};

use repodex_config::{CacheBackendKind, Config, FailoverMethod, MetadataType, Repository};
use repodex_core::{
    view::Loadable, FetchError, Fetcher, FileFetcher, KindOutcome, PackageQuery, PackageView,
    RepoStatus, RepoStorage, RepodexError,
};
use repodex_events::{CollectorSink, ManifestSource, SyncEvent};
use repodex_metadata::DepKind;
use repodex_utils::hash::{calculate_checksum, ChecksumAlgorithm};
use rstest::rstest;
use tempfile::TempDir;
use url::Url;

/// Counts every document fetched through it.
#[derive(Default)]
struct CountingFetcher {
    fetches: AtomicUsize,
}

impl CountingFetcher {
    fn count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

impl Fetcher for CountingFetcher {
    fn fetch(&self, url: &Url) -> Result<Box<dyn std::io::Read>, FetchError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        FileFetcher.fetch(url)
    }
}

/// A `file://` repository whose content can be republished.
struct Upstream {
    root: TempDir,
}

impl Upstream {
    fn new() -> Self {
        Self {
            root: tempfile::tempdir().unwrap(),
        }
    }

    fn url(&self) -> String {
        Url::from_directory_path(self.root.path())
            .unwrap()
            .to_string()
    }

    fn repodata(&self) -> PathBuf {
        self.root.path().join("repodata")
    }

    /// Publishes `(pkg_id, name)` packages with a provide and a file each.
    fn publish(&self, revision: &str, packages: &[(&str, &str)]) {
        let repodata = self.repodata();
        fs::create_dir_all(&repodata).unwrap();

        let mut primary = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<metadata xmlns="http://linux.duke.edu/metadata/common" xmlns:rpm="http://linux.duke.edu/metadata/rpm" packages="{}">"#,
            packages.len()
        );
        let mut filelists = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<filelists xmlns="http://linux.duke.edu/metadata/filelists" packages="{}">"#,
            packages.len()
        );
        for (pkg_id, name) in packages {
            primary.push_str(&format!(
                r#"
<package type="rpm">
  <name>{name}</name><arch>x86_64</arch>
  <version epoch="0" ver="1.0" rel="1"/>
  <checksum type="sha256" pkgid="YES">{pkg_id}</checksum>
  <summary>The {name} package</summary>
  <location href="Packages/{name}-1.0-1.x86_64.rpm"/>
  <format>
    <rpm:provides>
      <rpm:entry name="lib{name}" flags="EQ" epoch="0" ver="1.0" rel="1"/>
    </rpm:provides>
  </format>
</package>"#
            ));
            filelists.push_str(&format!(
                r#"
<package pkgid="{pkg_id}" name="{name}" arch="x86_64">
  <version epoch="0" ver="1.0" rel="1"/>
  <file>/usr/bin/{name}</file>
</package>"#
            ));
        }
        primary.push_str("\n</metadata>\n");
        filelists.push_str("\n</filelists>\n");

        fs::write(repodata.join("primary.xml"), primary).unwrap();
        fs::write(repodata.join("filelists.xml"), filelists).unwrap();
        self.write_repomd(revision);
    }

    fn write_repomd(&self, revision: &str) {
        let repodata = self.repodata();
        let digest = |file: &str| {
            calculate_checksum(&repodata.join(file), ChecksumAlgorithm::Sha256).unwrap()
        };
        let repomd = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <revision>{revision}</revision>
  <data type="primary">
    <checksum type="sha256">{}</checksum>
    <location href="repodata/primary.xml"/>
  </data>
  <data type="filelists">
    <checksum type="sha256">{}</checksum>
    <location href="repodata/filelists.xml"/>
  </data>
</repomd>
"#,
            digest("primary.xml"),
            digest("filelists.xml"),
        );
        fs::write(repodata.join("repomd.xml"), repomd).unwrap();
    }
}

fn config(cache: &Path, backend: CacheBackendKind, repositories: Vec<Repository>) -> Config {
    let mut config = Config {
        cache_path: Some(cache.display().to_string()),
        backend: Some(backend),
        metadata_expire: Some("1h".to_string()),
        parallel: Some(false),
        metadata_types: Some(vec![MetadataType::Primary, MetadataType::Filelists]),
        repositories,
    };
    config.resolve().unwrap();
    config
}

fn names(views: &[PackageView]) -> Vec<String> {
    let mut names: Vec<_> = views.iter().map(|v| v.name().to_string()).collect();
    names.sort();
    names
}

#[rstest]
#[case::serialized(CacheBackendKind::Serialized)]
#[case::relational(CacheBackendKind::Relational)]
fn test_second_sync_within_expiry_fetches_nothing(#[case] backend: CacheBackendKind) {
    let upstream = Upstream::new();
    upstream.publish("1", &[("id-foo", "foo"), ("id-bar", "bar")]);
    let cache = tempfile::tempdir().unwrap();

    let repo = Repository::new("local", vec![upstream.url()]);
    let fetcher = Arc::new(CountingFetcher::default());
    let storage = RepoStorage::open(config(cache.path(), backend, vec![repo]), fetcher.clone())
        .unwrap();

    let reports = storage.sync_all(false).unwrap();
    assert_eq!(reports[0].status, RepoStatus::Synced);
    assert_eq!(reports[0].manifest, Some(ManifestSource::Downloaded));
    assert_eq!(reports[0].package_count, 2);
    assert_eq!(fetcher.count(), 3);

    let reports = storage.sync_all(false).unwrap();
    assert_eq!(fetcher.count(), 3);
    assert_eq!(reports[0].manifest, Some(ManifestSource::Cached));
    assert!(reports[0]
        .outcomes
        .values()
        .all(|outcome| *outcome == KindOutcome::Fresh));

    let owners = storage.find_providing("/usr/bin/foo").unwrap();
    assert_eq!(names(&owners), ["foo"]);
    assert_eq!(owners[0].repo_id(), "local");
    assert_eq!(names(&storage.find_providing("libbar").unwrap()), ["bar"]);
    storage.close();
}

#[test]
fn test_relational_sync_applies_only_the_difference() {
    let upstream = Upstream::new();
    upstream.publish("1", &[("id-a", "a"), ("id-b", "b"), ("id-c", "c")]);
    let cache = tempfile::tempdir().unwrap();

    let repo = Repository::new("local", vec![upstream.url()]);
    let storage = RepoStorage::open(
        config(cache.path(), CacheBackendKind::Relational, vec![repo]),
        Arc::new(FileFetcher),
    )
    .unwrap();
    storage.sync_all(false).unwrap();

    let key_of = |name: &str| {
        match &storage.find_by_name_arch(name, None).unwrap()[0] {
            PackageView::FromStore(stored) => stored.pkg_key(),
            PackageView::InMemory(_) => panic!("expected a stored package"),
        }
    };
    let (key_b, key_c) = (key_of("b"), key_of("c"));

    upstream.publish("2", &[("id-b", "b"), ("id-c", "c"), ("id-d", "d")]);
    let reports = storage.sync_all(true).unwrap();
    let Some(KindOutcome::Rebuilt(stats)) = reports[0].outcomes.get(&MetadataType::Primary)
    else {
        panic!("primary was not rebuilt");
    };
    assert_eq!((stats.added, stats.removed, stats.unchanged), (1, 1, 2));

    assert_eq!(names(&storage.packages().unwrap()), ["b", "c", "d"]);
    assert_eq!(key_of("b"), key_b);
    assert_eq!(key_of("c"), key_c);
    assert_eq!(reports[0].revision.as_deref(), Some("2"));
}

#[test]
fn test_stored_views_load_on_demand() {
    let upstream = Upstream::new();
    upstream.publish("1", &[("id-foo", "foo")]);
    let cache = tempfile::tempdir().unwrap();

    let repo = Repository::new("local", vec![upstream.url()]);
    let storage = RepoStorage::open(
        config(cache.path(), CacheBackendKind::Relational, vec![repo]),
        Arc::new(FileFetcher),
    )
    .unwrap();
    storage.sync_all(false).unwrap();

    let mut view = storage.find_by_id("id-foo").unwrap().remove(0);
    assert!(!view.files().is_loaded());
    assert!(matches!(view.dependencies(DepKind::Provides), Loadable::Pending));

    storage.load_details(&mut view).unwrap();
    let files = view.files().loaded().unwrap();
    assert!(files.contains_key("/usr/bin/foo"));
    assert!(view.to_record().is_some());
}

#[test]
fn test_tampered_snapshot_payload_is_still_fresh() {
    let upstream = Upstream::new();
    upstream.publish("1", &[("id-foo", "foo")]);
    let cache = tempfile::tempdir().unwrap();

    let repo = Repository::new("local", vec![upstream.url()]);
    let events = Arc::new(CollectorSink::default());
    let storage = RepoStorage::open(
        config(cache.path(), CacheBackendKind::Serialized, vec![repo]),
        Arc::new(FileFetcher),
    )
    .unwrap()
    .with_events(events.clone());
    storage.sync_all(false).unwrap();

    let snapshot = fs::read_dir(cache.path().join("local"))
        .unwrap()
        .map(|entry| entry.unwrap().path())
        .find(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.starts_with("primary.xml.") && name.ends_with(".snap"))
        })
        .unwrap();
    let mut bytes = fs::read(&snapshot).unwrap();
    let last = bytes.len() - 1;
    bytes[last] ^= 0xff;
    fs::write(&snapshot, bytes).unwrap();

    let before = events.len();
    let reports = storage.sync_all(false).unwrap();
    let statuses: Vec<_> = events.events()[before..]
        .iter()
        .filter_map(|event| {
            match event {
                SyncEvent::CacheStatus {
                    kind: MetadataType::Primary,
                    state,
                    ..
                } => Some(*state),
                _ => None,
            }
        })
        .collect();
    assert_eq!(statuses, [repodex_events::CacheStatus::Fresh]);

    // an unreadable payload falls back to a rebuild
    assert_eq!(reports[0].status, RepoStatus::Synced);
    assert_eq!(names(&storage.packages().unwrap()), ["foo"]);
}

#[test]
fn test_priority_failover_reaches_last_mirror() {
    let upstream = Upstream::new();
    upstream.publish("1", &[("id-foo", "foo")]);
    let cache = tempfile::tempdir().unwrap();
    let dead = tempfile::tempdir().unwrap();

    let mut repo = Repository::new(
        "local",
        vec![
            Url::from_directory_path(dead.path().join("a"))
                .unwrap()
                .to_string(),
            Url::from_directory_path(dead.path().join("b"))
                .unwrap()
                .to_string(),
            upstream.url(),
        ],
    );
    repo.failover = Some(FailoverMethod::Priority);

    let events = Arc::new(CollectorSink::default());
    let storage = RepoStorage::open(
        config(cache.path(), CacheBackendKind::Serialized, vec![repo]),
        Arc::new(FileFetcher),
    )
    .unwrap()
    .with_events(events.clone());

    let reports = storage.sync_all(false).unwrap();
    assert_eq!(reports[0].status, RepoStatus::Synced);

    let failed: Vec<_> = events
        .events()
        .iter()
        .filter_map(|event| {
            match event {
                SyncEvent::MirrorFailed { url, .. } => Some(url.clone()),
                _ => None,
            }
        })
        .collect();
    // two dead mirrors, walked once per document
    assert_eq!(failed.len(), 6);
    assert!(failed[0].ends_with("/a/"));
    assert!(failed[1].ends_with("/b/"));
}

#[test]
fn test_checksum_mismatch_moves_to_next_mirror() {
    let good = Upstream::new();
    good.publish("1", &[("id-foo", "foo")]);

    // same manifest, but a primary document that does not match it
    let bad = Upstream::new();
    bad.publish("1", &[("id-foo", "foo")]);
    fs::copy(good.repodata().join("repomd.xml"), bad.repodata().join("repomd.xml")).unwrap();
    fs::write(bad.repodata().join("primary.xml"), "<metadata packages=\"0\"/>").unwrap();

    let mut repo = Repository::new("local", vec![bad.url(), good.url()]);
    repo.failover = Some(FailoverMethod::Priority);
    let cache = tempfile::tempdir().unwrap();
    let events = Arc::new(CollectorSink::default());
    let storage = RepoStorage::open(
        config(cache.path(), CacheBackendKind::Relational, vec![repo]),
        Arc::new(FileFetcher),
    )
    .unwrap()
    .with_events(events.clone());

    let reports = storage.sync_all(false).unwrap();
    assert_eq!(reports[0].status, RepoStatus::Synced);
    assert_eq!(names(&storage.packages().unwrap()), ["foo"]);
    assert!(events.events().iter().any(|event| {
        matches!(event, SyncEvent::MirrorFailed { error, .. } if error.contains("Checksum mismatch"))
    }));
}

#[test]
fn test_required_repository_failure_is_an_error() {
    let cache = tempfile::tempdir().unwrap();
    let upstream = Upstream::new();
    upstream.publish("1", &[("id-foo", "foo")]);

    let optional = Repository::new("optional", vec!["file:///nonexistent/optional/".to_string()]);
    let mut required =
        Repository::new("required", vec!["file:///nonexistent/required/".to_string()]);
    required.skip_if_unavailable = Some(false);
    let good = Repository::new("good", vec![upstream.url()]);

    let storage = RepoStorage::open(
        config(
            cache.path(),
            CacheBackendKind::Serialized,
            vec![optional.clone(), good.clone()],
        ),
        Arc::new(FileFetcher),
    )
    .unwrap();
    let reports = storage.sync_all(false).unwrap();
    assert!(reports[0].is_failed());
    assert_eq!(reports[1].status, RepoStatus::Synced);
    assert_eq!(names(&storage.packages().unwrap()), ["foo"]);

    let storage = RepoStorage::open(
        config(cache.path(), CacheBackendKind::Serialized, vec![required, good]),
        Arc::new(FileFetcher),
    )
    .unwrap();
    assert!(matches!(
        storage.sync_all(false),
        Err(RepodexError::RepositoryUnavailable { ref repo_id, .. }) if repo_id == "required"
    ));
}

#[test]
fn test_configured_excludes_apply_after_sync() {
    let upstream = Upstream::new();
    upstream.publish("1", &[("id-foo", "foo"), ("id-foo-devel", "foo-devel")]);
    let cache = tempfile::tempdir().unwrap();

    let mut repo = Repository::new("local", vec![upstream.url()]);
    repo.exclude = Some(vec!["*-devel".to_string()]);
    let storage = RepoStorage::open(
        config(cache.path(), CacheBackendKind::Relational, vec![repo]),
        Arc::new(FileFetcher),
    )
    .unwrap();

    let reports = storage.sync_all(false).unwrap();
    assert_eq!(reports[0].package_count, 1);
    assert_eq!(names(&storage.packages().unwrap()), ["foo"]);
    assert!(storage.find_providing("/usr/bin/foo-devel").unwrap().is_empty());
}
