use std::{fs, sync::Arc};

use repodex_config::{Config, Repository};
use repodex_core::{FileFetcher, RepoStorage};
use serial_test::serial;
use url::Url;

struct EnvGuard {
    key: &'static str,
    previous: Option<String>,
}

impl EnvGuard {
    fn set(key: &'static str, value: &std::path::Path) -> Self {
        let previous = std::env::var(key).ok();
        std::env::set_var(key, value);
        Self { key, previous }
    }
}

impl Drop for EnvGuard {
    fn drop(&mut self) {
        match self.previous.take() {
            Some(value) => std::env::set_var(self.key, value),
            None => std::env::remove_var(self.key),
        }
    }
}

fn publish(root: &std::path::Path) {
    let repodata = root.join("repodata");
    fs::create_dir_all(&repodata).unwrap();
    fs::write(
        repodata.join("primary.xml"),
        r#"<metadata xmlns="http://linux.duke.edu/metadata/common" packages="0"></metadata>"#,
    )
    .unwrap();
    let digest = repodex_utils::hash::calculate_checksum(
        &repodata.join("primary.xml"),
        repodex_utils::hash::ChecksumAlgorithm::Sha256,
    )
    .unwrap();
    fs::write(
        repodata.join("repomd.xml"),
        format!(
            r#"<repomd xmlns="http://linux.duke.edu/metadata/repo">
  <data type="primary">
    <checksum type="sha256">{digest}</checksum>
    <location href="repodata/primary.xml"/>
  </data>
</repomd>"#
        ),
    )
    .unwrap();
}

#[test]
#[serial]
fn test_cache_env_overrides_config() {
    let upstream = tempfile::tempdir().unwrap();
    publish(upstream.path());
    let configured = tempfile::tempdir().unwrap();
    let env_cache = tempfile::tempdir().unwrap();
    let _guard = EnvGuard::set("REPODEX_CACHE", env_cache.path());

    let mut config = Config {
        cache_path: Some(configured.path().display().to_string()),
        ..Config::default()
    };
    config.repositories.push(Repository::new(
        "local",
        vec![Url::from_directory_path(upstream.path()).unwrap().to_string()],
    ));
    config.resolve().unwrap();

    let storage = RepoStorage::open(config, Arc::new(FileFetcher)).unwrap();
    assert_eq!(storage.cache_root(), env_cache.path());

    let reports = storage.sync_all(false).unwrap();
    assert!(!reports[0].is_failed());
    assert!(env_cache.path().join("local").join("repomd.xml").is_file());
    assert!(!configured.path().join("local").exists());
}

#[test]
#[serial]
fn test_config_cache_path_without_env() {
    let configured = tempfile::tempdir().unwrap();
    let previous = std::env::var("REPODEX_CACHE").ok();
    std::env::remove_var("REPODEX_CACHE");

    let config = Config::from_toml_str(&format!(
        "cache_path = \"{}\"\n",
        configured.path().display()
    ))
    .unwrap();
    let storage = RepoStorage::open(config, Arc::new(FileFetcher)).unwrap();
    assert_eq!(storage.cache_root(), configured.path());
    assert!(storage.enabled_ids().unwrap().is_empty());

    if let Some(value) = previous {
        std::env::set_var("REPODEX_CACHE", value);
    }
}
