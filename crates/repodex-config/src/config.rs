use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};

use documented::{Documented, DocumentedFields};
use repodex_utils::{
    path::{resolve_path, xdg_cache_home, xdg_config_home},
    time::parse_duration,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{
    error::{ConfigError, Result},
    repository::Repository,
};

/// Persistent cache strategy used for repository metadata.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CacheBackendKind {
    /// Whole-object snapshot per metadata document, rebuilt on any change.
    Serialized,
    /// SQLite row store updated incrementally on change.
    #[default]
    Relational,
}

/// Metadata documents a repository publishes in its manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetadataType {
    Primary,
    Filelists,
    Other,
}

impl MetadataType {
    pub const ALL: [MetadataType; 3] = [
        MetadataType::Primary,
        MetadataType::Filelists,
        MetadataType::Other,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MetadataType::Primary => "primary",
            MetadataType::Filelists => "filelists",
            MetadataType::Other => "other",
        }
    }
}

impl std::fmt::Display for MetadataType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application's configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct Config {
    /// Directory holding per-repository metadata caches.
    /// Default: $XDG_CACHE_HOME/repodex
    pub cache_path: Option<String>,

    /// Cache backend: "serialized" or "relational".
    /// Default: "relational"
    pub backend: Option<CacheBackendKind>,

    /// How long a downloaded repomd.xml is trusted before checking mirrors again
    /// (e.g. "90m", "6h", "1d", "always", "never").
    /// Default: "6h"
    pub metadata_expire: Option<String>,

    /// Synchronize repositories in parallel.
    /// Default: true
    pub parallel: Option<bool>,

    /// Metadata documents to synchronize. `primary` is always included.
    /// Default: ["primary", "filelists"]
    pub metadata_types: Option<Vec<MetadataType>>,

    /// List of configured repositories.
    #[serde(default)]
    pub repositories: Vec<Repository>,
}

/// Parses an expiry window. `None` means "never expires".
pub fn parse_expire(value: &str) -> Result<Option<Duration>> {
    match value {
        "always" => Ok(Some(Duration::ZERO)),
        "never" => Ok(None),
        value => {
            parse_duration(value)
                .map(Some)
                .ok_or_else(|| ConfigError::InvalidDuration(value.to_string()))
        }
    }
}

impl Config {
    /// Default location of the configuration file: `$REPODEX_CONFIG`, or
    /// `$XDG_CONFIG_HOME/repodex/config.toml`.
    pub fn default_path() -> PathBuf {
        match std::env::var("REPODEX_CONFIG") {
            Ok(path) => PathBuf::from(path),
            Err(_) => xdg_config_home().join("repodex").join("config.toml"),
        }
    }

    /// Loads the configuration from `path`, or an empty configuration if the file does
    /// not exist.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config = match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                debug!("no config at {}, using defaults", path.display());
                Self::default()
            }
            Err(err) => return Err(ConfigError::IoError(err)),
        };

        config.resolve()?;
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.resolve()?;
        Ok(config)
    }

    /// Fills in defaults and validates repositories.
    pub fn resolve(&mut self) -> Result<()> {
        self.backend.get_or_insert(CacheBackendKind::default());
        self.parallel.get_or_insert(true);

        if let Some(expire) = &self.metadata_expire {
            parse_expire(expire)?;
        }

        let types = self
            .metadata_types
            .get_or_insert_with(|| vec![MetadataType::Primary, MetadataType::Filelists]);
        if !types.contains(&MetadataType::Primary) {
            types.insert(0, MetadataType::Primary);
        }
        types.sort();
        types.dedup();

        let mut seen_repos = HashSet::new();
        for repo in &mut self.repositories {
            repo.validate()?;
            if !seen_repos.insert(repo.id.clone()) {
                return Err(ConfigError::DuplicateRepositoryId(repo.id.clone()));
            }
            repo.enabled.get_or_insert(true);
        }

        Ok(())
    }

    pub fn backend(&self) -> CacheBackendKind {
        self.backend.unwrap_or_default()
    }

    pub fn parallel(&self) -> bool {
        self.parallel.unwrap_or(true)
    }

    pub fn metadata_types(&self) -> Vec<MetadataType> {
        self.metadata_types
            .clone()
            .unwrap_or_else(|| vec![MetadataType::Primary, MetadataType::Filelists])
    }

    pub fn get_cache_path(&self) -> Result<PathBuf> {
        if let Ok(env_path) = std::env::var("REPODEX_CACHE") {
            return Ok(resolve_path(&env_path)?);
        }
        if let Some(cache_path) = &self.cache_path {
            return Ok(resolve_path(cache_path)?);
        }
        Ok(xdg_cache_home().join("repodex"))
    }

    pub fn get_repository(&self, id: &str) -> Option<&Repository> {
        self.repositories.iter().find(|repo| repo.id == id)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let path = path.as_ref();
        let serialized = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, serialized)?;
        info!("Configuration saved to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use serial_test::serial;
    use tempfile::tempdir;

    use super::*;
    use crate::{repository::FailoverMethod, test_utils::EnvGuard};

    const SAMPLE: &str = r#"
cache_path = "/var/cache/repodex"
backend = "serialized"
metadata_expire = "90m"
metadata_types = ["other", "filelists"]

[[repositories]]
id = "fedora"
baseurls = ["https://a.example.org/fedora/39/x86_64", "https://b.example.org/fedora/39/x86_64"]
failover = "priority"

[[repositories]]
id = "updates"
baseurls = ["https://a.example.org/updates/39/x86_64"]
enabled = false
exclude = ["kernel*"]
"#;

    #[test]
    fn test_parse_sample_config() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        assert_eq!(config.backend(), CacheBackendKind::Serialized);
        assert_eq!(
            config.metadata_types(),
            vec![
                MetadataType::Primary,
                MetadataType::Filelists,
                MetadataType::Other
            ]
        );
        assert_eq!(config.repositories.len(), 2);

        let fedora = config.get_repository("fedora").unwrap();
        assert_eq!(fedora.failover_method(), FailoverMethod::Priority);
        assert_eq!(fedora.mirror_urls().unwrap().len(), 2);

        let updates = config.get_repository("updates").unwrap();
        assert!(!updates.is_enabled());
        assert_eq!(updates.excludes(), ["kernel*".to_string()]);
        assert_eq!(
            updates
                .metadata_expire(config.metadata_expire.as_deref())
                .unwrap(),
            Some(Duration::from_secs(90 * 60))
        );
    }

    #[test]
    fn test_resolve_sets_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.backend(), CacheBackendKind::Relational);
        assert!(config.parallel());
        assert_eq!(
            config.metadata_types(),
            vec![MetadataType::Primary, MetadataType::Filelists]
        );
    }

    #[test]
    fn test_duplicate_repository_rejected() {
        let content = r#"
[[repositories]]
id = "base"
baseurls = ["https://example.org/a"]

[[repositories]]
id = "base"
baseurls = ["https://example.org/b"]
"#;
        assert!(matches!(
            Config::from_toml_str(content),
            Err(ConfigError::DuplicateRepositoryId(id)) if id == "base"
        ));
    }

    #[test]
    fn test_invalid_expire_rejected() {
        assert!(matches!(
            Config::from_toml_str("metadata_expire = \"soon\""),
            Err(ConfigError::InvalidDuration(_))
        ));
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load(dir.path().join("config.toml")).unwrap();
        assert!(config.repositories.is_empty());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let config = Config::from_toml_str(SAMPLE).unwrap();
        config.save(&path).unwrap();

        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.repositories.len(), 2);
        assert_eq!(loaded.backend(), CacheBackendKind::Serialized);
    }

    #[test]
    #[serial]
    fn test_cache_path_env_override() {
        let config = Config::from_toml_str(SAMPLE).unwrap();
        {
            let _env = EnvGuard::set(&[("REPODEX_CACHE", "/tmp/repodex-env-cache")]);
            assert_eq!(
                config.get_cache_path().unwrap(),
                PathBuf::from("/tmp/repodex-env-cache")
            );
        }
        std::env::remove_var("REPODEX_CACHE");
        assert_eq!(
            config.get_cache_path().unwrap(),
            PathBuf::from("/var/cache/repodex")
        );
    }

    #[test]
    #[serial]
    fn test_cache_path_unset_variable() {
        std::env::remove_var("REPODEX_TEST_UNSET");
        let _env = EnvGuard::set(&[("REPODEX_CACHE", "$REPODEX_TEST_UNSET/cache")]);
        let err = Config::default().get_cache_path().unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Path(repodex_utils::error::PathError::MissingEnvVar { ref var, .. })
                if var == "REPODEX_TEST_UNSET"
        ));
    }

    #[test]
    #[serial]
    fn test_default_cache_path_uses_xdg() {
        std::env::remove_var("REPODEX_CACHE");
        let _env = EnvGuard::set(&[("XDG_CACHE_HOME", "/tmp/xdg")]);
        let config = Config::default();
        assert_eq!(
            config.get_cache_path().unwrap(),
            PathBuf::from("/tmp/xdg/repodex")
        );
    }

    #[test]
    #[serial]
    fn test_default_path_env() {
        let _env = EnvGuard::set(&[("REPODEX_CONFIG", "/etc/repodex.toml")]);
        assert_eq!(Config::default_path(), PathBuf::from("/etc/repodex.toml"));
    }
}
