use std::time::Duration;

use documented::{Documented, DocumentedFields};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    config::parse_expire,
    error::{ConfigError, Result},
};

/// How the next mirror is chosen after a failed download.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FailoverMethod {
    /// Try mirrors strictly in the listed order.
    Priority,
    /// Start at a random mirror chosen once per session, then walk the list.
    #[default]
    Roundrobin,
}

/// Defines a remote RPM repository.
#[derive(Debug, Clone, Deserialize, Serialize, Documented, DocumentedFields)]
pub struct Repository {
    /// Unique id of the repository, used as the cache directory name.
    pub id: String,

    /// Human readable name.
    /// Default: the id
    pub name: Option<String>,

    /// Ordered list of mirror base URLs. `repodata/repomd.xml` is resolved against each.
    pub baseurls: Vec<String>,

    /// Whether the repository is enabled.
    /// Default: true
    pub enabled: Option<bool>,

    /// Mirror selection strategy: "priority" or "roundrobin".
    /// Default: "roundrobin"
    pub failover: Option<FailoverMethod>,

    /// Glob patterns of package names hidden from queries after loading.
    pub exclude: Option<Vec<String>>,

    /// Keep going when this repository cannot be synchronized.
    /// Default: true
    pub skip_if_unavailable: Option<bool>,

    /// Overrides the global `metadata_expire` for this repository.
    pub metadata_expire: Option<String>,
}

impl Repository {
    pub fn new(id: impl Into<String>, baseurls: Vec<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            baseurls,
            enabled: None,
            failover: None,
            exclude: None,
            skip_if_unavailable: None,
            metadata_expire: None,
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled.unwrap_or(true)
    }

    pub fn failover_method(&self) -> FailoverMethod {
        self.failover.unwrap_or_default()
    }

    pub fn skip_if_unavailable(&self) -> bool {
        self.skip_if_unavailable.unwrap_or(true)
    }

    pub fn excludes(&self) -> &[String] {
        self.exclude.as_deref().unwrap_or_default()
    }

    /// Resolves the metadata expiry window, falling back to the global value.
    ///
    /// `None` means cached metadata never expires.
    pub fn metadata_expire(&self, global: Option<&str>) -> Result<Option<Duration>> {
        parse_expire(self.metadata_expire.as_deref().or(global).unwrap_or("6h"))
    }

    /// Parses the base URLs, appending a trailing slash so relative metadata
    /// locations join underneath them.
    pub fn mirror_urls(&self) -> Result<Vec<Url>> {
        self.baseurls
            .iter()
            .map(|raw| {
                let normalized = if raw.ends_with('/') {
                    raw.clone()
                } else {
                    format!("{raw}/")
                };
                Url::parse(&normalized).map_err(|err| {
                    ConfigError::InvalidRepositoryUrl {
                        repo: self.id.clone(),
                        url: raw.clone(),
                        reason: err.to_string(),
                    }
                })
            })
            .collect()
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.id.is_empty() || self.id.contains('/') || self.id.contains(char::is_whitespace) {
            return Err(ConfigError::InvalidRepositoryId(self.id.clone()));
        }
        if self.baseurls.is_empty() {
            return Err(ConfigError::MissingBaseUrl(self.id.clone()));
        }
        self.mirror_urls()?;
        if let Some(expire) = &self.metadata_expire {
            parse_expire(expire)?;
        }
        Ok(())
    }
}
