use repodex_config::MetadataType;

/// Events emitted while repositories are synchronized.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// Synchronization of a repository is starting.
    RepoStarting { repo_id: String },
    /// The repository manifest was loaded.
    ManifestLoaded {
        repo_id: String,
        source: ManifestSource,
        revision: Option<String>,
    },
    /// Cache state decided for one metadata document.
    CacheStatus {
        repo_id: String,
        kind: MetadataType,
        state: CacheStatus,
    },
    /// A metadata document is being downloaded.
    Fetching {
        repo_id: String,
        kind: Option<MetadataType>,
        url: String,
    },
    /// A mirror failed; the next one will be tried if any remain.
    MirrorFailed {
        repo_id: String,
        url: String,
        error: String,
    },
    /// Parsing progress for one metadata document.
    ///
    /// `total` is the package count the document announces, which is only a hint.
    Progress {
        repo_id: String,
        kind: MetadataType,
        current: u64,
        total: Option<u64>,
    },
    /// A metadata document was parsed into the cache.
    Rebuilt {
        repo_id: String,
        kind: MetadataType,
        stats: RebuildStats,
    },
    /// A metadata document could not be synchronized; other documents continue.
    KindFailed {
        repo_id: String,
        kind: MetadataType,
        error: String,
    },
    /// The repository finished synchronizing.
    RepoComplete {
        repo_id: String,
        package_count: usize,
    },
    /// The repository could not be synchronized this cycle.
    RepoFailed { repo_id: String, error: String },
}

/// Where a repository manifest came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestSource {
    /// Reused from the local cache inside the expiry window.
    Cached,
    /// Downloaded from a mirror.
    Downloaded,
}

/// Cache state of one metadata document relative to the manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheStatus {
    Missing,
    Stale,
    Fresh,
}

impl std::fmt::Display for CacheStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let msg = match self {
            CacheStatus::Missing => "missing",
            CacheStatus::Stale => "stale",
            CacheStatus::Fresh => "fresh",
        };
        write!(f, "{msg}")
    }
}

/// Counters reported after a cache rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RebuildStats {
    /// Packages written to the cache.
    pub added: usize,
    /// Packages deleted from the cache.
    pub removed: usize,
    /// Packages already present and left untouched.
    pub unchanged: usize,
    /// Package elements skipped because they could not be parsed.
    pub skipped: usize,
}
