//! Persistent metadata caches.
//!
//! A cache holds, per repository and metadata type, the parsed content of a
//! document together with the checksum the manifest published for it. The
//! cache is fresh exactly when the stored checksum equals the manifest's
//! current one; anything else is rebuilt from the document.
//!
//! Two strategies share the streaming parser and differ only in storage:
//!
//! - [`SerializedCache`] keeps a compressed snapshot per document and
//!   rebuilds it wholesale.
//! - [`RelationalCache`] keeps SQLite row stores and applies only the
//!   difference between the stored and the new package set.

pub mod relational;
pub mod serialized;
pub mod snapshot;

use repodex_config::{CacheBackendKind, MetadataType};
use repodex_events::{CacheStatus, RebuildStats};
use repodex_metadata::{MetadataEntry, ParseError, RepoData};

pub use relational::RelationalCache;
pub use serialized::SerializedCache;

use crate::{
    error::{CacheError, Result},
    storage::RepoSack,
};

/// Stream of entries handed to [`CacheStrategy::rebuild`].
///
/// Per-package parse failures have already been filtered out; any `Err`
/// left in the stream is fatal for the document.
pub type EntryStream<'a> = dyn Iterator<Item = std::result::Result<MetadataEntry, ParseError>> + 'a;

/// Storage strategy for one repository's metadata.
///
/// One instance serves one synchronization of one repository: the
/// synchronizer asks for the state of every metadata type, then either
/// loads or rebuilds it, and finally turns the strategy into the
/// repository's sack.
pub trait CacheStrategy {
    /// Compares the cached copy of `kind` with the manifest entry.
    ///
    /// Unreadable caches report [`CacheStatus::Missing`].
    fn state(&mut self, kind: MetadataType, data: &RepoData) -> CacheStatus;

    /// Makes the fresh cached copy of `kind` available.
    ///
    /// An `Err` means the cache turned out to be unusable and `kind` must
    /// be rebuilt.
    fn load(&mut self, kind: MetadataType, data: &RepoData) -> std::result::Result<(), CacheError>;

    /// Replaces the cached copy of `kind` with the content of `entries` and
    /// records the manifest checksum.
    ///
    /// On `Err` the previous cache content is left in place.
    fn rebuild(
        &mut self,
        kind: MetadataType,
        data: &RepoData,
        entries: &mut EntryStream<'_>,
    ) -> Result<RebuildStats>;

    /// Forgets `kind` for this run, treating it as absent.
    fn discard(&mut self, kind: MetadataType);

    /// Publishes what was loaded or rebuilt as the repository's sack.
    ///
    /// Fails when the primary metadata is not available.
    fn finish(self: Box<Self>) -> Result<RepoSack>;
}

/// Creates the configured strategy for a repository cache directory.
pub fn open_strategy(
    kind: CacheBackendKind,
    repo_id: &str,
    dir: &std::path::Path,
) -> Box<dyn CacheStrategy> {
    match kind {
        CacheBackendKind::Serialized => Box::new(SerializedCache::new(repo_id, dir)),
        CacheBackendKind::Relational => Box::new(RelationalCache::new(repo_id, dir)),
    }
}
