//! Package sacks, metadata caches and repository aggregation.
//!
//! The flow for one repository is: fetch `repomd.xml` through a
//! [`FailoverPolicy`], ask the configured cache backend whether each
//! metadata document is fresh, rebuild the stale ones from the streaming
//! parser, and publish the resulting sack in [`RepoStorage`].

pub mod cache;
pub mod constants;
pub mod database;
pub mod error;
pub mod failover;
pub mod fetch;
pub mod query;
pub mod sack;
pub mod storage;
pub mod sync;
pub mod view;

pub use error::{CacheError, FetchError, RepodexError, Result};
pub use failover::FailoverPolicy;
pub use fetch::{DefaultFetcher, Fetcher, FileFetcher, HttpFetcher};
pub use query::{match_package_names, NameMatches, PackageQuery};
pub use sack::PackageSack;
pub use storage::{RepoSack, RepoStorage};
pub use sync::{KindOutcome, RepoStatus, SyncOptions, SyncReport, Synchronizer};
pub use view::{Loadable, PackageView, StoredPackage};
