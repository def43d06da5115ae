//! Repository metadata model and parsers.
//!
//! This crate reads the documents an rpm-md repository publishes:
//!
//! - `repomd.xml`, the manifest listing every other document ([`RepoMd`])
//! - `primary`, `filelists` and `other`, streamed one package at a time
//!   ([`MetadataParser`])
//!
//! Documents may be compressed with gzip, xz, bzip2 or zstd; the format is
//! detected from magic bytes.
//!
//! # Example
//!
//! ```no_run
//! use std::path::Path;
//! use repodex_metadata::{MetadataEntry, MetadataParser};
//!
//! fn count_packages(path: &Path) -> Result<usize, repodex_metadata::ParseError> {
//!     let mut count = 0;
//!     for entry in MetadataParser::open(path, "base")? {
//!         match entry {
//!             Ok(MetadataEntry::Primary(_)) => count += 1,
//!             Ok(_) => {}
//!             Err(err) if err.is_fatal() => return Err(err),
//!             Err(err) => tracing::warn!("{err}"),
//!         }
//!     }
//!     Ok(count)
//! }
//! ```

pub mod compression;
pub mod error;
pub mod evr;
pub mod package;
pub mod parser;
pub mod repomd;
mod xml;

pub use error::{ErrorContext, ManifestError, ParseError};
pub use evr::{rpmvercmp, Evr};
pub use package::{
    ChangelogEntry, ChangelogRecord, DepFlag, DepKind, Dependency, FileKind, FilelistEntry,
    HeaderRange, MetadataEntry, Nevra, PackageRecord,
};
pub use parser::MetadataParser;
pub use repomd::{Checksum, RepoData, RepoMd};
