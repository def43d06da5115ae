//! Error types for repodex-core.

use std::{error::Error, path::PathBuf};

use miette::Diagnostic;
use repodex_config::{error::ConfigError, MetadataType};
use repodex_db::DbError;
use repodex_metadata::{ManifestError, ParseError};
use repodex_utils::error::{FileSystemError, HashError};
use thiserror::Error;

/// Failures of the on-disk snapshot cache.
///
/// Neither variant is fatal: a corrupt snapshot is rebuilt from the
/// document, and a snapshot that cannot be written only costs a reparse on
/// the next run.
#[derive(Error, Diagnostic, Debug)]
pub enum CacheError {
    #[error("Cache file {} is corrupt: {reason}", path.display())]
    #[diagnostic(
        code(repodex::cache::corrupt),
        help("The file will be rebuilt from the repository metadata")
    )]
    Corrupt { path: PathBuf, reason: String },

    #[error("Failed to write cache file {}", path.display())]
    #[diagnostic(
        code(repodex::cache::write),
        help("Check that the cache directory is writable")
    )]
    Write {
        path: PathBuf,
        #[source]
        source: FileSystemError,
    },

    #[error("Failed to encode cache file {}: {reason}", path.display())]
    #[diagnostic(code(repodex::cache::encode))]
    Encode { path: PathBuf, reason: String },
}

/// Failures of the document fetch collaborator.
#[derive(Error, Diagnostic, Debug)]
pub enum FetchError {
    #[error("Invalid URL: {url}")]
    #[diagnostic(code(repodex::fetch::invalid_url))]
    InvalidUrl {
        url: String,
        #[source]
        source: url::ParseError,
    },

    #[error("Unsupported URL scheme: {url}")]
    #[diagnostic(
        code(repodex::fetch::scheme),
        help("Base URLs must use http, https or file")
    )]
    UnsupportedScheme { url: String },

    #[error("Not found: {url}")]
    #[diagnostic(code(repodex::fetch::not_found))]
    NotFound { url: String },

    #[error("HTTP {status}: {url}")]
    #[diagnostic(code(repodex::fetch::http_error))]
    Http { status: u16, url: String },

    #[error("Network error fetching {url}")]
    #[diagnostic(
        code(repodex::fetch::network),
        help("Check your internet connection or try again later")
    )]
    Network {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("Error while {action}")]
    #[diagnostic(code(repodex::fetch::io))]
    Io {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Checksum mismatch for {url}: expected {expected}, got {actual}")]
    #[diagnostic(
        code(repodex::fetch::checksum),
        help("The mirror may be out of sync; the next mirror will be tried")
    )]
    ChecksumMismatch {
        url: String,
        expected: String,
        actual: String,
    },

    #[error("Unsupported checksum type '{algorithm}' for {url}")]
    #[diagnostic(code(repodex::fetch::checksum_type))]
    UnsupportedChecksum { url: String, algorithm: String },

    #[error("All mirrors of {repo_id} failed after {attempts} attempt(s)")]
    #[diagnostic(
        code(repodex::fetch::mirrors_exhausted),
        help("Check the repository base URLs or your network connection")
    )]
    MirrorsExhausted {
        repo_id: String,
        attempts: usize,
        #[source]
        last: Option<Box<FetchError>>,
    },
}

/// Core error type for repodex operations.
#[derive(Error, Diagnostic, Debug)]
pub enum RepodexError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Database(#[from] DbError),

    #[error(transparent)]
    #[diagnostic(code(repodex::filesystem))]
    FileSystem(#[from] FileSystemError),

    #[error(transparent)]
    #[diagnostic(code(repodex::hash))]
    Hash(#[from] HashError),

    #[error("Error while {action}")]
    #[diagnostic(code(repodex::io), help("Check file permissions and disk space"))]
    IoError {
        action: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{document} is a {found} document, expected {expected}")]
    #[diagnostic(
        code(repodex::unexpected_document),
        help("The repository manifest points at the wrong file")
    )]
    UnexpectedDocument {
        document: String,
        expected: MetadataType,
        found: MetadataType,
    },

    #[error("Repository '{0}' not found")]
    #[diagnostic(
        code(repodex::unknown_repository),
        help("Run 'repodex repos' to list configured repositories")
    )]
    UnknownRepository(String),

    #[error("Repository '{repo_id}' is unavailable: {reason}")]
    #[diagnostic(
        code(repodex::repository_unavailable),
        help("Set skip_if_unavailable = true to continue without it")
    )]
    RepositoryUnavailable { repo_id: String, reason: String },

    #[error("Repository '{repo_id}' has no {kind} metadata")]
    #[diagnostic(code(repodex::missing_metadata))]
    MissingMetadata {
        repo_id: String,
        kind: MetadataType,
    },

    #[error("Thread lock poison error")]
    #[diagnostic(
        code(repodex::poison),
        help("This is an internal error, please report it")
    )]
    PoisonError,
}

impl RepodexError {
    /// Innermost cause, for one-line reports.
    pub fn root_cause(&self) -> String {
        let mut current: &dyn Error = self;
        while let Some(source) = current.source() {
            current = source;
        }
        current.to_string()
    }
}

impl<T> From<std::sync::PoisonError<T>> for RepodexError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        Self::PoisonError
    }
}

impl From<diesel::result::Error> for RepodexError {
    fn from(err: diesel::result::Error) -> Self {
        Self::Database(err.into())
    }
}

impl From<ureq::Error> for FetchError {
    fn from(err: ureq::Error) -> Self {
        match err {
            ureq::Error::StatusCode(404) => {
                FetchError::NotFound {
                    url: String::new(),
                }
            }
            ureq::Error::StatusCode(status) => {
                FetchError::Http {
                    status,
                    url: String::new(),
                }
            }
            other => {
                FetchError::Network {
                    url: String::new(),
                    source: Box::new(other),
                }
            }
        }
    }
}

impl FetchError {
    /// Attaches the requested URL to errors converted without one.
    pub(crate) fn at(self, requested: &str) -> Self {
        match self {
            FetchError::NotFound { url } if url.is_empty() => {
                FetchError::NotFound {
                    url: requested.to_string(),
                }
            }
            FetchError::Http { status, url } if url.is_empty() => {
                FetchError::Http {
                    status,
                    url: requested.to_string(),
                }
            }
            FetchError::Network { url, source } if url.is_empty() => {
                FetchError::Network {
                    url: requested.to_string(),
                    source,
                }
            }
            other => other,
        }
    }
}

/// Trait for adding context to IO errors.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, RepodexError>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> std::result::Result<T, RepodexError>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            RepodexError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}

pub type Result<T> = std::result::Result<T, RepodexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_cause_walks_sources() {
        let err: RepodexError = FetchError::MirrorsExhausted {
            repo_id: "fedora".to_string(),
            attempts: 2,
            last: Some(Box::new(FetchError::Http {
                status: 503,
                url: "https://a.example/repodata/repomd.xml".to_string(),
            })),
        }
        .into();

        assert!(err.to_string().contains("fedora"));
        assert_eq!(
            err.root_cause(),
            "HTTP 503: https://a.example/repodata/repomd.xml"
        );
    }

    #[test]
    fn test_status_codes_map_to_variants() {
        let err = FetchError::from(ureq::Error::StatusCode(404)).at("https://x/y");
        assert!(matches!(err, FetchError::NotFound { ref url } if url == "https://x/y"));

        let err = FetchError::from(ureq::Error::StatusCode(500)).at("https://x/y");
        assert!(matches!(err, FetchError::Http { status: 500, .. }));
    }

    #[test]
    fn test_with_context() {
        let result: std::io::Result<()> = Err(std::io::Error::other("denied"));
        let err = result.with_context(|| "creating cache dir".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "Error while creating cache dir");
    }
}
