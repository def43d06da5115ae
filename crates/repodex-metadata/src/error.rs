//! Error types for the metadata crate.
//!
//! [`ParseError`] covers the per-type metadata documents (primary, filelists,
//! other); [`ManifestError`] covers `repomd.xml`.

use miette::Diagnostic;
use thiserror::Error;

/// Errors raised while streaming a metadata document.
///
/// Only [`ParseError::Package`] is recoverable: the offending `<package>`
/// subtree has been consumed in full and the parser can continue with the
/// next one. Every other variant ends the stream.
#[derive(Error, Diagnostic, Debug)]
pub enum ParseError {
    #[error("{document}: unknown root element <{element}>")]
    #[diagnostic(
        code(repodex_metadata::unknown_root),
        help("Expected one of <metadata>, <filelists> or <otherdata>")
    )]
    UnknownRoot { document: String, element: String },

    #[error("{document}: malformed XML at byte {position}: {reason}")]
    #[diagnostic(
        code(repodex_metadata::xml),
        help("The metadata file may be corrupted or truncated")
    )]
    Xml {
        document: String,
        position: u64,
        reason: String,
    },

    #[error("{document}: document ended inside <{element}>")]
    #[diagnostic(
        code(repodex_metadata::truncated),
        help("The metadata file may be truncated; try refreshing the repository")
    )]
    Truncated { document: String, element: String },

    #[error("{document}: invalid package '{package}': {reason}")]
    #[diagnostic(code(repodex_metadata::package))]
    Package {
        document: String,
        package: String,
        reason: String,
    },

    #[error("Error while {action}: {source}")]
    #[diagnostic(code(repodex_metadata::io))]
    IoError {
        action: String,
        source: std::io::Error,
    },
}

impl ParseError {
    /// Whether the stream cannot continue after this error.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ParseError::Package { .. })
    }
}

/// Errors raised while reading a repository manifest.
#[derive(Error, Diagnostic, Debug)]
pub enum ManifestError {
    #[error("{document}: malformed XML at byte {position}: {reason}")]
    #[diagnostic(
        code(repodex_metadata::manifest::xml),
        help("The repomd.xml file may be corrupted; try refreshing the repository")
    )]
    Xml {
        document: String,
        position: u64,
        reason: String,
    },

    #[error("{document}: expected <repomd> root, found <{element}>")]
    #[diagnostic(code(repodex_metadata::manifest::root))]
    UnexpectedRoot { document: String, element: String },

    #[error("{document}: no root element")]
    #[diagnostic(code(repodex_metadata::manifest::empty))]
    Empty { document: String },

    #[error("Error while {action}: {source}")]
    #[diagnostic(code(repodex_metadata::manifest::io))]
    IoError {
        action: String,
        source: std::io::Error,
    },
}

/// Extension trait for adding context to I/O errors.
pub trait ErrorContext<T> {
    fn with_context<C>(self, context: C) -> Result<T, ParseError>
    where
        C: FnOnce() -> String;
}

impl<T> ErrorContext<T> for std::io::Result<T> {
    fn with_context<C>(self, context: C) -> Result<T, ParseError>
    where
        C: FnOnce() -> String,
    {
        self.map_err(|err| {
            ParseError::IoError {
                action: context(),
                source: err,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_package_errors_are_recoverable() {
        let err = ParseError::Package {
            document: "primary.xml".into(),
            package: "foo".into(),
            reason: "missing <checksum>".into(),
        };
        assert!(!err.is_fatal());
        assert_eq!(
            err.to_string(),
            "primary.xml: invalid package 'foo': missing <checksum>"
        );

        let err = ParseError::Truncated {
            document: "primary.xml".into(),
            element: "metadata".into(),
        };
        assert!(err.is_fatal());
    }

    #[test]
    fn test_io_context() {
        let res: std::io::Result<()> = Err(std::io::Error::other("boom"));
        let err = res.with_context(|| "reading primary.xml".to_string()).unwrap_err();
        assert_eq!(err.to_string(), "Error while reading primary.xml: boom");
    }
}
