//! Error types for repodex-db.

use miette::Diagnostic;
use thiserror::Error;

/// Database error type for repodex-db operations.
#[derive(Error, Diagnostic, Debug)]
pub enum DbError {
    #[error("Database connection failed: {0}")]
    #[diagnostic(
        code(repodex_db::connection),
        help("Check if the cache directory exists and is accessible")
    )]
    ConnectionError(String),

    #[error("Database query failed: {0}")]
    #[diagnostic(
        code(repodex_db::query),
        help("Try running 'repodex sync --force' to rebuild the cache")
    )]
    QueryError(String),

    #[error("Database migration failed: {0}")]
    #[diagnostic(
        code(repodex_db::migration),
        help("The cache schema may be corrupted. Remove the cache directory and re-sync.")
    )]
    MigrationError(String),

    #[error("Record not found: {0}")]
    #[diagnostic(code(repodex_db::not_found))]
    NotFound(String),

    #[error("IO error: {0}")]
    #[diagnostic(
        code(repodex_db::io),
        help("Check file permissions and disk space")
    )]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(repodex_db::filesystem))]
    FileSystem(#[from] repodex_utils::error::FileSystemError),
}

impl From<diesel::result::Error> for DbError {
    fn from(err: diesel::result::Error) -> Self {
        match err {
            diesel::result::Error::NotFound => DbError::NotFound("Record not found".to_string()),
            diesel::result::Error::DatabaseError(_, info) => {
                DbError::QueryError(info.message().to_string())
            }
            other => DbError::QueryError(other.to_string()),
        }
    }
}

impl From<diesel::result::ConnectionError> for DbError {
    fn from(err: diesel::result::ConnectionError) -> Self {
        DbError::ConnectionError(err.to_string())
    }
}

/// Result type alias for repodex-db operations.
pub type Result<T> = std::result::Result<T, DbError>;
