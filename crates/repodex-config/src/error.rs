use miette::Diagnostic;
use repodex_utils::error::PathError;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("TOML serialization error: {0}")]
    #[diagnostic(
        code(repodex_config::toml_serialize),
        help("Check your configuration structure for invalid values")
    )]
    TomlSerError(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    #[diagnostic(
        code(repodex_config::toml_deserialize),
        help("Check your config.toml syntax and structure")
    )]
    TomlDeError(#[from] toml::de::Error),

    #[error("Invalid repository id: {0:?}")]
    #[diagnostic(
        code(repodex_config::invalid_repository),
        help("Repository ids must be non-empty and may not contain '/' or whitespace")
    )]
    InvalidRepositoryId(String),

    #[error("Duplicate repository id: {0}")]
    #[diagnostic(
        code(repodex_config::duplicate_repo),
        help("Each repository must have a unique id")
    )]
    DuplicateRepositoryId(String),

    #[error("Repository {0} has no base URLs")]
    #[diagnostic(
        code(repodex_config::missing_baseurl),
        help("Add at least one entry to `baseurls`")
    )]
    MissingBaseUrl(String),

    #[error("Invalid URL {url} for repository {repo}: {reason}")]
    #[diagnostic(
        code(repodex_config::invalid_repository_url),
        help("Base URLs must be absolute, e.g. https://mirror.example.org/fedora/x86_64/")
    )]
    InvalidRepositoryUrl {
        repo: String,
        url: String,
        reason: String,
    },

    #[error("Invalid duration: {0}")]
    #[diagnostic(
        code(repodex_config::invalid_duration),
        help("Use values like \"90m\", \"6h\", \"1d\", \"always\" or \"never\"")
    )]
    InvalidDuration(String),

    #[error("IO error: {0}")]
    #[diagnostic(code(repodex_config::io))]
    IoError(#[from] std::io::Error),

    #[error(transparent)]
    #[diagnostic(code(repodex_config::path))]
    Path(#[from] PathError),
}

pub type Result<T> = std::result::Result<T, ConfigError>;
