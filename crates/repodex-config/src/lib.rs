pub mod config;
pub mod error;
pub mod repository;

#[cfg(test)]
pub mod test_utils;

pub use config::{CacheBackendKind, Config, MetadataType};
pub use repository::{FailoverMethod, Repository};
