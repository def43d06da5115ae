//! Relational metadata cache for repodex.
//!
//! Every repository gets one SQLite store per metadata type. Stores are
//! updated incrementally: a new document only inserts packages that were
//! not stored yet and deletes those that disappeared, leaving the rows of
//! unchanged packages alone. See [`repository::IncrementalStore`].

pub mod connection;
pub mod error;
mod macros;
pub mod migration;
pub mod models;
pub mod repository;
pub mod schema;

pub use connection::{remove_store, store_file_name, DbConnection, DB_VERSION};
pub use error::{DbError, Result};
pub use repository::{
    FilelistsRepository, IncrementalStore, OtherRepository, PrimaryRepository, SyncStats,
};
