//! Shared helpers for the repodex crates: filesystem utilities, content
//! digests, duration parsing and XDG path resolution.

pub mod error;
pub mod fs;
pub mod hash;
pub mod path;
pub mod time;
