//! Diesel table definitions, one module per metadata store.

pub mod filelists;
pub mod other;
pub mod primary;
