//! Access to the relational metadata stores.

pub mod connection;
pub mod sack;

pub use connection::StoreHandle;
pub use sack::SqliteSack;
