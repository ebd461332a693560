//! Domain storage
//!
//! The persistence interface used by domain handlers and its SQLite backing.

pub mod sqlite;
pub mod store;

pub use sqlite::SqliteStore;
pub use store::{DomainStore, SharedStore};
