//! SQLite backend for Scribe.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated
//! thread without blocking the async runtime. An import or a rollback runs as
//! one closure on that thread, inside one transaction, which is what lets
//! target adapters and reconciliation hooks stay synchronous.

mod encode;
mod loader;
mod schema;
mod store;

pub mod blob;
pub mod error;
pub mod table;
pub mod target;

pub use blob::BlobStore;
pub use error::{Error, Result};
pub use store::SqliteStore;
pub use table::{ColumnSpec, NaturalKey, OnMatch, TableEntity, TableSpec};
pub use target::{EntityRegistry, Reconcile, TargetEntity};

#[cfg(test)]
mod tests;
