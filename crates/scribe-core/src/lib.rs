//! Core types and trait definitions for Scribe, the CSV snapshot importer.
//!
//! A *source* describes where a periodically-published CSV lives and which
//! entity kind its rows become. Each download is a *snapshot*; loading a
//! snapshot writes one *audit row* per data row so that every side effect of
//! an import can be traced and, for created entities, undone.
//!
//! This crate is deliberately free of HTTP and database dependencies.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod decision;
pub mod error;
pub mod import;
pub mod mapping;
pub mod row;
pub mod snapshot;
pub mod source;
pub mod store;

pub use error::{Error, Result};
