//! SQLite backend for the relational store of a Concord deployment.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on dedicated threads
//! without blocking the async runtime. Every unit-of-work owns its own
//! connection holding an open `BEGIN IMMEDIATE` transaction.

mod encode;
mod schema;
mod store;

pub mod error;

pub use error::{Error, Result};
pub use store::{SqliteSession, SqliteStore};

#[cfg(test)]
mod tests;
