//! In-process backends for the graph store, the document store, and the
//! key-value cache.
//!
//! The graph and document stores share one staged-session model: a session
//! writes into a private working copy and records an operation log, and
//! commit replays that log against the live state under a write lock. Either
//! the whole log applies or none of it does. Both stores can persist to a
//! JSON snapshot file that is rewritten on every commit.

mod staged;

pub mod cache;
pub mod document;
pub mod error;
pub mod graph;

pub use cache::MemoryCache;
pub use document::{DocumentSession, DocumentState, MemoryDocumentStore};
pub use error::{Error, Result};
pub use graph::{GraphSession, GraphState, MemoryGraphStore};
pub use staged::{StagedSession, StagedState};

#[cfg(test)]
mod tests;
