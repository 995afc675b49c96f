//! Cross-store coordination for Concord.
//!
//! - [`Coordinator`] runs one logical transaction over the relational, graph,
//!   and document stores.
//! - [`Synchronizer`] expresses create, update, and delete as sagas on top of
//!   the coordinator, keeps the [`ConceptCache`] coherent, and publishes
//!   [`SyncEvent`](concord_core::event::SyncEvent)s.
//! - [`Validator`] detects divergence between the stores and repairs what has
//!   a source of truth to repair from.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod events;
pub mod lease;
pub mod synchronizer;
#[cfg(feature = "testkit")]
pub mod testkit;
pub mod transaction;
pub mod validator;

pub use cache::ConceptCache;
pub use config::{CacheConfig, CoordinatorConfig, ValidatorConfig};
pub use coordinator::Coordinator;
pub use error::{Error, Result};
pub use events::EventBus;
pub use lease::{ConceptLease, ConceptLeases};
pub use synchronizer::Synchronizer;
pub use transaction::{CancellationToken, CommitReport, RollbackReport, TxId, TxState};
pub use validator::Validator;
