//! Error type for `concord-sync`.

use std::fmt;

use concord_core::operation::StoreKind;
use thiserror::Error;
use uuid::Uuid;

pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// The adapter call a store failure happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
  Open,
  Execute,
  Commit,
  Rollback,
}

impl fmt::Display for Stage {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(match self {
      Stage::Open => "open",
      Stage::Execute => "execute",
      Stage::Commit => "commit",
      Stage::Rollback => "rollback",
    })
  }
}

#[derive(Debug, Error)]
pub enum Error {
  /// A store could not open a unit-of-work.
  #[error("{store} store unavailable: {source}")]
  Connection {
    store:  StoreKind,
    #[source]
    source: BoxError,
  },

  /// A store rejected an operation.
  #[error("{store} store rejected operation: {source}")]
  Operation {
    store:  StoreKind,
    #[source]
    source: BoxError,
  },

  /// A commit failed part-way through the commit order. Stores listed in
  /// `committed` are durable and cannot be undone.
  ///
  /// `store` itself is in doubt when the source is a commit timeout: the
  /// timed-out call is abandoned, not cancelled, and a backend that finishes
  /// it anyway (SQLite does, on its own thread) ends up committed without
  /// being listed in `committed`. Run the validator before trusting either
  /// list in that case.
  #[error("commit failed on {store} store after committing {committed:?}: {source}")]
  Commit {
    store:       StoreKind,
    committed:   Vec<StoreKind>,
    rolled_back: Vec<StoreKind>,
    #[source]
    source:      BoxError,
  },

  /// An adapter call ran past the configured operation timeout.
  #[error("{store} store timed out during {stage}")]
  Timeout { store: StoreKind, stage: Stage },

  #[error("transaction {0} was cancelled")]
  Cancelled(Uuid),

  #[error("unknown transaction: {0}")]
  UnknownTransaction(Uuid),

  #[error("{store} store is not enlisted in transaction {tx_id}")]
  NotEnlisted { tx_id: Uuid, store: StoreKind },

  #[error("concept not found: {0}")]
  NotFound(Uuid),

  #[error("invalid input: {0}")]
  InvalidInput(String),

  #[error("cache error: {0}")]
  Cache(#[source] BoxError),

  #[error("invalid configuration: {0}")]
  Config(String),

  #[error(transparent)]
  Core(#[from] concord_core::Error),
}

impl Error {
  /// Stores that committed before this error was raised.
  pub fn committed_stores(&self) -> &[StoreKind] {
    match self {
      Error::Commit { committed, .. } => committed,
      _ => &[],
    }
  }

  /// Whether the stores may have diverged because of this error.
  pub fn is_partial_commit(&self) -> bool { !self.committed_stores().is_empty() }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
