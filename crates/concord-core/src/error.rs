//! Error types for `concord-core`.

use thiserror::Error;

use crate::operation::StoreKind;

#[derive(Debug, Error)]
pub enum Error {
  /// An adapter answered an operation with an output of the wrong shape.
  #[error("{store} store returned {actual} where {expected} was expected")]
  UnexpectedOutput {
    store:    StoreKind,
    expected: &'static str,
    actual:   &'static str,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
