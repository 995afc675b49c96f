//! Error type for `concord-store-sqlite`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  #[error("concept not found: {0}")]
  ConceptNotFound(uuid::Uuid),

  #[error("session pool is closed")]
  PoolClosed,
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
