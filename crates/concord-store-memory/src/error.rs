//! Error type for `concord-store-memory`.

use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum Error {
  #[error("concept node already exists: {0}")]
  DuplicateNode(Uuid),

  #[error("concept node not found: {0}")]
  ConceptNodeNotFound(Uuid),

  #[error("category {0} already exists")]
  DuplicateCategory(Uuid),

  #[error("category {category_id} not found under concept {concept_id}")]
  CategoryNotFound { concept_id: Uuid, category_id: Uuid },

  #[error("category {category_id} belongs to concept {actual}, not {expected}")]
  CrossConcept {
    category_id: Uuid,
    expected:    Uuid,
    actual:      Uuid,
  },

  #[error("relationship {0} already exists")]
  DuplicateRelationship(Uuid),

  #[error("relationship weight must be finite, got {0}")]
  InvalidWeight(f64),

  #[error("document {0} already exists")]
  DuplicateDocument(Uuid),

  #[error("document {document_id} not found under concept {concept_id}")]
  DocumentNotFound { concept_id: Uuid, document_id: Uuid },

  #[error("session pool is closed")]
  PoolClosed,

  #[error("snapshot io error: {0}")]
  Snapshot(#[from] std::io::Error),

  #[error("snapshot json error: {0}")]
  Json(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
