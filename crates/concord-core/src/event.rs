//! Events emitted by the synchronizer and coordinator for observability
//! collaborators (metrics, alerting, scheduled validation).

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  concept::{Concept, ConceptPatch},
  document::{Document, DocumentPatch},
  graph::{CategoryPatch, ConceptGraph},
  operation::StoreKind,
};

/// The saga a sync event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncOperation {
  Create,
  Update,
  Delete,
}

impl std::fmt::Display for SyncOperation {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(match self {
      SyncOperation::Create => "create",
      SyncOperation::Update => "update",
      SyncOperation::Delete => "delete",
    })
  }
}

/// A set of changes applied to one existing concept in one transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptUpdate {
  #[serde(default)]
  pub metadata:   Option<ConceptPatch>,
  #[serde(default)]
  pub categories: Vec<CategoryPatch>,
  #[serde(default)]
  pub documents:  Vec<DocumentPatch>,
}

impl ConceptUpdate {
  pub fn is_empty(&self) -> bool {
    self.metadata.as_ref().is_none_or(ConceptPatch::is_empty)
      && self.categories.iter().all(CategoryPatch::is_empty)
      && self.documents.iter().all(DocumentPatch::is_empty)
  }
}

/// The unit being timed in an [`OperationTiming`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimedOperation {
  Begin,
  Run,
  Commit,
  Rollback,
  Saga(SyncOperation),
  Validate,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
  Success,
  Failure,
}

/// One timing sample: `{operation, store?, status, duration_ms}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationTiming {
  pub operation:   TimedOperation,
  pub store:       Option<StoreKind>,
  pub status:      OperationStatus,
  pub duration_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SyncEvent {
  ConceptCreated {
    concept:   Concept,
    graph:     ConceptGraph,
    documents: Vec<Document>,
  },
  ConceptUpdated {
    concept_id: Uuid,
    update:     ConceptUpdate,
  },
  ConceptDeleted {
    concept_id: Uuid,
  },
  /// A saga failed. `committed` lists stores that committed before the
  /// failure; non-empty means the stores may now diverge.
  SyncError {
    operation:  SyncOperation,
    concept_id: Uuid,
    error:      String,
    committed:  Vec<StoreKind>,
  },
  Timing(OperationTiming),
}
