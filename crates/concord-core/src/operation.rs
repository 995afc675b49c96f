//! Typed per-store operations and their outputs.
//!
//! An operation is a tagged union rather than an options bag: the variant
//! selects the target store, and each store's adapter only ever sees its own
//! operation type.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  Error, Result,
  concept::{Concept, ConceptPatch},
  document::{Document, DocumentPatch},
  graph::{Category, CategoryPatch, ConceptNode, Relationship},
};

// ─── Store kinds ─────────────────────────────────────────────────────────────

/// The participating stores, in their default commit order.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
  Relational,
  Graph,
  Document,
}

impl StoreKind {
  pub const ALL: [StoreKind; 3] =
    [StoreKind::Relational, StoreKind::Graph, StoreKind::Document];

  pub fn as_str(self) -> &'static str {
    match self {
      StoreKind::Relational => "relational",
      StoreKind::Graph => "graph",
      StoreKind::Document => "document",
    }
  }
}

impl fmt::Display for StoreKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

// ─── Operations ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum RelationalOp {
  InsertConcept(Concept),
  /// Write only the `Some` fields of `patch`, stamping `updated_at = at`.
  PatchConcept {
    concept_id: Uuid,
    patch:      ConceptPatch,
    at:         DateTime<Utc>,
  },
  DeleteConcept(Uuid),
  GetConcept(Uuid),
  ListConceptIds,
}

#[derive(Debug, Clone)]
pub enum GraphOp {
  /// Create the concept node, its categories, and the `INCLUDES` edges in one
  /// batch.
  CreateConceptGraph {
    node:       ConceptNode,
    categories: Vec<Category>,
  },
  /// Create the concept node, or overwrite it if present.
  UpsertConceptNode(ConceptNode),
  CreateRelationship(Relationship),
  PatchConceptNode {
    concept_id:  Uuid,
    name:        Option<String>,
    description: Option<String>,
  },
  PatchCategory {
    concept_id: Uuid,
    patch:      CategoryPatch,
  },
  /// Detach and delete the concept node with every category and edge scoped
  /// to it.
  DeleteConceptGraph(Uuid),
  GetConceptNode(Uuid),
  ListCategories(Uuid),
  ListRelationships(Uuid),
  /// Every concept id that owns a node, a category, or an edge.
  ListConceptIds,
}

#[derive(Debug, Clone)]
pub enum DocumentOp {
  InsertMany(Vec<Document>),
  Patch {
    concept_id: Uuid,
    patch:      DocumentPatch,
    at:         DateTime<Utc>,
  },
  DeleteByConcept(Uuid),
  FindByConcept(Uuid),
  ListConceptIds,
}

impl RelationalOp {
  pub fn is_read(&self) -> bool {
    matches!(self, Self::GetConcept(_) | Self::ListConceptIds)
  }
}

impl GraphOp {
  pub fn is_read(&self) -> bool {
    matches!(
      self,
      Self::GetConceptNode(_)
        | Self::ListCategories(_)
        | Self::ListRelationships(_)
        | Self::ListConceptIds
    )
  }
}

impl DocumentOp {
  pub fn is_read(&self) -> bool {
    matches!(self, Self::FindByConcept(_) | Self::ListConceptIds)
  }
}

/// One operation against one store.
#[derive(Debug, Clone)]
pub enum StoreOperation {
  Relational(RelationalOp),
  Graph(GraphOp),
  Document(DocumentOp),
}

impl StoreOperation {
  pub fn kind(&self) -> StoreKind {
    match self {
      StoreOperation::Relational(_) => StoreKind::Relational,
      StoreOperation::Graph(_) => StoreKind::Graph,
      StoreOperation::Document(_) => StoreKind::Document,
    }
  }

  pub fn is_read(&self) -> bool {
    match self {
      StoreOperation::Relational(op) => op.is_read(),
      StoreOperation::Graph(op) => op.is_read(),
      StoreOperation::Document(op) => op.is_read(),
    }
  }
}

impl From<RelationalOp> for StoreOperation {
  fn from(op: RelationalOp) -> Self { StoreOperation::Relational(op) }
}

impl From<GraphOp> for StoreOperation {
  fn from(op: GraphOp) -> Self { StoreOperation::Graph(op) }
}

impl From<DocumentOp> for StoreOperation {
  fn from(op: DocumentOp) -> Self { StoreOperation::Document(op) }
}

// ─── Outputs ─────────────────────────────────────────────────────────────────

/// The raw result of one operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OpOutput {
  /// Number of rows / nodes / edges / documents written or removed.
  Affected(usize),
  Concept(Option<Concept>),
  ConceptIds(Vec<Uuid>),
  ConceptNode(Option<ConceptNode>),
  Categories(Vec<Category>),
  Relationships(Vec<Relationship>),
  Documents(Vec<Document>),
}

impl OpOutput {
  pub fn variant_name(&self) -> &'static str {
    match self {
      OpOutput::Affected(_) => "affected",
      OpOutput::Concept(_) => "concept",
      OpOutput::ConceptIds(_) => "concept_ids",
      OpOutput::ConceptNode(_) => "concept_node",
      OpOutput::Categories(_) => "categories",
      OpOutput::Relationships(_) => "relationships",
      OpOutput::Documents(_) => "documents",
    }
  }

  fn mismatch(&self, store: StoreKind, expected: &'static str) -> Error {
    Error::UnexpectedOutput { store, expected, actual: self.variant_name() }
  }

  pub fn into_affected(self, store: StoreKind) -> Result<usize> {
    match self {
      OpOutput::Affected(n) => Ok(n),
      other => Err(other.mismatch(store, "affected")),
    }
  }

  pub fn into_concept(self, store: StoreKind) -> Result<Option<Concept>> {
    match self {
      OpOutput::Concept(c) => Ok(c),
      other => Err(other.mismatch(store, "concept")),
    }
  }

  pub fn into_concept_ids(self, store: StoreKind) -> Result<Vec<Uuid>> {
    match self {
      OpOutput::ConceptIds(ids) => Ok(ids),
      other => Err(other.mismatch(store, "concept_ids")),
    }
  }

  pub fn into_concept_node(self, store: StoreKind) -> Result<Option<ConceptNode>> {
    match self {
      OpOutput::ConceptNode(n) => Ok(n),
      other => Err(other.mismatch(store, "concept_node")),
    }
  }

  pub fn into_categories(self, store: StoreKind) -> Result<Vec<Category>> {
    match self {
      OpOutput::Categories(c) => Ok(c),
      other => Err(other.mismatch(store, "categories")),
    }
  }

  pub fn into_relationships(self, store: StoreKind) -> Result<Vec<Relationship>> {
    match self {
      OpOutput::Relationships(r) => Ok(r),
      other => Err(other.mismatch(store, "relationships")),
    }
  }

  pub fn into_documents(self, store: StoreKind) -> Result<Vec<Document>> {
    match self {
      OpOutput::Documents(d) => Ok(d),
      other => Err(other.mismatch(store, "documents")),
    }
  }
}
