//! The denormalised composite view held by the cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{
  concept::Concept,
  document::Document,
  graph::{Category, ConceptNode, Relationship},
};

/// Everything known about one concept, assembled from all three stores.
/// Never authoritative; always rebuildable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptView {
  pub concept:       Concept,
  /// `None` when the graph store has no node for the concept.
  pub node:          Option<ConceptNode>,
  pub categories:    Vec<Category>,
  pub relationships: Vec<Relationship>,
  pub documents:     Vec<Document>,
  pub assembled_at:  DateTime<Utc>,
}
