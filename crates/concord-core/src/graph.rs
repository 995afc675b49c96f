//! Graph-store elements: the concept node, its categories, and the typed
//! relationship edges between categories.
//!
//! Structure in the graph store:
//!
//! ```text
//! (Concept) -[:INCLUDES]-> (Category) -[:RELATED_TO {relation, weight}]-> (Category)
//! ```
//!
//! Every category and every relationship is scoped to exactly one concept id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The graph-side mirror of a relational [`Concept`](crate::concept::Concept).
///
/// `name` and `description` are display fields copied from the relational
/// row; the integrity validator compares them field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptNode {
  pub concept_id:  Uuid,
  pub name:        String,
  pub description: String,
  pub created_at:  DateTime<Utc>,
}

impl ConceptNode {
  pub fn from_concept(concept: &crate::concept::Concept) -> Self {
    Self {
      concept_id:  concept.concept_id,
      name:        concept.name.clone(),
      description: concept.description.clone(),
      created_at:  concept.created_at,
    }
  }
}

/// A category node owned by a concept through an `INCLUDES` edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
  pub category_id: Uuid,
  pub concept_id:  Uuid,
  pub name:        String,
  pub description: String,
}

/// A directed, typed, weighted `RELATED_TO` edge between two categories of
/// the same concept.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Relationship {
  pub relationship_id: Uuid,
  pub concept_id:      Uuid,
  pub source_id:       Uuid,
  pub target_id:       Uuid,
  /// Free-form relation type, e.g. `"causes"` or `"part_of"`.
  pub relation:        String,
  pub weight:          f64,
}

/// The full graph payload of one concept, as written by the create saga.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConceptGraph {
  pub categories:    Vec<Category>,
  pub relationships: Vec<Relationship>,
}

// ─── Caller-side drafts ──────────────────────────────────────────────────────

/// A category as described by a caller before the concept exists.
///
/// The id is chosen by the caller so documents in the same request can
/// reference it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryDraft {
  #[serde(default = "Uuid::new_v4")]
  pub category_id: Uuid,
  pub name:        String,
  #[serde(default)]
  pub description: String,
}

impl CategoryDraft {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      category_id: Uuid::new_v4(),
      name:        name.into(),
      description: String::new(),
    }
  }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationshipDraft {
  pub source_id: Uuid,
  pub target_id: Uuid,
  pub relation:  String,
  #[serde(default = "default_weight")]
  pub weight:    f64,
}

fn default_weight() -> f64 { 1.0 }

/// Graph half of a create request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GraphDraft {
  #[serde(default)]
  pub categories:    Vec<CategoryDraft>,
  #[serde(default)]
  pub relationships: Vec<RelationshipDraft>,
}

impl GraphDraft {
  /// Bind every draft element to `concept_id`, assigning relationship ids.
  pub fn into_graph(self, concept_id: Uuid) -> ConceptGraph {
    let categories = self
      .categories
      .into_iter()
      .map(|c| Category {
        category_id: c.category_id,
        concept_id,
        name: c.name,
        description: c.description,
      })
      .collect();

    let relationships = self
      .relationships
      .into_iter()
      .map(|r| Relationship {
        relationship_id: Uuid::new_v4(),
        concept_id,
        source_id: r.source_id,
        target_id: r.target_id,
        relation: r.relation,
        weight: r.weight,
      })
      .collect();

    ConceptGraph { categories, relationships }
  }
}

/// A partial update of one category node.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryPatch {
  pub category_id: Uuid,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name:        Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description: Option<String>,
}

impl CategoryPatch {
  pub fn is_empty(&self) -> bool { self.name.is_none() && self.description.is_none() }
}
