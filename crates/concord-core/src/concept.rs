//! Concept: the relational record that owns identity and ownership.
//!
//! The relational store is the source of truth for a concept's existence and
//! for its display fields. Every other store refers back to `concept_id`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A concept row as persisted in the relational store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Concept {
  pub concept_id:   Uuid,
  pub creator_id:   Uuid,
  pub name:         String,
  pub description:  String,
  /// Whether the concept was produced by synthesising other concepts.
  pub is_synthesis: bool,
  pub is_public:    bool,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

/// Caller-supplied metadata for a concept that does not exist yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewConcept {
  pub creator_id:   Uuid,
  pub name:         String,
  #[serde(default)]
  pub description:  String,
  #[serde(default)]
  pub is_synthesis: bool,
  #[serde(default)]
  pub is_public:    bool,
}

impl NewConcept {
  pub fn new(creator_id: Uuid, name: impl Into<String>) -> Self {
    Self {
      creator_id,
      name: name.into(),
      description: String::new(),
      is_synthesis: false,
      is_public: false,
    }
  }

  /// Materialise the row under a freshly assigned `concept_id`.
  pub fn into_concept(self, concept_id: Uuid, at: DateTime<Utc>) -> Concept {
    Concept {
      concept_id,
      creator_id: self.creator_id,
      name: self.name,
      description: self.description,
      is_synthesis: self.is_synthesis,
      is_public: self.is_public,
      created_at: at,
      updated_at: at,
    }
  }
}

/// A partial update of the metadata row. Only `Some` fields are written.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConceptPatch {
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub name:         Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub description:  Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_synthesis: Option<bool>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub is_public:    Option<bool>,
}

impl ConceptPatch {
  pub fn is_empty(&self) -> bool {
    self.name.is_none()
      && self.description.is_none()
      && self.is_synthesis.is_none()
      && self.is_public.is_none()
  }

  /// True when the patch changes a field mirrored on the graph `Concept` node.
  pub fn touches_display_fields(&self) -> bool {
    self.name.is_some() || self.description.is_some()
  }
}
