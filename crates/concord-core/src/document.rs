//! Documents: free-form text artifacts (e.g. a thesis) attached to a concept.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A record in the document store.
///
/// `category_ids` must resolve to categories of the same concept in the graph
/// store; the integrity validator reports any that do not.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
  pub document_id:  Uuid,
  pub concept_id:   Uuid,
  pub title:        String,
  pub content:      String,
  pub category_ids: Vec<Uuid>,
  pub created_at:   DateTime<Utc>,
  pub updated_at:   DateTime<Utc>,
}

/// Caller-supplied document content for a create request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentDraft {
  pub title:        String,
  #[serde(default)]
  pub content:      String,
  #[serde(default)]
  pub category_ids: Vec<Uuid>,
}

impl DocumentDraft {
  pub fn into_document(self, concept_id: Uuid, at: DateTime<Utc>) -> Document {
    Document {
      document_id: Uuid::new_v4(),
      concept_id,
      title: self.title,
      content: self.content,
      category_ids: self.category_ids,
      created_at: at,
      updated_at: at,
    }
  }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentPatch {
  pub document_id:  Uuid,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub title:        Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub content:      Option<String>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub category_ids: Option<Vec<Uuid>>,
}

impl DocumentPatch {
  pub fn is_empty(&self) -> bool {
    self.title.is_none() && self.content.is_none() && self.category_ids.is_none()
  }

  pub fn apply_to(&self, document: &mut Document, at: DateTime<Utc>) {
    if let Some(title) = &self.title {
      document.title = title.clone();
    }
    if let Some(content) = &self.content {
      document.content = content.clone();
    }
    if let Some(ids) = &self.category_ids {
      document.category_ids = ids.clone();
    }
    document.updated_at = at;
  }
}
