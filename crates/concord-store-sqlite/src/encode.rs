//! Encoding and decoding helpers between domain types and SQLite columns.
//!
//! Timestamps are RFC 3339 strings, UUIDs hyphenated lowercase strings, and
//! flags integers.

use chrono::{DateTime, Utc};
use concord_core::concept::Concept;
use uuid::Uuid;

use crate::{Error, Result};

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

/// Raw column values of one `concepts` row.
pub struct RawConcept {
  pub concept_id:   String,
  pub creator_id:   String,
  pub name:         String,
  pub description:  String,
  pub is_synthesis: bool,
  pub is_public:    bool,
  pub created_at:   String,
  pub updated_at:   String,
}

impl RawConcept {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(RawConcept {
      concept_id:   row.get(0)?,
      creator_id:   row.get(1)?,
      name:         row.get(2)?,
      description:  row.get(3)?,
      is_synthesis: row.get(4)?,
      is_public:    row.get(5)?,
      created_at:   row.get(6)?,
      updated_at:   row.get(7)?,
    })
  }

  pub fn from_concept(c: &Concept) -> Self {
    RawConcept {
      concept_id:   encode_uuid(c.concept_id),
      creator_id:   encode_uuid(c.creator_id),
      name:         c.name.clone(),
      description:  c.description.clone(),
      is_synthesis: c.is_synthesis,
      is_public:    c.is_public,
      created_at:   encode_dt(c.created_at),
      updated_at:   encode_dt(c.updated_at),
    }
  }

  pub fn into_concept(self) -> Result<Concept> {
    Ok(Concept {
      concept_id:   decode_uuid(&self.concept_id)?,
      creator_id:   decode_uuid(&self.creator_id)?,
      name:         self.name,
      description:  self.description,
      is_synthesis: self.is_synthesis,
      is_public:    self.is_public,
      created_at:   decode_dt(&self.created_at)?,
      updated_at:   decode_dt(&self.updated_at)?,
    })
  }
}
