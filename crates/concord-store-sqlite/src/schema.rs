//! SQL schema for the relational store.
//!
//! Executed once when the store is opened. Future migrations will be gated on
//! `PRAGMA user_version`.

/// Full schema DDL; idempotent thanks to `CREATE TABLE IF NOT EXISTS`.
pub const SCHEMA: &str = "
PRAGMA journal_mode = WAL;

CREATE TABLE IF NOT EXISTS concepts (
    concept_id    TEXT PRIMARY KEY,
    creator_id    TEXT NOT NULL,
    name          TEXT NOT NULL,
    description   TEXT NOT NULL DEFAULT '',
    is_synthesis  INTEGER NOT NULL DEFAULT 0,
    is_public     INTEGER NOT NULL DEFAULT 0,
    created_at    TEXT NOT NULL,   -- RFC 3339 UTC
    updated_at    TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS concepts_creator_idx ON concepts(creator_id);

PRAGMA user_version = 1;
";

pub const SELECT_CONCEPT: &str = "
SELECT concept_id, creator_id, name, description, is_synthesis, is_public,
       created_at, updated_at
FROM concepts
WHERE concept_id = ?1";
