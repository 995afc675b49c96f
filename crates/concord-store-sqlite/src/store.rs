//! [`SqliteStore`]: the SQLite implementation of the relational
//! [`StoreAdapter`].

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use concord_core::{
  operation::{OpOutput, RelationalOp, StoreKind},
  store::StoreAdapter,
};
use rusqlite::{OptionalExtension as _, types::Value};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{RawConcept, decode_uuid, encode_dt, encode_uuid},
  schema::{SCHEMA, SELECT_CONCEPT},
};

/// Default number of concurrently open sessions.
pub const DEFAULT_MAX_SESSIONS: usize = 8;

/// How long a session waits for the SQLite write lock before failing.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

// ─── Store ───────────────────────────────────────────────────────────────────

/// The relational store, backed by a single SQLite file.
///
/// Autocommit reads share one reader connection. Each session opens its own
/// connection, bounded by a semaphore that acts as the connection pool.
///
/// Cloning is cheap; clones share the reader and the pool.
#[derive(Clone)]
pub struct SqliteStore {
  path:    Arc<PathBuf>,
  reader:  tokio_rusqlite::Connection,
  permits: Arc<Semaphore>,
}

/// An open unit-of-work: a dedicated connection inside `BEGIN IMMEDIATE`.
#[derive(Debug)]
pub struct SqliteSession {
  id:      Uuid,
  conn:    tokio_rusqlite::Connection,
  _permit: OwnedSemaphorePermit,
}

impl SqliteSession {
  pub fn id(&self) -> Uuid { self.id }
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    Self::open_with_pool(path, DEFAULT_MAX_SESSIONS).await
  }

  /// Like [`open`](Self::open) with an explicit session pool size.
  pub async fn open_with_pool(path: impl AsRef<Path>, max_sessions: usize) -> Result<Self> {
    let path = path.as_ref().to_path_buf();
    let reader = tokio_rusqlite::Connection::open(&path).await?;
    reader
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;

    tracing::debug!(path = %path.display(), max_sessions, "opened relational store");

    Ok(Self {
      path: Arc::new(path),
      reader,
      permits: Arc::new(Semaphore::new(max_sessions.max(1))),
    })
  }

  pub fn path(&self) -> &Path { &self.path }

  /// Number of sessions that can still be opened without waiting.
  pub fn available_sessions(&self) -> usize { self.permits.available_permits() }

  /// Refuse all future sessions. Sessions already open are unaffected.
  pub fn close_pool(&self) { self.permits.close(); }
}

// ─── Operation dispatch ──────────────────────────────────────────────────────

/// Undecoded operation output, produced on the database thread.
enum RawOutput {
  Affected(usize),
  Concept(Option<RawConcept>),
  ConceptIds(Vec<String>),
}

/// Execute `op` on `conn`. Runs inside a `tokio_rusqlite` call closure.
fn apply(conn: &rusqlite::Connection, op: RelationalOp) -> rusqlite::Result<RawOutput> {
  match op {
    RelationalOp::InsertConcept(concept) => {
      let raw = RawConcept::from_concept(&concept);
      let n = conn.execute(
        "INSERT INTO concepts (
           concept_id, creator_id, name, description,
           is_synthesis, is_public, created_at, updated_at
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        rusqlite::params![
          raw.concept_id,
          raw.creator_id,
          raw.name,
          raw.description,
          raw.is_synthesis,
          raw.is_public,
          raw.created_at,
          raw.updated_at,
        ],
      )?;
      Ok(RawOutput::Affected(n))
    }

    RelationalOp::PatchConcept { concept_id, patch, at } => {
      // Build the SET clause from the present fields only.
      let mut sets: Vec<&'static str> = vec![];
      let mut values: Vec<Value> = vec![];
      if let Some(name) = patch.name {
        sets.push("name = ?");
        values.push(Value::Text(name));
      }
      if let Some(description) = patch.description {
        sets.push("description = ?");
        values.push(Value::Text(description));
      }
      if let Some(flag) = patch.is_synthesis {
        sets.push("is_synthesis = ?");
        values.push(Value::Integer(flag.into()));
      }
      if let Some(flag) = patch.is_public {
        sets.push("is_public = ?");
        values.push(Value::Integer(flag.into()));
      }
      sets.push("updated_at = ?");
      values.push(Value::Text(encode_dt(at)));
      values.push(Value::Text(encode_uuid(concept_id)));

      let sql = format!("UPDATE concepts SET {} WHERE concept_id = ?", sets.join(", "));
      let n = conn.execute(&sql, rusqlite::params_from_iter(values))?;
      Ok(RawOutput::Affected(n))
    }

    RelationalOp::DeleteConcept(concept_id) => {
      let n = conn.execute(
        "DELETE FROM concepts WHERE concept_id = ?1",
        rusqlite::params![encode_uuid(concept_id)],
      )?;
      Ok(RawOutput::Affected(n))
    }

    RelationalOp::GetConcept(concept_id) => {
      let raw = conn
        .query_row(
          SELECT_CONCEPT,
          rusqlite::params![encode_uuid(concept_id)],
          RawConcept::from_row,
        )
        .optional()?;
      Ok(RawOutput::Concept(raw))
    }

    RelationalOp::ListConceptIds => {
      let mut stmt =
        conn.prepare("SELECT concept_id FROM concepts ORDER BY created_at, concept_id")?;
      let ids = stmt
        .query_map([], |row| row.get(0))?
        .collect::<rusqlite::Result<Vec<String>>>()?;
      Ok(RawOutput::ConceptIds(ids))
    }
  }
}

/// For patches and deletes, the id that must match exactly one row.
fn required_row(op: &RelationalOp) -> Option<Uuid> {
  match op {
    RelationalOp::PatchConcept { concept_id, .. } | RelationalOp::DeleteConcept(concept_id) => {
      Some(*concept_id)
    }
    _ => None,
  }
}

fn decode(raw: RawOutput, required: Option<Uuid>) -> Result<OpOutput> {
  match (raw, required) {
    (RawOutput::Affected(0), Some(concept_id)) => Err(Error::ConceptNotFound(concept_id)),
    (RawOutput::Affected(n), _) => Ok(OpOutput::Affected(n)),
    (RawOutput::Concept(raw), _) => Ok(OpOutput::Concept(
      raw.map(RawConcept::into_concept).transpose()?,
    )),
    (RawOutput::ConceptIds(ids), _) => Ok(OpOutput::ConceptIds(
      ids.iter().map(|s| decode_uuid(s)).collect::<Result<_>>()?,
    )),
  }
}

async fn run_on(conn: &tokio_rusqlite::Connection, op: RelationalOp) -> Result<OpOutput> {
  let required = required_row(&op);
  let raw = conn.call(move |conn| Ok(apply(conn, op)?)).await?;
  decode(raw, required)
}

// ─── StoreAdapter impl ───────────────────────────────────────────────────────

impl StoreAdapter for SqliteStore {
  type Session = SqliteSession;
  type Op = RelationalOp;
  type Error = Error;

  fn kind(&self) -> StoreKind { StoreKind::Relational }

  async fn open_session(&self) -> Result<SqliteSession> {
    let permit = self
      .permits
      .clone()
      .acquire_owned()
      .await
      .map_err(|_| Error::PoolClosed)?;

    let conn = tokio_rusqlite::Connection::open(self.path.as_path()).await?;
    conn
      .call(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(())
      })
      .await?;

    let session = SqliteSession { id: Uuid::new_v4(), conn, _permit: permit };
    tracing::debug!(session = %session.id, "relational session opened");
    Ok(session)
  }

  async fn execute(&self, session: &mut SqliteSession, op: RelationalOp) -> Result<OpOutput> {
    run_on(&session.conn, op).await
  }

  async fn commit(&self, session: SqliteSession) -> Result<()> {
    session
      .conn
      .call(|conn| {
        conn.execute_batch("COMMIT")?;
        Ok(())
      })
      .await?;
    tracing::debug!(session = %session.id, "relational session committed");
    Ok(())
  }

  async fn rollback(&self, session: SqliteSession) -> Result<()> {
    session
      .conn
      .call(|conn| {
        conn.execute_batch("ROLLBACK")?;
        Ok(())
      })
      .await?;
    tracing::debug!(session = %session.id, "relational session rolled back");
    Ok(())
  }

  async fn query(&self, op: RelationalOp) -> Result<OpOutput> {
    run_on(&self.reader, op).await
  }
}
