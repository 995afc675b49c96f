//! The staged-session engine shared by the graph and document stores.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use concord_core::operation::OpOutput;
use serde::{Serialize, de::DeserializeOwned};
use tokio::sync::{OwnedSemaphorePermit, RwLock, Semaphore};
use uuid::Uuid;

use crate::{Error, Result};

/// Default number of concurrently open sessions per store.
pub const DEFAULT_MAX_SESSIONS: usize = 64;

/// A store state that can apply its own operations.
///
/// `write` must be deterministic: commit replays the logged operations
/// against the live state and relies on getting the same outcome whenever the
/// touched elements are unchanged.
pub trait StagedState:
  Clone + Default + Serialize + DeserializeOwned + Send + Sync + 'static
{
  type Op: Clone + Send + Sync + 'static;

  fn is_read(op: &Self::Op) -> bool;

  fn read(&self, op: &Self::Op) -> Result<OpOutput>;

  fn write(&mut self, op: &Self::Op) -> Result<OpOutput>;

  fn apply(&mut self, op: &Self::Op) -> Result<OpOutput> {
    if Self::is_read(op) { self.read(op) } else { self.write(op) }
  }
}

/// An open unit-of-work against a staged store.
pub struct StagedSession<S: StagedState> {
  id:      Uuid,
  working: S,
  log:     Vec<S::Op>,
  _permit: OwnedSemaphorePermit,
}

impl<S: StagedState> StagedSession<S> {
  pub fn id(&self) -> Uuid { self.id }

  /// Number of writes waiting for commit.
  pub fn pending_writes(&self) -> usize { self.log.len() }
}

pub struct StagedStore<S> {
  live:     Arc<RwLock<S>>,
  snapshot: Option<Arc<PathBuf>>,
  permits:  Arc<Semaphore>,
}

impl<S> Clone for StagedStore<S> {
  fn clone(&self) -> Self {
    Self {
      live:     Arc::clone(&self.live),
      snapshot: self.snapshot.clone(),
      permits:  Arc::clone(&self.permits),
    }
  }
}

impl<S: StagedState> StagedStore<S> {
  pub fn in_memory(max_sessions: usize) -> Self {
    Self {
      live:     Arc::new(RwLock::new(S::default())),
      snapshot: None,
      permits:  Arc::new(Semaphore::new(max_sessions.max(1))),
    }
  }

  /// Load the snapshot at `path` if it exists, and persist there on commit.
  pub async fn open(path: &Path, max_sessions: usize) -> Result<Self> {
    let state = match tokio::fs::read(path).await {
      Ok(bytes) => serde_json::from_slice(&bytes)?,
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => S::default(),
      Err(e) => return Err(e.into()),
    };
    Ok(Self {
      live:     Arc::new(RwLock::new(state)),
      snapshot: Some(Arc::new(path.to_path_buf())),
      permits:  Arc::new(Semaphore::new(max_sessions.max(1))),
    })
  }

  pub fn close_pool(&self) { self.permits.close(); }

  pub fn available_sessions(&self) -> usize { self.permits.available_permits() }

  pub async fn open_session(&self) -> Result<StagedSession<S>> {
    let permit = self
      .permits
      .clone()
      .acquire_owned()
      .await
      .map_err(|_| Error::PoolClosed)?;
    let working = self.live.read().await.clone();
    Ok(StagedSession { id: Uuid::new_v4(), working, log: Vec::new(), _permit: permit })
  }

  /// Apply `op` to the session's working copy, logging it if it writes.
  pub fn execute(&self, session: &mut StagedSession<S>, op: S::Op) -> Result<OpOutput> {
    let out = session.working.apply(&op)?;
    if !S::is_read(&op) {
      session.log.push(op);
    }
    Ok(out)
  }

  /// Replay the session log against the live state. All or nothing.
  pub async fn commit(&self, session: StagedSession<S>) -> Result<usize> {
    let StagedSession { log, .. } = session;
    if log.is_empty() {
      return Ok(0);
    }

    let mut live = self.live.write().await;
    let mut next = live.clone();
    for op in &log {
      next.write(op)?;
    }
    self.persist(&next).await?;
    *live = next;
    Ok(log.len())
  }

  /// Autocommit: reads share the live state, writes commit immediately.
  pub async fn query(&self, op: S::Op) -> Result<OpOutput> {
    if S::is_read(&op) {
      return self.live.read().await.read(&op);
    }
    let mut live = self.live.write().await;
    let mut next = live.clone();
    let out = next.write(&op)?;
    self.persist(&next).await?;
    *live = next;
    Ok(out)
  }

  /// Run `f` against the committed state.
  pub async fn inspect<R>(&self, f: impl FnOnce(&S) -> R) -> R { f(&*self.live.read().await) }

  async fn persist(&self, state: &S) -> Result<()> {
    let Some(path) = &self.snapshot else {
      return Ok(());
    };
    let bytes = serde_json::to_vec_pretty(state)?;
    let tmp = path.with_extension("tmp");
    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path.as_path()).await?;
    Ok(())
  }
}
