//! Transaction bookkeeping: one open session per enlisted store.

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
  },
  time::Instant,
};

use concord_core::{operation::StoreKind, store::StoreAdapter};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type TxId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxState {
  Active,
  Committed,
  RolledBack,
}

/// Stores that committed, in commit order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitReport {
  pub tx_id:     TxId,
  pub committed: Vec<StoreKind>,
}

/// Outcome of a rollback. Rollback never fails as a whole; stores whose
/// rollback errored are listed in `failed`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RollbackReport {
  pub tx_id:       TxId,
  pub rolled_back: Vec<StoreKind>,
  pub failed:      Vec<StoreKind>,
}

impl RollbackReport {
  pub(crate) fn new(tx_id: TxId) -> Self { Self { tx_id, ..Default::default() } }

  pub fn is_clean(&self) -> bool { self.failed.is_empty() }
}

// ─── Cancellation ────────────────────────────────────────────────────────────

/// Cooperative cancellation flag shared between a transaction and whoever
/// holds its token. Checked before every operation and before commit.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
  cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
  pub fn new() -> Self { Self::default() }

  pub fn cancel(&self) { self.cancelled.store(true, Ordering::SeqCst); }

  pub fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::SeqCst) }
}

// ─── Transaction ─────────────────────────────────────────────────────────────

pub(crate) struct Transaction<R: StoreAdapter, G: StoreAdapter, D: StoreAdapter> {
  pub id:         TxId,
  pub state:      TxState,
  pub enlisted:   Vec<StoreKind>,
  pub relational: Option<R::Session>,
  pub graph:      Option<G::Session>,
  pub document:   Option<D::Session>,
  pub cancel:     CancellationToken,
  pub opened_at:  Instant,
}

impl<R: StoreAdapter, G: StoreAdapter, D: StoreAdapter> Transaction<R, G, D> {
  pub fn new(id: TxId, enlisted: Vec<StoreKind>, cancel: CancellationToken) -> Self {
    Self {
      id,
      state: TxState::Active,
      enlisted,
      relational: None,
      graph: None,
      document: None,
      cancel,
      opened_at: Instant::now(),
    }
  }
}
