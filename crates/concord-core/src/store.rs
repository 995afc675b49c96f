//! The `StoreAdapter` and `CacheStore` traits.
//!
//! Each backing store is driven through one adapter. The coordinator in
//! `concord-sync` depends on these abstractions, never on a concrete backend.

use std::{future::Future, time::Duration};

use crate::operation::{DocumentOp, GraphOp, OpOutput, RelationalOp, StoreKind};

// ─── Adapter ─────────────────────────────────────────────────────────────────

/// A uniform handle to one backing store.
///
/// A *session* is the store's unit-of-work: writes executed through it are
/// invisible to other sessions until [`commit`](Self::commit) and are
/// discarded by [`rollback`](Self::rollback). Both consume the session, so a
/// finished unit-of-work cannot be reused.
///
/// All methods return `Send` futures so adapters can be driven from a
/// multi-threaded tokio runtime.
pub trait StoreAdapter: Send + Sync {
  /// The open unit-of-work handle.
  type Session: Send;
  /// The operation type this store understands.
  type Op: Send + 'static;
  type Error: std::error::Error + Send + Sync + 'static;

  /// Which store this adapter fronts.
  fn kind(&self) -> StoreKind;

  /// Open a unit-of-work. Fails if the store is unreachable or its session
  /// pool is closed.
  fn open_session(
    &self,
  ) -> impl Future<Output = Result<Self::Session, Self::Error>> + Send + '_;

  /// Execute exactly one operation inside `session`.
  fn execute<'a>(
    &'a self,
    session: &'a mut Self::Session,
    op: Self::Op,
  ) -> impl Future<Output = Result<OpOutput, Self::Error>> + Send + 'a;

  /// Make the session's writes durable and visible.
  fn commit(
    &self,
    session: Self::Session,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Discard the session's writes.
  fn rollback(
    &self,
    session: Self::Session,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Execute one operation outside any unit-of-work (autocommit).
  fn query(
    &self,
    op: Self::Op,
  ) -> impl Future<Output = Result<OpOutput, Self::Error>> + Send + '_;
}

/// An adapter for the relational store.
pub trait RelationalAdapter: StoreAdapter<Op = RelationalOp> + 'static {}
impl<T: StoreAdapter<Op = RelationalOp> + 'static> RelationalAdapter for T {}

/// An adapter for the graph store.
pub trait GraphAdapter: StoreAdapter<Op = GraphOp> + 'static {}
impl<T: StoreAdapter<Op = GraphOp> + 'static> GraphAdapter for T {}

/// An adapter for the document store.
pub trait DocumentAdapter: StoreAdapter<Op = DocumentOp> + 'static {}
impl<T: StoreAdapter<Op = DocumentOp> + 'static> DocumentAdapter for T {}

// ─── Cache ───────────────────────────────────────────────────────────────────

/// A key-value cache with per-entry expiry. Values are opaque strings.
pub trait CacheStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Return the live value under `key`, or `None` if absent or expired.
  fn get<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<Option<String>, Self::Error>> + Send + 'a;

  fn set(
    &self,
    key: String,
    value: String,
    ttl: Duration,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Remove `key`. Returns whether a live entry was removed.
  fn delete<'a>(
    &'a self,
    key: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;
}
