//! [`Coordinator`]: one logical transaction spanning the three stores.
//!
//! This is a best-effort multi-store commit, not two-phase commit. Sessions
//! are committed one at a time in the configured order; once a store has
//! committed it cannot be undone, and a later failure surfaces as
//! [`Error::Commit`] listing what already committed.
//!
//! Every adapter call is bounded by the operation timeout. A commit that
//! times out is reported as a commit failure, but the store may still finish
//! it in the background; see [`Error::Commit`].

use std::{future::Future, sync::Arc, time::Instant};

use concord_core::{
  event::TimedOperation,
  operation::{OpOutput, StoreKind, StoreOperation},
  store::{DocumentAdapter, GraphAdapter, RelationalAdapter, StoreAdapter},
};
use dashmap::DashMap;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
  Error, Result,
  config::CoordinatorConfig,
  error::{BoxError, Stage},
  events::EventBus,
  lease::ConceptLeases,
  transaction::{CancellationToken, CommitReport, RollbackReport, Transaction, TxId, TxState},
};

/// A failed adapter call, before it is classified by stage.
enum Failure {
  Store(BoxError),
  Timeout,
}

impl Failure {
  /// The underlying cause, for wrapping inside a commit or rollback error.
  fn into_source(self, store: StoreKind, stage: Stage) -> BoxError {
    match self {
      Failure::Store(err) => err,
      Failure::Timeout => Box::new(Error::Timeout { store, stage }),
    }
  }

  /// The error surfaced for a failed open or execute.
  fn into_error(self, store: StoreKind, stage: Stage) -> Error {
    match (self, stage) {
      (Failure::Timeout, _) => Error::Timeout { store, stage },
      (Failure::Store(source), Stage::Open) => Error::Connection { store, source },
      (Failure::Store(source), _) => Error::Operation { store, source },
    }
  }
}

struct Entry<R: StoreAdapter, G: StoreAdapter, D: StoreAdapter> {
  tx:     Arc<Mutex<Transaction<R, G, D>>>,
  cancel: CancellationToken,
}

pub struct Coordinator<R, G, D>
where
  R: RelationalAdapter,
  G: GraphAdapter,
  D: DocumentAdapter,
{
  relational: R,
  graph:      G,
  document:   D,
  config:     CoordinatorConfig,
  events:     EventBus,
  leases:     ConceptLeases,
  active:     DashMap<TxId, Entry<R, G, D>>,
}

impl<R, G, D> Coordinator<R, G, D>
where
  R: RelationalAdapter,
  G: GraphAdapter,
  D: DocumentAdapter,
{
  pub fn new(relational: R, graph: G, document: D, config: CoordinatorConfig) -> Result<Self> {
    config.validate()?;
    let events = EventBus::new(config.event_capacity);
    Ok(Self {
      relational,
      graph,
      document,
      config,
      events,
      leases: ConceptLeases::new(),
      active: DashMap::new(),
    })
  }

  pub fn relational(&self) -> &R { &self.relational }

  pub fn graph(&self) -> &G { &self.graph }

  pub fn document(&self) -> &D { &self.document }

  pub fn config(&self) -> &CoordinatorConfig { &self.config }

  pub fn events(&self) -> &EventBus { &self.events }

  /// Per-concept leases shared by everything that writes through this
  /// coordinator: sagas, repairs, and cache fills.
  pub fn leases(&self) -> &ConceptLeases { &self.leases }

  /// Ids of transactions that have begun and not yet committed or rolled
  /// back.
  pub fn active_transactions(&self) -> Vec<TxId> {
    self.active.iter().map(|entry| *entry.key()).collect()
  }

  // ─── Lifecycle ─────────────────────────────────────────────────────────────

  /// Open one session on each store in `stores`. If any store fails to open,
  /// the sessions already opened are released and the error is returned.
  pub async fn begin(&self, stores: &[StoreKind]) -> Result<TxId> {
    let started = Instant::now();
    let enlisted = self.enlistment(stores)?;
    let tx_id = Uuid::new_v4();
    let cancel = CancellationToken::new();
    let mut tx = Transaction::new(tx_id, enlisted.clone(), cancel.clone());

    for &store in &enlisted {
      if let Err(err) = self.open_one(&mut tx, store).await {
        let released = self.rollback_sessions(&mut tx).await;
        tracing::warn!(
          %tx_id,
          %store,
          error = %err,
          released = ?released.rolled_back,
          "failed to begin transaction"
        );
        self.events.timing(TimedOperation::Begin, Some(store), false, started);
        return Err(err);
      }
    }

    self.active.insert(tx_id, Entry { tx: Arc::new(Mutex::new(tx)), cancel });
    tracing::debug!(%tx_id, stores = ?enlisted, "transaction begun");
    self.events.timing(TimedOperation::Begin, None, true, started);
    Ok(tx_id)
  }

  pub async fn begin_all(&self) -> Result<TxId> { self.begin(&StoreKind::ALL).await }

  /// Execute one operation inside the transaction's session for the
  /// operation's store. A failure here leaves the transaction active; the
  /// caller decides whether to roll back.
  pub async fn run(&self, tx_id: TxId, op: impl Into<StoreOperation>) -> Result<OpOutput> {
    let op = op.into();
    let store = op.kind();
    let started = Instant::now();
    let handle = self.handle(tx_id)?;
    let mut tx = handle.lock().await;

    if tx.state != TxState::Active {
      return Err(Error::UnknownTransaction(tx_id));
    }
    if tx.cancel.is_cancelled() {
      return Err(Error::Cancelled(tx_id));
    }

    let not_enlisted = Error::NotEnlisted { tx_id, store };
    let outcome = match op {
      StoreOperation::Relational(op) => {
        let session = tx.relational.as_mut().ok_or(not_enlisted)?;
        self.bounded(self.relational.execute(session, op)).await
      }
      StoreOperation::Graph(op) => {
        let session = tx.graph.as_mut().ok_or(not_enlisted)?;
        self.bounded(self.graph.execute(session, op)).await
      }
      StoreOperation::Document(op) => {
        let session = tx.document.as_mut().ok_or(not_enlisted)?;
        self.bounded(self.document.execute(session, op)).await
      }
    };

    let result = outcome.map_err(|f| f.into_error(store, Stage::Execute));
    if let Err(err) = &result {
      tracing::debug!(%tx_id, %store, error = %err, "operation failed");
    }
    self.events.timing(TimedOperation::Run, Some(store), result.is_ok(), started);
    result
  }

  /// Commit every enlisted session in commit order. On the first failure the
  /// sessions not yet committed are rolled back and [`Error::Commit`] reports
  /// which stores had already committed.
  pub async fn commit(&self, tx_id: TxId) -> Result<CommitReport> {
    let started = Instant::now();
    let handle = self.take(tx_id)?;
    let mut tx = handle.lock().await;

    if tx.state != TxState::Active {
      return Err(Error::UnknownTransaction(tx_id));
    }
    if tx.cancel.is_cancelled() {
      let report = self.rollback_sessions(&mut tx).await;
      tx.state = TxState::RolledBack;
      tracing::debug!(%tx_id, rolled_back = ?report.rolled_back, "cancelled transaction rolled back");
      return Err(Error::Cancelled(tx_id));
    }

    let mut committed = Vec::with_capacity(tx.enlisted.len());
    for &store in &self.config.commit_order {
      let Some(outcome) = self.commit_one(&mut tx, store).await else { continue };
      if let Err(failure) = outcome {
        let source = failure.into_source(store, Stage::Commit);
        let report = self.rollback_sessions(&mut tx).await;
        tx.state = TxState::RolledBack;
        if committed.is_empty() {
          tracing::warn!(%tx_id, %store, error = %source, "commit failed, nothing committed");
        } else {
          tracing::error!(
            %tx_id,
            %store,
            committed = ?committed,
            error = %source,
            "partial commit, stores may have diverged"
          );
        }
        self.events.timing(TimedOperation::Commit, Some(store), false, started);
        return Err(Error::Commit { store, committed, rolled_back: report.rolled_back, source });
      }
      committed.push(store);
    }

    tx.state = TxState::Committed;
    tracing::debug!(
      %tx_id,
      stores = ?committed,
      elapsed_ms = tx.opened_at.elapsed().as_millis(),
      "transaction committed"
    );
    self.events.timing(TimedOperation::Commit, None, true, started);
    Ok(CommitReport { tx_id, committed })
  }

  /// Roll back every session still open. Never fails: per-store rollback
  /// errors are logged and listed in the report. Unknown or already finished
  /// transactions yield an empty report.
  pub async fn rollback(&self, tx_id: TxId) -> RollbackReport {
    let started = Instant::now();
    let Ok(handle) = self.take(tx_id) else {
      tracing::debug!(%tx_id, "rollback of unknown transaction ignored");
      return RollbackReport::new(tx_id);
    };
    let mut tx = handle.lock().await;
    let report = self.rollback_sessions(&mut tx).await;
    tx.state = TxState::RolledBack;
    tracing::debug!(%tx_id, rolled_back = ?report.rolled_back, failed = ?report.failed, "transaction rolled back");
    self.events.timing(TimedOperation::Rollback, None, report.is_clean(), started);
    report
  }

  /// Flag a transaction as cancelled. Its next `run` fails with
  /// [`Error::Cancelled`] and `commit` rolls it back instead. An operation
  /// already in flight is not interrupted.
  pub fn cancel(&self, tx_id: TxId) -> Result<()> {
    self.cancellation_token(tx_id)?.cancel();
    tracing::debug!(%tx_id, "transaction cancelled");
    Ok(())
  }

  pub fn cancellation_token(&self, tx_id: TxId) -> Result<CancellationToken> {
    self
      .active
      .get(&tx_id)
      .map(|entry| entry.cancel.clone())
      .ok_or(Error::UnknownTransaction(tx_id))
  }

  /// Run one operation outside any transaction, against committed state.
  pub async fn query(&self, op: impl Into<StoreOperation>) -> Result<OpOutput> {
    let op = op.into();
    let store = op.kind();
    let outcome = match op {
      StoreOperation::Relational(op) => self.bounded(self.relational.query(op)).await,
      StoreOperation::Graph(op) => self.bounded(self.graph.query(op)).await,
      StoreOperation::Document(op) => self.bounded(self.document.query(op)).await,
    };
    outcome.map_err(|f| f.into_error(store, Stage::Execute))
  }

  // ─── Internals ─────────────────────────────────────────────────────────────

  fn enlistment(&self, stores: &[StoreKind]) -> Result<Vec<StoreKind>> {
    if stores.is_empty() {
      return Err(Error::InvalidInput("a transaction must enlist at least one store".into()));
    }
    Ok(self.config.commit_order.iter().copied().filter(|s| stores.contains(s)).collect())
  }

  fn handle(&self, tx_id: TxId) -> Result<Arc<Mutex<Transaction<R, G, D>>>> {
    self
      .active
      .get(&tx_id)
      .map(|entry| entry.tx.clone())
      .ok_or(Error::UnknownTransaction(tx_id))
  }

  /// Remove the transaction from the active set. Only one caller can finish
  /// a transaction.
  fn take(&self, tx_id: TxId) -> Result<Arc<Mutex<Transaction<R, G, D>>>> {
    self
      .active
      .remove(&tx_id)
      .map(|(_, entry)| entry.tx)
      .ok_or(Error::UnknownTransaction(tx_id))
  }

  async fn bounded<T, E>(
    &self,
    call: impl Future<Output = Result<T, E>>,
  ) -> Result<T, Failure>
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    match tokio::time::timeout(self.config.operation_timeout(), call).await {
      Ok(Ok(value)) => Ok(value),
      Ok(Err(err)) => Err(Failure::Store(Box::new(err))),
      Err(_elapsed) => Err(Failure::Timeout),
    }
  }

  async fn open_one(&self, tx: &mut Transaction<R, G, D>, store: StoreKind) -> Result<()> {
    let classify = |f: Failure| f.into_error(store, Stage::Open);
    match store {
      StoreKind::Relational => {
        tx.relational = Some(self.bounded(self.relational.open_session()).await.map_err(classify)?);
      }
      StoreKind::Graph => {
        tx.graph = Some(self.bounded(self.graph.open_session()).await.map_err(classify)?);
      }
      StoreKind::Document => {
        tx.document = Some(self.bounded(self.document.open_session()).await.map_err(classify)?);
      }
    }
    Ok(())
  }

  /// `None` if the transaction holds no open session for `store`.
  async fn commit_one(
    &self,
    tx: &mut Transaction<R, G, D>,
    store: StoreKind,
  ) -> Option<Result<(), Failure>> {
    Some(match store {
      StoreKind::Relational => self.bounded(self.relational.commit(tx.relational.take()?)).await,
      StoreKind::Graph => self.bounded(self.graph.commit(tx.graph.take()?)).await,
      StoreKind::Document => self.bounded(self.document.commit(tx.document.take()?)).await,
    })
  }

  async fn rollback_one(
    &self,
    tx: &mut Transaction<R, G, D>,
    store: StoreKind,
  ) -> Option<Result<(), Failure>> {
    Some(match store {
      StoreKind::Relational => self.bounded(self.relational.rollback(tx.relational.take()?)).await,
      StoreKind::Graph => self.bounded(self.graph.rollback(tx.graph.take()?)).await,
      StoreKind::Document => self.bounded(self.document.rollback(tx.document.take()?)).await,
    })
  }

  async fn rollback_sessions(&self, tx: &mut Transaction<R, G, D>) -> RollbackReport {
    let mut report = RollbackReport::new(tx.id);
    for &store in &self.config.commit_order {
      let Some(outcome) = self.rollback_one(tx, store).await else { continue };
      match outcome {
        Ok(()) => report.rolled_back.push(store),
        Err(failure) => {
          let source = failure.into_source(store, Stage::Rollback);
          tracing::warn!(tx_id = %tx.id, %store, error = %source, "rollback failed");
          report.failed.push(store);
        }
      }
    }
    report
  }
}
