//! Fault injection for exercising failure paths against real adapters.
//!
//! Wrap any [`StoreAdapter`] in a [`FaultyStore`] and arm faults through its
//! [`Faults`] handle. Faults are checked before delegating, so an injected
//! failure leaves the wrapped store untouched.

use std::{
  sync::{
    Arc,
    atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
  },
  time::Duration,
};

use concord_core::{
  operation::{OpOutput, StoreKind},
  store::StoreAdapter,
};

#[derive(Debug, thiserror::Error)]
pub enum FaultError<E: std::error::Error + 'static> {
  #[error("injected {0} fault")]
  Injected(&'static str),

  #[error(transparent)]
  Inner(E),
}

#[derive(Debug, Default)]
struct FaultState {
  fail_open:         AtomicBool,
  fail_commit:       AtomicBool,
  fail_rollback:     AtomicBool,
  /// Executes remaining until one fails, plus one. Zero means disarmed.
  execute_countdown: AtomicUsize,
  execute_delay_ms:  AtomicU64,
  commit_delay_ms:   AtomicU64,
  executed:          AtomicUsize,
}

/// Shared switchboard for one [`FaultyStore`]. Cloning shares the switches.
#[derive(Debug, Clone, Default)]
pub struct Faults(Arc<FaultState>);

impl Faults {
  pub fn fail_open(&self, on: bool) { self.0.fail_open.store(on, Ordering::SeqCst); }

  pub fn fail_commit(&self, on: bool) { self.0.fail_commit.store(on, Ordering::SeqCst); }

  pub fn fail_rollback(&self, on: bool) { self.0.fail_rollback.store(on, Ordering::SeqCst); }

  /// Fail the next `execute` call only.
  pub fn fail_next_execute(&self) { self.fail_execute_after(0); }

  /// Let `n` more `execute` calls through, then fail one.
  pub fn fail_execute_after(&self, n: usize) {
    self.0.execute_countdown.store(n + 1, Ordering::SeqCst);
  }

  /// Sleep before every `execute` call.
  pub fn delay_execute(&self, delay: Duration) {
    self.0.execute_delay_ms.store(millis(delay), Ordering::SeqCst);
  }

  /// Sleep before every `commit` call.
  pub fn delay_commit(&self, delay: Duration) {
    self.0.commit_delay_ms.store(millis(delay), Ordering::SeqCst);
  }

  pub fn reset(&self) {
    self.fail_open(false);
    self.fail_commit(false);
    self.fail_rollback(false);
    self.0.execute_countdown.store(0, Ordering::SeqCst);
    self.0.execute_delay_ms.store(0, Ordering::SeqCst);
    self.0.commit_delay_ms.store(0, Ordering::SeqCst);
  }

  /// Number of `execute` calls seen, failed or not.
  pub fn executed(&self) -> usize { self.0.executed.load(Ordering::SeqCst) }

  fn take_execute_fault(&self) -> bool {
    self
      .0
      .execute_countdown
      .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
      .is_ok_and(|previous| previous == 1)
  }
}

fn millis(delay: Duration) -> u64 { u64::try_from(delay.as_millis()).unwrap_or(u64::MAX) }

pub struct FaultyStore<A> {
  inner:  A,
  faults: Faults,
}

impl<A: StoreAdapter> FaultyStore<A> {
  pub fn new(inner: A) -> Self { Self { inner, faults: Faults::default() } }

  pub fn faults(&self) -> Faults { self.faults.clone() }

  pub fn inner(&self) -> &A { &self.inner }
}

impl<A: StoreAdapter> StoreAdapter for FaultyStore<A> {
  type Session = A::Session;
  type Op = A::Op;
  type Error = FaultError<A::Error>;

  fn kind(&self) -> StoreKind { self.inner.kind() }

  async fn open_session(&self) -> Result<A::Session, Self::Error> {
    if self.faults.0.fail_open.load(Ordering::SeqCst) {
      return Err(FaultError::Injected("open"));
    }
    self.inner.open_session().await.map_err(FaultError::Inner)
  }

  async fn execute(&self, session: &mut A::Session, op: A::Op) -> Result<OpOutput, Self::Error> {
    self.faults.0.executed.fetch_add(1, Ordering::SeqCst);
    let delay = self.faults.0.execute_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
      tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if self.faults.take_execute_fault() {
      return Err(FaultError::Injected("execute"));
    }
    self.inner.execute(session, op).await.map_err(FaultError::Inner)
  }

  async fn commit(&self, session: A::Session) -> Result<(), Self::Error> {
    let delay = self.faults.0.commit_delay_ms.load(Ordering::SeqCst);
    if delay > 0 {
      tokio::time::sleep(Duration::from_millis(delay)).await;
    }
    if self.faults.0.fail_commit.load(Ordering::SeqCst) {
      // Release the inner session so the store is left as before.
      let _ = self.inner.rollback(session).await;
      return Err(FaultError::Injected("commit"));
    }
    self.inner.commit(session).await.map_err(FaultError::Inner)
  }

  async fn rollback(&self, session: A::Session) -> Result<(), Self::Error> {
    let result = self.inner.rollback(session).await.map_err(FaultError::Inner);
    if self.faults.0.fail_rollback.load(Ordering::SeqCst) {
      return Err(FaultError::Injected("rollback"));
    }
    result
  }

  async fn query(&self, op: A::Op) -> Result<OpOutput, Self::Error> {
    self.inner.query(op).await.map_err(FaultError::Inner)
  }
}
