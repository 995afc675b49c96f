//! Per-concept leases: at most one writer per concept at a time, in-process.
//!
//! Sagas hold a lease from their existence check until the cache is
//! refreshed. Repairs hold it across check and write, and a cache fill holds
//! it across assemble and put, so neither can act on a state a saga is about
//! to replace.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

type LockTable = Arc<DashMap<Uuid, Arc<Mutex<()>>>>;

#[derive(Debug, Clone, Default)]
pub struct ConceptLeases {
  locks: LockTable,
}

impl ConceptLeases {
  pub fn new() -> Self { Self::default() }

  /// Wait until no other lease on `concept_id` is held, then take it. The
  /// lease is released when dropped.
  pub async fn acquire(&self, concept_id: Uuid) -> ConceptLease {
    let lock = self.locks.entry(concept_id).or_default().clone();
    let guard = lock.lock_owned().await;
    ConceptLease { concept_id, locks: self.locks.clone(), _guard: guard }
  }

  /// Number of concepts with a held or awaited lease.
  pub fn len(&self) -> usize { self.locks.len() }

  pub fn is_empty(&self) -> bool { self.locks.is_empty() }
}

#[derive(Debug)]
pub struct ConceptLease {
  concept_id: Uuid,
  locks:      LockTable,
  _guard:     OwnedMutexGuard<()>,
}

impl ConceptLease {
  pub fn concept_id(&self) -> Uuid { self.concept_id }
}

impl Drop for ConceptLease {
  fn drop(&mut self) {
    // Two references remain when nobody else waits: the table's and our
    // guard's.
    self.locks.remove_if(&self.concept_id, |_, lock| Arc::strong_count(lock) <= 2);
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  #[tokio::test]
  async fn lease_excludes_second_holder_until_dropped() {
    let leases = ConceptLeases::new();
    let id = Uuid::new_v4();

    let first = leases.acquire(id).await;
    let waiting = tokio::time::timeout(Duration::from_millis(50), leases.acquire(id)).await;
    assert!(waiting.is_err(), "second lease must wait");

    drop(first);
    let second = tokio::time::timeout(Duration::from_millis(50), leases.acquire(id)).await;
    assert!(second.is_ok());
  }

  #[tokio::test]
  async fn leases_on_different_concepts_are_independent() {
    let leases = ConceptLeases::new();
    let _a = leases.acquire(Uuid::new_v4()).await;
    let b = tokio::time::timeout(Duration::from_millis(50), leases.acquire(Uuid::new_v4())).await;
    assert!(b.is_ok());
    assert_eq!(leases.len(), 2);
  }

  #[tokio::test]
  async fn released_leases_leave_no_entries() {
    let leases = ConceptLeases::new();
    let id = Uuid::new_v4();
    drop(leases.acquire(id).await);
    assert!(leases.is_empty());
  }
}
