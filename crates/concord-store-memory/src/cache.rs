//! [`MemoryCache`]: a TTL key-value cache.

use std::{convert::Infallible, sync::Arc, time::Duration};

use concord_core::store::CacheStore;
use dashmap::DashMap;
use tokio::time::Instant;

struct CacheSlot {
  value:      String,
  expires_at: Instant,
}

/// Thread-safe in-process cache. Expired entries are dropped lazily on read
/// or by [`purge_expired`](Self::purge_expired).
///
/// Cloning is cheap; clones share entries.
#[derive(Clone, Default)]
pub struct MemoryCache {
  entries: Arc<DashMap<String, CacheSlot>>,
}

impl MemoryCache {
  pub fn new() -> Self { Self::default() }

  /// Number of stored entries, including expired ones not yet purged.
  pub fn len(&self) -> usize { self.entries.len() }

  pub fn is_empty(&self) -> bool { self.entries.is_empty() }

  /// Drop every expired entry; returns how many were removed.
  pub fn purge_expired(&self) -> usize {
    let now = Instant::now();
    let before = self.entries.len();
    self.entries.retain(|_, slot| slot.expires_at > now);
    before - self.entries.len()
  }
}

impl CacheStore for MemoryCache {
  type Error = Infallible;

  async fn get(&self, key: &str) -> Result<Option<String>, Infallible> {
    let now = Instant::now();
    let hit = self
      .entries
      .get(key)
      .map(|slot| (slot.expires_at > now).then(|| slot.value.clone()));

    match hit {
      Some(Some(value)) => Ok(Some(value)),
      Some(None) => {
        self.entries.remove_if(key, |_, slot| slot.expires_at <= now);
        Ok(None)
      }
      None => Ok(None),
    }
  }

  async fn set(&self, key: String, value: String, ttl: Duration) -> Result<(), Infallible> {
    let expires_at = Instant::now() + ttl;
    self.entries.insert(key, CacheSlot { value, expires_at });
    Ok(())
  }

  async fn delete(&self, key: &str) -> Result<bool, Infallible> {
    let now = Instant::now();
    Ok(
      self
        .entries
        .remove(key)
        .is_some_and(|(_, slot)| slot.expires_at > now),
    )
  }
}
