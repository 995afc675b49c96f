//! Tunables for the coordinator, cache layer, and validator.
//!
//! Every struct deserialises with defaults for missing fields, so a partial
//! TOML table (or no table at all) is valid.

use std::time::Duration;

use concord_core::operation::StoreKind;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
  /// Upper bound on any single adapter call.
  pub operation_timeout_ms: u64,
  /// Order in which enlisted stores commit. Must name each store once.
  pub commit_order:         Vec<StoreKind>,
  /// Capacity of the sync event channel.
  pub event_capacity:       usize,
}

impl Default for CoordinatorConfig {
  fn default() -> Self {
    Self {
      operation_timeout_ms: 30_000,
      commit_order:         StoreKind::ALL.to_vec(),
      event_capacity:       256,
    }
  }
}

impl CoordinatorConfig {
  pub fn operation_timeout(&self) -> Duration { Duration::from_millis(self.operation_timeout_ms) }

  pub fn validate(&self) -> Result<()> {
    if self.operation_timeout_ms == 0 {
      return Err(Error::Config("operation_timeout_ms must be positive".into()));
    }
    if self.event_capacity == 0 {
      return Err(Error::Config("event_capacity must be positive".into()));
    }
    let mut order = self.commit_order.clone();
    order.sort();
    order.dedup();
    if order.len() != self.commit_order.len() || order != StoreKind::ALL {
      return Err(Error::Config(format!(
        "commit_order must list each store exactly once, got {:?}",
        self.commit_order
      )));
    }
    Ok(())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
  pub ttl_secs:   u64,
  pub key_prefix: String,
}

impl Default for CacheConfig {
  fn default() -> Self { Self { ttl_secs: 3600, key_prefix: "concept:".into() } }
}

impl CacheConfig {
  pub fn ttl(&self) -> Duration { Duration::from_secs(self.ttl_secs) }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
  /// Concepts scanned concurrently by a full validation pass.
  pub concurrency: usize,
}

impl Default for ValidatorConfig {
  fn default() -> Self { Self { concurrency: 4 } }
}
