//! Broadcast channel for [`SyncEvent`]s.

use std::time::Instant;

use concord_core::{
  event::{OperationStatus, OperationTiming, SyncEvent, TimedOperation},
  operation::StoreKind,
};
use tokio::sync::broadcast;

/// Fan-out of sync events to any number of subscribers. Cloning shares the
/// channel.
#[derive(Debug, Clone)]
pub struct EventBus {
  sender: broadcast::Sender<SyncEvent>,
}

impl EventBus {
  pub fn new(capacity: usize) -> Self {
    let (sender, _) = broadcast::channel(capacity.max(1));
    Self { sender }
  }

  /// Subscribers only see events published after they subscribe. A
  /// subscriber that falls more than `capacity` events behind observes
  /// `RecvError::Lagged`.
  pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> { self.sender.subscribe() }

  pub fn publish(&self, event: SyncEvent) {
    // Publishing with no subscribers is not an error.
    let _ = self.sender.send(event);
  }

  pub fn subscriber_count(&self) -> usize { self.sender.receiver_count() }

  /// Publish a timing sample measured from `started`.
  pub fn timing(
    &self,
    operation: TimedOperation,
    store: Option<StoreKind>,
    success: bool,
    started: Instant,
  ) {
    let status = if success { OperationStatus::Success } else { OperationStatus::Failure };
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    self.publish(SyncEvent::Timing(OperationTiming { operation, store, status, duration_ms }));
  }
}

impl Default for EventBus {
  fn default() -> Self { Self::new(256) }
}
