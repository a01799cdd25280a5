//! Notification Sinks (spec §4.K, §9). Spec §9 calls out the source's
//! event-emitter coupling (events pushed directly to multiple listeners)
//! and redesigns it as a single outbound `broadcast` stream sinks subscribe
//! to independently; the core never stores a reference back to a sink.

use uuid::Uuid;

use crate::position::PositionStatus;

/// Outbound lifecycle notification (spec §9). Sinks receive these over a
/// `tokio::sync::broadcast::Receiver` and decide for themselves whether to
/// post to a messaging bot, write a metric, or ignore it.
#[derive(Debug, Clone)]
pub enum LifecycleEvent {
  PositionOpened { position_id: Uuid, symbol: String },
  PartialFilled { position_id: Uuid, reason: String, tokens_sold: u64, quote_received: u64 },
  PositionClosed { position_id: Uuid, final_status: PositionStatus, realized_pnl: i128 },
  ManualReviewNeeded { position_id: Uuid, reason: String },
  TradeBlocked { symbol: String, reason: String },
}

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Construction-time broadcast hub. Created once by the engine; every sink
/// calls `subscribe()` independently and drops its receiver when it's done
/// listening. A lagging sink only misses events (per
/// `tokio::sync::broadcast` semantics) — it never blocks publication.
pub struct EventBus {
  sender: tokio::sync::broadcast::Sender<LifecycleEvent>,
}

impl Default for EventBus {
  fn default() -> Self {
    let (sender, _) = tokio::sync::broadcast::channel(EVENT_CHANNEL_CAPACITY);
    Self { sender }
  }
}

impl EventBus {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<LifecycleEvent> {
    self.sender.subscribe()
  }

  /// Publishing never fails the caller even with zero subscribers —
  /// `send` returning an error just means nobody is currently listening.
  pub fn publish(&self, event: LifecycleEvent) {
    let _ = self.sender.send(event);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[tokio::test]
  async fn independent_sinks_each_receive_published_events() {
    let bus = EventBus::new();
    let mut sink_a = bus.subscribe();
    let mut sink_b = bus.subscribe();

    bus.publish(LifecycleEvent::TradeBlocked { symbol: "FOO".to_string(), reason: "test".to_string() });

    assert!(matches!(sink_a.recv().await.unwrap(), LifecycleEvent::TradeBlocked { .. }));
    assert!(matches!(sink_b.recv().await.unwrap(), LifecycleEvent::TradeBlocked { .. }));
  }

  #[test]
  fn publish_without_subscribers_does_not_panic() {
    let bus = EventBus::new();
    bus.publish(LifecycleEvent::TradeBlocked { symbol: "FOO".to_string(), reason: "test".to_string() });
  }
}
