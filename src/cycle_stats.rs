//! Cross-cycle statistics and the cycle-progress event bus.
//!
//! `CycleStats` itself lives in [`crate::model`] alongside the rest of the data
//! model; this module re-exports it next to the progress bus so callers only
//! need one `use` for both halves of "observable progress signals".

pub use crate::model::{CycleStats, CycleStatsSnapshot};

use std::time::Duration;
use tokio::sync::broadcast;

/// A milestone in one cycle's progress, published for any interested subscriber
/// (an admin surface, a log bridge, a test assertion). Mirrors the shape of
/// [`crate::telemetry::PolicyEvent`] one level up: per-cycle instead of
/// per-call.
#[derive(Debug, Clone, serde::Serialize)]
pub enum CycleEvent {
    Started { cycle: u64 },
    Empty { cycle: u64 },
    Completed { cycle: u64, duration: Duration, entities: usize, events_streamed: usize },
    Error { cycle: u64, stage: &'static str, message: String },
    StreamSkipped { cycle: u64, reason: &'static str },
}

/// Lightweight pub/sub for [`CycleEvent`]s. Subscribers that lag behind the
/// buffer capacity miss older events rather than blocking the orchestrator;
/// that is the correct tradeoff for a progress feed where subscribers are
/// opaque tokens, never back-references into the orchestrator.
#[derive(Clone)]
pub struct CycleEventBus {
    sender: broadcast::Sender<CycleEvent>,
}

impl CycleEventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CycleEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. Returns the number of active subscribers notified;
    /// `0` when nobody is listening is not an error.
    pub fn publish(&self, event: CycleEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }
}

impl Default for CycleEventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = CycleEventBus::default();
        let mut rx = bus.subscribe();
        bus.publish(CycleEvent::Started { cycle: 1 });
        let event = rx.recv().await.unwrap();
        matches!(event, CycleEvent::Started { cycle: 1 });
    }

    #[test]
    fn publish_without_subscribers_is_not_an_error() {
        let bus = CycleEventBus::default();
        assert_eq!(bus.publish(CycleEvent::Empty { cycle: 1 }), 0);
    }
}
