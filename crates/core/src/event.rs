//! Domain events emitted by the controller.
//!
//! The loop publishes events as it moves between states. Observers
//! (gateway logs, CLI summaries, tests) subscribe without being wired into
//! the loop itself.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;

/// All domain events in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DomainEvent {
    /// A turn is about to be handed to the executor
    TurnStarted {
        thread_id: String,
        iteration: u32,
        timestamp: DateTime<Utc>,
    },

    /// A turn's stream was consumed to the end
    TurnCompleted {
        thread_id: String,
        iteration: u32,
        chunks: usize,
        stop_signal: Option<String>,
        timestamp: DateTime<Utc>,
    },

    /// The admission gate refused a turn
    AdmissionDenied {
        thread_id: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },

    /// The loop reached a terminal state
    LoopStopped {
        thread_id: String,
        outcome: String,
        turns_executed: u32,
        timestamp: DateTime<Utc>,
    },
}

/// A broadcast-based event bus for domain events.
///
/// Uses `tokio::sync::broadcast` for multi-consumer pub/sub.
pub struct EventBus {
    sender: broadcast::Sender<Arc<DomainEvent>>,
}

impl EventBus {
    /// Create a new event bus with the given capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publish an event to all subscribers.
    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is fine
        let _ = self.sender.send(Arc::new(event));
    }

    /// Subscribe to receive events.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<DomainEvent>> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn event_bus_publish_subscribe() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();

        bus.publish(DomainEvent::TurnStarted {
            thread_id: "t-1".into(),
            iteration: 3,
            timestamp: Utc::now(),
        });

        let event = rx.recv().await.unwrap();
        match event.as_ref() {
            DomainEvent::TurnStarted {
                thread_id,
                iteration,
                ..
            } => {
                assert_eq!(thread_id, "t-1");
                assert_eq!(*iteration, 3);
            }
            _ => panic!("Expected TurnStarted event"),
        }
    }

    #[test]
    fn event_bus_no_subscribers_doesnt_panic() {
        let bus = EventBus::new(16);
        bus.publish(DomainEvent::AdmissionDenied {
            thread_id: "t".into(),
            reason: "no subscribers".into(),
            timestamp: Utc::now(),
        });
    }
}
