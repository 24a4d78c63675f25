//! Typed in-process publish/subscribe of internal domain events (§2).
//!
//! Distinct from [`crate::hub::Hub`]: this bus carries events consumed by the
//! reconciler's own instrumentation (and anything else in-process that wants to
//! observe phase changes or tool telemetry), not the outward-facing wire protocol.
//! Backed by `tokio::sync::broadcast`; a lagging subscriber misses the oldest events
//! rather than blocking the publisher.

use uuid::Uuid;

use crate::message::Usage;

#[derive(Clone, Debug)]
pub enum DomainEvent {
    PhaseChanged {
        task_id: Uuid,
        phase: crate::task::Phase,
    },
    ToolInvoked {
        task_id: Uuid,
        tool_name: String,
    },
    UsageRecorded {
        task_id: Uuid,
        usage: Usage,
    },
}

/// Thin wrapper around a `broadcast` channel so callers don't reach for the raw
/// `tokio::sync::broadcast` API directly.
pub struct EventBus {
    tx: tokio::sync::broadcast::Sender<DomainEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = tokio::sync::broadcast::channel(capacity);
        Self { tx }
    }

    pub fn publish(&self, event: DomainEvent) {
        // No subscribers is a normal, expected state; ignore the send error.
        let _ = self.tx.send(event);
    }

    pub fn subscribe(&self) -> tokio::sync::broadcast::Receiver<DomainEvent> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subscriber_receives_published_event() {
        let bus = EventBus::new(16);
        let mut rx = bus.subscribe();
        let task_id = Uuid::new_v4();
        bus.publish(DomainEvent::ToolInvoked {
            task_id,
            tool_name: "read_file".into(),
        });
        let event = rx.recv().await.unwrap();
        assert!(matches!(event, DomainEvent::ToolInvoked { task_id: t, .. } if t == task_id));
    }

    #[test]
    fn publish_with_no_subscribers_does_not_panic() {
        let bus = EventBus::new(4);
        bus.publish(DomainEvent::PhaseChanged {
            task_id: Uuid::new_v4(),
            phase: crate::task::Phase::AwaitInput,
        });
    }
}
