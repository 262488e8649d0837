//! Event bus for orchestration lifecycle events
//!
//! Tokio broadcast pub/sub with an optional audit sink that receives the
//! audit-worthy events before they are broadcast.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use super::audit::{AuditRecord, AuditSink};
use super::types::OrchestrationEvent;

/// Channel capacity for broadcast
const CHANNEL_CAPACITY: usize = 256;

/// Shared reference to EventBus
pub type SharedEventBus = Arc<EventBus>;

/// Broadcast channel plus optional audit trail
pub struct EventBus {
    sender: broadcast::Sender<OrchestrationEvent>,
    audit: Option<Arc<dyn AuditSink>>,
}

impl EventBus {
    /// Create a new event bus without an audit sink
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            audit: None,
        }
    }

    /// Create an event bus that appends audit-worthy events to `sink`
    pub fn with_audit(sink: Arc<dyn AuditSink>) -> Self {
        let (sender, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            sender,
            audit: Some(sink),
        }
    }

    /// Create a shared reference to this event bus
    pub fn shared(self) -> SharedEventBus {
        Arc::new(self)
    }

    /// Publish an event to all subscribers. Never fails the caller.
    pub fn publish(&self, event: OrchestrationEvent) {
        let event_type = event.event_type();

        if let Some(sink) = &self.audit {
            let record = match &event {
                OrchestrationEvent::PerformanceUpdated { record, .. } => {
                    Some(AuditRecord::Performance(record.clone()))
                }
                OrchestrationEvent::ConsensusReached { decision, .. } => {
                    Some(AuditRecord::Decision(decision.clone()))
                }
                _ => None,
            };
            if let Some(record) = record {
                if let Err(e) = sink.append(&record) {
                    warn!(event_type, error = %e, "Failed to append audit record");
                }
            }
        }

        // Broadcast to subscribers (ignore if no receivers)
        match self.sender.send(event) {
            Ok(count) => debug!(event_type, receivers = count, "Event published"),
            Err(_) => debug!(event_type, "Event published (no receivers)"),
        }
    }

    /// Subscribe to receive events
    pub fn subscribe(&self) -> broadcast::Receiver<OrchestrationEvent> {
        self.sender.subscribe()
    }

    /// Get the number of current subscribers
    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }

    pub fn has_audit(&self) -> bool {
        self.audit.is_some()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscriber_count())
            .field("audit", &self.audit.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capability::CapabilityTag;
    use crate::events::audit::MemoryAuditSink;
    use crate::registry::PerformanceRecord;
    use chrono::Utc;

    fn published(version: u64) -> OrchestrationEvent {
        OrchestrationEvent::RegistryPublished {
            version,
            records: 0,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_publish_subscribe() {
        let bus = EventBus::new();
        let mut receiver = bus.subscribe();

        bus.publish(published(1));

        let received = receiver.recv().await.unwrap();
        assert_eq!(received.event_type(), "registry_published");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new().shared();
        let mut rx1 = bus.subscribe();
        let mut rx2 = bus.subscribe();

        assert_eq!(bus.subscriber_count(), 2);

        bus.publish(published(7));

        let e1 = rx1.recv().await.unwrap();
        let e2 = rx2.recv().await.unwrap();
        assert_eq!(e1.event_type(), e2.event_type());
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new();
        bus.publish(published(1));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_audit_receives_only_audit_events() {
        let sink = Arc::new(MemoryAuditSink::new());
        let bus = EventBus::with_audit(sink.clone());

        bus.publish(published(1));
        bus.publish(OrchestrationEvent::PerformanceUpdated {
            record: PerformanceRecord::new("a", CapabilityTag::new("finance")),
            weight: 0.5,
            timestamp: Utc::now(),
        });

        let records = sink.records();
        assert_eq!(records.len(), 1);
        assert!(matches!(records[0], AuditRecord::Performance(_)));
    }
}
