//! The single writer of registry performance data.

use std::collections::BTreeMap;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::PerformanceEvent;
use crate::capability::CapabilityTag;
use crate::config::FeedbackConfig;
use crate::dispatch::TaskStatus;
use crate::events::{OrchestrationEvent, SharedEventBus};
use crate::registry::{AgentId, PerformanceRecord, SharedRegistry};

/// Counters reported when the loop stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FeedbackStats {
    pub applied: u64,
    pub ignored: u64,
    pub publications: u64,
}

pub struct FeedbackLoop {
    registry: SharedRegistry,
    config: FeedbackConfig,
    bus: Option<SharedEventBus>,
    pending: BTreeMap<(AgentId, CapabilityTag), PerformanceRecord>,
    since_publish: usize,
    stats: FeedbackStats,
}

impl FeedbackLoop {
    pub fn new(registry: SharedRegistry, config: FeedbackConfig, bus: Option<SharedEventBus>) -> Self {
        Self {
            registry,
            config,
            bus,
            pending: BTreeMap::new(),
            since_publish: 0,
            stats: FeedbackStats::default(),
        }
    }

    pub async fn run(
        mut self,
        mut rx: mpsc::Receiver<PerformanceEvent>,
        shutdown: CancellationToken,
    ) -> FeedbackStats {
        let mut ticker = tokio::time::interval(self.config.publish_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                event = rx.recv() => match event {
                    Some(event) => {
                        self.apply(event);
                        if self.since_publish >= self.config.publish_batch.max(1) {
                            self.publish();
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if !self.pending.is_empty() {
                        self.publish();
                    }
                }
            }
        }

        // Drain whatever was queued before the close.
        rx.close();
        while let Some(event) = rx.recv().await {
            self.apply(event);
        }
        if !self.pending.is_empty() {
            self.publish();
        }
        debug!(
            applied = self.stats.applied,
            publications = self.stats.publications,
            "feedback loop stopped"
        );
        self.stats
    }

    /// Fold one outcome into the pending record for its (agent, tag).
    pub fn apply(&mut self, event: PerformanceEvent) {
        let snapshot = self.registry.snapshot();
        if snapshot.descriptor(&event.agent_id).is_none() {
            debug!(agent_id = %event.agent_id, "performance event for unregistered agent ignored");
            self.stats.ignored += 1;
            return;
        }

        let key = (event.agent_id.clone(), event.capability_tag.clone());
        let record = self.pending.entry(key).or_insert_with(|| {
            snapshot
                .record(&event.agent_id, &event.capability_tag)
                .cloned()
                .unwrap_or_else(|| {
                    PerformanceRecord::new(event.agent_id.clone(), event.capability_tag.clone())
                })
        });
        let success = event.result.status() == TaskStatus::Success;
        record.observe(
            success,
            event.result.latency_ms() as f64,
            self.config.learning_rate,
        );
        self.since_publish += 1;
        self.stats.applied += 1;
    }

    /// Copy-on-write: clone the current snapshot, apply, swap in.
    pub fn publish(&mut self) {
        let records: Vec<PerformanceRecord> = std::mem::take(&mut self.pending).into_values().collect();
        self.since_publish = 0;
        if records.is_empty() {
            return;
        }

        let next = self.registry.snapshot().with_records(records.iter().cloned());
        let reference = next.latency_reference_ms();
        let version = self.registry.publish(next);
        self.stats.publications += 1;

        info!(version, records = records.len(), "registry snapshot published");

        if let Some(bus) = &self.bus {
            for record in &records {
                bus.publish(OrchestrationEvent::PerformanceUpdated {
                    weight: record.weight(reference),
                    record: record.clone(),
                    timestamp: Utc::now(),
                });
            }
            bus.publish(OrchestrationEvent::RegistryPublished {
                version,
                records: records.len(),
                timestamp: Utc::now(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dispatch::{Task, TaskPayload, TaskResult};
    use crate::registry::{AgentDescriptor, RegistrySnapshot};
    use tokio::time::Instant;

    fn registry() -> SharedRegistry {
        SharedRegistry::new(RegistrySnapshot::new(
            vec![
                AgentDescriptor::new("a", vec![CapabilityTag::new("finance")]),
                AgentDescriptor::new("b", vec![CapabilityTag::new("finance")]),
            ],
            1000.0,
        ))
    }

    fn event(agent: &str, success: bool, latency_ms: u64) -> PerformanceEvent {
        let task = Task {
            id: "t".into(),
            request_id: "r".into(),
            agent_id: agent.into(),
            capability_tag: CapabilityTag::new("finance"),
            requested_tag: CapabilityTag::new("finance"),
            deadline: Instant::now(),
        };
        let result = if success {
            TaskResult::success(&task, TaskPayload::text("ok"), latency_ms)
        } else {
            TaskResult::failure(&task, "boom", latency_ms)
        };
        PerformanceEvent::from_result(&result)
    }

    #[tokio::test]
    async fn test_apply_then_publish_swaps_snapshot() {
        let registry = registry();
        let before = registry.snapshot();
        let mut worker = FeedbackLoop::new(registry.clone(), FeedbackConfig::default(), None);

        worker.apply(event("a", false, 100));
        worker.apply(event("a", false, 300));
        assert_eq!(registry.version(), before.version());

        worker.publish();
        let after = registry.snapshot();
        assert_eq!(after.version(), before.version() + 1);

        let record = after.record("a", &CapabilityTag::new("finance")).unwrap();
        assert_eq!(record.samples, 2);
        // 1.0 → 0.8 → 0.64
        assert!((record.success_rate - 0.64).abs() < 1e-9);
        // first sample seeds, second blends: 0.2 × 300 + 0.8 × 100
        assert!((record.avg_latency_ms - 140.0).abs() < 1e-9);

        // the old snapshot is untouched
        assert!(before.record("a", &CapabilityTag::new("finance")).is_none());
    }

    #[tokio::test]
    async fn test_unknown_agent_ignored() {
        let registry = registry();
        let mut worker = FeedbackLoop::new(registry.clone(), FeedbackConfig::default(), None);
        worker.apply(event("ghost", true, 10));
        worker.publish();
        assert_eq!(worker.stats.ignored, 1);
        assert_eq!(registry.version(), 0);
    }

    #[tokio::test]
    async fn test_failures_shift_selection() {
        let registry = registry();
        let tag = CapabilityTag::new("finance");
        assert_eq!(registry.snapshot().select(&tag).unwrap().id, "a");

        let mut worker = FeedbackLoop::new(registry.clone(), FeedbackConfig::default(), None);
        for _ in 0..3 {
            worker.apply(event("a", false, 50));
        }
        worker.apply(event("b", true, 50));
        worker.publish();

        assert_eq!(registry.snapshot().select(&tag).unwrap().id, "b");
    }
}
