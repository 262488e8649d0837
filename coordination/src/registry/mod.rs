//! Agent Registry: copy-on-write snapshots of agents and their performance
//!
//! ```text
//!                 publish(new snapshot)              snapshot()
//! Feedback Loop ───────────────────────▶ SharedRegistry ─────────▶ Arc<RegistrySnapshot>
//!  (single writer)    whole-map swap      RwLock<Arc<..>>           (immutable, per request)
//! ```
//!
//! Readers clone the `Arc` under the lock and release it immediately; the
//! lock is never held across selection or an await point. A request that
//! took a snapshot keeps seeing exactly that snapshot even while newer ones
//! are published.

pub mod record;

pub use record::{performance_weight, PerformanceRecord, DEFAULT_PERFORMANCE_WEIGHT};

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use crate::capability::CapabilityTag;

/// Unique identifier for agents
pub type AgentId = String;

/// A registered handler and its aggregate performance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDescriptor {
    pub id: AgentId,
    pub capability_tags: Vec<CapabilityTag>,
    /// Mean routing weight across the agent's tags
    pub performance_weight: f64,
    pub avg_latency_ms: f64,
    pub success_rate: f64,
}

impl AgentDescriptor {
    pub fn new(id: impl Into<AgentId>, capability_tags: Vec<CapabilityTag>) -> Self {
        Self {
            id: id.into(),
            capability_tags,
            performance_weight: DEFAULT_PERFORMANCE_WEIGHT,
            avg_latency_ms: 0.0,
            success_rate: 1.0,
        }
    }

    pub fn serves(&self, tag: &CapabilityTag) -> bool {
        self.capability_tags.contains(tag)
    }
}

/// Immutable view of every agent and performance record.
#[derive(Debug, Clone)]
pub struct RegistrySnapshot {
    version: u64,
    latency_reference_ms: f64,
    descriptors: BTreeMap<AgentId, AgentDescriptor>,
    records: BTreeMap<(AgentId, CapabilityTag), PerformanceRecord>,
}

impl RegistrySnapshot {
    pub fn new(descriptors: Vec<AgentDescriptor>, latency_reference_ms: f64) -> Self {
        Self {
            version: 0,
            latency_reference_ms,
            descriptors: descriptors.into_iter().map(|d| (d.id.clone(), d)).collect(),
            records: BTreeMap::new(),
        }
    }

    pub fn empty() -> Self {
        Self::new(Vec::new(), 1_000.0)
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn latency_reference_ms(&self) -> f64 {
        self.latency_reference_ms
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn descriptor(&self, id: &str) -> Option<&AgentDescriptor> {
        self.descriptors.get(id)
    }

    pub fn descriptors(&self) -> impl Iterator<Item = &AgentDescriptor> {
        self.descriptors.values()
    }

    pub fn record(&self, agent_id: &str, tag: &CapabilityTag) -> Option<&PerformanceRecord> {
        self.records.get(&(agent_id.to_string(), tag.clone()))
    }

    pub fn records(&self) -> impl Iterator<Item = &PerformanceRecord> {
        self.records.values()
    }

    /// Routing weight of `agent_id` for `tag`; the default when unrecorded.
    pub fn weight_for(&self, agent_id: &str, tag: &CapabilityTag) -> f64 {
        self.record(agent_id, tag)
            .map(|r| r.weight(self.latency_reference_ms))
            .unwrap_or(DEFAULT_PERFORMANCE_WEIGHT)
    }

    fn latency_for(&self, descriptor: &AgentDescriptor, tag: &CapabilityTag) -> f64 {
        self.record(&descriptor.id, tag)
            .filter(|r| r.samples > 0)
            .map(|r| r.avg_latency_ms)
            .unwrap_or(descriptor.avg_latency_ms)
    }

    /// Best agent for `tag`: highest weight, then lowest latency, then id.
    pub fn select(&self, tag: &CapabilityTag) -> Option<&AgentDescriptor> {
        self.descriptors
            .values()
            .filter(|d| d.serves(tag))
            .max_by(|a, b| {
                self.weight_for(&a.id, tag)
                    .partial_cmp(&self.weight_for(&b.id, tag))
                    .unwrap_or(Ordering::Equal)
                    .then_with(|| {
                        self.latency_for(b, tag)
                            .partial_cmp(&self.latency_for(a, tag))
                            .unwrap_or(Ordering::Equal)
                    })
                    .then_with(|| b.id.cmp(&a.id))
            })
    }

    /// New snapshot with `updates` applied and descriptor aggregates recomputed.
    pub fn with_records(&self, updates: impl IntoIterator<Item = PerformanceRecord>) -> Self {
        let mut next = self.clone();
        for record in updates {
            if next.descriptors.contains_key(&record.agent_id) {
                next.records.insert(
                    (record.agent_id.clone(), record.capability_tag.clone()),
                    record,
                );
            }
        }
        next.recompute_aggregates();
        next
    }

    fn recompute_aggregates(&mut self) {
        let reference = self.latency_reference_ms;
        for descriptor in self.descriptors.values_mut() {
            let records: Vec<&PerformanceRecord> = descriptor
                .capability_tags
                .iter()
                .filter_map(|tag| self.records.get(&(descriptor.id.clone(), tag.clone())))
                .collect();
            if records.is_empty() {
                continue;
            }

            let tag_count = descriptor.capability_tags.len().max(1) as f64;
            let recorded_weight: f64 = records.iter().map(|r| r.weight(reference)).sum();
            let unrecorded = tag_count - records.len() as f64;
            descriptor.performance_weight =
                (recorded_weight + unrecorded * DEFAULT_PERFORMANCE_WEIGHT) / tag_count;

            let n = records.len() as f64;
            descriptor.success_rate = records.iter().map(|r| r.success_rate).sum::<f64>() / n;
            descriptor.avg_latency_ms = records.iter().map(|r| r.avg_latency_ms).sum::<f64>() / n;
        }
    }
}

impl Default for RegistrySnapshot {
    fn default() -> Self {
        Self::empty()
    }
}

/// Handle to the current registry snapshot.
#[derive(Debug, Clone)]
pub struct SharedRegistry {
    current: Arc<RwLock<Arc<RegistrySnapshot>>>,
}

impl SharedRegistry {
    pub fn new(initial: RegistrySnapshot) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    /// The snapshot current at the time of the call.
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.current
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    /// Swap in a whole new snapshot. Returns its version.
    pub fn publish(&self, mut snapshot: RegistrySnapshot) -> u64 {
        let mut guard = self.current.write().unwrap_or_else(|e| e.into_inner());
        snapshot.version = guard.version + 1;
        let version = snapshot.version;
        *guard = Arc::new(snapshot);
        version
    }

    pub fn version(&self) -> u64 {
        self.snapshot().version
    }
}

impl Default for SharedRegistry {
    fn default() -> Self {
        Self::new(RegistrySnapshot::empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tag(name: &str) -> CapabilityTag {
        CapabilityTag::new(name)
    }

    fn snapshot() -> RegistrySnapshot {
        RegistrySnapshot::new(
            vec![
                AgentDescriptor::new("beta", vec![tag("research"), tag("general")]),
                AgentDescriptor::new("alpha", vec![tag("research")]),
                AgentDescriptor::new("coder", vec![tag("developer")]),
            ],
            1_000.0,
        )
    }

    fn record(agent: &str, tag_name: &str, outcomes: &[(bool, f64)]) -> PerformanceRecord {
        let mut r = PerformanceRecord::new(agent, tag(tag_name));
        for (ok, latency) in outcomes {
            r.observe(*ok, *latency, 0.2);
        }
        r
    }

    #[test]
    fn test_select_breaks_default_ties_by_id() {
        let snap = snapshot();
        assert_eq!(snap.select(&tag("research")).unwrap().id, "alpha");
        assert_eq!(snap.select(&tag("developer")).unwrap().id, "coder");
        assert!(snap.select(&tag("finance")).is_none());
    }

    #[test]
    fn test_select_prefers_weight_then_latency() {
        let snap = snapshot().with_records([
            record("alpha", "research", &[(false, 100.0)]),
            record("beta", "research", &[(true, 100.0)]),
        ]);
        assert_eq!(snap.select(&tag("research")).unwrap().id, "beta");

        let snap = snapshot().with_records([
            record("alpha", "research", &[(true, 300.0)]),
            record("beta", "research", &[(true, 300.0)]),
        ]);
        // equal weights and latency: id order
        assert_eq!(snap.select(&tag("research")).unwrap().id, "alpha");
    }

    #[test]
    fn test_unrecorded_agents_use_default_weight() {
        let snap = snapshot();
        assert_eq!(snap.weight_for("alpha", &tag("research")), DEFAULT_PERFORMANCE_WEIGHT);
        assert_eq!(
            snap.descriptor("alpha").unwrap().performance_weight,
            DEFAULT_PERFORMANCE_WEIGHT
        );
    }

    #[test]
    fn test_with_records_recomputes_aggregates() {
        let snap = snapshot().with_records([record("beta", "research", &[(true, 1_000.0)])]);
        let beta = snap.descriptor("beta").unwrap();
        // research weight 0.5 (1.0 × 1000/2000), general unrecorded 0.5
        assert!((beta.performance_weight - 0.5).abs() < 1e-9);
        assert_eq!(beta.avg_latency_ms, 1_000.0);
    }

    #[test]
    fn test_records_for_unknown_agents_ignored() {
        let snap = snapshot().with_records([record("ghost", "research", &[(true, 1.0)])]);
        assert_eq!(snap.records().count(), 0);
    }

    #[test]
    fn test_publish_does_not_affect_held_snapshot() {
        let registry = SharedRegistry::new(snapshot());
        let held = registry.snapshot();
        assert_eq!(held.version(), 0);

        let next = held.with_records([record("alpha", "research", &[(false, 10.0)])]);
        assert_eq!(registry.publish(next), 1);

        assert_eq!(held.version(), 0);
        assert!(held.record("alpha", &tag("research")).is_none());
        assert_eq!(registry.version(), 1);
        assert!(registry
            .snapshot()
            .record("alpha", &tag("research"))
            .is_some());
    }
}
