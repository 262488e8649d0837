//! Per-(agent, capability) performance tracking.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::AgentId;
use crate::capability::CapabilityTag;

/// Weight used for any agent/tag pair with no performance record yet.
pub const DEFAULT_PERFORMANCE_WEIGHT: f64 = 0.5;

/// Routing weight from a success rate and a latency.
///
/// `success_rate × reference / (reference + latency)`: an agent answering in
/// exactly `reference_ms` keeps half of its success rate.
pub fn performance_weight(success_rate: f64, avg_latency_ms: f64, reference_ms: f64) -> f64 {
    let reference = reference_ms.max(f64::EPSILON);
    let latency = avg_latency_ms.max(0.0);
    (success_rate.clamp(0.0, 1.0) * reference / (reference + latency)).clamp(0.0, 1.0)
}

/// EMA-smoothed outcome history of one agent serving one capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerformanceRecord {
    pub agent_id: AgentId,
    pub capability_tag: CapabilityTag,
    pub success_rate: f64,
    pub avg_latency_ms: f64,
    pub samples: u64,
    pub last_updated: DateTime<Utc>,
}

impl PerformanceRecord {
    /// Fresh record; success starts optimistic at 1.0.
    pub fn new(agent_id: impl Into<AgentId>, capability_tag: CapabilityTag) -> Self {
        Self {
            agent_id: agent_id.into(),
            capability_tag,
            success_rate: 1.0,
            avg_latency_ms: 0.0,
            samples: 0,
            last_updated: Utc::now(),
        }
    }

    /// Fold one terminal outcome in with learning rate `alpha`.
    pub fn observe(&mut self, success: bool, latency_ms: f64, alpha: f64) {
        let alpha = alpha.clamp(0.0, 1.0);
        let outcome = if success { 1.0 } else { 0.0 };
        self.success_rate = alpha * outcome + (1.0 - alpha) * self.success_rate;
        self.avg_latency_ms = if self.samples == 0 {
            latency_ms
        } else {
            alpha * latency_ms + (1.0 - alpha) * self.avg_latency_ms
        };
        self.samples += 1;
        self.last_updated = Utc::now();
    }

    pub fn weight(&self, reference_ms: f64) -> f64 {
        performance_weight(self.success_rate, self.avg_latency_ms, reference_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_formula() {
        assert!((performance_weight(1.0, 0.0, 1000.0) - 1.0).abs() < 1e-9);
        assert!((performance_weight(1.0, 1000.0, 1000.0) - 0.5).abs() < 1e-9);
        assert!((performance_weight(0.5, 3000.0, 1000.0) - 0.125).abs() < 1e-9);
        assert_eq!(performance_weight(0.0, 10.0, 1000.0), 0.0);
    }

    #[test]
    fn test_first_sample_seeds_latency() {
        let mut record = PerformanceRecord::new("a", "research".into());
        record.observe(true, 400.0, 0.2);
        assert_eq!(record.avg_latency_ms, 400.0);
        assert_eq!(record.success_rate, 1.0);
        assert_eq!(record.samples, 1);

        record.observe(false, 900.0, 0.2);
        assert!((record.avg_latency_ms - 500.0).abs() < 1e-9);
        assert!((record.success_rate - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_repeated_failures_decay_toward_zero() {
        let mut record = PerformanceRecord::new("a", "research".into());
        for _ in 0..20 {
            record.observe(false, 100.0, 0.2);
        }
        assert!(record.success_rate < 0.02);
        assert!(record.weight(1000.0) < DEFAULT_PERFORMANCE_WEIGHT);
    }
}
