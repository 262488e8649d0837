//! Bounded record of recent swarm decisions.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

use super::decision::ConsensusDecision;

/// Aggregate view over the retained decisions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SwarmInsights {
    pub total_decisions: u64,
    /// Mean consensus score of the retained decisions
    pub average_consensus: f64,
    pub debated: usize,
    pub interrupted: usize,
    pub roster_size: usize,
    /// Newest first
    pub recent: Vec<String>,
}

/// Ring buffer of the last `capacity` decisions.
#[derive(Debug, Clone)]
pub struct DecisionHistory {
    capacity: usize,
    total: u64,
    decisions: VecDeque<ConsensusDecision>,
}

impl DecisionHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            total: 0,
            decisions: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub fn record(&mut self, decision: ConsensusDecision) {
        if self.decisions.len() == self.capacity {
            self.decisions.pop_front();
        }
        self.decisions.push_back(decision);
        self.total += 1;
    }

    pub fn len(&self) -> usize {
        self.decisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decisions.is_empty()
    }

    pub fn latest(&self) -> Option<&ConsensusDecision> {
        self.decisions.back()
    }

    pub fn insights(&self, roster_size: usize) -> SwarmInsights {
        let retained = self.decisions.len();
        let average_consensus = if retained == 0 {
            0.0
        } else {
            self.decisions.iter().map(|d| d.consensus_score).sum::<f64>() / retained as f64
        };
        SwarmInsights {
            total_decisions: self.total,
            average_consensus,
            debated: self.decisions.iter().filter(|d| d.debated).count(),
            interrupted: self.decisions.iter().filter(|d| d.interrupted).count(),
            roster_size,
            recent: self
                .decisions
                .iter()
                .rev()
                .take(5)
                .map(|d| format!("{}: {}", d.request_id, d.summary()))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::decision::NO_POSITION_RECOMMENDATION;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn decision(id: &str, score: f64) -> ConsensusDecision {
        ConsensusDecision {
            request_id: id.into(),
            consensus_score: score,
            recommendation: NO_POSITION_RECOMMENDATION.into(),
            recommended_by: None,
            stance: None,
            minority_opinions: Vec::new(),
            confidence: 0.0,
            initial_positions: BTreeMap::new(),
            rounds: Vec::new(),
            debated: false,
            converged: true,
            interrupted: false,
            decided_at: Utc::now(),
        }
    }

    #[test]
    fn test_capacity_evicts_oldest() {
        let mut history = DecisionHistory::new(2);
        history.record(decision("a", 1.0));
        history.record(decision("b", 0.5));
        history.record(decision("c", 0.0));
        assert_eq!(history.len(), 2);
        assert_eq!(history.latest().unwrap().request_id, "c");

        let insights = history.insights(5);
        assert_eq!(insights.total_decisions, 3);
        assert!((insights.average_consensus - 0.25).abs() < 1e-9);
        assert_eq!(insights.recent.len(), 2);
        assert!(insights.recent[0].starts_with("c:"));
    }

    #[test]
    fn test_empty_insights() {
        let insights = DecisionHistory::new(10).insights(0);
        assert_eq!(insights.total_decisions, 0);
        assert_eq!(insights.average_consensus, 0.0);
        assert!(insights.recent.is_empty());
    }
}
