//! Debate rounds, topics, and stance clustering.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::evaluator::{EvaluatorId, Position, Stance};

/// What a debate round is about. Rounds cycle through the topics in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DebateTopic {
    ApproachMethodology,
    PriorityAssessment,
    RiskEvaluation,
    SolutionFeasibility,
    TimelineEstimation,
}

impl DebateTopic {
    pub const ALL: [DebateTopic; 5] = [
        DebateTopic::ApproachMethodology,
        DebateTopic::PriorityAssessment,
        DebateTopic::RiskEvaluation,
        DebateTopic::SolutionFeasibility,
        DebateTopic::TimelineEstimation,
    ];

    /// Topic of 1-based round `round`.
    pub fn for_round(round: u32) -> Self {
        let index = (round.max(1) as usize - 1) % Self::ALL.len();
        Self::ALL[index]
    }
}

impl std::fmt::Display for DebateTopic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ApproachMethodology => write!(f, "approach_methodology"),
            Self::PriorityAssessment => write!(f, "priority_assessment"),
            Self::RiskEvaluation => write!(f, "risk_evaluation"),
            Self::SolutionFeasibility => write!(f, "solution_feasibility"),
            Self::TimelineEstimation => write!(f, "timeline_estimation"),
        }
    }
}

/// One completed debate round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebateRound {
    pub round_number: u32,
    pub topic: DebateTopic,
    /// Positions held at the end of the round
    pub arguments: BTreeMap<EvaluatorId, Position>,
    /// voter → voted-for
    pub votes: BTreeMap<EvaluatorId, EvaluatorId>,
    /// Evaluators that failed or timed out this round
    pub abstained: Vec<EvaluatorId>,
    /// Most confidence-weighted votes, ties by priority
    pub winner: Option<EvaluatorId>,
    pub majority_stance: Stance,
    pub majority_share: f64,
}

/// Evaluators sharing one stance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StanceCluster {
    pub stance: Stance,
    /// Members in priority order
    pub members: Vec<EvaluatorId>,
    /// Fraction of positioned evaluators in this cluster
    pub share: f64,
    pub mean_confidence: f64,
}

/// Group positions by stance.
///
/// Largest cluster first; equal sizes are ordered by the best (lowest)
/// member priority, then by stance.
pub fn cluster(
    positions: &BTreeMap<EvaluatorId, Position>,
    priority: impl Fn(&str) -> u32,
) -> Vec<StanceCluster> {
    let total = positions.len();
    if total == 0 {
        return Vec::new();
    }

    let mut groups: BTreeMap<&Stance, Vec<&EvaluatorId>> = BTreeMap::new();
    for (id, position) in positions {
        groups.entry(&position.stance).or_default().push(id);
    }

    let mut clusters: Vec<(u32, StanceCluster)> = groups
        .into_iter()
        .map(|(stance, mut members)| {
            members.sort_by_key(|id| (priority(id), (*id).clone()));
            let best = members.first().map(|id| priority(id)).unwrap_or(u32::MAX);
            let mean_confidence = members
                .iter()
                .map(|id| positions[*id].confidence)
                .sum::<f64>()
                / members.len() as f64;
            let cluster = StanceCluster {
                stance: stance.clone(),
                share: members.len() as f64 / total as f64,
                members: members.into_iter().cloned().collect(),
                mean_confidence,
            };
            (best, cluster)
        })
        .collect();

    clusters.sort_by(|(pa, a), (pb, b)| {
        b.members
            .len()
            .cmp(&a.members.len())
            .then(pa.cmp(pb))
            .then_with(|| a.stance.cmp(&b.stance))
    });
    clusters.into_iter().map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn positions(stances: &[(&str, &str, f64)]) -> BTreeMap<EvaluatorId, Position> {
        stances
            .iter()
            .map(|(id, stance, conf)| (id.to_string(), Position::new(*stance, "arg", *conf)))
            .collect()
    }

    fn rank(id: &str) -> u32 {
        id.trim_start_matches('e').parse().unwrap_or(99)
    }

    #[test]
    fn test_topics_cycle() {
        assert_eq!(DebateTopic::for_round(1), DebateTopic::ApproachMethodology);
        assert_eq!(DebateTopic::for_round(3), DebateTopic::RiskEvaluation);
        assert_eq!(DebateTopic::for_round(6), DebateTopic::ApproachMethodology);
        assert_eq!(DebateTopic::for_round(0), DebateTopic::ApproachMethodology);
    }

    #[test]
    fn test_largest_cluster_first() {
        let clusters = cluster(
            &positions(&[
                ("e1", "a", 0.9),
                ("e2", "b", 0.6),
                ("e3", "b", 0.4),
                ("e4", "b", 0.5),
                ("e5", "a", 0.7),
            ]),
            rank,
        );
        assert_eq!(clusters.len(), 2);
        assert_eq!(clusters[0].stance.as_str(), "b");
        assert_eq!(clusters[0].members, vec!["e2", "e3", "e4"]);
        assert!((clusters[0].share - 0.6).abs() < 1e-9);
        assert!((clusters[0].mean_confidence - 0.5).abs() < 1e-9);
        assert!((clusters[1].mean_confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_equal_clusters_tie_broken_by_priority() {
        let clusters = cluster(
            &positions(&[("e4", "a", 1.0), ("e2", "b", 0.1), ("e3", "a", 1.0), ("e1", "b", 0.1)]),
            rank,
        );
        assert_eq!(clusters[0].stance.as_str(), "b");
        assert_eq!(clusters[0].members, vec!["e1", "e2"]);
    }

    #[test]
    fn test_empty_positions() {
        assert!(cluster(&BTreeMap::new(), rank).is_empty());
    }
}
