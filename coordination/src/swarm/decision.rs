//! Consensus scoring over the final swarm state.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::evaluator::{EvaluatorId, Position, Stance};
use super::round::{cluster, DebateRound, StanceCluster};
use crate::request::RequestId;

/// Recommendation used when no evaluator produced a position.
pub const NO_POSITION_RECOMMENDATION: &str =
    "The evaluators could not form a position in time; treat this as an open question and gather more information before committing.";

/// A losing stance that kept enough support to be reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MinorityOpinion {
    pub stance: Stance,
    pub share: f64,
    pub supporters: Vec<EvaluatorId>,
    /// Argument of the cluster's most confident member
    pub argument: String,
}

/// Outcome of a swarm run. Always produced, whatever happened in between.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusDecision {
    pub request_id: RequestId,
    /// 0.0–1.0
    pub consensus_score: f64,
    pub recommendation: String,
    pub recommended_by: Option<EvaluatorId>,
    /// Stance of the majority cluster; `None` only if nobody took a position
    pub stance: Option<Stance>,
    pub minority_opinions: Vec<MinorityOpinion>,
    /// Mean confidence of the majority cluster
    pub confidence: f64,
    /// Independent-round positions
    pub initial_positions: BTreeMap<EvaluatorId, Position>,
    pub rounds: Vec<DebateRound>,
    pub debated: bool,
    pub converged: bool,
    /// The global deadline or a cancellation cut the run short
    pub interrupted: bool,
    pub decided_at: DateTime<Utc>,
}

impl ConsensusDecision {
    pub fn round_count(&self) -> usize {
        self.rounds.len()
    }

    pub fn summary(&self) -> String {
        match &self.stance {
            Some(stance) => format!(
                "{} (score {:.2}, confidence {:.2}, {} round(s))",
                stance,
                self.consensus_score,
                self.confidence,
                self.rounds.len()
            ),
            None => "no position".to_string(),
        }
    }
}

/// Everything the scorer needs besides the roster priorities.
pub(crate) struct FinalState<'a> {
    pub request_id: &'a str,
    pub initial_positions: BTreeMap<EvaluatorId, Position>,
    pub positions: &'a BTreeMap<EvaluatorId, Position>,
    pub rounds: Vec<DebateRound>,
    pub debated: bool,
    pub converged: bool,
    pub interrupted: bool,
}

/// Confidence-weighted vote tally of `round`.
pub(crate) fn tally(round: &DebateRound) -> BTreeMap<&str, f64> {
    let mut tally: BTreeMap<&str, f64> = BTreeMap::new();
    for (voter, target) in &round.votes {
        let weight = round
            .arguments
            .get(voter)
            .map(|p| p.confidence)
            .unwrap_or(0.0);
        *tally.entry(target.as_str()).or_insert(0.0) += weight;
    }
    tally
}

/// Highest tally, ties by priority then id.
pub(crate) fn top_voted<'a>(
    tally: &BTreeMap<&'a str, f64>,
    candidates: impl IntoIterator<Item = &'a str>,
    priority: &impl Fn(&str) -> u32,
) -> Option<(&'a str, f64)> {
    candidates
        .into_iter()
        .map(|id| (id, tally.get(id).copied().unwrap_or(0.0)))
        .min_by(|(a, va), (b, vb)| {
            vb.partial_cmp(va)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(priority(a).cmp(&priority(b)))
                .then(a.cmp(b))
        })
}

/// Most confident member of `cluster`, ties by priority (members are
/// already priority-ordered).
fn most_confident<'a>(
    cluster: &'a StanceCluster,
    positions: &'a BTreeMap<EvaluatorId, Position>,
) -> Option<(&'a EvaluatorId, &'a Position)> {
    cluster
        .members
        .iter()
        .filter_map(|id| positions.get(id).map(|p| (id, p)))
        .fold(None, |best, (id, p)| match best {
            Some((_, bp)) if bp.confidence >= p.confidence => best,
            _ => Some((id, p)),
        })
}

pub(crate) fn score(
    state: FinalState<'_>,
    retention_threshold: f64,
    priority: impl Fn(&str) -> u32,
) -> ConsensusDecision {
    let clusters = cluster(state.positions, &priority);
    let Some(majority) = clusters.first() else {
        return ConsensusDecision {
            request_id: state.request_id.to_string(),
            consensus_score: 0.0,
            recommendation: NO_POSITION_RECOMMENDATION.to_string(),
            recommended_by: None,
            stance: None,
            minority_opinions: Vec::new(),
            confidence: 0.0,
            initial_positions: state.initial_positions,
            rounds: state.rounds,
            debated: state.debated,
            converged: state.converged,
            interrupted: state.interrupted,
            decided_at: Utc::now(),
        };
    };

    let votes = state.rounds.last().map(tally).unwrap_or_default();
    let total_votes: f64 = votes.values().sum();

    let (consensus_score, recommended_by) = if total_votes > 0.0 {
        let representative = top_voted(
            &votes,
            majority.members.iter().map(String::as_str),
            &priority,
        );
        let score = representative.map(|(_, v)| v / total_votes).unwrap_or(0.0);
        let top = top_voted(&votes, state.positions.keys().map(String::as_str), &priority)
            .map(|(id, _)| id.to_string());
        (score, top)
    } else {
        let all: f64 = state.positions.values().map(|p| p.confidence).sum();
        let majority_conf: f64 = majority
            .members
            .iter()
            .filter_map(|id| state.positions.get(id))
            .map(|p| p.confidence)
            .sum();
        let score = if all > 0.0 {
            majority_conf / all
        } else {
            majority.share
        };
        let top = most_confident(majority, state.positions).map(|(id, _)| id.clone());
        (score, top)
    };

    let recommendation = recommended_by
        .as_ref()
        .and_then(|id| state.positions.get(id))
        .map(|p| p.argument.clone())
        .unwrap_or_else(|| NO_POSITION_RECOMMENDATION.to_string());

    let minority_opinions = clusters
        .iter()
        .skip(1)
        .filter(|c| c.stance != majority.stance && c.share >= retention_threshold)
        .map(|c| MinorityOpinion {
            stance: c.stance.clone(),
            share: c.share,
            supporters: c.members.clone(),
            argument: most_confident(c, state.positions)
                .map(|(_, p)| p.argument.clone())
                .unwrap_or_default(),
        })
        .collect();

    ConsensusDecision {
        request_id: state.request_id.to_string(),
        consensus_score: consensus_score.clamp(0.0, 1.0),
        recommendation,
        recommended_by,
        stance: Some(majority.stance.clone()),
        minority_opinions,
        confidence: majority.mean_confidence.clamp(0.0, 1.0),
        initial_positions: state.initial_positions,
        rounds: state.rounds,
        debated: state.debated,
        converged: state.converged,
        interrupted: state.interrupted,
        decided_at: Utc::now(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::swarm::round::DebateTopic;

    fn rank(id: &str) -> u32 {
        id.trim_start_matches('e').parse().unwrap_or(99)
    }

    fn positions(spec: &[(&str, &str, f64)]) -> BTreeMap<EvaluatorId, Position> {
        spec.iter()
            .map(|(id, stance, conf)| {
                (
                    id.to_string(),
                    Position::new(*stance, format!("{id} argues {stance}"), *conf),
                )
            })
            .collect()
    }

    fn round(positions: &BTreeMap<EvaluatorId, Position>, votes: &[(&str, &str)]) -> DebateRound {
        DebateRound {
            round_number: 1,
            topic: DebateTopic::ApproachMethodology,
            arguments: positions.clone(),
            votes: votes
                .iter()
                .map(|(a, b)| (a.to_string(), b.to_string()))
                .collect(),
            abstained: Vec::new(),
            winner: None,
            majority_stance: Stance::new("x"),
            majority_share: 0.0,
        }
    }

    fn state<'a>(
        positions: &'a BTreeMap<EvaluatorId, Position>,
        rounds: Vec<DebateRound>,
    ) -> FinalState<'a> {
        FinalState {
            request_id: "r",
            initial_positions: positions.clone(),
            positions,
            debated: !rounds.is_empty(),
            rounds,
            converged: true,
            interrupted: false,
        }
    }

    #[test]
    fn test_unanimous_without_votes_scores_one() {
        let p = positions(&[("e1", "go", 0.9), ("e2", "go", 0.4), ("e3", "go", 0.7)]);
        let decision = score(state(&p, vec![]), 0.15, rank);
        assert_eq!(decision.consensus_score, 1.0);
        assert_eq!(decision.recommended_by.as_deref(), Some("e1"));
        assert_eq!(decision.recommendation, "e1 argues go");
        assert!(decision.minority_opinions.is_empty());
        assert!((decision.confidence - (2.0 / 3.0)).abs() < 1e-9);
    }

    #[test]
    fn test_weighted_votes() {
        let p = positions(&[
            ("e1", "go", 1.0),
            ("e2", "go", 0.5),
            ("e3", "go", 0.5),
            ("e4", "stop", 1.0),
            ("e5", "stop", 1.0),
        ]);
        // e2 gets 0.5 + 1.0, e4 gets 1.0 + 0.5 + 1.0
        let votes = [("e1", "e4"), ("e3", "e2"), ("e2", "e4"), ("e5", "e4"), ("e4", "e2")];
        let decision = score(state(&p, vec![round(&p, &votes)]), 0.15, rank);

        assert_eq!(decision.stance.as_ref().unwrap().as_str(), "go");
        // representative e2 holds 1.5 of 4.0 weighted votes
        assert!((decision.consensus_score - 0.375).abs() < 1e-9);
        // overall top-voted evaluator supplies the recommendation
        assert_eq!(decision.recommended_by.as_deref(), Some("e4"));
        assert_eq!(decision.minority_opinions.len(), 1);
        assert_eq!(decision.minority_opinions[0].supporters, vec!["e4", "e5"]);
    }

    #[test]
    fn test_retention_threshold_filters_small_minorities() {
        let p = positions(&[
            ("e1", "go", 0.8),
            ("e2", "go", 0.8),
            ("e3", "go", 0.8),
            ("e4", "go", 0.8),
            ("e5", "go", 0.8),
            ("e6", "go", 0.8),
            ("e7", "stop", 0.8),
        ]);
        let decision = score(state(&p, vec![]), 0.15, rank);
        // 1/7 ≈ 0.143 < 0.15
        assert!(decision.minority_opinions.is_empty());
        assert!((decision.consensus_score - 6.0 / 7.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_positions_still_decides() {
        let p = BTreeMap::new();
        let decision = score(state(&p, vec![]), 0.15, rank);
        assert_eq!(decision.consensus_score, 0.0);
        assert_eq!(decision.recommendation, NO_POSITION_RECOMMENDATION);
        assert!(decision.stance.is_none());
    }

    #[test]
    fn test_zero_confidence_falls_back_to_share() {
        let p = positions(&[("e1", "go", 0.0), ("e2", "go", 0.0), ("e3", "stop", 0.0)]);
        let decision = score(state(&p, vec![]), 0.15, rank);
        assert!((decision.consensus_score - 2.0 / 3.0).abs() < 1e-9);
    }
}
