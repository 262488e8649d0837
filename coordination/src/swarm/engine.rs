//! Swarm consensus engine: independent round, disagreement check, bounded
//! debate, scoring.

use std::collections::BTreeMap;
use std::future::Future;

use futures::future::join_all;
use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::decision::{score, tally, top_voted, ConsensusDecision, FinalState};
use super::evaluator::{
    DeliberationContext, EvaluationContext, EvaluatorError, EvaluatorId, PeerArgument, Position,
    SharedEvaluator,
};
use super::profiles::ProfileEvaluator;
use super::round::{cluster, DebateRound, DebateTopic};
use crate::config::SwarmConfig;
use crate::request::Request;

/// How one bounded evaluator call ended.
enum CallOutcome<T> {
    Done(T),
    Failed(EvaluatorError),
    TimedOut,
    Interrupted,
}

async fn bounded<T>(
    call: impl Future<Output = Result<T, EvaluatorError>>,
    round_deadline: Instant,
    global_deadline: Instant,
    cancel: &CancellationToken,
) -> CallOutcome<T> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => CallOutcome::Interrupted,
        _ = sleep_until(global_deadline) => CallOutcome::Interrupted,
        _ = sleep_until(round_deadline) => CallOutcome::TimedOut,
        result = call => match result {
            Ok(value) => CallOutcome::Done(value),
            Err(e) => CallOutcome::Failed(e),
        },
    }
}

/// Runs the multi-evaluator protocol for decision-requiring requests.
pub struct ConsensusEngine {
    roster: Vec<SharedEvaluator>,
    config: SwarmConfig,
}

impl ConsensusEngine {
    /// Roster is kept in priority order; duplicate ids keep the first entry.
    pub fn new(mut roster: Vec<SharedEvaluator>, config: SwarmConfig) -> Self {
        roster.sort_by(|a, b| {
            a.priority()
                .cmp(&b.priority())
                .then_with(|| a.id().cmp(b.id()))
        });
        let mut seen: Vec<String> = Vec::new();
        roster.retain(|e| {
            if seen.iter().any(|id| id == e.id()) {
                warn!(evaluator = e.id(), "duplicate evaluator id ignored");
                false
            } else {
                seen.push(e.id().to_string());
                true
            }
        });
        Self { roster, config }
    }

    /// Engine with the built-in five-profile roster.
    pub fn with_default_roster(config: SwarmConfig) -> Self {
        Self::new(ProfileEvaluator::default_roster(), config)
    }

    pub fn roster_size(&self) -> usize {
        self.roster.len()
    }

    pub fn roster_ids(&self) -> Vec<&str> {
        self.roster.iter().map(|e| e.id()).collect()
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    fn priority_of(&self, id: &str) -> u32 {
        self.roster
            .iter()
            .find(|e| e.id() == id)
            .map(|e| e.priority())
            .unwrap_or(u32::MAX)
    }

    /// Produce a decision for `request`. Never fails.
    pub async fn decide(
        &self,
        request: &Request,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> ConsensusDecision {
        let priority = |id: &str| self.priority_of(id);
        info!(
            request_id = request.id(),
            evaluators = self.roster.len(),
            "swarm activated"
        );

        let (initial, mut interrupted) = self.independent_round(request, deadline, cancel).await;
        let clusters = cluster(&initial, priority);

        let mut current = initial.clone();
        let mut rounds: Vec<DebateRound> = Vec::new();
        let mut debated = false;
        let mut converged = true;

        if let Some(leader) = clusters.first() {
            let mut prev_stance = leader.stance.clone();
            let mut prev_share = leader.share;

            if interrupted {
                converged = false;
            } else if prev_share >= self.config.majority_threshold {
                debug!(
                    stance = %prev_stance,
                    share = prev_share,
                    "independent round settled, skipping debate"
                );
            } else {
                debated = true;
                converged = false;

                for round_number in 1..=self.config.max_rounds {
                    if cancel.is_cancelled() || Instant::now() >= deadline {
                        interrupted = true;
                        break;
                    }
                    let Some(round) = self
                        .debate_round(request, round_number, &current, deadline, cancel)
                        .await
                    else {
                        warn!(round = round_number, "debate round interrupted, deciding from last complete state");
                        interrupted = true;
                        break;
                    };

                    let settled = round.majority_stance == prev_stance
                        && (round.majority_share - prev_share).abs()
                            < self.config.convergence_epsilon;
                    info!(
                        round = round_number,
                        topic = %round.topic,
                        majority = %round.majority_stance,
                        share = round.majority_share,
                        votes = round.votes.len(),
                        abstained = round.abstained.len(),
                        settled,
                        "debate round complete"
                    );

                    prev_stance = round.majority_stance.clone();
                    prev_share = round.majority_share;
                    current = round.arguments.clone();
                    rounds.push(round);

                    if settled {
                        converged = true;
                        break;
                    }
                }
            }
        }

        let decision = score(
            FinalState {
                request_id: request.id(),
                initial_positions: initial,
                positions: &current,
                rounds,
                debated,
                converged,
                interrupted,
            },
            self.config.retention_threshold,
            priority,
        );

        info!(
            request_id = request.id(),
            consensus_score = decision.consensus_score,
            rounds = decision.rounds.len(),
            converged = decision.converged,
            "swarm decision reached"
        );
        decision
    }

    async fn independent_round(
        &self,
        request: &Request,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> (BTreeMap<EvaluatorId, Position>, bool) {
        let ctx = EvaluationContext { request };
        let round_deadline = (Instant::now() + self.config.round_timeout()).min(deadline);

        let outcomes = join_all(self.roster.iter().map(|evaluator| {
            let ctx = &ctx;
            async move {
                bounded(evaluator.evaluate(ctx), round_deadline, deadline, cancel).await
            }
        }))
        .await;

        let mut positions = BTreeMap::new();
        let mut interrupted = false;
        for (evaluator, outcome) in self.roster.iter().zip(outcomes) {
            match outcome {
                CallOutcome::Done(position) => {
                    positions.insert(evaluator.id().to_string(), position.normalized());
                }
                CallOutcome::Failed(e) => {
                    warn!(evaluator = evaluator.id(), error = %e, "evaluator abstained from independent round");
                }
                CallOutcome::TimedOut => {
                    warn!(evaluator = evaluator.id(), "evaluator timed out in independent round");
                }
                CallOutcome::Interrupted => interrupted = true,
            }
        }
        (positions, interrupted)
    }

    /// One synchronised round. `None` when the global deadline or a
    /// cancellation cut it short.
    async fn debate_round(
        &self,
        request: &Request,
        round_number: u32,
        current: &BTreeMap<EvaluatorId, Position>,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Option<DebateRound> {
        let topic = DebateTopic::for_round(round_number);
        let participants: Vec<&SharedEvaluator> = self
            .roster
            .iter()
            .filter(|e| current.contains_key(e.id()))
            .collect();

        let visible: Vec<PeerArgument> = participants
            .iter()
            .filter_map(|e| {
                current.get(e.id()).map(|p| PeerArgument {
                    evaluator_id: e.id().to_string(),
                    stance: p.stance.clone(),
                    argument: p.argument.clone(),
                })
            })
            .collect();
        let peers: Vec<Vec<PeerArgument>> = participants
            .iter()
            .map(|e| {
                visible
                    .iter()
                    .filter(|p| p.evaluator_id != e.id())
                    .cloned()
                    .collect()
            })
            .collect();

        let round_deadline = (Instant::now() + self.config.round_timeout()).min(deadline);
        let outcomes = join_all(participants.iter().zip(&peers).map(|(evaluator, peers)| {
            async move {
                let own = current.get(evaluator.id())?;
                let ctx = DeliberationContext {
                    request,
                    round: round_number,
                    topic,
                    own,
                    peers,
                };
                Some(bounded(evaluator.deliberate(&ctx), round_deadline, deadline, cancel).await)
            }
        }))
        .await;

        let mut arguments: BTreeMap<EvaluatorId, Position> = BTreeMap::new();
        let mut proposed: Vec<(&str, Option<EvaluatorId>)> = Vec::new();
        let mut abstained = Vec::new();

        for (evaluator, outcome) in participants.iter().zip(outcomes) {
            let id = evaluator.id();
            let previous = current.get(id)?;
            match outcome? {
                CallOutcome::Done(deliberation) => {
                    arguments.insert(id.to_string(), deliberation.position.normalized());
                    proposed.push((id, deliberation.vote));
                }
                CallOutcome::Failed(e) => {
                    warn!(evaluator = id, round = round_number, error = %e, "evaluator abstained");
                    abstained.push(id.to_string());
                    arguments.insert(id.to_string(), previous.decayed(self.config.abstain_decay));
                }
                CallOutcome::TimedOut => {
                    warn!(evaluator = id, round = round_number, "evaluator timed out, abstaining");
                    abstained.push(id.to_string());
                    arguments.insert(id.to_string(), previous.decayed(self.config.abstain_decay));
                }
                CallOutcome::Interrupted => return None,
            }
        }

        let mut votes = BTreeMap::new();
        for (voter, vote) in proposed {
            if let Some(target) = self.resolve_vote(voter, vote, &arguments) {
                votes.insert(voter.to_string(), target);
            }
        }

        let priority = |id: &str| self.priority_of(id);
        let clusters = cluster(&arguments, priority);
        let majority = clusters.first()?;

        let mut round = DebateRound {
            round_number,
            topic,
            majority_stance: majority.stance.clone(),
            majority_share: majority.share,
            arguments,
            votes,
            abstained,
            winner: None,
        };
        if !round.votes.is_empty() {
            let weights = tally(&round);
            round.winner = top_voted(
                &weights,
                round.arguments.keys().map(String::as_str),
                &priority,
            )
            .map(|(id, _)| id.to_string());
        }
        Some(round)
    }

    /// Keep a valid vote; replace a self-vote, unknown target or missing
    /// vote with the best-ranked other participant, preferring the voter's
    /// own stance.
    fn resolve_vote(
        &self,
        voter: &str,
        proposed: Option<EvaluatorId>,
        arguments: &BTreeMap<EvaluatorId, Position>,
    ) -> Option<EvaluatorId> {
        if let Some(target) = proposed {
            if target != voter && arguments.contains_key(&target) {
                return Some(target);
            }
            warn!(voter, target = %target, "invalid vote replaced");
        }

        let own = &arguments.get(voter)?.stance;
        let mut others = self
            .roster
            .iter()
            .map(|e| e.id())
            .filter(|id| *id != voter && arguments.contains_key(*id));
        let same_stance = others
            .clone()
            .find(|id| arguments.get(*id).is_some_and(|p| &p.stance == own));
        same_stance.or_else(|| others.next()).map(String::from)
    }
}
