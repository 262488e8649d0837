//! Swarm consensus with scripted evaluators: stances per round are fixed
//! up front, so every debate outcome is reproducible.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use coordination::config::SwarmConfig;
use coordination::swarm::{
    Deliberation, DeliberationContext, EvaluationContext, ReasoningProfile,
};
use coordination::{
    ConsensusEngine, Evaluator, EvaluatorError, Position, Request, SharedEvaluator, Stance,
};

/// Holds `script[r]` in round `r`; round 0 is the independent round.
struct Scripted {
    id: String,
    priority: u32,
    script: Vec<&'static str>,
    profile: ReasoningProfile,
}

impl Scripted {
    fn new(id: &str, priority: u32, script: &[&'static str]) -> SharedEvaluator {
        Arc::new(Self {
            id: id.to_string(),
            priority,
            script: script.to_vec(),
            profile: ReasoningProfile::new(id, &[], 0.0),
        })
    }

    fn stance_at(&self, round: u32) -> &'static str {
        let idx = (round as usize).min(self.script.len() - 1);
        self.script[idx]
    }
}

#[async_trait]
impl Evaluator for Scripted {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn profile(&self) -> &ReasoningProfile {
        &self.profile
    }

    async fn evaluate(&self, _ctx: &EvaluationContext<'_>) -> Result<Position, EvaluatorError> {
        let stance = self.stance_at(0);
        Ok(Position::new(stance, format!("{} backs {stance}", self.id), 0.7))
    }

    async fn deliberate(
        &self,
        ctx: &DeliberationContext<'_>,
    ) -> Result<Deliberation, EvaluatorError> {
        let stance = self.stance_at(ctx.round);
        // Vote for the first peer sharing the stance, if any.
        let vote = ctx
            .peers
            .iter()
            .find(|p| p.stance.as_str() == stance)
            .map(|p| p.evaluator_id.clone());
        Ok(Deliberation {
            position: Position::new(stance, format!("{} backs {stance}", self.id), 0.7),
            vote,
        })
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("info")
        .with_test_writer()
        .try_init();
}

fn far_deadline() -> Instant {
    Instant::now() + Duration::from_secs(60)
}

#[tokio::test]
async fn test_unanimous_swarm_skips_debate() {
    init_tracing();
    let roster = (0..5)
        .map(|i| Scripted::new(&format!("e{i}"), i, &["proceed"]))
        .collect();
    let engine = ConsensusEngine::new(roster, SwarmConfig::default());

    let decision = engine
        .decide(&Request::new("go?"), far_deadline(), &CancellationToken::new())
        .await;

    assert_eq!(decision.stance, Some(Stance::new("proceed")));
    assert_eq!(decision.consensus_score, 1.0);
    assert!(!decision.debated);
    assert!(decision.rounds.is_empty());
    assert!(decision.minority_opinions.is_empty());
}

#[tokio::test]
async fn test_oscillating_split_runs_every_round() {
    init_tracing();
    // c flips each round, so the majority stance alternates.
    let roster = vec![
        Scripted::new("a", 0, &["proceed"]),
        Scripted::new("b", 1, &["proceed"]),
        Scripted::new("c", 2, &["proceed", "reconsider", "proceed", "reconsider"]),
        Scripted::new("d", 3, &["reconsider"]),
        Scripted::new("e", 4, &["reconsider"]),
    ];
    let config = SwarmConfig::default();
    let max_rounds = config.max_rounds as usize;
    let engine = ConsensusEngine::new(roster, config);

    let decision = engine
        .decide(&Request::new("switch?"), far_deadline(), &CancellationToken::new())
        .await;

    assert!(decision.debated);
    assert!(!decision.converged);
    assert!(!decision.interrupted);
    assert_eq!(decision.rounds.len(), max_rounds);
    assert_eq!(decision.stance, Some(Stance::new("reconsider")));
    assert!((0.0..=1.0).contains(&decision.consensus_score));
    assert_eq!(decision.minority_opinions.len(), 1);
    assert_eq!(decision.minority_opinions[0].stance, Stance::new("proceed"));
}

#[tokio::test]
async fn test_stable_split_converges_with_minority() {
    init_tracing();
    let roster = vec![
        Scripted::new("a", 0, &["proceed"]),
        Scripted::new("b", 1, &["proceed"]),
        Scripted::new("c", 2, &["proceed"]),
        Scripted::new("d", 3, &["reconsider"]),
        Scripted::new("e", 4, &["reconsider"]),
    ];
    let engine = ConsensusEngine::new(roster, SwarmConfig::default());

    let decision = engine
        .decide(&Request::new("switch?"), far_deadline(), &CancellationToken::new())
        .await;

    assert!(decision.debated);
    assert!(decision.converged);
    assert_eq!(decision.rounds.len(), 1);
    assert_eq!(decision.stance, Some(Stance::new("proceed")));
    assert_eq!(decision.minority_opinions.len(), 1);
    assert!((decision.minority_opinions[0].share - 0.4).abs() < 1e-9);
    // b and c both vote for a: two of five equally weighted votes.
    assert_eq!(decision.recommended_by.as_deref(), Some("a"));
    assert!((decision.consensus_score - 0.4).abs() < 1e-9);
}

#[tokio::test]
async fn test_cancelled_before_start_still_decides() {
    init_tracing();
    let roster = vec![
        Scripted::new("a", 0, &["proceed"]),
        Scripted::new("b", 1, &["reconsider"]),
    ];
    let engine = ConsensusEngine::new(roster, SwarmConfig::default());
    let cancel = CancellationToken::new();
    cancel.cancel();

    let decision = engine
        .decide(&Request::new("go?"), far_deadline(), &cancel)
        .await;

    assert!(decision.interrupted);
    assert!(!decision.converged);
    assert!(decision.rounds.is_empty());
}
