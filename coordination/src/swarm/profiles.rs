//! Built-in deterministic evaluators.
//!
//! Each evaluator scores the request text against cue words for every
//! argument dimension, weights the per-dimension signal by its reasoning
//! profile, and maps the result onto a stance. No randomness and no I/O, so
//! the same request always yields the same positions.

use std::sync::Arc;

use async_trait::async_trait;

use super::evaluator::{
    Deliberation, DeliberationContext, Dimension, EvaluationContext, Evaluator, EvaluatorError,
    PeerArgument, Position, ReasoningProfile, SharedEvaluator, Stance,
};
use crate::router::tokenize;

/// Signal above which a profile proceeds, and below whose negation it
/// asks to reconsider.
const STANCE_THRESHOLD: f64 = 0.15;
/// Confidence gained by holding a stance through a round.
const CONVICTION_STEP: f64 = 0.05;

/// (positive cues, negative cues) per dimension.
fn cues(dimension: Dimension) -> (&'static [&'static str], &'static [&'static str]) {
    match dimension {
        Dimension::Feasibility => (
            &["simple", "existing", "proven", "quick", "small", "easy"],
            &["rewrite", "complex", "migrate", "scratch", "large", "overhaul"],
        ),
        Dimension::Risk => (
            &["safe", "tested", "reversible", "backup", "stable"],
            &[
                "risk",
                "risky",
                "security",
                "outage",
                "irreversible",
                "production",
                "data loss",
                "breach",
            ],
        ),
        Dimension::UserExperience => (
            &["users", "usability", "faster", "simpler", "accessible", "delight"],
            &["confusing", "breaking", "downtime", "slow", "friction"],
        ),
        Dimension::Ethics => (
            &["privacy", "consent", "fair", "transparent", "open"],
            &["tracking", "surveillance", "manipulate", "bias", "harm", "personal data"],
        ),
        Dimension::Novelty => (
            &["new", "novel", "innovative", "experiment", "modern", "cutting edge"],
            &["legacy", "outdated", "old", "stale"],
        ),
    }
}

/// Occurrences of `cue` (single word or phrase) in the padded token text.
fn count_cue(padded: &str, cue: &str) -> usize {
    padded.matches(&format!(" {cue} ")).count()
}

/// Per-dimension signal in [-1, 1]; 0 when no cue matched.
pub fn dimension_signal(text: &str, dimension: Dimension) -> f64 {
    let padded = format!(" {} ", tokenize(text).join(" "));
    let (positive, negative) = cues(dimension);
    let pos: usize = positive.iter().map(|c| count_cue(&padded, c)).sum();
    let neg: usize = negative.iter().map(|c| count_cue(&padded, c)).sum();
    if pos + neg == 0 {
        0.0
    } else {
        (pos as f64 - neg as f64) / (pos + neg) as f64
    }
}

/// An evaluator driven entirely by its reasoning profile.
#[derive(Debug, Clone)]
pub struct ProfileEvaluator {
    id: String,
    priority: u32,
    profile: ReasoningProfile,
}

impl ProfileEvaluator {
    pub fn new(id: impl Into<String>, priority: u32, profile: ReasoningProfile) -> Self {
        Self {
            id: id.into(),
            priority,
            profile,
        }
    }

    /// The five built-in profiles, highest priority first.
    pub fn default_roster() -> Vec<SharedEvaluator> {
        use Dimension::*;
        let profiles = [
            (
                "pragmatist",
                0.05,
                [(Feasibility, 0.4), (Risk, 0.2), (UserExperience, 0.2), (Ethics, 0.1), (Novelty, 0.1)],
            ),
            (
                "guardian",
                -0.1,
                [(Risk, 0.45), (Ethics, 0.2), (Feasibility, 0.2), (UserExperience, 0.1), (Novelty, 0.05)],
            ),
            (
                "designer",
                0.0,
                [(UserExperience, 0.45), (Novelty, 0.2), (Feasibility, 0.2), (Risk, 0.1), (Ethics, 0.05)],
            ),
            (
                "ethicist",
                -0.05,
                [(Ethics, 0.5), (Risk, 0.2), (UserExperience, 0.2), (Feasibility, 0.05), (Novelty, 0.05)],
            ),
            (
                "visionary",
                0.2,
                [(Novelty, 0.45), (UserExperience, 0.2), (Feasibility, 0.15), (Risk, 0.1), (Ethics, 0.1)],
            ),
        ];

        profiles
            .into_iter()
            .zip(1u32..)
            .map(|((name, bias, weights), priority)| {
                Arc::new(ProfileEvaluator::new(
                    name,
                    priority,
                    ReasoningProfile::new(name, &weights, bias),
                )) as SharedEvaluator
            })
            .collect()
    }

    /// Weighted signal plus bias.
    pub fn signal(&self, text: &str) -> f64 {
        let total = self.profile.total_weight();
        let weighted = if total > 0.0 {
            Dimension::ALL
                .iter()
                .map(|d| self.profile.weight(*d) * dimension_signal(text, *d))
                .sum::<f64>()
                / total
        } else {
            0.0
        };
        weighted + self.profile.bias
    }

    fn stance_for(signal: f64) -> Stance {
        if signal > STANCE_THRESHOLD {
            Stance::new(Stance::PROCEED)
        } else if signal < -STANCE_THRESHOLD {
            Stance::new(Stance::RECONSIDER)
        } else {
            Stance::new(Stance::PROCEED_WITH_CAUTION)
        }
    }

    /// The two dimensions this profile weighs most, as argument text.
    fn focus(&self) -> String {
        let ranked = self.profile.ranked();
        match ranked.as_slice() {
            [first, second, ..] => format!("{} and {}", first.label(), second.label()),
            [only] => only.label().to_string(),
            [] => "the request".to_string(),
        }
    }

    /// How much of a peer's argument speaks to this profile.
    fn affinity(&self, own: &Stance, peer: &PeerArgument) -> f64 {
        let stance_bonus = if &peer.stance == own { 1.0 } else { 0.0 };
        let cited: f64 = Dimension::ALL
            .iter()
            .filter(|d| peer.argument.contains(d.label()))
            .map(|d| self.profile.weight(*d))
            .sum();
        stance_bonus + cited
    }
}

#[async_trait]
impl Evaluator for ProfileEvaluator {
    fn id(&self) -> &str {
        &self.id
    }

    fn priority(&self) -> u32 {
        self.priority
    }

    fn profile(&self) -> &ReasoningProfile {
        &self.profile
    }

    async fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<Position, EvaluatorError> {
        let signal = self.signal(ctx.request.content());
        let stance = Self::stance_for(signal);
        let argument = format!(
            "{} says {}: weighing {}, the request scores {:+.2}",
            self.profile.name,
            stance,
            self.focus(),
            signal
        );
        Ok(Position::new(stance, argument, 0.5 + signal.abs() / 2.0))
    }

    async fn deliberate(
        &self,
        ctx: &DeliberationContext<'_>,
    ) -> Result<Deliberation, EvaluatorError> {
        let own = ctx.own;

        // Largest peer stance, ties by stance order.
        let mut counts: Vec<(&Stance, usize)> = Vec::new();
        for peer in ctx.peers {
            match counts.iter_mut().find(|(s, _)| *s == &peer.stance) {
                Some((_, n)) => *n += 1,
                None => counts.push((&peer.stance, 1)),
            }
        }
        counts.sort_by(|(sa, na), (sb, nb)| nb.cmp(na).then_with(|| sa.cmp(sb)));
        let leading = counts.first().map(|(stance, n)| {
            (
                (*stance).clone(),
                *n as f64 / ctx.peers.len().max(1) as f64,
            )
        });

        let position = match leading {
            Some((stance, share)) if stance != own.stance && share > own.confidence => {
                Position::new(
                    stance.clone(),
                    format!(
                        "{} on {}: moving to {} with the room, still watching {}",
                        self.profile.name,
                        ctx.topic,
                        stance,
                        self.focus()
                    ),
                    (own.confidence + share) / 2.0,
                )
            }
            _ => Position::new(
                own.stance.clone(),
                format!(
                    "{} on {}: holding {} on {} grounds",
                    self.profile.name,
                    ctx.topic,
                    own.stance,
                    self.focus()
                ),
                (own.confidence + CONVICTION_STEP).min(1.0),
            ),
        };

        // First maximum wins; peers arrive in priority order.
        let vote = ctx
            .peers
            .iter()
            .fold(None::<(&PeerArgument, f64)>, |best, peer| {
                let score = self.affinity(&position.stance, peer);
                match best {
                    Some((_, b)) if b >= score => best,
                    _ => Some((peer, score)),
                }
            })
            .map(|(peer, _)| peer.evaluator_id.clone());

        Ok(Deliberation { position, vote })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;
    use crate::swarm::round::DebateTopic;

    fn roster() -> Vec<SharedEvaluator> {
        ProfileEvaluator::default_roster()
    }

    #[test]
    fn test_dimension_signal() {
        assert_eq!(dimension_signal("nothing relevant here", Dimension::Risk), 0.0);
        assert_eq!(dimension_signal("a risky production breach", Dimension::Risk), -1.0);
        assert_eq!(dimension_signal("safe and tested but risky", Dimension::Risk), 1.0 / 3.0);
        assert_eq!(dimension_signal("avoid data loss", Dimension::Risk), -1.0);
    }

    #[test]
    fn test_default_roster_order() {
        let ids: Vec<_> = roster().iter().map(|e| e.id().to_string()).collect();
        assert_eq!(ids, vec!["pragmatist", "guardian", "designer", "ethicist", "visionary"]);
        let priorities: Vec<_> = roster().iter().map(|e| e.priority()).collect();
        assert_eq!(priorities, vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_evaluate_is_deterministic() {
        let request = Request::new("Should we migrate the legacy billing system to a new stack?");
        let ctx = EvaluationContext { request: &request };
        for evaluator in roster() {
            let a = evaluator.evaluate(&ctx).await.unwrap();
            let b = evaluator.evaluate(&ctx).await.unwrap();
            assert_eq!(a, b);
            assert!((0.5..=1.0).contains(&a.confidence));
        }
    }

    #[tokio::test]
    async fn test_neutral_text_follows_bias() {
        let request = Request::new("Should we do it?");
        let ctx = EvaluationContext { request: &request };
        let roster = roster();
        let visionary = &roster[4];
        let guardian = &roster[1];
        assert_eq!(visionary.evaluate(&ctx).await.unwrap().stance.as_str(), Stance::PROCEED);
        assert_eq!(
            guardian.evaluate(&ctx).await.unwrap().stance.as_str(),
            Stance::PROCEED_WITH_CAUTION
        );
    }

    #[tokio::test]
    async fn test_deliberate_adopts_dominant_peer_stance() {
        let request = Request::new("x");
        let roster = roster();
        let evaluator = &roster[0];
        let own = Position::new(Stance::RECONSIDER, "mine", 0.55);
        let peers: Vec<PeerArgument> = ["a", "b", "c"]
            .iter()
            .map(|id| PeerArgument {
                evaluator_id: id.to_string(),
                stance: Stance::new(Stance::PROCEED),
                argument: format!("{id} cites risk"),
            })
            .collect();
        let ctx = DeliberationContext {
            request: &request,
            round: 1,
            topic: DebateTopic::for_round(1),
            own: &own,
            peers: &peers,
        };

        let out = evaluator.deliberate(&ctx).await.unwrap();
        assert_eq!(out.position.stance.as_str(), Stance::PROCEED);
        assert!((out.position.confidence - 0.775).abs() < 1e-9);
        assert!(out.position.argument.contains("approach_methodology"));
        assert_eq!(out.vote.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn test_deliberate_holds_when_confident() {
        let request = Request::new("x");
        let roster = roster();
        let evaluator = &roster[1];
        let own = Position::new(Stance::RECONSIDER, "mine", 0.9);
        let peers = vec![
            PeerArgument {
                evaluator_id: "p1".into(),
                stance: Stance::new(Stance::PROCEED),
                argument: "novelty first".into(),
            },
            PeerArgument {
                evaluator_id: "p2".into(),
                stance: Stance::new(Stance::RECONSIDER),
                argument: "risk and ethics".into(),
            },
        ];
        let ctx = DeliberationContext {
            request: &request,
            round: 2,
            topic: DebateTopic::for_round(2),
            own: &own,
            peers: &peers,
        };

        let out = evaluator.deliberate(&ctx).await.unwrap();
        assert_eq!(out.position.stance.as_str(), Stance::RECONSIDER);
        assert!((out.position.confidence - 0.95).abs() < 1e-9);
        // same stance plus the guardian's two heaviest dimensions
        assert_eq!(out.vote.as_deref(), Some("p2"));
    }
}
