//! Evaluator contract: positions, reasoning profiles, deliberation.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::round::DebateTopic;
use crate::request::Request;

/// Unique identifier for evaluators
pub type EvaluatorId = String;

/// Shared reference to an evaluator
pub type SharedEvaluator = Arc<dyn Evaluator>;

/// A stance label; evaluators holding the same stance form a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Stance(String);

impl Stance {
    pub const PROCEED: &'static str = "proceed";
    pub const PROCEED_WITH_CAUTION: &'static str = "proceed_with_caution";
    pub const RECONSIDER: &'static str = "reconsider";

    pub fn new(stance: impl Into<String>) -> Self {
        Self(stance.into().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Stance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for Stance {
    fn from(stance: &str) -> Self {
        Self::new(stance)
    }
}

/// What an evaluator holds at the end of a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub stance: Stance,
    pub argument: String,
    /// 0.0–1.0; hidden from peers during debate
    pub confidence: f64,
}

impl Position {
    pub fn new(stance: impl Into<Stance>, argument: impl Into<String>, confidence: f64) -> Self {
        Self {
            stance: stance.into(),
            argument: argument.into(),
            confidence: clamp_unit(confidence),
        }
    }

    /// Same stance and argument with confidence scaled by `factor`.
    pub fn decayed(&self, factor: f64) -> Self {
        Self {
            stance: self.stance.clone(),
            argument: self.argument.clone(),
            confidence: clamp_unit(self.confidence * factor),
        }
    }

    pub(crate) fn normalized(mut self) -> Self {
        self.confidence = clamp_unit(self.confidence);
        self
    }
}

fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

/// Argument dimensions a reasoning profile weighs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Feasibility,
    Risk,
    UserExperience,
    Ethics,
    Novelty,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Feasibility,
        Dimension::Risk,
        Dimension::UserExperience,
        Dimension::Ethics,
        Dimension::Novelty,
    ];

    /// Phrase used when an argument cites this dimension.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Feasibility => "feasibility",
            Self::Risk => "risk",
            Self::UserExperience => "user experience",
            Self::Ethics => "ethics",
            Self::Novelty => "novelty",
        }
    }
}

impl std::fmt::Display for Dimension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Feasibility => write!(f, "feasibility"),
            Self::Risk => write!(f, "risk"),
            Self::UserExperience => write!(f, "user_experience"),
            Self::Ethics => write!(f, "ethics"),
            Self::Novelty => write!(f, "novelty"),
        }
    }
}

/// Deterministic weighting over the argument dimensions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningProfile {
    pub name: String,
    weights: BTreeMap<Dimension, f64>,
    /// Added to the weighted signal before a stance is chosen
    pub bias: f64,
}

impl ReasoningProfile {
    pub fn new(name: impl Into<String>, weights: &[(Dimension, f64)], bias: f64) -> Self {
        Self {
            name: name.into(),
            weights: weights
                .iter()
                .map(|(d, w)| (*d, w.max(0.0)))
                .collect(),
            bias,
        }
    }

    pub fn weight(&self, dimension: Dimension) -> f64 {
        self.weights.get(&dimension).copied().unwrap_or(0.0)
    }

    pub fn total_weight(&self) -> f64 {
        self.weights.values().sum()
    }

    /// Dimensions by descending weight, declaration order on ties.
    pub fn ranked(&self) -> Vec<Dimension> {
        let mut dims = Dimension::ALL.to_vec();
        dims.sort_by(|a, b| {
            self.weight(*b)
                .partial_cmp(&self.weight(*a))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        dims
    }
}

/// A peer's visible output from the previous round: never its confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerArgument {
    pub evaluator_id: EvaluatorId,
    pub stance: Stance,
    pub argument: String,
}

/// Input of the independent round: the request alone.
#[derive(Debug, Clone, Copy)]
pub struct EvaluationContext<'a> {
    pub request: &'a Request,
}

/// Input of a debate round.
#[derive(Debug, Clone, Copy)]
pub struct DeliberationContext<'a> {
    pub request: &'a Request,
    pub round: u32,
    pub topic: DebateTopic,
    /// This evaluator's own previous position
    pub own: &'a Position,
    /// Every other participant, in roster priority order
    pub peers: &'a [PeerArgument],
}

/// Output of a debate round: revised position and one vote.
#[derive(Debug, Clone, PartialEq)]
pub struct Deliberation {
    pub position: Position,
    pub vote: Option<EvaluatorId>,
}

/// Evaluator faults; the engine treats them as abstention.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EvaluatorError {
    #[error("evaluation failed: {0}")]
    Failed(String),

    #[error("evaluation cancelled")]
    Cancelled,
}

/// A member of the swarm roster.
#[async_trait]
pub trait Evaluator: Send + Sync {
    fn id(&self) -> &str;

    /// Tie-break rank; lower is preferred.
    fn priority(&self) -> u32;

    fn profile(&self) -> &ReasoningProfile;

    async fn evaluate(&self, ctx: &EvaluationContext<'_>) -> Result<Position, EvaluatorError>;

    async fn deliberate(
        &self,
        ctx: &DeliberationContext<'_>,
    ) -> Result<Deliberation, EvaluatorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_clamps_confidence() {
        assert_eq!(Position::new("proceed", "x", 1.7).confidence, 1.0);
        assert_eq!(Position::new("proceed", "x", -0.2).confidence, 0.0);
        assert_eq!(Position::new("proceed", "x", f64::NAN).confidence, 0.0);
        assert!((Position::new("proceed", "x", 0.8).decayed(0.5).confidence - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_profile_ranking() {
        let profile = ReasoningProfile::new(
            "p",
            &[(Dimension::Risk, 0.5), (Dimension::Novelty, 0.5), (Dimension::Ethics, 0.1)],
            0.0,
        );
        let ranked = profile.ranked();
        assert_eq!(&ranked[..3], &[Dimension::Risk, Dimension::Novelty, Dimension::Ethics]);
        assert_eq!(profile.weight(Dimension::Feasibility), 0.0);
        assert!((profile.total_weight() - 1.1).abs() < 1e-9);
    }

    #[test]
    fn test_stance_normalisation() {
        assert_eq!(Stance::new(" Proceed "), Stance::new(Stance::PROCEED));
    }
}
