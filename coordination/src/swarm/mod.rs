//! Swarm Consensus Engine
//!
//! Structured multi-evaluator decision making for requests that need a
//! judgement call rather than a lookup.
//!
//! ```text
//! Request ─▶ independent round (every evaluator, in parallel, no peers)
//!              │
//!              ├─ top stance share ≥ threshold ──────────────┐
//!              │                                              │
//!              └─ debate rounds 1..=max_rounds                │
//!                   peers' stance + argument (no confidence)  │
//!                   revise position, vote for one peer        │
//!                   stop when majority stance holds and its   │
//!                   share moves less than ε                   │
//!                                                             ▼
//!                                         score ─▶ ConsensusDecision
//! ```
//!
//! Evaluators that fail or time out abstain; the engine never returns an
//! error.

pub mod decision;
pub mod engine;
pub mod evaluator;
pub mod history;
pub mod profiles;
pub mod round;

pub use decision::{ConsensusDecision, MinorityOpinion, NO_POSITION_RECOMMENDATION};
pub use engine::ConsensusEngine;
pub use evaluator::{
    Deliberation, DeliberationContext, Dimension, EvaluationContext, Evaluator, EvaluatorError,
    EvaluatorId, PeerArgument, Position, ReasoningProfile, SharedEvaluator, Stance,
};
pub use history::{DecisionHistory, SwarmInsights};
pub use profiles::ProfileEvaluator;
pub use round::{cluster, DebateRound, DebateTopic, StanceCluster};
