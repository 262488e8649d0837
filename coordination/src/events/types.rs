//! Orchestration lifecycle events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capability::CapabilityTag;
use crate::dispatch::{TaskResult, TaskStatus};
use crate::registry::{AgentId, PerformanceRecord};
use crate::request::{RequestId, ResponseStatus};
use crate::router::RoutedTag;
use crate::swarm::{ConsensusDecision, DebateRound, DebateTopic, EvaluatorId, Stance};

/// Everything that happens while a request moves through the pipeline,
/// plus the feedback loop's registry updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestrationEvent {
    /// A request passed validation
    RequestReceived {
        request_id: RequestId,
        session: String,
        content_chars: usize,
        timestamp: DateTime<Utc>,
    },

    /// The router picked the capability tags
    RequestRouted {
        request_id: RequestId,
        tags: Vec<RoutedTag>,
        decision_requested: bool,
        registry_version: u64,
        timestamp: DateTime<Utc>,
    },

    /// One task reached a terminal state
    TaskCompleted {
        request_id: RequestId,
        task_id: String,
        agent_id: AgentId,
        capability_tag: CapabilityTag,
        status: TaskStatus,
        latency_ms: u64,
        timestamp: DateTime<Utc>,
    },

    /// A swarm debate round finished
    DebateRoundCompleted {
        request_id: RequestId,
        round: u32,
        topic: DebateTopic,
        majority_stance: Stance,
        majority_share: f64,
        winner: Option<EvaluatorId>,
        abstained: usize,
        timestamp: DateTime<Utc>,
    },

    /// The swarm produced its decision
    ConsensusReached {
        decision: Box<ConsensusDecision>,
        timestamp: DateTime<Utc>,
    },

    /// The feedback loop changed a performance record
    PerformanceUpdated {
        record: PerformanceRecord,
        weight: f64,
        timestamp: DateTime<Utc>,
    },

    /// A new registry snapshot was swapped in
    RegistryPublished {
        version: u64,
        records: usize,
        timestamp: DateTime<Utc>,
    },

    /// The response left `submit`
    ResponseReady {
        request_id: RequestId,
        status: ResponseStatus,
        elapsed_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl OrchestrationEvent {
    pub fn task_completed(request_id: &str, result: &TaskResult) -> Self {
        Self::TaskCompleted {
            request_id: request_id.to_string(),
            task_id: result.task_id().to_string(),
            agent_id: result.agent_id().to_string(),
            capability_tag: result.capability_tag().clone(),
            status: result.status(),
            latency_ms: result.latency_ms(),
            timestamp: Utc::now(),
        }
    }

    pub fn debate_round(request_id: &str, round: &DebateRound) -> Self {
        Self::DebateRoundCompleted {
            request_id: request_id.to_string(),
            round: round.round_number,
            topic: round.topic,
            majority_stance: round.majority_stance.clone(),
            majority_share: round.majority_share,
            winner: round.winner.clone(),
            abstained: round.abstained.len(),
            timestamp: Utc::now(),
        }
    }

    pub fn consensus(decision: &ConsensusDecision) -> Self {
        Self::ConsensusReached {
            decision: Box::new(decision.clone()),
            timestamp: Utc::now(),
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            OrchestrationEvent::RequestReceived { timestamp, .. } => *timestamp,
            OrchestrationEvent::RequestRouted { timestamp, .. } => *timestamp,
            OrchestrationEvent::TaskCompleted { timestamp, .. } => *timestamp,
            OrchestrationEvent::DebateRoundCompleted { timestamp, .. } => *timestamp,
            OrchestrationEvent::ConsensusReached { timestamp, .. } => *timestamp,
            OrchestrationEvent::PerformanceUpdated { timestamp, .. } => *timestamp,
            OrchestrationEvent::RegistryPublished { timestamp, .. } => *timestamp,
            OrchestrationEvent::ResponseReady { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            OrchestrationEvent::RequestReceived { .. } => "request_received",
            OrchestrationEvent::RequestRouted { .. } => "request_routed",
            OrchestrationEvent::TaskCompleted { .. } => "task_completed",
            OrchestrationEvent::DebateRoundCompleted { .. } => "debate_round_completed",
            OrchestrationEvent::ConsensusReached { .. } => "consensus_reached",
            OrchestrationEvent::PerformanceUpdated { .. } => "performance_updated",
            OrchestrationEvent::RegistryPublished { .. } => "registry_published",
            OrchestrationEvent::ResponseReady { .. } => "response_ready",
        }
    }

    /// Request this event belongs to, if any.
    pub fn request_id(&self) -> Option<&str> {
        match self {
            OrchestrationEvent::RequestReceived { request_id, .. }
            | OrchestrationEvent::RequestRouted { request_id, .. }
            | OrchestrationEvent::TaskCompleted { request_id, .. }
            | OrchestrationEvent::DebateRoundCompleted { request_id, .. }
            | OrchestrationEvent::ResponseReady { request_id, .. } => Some(request_id),
            OrchestrationEvent::ConsensusReached { decision, .. } => Some(&decision.request_id),
            OrchestrationEvent::PerformanceUpdated { .. }
            | OrchestrationEvent::RegistryPublished { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serde_tag() {
        let event = OrchestrationEvent::RegistryPublished {
            version: 3,
            records: 2,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "registry_published");
        assert_eq!(json["version"], 3);

        let back: OrchestrationEvent = serde_json::from_value(json).unwrap();
        assert_eq!(back.event_type(), "registry_published");
        assert!(back.request_id().is_none());
    }

    #[test]
    fn test_request_scoped_events() {
        let event = OrchestrationEvent::ResponseReady {
            request_id: "r-1".into(),
            status: ResponseStatus::Completed,
            elapsed_ms: 4,
            timestamp: Utc::now(),
        };
        assert_eq!(event.request_id(), Some("r-1"));
        assert_eq!(event.event_type(), "response_ready");
    }
}
