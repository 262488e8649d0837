//! Tasks, payloads, and write-once task results.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::capability::CapabilityTag;
use crate::registry::AgentId;
use crate::request::{RequestId, TaskSummary};

/// Unique identifier for tasks
pub type TaskId = String;

/// One unit of work: a request, a capability, and the agent serving it.
#[derive(Debug, Clone)]
pub struct Task {
    pub id: TaskId,
    pub request_id: RequestId,
    pub agent_id: AgentId,
    /// Tag the agent serves; `general` when the routed tag had no agent
    pub capability_tag: CapabilityTag,
    /// Tag the router produced
    pub requested_tag: CapabilityTag,
    /// min(permit acquired + capability timeout, global deadline); the
    /// global deadline until the task starts
    pub deadline: Instant,
}

impl Task {
    pub fn is_fallback(&self) -> bool {
        self.capability_tag != self.requested_tag
    }

    pub fn remaining(&self) -> std::time::Duration {
        self.deadline.saturating_duration_since(Instant::now())
    }
}

/// Terminal state of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Success,
    Failure,
    Timeout,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failure => write!(f, "failure"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// Content a handler produced.
///
/// `content` is split into fragments on blank lines when results are merged.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskPayload {
    pub content: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
}

impl TaskPayload {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Default::default()
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.sources.push(source.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.actions.push(action.into());
        self
    }

    /// Trimmed, non-empty paragraphs of `content`.
    pub fn fragments(&self) -> impl Iterator<Item = &str> {
        self.content
            .split("\n\n")
            .map(str::trim)
            .filter(|f| !f.is_empty())
    }
}

/// Outcome of one task. Built once by the dispatcher and never mutated.
#[derive(Debug, Clone, Serialize)]
pub struct TaskResult {
    task_id: TaskId,
    agent_id: AgentId,
    capability_tag: CapabilityTag,
    requested_tag: CapabilityTag,
    status: TaskStatus,
    payload: Option<TaskPayload>,
    error: Option<String>,
    latency_ms: u64,
    finished_at: DateTime<Utc>,
}

impl TaskResult {
    fn terminal(
        task: &Task,
        status: TaskStatus,
        payload: Option<TaskPayload>,
        error: Option<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            task_id: task.id.clone(),
            agent_id: task.agent_id.clone(),
            capability_tag: task.capability_tag.clone(),
            requested_tag: task.requested_tag.clone(),
            status,
            payload,
            error,
            latency_ms,
            finished_at: Utc::now(),
        }
    }

    pub fn success(task: &Task, payload: TaskPayload, latency_ms: u64) -> Self {
        Self::terminal(task, TaskStatus::Success, Some(payload), None, latency_ms)
    }

    pub fn failure(task: &Task, error: impl Into<String>, latency_ms: u64) -> Self {
        Self::terminal(task, TaskStatus::Failure, None, Some(error.into()), latency_ms)
    }

    pub fn timeout(task: &Task, latency_ms: u64) -> Self {
        Self::terminal(
            task,
            TaskStatus::Timeout,
            None,
            Some(format!("task {} exceeded its deadline", task.id)),
            latency_ms,
        )
    }

    pub fn task_id(&self) -> &str {
        &self.task_id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn capability_tag(&self) -> &CapabilityTag {
        &self.capability_tag
    }

    pub fn requested_tag(&self) -> &CapabilityTag {
        &self.requested_tag
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn is_success(&self) -> bool {
        self.status == TaskStatus::Success
    }

    pub fn payload(&self) -> Option<&TaskPayload> {
        self.payload.as_ref()
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn latency_ms(&self) -> u64 {
        self.latency_ms
    }

    pub fn finished_at(&self) -> DateTime<Utc> {
        self.finished_at
    }

    pub fn summary(&self) -> TaskSummary {
        TaskSummary {
            task_id: self.task_id.clone(),
            agent_id: self.agent_id.clone(),
            capability_tag: self.capability_tag.clone(),
            requested_tag: self.requested_tag.clone(),
            status: self.status,
            latency_ms: self.latency_ms,
            error: self.error.clone(),
        }
    }
}
