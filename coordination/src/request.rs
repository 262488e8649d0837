//! Request and Response envelopes
//!
//! A `Request` is immutable once built: the builder methods consume `self`
//! and there are no setters. Context hints are free-form JSON, but the keys
//! the pipeline understands are type-checked by [`Request::validate`].

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::affect::{AffectReading, CommunicationProfile};
use crate::capability::CapabilityTag;
use crate::dispatch::TaskStatus;
use crate::router::RoutedTag;
use crate::swarm::ConsensusDecision;
use crate::synthesis::DegradationLevel;

/// Unique identifier for requests
pub type RequestId = String;

/// Affect stream key
pub const SESSION_HINT: &str = "session";
/// Forces the swarm on or off
pub const REQUIRES_DECISION_HINT: &str = "requires_decision";
/// "low" | "medium" | "high"
pub const TASK_COMPLEXITY_HINT: &str = "task_complexity";
/// Number of recent errors the caller observed
pub const RECENT_ERRORS_HINT: &str = "recent_errors";
/// Caller-declared affect name
pub const MOOD_HINT: &str = "mood";

/// Session used when the caller does not name one
pub const DEFAULT_SESSION: &str = "default";

/// Raised when a request is rejected before dispatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoutingError {
    #[error("request content is empty")]
    EmptyContent,

    #[error("request content is {len} characters, limit is {limit}")]
    ContentTooLong { len: usize, limit: usize },

    #[error("context hint '{key}' must be {expected}")]
    InvalidContext { key: String, expected: &'static str },
}

/// An inbound natural-language request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    id: RequestId,
    content: String,
    context: BTreeMap<String, Value>,
    timestamp: DateTime<Utc>,
}

impl Request {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            content: content.into(),
            context: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_id(mut self, id: impl Into<RequestId>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_context(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn content(&self) -> &str {
        &self.content
    }

    pub fn context(&self) -> &BTreeMap<String, Value> {
        &self.context
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Reject empty, oversized, or mistyped requests.
    pub fn validate(&self, max_chars: usize) -> Result<(), RoutingError> {
        if self.content.trim().is_empty() {
            return Err(RoutingError::EmptyContent);
        }
        let len = self.content.chars().count();
        if len > max_chars {
            return Err(RoutingError::ContentTooLong {
                len,
                limit: max_chars,
            });
        }

        let checks: [(&str, &'static str, fn(&Value) -> bool); 5] = [
            (SESSION_HINT, "a string", Value::is_string),
            (REQUIRES_DECISION_HINT, "a boolean", Value::is_boolean),
            (TASK_COMPLEXITY_HINT, "a string", Value::is_string),
            (RECENT_ERRORS_HINT, "a non-negative integer", Value::is_u64),
            (MOOD_HINT, "a string", Value::is_string),
        ];
        for (key, expected, ok) in checks {
            if let Some(value) = self.context.get(key) {
                if !ok(value) {
                    return Err(RoutingError::InvalidContext {
                        key: key.to_string(),
                        expected,
                    });
                }
            }
        }
        Ok(())
    }

    pub fn session(&self) -> &str {
        self.context
            .get(SESSION_HINT)
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_SESSION)
    }

    pub fn decision_hint(&self) -> Option<bool> {
        self.context.get(REQUIRES_DECISION_HINT).and_then(Value::as_bool)
    }

    pub fn task_complexity(&self) -> Option<&str> {
        self.context.get(TASK_COMPLEXITY_HINT).and_then(Value::as_str)
    }

    pub fn recent_errors(&self) -> Option<u64> {
        self.context.get(RECENT_ERRORS_HINT).and_then(Value::as_u64)
    }

    pub fn mood(&self) -> Option<&str> {
        self.context.get(MOOD_HINT).and_then(Value::as_str)
    }
}

/// Overall outcome of a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    /// Every task succeeded
    Completed,
    /// Some tasks failed or timed out, at least one succeeded
    Degraded,
    /// No task succeeded
    NoResults,
}

impl std::fmt::Display for ResponseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Degraded => write!(f, "degraded"),
            Self::NoResults => write!(f, "no_results"),
        }
    }
}

impl From<DegradationLevel> for ResponseStatus {
    fn from(level: DegradationLevel) -> Self {
        match level {
            DegradationLevel::Full => Self::Completed,
            DegradationLevel::Partial => Self::Degraded,
            DegradationLevel::Unavailable => Self::NoResults,
        }
    }
}

/// Per-task line in the diagnostics block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskSummary {
    pub task_id: String,
    pub agent_id: String,
    pub capability_tag: CapabilityTag,
    /// Tag the router asked for; differs from `capability_tag` on fallback
    pub requested_tag: CapabilityTag,
    pub status: TaskStatus,
    pub latency_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// How the response was produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostics {
    pub routed: Vec<RoutedTag>,
    pub tasks: Vec<TaskSummary>,
    pub degradation: DegradationLevel,
    pub affect: AffectReading,
    pub decision_requested: bool,
    pub elapsed_ms: u64,
}

/// What `submit` returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    pub request_id: RequestId,
    pub status: ResponseStatus,
    pub content: String,
    pub sources: Vec<String>,
    pub actions: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub decision: Option<ConsensusDecision>,
    pub communication: CommunicationProfile,
    pub diagnostics: Diagnostics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_and_whitespace_rejected() {
        assert_eq!(
            Request::new("").validate(100),
            Err(RoutingError::EmptyContent)
        );
        assert_eq!(
            Request::new("   \n\t").validate(100),
            Err(RoutingError::EmptyContent)
        );
    }

    #[test]
    fn test_oversized_rejected() {
        let err = Request::new("abcdef").validate(5).unwrap_err();
        assert_eq!(err, RoutingError::ContentTooLong { len: 6, limit: 5 });
    }

    #[test]
    fn test_mistyped_hint_rejected() {
        let request = Request::new("hello").with_context(REQUIRES_DECISION_HINT, "yes");
        let err = request.validate(100).unwrap_err();
        assert!(matches!(err, RoutingError::InvalidContext { ref key, .. } if key == "requires_decision"));

        let request = Request::new("hello").with_context(RECENT_ERRORS_HINT, -3);
        assert!(request.validate(100).is_err());
    }

    #[test]
    fn test_hint_accessors() {
        let request = Request::new("hello")
            .with_context(SESSION_HINT, "s-1")
            .with_context(REQUIRES_DECISION_HINT, true)
            .with_context(RECENT_ERRORS_HINT, 4)
            .with_context("unrelated", json!({"a": 1}));

        assert!(request.validate(100).is_ok());
        assert_eq!(request.session(), "s-1");
        assert_eq!(request.decision_hint(), Some(true));
        assert_eq!(request.recent_errors(), Some(4));
        assert_eq!(request.mood(), None);
        assert_eq!(Request::new("x").session(), DEFAULT_SESSION);
    }

    #[test]
    fn test_ids_are_unique() {
        assert_ne!(Request::new("a").id(), Request::new("a").id());
        assert_eq!(Request::new("a").with_id("fixed").id(), "fixed");
    }
}
