//! Capability handler plugin contract.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use super::task::{Task, TaskPayload};
use crate::capability::CapabilityDescriptor;
use crate::registry::{AgentDescriptor, AgentId, RegistrySnapshot};
use crate::request::Request;

/// Faults a handler may report. The dispatcher turns every one of them
/// into a `failure` result; none reach the caller.
#[derive(Debug, Clone, thiserror::Error)]
pub enum HandlerError {
    #[error("handler failed: {0}")]
    Failed(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("handler observed cancellation")]
    Cancelled,

    #[error("handler panicked: {0}")]
    Panicked(String),
}

/// A pluggable capability handler.
///
/// Implementations should watch `cancel` and return promptly once it
/// fires; the dispatcher stops waiting at the task deadline regardless.
#[async_trait]
pub trait CapabilityHandler: Send + Sync {
    fn id(&self) -> &str;

    fn capabilities(&self) -> Vec<CapabilityDescriptor>;

    async fn execute(
        &self,
        task: &Task,
        request: &Request,
        cancel: CancellationToken,
    ) -> Result<TaskPayload, HandlerError>;
}

/// Shared reference to a handler
pub type SharedHandler = Arc<dyn CapabilityHandler>;

/// Registered handlers keyed by agent id.
#[derive(Default, Clone)]
pub struct HandlerSet {
    handlers: BTreeMap<AgentId, SharedHandler>,
}

impl HandlerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler; a handler with the same id is replaced.
    pub fn register(&mut self, handler: SharedHandler) {
        let id = handler.id().to_string();
        if self.handlers.insert(id.clone(), handler).is_some() {
            warn!(agent_id = %id, "replaced previously registered handler");
        }
    }

    pub fn with(mut self, handler: impl CapabilityHandler + 'static) -> Self {
        self.register(Arc::new(handler));
        self
    }

    pub fn get(&self, id: &str) -> Option<&SharedHandler> {
        self.handlers.get(id)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    pub fn descriptors(&self) -> Vec<AgentDescriptor> {
        self.handlers
            .values()
            .map(|h| {
                let mut tags = Vec::new();
                for capability in h.capabilities() {
                    if !tags.contains(&capability.tag) {
                        tags.push(capability.tag);
                    }
                }
                AgentDescriptor::new(h.id(), tags)
            })
            .collect()
    }

    /// Initial registry snapshot for the registered handlers.
    pub fn snapshot(&self, latency_reference_ms: f64) -> RegistrySnapshot {
        RegistrySnapshot::new(self.descriptors(), latency_reference_ms)
    }
}

impl std::fmt::Debug for HandlerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerSet")
            .field("handlers", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}
