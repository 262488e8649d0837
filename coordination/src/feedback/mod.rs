//! Performance Feedback Loop
//!
//! Turns terminal task results into registry weight updates, off the
//! request path.
//!
//! ```text
//! Dispatcher ──try_send──▶ mpsc (bounded) ──▶ FeedbackLoop (single writer)
//!                                               │ EMA per (agent, tag)
//!                                               │ every `publish_batch` events,
//!                                               │ every `publish_interval` if dirty,
//!                                               │ and once on shutdown
//!                                               ▼
//!                       snapshot.with_records(..) ──▶ SharedRegistry::publish
//! ```
//!
//! Requests already holding a snapshot keep reading it; only requests that
//! start after a publication see the new weights.

pub mod worker;

use serde::Serialize;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use worker::{FeedbackLoop, FeedbackStats};

use crate::capability::CapabilityTag;
use crate::config::FeedbackConfig;
use crate::dispatch::TaskResult;
use crate::events::SharedEventBus;
use crate::registry::{AgentId, SharedRegistry};

/// One terminal outcome queued for the feedback loop.
#[derive(Debug, Clone, Serialize)]
pub struct PerformanceEvent {
    pub agent_id: AgentId,
    pub capability_tag: CapabilityTag,
    pub result: TaskResult,
}

impl PerformanceEvent {
    pub fn from_result(result: &TaskResult) -> Self {
        Self {
            agent_id: result.agent_id().to_string(),
            capability_tag: result.capability_tag().clone(),
            result: result.clone(),
        }
    }
}

/// Cloneable producer side of the feedback queue. Never blocks.
#[derive(Debug, Clone)]
pub struct FeedbackSender {
    tx: mpsc::Sender<PerformanceEvent>,
}

impl FeedbackSender {
    /// Queue `result`; dropped with a warning when the queue is full.
    pub fn record(&self, result: &TaskResult) {
        match self.tx.try_send(PerformanceEvent::from_result(result)) {
            Ok(()) => {}
            Err(TrySendError::Full(event)) => warn!(
                agent_id = %event.agent_id,
                tag = %event.capability_tag,
                "feedback queue full, dropping performance event"
            ),
            Err(TrySendError::Closed(event)) => debug!(
                agent_id = %event.agent_id,
                "feedback loop stopped, performance event discarded"
            ),
        }
    }
}

/// Running feedback loop.
#[derive(Debug)]
pub struct FeedbackHandle {
    sender: FeedbackSender,
    shutdown: CancellationToken,
    join: JoinHandle<FeedbackStats>,
}

impl FeedbackHandle {
    /// Start the loop on the current tokio runtime.
    pub fn spawn(
        registry: SharedRegistry,
        config: FeedbackConfig,
        bus: Option<SharedEventBus>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(config.queue_capacity.max(1));
        let shutdown = CancellationToken::new();
        let worker = FeedbackLoop::new(registry, config, bus);
        let join = tokio::spawn(worker.run(rx, shutdown.clone()));
        Self {
            sender: FeedbackSender { tx },
            shutdown,
            join,
        }
    }

    pub fn sender(&self) -> FeedbackSender {
        self.sender.clone()
    }

    /// Stop accepting events, apply what is queued, publish once more.
    pub async fn shutdown(self) -> FeedbackStats {
        self.shutdown.cancel();
        match self.join.await {
            Ok(stats) => stats,
            Err(e) => {
                warn!(error = %e, "feedback loop ended abnormally");
                FeedbackStats::default()
            }
        }
    }
}
