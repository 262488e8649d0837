//! Orchestrator - ingress for natural-language requests
//!
//! ```text
//! submit(Request)
//!   1. validate ─────────────────────────────▶ Err(RoutingError)  (only failure)
//!   2. registry snapshot (once)
//!   3. affect observe ─▶ CommunicationProfile
//!   4. route + decision flag
//!   5. ┌ dispatch(tasks) ┐  one global deadline,
//!      └ swarm.decide    ┘  one cancellation token   (tokio::join!)
//!   6. synthesize (+ "Recommendation:" fragment)
//!   7. tone transform
//!   8. events, decision history ─▶ Ok(Response)
//! ```

use std::sync::{Arc, Mutex};

use chrono::Utc;
use serde::Serialize;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::affect::{AffectInsights, AffectTracker, ToneTransformer};
use crate::config::{ConfigResult, OrchestratorConfig};
use crate::dispatch::{CapabilityHandler, Dispatcher, HandlerSet, SharedHandler};
use crate::events::{AuditSink, EventBus, OrchestrationEvent, SharedEventBus};
use crate::feedback::{FeedbackHandle, FeedbackStats};
use crate::registry::SharedRegistry;
use crate::request::{Diagnostics, Request, Response, ResponseStatus, RoutingError};
use crate::router::{route, DecisionDetector, TagTable};
use crate::swarm::{ConsensusEngine, DecisionHistory, SharedEvaluator, SwarmInsights};
use crate::synthesis::{synthesize, DegradationLevel};

/// Shared reference to Orchestrator
pub type SharedOrchestrator = Arc<Orchestrator>;

/// Prefix of the fragment carrying the swarm's recommendation.
pub const RECOMMENDATION_PREFIX: &str = "Recommendation:";

/// Point-in-time view for operators.
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorInsights {
    pub registry_version: u64,
    pub handlers: usize,
    pub swarm: SwarmInsights,
}

/// Wires config, handlers, evaluators, events and the feedback loop.
pub struct OrchestratorBuilder {
    config: OrchestratorConfig,
    handlers: HandlerSet,
    evaluators: Option<Vec<SharedEvaluator>>,
    bus: Option<SharedEventBus>,
    audit: Option<Arc<dyn AuditSink>>,
    feedback: bool,
}

impl OrchestratorBuilder {
    fn new() -> Self {
        Self {
            config: OrchestratorConfig::default(),
            handlers: HandlerSet::new(),
            evaluators: None,
            bus: None,
            audit: None,
            feedback: true,
        }
    }

    pub fn config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    pub fn handler(mut self, handler: impl CapabilityHandler + 'static) -> Self {
        self.handlers.register(Arc::new(handler));
        self
    }

    pub fn shared_handler(mut self, handler: SharedHandler) -> Self {
        self.handlers.register(handler);
        self
    }

    /// Replace the default evaluator roster.
    pub fn evaluators(mut self, evaluators: Vec<SharedEvaluator>) -> Self {
        self.evaluators = Some(evaluators);
        self
    }

    pub fn event_bus(mut self, bus: SharedEventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    /// Audit sink for a bus built here; ignored when `event_bus` is given.
    pub fn audit_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.audit = Some(sink);
        self
    }

    /// Keep the registry at its initial weights.
    pub fn without_feedback(mut self) -> Self {
        self.feedback = false;
        self
    }

    /// Validate the config and start the feedback loop on the current
    /// tokio runtime. Without a runtime the loop is skipped with a warning.
    pub fn build(self) -> ConfigResult<Orchestrator> {
        self.config.validate()?;
        let config = self.config;

        let bus = match (self.bus, self.audit) {
            (Some(bus), _) => bus,
            (None, Some(sink)) => EventBus::with_audit(sink).shared(),
            (None, None) => EventBus::new().shared(),
        };

        let registry = SharedRegistry::new(
            self.handlers
                .snapshot(config.feedback.latency_reference_ms),
        );
        let handler_count = self.handlers.len();
        let mut dispatcher = Dispatcher::new(Arc::new(self.handlers), config.dispatch.clone());

        let feedback = if self.feedback {
            match tokio::runtime::Handle::try_current() {
                Ok(_) => {
                    let handle = FeedbackHandle::spawn(
                        registry.clone(),
                        config.feedback.clone(),
                        Some(bus.clone()),
                    );
                    dispatcher = dispatcher.with_feedback(handle.sender());
                    Some(handle)
                }
                Err(_) => {
                    warn!("no tokio runtime, feedback loop disabled");
                    None
                }
            }
        } else {
            None
        };

        let swarm = match self.evaluators {
            Some(roster) => ConsensusEngine::new(roster, config.swarm.clone()),
            None => ConsensusEngine::with_default_roster(config.swarm.clone()),
        };

        info!(
            handlers = handler_count,
            evaluators = swarm.roster_size(),
            feedback = feedback.is_some(),
            "orchestrator ready"
        );

        Ok(Orchestrator {
            table: TagTable::from_config(&config.router),
            detector: DecisionDetector::from_config(&config.router),
            affect: AffectTracker::new(&config.affect),
            tone: ToneTransformer::new(),
            history: Mutex::new(DecisionHistory::new(config.swarm.history_capacity)),
            handler_count,
            registry,
            dispatcher,
            swarm,
            bus,
            feedback,
            config,
        })
    }
}

/// The orchestration pipeline.
pub struct Orchestrator {
    config: OrchestratorConfig,
    table: TagTable,
    detector: DecisionDetector,
    registry: SharedRegistry,
    dispatcher: Dispatcher,
    swarm: ConsensusEngine,
    affect: AffectTracker,
    tone: ToneTransformer,
    bus: SharedEventBus,
    history: Mutex<DecisionHistory>,
    handler_count: usize,
    feedback: Option<FeedbackHandle>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::new()
    }

    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    pub fn event_bus(&self) -> &SharedEventBus {
        &self.bus
    }

    /// Handle one request end to end. Only validation can fail.
    pub async fn submit(&self, request: Request) -> Result<Response, RoutingError> {
        let started = Instant::now();
        if let Err(e) = request.validate(self.config.limits.max_content_chars) {
            warn!(request_id = request.id(), error = %e, "request rejected");
            return Err(e);
        }

        let snapshot = self.registry.snapshot();
        self.bus.publish(OrchestrationEvent::RequestReceived {
            request_id: request.id().to_string(),
            session: request.session().to_string(),
            content_chars: request.content().chars().count(),
            timestamp: Utc::now(),
        });

        let affect = self.affect.observe(&request);
        let communication = self.affect.profile_for(&affect);

        let routed = route(&request, &self.table);
        let decision_requested = self.detector.requires_decision(&request);
        info!(
            request_id = request.id(),
            tags = ?routed.iter().map(|r| r.tag.as_str()).collect::<Vec<_>>(),
            decision_requested,
            registry_version = snapshot.version(),
            "request routed"
        );
        self.bus.publish(OrchestrationEvent::RequestRouted {
            request_id: request.id().to_string(),
            tags: routed.clone(),
            decision_requested,
            registry_version: snapshot.version(),
            timestamp: Utc::now(),
        });

        let deadline = started + self.config.dispatch.global_deadline();
        let cancel = CancellationToken::new();
        let dispatch = self
            .dispatcher
            .dispatch(&request, &routed, &snapshot, deadline, &cancel);
        let (results, decision) = if decision_requested {
            let (results, decision) =
                tokio::join!(dispatch, self.swarm.decide(&request, deadline, &cancel));
            (results, Some(decision))
        } else {
            (dispatch.await, None)
        };
        cancel.cancel();

        for result in &results {
            self.bus
                .publish(OrchestrationEvent::task_completed(request.id(), result));
        }

        let mut payload = synthesize(&results);
        if let Some(decision) = &decision {
            for round in &decision.rounds {
                self.bus
                    .publish(OrchestrationEvent::debate_round(request.id(), round));
            }
            self.bus.publish(OrchestrationEvent::consensus(decision));
            if decision.stance.is_some() {
                payload = payload.prepend(&format!(
                    "{RECOMMENDATION_PREFIX} {}",
                    decision.recommendation
                ));
            }
            self.history
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .record(decision.clone());
        }

        let degradation = DegradationLevel::from_results(&results);
        let status = ResponseStatus::from(degradation);
        let content = self.tone.apply(payload.text(), &communication);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            request_id = request.id(),
            status = %status,
            mode = %communication.mode,
            elapsed_ms,
            "response ready"
        );
        self.bus.publish(OrchestrationEvent::ResponseReady {
            request_id: request.id().to_string(),
            status,
            elapsed_ms,
            timestamp: Utc::now(),
        });

        Ok(Response {
            request_id: request.id().to_string(),
            status,
            content,
            sources: payload.sources().to_vec(),
            actions: payload.actions().to_vec(),
            decision,
            communication,
            diagnostics: Diagnostics {
                routed,
                tasks: results.iter().map(|r| r.summary()).collect(),
                degradation,
                affect,
                decision_requested,
                elapsed_ms,
            },
        })
    }

    pub fn insights(&self) -> OrchestratorInsights {
        let history = self.history.lock().unwrap_or_else(|e| e.into_inner());
        OrchestratorInsights {
            registry_version: self.registry.version(),
            handlers: self.handler_count,
            swarm: history.insights(self.swarm.roster_size()),
        }
    }

    pub fn affect_insights(&self, session: &str) -> AffectInsights {
        self.affect.insights(session)
    }

    /// Stop the feedback loop after its final publication.
    pub async fn shutdown(self) -> Option<FeedbackStats> {
        match self.feedback {
            Some(handle) => Some(handle.shutdown().await),
            None => None,
        }
    }
}
