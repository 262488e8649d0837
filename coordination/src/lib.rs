//! Switchboard coordination core
//!
//! Turns a natural-language request into one synthesized, tone-adapted
//! response:
//!
//! - capability routing over a weighted tag vocabulary
//! - bulkhead dispatch with per-task timeouts under one global deadline
//! - deterministic result synthesis with graceful degradation
//! - a swarm of evaluators that debate decision requests to a consensus
//! - affect estimation mapped onto a communication profile
//! - a feedback loop publishing copy-on-write registry snapshots
//!
//! # Usage
//!
//! ```no_run
//! use coordination::{Orchestrator, Request, TemplateHandler};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let mut builder = Orchestrator::builder();
//! for handler in TemplateHandler::default_roster() {
//!     builder = builder.handler(handler);
//! }
//! let orchestrator = builder.build()?;
//!
//! let response = orchestrator
//!     .submit(Request::new("should I refinance, given my budget?"))
//!     .await?;
//! println!("{}", response.content);
//! orchestrator.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod affect;
pub mod capability;
pub mod config;
pub mod dispatch;
pub mod events;
pub mod feedback;
pub mod handlers;
pub mod orchestrator;
pub mod registry;
pub mod request;
pub mod router;
pub mod swarm;
pub mod synthesis;

pub use affect::{
    Affect, AffectInsights, AffectReading, AffectTracker, CommunicationMode, CommunicationProfile,
    IntensityBand, ProfileTable, ToneTransformer, Verbosity,
};
pub use capability::{CapabilityDescriptor, CapabilityTag, TagSpec, Vocabulary, GENERAL_TAG};
pub use config::{ConfigError, ConfigResult, OrchestratorConfig};
pub use dispatch::{
    CapabilityHandler, Dispatcher, HandlerError, HandlerSet, SharedHandler, Task, TaskPayload,
    TaskResult, TaskStatus,
};
pub use events::{
    AuditRecord, AuditSink, EventBus, JsonlAuditSink, MemoryAuditSink, OrchestrationEvent,
    SharedEventBus,
};
pub use feedback::{FeedbackHandle, FeedbackSender, FeedbackStats};
pub use handlers::{FallbackHandler, TemplateHandler, TemplateSpec};
pub use orchestrator::{
    Orchestrator, OrchestratorBuilder, OrchestratorInsights, SharedOrchestrator,
};
pub use registry::{AgentDescriptor, PerformanceRecord, RegistrySnapshot, SharedRegistry};
pub use request::{Request, Response, ResponseStatus, RoutingError};
pub use router::{route, DecisionDetector, RoutedTag, TagTable};
pub use swarm::{
    ConsensusDecision, ConsensusEngine, Evaluator, EvaluatorError, Position, ProfileEvaluator,
    SharedEvaluator, Stance,
};
pub use synthesis::{synthesize, DegradationLevel, SynthesizedPayload};
