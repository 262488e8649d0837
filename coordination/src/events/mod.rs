//! Orchestration events and audit trail
//!
//! ```text
//! ┌──────────────┐     ┌──────────────┐     ┌──────────────┐
//! │ Orchestrator │────▶│  Event Bus   │────▶│  Subscribers │
//! │ Feedback loop│     │  (broadcast) │     │   (recv)     │
//! └──────────────┘     └──────┬───────┘     └──────────────┘
//!                             │ performance_updated,
//!                             │ consensus_reached
//!                             ▼
//!                      ┌──────────────┐
//!                      │  AuditSink   │
//!                      │ (JSON lines) │
//!                      └──────────────┘
//! ```

pub mod audit;
pub mod bus;
pub mod types;

pub use audit::{AuditError, AuditRecord, AuditResult, AuditSink, JsonlAuditSink, MemoryAuditSink};
pub use bus::{EventBus, SharedEventBus};
pub use types::OrchestrationEvent;
