//! Built-in capability handlers.
//!
//! Domain handlers produce templated payloads: the orchestration core only
//! cares about dispatch, synthesis and feedback, not about what a finance
//! or research agent would actually say.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::capability::{CapabilityDescriptor, CapabilityTag, GENERAL_TAG};
use crate::dispatch::{CapabilityHandler, HandlerError, Task, TaskPayload};
use crate::request::Request;

/// Agent id of the handler used when nothing serves a tag.
pub const FALLBACK_AGENT_ID: &str = "general-fallback";

const FALLBACK_TEXT: &str =
    "I don't have a specialist for this yet, so here is a general answer. Let me know if you want me to dig deeper.";

/// Last-resort handler for requests no registered agent can serve.
#[derive(Debug, Clone, Default)]
pub struct FallbackHandler;

#[async_trait]
impl CapabilityHandler for FallbackHandler {
    fn id(&self) -> &str {
        FALLBACK_AGENT_ID
    }

    fn capabilities(&self) -> Vec<CapabilityDescriptor> {
        vec![CapabilityDescriptor::new(GENERAL_TAG, "General acknowledgement")]
    }

    async fn execute(
        &self,
        _task: &Task,
        _request: &Request,
        _cancel: CancellationToken,
    ) -> Result<TaskPayload, HandlerError> {
        Ok(TaskPayload::text(FALLBACK_TEXT))
    }
}

/// Declarative description of a templated handler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub id: String,
    pub tags: Vec<CapabilityTag>,
    /// `{content}` and `{tag}` are substituted
    pub template: String,
    #[serde(default)]
    pub sources: Vec<String>,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub latency_ms: u64,
}

/// Handler that renders a fixed template, optionally after a delay.
#[derive(Debug, Clone)]
pub struct TemplateHandler {
    spec: TemplateSpec,
}

impl TemplateHandler {
    pub fn new(id: impl Into<String>, tags: &[&str], template: impl Into<String>) -> Self {
        Self {
            spec: TemplateSpec {
                id: id.into(),
                tags: tags.iter().map(|t| CapabilityTag::new(*t)).collect(),
                template: template.into(),
                sources: Vec::new(),
                actions: Vec::new(),
                latency_ms: 0,
            },
        }
    }

    pub fn from_spec(spec: TemplateSpec) -> Self {
        Self { spec }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.spec.sources.push(source.into());
        self
    }

    pub fn with_action(mut self, action: impl Into<String>) -> Self {
        self.spec.actions.push(action.into());
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.spec.latency_ms = latency.as_millis() as u64;
        self
    }

    pub fn render(&self, task: &Task, request: &Request) -> String {
        self.spec
            .template
            .replace("{content}", request.content().trim())
            .replace("{tag}", task.requested_tag.as_str())
    }

    /// One templated handler per specialist tag of the default vocabulary.
    pub fn default_roster() -> Vec<TemplateHandler> {
        [
            ("research-desk", "research", "Research notes on \"{content}\": the key findings are summarised below with their sources.", "https://scholar.example.org", "compiled_research_brief"),
            ("dev-workbench", "developer", "Engineering review of \"{content}\": start by reproducing the issue, then isolate the failing component.", "https://docs.example.dev", "drafted_code_plan"),
            ("security-sentinel", "cybersec", "Security assessment for \"{content}\": no critical exposure detected, review credentials and patch levels.", "https://advisories.example.net", "ran_security_checklist"),
            ("ledger", "finance", "Financial summary for \"{content}\": track fixed costs first, then set a monthly limit for variable spending.", "https://rates.example.com", "prepared_budget_outline"),
            ("life-planner", "life_manager", "Planning note for \"{content}\": block the time on your calendar and add a reminder the day before.", "calendar://primary", "scheduled_reminder"),
            ("data-lab", "data_analyst", "Analysis plan for \"{content}\": profile the dataset, then chart the main trend.", "https://data.example.org", "generated_analysis_plan"),
            ("studio", "creative", "Creative direction for \"{content}\": three concepts are sketched, each with a distinct mood.", "https://moodboard.example.art", "sketched_concepts"),
            ("tutor", "instructor", "Lesson outline for \"{content}\": a short explanation, a worked example, and a quiz question.", "https://lessons.example.edu", "built_lesson_outline"),
        ]
        .into_iter()
        .map(|(id, tag, template, source, action)| {
            TemplateHandler::new(id, &[tag], template)
                .with_source(source)
                .with_action(action)
        })
        .collect()
    }
}

#[async_trait]
impl CapabilityHandler for TemplateHandler {
    fn id(&self) -> &str {
        &self.spec.id
    }

    fn capabilities(&self) -> Vec<CapabilityDescriptor> {
        self.spec
            .tags
            .iter()
            .map(|tag| CapabilityDescriptor::new(tag.clone(), format!("templated {tag} payload")))
            .collect()
    }

    async fn execute(
        &self,
        task: &Task,
        request: &Request,
        cancel: CancellationToken,
    ) -> Result<TaskPayload, HandlerError> {
        if self.spec.latency_ms > 0 {
            tokio::select! {
                _ = cancel.cancelled() => return Err(HandlerError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(self.spec.latency_ms)) => {}
            }
        }

        Ok(TaskPayload {
            content: self.render(task, request),
            sources: self.spec.sources.clone(),
            actions: self.spec.actions.clone(),
        })
    }
}
