//! Result Synthesizer
//!
//! Deterministic merge of successful task results.
//!
//! ```text
//! [TaskResult] (routing order)
//!   ├─ keep status = success
//!   ├─ none left ───────────────▶ SynthesizedPayload::NoResults
//!   └─ fragments (blank-line paragraphs), first occurrence wins
//!      sources / actions union, first-seen order
//!                         ───────▶ SynthesizedPayload::Merged
//! ```
//!
//! Merging a merged payload again is a fixed point: every fragment is
//! already unique, so nothing accumulates.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::dispatch::{TaskPayload, TaskResult};
use crate::registry::AgentId;

/// Text returned when no task succeeded.
pub const NO_RESULTS_TEXT: &str =
    "I wasn't able to put together an answer this time. Please try again in a moment.";

/// How much of the routed capability set produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DegradationLevel {
    /// Every task succeeded.
    Full,
    /// Some tasks failed or timed out.
    Partial,
    /// No task succeeded.
    Unavailable,
}

impl DegradationLevel {
    /// A success whose payload has no text contributes nothing, so it
    /// counts like a failure here.
    pub fn from_results(results: &[TaskResult]) -> Self {
        let succeeded = results.iter().filter(|r| contributes(r)).count();
        if succeeded == 0 {
            Self::Unavailable
        } else if succeeded == results.len() {
            Self::Full
        } else {
            Self::Partial
        }
    }
}

impl std::fmt::Display for DegradationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Full => write!(f, "full"),
            Self::Partial => write!(f, "partial"),
            Self::Unavailable => write!(f, "unavailable"),
        }
    }
}

/// Merged output of a request's tasks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SynthesizedPayload {
    Merged {
        text: String,
        sources: Vec<String>,
        actions: Vec<String>,
        contributors: Vec<AgentId>,
    },
    NoResults {
        text: String,
    },
}

impl SynthesizedPayload {
    pub fn no_results() -> Self {
        Self::NoResults {
            text: NO_RESULTS_TEXT.to_string(),
        }
    }

    pub fn text(&self) -> &str {
        match self {
            Self::Merged { text, .. } | Self::NoResults { text } => text,
        }
    }

    pub fn sources(&self) -> &[String] {
        match self {
            Self::Merged { sources, .. } => sources,
            Self::NoResults { .. } => &[],
        }
    }

    pub fn actions(&self) -> &[String] {
        match self {
            Self::Merged { actions, .. } => actions,
            Self::NoResults { .. } => &[],
        }
    }

    pub fn is_no_results(&self) -> bool {
        matches!(self, Self::NoResults { .. })
    }

    /// The merged content as a payload, for re-merging.
    pub fn as_task_payload(&self) -> Option<TaskPayload> {
        match self {
            Self::Merged {
                text,
                sources,
                actions,
                ..
            } => Some(TaskPayload {
                content: text.clone(),
                sources: sources.clone(),
                actions: actions.clone(),
            }),
            Self::NoResults { .. } => None,
        }
    }

    /// Put `fragment` in front of the merged text, keeping fragments unique.
    pub fn prepend(self, fragment: &str) -> Self {
        match self {
            Self::Merged {
                text,
                sources,
                actions,
                contributors,
            } => {
                let merged = merge_payloads([
                    &TaskPayload::text(fragment),
                    &TaskPayload {
                        content: text,
                        sources,
                        actions,
                    },
                ]);
                Self::Merged {
                    text: merged.content,
                    sources: merged.sources,
                    actions: merged.actions,
                    contributors,
                }
            }
            Self::NoResults { text } => Self::NoResults {
                text: merge_payloads([&TaskPayload::text(fragment), &TaskPayload::text(text)])
                    .content,
            },
        }
    }
}

/// Merge payloads in order: unique fragments, unioned sources and actions.
pub fn merge_payloads<'a>(payloads: impl IntoIterator<Item = &'a TaskPayload>) -> TaskPayload {
    let mut fragments: Vec<&str> = Vec::new();
    let mut seen_fragments = HashSet::new();
    let mut merged = TaskPayload::default();

    for payload in payloads {
        for fragment in payload.fragments() {
            if seen_fragments.insert(fragment) {
                fragments.push(fragment);
            }
        }
        push_unique(&mut merged.sources, &payload.sources);
        push_unique(&mut merged.actions, &payload.actions);
    }

    merged.content = fragments.join("\n\n");
    merged
}

fn push_unique(into: &mut Vec<String>, items: &[String]) {
    for item in items {
        if !into.contains(item) {
            into.push(item.clone());
        }
    }
}

fn contributes(result: &TaskResult) -> bool {
    result.is_success()
        && result
            .payload()
            .is_some_and(|p| p.fragments().next().is_some())
}

/// Merge the successful results, in the order given.
pub fn synthesize(results: &[TaskResult]) -> SynthesizedPayload {
    let successes: Vec<&TaskResult> = results.iter().filter(|r| contributes(r)).collect();
    let payloads: Vec<&TaskPayload> = successes.iter().filter_map(|r| r.payload()).collect();

    let merged = merge_payloads(payloads);
    if merged.content.is_empty() {
        return SynthesizedPayload::no_results();
    }

    let mut contributors: Vec<AgentId> = Vec::new();
    for result in &successes {
        if !contributors.iter().any(|c| c == result.agent_id()) {
            contributors.push(result.agent_id().to_string());
        }
    }

    SynthesizedPayload::Merged {
        text: merged.content,
        sources: merged.sources,
        actions: merged.actions,
        contributors,
    }
}
