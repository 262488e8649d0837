//! Decision-request detection.
//!
//! A request goes to the swarm when the caller says so through the
//! `requires_decision` hint, or when its wording matches one of the
//! configured ambiguity patterns.

use crate::config::RouterConfig;
use crate::request::Request;

/// Flags requests that need judgment rather than retrieval.
#[derive(Debug, Clone)]
pub struct DecisionDetector {
    patterns: Vec<String>,
}

impl DecisionDetector {
    pub fn new(patterns: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.into().to_lowercase())
                .filter(|p| !p.trim().is_empty())
                .collect(),
        }
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(config.decision_patterns.iter().cloned())
    }

    /// The explicit hint wins over pattern matching.
    pub fn requires_decision(&self, request: &Request) -> bool {
        if let Some(explicit) = request.decision_hint() {
            return explicit;
        }
        self.matched_pattern(request).is_some()
    }

    /// First configured pattern found in the request content.
    pub fn matched_pattern(&self, request: &Request) -> Option<&str> {
        let content = request.content().to_lowercase();
        self.patterns
            .iter()
            .find(|p| content.contains(p.as_str()))
            .map(String::as_str)
    }
}

impl Default for DecisionDetector {
    fn default() -> Self {
        Self::from_config(&RouterConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::REQUIRES_DECISION_HINT;

    #[test]
    fn test_pattern_match() {
        let detector = DecisionDetector::default();
        assert!(detector.requires_decision(&Request::new("Should I rewrite the service in Rust?")));
        assert!(detector.requires_decision(&Request::new("Which approach scales better?")));
        assert!(!detector.requires_decision(&Request::new("summarize this paper")));
        assert_eq!(
            detector.matched_pattern(&Request::new("pros and cons of renting")),
            Some("pros and cons")
        );
    }

    #[test]
    fn test_hint_overrides_patterns() {
        let detector = DecisionDetector::default();
        let forced_off =
            Request::new("should I buy it?").with_context(REQUIRES_DECISION_HINT, false);
        assert!(!detector.requires_decision(&forced_off));

        let forced_on = Request::new("summarize this").with_context(REQUIRES_DECISION_HINT, true);
        assert!(detector.requires_decision(&forced_on));
    }

    #[test]
    fn test_empty_patterns_ignored() {
        let detector = DecisionDetector::new(["", "  ", "decide"]);
        assert!(!detector.requires_decision(&Request::new("anything")));
        assert!(detector.requires_decision(&Request::new("help me DECIDE")));
    }
}
