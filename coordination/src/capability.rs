//! Capability vocabulary
//!
//! A closed, ordered list of capability tags, each with the weighted terms
//! the router scores requests against. Declaration order is the tie-break
//! priority everywhere a tag ranking needs one.

use serde::{Deserialize, Serialize};

/// Tag every vocabulary must declare; the router's fallback.
pub const GENERAL_TAG: &str = "general";

/// Lowercase capability identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityTag(String);

impl CapabilityTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into().trim().to_lowercase())
    }

    pub fn general() -> Self {
        Self(GENERAL_TAG.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_general(&self) -> bool {
        self.0 == GENERAL_TAG
    }
}

impl std::fmt::Display for CapabilityTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for CapabilityTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

/// What a handler advertises it can serve.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub tag: CapabilityTag,
    pub description: String,
}

impl CapabilityDescriptor {
    pub fn new(tag: impl Into<CapabilityTag>, description: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            description: description.into(),
        }
    }
}

/// A scoring term; may be a multi-word phrase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeightedTerm {
    pub term: String,
    pub weight: f64,
}

/// One vocabulary entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TagSpec {
    pub tag: CapabilityTag,
    #[serde(default)]
    pub terms: Vec<WeightedTerm>,
}

impl TagSpec {
    pub fn new(tag: &str, terms: &[(&str, f64)]) -> Self {
        Self {
            tag: CapabilityTag::new(tag),
            terms: terms
                .iter()
                .map(|(term, weight)| WeightedTerm {
                    term: term.to_string(),
                    weight: *weight,
                })
                .collect(),
        }
    }
}

/// Ordered tag vocabulary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vocabulary {
    specs: Vec<TagSpec>,
}

impl Vocabulary {
    pub fn new(specs: Vec<TagSpec>) -> Self {
        Self { specs }
    }

    pub fn specs(&self) -> &[TagSpec] {
        &self.specs
    }

    pub fn tags(&self) -> impl Iterator<Item = &CapabilityTag> {
        self.specs.iter().map(|s| &s.tag)
    }

    /// Position in declaration order; unknown tags sort last.
    pub fn priority(&self, tag: &CapabilityTag) -> usize {
        self.specs
            .iter()
            .position(|s| &s.tag == tag)
            .unwrap_or(self.specs.len())
    }

    pub fn contains(&self, tag: &CapabilityTag) -> bool {
        self.specs.iter().any(|s| &s.tag == tag)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.specs.is_empty() {
            return Err("vocabulary must declare at least one tag".into());
        }
        if !self.contains(&CapabilityTag::general()) {
            return Err(format!("vocabulary must declare the '{GENERAL_TAG}' tag"));
        }
        for (i, spec) in self.specs.iter().enumerate() {
            if spec.tag.as_str().is_empty() {
                return Err(format!("vocabulary entry {i} has an empty tag"));
            }
            if self.specs[..i].iter().any(|s| s.tag == spec.tag) {
                return Err(format!("vocabulary tag '{}' declared twice", spec.tag));
            }
            if let Some(term) = spec
                .terms
                .iter()
                .find(|t| !t.weight.is_finite() || t.weight <= 0.0)
            {
                return Err(format!(
                    "term '{}' of tag '{}' needs a positive weight",
                    term.term, spec.tag
                ));
            }
        }
        Ok(())
    }
}

impl Default for Vocabulary {
    fn default() -> Self {
        Self::new(vec![
            TagSpec::new(
                "research",
                &[
                    ("search", 1.0),
                    ("research", 1.0),
                    ("summarize", 1.0),
                    ("summary", 0.8),
                    ("fact check", 1.0),
                    ("paper", 0.6),
                    ("sources", 0.5),
                    ("explain", 0.4),
                ],
            ),
            TagSpec::new(
                "developer",
                &[
                    ("code", 1.0),
                    ("debug", 1.0),
                    ("programming", 1.0),
                    ("bug", 0.8),
                    ("refactor", 0.8),
                    ("compile", 0.6),
                    ("function", 0.5),
                    ("unit test", 0.8),
                ],
            ),
            TagSpec::new(
                "cybersec",
                &[
                    ("security", 1.0),
                    ("vulnerability", 1.0),
                    ("threat", 1.0),
                    ("breach", 0.8),
                    ("credential", 0.8),
                    ("malware", 0.8),
                    ("password", 0.6),
                ],
            ),
            TagSpec::new(
                "finance",
                &[
                    ("expense", 1.0),
                    ("budget", 1.0),
                    ("invest", 0.8),
                    ("investment", 0.8),
                    ("portfolio", 0.8),
                    ("stock", 0.8),
                    ("savings", 0.6),
                    ("money", 0.5),
                ],
            ),
            TagSpec::new(
                "life_manager",
                &[
                    ("schedule", 1.0),
                    ("reminder", 1.0),
                    ("calendar", 0.8),
                    ("appointment", 0.8),
                    ("meeting", 0.6),
                    ("habit", 0.6),
                ],
            ),
            TagSpec::new(
                "data_analyst",
                &[
                    ("dataset", 1.0),
                    ("statistics", 1.0),
                    ("data", 0.8),
                    ("analyze", 0.8),
                    ("analysis", 0.8),
                    ("chart", 0.6),
                    ("trend", 0.6),
                ],
            ),
            TagSpec::new(
                "creative",
                &[
                    ("design", 1.0),
                    ("mockup", 1.0),
                    ("poem", 1.0),
                    ("creative", 1.0),
                    ("story", 0.8),
                    ("logo", 0.8),
                    ("brainstorm", 0.6),
                ],
            ),
            TagSpec::new(
                "instructor",
                &[
                    ("teach", 1.0),
                    ("lesson", 1.0),
                    ("quiz", 1.0),
                    ("tutorial", 0.8),
                    ("learn", 0.8),
                    ("course", 0.6),
                ],
            ),
            TagSpec::new(GENERAL_TAG, &[]),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_normalisation() {
        assert_eq!(CapabilityTag::new("  Research "), CapabilityTag::new("research"));
        assert!(CapabilityTag::new("GENERAL").is_general());
    }

    #[test]
    fn test_default_vocabulary_priority() {
        let vocab = Vocabulary::default();
        assert!(vocab.validate().is_ok());
        assert_eq!(vocab.priority(&"research".into()), 0);
        assert!(vocab.priority(&"developer".into()) < vocab.priority(&"finance".into()));
        assert_eq!(vocab.priority(&"unknown".into()), vocab.specs().len());
    }

    #[test]
    fn test_vocabulary_without_general_is_invalid() {
        let vocab = Vocabulary::new(vec![TagSpec::new("research", &[("search", 1.0)])]);
        assert!(vocab.validate().unwrap_err().contains("general"));
    }

    #[test]
    fn test_vocabulary_rejects_duplicates_and_bad_weights() {
        let dup = Vocabulary::new(vec![
            TagSpec::new("general", &[]),
            TagSpec::new("general", &[]),
        ]);
        assert!(dup.validate().is_err());

        let bad = Vocabulary::new(vec![
            TagSpec::new("research", &[("search", -1.0)]),
            TagSpec::new("general", &[]),
        ]);
        assert!(bad.validate().is_err());
    }
}
