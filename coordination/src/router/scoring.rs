//! Weighted-term tag scoring.

use std::cmp::Ordering;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::capability::{CapabilityTag, Vocabulary};
use crate::config::RouterConfig;
use crate::request::Request;

static TOKEN_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[a-z0-9']+").expect("TOKEN_PATTERN regex should compile"));

/// Split text into lowercase word tokens.
pub fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();
    TOKEN_PATTERN
        .find_iter(&lowered)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// A tag selected for a request and the score that selected it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutedTag {
    pub tag: CapabilityTag,
    pub score: f64,
}

struct CompiledTag {
    tag: CapabilityTag,
    terms: Vec<(Vec<String>, f64)>,
}

/// Vocabulary with its terms pre-tokenised, plus routing thresholds.
pub struct TagTable {
    tags: Vec<CompiledTag>,
    min_score: f64,
    max_tags: usize,
}

impl TagTable {
    pub fn new(vocabulary: &Vocabulary, min_score: f64, max_tags: usize) -> Self {
        let tags = vocabulary
            .specs()
            .iter()
            .map(|spec| CompiledTag {
                tag: spec.tag.clone(),
                terms: spec
                    .terms
                    .iter()
                    .map(|t| (tokenize(&t.term), t.weight))
                    .filter(|(tokens, _)| !tokens.is_empty())
                    .collect(),
            })
            .collect();
        Self {
            tags,
            min_score,
            max_tags: max_tags.max(1),
        }
    }

    pub fn from_config(config: &RouterConfig) -> Self {
        Self::new(&config.vocabulary, config.min_score, config.max_tags)
    }

    /// Raw score of every declared tag, in declaration order.
    pub fn scores(&self, tokens: &[String]) -> Vec<RoutedTag> {
        let token_count = tokens.len().max(1) as f64;
        self.tags
            .iter()
            .map(|compiled| {
                let matched: f64 = compiled
                    .terms
                    .iter()
                    .map(|(phrase, weight)| weight * occurrences(tokens, phrase) as f64)
                    .sum();
                RoutedTag {
                    tag: compiled.tag.clone(),
                    score: matched / token_count,
                }
            })
            .collect()
    }
}

fn occurrences(tokens: &[String], phrase: &[String]) -> usize {
    if phrase.len() > tokens.len() {
        return 0;
    }
    tokens
        .windows(phrase.len())
        .filter(|window| *window == phrase)
        .count()
}

/// Route a request to its ordered capability tags. Never returns an empty list.
pub fn route(request: &Request, table: &TagTable) -> Vec<RoutedTag> {
    let tokens = tokenize(request.content());

    // scores() yields declaration order, so a stable sort keeps priority on ties
    let mut routed: Vec<RoutedTag> = table
        .scores(&tokens)
        .into_iter()
        .filter(|r| r.score > 0.0 && r.score >= table.min_score)
        .collect();
    routed.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    routed.truncate(table.max_tags);

    if routed.is_empty() {
        routed.push(RoutedTag {
            tag: CapabilityTag::general(),
            score: 0.0,
        });
    }
    routed
}
