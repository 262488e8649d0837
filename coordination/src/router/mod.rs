//! Capability Router
//!
//! Pure mapping from a request to the ordered capability tags that should
//! handle it, plus detection of requests that need a swarm decision.
//!
//! # Scoring
//!
//! ```text
//! content ──lowercase──▶ tokens [a-z0-9']+
//!                          │
//!   for each tag:  Σ weight(term) × occurrences(term) / token_count
//!                          │
//!   keep score ≥ min_score ─▶ sort (score desc, vocabulary order) ─▶ top max_tags
//!                          │
//!   nothing kept ─────────▶ [(general, 0.0)]
//! ```

pub mod decision;
pub mod scoring;

pub use decision::DecisionDetector;
pub use scoring::{route, tokenize, RoutedTag, TagTable};
