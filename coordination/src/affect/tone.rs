//! Profile-driven text transform.
//!
//! ```text
//! text ─▶ strip this profile's opener / closer (repeat until stable)
//!      ─▶ body: word-boundary substitutions for the mode
//!      ─▶ body: energetic emphasis (trailing '.' → '!', only if no '!')
//!      ─▶ [opener "\n\n"] body ["\n\n" closer]
//! ```
//!
//! Only the decorations the profile itself attaches are stripped, so handler
//! text that happens to match another profile's closer is left alone.
//!
//! Every stage is a fixed point on its own output: stripped decorations are
//! re-added identically, no replacement contains a word it replaces, and
//! emphasis only fires on text without an exclamation mark. So applying the
//! transform twice equals applying it once.

use std::sync::LazyLock;

use regex::{Captures, Regex};

use super::profile::{CommunicationMode, CommunicationProfile};

/// Empathy above which the opener is attached.
pub const OPENER_THRESHOLD: f64 = 0.7;

const SEPARATOR: &str = "\n\n";

/// (mode, source word, replacement)
const SUBSTITUTIONS: &[(CommunicationMode, &str, &str)] = &[
    (CommunicationMode::Empathetic, "must", "may want to"),
    (CommunicationMode::Empathetic, "wrong", "off"),
    (CommunicationMode::Supportive, "must", "could"),
    (CommunicationMode::Supportive, "failed", "did not work out"),
    (CommunicationMode::Gentle, "immediately", "when you are ready"),
    (CommunicationMode::Gentle, "must", "can"),
    (CommunicationMode::Encouraging, "problem", "challenge"),
    (CommunicationMode::Encouraging, "failure", "setback"),
    (CommunicationMode::Energetic, "good", "great"),
    (CommunicationMode::Energetic, "nice", "awesome"),
    (CommunicationMode::Casual, "however", "but"),
    (CommunicationMode::Casual, "therefore", "so"),
    (CommunicationMode::Casual, "utilize", "use"),
    (CommunicationMode::Professional, "gonna", "going to"),
    (CommunicationMode::Professional, "wanna", "want to"),
    (CommunicationMode::Analytical, "stuff", "details"),
    (CommunicationMode::Analytical, "things", "factors"),
];

static COMPILED: LazyLock<Vec<(CommunicationMode, Regex, &'static str)>> = LazyLock::new(|| {
    SUBSTITUTIONS
        .iter()
        .map(|(mode, word, replacement)| {
            let pattern = format!(r"(?i)\b{}\b", regex::escape(word));
            (
                *mode,
                Regex::new(&pattern).expect("substitution pattern should compile"),
                *replacement,
            )
        })
        .collect()
});

/// Keep the capitalisation of the matched word's first letter.
fn match_case(matched: &str, replacement: &str) -> String {
    match (matched.chars().next(), replacement.chars().next()) {
        (Some(m), Some(r)) if m.is_uppercase() => {
            r.to_uppercase().chain(replacement.chars().skip(1)).collect()
        }
        _ => replacement.to_string(),
    }
}

/// Applies a [`CommunicationProfile`] to response text.
#[derive(Debug, Clone, Copy)]
pub struct ToneTransformer;

impl ToneTransformer {
    pub fn new() -> Self {
        Self
    }

    pub fn apply(&self, text: &str, profile: &CommunicationProfile) -> String {
        let opener = attached_opener(profile);
        let closer = profile.mode.closer();

        let body = strip(text, opener, closer);
        let body = substitute(&body, profile.mode);
        let body = emphasise(&body, profile.mode);

        let mut parts: Vec<&str> = Vec::with_capacity(3);
        if let Some(opener) = opener {
            parts.push(opener);
        }
        if !body.is_empty() {
            parts.push(&body);
        }
        if let Some(closer) = closer {
            parts.push(closer);
        }
        parts.join(SEPARATOR)
    }
}

fn attached_opener(profile: &CommunicationProfile) -> Option<&str> {
    if profile.empathy_level > OPENER_THRESHOLD {
        profile.opener.as_deref().filter(|o| !o.is_empty())
    } else {
        None
    }
}

/// Remove leading `opener` and trailing `closer` paragraphs.
fn strip(text: &str, opener: Option<&str>, closer: Option<&str>) -> String {
    let mut current = text.trim().to_string();
    loop {
        let before = current.len();
        if let Some(opener) = opener {
            if current == opener {
                current.clear();
            } else if let Some(rest) = current
                .strip_prefix(opener)
                .and_then(|r| r.strip_prefix(SEPARATOR))
            {
                current = rest.trim().to_string();
            }
        }
        if let Some(closer) = closer {
            if current == closer {
                current.clear();
            } else if let Some(rest) = current
                .strip_suffix(closer)
                .and_then(|r| r.strip_suffix(SEPARATOR))
            {
                current = rest.trim().to_string();
            }
        }
        if current.len() == before {
            return current;
        }
    }
}

impl Default for ToneTransformer {
    fn default() -> Self {
        Self::new()
    }
}

fn substitute(body: &str, mode: CommunicationMode) -> String {
    let mut out = body.to_string();
    for (_, pattern, replacement) in COMPILED.iter().filter(|(m, _, _)| *m == mode) {
        out = pattern
            .replace_all(&out, |caps: &Captures<'_>| match_case(&caps[0], replacement))
            .into_owned();
    }
    out
}

fn emphasise(body: &str, mode: CommunicationMode) -> String {
    if mode != CommunicationMode::Energetic || body.contains('!') {
        return body.to_string();
    }
    match body.strip_suffix('.') {
        Some(rest) => format!("{rest}!"),
        None => body.to_string(),
    }
}
