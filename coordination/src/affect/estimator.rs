//! Per-request affect estimate from lexical cues and context hints.

use std::collections::BTreeMap;

use super::Affect;
use crate::request::Request;
use crate::router::tokenize;

/// Multiplier for excitable affects when the text is emphatic.
const EMPHASIS_BOOST: f64 = 1.5;
/// Share of uppercase characters that counts as shouting.
const CAPS_RATIO: f64 = 0.3;

/// Affect scores in [0, 1]; absent affects scored nothing.
pub type AffectScores = BTreeMap<Affect, f64>;

fn keywords(affect: Affect) -> &'static [&'static str] {
    match affect {
        Affect::Happy => &["happy", "great", "awesome", "wonderful", "excited", "love", "amazing"],
        Affect::Sad => &["sad", "depressed", "down", "terrible", "awful", "disappointed"],
        Affect::Angry => &["angry", "mad", "furious", "annoyed", "irritated", "hate"],
        Affect::Anxious => &["anxious", "worried", "nervous", "stressed", "concerned", "scared"],
        Affect::Excited => &["excited", "thrilled", "can't wait", "pumped", "stoked"],
        Affect::Frustrated => &["frustrated", "stuck", "difficult", "problem", "issue", "can't"],
        Affect::Calm => &["calm", "relaxed", "peaceful", "fine"],
        Affect::Confused => &["confused", "don't understand", "unclear", "complicated", "lost"],
        Affect::Focused => &["focus", "concentrate", "important", "priority", "urgent"],
        Affect::Tired => &["tired", "exhausted", "drained", "weary", "sleepy"],
    }
}

/// `min(2 × keyword matches / word count, 1)` per affect, boosted for
/// exclamation marks or shouting.
pub fn lexical(text: &str) -> AffectScores {
    let tokens = tokenize(text);
    let mut scores = AffectScores::new();
    if tokens.is_empty() {
        return scores;
    }
    let padded = format!(" {} ", tokens.join(" "));

    for affect in Affect::ALL {
        let matches = keywords(affect)
            .iter()
            .filter(|k| padded.contains(&format!(" {k} ")))
            .count();
        if matches > 0 {
            let score = (2.0 * matches as f64 / tokens.len() as f64).min(1.0);
            scores.insert(affect, score);
        }
    }

    let letters = text.chars().filter(|c| c.is_alphabetic()).count();
    let caps = text.chars().filter(|c| c.is_uppercase()).count();
    let shouting = letters > 0 && caps as f64 / letters as f64 > CAPS_RATIO;
    if text.contains('!') || shouting {
        for affect in [Affect::Excited, Affect::Angry, Affect::Happy] {
            if let Some(score) = scores.get_mut(&affect) {
                *score = (*score * EMPHASIS_BOOST).min(1.0);
            }
        }
    }
    scores
}

/// Scores implied by the request's context hints.
pub fn contextual(request: &Request) -> AffectScores {
    let mut scores = AffectScores::new();
    if request.task_complexity() == Some("high") {
        scores.insert(Affect::Focused, 0.4);
        scores.insert(Affect::Anxious, 0.2);
    }
    if let Some(errors) = request.recent_errors().filter(|n| *n > 2) {
        scores.insert(Affect::Frustrated, (errors as f64 / 5.0).min(0.8));
    }
    if let Some(affect) = request.mood().and_then(|m| m.parse::<Affect>().ok()) {
        scores.insert(affect, 0.6);
    }
    scores
}

/// Average each affect over the sources that scored it.
pub fn combine(sources: &[AffectScores]) -> AffectScores {
    let mut sums: BTreeMap<Affect, (f64, usize)> = BTreeMap::new();
    for source in sources {
        for (affect, score) in source {
            let entry = sums.entry(*affect).or_insert((0.0, 0));
            entry.0 += score;
            entry.1 += 1;
        }
    }
    sums.into_iter()
        .map(|(affect, (sum, n))| (affect, sum / n as f64))
        .collect()
}

/// Full estimate for one request.
pub fn estimate(request: &Request) -> AffectScores {
    combine(&[lexical(request.content()), contextual(request)])
}
