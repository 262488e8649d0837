//! Communication profiles and the (affect, band) lookup table.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::{Affect, IntensityBand};

/// Overall register of the response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommunicationMode {
    Empathetic,
    Energetic,
    Supportive,
    Professional,
    Casual,
    Encouraging,
    Analytical,
    Gentle,
}

impl CommunicationMode {
    pub const ALL: [CommunicationMode; 8] = [
        CommunicationMode::Empathetic,
        CommunicationMode::Energetic,
        CommunicationMode::Supportive,
        CommunicationMode::Professional,
        CommunicationMode::Casual,
        CommunicationMode::Encouraging,
        CommunicationMode::Analytical,
        CommunicationMode::Gentle,
    ];

    /// Line appended after the body, if the mode has one.
    pub fn closer(&self) -> Option<&'static str> {
        match self {
            Self::Empathetic => Some("I'm here if you want to talk it through."),
            Self::Supportive => Some("We'll work through this together."),
            Self::Energetic => Some("Let's make it happen!"),
            Self::Encouraging => Some("You've got this."),
            Self::Gentle => Some("Take it one step at a time."),
            Self::Professional | Self::Casual | Self::Analytical => None,
        }
    }
}

impl std::fmt::Display for CommunicationMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empathetic => write!(f, "empathetic"),
            Self::Energetic => write!(f, "energetic"),
            Self::Supportive => write!(f, "supportive"),
            Self::Professional => write!(f, "professional"),
            Self::Casual => write!(f, "casual"),
            Self::Encouraging => write!(f, "encouraging"),
            Self::Analytical => write!(f, "analytical"),
            Self::Gentle => write!(f, "gentle"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Verbosity {
    Concise,
    Normal,
    Detailed,
}

/// How the response text should be shaped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommunicationProfile {
    pub mode: CommunicationMode,
    pub empathy_level: f64,
    pub verbosity: Verbosity,
    pub tone_directives: Vec<String>,
    /// Prepended when `empathy_level` is above the opener threshold
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub opener: Option<String>,
}

impl CommunicationProfile {
    /// Neutral fallback used whenever nothing better is known.
    pub fn professional() -> Self {
        Self {
            mode: CommunicationMode::Professional,
            empathy_level: 0.3,
            verbosity: Verbosity::Normal,
            tone_directives: vec!["professional".to_string()],
            opener: None,
        }
    }
}

impl Default for CommunicationProfile {
    fn default() -> Self {
        Self::professional()
    }
}

/// Empathetic opener acknowledging `affect`.
pub fn opener(affect: Affect) -> &'static str {
    match affect {
        Affect::Happy => "I can sense your positive energy! That's wonderful to hear.",
        Affect::Sad => "I can tell this is difficult for you. I'm here to support you through this.",
        Affect::Angry => "I can sense your frustration. Let's work together to address what's bothering you.",
        Affect::Anxious => "I can feel your anxiety. Let's break this down into smaller, manageable pieces.",
        Affect::Excited => "Your excitement is infectious! I love your enthusiasm about this.",
        Affect::Frustrated => "I can tell this is frustrating for you. Let's find a different approach.",
        Affect::Calm => "I appreciate your calm and thoughtful approach to this.",
        Affect::Confused => "I can see this might be confusing. Let me break it down more clearly.",
        Affect::Focused => "I love your focused energy! Let's dive deep into this together.",
        Affect::Tired => "I can sense you might be tired. Let's keep things simple for now.",
    }
}

fn tone(affect: Affect, band: IntensityBand) -> &'static str {
    let high = band == IntensityBand::High;
    match affect {
        Affect::Happy if high => "cheerful",
        Affect::Happy => "positive",
        Affect::Sad if high => "gentle",
        Affect::Sad => "supportive",
        Affect::Angry if high => "calming",
        Affect::Angry => "understanding",
        Affect::Anxious => "reassuring",
        Affect::Excited if high => "enthusiastic",
        Affect::Excited => "engaged",
        Affect::Frustrated => "patient",
        Affect::Calm => "steady",
        Affect::Confused => "clarifying",
        Affect::Focused => "direct",
        Affect::Tired => "gentle",
    }
}

fn mode(affect: Affect, band: IntensityBand) -> CommunicationMode {
    use CommunicationMode::*;
    use IntensityBand::*;
    match (affect, band) {
        (Affect::Sad, High) => Empathetic,
        (Affect::Sad, _) => Supportive,
        (Affect::Angry, Low) => Professional,
        (Affect::Angry, _) => Supportive,
        (Affect::Anxious, _) => Supportive,
        (Affect::Excited, High) => Energetic,
        (Affect::Excited, _) | (Affect::Happy, _) => Casual,
        (Affect::Frustrated, _) => Encouraging,
        (Affect::Tired, Low) => Professional,
        (Affect::Tired, _) => Gentle,
        (Affect::Focused, _) | (Affect::Confused, _) => Analytical,
        (Affect::Calm, _) => Professional,
    }
}

/// Built-in profile for one table cell.
fn default_profile(affect: Affect, band: IntensityBand) -> CommunicationProfile {
    let mode = mode(affect, band);
    let empathy_level = (band.representative() * 1.5).min(1.0);
    let verbosity = match (affect, mode) {
        (Affect::Tired, _) => Verbosity::Concise,
        (_, CommunicationMode::Analytical) => Verbosity::Detailed,
        _ => Verbosity::Normal,
    };
    let mut tone_directives = vec![tone(affect, band).to_string()];
    if affect == Affect::Anxious {
        tone_directives.push("slow pacing".to_string());
    }
    CommunicationProfile {
        mode,
        empathy_level,
        verbosity,
        tone_directives,
        opener: Some(opener(affect).to_string()),
    }
}

/// Total map from (affect, intensity band) to a profile.
#[derive(Debug, Clone)]
pub struct ProfileTable {
    entries: BTreeMap<(Affect, IntensityBand), CommunicationProfile>,
    fallback: CommunicationProfile,
}

impl ProfileTable {
    /// A table with no entries: every lookup yields the fallback.
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            fallback: CommunicationProfile::professional(),
        }
    }

    pub fn with_entry(
        mut self,
        affect: Affect,
        band: IntensityBand,
        profile: CommunicationProfile,
    ) -> Self {
        self.entries.insert((affect, band), profile);
        self
    }

    pub fn lookup(&self, affect: Affect, band: IntensityBand) -> &CommunicationProfile {
        self.entries.get(&(affect, band)).unwrap_or(&self.fallback)
    }

    pub fn fallback(&self) -> &CommunicationProfile {
        &self.fallback
    }

    /// Every configured profile, including the fallback.
    pub fn profiles(&self) -> impl Iterator<Item = &CommunicationProfile> {
        self.entries.values().chain(std::iter::once(&self.fallback))
    }
}

impl Default for ProfileTable {
    fn default() -> Self {
        let mut table = Self::empty();
        for affect in Affect::ALL {
            for band in IntensityBand::ALL {
                table = table.with_entry(affect, band, default_profile(affect, band));
            }
        }
        table
    }
}
