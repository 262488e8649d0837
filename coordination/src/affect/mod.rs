//! Affect Adaptation Layer
//!
//! Tracks a short-window affect estimate per session and maps it to a
//! [`CommunicationProfile`] that shapes the response text. Nothing here can
//! fail the request path: a missing estimate reads as `calm` at zero
//! intensity and an unmapped cell falls back to the professional profile.
//!
//! ```text
//! Request ─▶ lexical(content) ─┐
//!         └▶ contextual(hints) ─┴▶ averaged estimate
//!                                      │ EMA (α) into session state
//!                                      ▼
//!                      AffectReading { primary, intensity, band, secondary }
//!                                      │ ProfileTable[(primary, band)]
//!                                      ▼
//!                      CommunicationProfile ─▶ ToneTransformer
//! ```

pub mod estimator;
pub mod profile;
pub mod tone;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::str::FromStr;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use tracing::debug;

pub use estimator::AffectScores;
pub use profile::{CommunicationMode, CommunicationProfile, ProfileTable, Verbosity};
pub use tone::ToneTransformer;

use crate::config::AffectConfig;
use crate::request::Request;

/// Blended score below which an affect is not considered present.
const PRESENCE_FLOOR: f64 = 0.05;
/// Blended score above which an affect is reported as secondary.
const SECONDARY_FLOOR: f64 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Affect {
    Happy,
    Sad,
    Angry,
    Anxious,
    Excited,
    Frustrated,
    Calm,
    Confused,
    Focused,
    Tired,
}

impl Affect {
    pub const ALL: [Affect; 10] = [
        Affect::Happy,
        Affect::Sad,
        Affect::Angry,
        Affect::Anxious,
        Affect::Excited,
        Affect::Frustrated,
        Affect::Calm,
        Affect::Confused,
        Affect::Focused,
        Affect::Tired,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Happy => "happy",
            Self::Sad => "sad",
            Self::Angry => "angry",
            Self::Anxious => "anxious",
            Self::Excited => "excited",
            Self::Frustrated => "frustrated",
            Self::Calm => "calm",
            Self::Confused => "confused",
            Self::Focused => "focused",
            Self::Tired => "tired",
        }
    }
}

impl std::fmt::Display for Affect {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Affect {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|a| a.as_str() == wanted)
            .ok_or_else(|| format!("unknown affect '{s}'"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntensityBand {
    Low,
    Medium,
    High,
}

impl IntensityBand {
    pub const ALL: [IntensityBand; 3] = [IntensityBand::Low, IntensityBand::Medium, IntensityBand::High];

    pub fn from_intensity(intensity: f64) -> Self {
        if intensity < 0.34 {
            Self::Low
        } else if intensity < 0.67 {
            Self::Medium
        } else {
            Self::High
        }
    }

    /// Typical intensity inside the band.
    pub fn representative(&self) -> f64 {
        match self {
            Self::Low => 0.2,
            Self::Medium => 0.5,
            Self::High => 0.85,
        }
    }
}

impl std::fmt::Display for IntensityBand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// Affect state of a session after the latest observation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectReading {
    pub session: String,
    pub primary: Affect,
    pub intensity: f64,
    pub band: IntensityBand,
    pub secondary: BTreeMap<Affect, f64>,
}

impl AffectReading {
    /// Reading used before anything was observed.
    pub fn neutral(session: impl Into<String>) -> Self {
        Self {
            session: session.into(),
            primary: Affect::Calm,
            intensity: 0.0,
            band: IntensityBand::Low,
            secondary: BTreeMap::new(),
        }
    }
}

/// Per-session blended scores and the recent primaries.
#[derive(Debug, Clone, Default)]
struct AffectState {
    blended: BTreeMap<Affect, f64>,
    window: VecDeque<Affect>,
    observations: u64,
    /// Tracker tick of the latest observation
    last_seen: u64,
}

/// Session states bounded by `capacity`, evicting the least recently seen.
#[derive(Debug, Default)]
struct Sessions {
    states: HashMap<String, AffectState>,
    tick: u64,
}

impl Sessions {
    fn touch(&mut self, session: &str, capacity: usize) -> &mut AffectState {
        self.tick += 1;
        if !self.states.contains_key(session) && self.states.len() >= capacity.max(1) {
            let stalest = self
                .states
                .iter()
                .min_by_key(|(_, state)| state.last_seen)
                .map(|(id, _)| id.clone());
            if let Some(stalest) = stalest {
                debug!(session = %stalest, "evicting stalest affect session");
                self.states.remove(&stalest);
            }
        }
        let state = self.states.entry(session.to_string()).or_default();
        state.last_seen = self.tick;
        state
    }
}

impl AffectState {
    fn observe(&mut self, estimate: &AffectScores, alpha: f64, window: usize) {
        if self.observations == 0 {
            self.blended = estimate.clone();
        } else {
            for affect in Affect::ALL {
                let sample = estimate.get(&affect).copied().unwrap_or(0.0);
                let previous = self.blended.get(&affect).copied().unwrap_or(0.0);
                self.blended.insert(affect, alpha * sample + (1.0 - alpha) * previous);
            }
        }
        self.observations += 1;

        let primary = self.primary().0;
        self.window.push_back(primary);
        while self.window.len() > window.max(1) {
            self.window.pop_front();
        }
    }

    /// Highest blended score, ties by declaration order.
    fn primary(&self) -> (Affect, f64) {
        Affect::ALL
            .iter()
            .map(|a| (*a, self.blended.get(a).copied().unwrap_or(0.0)))
            .fold((Affect::Calm, 0.0), |best, (affect, score)| {
                if score > best.1 {
                    (affect, score)
                } else {
                    best
                }
            })
    }

    fn reading(&self, session: &str) -> AffectReading {
        let (primary, score) = self.primary();
        if score < PRESENCE_FLOOR {
            return AffectReading::neutral(session);
        }
        let intensity = score.clamp(0.0, 1.0);
        AffectReading {
            session: session.to_string(),
            primary,
            intensity,
            band: IntensityBand::from_intensity(intensity),
            secondary: self
                .blended
                .iter()
                .filter(|(a, s)| **a != primary && **s > SECONDARY_FLOOR)
                .map(|(a, s)| (*a, *s))
                .collect(),
        }
    }
}

/// Session affect view for diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AffectInsights {
    pub reading: AffectReading,
    /// Primary affect counts over the rolling window
    pub distribution: BTreeMap<Affect, usize>,
    pub observations: u64,
    pub active_mode: CommunicationMode,
}

/// Owns every session's affect state and the profile table.
#[derive(Debug)]
pub struct AffectTracker {
    learning_rate: f64,
    window: usize,
    max_sessions: usize,
    table: ProfileTable,
    sessions: Mutex<Sessions>,
}

impl AffectTracker {
    pub fn new(config: &AffectConfig) -> Self {
        Self {
            learning_rate: config.learning_rate,
            window: config.window,
            max_sessions: config.max_sessions,
            table: ProfileTable::default(),
            sessions: Mutex::new(Sessions::default()),
        }
    }

    pub fn with_table(mut self, table: ProfileTable) -> Self {
        self.table = table;
        self
    }

    /// Blend the request's estimate into its session and read it back.
    pub fn observe(&self, request: &Request) -> AffectReading {
        let session = request.session();
        let estimate = estimator::estimate(request);

        let mut sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let state = sessions.touch(session, self.max_sessions);
        state.observe(&estimate, self.learning_rate, self.window);
        let reading = state.reading(session);

        debug!(
            session,
            primary = %reading.primary,
            intensity = reading.intensity,
            band = %reading.band,
            "affect observed"
        );
        reading
    }

    pub fn profile_for(&self, reading: &AffectReading) -> CommunicationProfile {
        self.table.lookup(reading.primary, reading.band).clone()
    }

    /// Sessions currently tracked.
    pub fn session_count(&self) -> usize {
        self.sessions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .states
            .len()
    }

    pub fn insights(&self, session: &str) -> AffectInsights {
        let sessions = self.sessions.lock().unwrap_or_else(|e| e.into_inner());
        let (reading, distribution, observations) = match sessions.states.get(session) {
            Some(state) => {
                let mut distribution = BTreeMap::new();
                for affect in &state.window {
                    *distribution.entry(*affect).or_insert(0) += 1;
                }
                (state.reading(session), distribution, state.observations)
            }
            None => (AffectReading::neutral(session), BTreeMap::new(), 0),
        };
        let active_mode = self.table.lookup(reading.primary, reading.band).mode;
        AffectInsights {
            reading,
            distribution,
            observations,
            active_mode,
        }
    }
}
