//! Orchestrator configuration
//!
//! Layered the same way for every deployment:
//!
//! ```text
//! OrchestratorConfig::default()
//!   └─ TOML file (optional)          OrchestratorConfig::load(path)
//!        └─ SWITCHBOARD_* env vars   OrchestratorConfig::apply_env()
//!             └─ validate()
//! ```
//!
//! Every section is `#[serde(default)]`, so a config file only needs to name
//! the values it changes.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::capability::{CapabilityTag, Vocabulary};

/// Errors raised while loading or validating configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid environment override {var}={value}")]
    Env { var: String, value: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Top-level orchestrator configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub router: RouterConfig,
    pub dispatch: DispatchConfig,
    pub swarm: SwarmConfig,
    pub affect: AffectConfig,
    pub feedback: FeedbackConfig,
    pub limits: LimitsConfig,
}

impl OrchestratorConfig {
    /// Parse a TOML config file. Missing keys keep their defaults.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults with environment overrides applied.
    pub fn from_env() -> ConfigResult<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Full resolution chain: defaults, optional file, env, validation.
    pub fn resolve(path: Option<&Path>) -> ConfigResult<Self> {
        let mut config = match path {
            Some(path) => Self::load(path)?,
            None => Self::default(),
        };
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Apply `SWITCHBOARD_*` overrides on top of the current values.
    pub fn apply_env(&mut self) -> ConfigResult<()> {
        env_override(
            "SWITCHBOARD_GLOBAL_DEADLINE_MS",
            &mut self.dispatch.global_deadline_ms,
        )?;
        env_override(
            "SWITCHBOARD_TASK_TIMEOUT_MS",
            &mut self.dispatch.default_task_timeout_ms,
        )?;
        env_override(
            "SWITCHBOARD_MAX_CONCURRENCY",
            &mut self.dispatch.max_concurrency,
        )?;
        env_override("SWITCHBOARD_MAX_ROUNDS", &mut self.swarm.max_rounds)?;
        env_override(
            "SWITCHBOARD_MAJORITY_THRESHOLD",
            &mut self.swarm.majority_threshold,
        )?;
        env_override(
            "SWITCHBOARD_ROUND_TIMEOUT_MS",
            &mut self.swarm.round_timeout_ms,
        )?;
        env_override("SWITCHBOARD_FEEDBACK_ALPHA", &mut self.feedback.learning_rate)?;
        env_override("SWITCHBOARD_AFFECT_ALPHA", &mut self.affect.learning_rate)?;
        Ok(())
    }

    /// Reject values the pipeline cannot run with.
    pub fn validate(&self) -> ConfigResult<()> {
        unit_interval("swarm.majority_threshold", self.swarm.majority_threshold)?;
        unit_interval("swarm.retention_threshold", self.swarm.retention_threshold)?;
        unit_interval("swarm.abstain_decay", self.swarm.abstain_decay)?;
        unit_interval("swarm.convergence_epsilon", self.swarm.convergence_epsilon)?;
        learning_rate("affect.learning_rate", self.affect.learning_rate)?;
        learning_rate("feedback.learning_rate", self.feedback.learning_rate)?;

        if !self.router.min_score.is_finite() || self.router.min_score < 0.0 {
            return Err(ConfigError::Invalid(format!(
                "router.min_score must be non-negative, got {}",
                self.router.min_score
            )));
        }
        if self.feedback.latency_reference_ms <= 0.0 {
            return Err(ConfigError::Invalid(
                "feedback.latency_reference_ms must be positive".into(),
            ));
        }

        for (name, value) in [
            ("router.max_tags", self.router.max_tags as u64),
            ("dispatch.max_concurrency", self.dispatch.max_concurrency as u64),
            ("dispatch.global_deadline_ms", self.dispatch.global_deadline_ms),
            (
                "dispatch.default_task_timeout_ms",
                self.dispatch.default_task_timeout_ms,
            ),
            ("swarm.max_rounds", self.swarm.max_rounds as u64),
            ("swarm.round_timeout_ms", self.swarm.round_timeout_ms),
            ("swarm.history_capacity", self.swarm.history_capacity as u64),
            ("affect.window", self.affect.window as u64),
            ("affect.max_sessions", self.affect.max_sessions as u64),
            ("feedback.publish_batch", self.feedback.publish_batch as u64),
            ("feedback.queue_capacity", self.feedback.queue_capacity as u64),
            ("limits.max_content_chars", self.limits.max_content_chars as u64),
        ] {
            if value == 0 {
                return Err(ConfigError::Invalid(format!("{name} must be greater than zero")));
            }
        }

        self.router
            .vocabulary
            .validate()
            .map_err(ConfigError::Invalid)
    }
}

fn env_override<T: FromStr>(var: &str, slot: &mut T) -> ConfigResult<()> {
    if let Ok(raw) = std::env::var(var) {
        *slot = raw.trim().parse().map_err(|_| ConfigError::Env {
            var: var.to_string(),
            value: raw.clone(),
        })?;
        debug!(var, value = %raw, "applied environment override");
    }
    Ok(())
}

fn unit_interval(name: &str, value: f64) -> ConfigResult<()> {
    if (0.0..=1.0).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be within [0, 1], got {value}"
        )))
    }
}

fn learning_rate(name: &str, value: f64) -> ConfigResult<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::Invalid(format!(
            "{name} must be within (0, 1], got {value}"
        )))
    }
}

/// Capability routing parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouterConfig {
    /// Minimum normalised score a tag needs to be routed
    pub min_score: f64,
    /// Upper bound on tags routed for one request
    pub max_tags: usize,
    /// Substrings that mark a request as needing a swarm decision
    pub decision_patterns: Vec<String>,
    /// Ordered tag vocabulary; order doubles as tie-break priority
    pub vocabulary: Vocabulary,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            min_score: 0.05,
            max_tags: 4,
            decision_patterns: [
                "should i",
                "should we",
                "which approach",
                "best approach",
                "what do you think",
                "recommendation",
                "recommend",
                "choose between",
                "pros and cons",
                "advice",
                "decide",
                "decision",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            vocabulary: Vocabulary::default(),
        }
    }
}

/// Task dispatch limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub default_task_timeout_ms: u64,
    /// Per-capability timeout overrides, keyed by tag
    pub capability_timeouts: BTreeMap<String, u64>,
    /// Wall-clock budget for one request, dispatch and swarm included
    pub global_deadline_ms: u64,
    /// Global cap on concurrently running tasks per request
    pub max_concurrency: usize,
}

impl DispatchConfig {
    pub fn task_timeout(&self, tag: &CapabilityTag) -> Duration {
        let ms = self
            .capability_timeouts
            .get(tag.as_str())
            .copied()
            .unwrap_or(self.default_task_timeout_ms);
        Duration::from_millis(ms)
    }

    pub fn global_deadline(&self) -> Duration {
        Duration::from_millis(self.global_deadline_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            default_task_timeout_ms: 30_000,
            capability_timeouts: BTreeMap::new(),
            global_deadline_ms: 45_000,
            max_concurrency: 8,
        }
    }
}

/// Swarm consensus parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwarmConfig {
    /// Largest-cluster share at which debate is skipped
    pub majority_threshold: f64,
    pub max_rounds: u32,
    /// Minimum change in majority share for the debate to keep going
    pub convergence_epsilon: f64,
    /// Share a losing stance needs to be reported as a minority opinion
    pub retention_threshold: f64,
    pub round_timeout_ms: u64,
    /// Confidence multiplier applied to an abstaining evaluator
    pub abstain_decay: f64,
    pub history_capacity: usize,
}

impl SwarmConfig {
    pub fn round_timeout(&self) -> Duration {
        Duration::from_millis(self.round_timeout_ms)
    }
}

impl Default for SwarmConfig {
    fn default() -> Self {
        Self {
            majority_threshold: 0.8,
            max_rounds: 3,
            convergence_epsilon: 0.05,
            retention_threshold: 0.15,
            round_timeout_ms: 10_000,
            abstain_decay: 0.5,
            history_capacity: 50,
        }
    }
}

/// Affect tracking parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AffectConfig {
    pub learning_rate: f64,
    /// Observations kept per session
    pub window: usize,
    /// Sessions tracked at once; the least recently seen is evicted
    pub max_sessions: usize,
}

impl Default for AffectConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.3,
            window: 20,
            max_sessions: 10_000,
        }
    }
}

/// Feedback loop parameters.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackConfig {
    /// EMA learning rate (alpha)
    pub learning_rate: f64,
    /// Publish a snapshot after this many applied events
    pub publish_batch: usize,
    /// Publish a dirty snapshot at least this often
    pub publish_interval_ms: u64,
    /// Latency at which the weight is halved
    pub latency_reference_ms: f64,
    pub queue_capacity: usize,
}

impl FeedbackConfig {
    pub fn publish_interval(&self) -> Duration {
        Duration::from_millis(self.publish_interval_ms.max(1))
    }
}

impl Default for FeedbackConfig {
    fn default() -> Self {
        Self {
            learning_rate: 0.2,
            publish_batch: 16,
            publish_interval_ms: 1_000,
            latency_reference_ms: 1_000.0,
            queue_capacity: 1_024,
        }
    }
}

/// Request admission limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub max_content_chars: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_content_chars: 8_000,
        }
    }
}
