use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::services::difficulty::DifficultyConfig;
use crate::services::review::{SchedulerParams, MAX_INTERVAL_DAYS};
use crate::services::scoring::{LevelCurve, ScoringConfig};

const DEFAULT_SESSION_SIZE: usize = 10;
const DEFAULT_MAX_DUE_REVIEWS: usize = 5;
const DEFAULT_PASS_ACCURACY: f64 = 0.7;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    InvalidEnv { key: &'static str, value: String },

    #[error("invalid level curve: {0}")]
    InvalidLevelCurve(String),

    #[error("duplicate badge id {0}")]
    DuplicateBadge(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),

    #[error("malformed configuration: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SessionConfig {
    pub default_size: usize,
    /// Upper bound on due review cards placed at the front of a session.
    pub max_due_reviews: usize,
    /// Accuracy at or above which a completed session counts as a passed quiz.
    pub pass_accuracy: f64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            default_size: DEFAULT_SESSION_SIZE,
            max_due_reviews: DEFAULT_MAX_DUE_REVIEWS,
            pass_accuracy: DEFAULT_PASS_ACCURACY,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub scheduler: SchedulerParams,
    pub scoring: ScoringConfig,
    pub difficulty: DifficultyConfig,
    pub session: SessionConfig,
}

impl EngineConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Self::default();
        config.apply_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(ms) = env_value(&lookup, "ENGINE_FAST_ANSWER_MS")? {
            self.scheduler.fast_answer_ms = ms;
        }
        if let Some(exclude) = env_value(&lookup, "ENGINE_EXCLUDE_MASTERED")? {
            self.scheduler.exclude_mastered = exclude;
        }
        if let Some(ms) = env_value(&lookup, "ENGINE_SPEED_BONUS_MS")? {
            self.scoring.xp.speed_bonus_under_ms = ms;
        }
        if let Some(size) = env_value(&lookup, "ENGINE_SESSION_SIZE")? {
            self.session.default_size = size;
        }
        if let Some(max) = env_value(&lookup, "ENGINE_MAX_DUE_REVIEWS")? {
            self.session.max_due_reviews = max;
        }
        if let Some(accuracy) = env_value(&lookup, "ENGINE_PASS_ACCURACY")? {
            self.session.pass_accuracy = accuracy;
        }
        if let Some(step) = env_value(&lookup, "ENGINE_LEVEL_STEP")? {
            self.scoring.level_curve = LevelCurve::Triangular { step };
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.scheduler;
        if !(s.min_ease >= 1.3 && s.min_ease < s.max_ease) {
            return Err(ConfigError::Invalid(format!(
                "ease bounds must satisfy 1.3 <= min < max, got {}..{}",
                s.min_ease, s.max_ease
            )));
        }
        if !(s.min_ease..=s.max_ease).contains(&s.initial_ease) {
            return Err(ConfigError::Invalid(format!(
                "initial ease {} outside {}..={}",
                s.initial_ease, s.min_ease, s.max_ease
            )));
        }
        if !(6..=MAX_INTERVAL_DAYS).contains(&s.max_interval_days) {
            return Err(ConfigError::Invalid(format!(
                "max interval {} outside 6..={MAX_INTERVAL_DAYS} days",
                s.max_interval_days
            )));
        }
        self.scoring.level_curve.validate()?;
        if self.session.default_size == 0 {
            return Err(ConfigError::Invalid(
                "session size must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.session.pass_accuracy) {
            return Err(ConfigError::Invalid(format!(
                "pass accuracy {} outside 0..=1",
                self.session.pass_accuracy
            )));
        }
        Ok(())
    }
}

fn env_value<F, T>(lookup: &F, key: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(key) else {
        return Ok(None);
    };
    let parsed = raw.trim().parse::<T>();
    match parsed {
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(ConfigError::InvalidEnv { key, value: raw }),
    }
}

/// Process-level settings for the replay binary.
#[derive(Debug, Clone)]
pub struct Config {
    pub log_level: String,
    /// Set when `ENABLE_FILE_LOGS` is on; `LOG_DIR` or `./logs`.
    pub file_log_dir: Option<PathBuf>,
    pub engine: EngineConfig,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let log_level = lookup("RUST_LOG").unwrap_or_else(|| "info".to_string());
        let file_logs = lookup("ENABLE_FILE_LOGS")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let file_log_dir = file_logs.then(|| {
            PathBuf::from(lookup("LOG_DIR").unwrap_or_else(|| "./logs".to_string()))
        });

        let mut engine = EngineConfig::default();
        engine.apply_overrides(&lookup)?;
        engine.validate()?;
        Ok(Self {
            log_level,
            file_log_dir,
            engine,
        })
    }
}
