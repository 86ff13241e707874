use std::collections::BTreeSet;

use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyTier {
    #[default]
    Easy,
    Medium,
    Hard,
}

impl DifficultyTier {
    pub const ALL: [DifficultyTier; 3] = [Self::Easy, Self::Medium, Self::Hard];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }

    pub fn harder(&self) -> Self {
        match self {
            Self::Easy => Self::Medium,
            _ => Self::Hard,
        }
    }

    pub fn easier(&self) -> Self {
        match self {
            Self::Hard => Self::Medium,
            _ => Self::Easy,
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "easy" => Some(Self::Easy),
            "medium" | "mid" => Some(Self::Medium),
            "hard" => Some(Self::Hard),
            _ => None,
        }
    }

    fn rank(&self) -> u8 {
        match self {
            Self::Easy => 0,
            Self::Medium => 1,
            Self::Hard => 2,
        }
    }

    /// Number of steps between two tiers (0, 1 or 2).
    pub fn distance(&self, other: DifficultyTier) -> u8 {
        self.rank().abs_diff(other.rank())
    }
}

impl std::fmt::Display for DifficultyTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One answered question. Built by the session, read by every engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptRecord {
    pub question_id: String,
    pub topic_id: String,
    pub correct: bool,
    pub response_time_ms: u64,
    pub difficulty_tier: DifficultyTier,
    pub timestamp: DateTime<Utc>,
}

/// Counters fed by events outside quiz scoring. They only exist so badge
/// requirements have something to compare against.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProgressCounters {
    pub chapters_completed: u64,
    pub quizzes_passed: u64,
    pub certificates_earned: u64,
    pub review_cards: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LearnerProgressState {
    pub learner_id: String,
    pub total_xp: u64,
    /// Derived from `total_xp`; recomputed by the scoring engine on every change.
    pub level: u32,
    pub current_streak_days: u32,
    pub longest_streak_days: u32,
    pub last_activity_date: Option<NaiveDate>,
    pub unlocked_badge_ids: BTreeSet<String>,
    #[serde(default)]
    pub counters: ProgressCounters,
    /// Offset of the learner's local time from UTC.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl LearnerProgressState {
    pub fn new(learner_id: impl Into<String>) -> Self {
        Self {
            learner_id: learner_id.into(),
            total_xp: 0,
            level: 1,
            current_streak_days: 0,
            longest_streak_days: 0,
            last_activity_date: None,
            unlocked_badge_ids: BTreeSet::new(),
            counters: ProgressCounters::default(),
            utc_offset_minutes: 0,
        }
    }

    pub fn with_utc_offset(mut self, minutes: i32) -> Self {
        self.utc_offset_minutes = minutes;
        self
    }

    /// The learner's calendar date at `at`. Offsets outside ±24h fall back to UTC.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        FixedOffset::east_opt(self.utc_offset_minutes.saturating_mul(60))
            .map(|offset| at.with_timezone(&offset).date_naive())
            .unwrap_or_else(|| at.date_naive())
    }

    pub fn has_badge(&self, badge_id: &str) -> bool {
        self.unlocked_badge_ids.contains(badge_id)
    }
}
