use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::types::LearnerProgressState;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BadgeCategory {
    Progress,
    Achievement,
    Streak,
    Special,
}

impl BadgeCategory {
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PROGRESS" => Some(Self::Progress),
            "ACHIEVEMENT" => Some(Self::Achievement),
            "STREAK" => Some(Self::Streak),
            "SPECIAL" => Some(Self::Special),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "count", rename_all = "snake_case")]
pub enum BadgeRequirement {
    ChaptersCompleted(u64),
    QuizzesPassed(u64),
    StreakDays(u64),
    TotalXp(u64),
    Certificates(u64),
    ReviewCards(u64),
}

impl BadgeRequirement {
    pub fn target(&self) -> u64 {
        match *self {
            Self::ChaptersCompleted(n)
            | Self::QuizzesPassed(n)
            | Self::StreakDays(n)
            | Self::TotalXp(n)
            | Self::Certificates(n)
            | Self::ReviewCards(n) => n,
        }
    }

    pub fn current_value(&self, state: &LearnerProgressState) -> u64 {
        match self {
            Self::ChaptersCompleted(_) => state.counters.chapters_completed,
            Self::QuizzesPassed(_) => state.counters.quizzes_passed,
            Self::StreakDays(_) => state.current_streak_days as u64,
            Self::TotalXp(_) => state.total_xp,
            Self::Certificates(_) => state.counters.certificates_earned,
            Self::ReviewCards(_) => state.counters.review_cards,
        }
    }

    pub fn is_met(&self, state: &LearnerProgressState) -> bool {
        self.current_value(state) >= self.target()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeDefinition {
    pub id: String,
    pub name: String,
    pub category: BadgeCategory,
    pub requirement: BadgeRequirement,
    pub xp_reward: u64,
}

impl BadgeDefinition {
    pub fn new(
        id: &str,
        name: &str,
        category: BadgeCategory,
        requirement: BadgeRequirement,
        xp_reward: u64,
    ) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            category,
            requirement,
            xp_reward,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BadgeProgress {
    pub badge_id: String,
    pub current_value: u64,
    pub target_value: u64,
    pub percentage: f64,
    pub unlocked: bool,
}

/// Read-only badge catalog, held in evaluation order: category, then
/// ascending requirement count, then id.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BadgeCatalog {
    badges: Vec<BadgeDefinition>,
}

impl BadgeCatalog {
    pub fn new(mut badges: Vec<BadgeDefinition>) -> Result<Self, ConfigError> {
        let mut seen = HashSet::new();
        for badge in &badges {
            if !seen.insert(badge.id.as_str()) {
                return Err(ConfigError::DuplicateBadge(badge.id.clone()));
            }
        }
        badges.sort_by(|a, b| {
            a.category
                .cmp(&b.category)
                .then_with(|| a.requirement.target().cmp(&b.requirement.target()))
                .then_with(|| a.id.cmp(&b.id))
        });
        Ok(Self { badges })
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn iter(&self) -> impl Iterator<Item = &BadgeDefinition> {
        self.badges.iter()
    }

    pub fn len(&self) -> usize {
        self.badges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.badges.is_empty()
    }

    pub fn get(&self, badge_id: &str) -> Option<&BadgeDefinition> {
        self.badges.iter().find(|badge| badge.id == badge_id)
    }

    /// First badge, in evaluation order, that is locked and whose
    /// requirement holds for `state`.
    pub fn next_unlockable(&self, state: &LearnerProgressState) -> Option<&BadgeDefinition> {
        self.badges
            .iter()
            .find(|badge| !state.has_badge(&badge.id) && badge.requirement.is_met(state))
    }

    pub fn progress(&self, badge: &BadgeDefinition, state: &LearnerProgressState) -> BadgeProgress {
        let unlocked = state.has_badge(&badge.id);
        let current_value = badge.requirement.current_value(state);
        let target_value = badge.requirement.target();
        let percentage = if unlocked || target_value == 0 {
            100.0
        } else {
            (current_value as f64 / target_value as f64 * 100.0).min(100.0)
        };
        BadgeProgress {
            badge_id: badge.id.clone(),
            current_value,
            target_value,
            percentage,
            unlocked,
        }
    }

    pub fn progress_for(&self, state: &LearnerProgressState) -> Vec<BadgeProgress> {
        self.badges
            .iter()
            .map(|badge| self.progress(badge, state))
            .collect()
    }

    pub fn standard() -> Self {
        use BadgeCategory::*;
        use BadgeRequirement::*;

        let badges = vec![
            BadgeDefinition::new("first_chapter", "First Steps", Progress, ChaptersCompleted(1), 10),
            BadgeDefinition::new("chapter_explorer", "Explorer", Progress, ChaptersCompleted(5), 50),
            BadgeDefinition::new("chapter_master", "Chapter Master", Progress, ChaptersCompleted(20), 150),
            BadgeDefinition::new("rising_star", "Rising Star", Progress, TotalXp(500), 25),
            BadgeDefinition::new("scholar", "Scholar", Progress, TotalXp(2000), 100),
            BadgeDefinition::new("first_quiz", "Quiz Taker", Achievement, QuizzesPassed(1), 20),
            BadgeDefinition::new("quiz_champion", "Quiz Champion", Achievement, QuizzesPassed(10), 100),
            BadgeDefinition::new("first_certificate", "Certified", Achievement, Certificates(1), 100),
            BadgeDefinition::new("streak_3", "On a Roll", Streak, StreakDays(3), 15),
            BadgeDefinition::new("streak_7", "Week Warrior", Streak, StreakDays(7), 50),
            BadgeDefinition::new("streak_30", "Unstoppable", Streak, StreakDays(30), 200),
            BadgeDefinition::new("review_starter", "Memory Builder", Special, ReviewCards(10), 20),
            BadgeDefinition::new("memory_keeper", "Memory Keeper", Special, ReviewCards(100), 100),
        ];
        Self::new(badges).unwrap_or_default()
    }
}
