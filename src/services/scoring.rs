use std::sync::Arc;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::services::badge::{BadgeCatalog, BadgeDefinition};
use crate::types::{AttemptRecord, DifficultyTier, LearnerProgressState};

const EASY_XP: u64 = 10;
const MEDIUM_XP: u64 = 15;
const HARD_XP: u64 = 20;
const SPEED_BONUS_XP: u64 = 5;
const SPEED_BONUS_UNDER_MS: u64 = 15_000;
const LEVEL_STEP_XP: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreakBonus {
    pub streak: u32,
    pub xp: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct XpTable {
    pub easy: u64,
    pub medium: u64,
    pub hard: u64,
    pub speed_bonus: u64,
    pub speed_bonus_under_ms: u64,
    /// Paid once, on the attempt whose streak equals `streak` exactly.
    pub streak_bonuses: Vec<StreakBonus>,
}

impl Default for XpTable {
    fn default() -> Self {
        Self {
            easy: EASY_XP,
            medium: MEDIUM_XP,
            hard: HARD_XP,
            speed_bonus: SPEED_BONUS_XP,
            speed_bonus_under_ms: SPEED_BONUS_UNDER_MS,
            streak_bonuses: vec![
                StreakBonus { streak: 3, xp: 10 },
                StreakBonus { streak: 5, xp: 20 },
                StreakBonus { streak: 10, xp: 50 },
            ],
        }
    }
}

impl XpTable {
    pub fn base_for(&self, tier: DifficultyTier) -> u64 {
        match tier {
            DifficultyTier::Easy => self.easy,
            DifficultyTier::Medium => self.medium,
            DifficultyTier::Hard => self.hard,
        }
    }

    pub fn streak_bonus(&self, streak: u32) -> u64 {
        self.streak_bonuses
            .iter()
            .filter(|bonus| bonus.streak == streak)
            .map(|bonus| bonus.xp)
            .sum()
    }

    pub fn for_attempt(&self, attempt: &AttemptRecord, in_session_streak: u32) -> XpBreakdown {
        if !attempt.correct {
            return XpBreakdown::default();
        }
        let base = self.base_for(attempt.difficulty_tier);
        let speed = if attempt.response_time_ms < self.speed_bonus_under_ms {
            self.speed_bonus
        } else {
            0
        };
        let streak = self.streak_bonus(in_session_streak);
        XpBreakdown {
            base,
            speed,
            streak,
            total: base.saturating_add(speed).saturating_add(streak),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct XpBreakdown {
    pub base: u64,
    pub speed: u64,
    pub streak: u64,
    pub total: u64,
}

/// Cumulative XP needed to reach each level. `threshold(1)` is always 0 and
/// the curve is strictly increasing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum LevelCurve {
    /// `step * (L - 1) * L / 2`: 0, 100, 300, 600, ... for a step of 100.
    Triangular { step: u64 },
    /// Explicit thresholds for levels 1..=n, continued past the end by the
    /// last step.
    Table { thresholds: Vec<u64> },
}

impl Default for LevelCurve {
    fn default() -> Self {
        Self::Triangular {
            step: LEVEL_STEP_XP,
        }
    }
}

impl LevelCurve {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self {
            Self::Triangular { step } if *step == 0 => Err(ConfigError::InvalidLevelCurve(
                "triangular step must be positive".to_string(),
            )),
            Self::Triangular { .. } => Ok(()),
            Self::Table { thresholds } => {
                if thresholds.len() < 2 {
                    return Err(ConfigError::InvalidLevelCurve(
                        "table needs at least two thresholds".to_string(),
                    ));
                }
                if thresholds[0] != 0 {
                    return Err(ConfigError::InvalidLevelCurve(
                        "level 1 threshold must be 0".to_string(),
                    ));
                }
                if thresholds.windows(2).any(|w| w[1] <= w[0]) {
                    return Err(ConfigError::InvalidLevelCurve(
                        "thresholds must be strictly increasing".to_string(),
                    ));
                }
                Ok(())
            }
        }
    }

    pub fn threshold(&self, level: u32) -> u64 {
        if level <= 1 {
            return 0;
        }
        match self {
            Self::Triangular { step } => {
                let l = level as u128;
                let xp = (*step as u128) * (l - 1) * l / 2;
                u64::try_from(xp).unwrap_or(u64::MAX)
            }
            Self::Table { thresholds } => {
                let idx = (level - 1) as usize;
                if let Some(xp) = thresholds.get(idx) {
                    return *xp;
                }
                let n = thresholds.len();
                let last = thresholds.last().copied().unwrap_or(0);
                let prev = n
                    .checked_sub(2)
                    .and_then(|i| thresholds.get(i))
                    .copied()
                    .unwrap_or(0);
                let step = last.saturating_sub(prev).max(1);
                let extra = (idx + 1 - n) as u64;
                last.saturating_add(step.saturating_mul(extra))
            }
        }
    }

    /// Largest level whose threshold does not exceed `total_xp`. Saturates
    /// at `u32::MAX`.
    pub fn level_for(&self, total_xp: u64) -> u32 {
        let mut hi = 2u32;
        while hi < u32::MAX && self.threshold(hi) <= total_xp {
            hi = hi.saturating_mul(2);
        }
        let mut lo = 1u32;
        while lo < hi {
            let mid = lo + (hi - lo + 1) / 2;
            if self.threshold(mid) <= total_xp {
                lo = mid;
            } else {
                hi = mid - 1;
            }
        }
        lo
    }

    pub fn progress(&self, total_xp: u64) -> LevelProgress {
        let level = self.level_for(total_xp);
        let floor = self.threshold(level);
        let next = self.threshold(level.saturating_add(1));
        let span = next.saturating_sub(floor);
        let into = total_xp.saturating_sub(floor);
        let fraction = if span == 0 {
            1.0
        } else {
            (into as f64 / span as f64).clamp(0.0, 1.0)
        };
        LevelProgress {
            level,
            xp_into_level: into,
            xp_for_level: span,
            next_level_at: next,
            fraction,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelProgress {
    pub level: u32,
    pub xp_into_level: u64,
    pub xp_for_level: u64,
    pub next_level_at: u64,
    pub fraction: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreakChange {
    /// Activity on the same day as the last one, or dated before it.
    Unchanged,
    Extended,
    /// First activity ever, or a gap of more than one day.
    Restarted,
}

/// Applies calendar-day activity on `today` to the learner's streak.
pub fn update_streak(state: &mut LearnerProgressState, today: NaiveDate) -> StreakChange {
    let change = match state.last_activity_date {
        None => StreakChange::Restarted,
        Some(last) => match (today - last).num_days() {
            d if d <= 0 => StreakChange::Unchanged,
            1 => StreakChange::Extended,
            _ => StreakChange::Restarted,
        },
    };
    match change {
        StreakChange::Unchanged => {}
        StreakChange::Extended => {
            state.current_streak_days = state.current_streak_days.saturating_add(1);
            state.last_activity_date = Some(today);
        }
        StreakChange::Restarted => {
            state.current_streak_days = 1;
            state.last_activity_date = Some(today);
        }
    }
    state.longest_streak_days = state.longest_streak_days.max(state.current_streak_days);
    change
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Milestone {
    ChapterCompleted,
    QuizPassed,
    CertificateEarned,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptScore {
    pub state: LearnerProgressState,
    pub xp: XpBreakdown,
    /// XP from the attempt itself, excluding badge rewards.
    pub xp_delta: u64,
    pub badge_xp: u64,
    pub level_before: u32,
    pub level_after: u32,
    pub leveled_up: bool,
    pub streak: StreakChange,
    pub newly_unlocked: Vec<BadgeDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MilestoneScore {
    pub state: LearnerProgressState,
    pub badge_xp: u64,
    pub level_before: u32,
    pub level_after: u32,
    pub leveled_up: bool,
    pub newly_unlocked: Vec<BadgeDefinition>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ScoringConfig {
    pub xp: XpTable,
    pub level_curve: LevelCurve,
}

#[derive(Debug, Clone)]
pub struct ScoringEngine {
    config: ScoringConfig,
    catalog: Arc<BadgeCatalog>,
}

impl ScoringEngine {
    pub fn new(config: ScoringConfig, catalog: Arc<BadgeCatalog>) -> Self {
        Self { config, catalog }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    pub fn catalog(&self) -> &BadgeCatalog {
        &self.catalog
    }

    pub fn level_for(&self, total_xp: u64) -> u32 {
        self.config.level_curve.level_for(total_xp)
    }

    pub fn level_progress(&self, total_xp: u64) -> LevelProgress {
        self.config.level_curve.progress(total_xp)
    }

    pub fn apply_attempt(
        &self,
        state: &LearnerProgressState,
        attempt: &AttemptRecord,
        in_session_streak: u32,
    ) -> AttemptScore {
        let mut next = state.clone();
        let level_before = self.level_for(state.total_xp);

        let xp = self.config.xp.for_attempt(attempt, in_session_streak);
        next.total_xp = next.total_xp.saturating_add(xp.total);
        next.level = self.level_for(next.total_xp);

        let today = next.local_date(attempt.timestamp);
        let streak = update_streak(&mut next, today);

        let (newly_unlocked, badge_xp) = self.unlock_badges(&mut next);
        let level_after = next.level;

        AttemptScore {
            state: next,
            xp,
            xp_delta: xp.total,
            badge_xp,
            level_before,
            level_after,
            leveled_up: level_after > level_before,
            streak,
            newly_unlocked,
        }
    }

    pub fn apply_milestone(
        &self,
        state: &LearnerProgressState,
        milestone: Milestone,
    ) -> MilestoneScore {
        let mut next = state.clone();
        let level_before = self.level_for(state.total_xp);
        let counters = &mut next.counters;
        match milestone {
            Milestone::ChapterCompleted => {
                counters.chapters_completed = counters.chapters_completed.saturating_add(1)
            }
            Milestone::QuizPassed => {
                counters.quizzes_passed = counters.quizzes_passed.saturating_add(1)
            }
            Milestone::CertificateEarned => {
                counters.certificates_earned = counters.certificates_earned.saturating_add(1)
            }
        }
        self.settle(next, level_before)
    }

    /// Re-runs badge evaluation on a state whose counters were changed by the
    /// caller.
    pub fn reevaluate(&self, state: &LearnerProgressState) -> MilestoneScore {
        let level_before = self.level_for(state.total_xp);
        self.settle(state.clone(), level_before)
    }

    fn settle(&self, mut next: LearnerProgressState, level_before: u32) -> MilestoneScore {
        next.level = self.level_for(next.total_xp);
        let (newly_unlocked, badge_xp) = self.unlock_badges(&mut next);
        let level_after = next.level;
        MilestoneScore {
            state: next,
            badge_xp,
            level_before,
            level_after,
            leveled_up: level_after > level_before,
            newly_unlocked,
        }
    }

    /// Unlocks every badge whose requirement holds, one at a time in catalog
    /// order, until none is left. Rewards are added as they are granted so a
    /// reward can satisfy a later XP badge.
    fn unlock_badges(&self, state: &mut LearnerProgressState) -> (Vec<BadgeDefinition>, u64) {
        let mut unlocked = Vec::new();
        let mut reward = 0u64;
        while let Some(badge) = self.catalog.next_unlockable(state) {
            state.unlocked_badge_ids.insert(badge.id.clone());
            state.total_xp = state.total_xp.saturating_add(badge.xp_reward);
            reward = reward.saturating_add(badge.xp_reward);
            unlocked.push(badge.clone());
        }
        state.level = self.level_for(state.total_xp);
        (unlocked, reward)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::badge::{BadgeCategory, BadgeRequirement};
    use chrono::{TimeZone, Utc};

    fn attempt(correct: bool, tier: DifficultyTier, response_time_ms: u64) -> AttemptRecord {
        AttemptRecord {
            question_id: "q1".to_string(),
            topic_id: "t1".to_string(),
            correct,
            response_time_ms,
            difficulty_tier: tier,
            timestamp: Utc.with_ymd_and_hms(2024, 3, 1, 9, 0, 0).unwrap(),
        }
    }

    fn engine(catalog: BadgeCatalog) -> ScoringEngine {
        ScoringEngine::new(ScoringConfig::default(), Arc::new(catalog))
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn medium_fast_answer_reaching_streak_three() {
        let score = engine(BadgeCatalog::empty()).apply_attempt(
            &LearnerProgressState::new("u1"),
            &attempt(true, DifficultyTier::Medium, 8000),
            3,
        );
        assert_eq!(score.xp, XpBreakdown { base: 15, speed: 5, streak: 10, total: 30 });
        assert_eq!(score.xp_delta, 30);
        assert_eq!(score.state.total_xp, 30);
    }

    #[test]
    fn incorrect_answers_earn_nothing() {
        let table = XpTable::default();
        let breakdown = table.for_attempt(&attempt(false, DifficultyTier::Hard, 100), 0);
        assert_eq!(breakdown.total, 0);
    }

    #[test]
    fn streak_bonus_only_at_exact_thresholds() {
        let table = XpTable::default();
        assert_eq!(table.streak_bonus(3), 10);
        assert_eq!(table.streak_bonus(4), 0);
        assert_eq!(table.streak_bonus(5), 20);
        assert_eq!(table.streak_bonus(10), 50);
        assert_eq!(table.streak_bonus(11), 0);
    }

    #[test]
    fn slow_answer_gets_no_speed_bonus() {
        let table = XpTable::default();
        let breakdown = table.for_attempt(&attempt(true, DifficultyTier::Hard, 15_000), 1);
        assert_eq!(breakdown.total, 20);
    }

    #[test]
    fn triangular_thresholds() {
        let curve = LevelCurve::default();
        let thresholds: Vec<u64> = (1..=5).map(|l| curve.threshold(l)).collect();
        assert_eq!(thresholds, vec![0, 100, 300, 600, 1000]);
        assert_eq!(curve.level_for(0), 1);
        assert_eq!(curve.level_for(99), 1);
        assert_eq!(curve.level_for(100), 2);
        assert_eq!(curve.level_for(299), 2);
        assert_eq!(curve.level_for(1000), 5);
    }

    #[test]
    fn table_curve_extends_with_last_step() {
        let curve = LevelCurve::Table {
            thresholds: vec![0, 50, 150, 300],
        };
        curve.validate().unwrap();
        assert_eq!(curve.threshold(4), 300);
        assert_eq!(curve.threshold(5), 450);
        assert_eq!(curve.threshold(6), 600);
        assert_eq!(curve.level_for(449), 4);
        assert_eq!(curve.level_for(450), 5);
    }

    #[test]
    fn invalid_curves_are_rejected() {
        assert!(LevelCurve::Triangular { step: 0 }.validate().is_err());
        assert!(LevelCurve::Table { thresholds: vec![10, 20] }.validate().is_err());
        assert!(LevelCurve::Table { thresholds: vec![0, 20, 20] }.validate().is_err());
        assert!(LevelCurve::Table { thresholds: vec![0] }.validate().is_err());
    }

    #[test]
    fn huge_xp_stays_bracketed() {
        let curve = LevelCurve::default();
        let level = curve.level_for(1_000_000_000_000_000);
        assert!(level > 1_000_000);
        assert!(curve.threshold(level) <= 1_000_000_000_000_000);
        assert!(curve.threshold(level + 1) > 1_000_000_000_000_000);

        let shallow = LevelCurve::Table { thresholds: vec![0, 1] };
        let level = shallow.level_for(5_000_000);
        assert_eq!(level, 5_000_001);
        assert_eq!(shallow.threshold(level), 5_000_000);
        assert!(shallow.threshold(level + 1) > 5_000_000);

        assert!(curve.level_for(u64::MAX) >= 1);
    }

    #[test]
    fn crossing_level_two() {
        let mut state = LearnerProgressState::new("u1");
        state.total_xp = 95;
        state.level = 1;
        let score = engine(BadgeCatalog::empty()).apply_attempt(
            &state,
            &attempt(true, DifficultyTier::Easy, 20_000),
            1,
        );
        assert_eq!(score.state.total_xp, 105);
        assert!(score.leveled_up);
        assert_eq!(score.level_before, 1);
        assert_eq!(score.level_after, 2);
    }

    #[test]
    fn level_progress_fraction() {
        let progress = LevelCurve::default().progress(150);
        assert_eq!(progress.level, 2);
        assert_eq!(progress.xp_into_level, 50);
        assert_eq!(progress.xp_for_level, 200);
        assert_eq!(progress.next_level_at, 300);
        assert!((progress.fraction - 0.25).abs() < 1e-9);
    }

    #[test]
    fn streak_rules() {
        let mut state = LearnerProgressState::new("u1");
        assert_eq!(update_streak(&mut state, date(2024, 3, 1)), StreakChange::Restarted);
        assert_eq!(state.current_streak_days, 1);

        assert_eq!(update_streak(&mut state, date(2024, 3, 1)), StreakChange::Unchanged);
        assert_eq!(update_streak(&mut state, date(2024, 3, 2)), StreakChange::Extended);
        assert_eq!(update_streak(&mut state, date(2024, 3, 3)), StreakChange::Extended);
        assert_eq!(state.current_streak_days, 3);

        assert_eq!(update_streak(&mut state, date(2024, 3, 10)), StreakChange::Restarted);
        assert_eq!(state.current_streak_days, 1);
        assert_eq!(state.longest_streak_days, 3);
        assert_eq!(state.last_activity_date, Some(date(2024, 3, 10)));
    }

    #[test]
    fn predated_activity_leaves_streak_alone() {
        let mut state = LearnerProgressState::new("u1");
        update_streak(&mut state, date(2024, 3, 5));
        assert_eq!(update_streak(&mut state, date(2024, 3, 4)), StreakChange::Unchanged);
        assert_eq!(state.last_activity_date, Some(date(2024, 3, 5)));
        assert_eq!(state.current_streak_days, 1);
    }

    #[test]
    fn badge_reward_cascades_into_xp_badge() {
        let catalog = BadgeCatalog::new(vec![
            BadgeDefinition::new("chapter", "C", BadgeCategory::Progress, BadgeRequirement::ChaptersCompleted(1), 80),
            BadgeDefinition::new("xp_100", "X", BadgeCategory::Progress, BadgeRequirement::TotalXp(100), 5),
        ])
        .unwrap();
        let mut state = LearnerProgressState::new("u1");
        state.total_xp = 30;
        let score = engine(catalog).apply_milestone(&state, Milestone::ChapterCompleted);
        let ids: Vec<&str> = score.newly_unlocked.iter().map(|b| b.id.as_str()).collect();
        assert_eq!(ids, vec!["chapter", "xp_100"]);
        assert_eq!(score.badge_xp, 85);
        assert_eq!(score.state.total_xp, 115);
        assert!(score.leveled_up);
        assert_eq!(score.state.level, 2);
    }

    #[test]
    fn unlocked_badges_are_not_awarded_twice() {
        let engine = engine(BadgeCatalog::standard());
        let state = LearnerProgressState::new("u1");
        let first = engine.apply_attempt(&state, &attempt(true, DifficultyTier::Easy, 1000), 1);
        let mut with_quiz = engine.apply_milestone(&first.state, Milestone::QuizPassed);
        assert_eq!(with_quiz.newly_unlocked.len(), 1);
        with_quiz = engine.apply_milestone(&with_quiz.state, Milestone::QuizPassed);
        assert!(with_quiz.newly_unlocked.is_empty());
        assert_eq!(with_quiz.state.counters.quizzes_passed, 2);
    }

    #[test]
    fn streak_badge_unlocks_on_third_day() {
        let engine = engine(BadgeCatalog::standard());
        let mut state = LearnerProgressState::new("u1");
        state.last_activity_date = Some(date(2024, 2, 29));
        state.current_streak_days = 2;
        state.longest_streak_days = 2;
        let score = engine.apply_attempt(&state, &attempt(false, DifficultyTier::Easy, 1000), 0);
        assert_eq!(score.xp_delta, 0);
        assert_eq!(score.state.current_streak_days, 3);
        assert_eq!(score.newly_unlocked.len(), 1);
        assert_eq!(score.newly_unlocked[0].id, "streak_3");
        assert_eq!(score.state.total_xp, 15);
    }

    #[test]
    fn reevaluate_picks_up_counter_changes() {
        let engine = engine(BadgeCatalog::standard());
        let mut state = LearnerProgressState::new("u1");
        state.counters.review_cards = 10;
        let score = engine.reevaluate(&state);
        assert_eq!(score.newly_unlocked.len(), 1);
        assert_eq!(score.newly_unlocked[0].id, "review_starter");
        assert_eq!(score.badge_xp, 20);
        assert!(engine.reevaluate(&score.state).newly_unlocked.is_empty());
    }
}
