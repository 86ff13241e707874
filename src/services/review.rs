use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::types::AttemptRecord;

pub const INITIAL_EASE: f64 = 2.5;
pub const MIN_EASE: f64 = 1.3;
pub const MAX_EASE: f64 = 5.0;

pub const FAIL_EASE_DELTA: f64 = -0.2;
pub const HARD_EASE_DELTA: f64 = -0.15;
pub const GOOD_EASE_DELTA: f64 = 0.0;
pub const EASY_EASE_DELTA: f64 = 0.15;

/// Correct answers faster than this grade as `Easy`.
pub const FAST_ANSWER_MS: u64 = 5000;

const FIRST_INTERVAL_DAYS: u32 = 1;
const SECOND_INTERVAL_DAYS: u32 = 6;
const FAIL_INTERVAL_DAYS: u32 = 1;
/// Upper bound for `max_interval_days`.
pub const MAX_INTERVAL_DAYS: u32 = 36500;

const MASTERY_INTERVAL_DAYS: u32 = 21;
const MASTERY_MAX_LAPSES: u32 = 2;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SchedulerParams {
    pub initial_ease: f64,
    pub min_ease: f64,
    pub max_ease: f64,
    pub fail_delta: f64,
    pub hard_delta: f64,
    pub good_delta: f64,
    pub easy_delta: f64,
    pub fast_answer_ms: u64,
    pub max_interval_days: u32,
    pub mastery_interval_days: u32,
    pub mastery_max_lapses: u32,
    pub exclude_mastered: bool,
}

impl Default for SchedulerParams {
    fn default() -> Self {
        Self {
            initial_ease: INITIAL_EASE,
            min_ease: MIN_EASE,
            max_ease: MAX_EASE,
            fail_delta: FAIL_EASE_DELTA,
            hard_delta: HARD_EASE_DELTA,
            good_delta: GOOD_EASE_DELTA,
            easy_delta: EASY_EASE_DELTA,
            fast_answer_ms: FAST_ANSWER_MS,
            max_interval_days: MAX_INTERVAL_DAYS,
            mastery_interval_days: MASTERY_INTERVAL_DAYS,
            mastery_max_lapses: MASTERY_MAX_LAPSES,
            exclude_mastered: true,
        }
    }
}

impl SchedulerParams {
    fn ease_delta(&self, quality: Quality) -> f64 {
        match quality {
            Quality::Fail => self.fail_delta,
            Quality::Hard => self.hard_delta,
            Quality::Good => self.good_delta,
            Quality::Easy => self.easy_delta,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Quality {
    Fail,
    Hard,
    Good,
    Easy,
}

impl Quality {
    /// `struggled` is the explicit "I struggled" signal; without it `Hard` is
    /// never produced.
    pub fn from_attempt(
        correct: bool,
        response_time_ms: u64,
        struggled: bool,
        fast_answer_ms: u64,
    ) -> Self {
        if !correct {
            return Self::Fail;
        }
        if struggled {
            Self::Hard
        } else if response_time_ms < fast_answer_ms {
            Self::Easy
        } else {
            Self::Good
        }
    }

    pub fn is_passing(&self) -> bool {
        !matches!(self, Self::Fail)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewCard {
    pub learner_id: String,
    pub question_id: String,
    pub topic_id: String,
    pub ease_factor: f64,
    pub interval_days: u32,
    pub repetitions: u32,
    pub lapses: u32,
    pub due_at: DateTime<Utc>,
    pub last_reviewed_at: Option<DateTime<Utc>>,
}

impl ReviewCard {
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_at <= now
    }

    pub fn is_new(&self) -> bool {
        self.last_reviewed_at.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReviewScheduler {
    params: SchedulerParams,
}

impl ReviewScheduler {
    pub fn new(params: SchedulerParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &SchedulerParams {
        &self.params
    }

    pub fn quality_for(&self, attempt: &AttemptRecord, struggled: bool) -> Quality {
        Quality::from_attempt(
            attempt.correct,
            attempt.response_time_ms,
            struggled,
            self.params.fast_answer_ms,
        )
    }

    /// A card that has never been graded. It is due immediately.
    pub fn new_card(
        &self,
        learner_id: &str,
        question_id: &str,
        topic_id: &str,
        now: DateTime<Utc>,
    ) -> ReviewCard {
        ReviewCard {
            learner_id: learner_id.to_string(),
            question_id: question_id.to_string(),
            topic_id: topic_id.to_string(),
            ease_factor: self.params.initial_ease,
            interval_days: 0,
            repetitions: 0,
            lapses: 0,
            due_at: now,
            last_reviewed_at: None,
        }
    }

    pub fn grade(&self, card: &ReviewCard, quality: Quality, now: DateTime<Utc>) -> ReviewCard {
        let p = &self.params;
        let ease_factor = (card.ease_factor + p.ease_delta(quality)).clamp(p.min_ease, p.max_ease);

        let (repetitions, interval_days, lapses) = if quality.is_passing() {
            let repetitions = card.repetitions + 1;
            let interval = match repetitions {
                1 => FIRST_INTERVAL_DAYS,
                2 => SECOND_INTERVAL_DAYS,
                _ => (card.interval_days as f64 * ease_factor).round() as u32,
            };
            let interval = interval.max(card.interval_days).min(p.max_interval_days);
            (repetitions, interval, card.lapses)
        } else {
            let lapses = if card.repetitions > 0 {
                card.lapses + 1
            } else {
                card.lapses
            };
            (0, FAIL_INTERVAL_DAYS, lapses)
        };

        ReviewCard {
            ease_factor,
            interval_days,
            repetitions,
            lapses,
            due_at: now
                .checked_add_signed(Duration::days(interval_days as i64))
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
            last_reviewed_at: Some(now),
            ..card.clone()
        }
    }

    /// Grades `card`, creating it first when the learner has never seen the
    /// question. The attempt timestamp is the grading time.
    pub fn grade_attempt(
        &self,
        card: Option<&ReviewCard>,
        learner_id: &str,
        attempt: &AttemptRecord,
        quality: Quality,
    ) -> ReviewCard {
        let now = attempt.timestamp;
        match card {
            Some(card) => self.grade(card, quality, now),
            None => {
                let fresh = self.new_card(learner_id, &attempt.question_id, &attempt.topic_id, now);
                self.grade(&fresh, quality, now)
            }
        }
    }

    pub fn is_mastered(&self, card: &ReviewCard) -> bool {
        card.interval_days >= self.params.mastery_interval_days
            && card.lapses <= self.params.mastery_max_lapses
    }

    /// Due cards, oldest-overdue first, ties broken by question id.
    pub fn due_cards<'a, I>(&self, cards: I, now: DateTime<Utc>, limit: usize) -> Vec<ReviewCard>
    where
        I: IntoIterator<Item = &'a ReviewCard>,
    {
        let mut due: Vec<ReviewCard> = cards
            .into_iter()
            .filter(|card| card.is_due(now))
            .filter(|card| !(self.params.exclude_mastered && self.is_mastered(card)))
            .cloned()
            .collect();
        due.sort_by(|a, b| {
            a.due_at
                .cmp(&b.due_at)
                .then_with(|| a.question_id.cmp(&b.question_id))
        });
        due.truncate(limit);
        due
    }
}
