use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::{Clock, SystemClock};
use crate::config::EngineConfig;
use crate::content::{
    PresentedQuestion, Question, QuestionOrdering, QuestionPool, TopicAccuracy, UnseenFirst,
};
use crate::error::{EngineError, EngineResult};
use crate::services::badge::{BadgeCatalog, BadgeDefinition};
use crate::services::difficulty::{DifficultyPolicy, SeedPolicy};
use crate::services::review::{Quality, ReviewCard, ReviewScheduler};
use crate::services::scoring::{Milestone, MilestoneScore, ScoringEngine, StreakChange, XpBreakdown};
use crate::session::state::{SessionStateMachine, SessionStatus, StatusTransition};
use crate::store::{LearnerCommit, LearnerStore};
use crate::types::{AttemptRecord, DifficultyTier, LearnerProgressState};

/// A learner's answer to the current question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Answer {
    pub option_id: String,
    /// Measured from when the question was presented if absent.
    #[serde(default)]
    pub response_time_ms: Option<u64>,
    #[serde(default)]
    pub struggled: bool,
}

impl Answer {
    pub fn new(option_id: impl Into<String>) -> Self {
        Self {
            option_id: option_id.into(),
            response_time_ms: None,
            struggled: false,
        }
    }

    pub fn in_ms(mut self, response_time_ms: u64) -> Self {
        self.response_time_ms = Some(response_time_ms);
        self
    }

    pub fn struggled(mut self) -> Self {
        self.struggled = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttemptResult {
    pub question_id: String,
    pub correct: bool,
    pub correct_option_id: Option<String>,
    pub quality: Quality,
    pub xp: XpBreakdown,
    pub xp_delta: u64,
    pub badge_xp: u64,
    pub total_xp: u64,
    pub level: u32,
    pub leveled_up: bool,
    pub newly_unlocked: Vec<BadgeDefinition>,
    pub in_session_streak: u32,
    pub streak_days: u32,
    pub streak_change: StreakChange,
    pub next_tier: DifficultyTier,
    pub card_due_at: DateTime<Utc>,
    pub remaining: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: Uuid,
    pub learner_id: String,
    pub topic_id: String,
    pub answered: usize,
    pub correct: usize,
    pub accuracy: f64,
    /// Attempt XP plus every badge reward granted during the session.
    pub xp_earned: u64,
    pub tier_timeline: Vec<DifficultyTier>,
    pub badges_unlocked: Vec<BadgeDefinition>,
    pub streak_days: u32,
    pub level: u32,
    pub quiz_passed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewResult {
    pub card: ReviewCard,
    pub badge_xp: u64,
    pub newly_unlocked: Vec<BadgeDefinition>,
}

/// One quiz session. Owned by a single caller; every mutation goes through
/// the orchestrator.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    learner_id: String,
    topic_id: String,
    machine: SessionStateMachine,
    pending: Vec<Question>,
    /// How many entries at the front of `pending` are due reviews.
    pending_reviews: usize,
    current: Option<Question>,
    presented_at: Option<DateTime<Utc>>,
    policy: DifficultyPolicy,
    streak: u32,
    attempts: Vec<AttemptRecord>,
    tier_timeline: Vec<DifficultyTier>,
    xp_earned: u64,
    unlocked: Vec<BadgeDefinition>,
}

impl Session {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn learner_id(&self) -> &str {
        &self.learner_id
    }

    pub fn topic_id(&self) -> &str {
        &self.topic_id
    }

    pub fn status(&self) -> SessionStatus {
        self.machine.status()
    }

    pub fn history(&self) -> &[StatusTransition] {
        self.machine.history()
    }

    pub fn current_question(&self) -> Option<PresentedQuestion> {
        if self.status() != SessionStatus::InProgress {
            return None;
        }
        self.current.as_ref().map(Question::presented)
    }

    pub fn current_tier(&self) -> DifficultyTier {
        self.policy.tier()
    }

    pub fn in_session_streak(&self) -> u32 {
        self.streak
    }

    pub fn attempts(&self) -> &[AttemptRecord] {
        &self.attempts
    }

    pub fn tier_timeline(&self) -> &[DifficultyTier] {
        &self.tier_timeline
    }

    pub fn xp_earned(&self) -> u64 {
        self.xp_earned
    }

    pub fn badges_unlocked(&self) -> &[BadgeDefinition] {
        &self.unlocked
    }

    /// Questions not yet answered, including the current one.
    pub fn remaining(&self) -> usize {
        self.pending.len() + usize::from(self.current.is_some())
    }

    fn correct_count(&self) -> usize {
        self.attempts.iter().filter(|a| a.correct).count()
    }

    fn accuracy(&self) -> f64 {
        if self.attempts.is_empty() {
            0.0
        } else {
            self.correct_count() as f64 / self.attempts.len() as f64
        }
    }

    /// Due reviews go first in queue order. After that the first question at
    /// the target tier wins, then the nearest tier, then queue order.
    fn advance(&mut self, now: DateTime<Utc>) {
        let next = if self.pending.is_empty() {
            None
        } else if self.pending_reviews > 0 {
            self.pending_reviews -= 1;
            Some(0)
        } else {
            let target = self.policy.tier();
            self.pending
                .iter()
                .enumerate()
                .min_by_key(|(idx, q)| (q.tier.distance(target), *idx))
                .map(|(idx, _)| idx)
        };
        self.current = next.map(|idx| self.pending.remove(idx));
        self.presented_at = self.current.as_ref().map(|_| now);
    }

    fn ensure_in_progress(&self, operation: &'static str) -> EngineResult<()> {
        match self.status() {
            SessionStatus::InProgress => Ok(()),
            status => Err(EngineError::InvalidSessionState { operation, status }),
        }
    }
}

pub struct SessionOrchestrator {
    config: EngineConfig,
    scheduler: ReviewScheduler,
    scoring: ScoringEngine,
    store: Arc<dyn LearnerStore>,
    pool: Arc<dyn QuestionPool>,
    accuracy: Option<Arc<dyn TopicAccuracy>>,
    ordering: Arc<dyn QuestionOrdering>,
    seed: Arc<dyn SeedPolicy>,
    clock: Arc<dyn Clock>,
}

impl SessionOrchestrator {
    pub fn new(
        config: EngineConfig,
        store: Arc<dyn LearnerStore>,
        pool: Arc<dyn QuestionPool>,
    ) -> Self {
        let scheduler = ReviewScheduler::new(config.scheduler.clone());
        let scoring = ScoringEngine::new(config.scoring.clone(), Arc::new(BadgeCatalog::standard()));
        let seed = Arc::new(config.difficulty.seed.clone());
        Self {
            config,
            scheduler,
            scoring,
            store,
            pool,
            accuracy: None,
            ordering: Arc::new(UnseenFirst),
            seed,
            clock: Arc::new(SystemClock),
        }
    }

    pub fn with_catalog(mut self, catalog: Arc<BadgeCatalog>) -> Self {
        self.scoring = ScoringEngine::new(self.config.scoring.clone(), catalog);
        self
    }

    pub fn with_accuracy(mut self, accuracy: Arc<dyn TopicAccuracy>) -> Self {
        self.accuracy = Some(accuracy);
        self
    }

    pub fn with_ordering(mut self, ordering: Arc<dyn QuestionOrdering>) -> Self {
        self.ordering = ordering;
        self
    }

    pub fn with_seed_policy(mut self, seed: Arc<dyn SeedPolicy>) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &ReviewScheduler {
        &self.scheduler
    }

    pub fn scoring(&self) -> &ScoringEngine {
        &self.scoring
    }

    pub fn progress(&self, learner_id: &str) -> EngineResult<LearnerProgressState> {
        Ok(self.store.progress(learner_id)?.value)
    }

    pub fn start(
        &self,
        learner_id: &str,
        topic_id: &str,
        size: Option<usize>,
    ) -> EngineResult<Session> {
        let questions = self
            .pool
            .topic_questions(topic_id)
            .ok_or_else(|| EngineError::unknown_topic(topic_id))?;
        if questions.is_empty() {
            return Err(EngineError::InvalidReference(format!(
                "topic {topic_id} has no questions"
            )));
        }
        let size = size.unwrap_or(self.config.session.default_size);
        if size == 0 {
            return Err(EngineError::InvalidReference(
                "session size must be at least 1".to_string(),
            ));
        }

        let now = self.clock.now();
        let cards: HashMap<String, ReviewCard> = self
            .store
            .cards(learner_id)?
            .into_iter()
            .map(|card| (card.question_id.clone(), card))
            .collect();

        let in_topic: HashSet<&str> = questions.iter().map(|q| q.id.as_str()).collect();
        let due_limit = self.config.session.max_due_reviews.min(size);
        let due: Vec<ReviewCard> = self.scheduler.due_cards(
            cards
                .values()
                .filter(|c| c.topic_id == topic_id && in_topic.contains(c.question_id.as_str())),
            now,
            due_limit,
        );
        let due_ids: HashSet<&str> = due.iter().map(|c| c.question_id.as_str()).collect();

        let mut pending: Vec<Question> = due
            .iter()
            .filter_map(|card| questions.iter().find(|q| q.id == card.question_id))
            .cloned()
            .collect();
        let pending_reviews = pending.len();

        let rest: Vec<Question> = questions
            .iter()
            .filter(|q| !due_ids.contains(q.id.as_str()))
            .cloned()
            .collect();
        let mut seen: HashSet<String> = pending.iter().map(|q| q.id.clone()).collect();
        for question in self.ordering.order(rest, &cards) {
            if pending.len() >= size {
                break;
            }
            if seen.insert(question.id.clone()) {
                pending.push(question);
            }
        }

        let accuracy = self
            .accuracy
            .as_ref()
            .and_then(|lookup| lookup.accuracy(learner_id, topic_id));
        let policy = DifficultyPolicy::seeded(&self.config.difficulty, self.seed.as_ref(), accuracy);

        let mut machine = SessionStateMachine::new();
        machine
            .start(now)
            .map_err(|err| EngineError::from_transition("start", err))?;

        let mut session = Session {
            id: Uuid::new_v4(),
            learner_id: learner_id.to_string(),
            topic_id: topic_id.to_string(),
            machine,
            pending,
            pending_reviews,
            current: None,
            presented_at: None,
            policy,
            streak: 0,
            attempts: Vec::new(),
            tier_timeline: vec![policy.tier()],
            xp_earned: 0,
            unlocked: Vec::new(),
        };
        session.advance(now);

        tracing::info!(
            session_id = %session.id,
            learner_id,
            topic_id,
            questions = session.remaining(),
            due_reviews = pending_reviews,
            seed_tier = %policy.tier(),
            "session started"
        );
        Ok(session)
    }

    pub fn submit_answer(&self, session: &mut Session, answer: Answer) -> EngineResult<AttemptResult> {
        session.ensure_in_progress("submit_answer")?;
        let question = session.current.clone().ok_or(EngineError::InvalidSessionState {
            operation: "submit_answer",
            status: session.status(),
        })?;
        let option = question.option(&answer.option_id).ok_or_else(|| {
            EngineError::InvalidReference(format!(
                "option {} does not belong to question {}",
                answer.option_id, question.id
            ))
        })?;

        let now = self.clock.now();
        let response_time_ms = answer.response_time_ms.unwrap_or_else(|| {
            session
                .presented_at
                .map(|at| (now - at).num_milliseconds().max(0) as u64)
                .unwrap_or(0)
        });
        let attempt = AttemptRecord {
            question_id: question.id.clone(),
            topic_id: question.topic_id.clone(),
            correct: option.correct,
            response_time_ms,
            difficulty_tier: question.tier,
            timestamp: now,
        };
        let streak = if attempt.correct { session.streak + 1 } else { 0 };

        let progress = self.store.progress(&session.learner_id)?;
        let existing = self.store.card(&session.learner_id, &question.id)?;
        let quality = self.scheduler.quality_for(&attempt, answer.struggled);
        let card =
            self.scheduler
                .grade_attempt(existing.as_ref(), &session.learner_id, &attempt, quality);

        let mut working = progress.value;
        if existing.is_none() {
            working.counters.review_cards = working.counters.review_cards.saturating_add(1);
        }
        let score = self.scoring.apply_attempt(&working, &attempt, streak);
        let next_tier = session.policy.peek(attempt.correct, streak);

        self.commit(LearnerCommit {
            learner_id: session.learner_id.clone(),
            expected_version: progress.version,
            progress: score.state.clone(),
            cards: vec![card.clone()],
        })?;

        session.streak = streak;
        session.policy.transition(attempt.correct, streak);
        session.tier_timeline.push(next_tier);
        session.xp_earned = session
            .xp_earned
            .saturating_add(score.xp_delta)
            .saturating_add(score.badge_xp);
        session.unlocked.extend(score.newly_unlocked.iter().cloned());
        session.attempts.push(attempt.clone());
        session.advance(now);

        tracing::debug!(
            session_id = %session.id,
            learner_id = %session.learner_id,
            question_id = %attempt.question_id,
            correct = attempt.correct,
            response_time_ms,
            ?quality,
            xp_delta = score.xp_delta,
            next_tier = %next_tier,
            due_at = %card.due_at,
            "attempt recorded"
        );
        self.log_rewards(
            &session.learner_id,
            score.level_before,
            score.level_after,
            &score.newly_unlocked,
        );

        Ok(AttemptResult {
            question_id: attempt.question_id,
            correct: attempt.correct,
            correct_option_id: question.correct_option().map(|o| o.id.clone()),
            quality,
            xp: score.xp,
            xp_delta: score.xp_delta,
            badge_xp: score.badge_xp,
            total_xp: score.state.total_xp,
            level: score.level_after,
            leveled_up: score.leveled_up,
            newly_unlocked: score.newly_unlocked,
            in_session_streak: streak,
            streak_days: score.state.current_streak_days,
            streak_change: score.streak,
            next_tier,
            card_due_at: card.due_at,
            remaining: session.remaining(),
        })
    }

    /// Ends the session. Allowed before every question was answered; a
    /// passed quiz is recorded as a milestone.
    pub fn complete(&self, session: &mut Session) -> EngineResult<SessionSummary> {
        session.ensure_in_progress("complete")?;
        let now = self.clock.now();
        let accuracy = session.accuracy();
        let quiz_passed =
            !session.attempts.is_empty() && accuracy >= self.config.session.pass_accuracy;

        let progress = self.store.progress(&session.learner_id)?;
        let (state, milestone) = if quiz_passed {
            let score = self.scoring.apply_milestone(&progress.value, Milestone::QuizPassed);
            self.commit(LearnerCommit {
                learner_id: session.learner_id.clone(),
                expected_version: progress.version,
                progress: score.state.clone(),
                cards: Vec::new(),
            })?;
            self.log_rewards(
                &session.learner_id,
                score.level_before,
                score.level_after,
                &score.newly_unlocked,
            );
            (score.state.clone(), Some(score))
        } else {
            (progress.value, None)
        };

        session
            .machine
            .complete(now)
            .map_err(|err| EngineError::from_transition("complete", err))?;
        if let Some(score) = milestone {
            session.xp_earned = session.xp_earned.saturating_add(score.badge_xp);
            session.unlocked.extend(score.newly_unlocked);
        }
        session.current = None;
        session.presented_at = None;

        let summary = SessionSummary {
            session_id: session.id,
            learner_id: session.learner_id.clone(),
            topic_id: session.topic_id.clone(),
            answered: session.attempts.len(),
            correct: session.correct_count(),
            accuracy,
            xp_earned: session.xp_earned,
            tier_timeline: session.tier_timeline.clone(),
            badges_unlocked: session.unlocked.clone(),
            streak_days: state.current_streak_days,
            level: state.level,
            quiz_passed,
        };
        tracing::info!(
            session_id = %summary.session_id,
            learner_id = %summary.learner_id,
            answered = summary.answered,
            correct = summary.correct,
            xp_earned = summary.xp_earned,
            quiz_passed,
            "session completed"
        );
        Ok(summary)
    }

    /// Stops the session. Attempts already committed stay committed.
    pub fn abandon(&self, session: &mut Session) -> EngineResult<()> {
        session
            .machine
            .abandon(self.clock.now())
            .map_err(|err| EngineError::from_transition("abandon", err))?;
        session.current = None;
        session.presented_at = None;
        tracing::info!(
            session_id = %session.id,
            learner_id = %session.learner_id,
            answered = session.attempts.len(),
            "session abandoned"
        );
        Ok(())
    }

    pub fn due_cards(&self, learner_id: &str, limit: usize) -> EngineResult<Vec<ReviewCard>> {
        let cards = self.store.cards(learner_id)?;
        Ok(self.scheduler.due_cards(&cards, self.clock.now(), limit))
    }

    /// Grades one card outside any session.
    pub fn review(
        &self,
        learner_id: &str,
        question_id: &str,
        quality: Quality,
    ) -> EngineResult<ReviewResult> {
        let question = self
            .pool
            .question(question_id)
            .ok_or_else(|| EngineError::unknown_question(question_id))?;
        let now = self.clock.now();
        let progress = self.store.progress(learner_id)?;
        let existing = self.store.card(learner_id, question_id)?;
        let card = match existing.as_ref() {
            Some(card) => self.scheduler.grade(card, quality, now),
            None => {
                let fresh = self
                    .scheduler
                    .new_card(learner_id, question_id, &question.topic_id, now);
                self.scheduler.grade(&fresh, quality, now)
            }
        };

        let mut working = progress.value;
        if existing.is_none() {
            working.counters.review_cards = working.counters.review_cards.saturating_add(1);
        }
        let score = self.scoring.reevaluate(&working);

        self.commit(LearnerCommit {
            learner_id: learner_id.to_string(),
            expected_version: progress.version,
            progress: score.state.clone(),
            cards: vec![card.clone()],
        })?;
        tracing::debug!(
            learner_id,
            question_id,
            ?quality,
            interval_days = card.interval_days,
            due_at = %card.due_at,
            "card reviewed"
        );
        self.log_rewards(
            learner_id,
            score.level_before,
            score.level_after,
            &score.newly_unlocked,
        );

        Ok(ReviewResult {
            card,
            badge_xp: score.badge_xp,
            newly_unlocked: score.newly_unlocked,
        })
    }

    pub fn record_milestone(
        &self,
        learner_id: &str,
        milestone: Milestone,
    ) -> EngineResult<MilestoneScore> {
        let progress = self.store.progress(learner_id)?;
        let score = self.scoring.apply_milestone(&progress.value, milestone);
        self.commit(LearnerCommit {
            learner_id: learner_id.to_string(),
            expected_version: progress.version,
            progress: score.state.clone(),
            cards: Vec::new(),
        })?;
        tracing::info!(learner_id, ?milestone, "milestone recorded");
        self.log_rewards(
            learner_id,
            score.level_before,
            score.level_after,
            &score.newly_unlocked,
        );
        Ok(score)
    }

    fn commit(&self, commit: LearnerCommit) -> EngineResult<u64> {
        let learner_id = commit.learner_id.clone();
        self.store.commit(commit).map_err(|err| {
            if err.is_conflict() {
                tracing::warn!(learner_id = %learner_id, error = %err, "concurrent learner update");
            }
            err
        })
    }

    fn log_rewards(
        &self,
        learner_id: &str,
        level_before: u32,
        level_after: u32,
        unlocked: &[BadgeDefinition],
    ) {
        if level_after > level_before {
            tracing::info!(learner_id, level_before, level_after, "level up");
        }
        for badge in unlocked {
            tracing::info!(
                learner_id,
                badge_id = %badge.id,
                xp_reward = badge.xp_reward,
                "badge unlocked"
            );
        }
    }
}
