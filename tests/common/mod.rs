#![allow(dead_code)]

use std::sync::Arc;

use chrono::{DateTime, TimeZone, Utc};

use learning_engine::clock::ManualClock;
use learning_engine::content::{AnswerOption, Question, StaticAccuracy, StaticQuestionPool};
use learning_engine::services::review::ReviewCard;
use learning_engine::store::{InMemoryStore, LearnerCommit, LearnerStore};
use learning_engine::types::{DifficultyTier, LearnerProgressState};
use learning_engine::{EngineConfig, SessionOrchestrator};

pub const LEARNER: &str = "learner-1";
pub const TOPIC: &str = "ownership";
pub const RIGHT: &str = "right";
pub const WRONG: &str = "wrong";

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 4, 2, 9, 30, 0).unwrap()
}

pub fn question(id: &str, tier: DifficultyTier) -> Question {
    Question {
        id: id.to_string(),
        topic_id: TOPIC.to_string(),
        tier,
        prompt: format!("What does {id} print?"),
        options: vec![
            AnswerOption::new(RIGHT, "the right answer", true),
            AnswerOption::new(WRONG, "a plausible mistake", false),
        ],
    }
}

pub fn questions(prefix: &str, tier: DifficultyTier, n: usize) -> Vec<Question> {
    (1..=n).map(|i| question(&format!("{prefix}{i}"), tier)).collect()
}

/// Two questions per tier.
pub fn mixed_questions() -> Vec<Question> {
    let mut all = questions("e", DifficultyTier::Easy, 2);
    all.extend(questions("m", DifficultyTier::Medium, 2));
    all.extend(questions("h", DifficultyTier::Hard, 2));
    all
}

pub struct Harness {
    pub orchestrator: SessionOrchestrator,
    pub store: Arc<InMemoryStore>,
    pub clock: Arc<ManualClock>,
}

impl Harness {
    pub fn new(questions: Vec<Question>) -> Self {
        Self::build(EngineConfig::default(), questions, None)
    }

    pub fn with_accuracy(questions: Vec<Question>, accuracy: f64) -> Self {
        Self::build(EngineConfig::default(), questions, Some(accuracy))
    }

    pub fn build(config: EngineConfig, questions: Vec<Question>, accuracy: Option<f64>) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let clock = Arc::new(ManualClock::new(t0()));
        let mut lookup = StaticAccuracy::new();
        if let Some(value) = accuracy {
            lookup = lookup.with(LEARNER, TOPIC, value);
        }
        let orchestrator = SessionOrchestrator::new(
            config,
            store.clone(),
            Arc::new(StaticQuestionPool::new(questions)),
        )
        .with_accuracy(Arc::new(lookup))
        .with_clock(clock.clone());
        Self {
            orchestrator,
            store,
            clock,
        }
    }

    pub fn seed(&self, progress: LearnerProgressState, cards: Vec<ReviewCard>) {
        let version = self.store.progress(&progress.learner_id).unwrap().version;
        self.store
            .commit(LearnerCommit {
                learner_id: progress.learner_id.clone(),
                expected_version: version,
                progress,
                cards,
            })
            .unwrap();
    }

    pub fn progress(&self) -> LearnerProgressState {
        self.store.progress(LEARNER).unwrap().value
    }
}
