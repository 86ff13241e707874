use std::path::Path;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::clock::{Clock, ManualClock};
use crate::config::{ConfigError, EngineConfig};
use crate::content::{Question, StaticAccuracy, StaticQuestionPool};
use crate::error::EngineError;
use crate::services::review::ReviewCard;
use crate::session::{Answer, AttemptResult, SessionOrchestrator, SessionSummary};
use crate::store::{InMemoryStore, LearnerCommit, LearnerStore};
use crate::types::LearnerProgressState;

#[derive(Debug, Error)]
pub enum ReplayError {
    #[error("failed to read fixture: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed fixture: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid fixture: {0}")]
    InvalidFixture(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptedAnswer {
    pub option_id: String,
    #[serde(default)]
    pub response_time_ms: Option<u64>,
    #[serde(default)]
    pub struggled: bool,
    /// Days after `startAt` at which the answer is given.
    #[serde(default)]
    pub day_offset: i64,
    /// Time spent on the question when `responseTimeMs` is absent.
    #[serde(default)]
    pub think_ms: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fixture {
    pub learner_id: String,
    pub topic_id: String,
    pub start_at: DateTime<Utc>,
    #[serde(default)]
    pub utc_offset_minutes: i32,
    #[serde(default)]
    pub config: Option<EngineConfig>,
    #[serde(default)]
    pub session_size: Option<usize>,
    /// Historical accuracy on the topic used to seed the first tier.
    #[serde(default)]
    pub accuracy: Option<f64>,
    /// Learner state before the session; a fresh learner when absent.
    #[serde(default)]
    pub progress: Option<LearnerProgressState>,
    #[serde(default)]
    pub cards: Vec<ReviewCard>,
    pub questions: Vec<Question>,
    pub answers: Vec<ScriptedAnswer>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplayReport {
    pub session_id: uuid::Uuid,
    pub attempts: Vec<AttemptResult>,
    /// Scripted answers left over once the session ran out of questions.
    pub unused_answers: usize,
    pub summary: SessionSummary,
    pub progress: LearnerProgressState,
    pub cards: Vec<ReviewCard>,
}

pub fn load_fixture(path: &Path) -> Result<Fixture, ReplayError> {
    let raw = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

pub fn run_file(path: &Path, base: &EngineConfig) -> Result<ReplayReport, ReplayError> {
    let fixture = load_fixture(path)?;
    run_fixture(&fixture, base)
}

/// Runs one scripted session against a fresh in-memory store. A fixture
/// config replaces `base` entirely.
pub fn run_fixture(fixture: &Fixture, base: &EngineConfig) -> Result<ReplayReport, ReplayError> {
    let config = fixture.config.clone().unwrap_or_else(|| base.clone());
    config.validate()?;

    let store = Arc::new(InMemoryStore::new());
    let progress = fixture
        .progress
        .clone()
        .map(|mut p| {
            p.learner_id = fixture.learner_id.clone();
            p
        })
        .unwrap_or_else(|| LearnerProgressState::new(&fixture.learner_id))
        .with_utc_offset(fixture.utc_offset_minutes);
    store.commit(LearnerCommit {
        learner_id: fixture.learner_id.clone(),
        expected_version: 0,
        progress,
        cards: fixture
            .cards
            .iter()
            .cloned()
            .map(|mut card| {
                card.learner_id = fixture.learner_id.clone();
                card
            })
            .collect(),
    })?;

    let mut accuracy = StaticAccuracy::new();
    if let Some(value) = fixture.accuracy {
        accuracy = accuracy.with(&fixture.learner_id, &fixture.topic_id, value);
    }
    let clock = Arc::new(ManualClock::new(fixture.start_at));
    let orchestrator = SessionOrchestrator::new(
        config,
        store.clone(),
        Arc::new(StaticQuestionPool::new(fixture.questions.clone())),
    )
    .with_accuracy(Arc::new(accuracy))
    .with_clock(clock.clone());

    let mut session = orchestrator.start(&fixture.learner_id, &fixture.topic_id, fixture.session_size)?;
    let mut attempts = Vec::with_capacity(fixture.answers.len());
    for scripted in &fixture.answers {
        if session.current_question().is_none() {
            break;
        }
        let answered_at = Duration::try_days(scripted.day_offset)
            .and_then(|offset| fixture.start_at.checked_add_signed(offset))
            .ok_or_else(|| {
                ReplayError::InvalidFixture(format!("dayOffset {} is out of range", scripted.day_offset))
            })?;
        if answered_at > clock.now() {
            clock.set(answered_at);
        }
        if let Some(think_ms) = scripted.think_ms {
            let thought_until = Duration::try_milliseconds(think_ms.max(0))
                .and_then(|think| clock.now().checked_add_signed(think))
                .ok_or_else(|| ReplayError::InvalidFixture(format!("thinkMs {think_ms} is out of range")))?;
            clock.set(thought_until);
        }
        let answer = Answer {
            option_id: scripted.option_id.clone(),
            response_time_ms: scripted.response_time_ms,
            struggled: scripted.struggled,
        };
        attempts.push(orchestrator.submit_answer(&mut session, answer)?);
    }
    let unused_answers = fixture.answers.len() - attempts.len();
    if unused_answers > 0 {
        tracing::warn!(unused_answers, "session ran out of questions before the script did");
    }

    let summary = orchestrator.complete(&mut session)?;
    Ok(ReplayReport {
        session_id: session.id(),
        attempts,
        unused_answers,
        summary,
        progress: store.progress(&fixture.learner_id)?.value,
        cards: store.cards(&fixture.learner_id)?,
    })
}
