use thiserror::Error;

use crate::session::state::{SessionStatus, TransitionError};

/// Every failure the engine reports. All variants are recoverable by the
/// caller; a call that returns one of them has not mutated any state.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum EngineError {
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("{operation} is not allowed while the session is {status}")]
    InvalidSessionState {
        operation: &'static str,
        status: SessionStatus,
    },

    #[error("learner {learner_id} was updated concurrently (expected version {expected}, found {actual})")]
    PersistenceConflict {
        learner_id: String,
        expected: u64,
        actual: u64,
    },
}

impl EngineError {
    pub fn unknown_question(question_id: &str) -> Self {
        Self::InvalidReference(format!("unknown question {question_id}"))
    }

    pub fn unknown_topic(topic_id: &str) -> Self {
        Self::InvalidReference(format!("unknown topic {topic_id}"))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::PersistenceConflict { .. })
    }

    pub(crate) fn from_transition(operation: &'static str, err: TransitionError) -> Self {
        match err {
            TransitionError::InvalidTransition { from, .. } => Self::InvalidSessionState {
                operation,
                status: from,
            },
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
