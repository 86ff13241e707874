use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    NotStarted,
    InProgress,
    Completed,
    Abandoned,
}

impl SessionStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            SessionStatus::NotStarted => "NOT_STARTED",
            SessionStatus::InProgress => "IN_PROGRESS",
            SessionStatus::Completed => "COMPLETED",
            SessionStatus::Abandoned => "ABANDONED",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Abandoned)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusTransition {
    pub from: SessionStatus,
    pub to: SessionStatus,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionStateMachine {
    current: SessionStatus,
    history: Vec<StatusTransition>,
}

impl Default for SessionStateMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionStateMachine {
    pub fn new() -> Self {
        Self {
            current: SessionStatus::NotStarted,
            history: Vec::new(),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.current
    }

    pub fn history(&self) -> &[StatusTransition] {
        &self.history
    }

    pub fn can_transition_to(&self, target: SessionStatus) -> bool {
        matches!(
            (self.current, target),
            (SessionStatus::NotStarted, SessionStatus::InProgress)
                | (SessionStatus::InProgress, SessionStatus::Completed)
                | (SessionStatus::InProgress, SessionStatus::Abandoned)
        )
    }

    pub fn transition_to(
        &mut self,
        target: SessionStatus,
        at: DateTime<Utc>,
    ) -> Result<(), TransitionError> {
        if !self.can_transition_to(target) {
            return Err(TransitionError::InvalidTransition {
                from: self.current,
                to: target,
            });
        }
        self.history.push(StatusTransition {
            from: self.current,
            to: target,
            at,
        });
        self.current = target;
        Ok(())
    }

    pub fn start(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition_to(SessionStatus::InProgress, at)
    }

    pub fn complete(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition_to(SessionStatus::Completed, at)
    }

    pub fn abandon(&mut self, at: DateTime<Utc>) -> Result<(), TransitionError> {
        self.transition_to(SessionStatus::Abandoned, at)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("Invalid transition from {from:?} to {to:?}")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
}
