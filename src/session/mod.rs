pub mod orchestrator;
pub mod state;

pub use orchestrator::{
    Answer, AttemptResult, ReviewResult, Session, SessionOrchestrator, SessionSummary,
};
pub use state::{SessionStateMachine, SessionStatus, StatusTransition, TransitionError};
