pub mod memory;

use serde::{Deserialize, Serialize};

use crate::error::EngineResult;
use crate::services::review::ReviewCard;
use crate::types::LearnerProgressState;

pub use memory::InMemoryStore;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Versioned<T> {
    pub value: T,
    pub version: u64,
}

/// A write of one learner's progress and any number of their cards. It is
/// applied only if the learner's version still equals `expected_version`.
#[derive(Debug, Clone, PartialEq)]
pub struct LearnerCommit {
    pub learner_id: String,
    pub expected_version: u64,
    pub progress: LearnerProgressState,
    pub cards: Vec<ReviewCard>,
}

/// Persistence for learner progress and review cards.
///
/// Each learner has a single version counter covering both their progress
/// and their cards. Every successful commit increments it; a commit whose
/// expected version is stale fails with `PersistenceConflict` and writes
/// nothing, so the caller can reload and retry.
pub trait LearnerStore: Send + Sync {
    /// Learners that were never written read as a fresh state at version 0.
    fn progress(&self, learner_id: &str) -> EngineResult<Versioned<LearnerProgressState>>;

    fn card(&self, learner_id: &str, question_id: &str) -> EngineResult<Option<ReviewCard>>;

    fn cards(&self, learner_id: &str) -> EngineResult<Vec<ReviewCard>>;

    /// Returns the new version.
    fn commit(&self, commit: LearnerCommit) -> EngineResult<u64>;
}
