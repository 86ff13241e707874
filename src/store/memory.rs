use std::collections::{BTreeMap, HashMap};

use parking_lot::RwLock;

use crate::error::{EngineError, EngineResult};
use crate::services::review::ReviewCard;
use crate::store::{LearnerCommit, LearnerStore, Versioned};
use crate::types::LearnerProgressState;

#[derive(Debug, Default)]
struct LearnerRecord {
    version: u64,
    progress: Option<LearnerProgressState>,
    cards: BTreeMap<String, ReviewCard>,
}

#[derive(Debug, Default)]
pub struct InMemoryStore {
    learners: RwLock<HashMap<String, LearnerRecord>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn version(&self, learner_id: &str) -> u64 {
        self.learners
            .read()
            .get(learner_id)
            .map(|record| record.version)
            .unwrap_or(0)
    }

    pub fn learner_count(&self) -> usize {
        self.learners.read().len()
    }
}

impl LearnerStore for InMemoryStore {
    fn progress(&self, learner_id: &str) -> EngineResult<Versioned<LearnerProgressState>> {
        let learners = self.learners.read();
        let record = learners.get(learner_id);
        Ok(Versioned {
            value: record
                .and_then(|r| r.progress.clone())
                .unwrap_or_else(|| LearnerProgressState::new(learner_id)),
            version: record.map(|r| r.version).unwrap_or(0),
        })
    }

    fn card(&self, learner_id: &str, question_id: &str) -> EngineResult<Option<ReviewCard>> {
        Ok(self
            .learners
            .read()
            .get(learner_id)
            .and_then(|record| record.cards.get(question_id).cloned()))
    }

    fn cards(&self, learner_id: &str) -> EngineResult<Vec<ReviewCard>> {
        Ok(self
            .learners
            .read()
            .get(learner_id)
            .map(|record| record.cards.values().cloned().collect())
            .unwrap_or_default())
    }

    fn commit(&self, commit: LearnerCommit) -> EngineResult<u64> {
        if commit.progress.learner_id != commit.learner_id {
            return Err(EngineError::InvalidReference(format!(
                "progress for {} committed under learner {}",
                commit.progress.learner_id, commit.learner_id
            )));
        }
        if let Some(card) = commit.cards.iter().find(|c| c.learner_id != commit.learner_id) {
            return Err(EngineError::InvalidReference(format!(
                "card {} belongs to learner {}, not {}",
                card.question_id, card.learner_id, commit.learner_id
            )));
        }

        let mut learners = self.learners.write();
        let record = learners.entry(commit.learner_id.clone()).or_default();
        if record.version != commit.expected_version {
            return Err(EngineError::PersistenceConflict {
                learner_id: commit.learner_id,
                expected: commit.expected_version,
                actual: record.version,
            });
        }

        record.version += 1;
        record.progress = Some(commit.progress);
        for card in commit.cards {
            record.cards.insert(card.question_id.clone(), card);
        }
        Ok(record.version)
    }
}
