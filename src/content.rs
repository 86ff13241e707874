use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::services::review::ReviewCard;
use crate::types::DifficultyTier;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOption {
    pub id: String,
    pub text: String,
    pub correct: bool,
}

impl AnswerOption {
    pub fn new(id: impl Into<String>, text: impl Into<String>, correct: bool) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            correct,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub topic_id: String,
    pub tier: DifficultyTier,
    #[serde(default)]
    pub prompt: String,
    pub options: Vec<AnswerOption>,
}

impl Question {
    pub fn option(&self, option_id: &str) -> Option<&AnswerOption> {
        self.options.iter().find(|o| o.id == option_id)
    }

    pub fn correct_option(&self) -> Option<&AnswerOption> {
        self.options.iter().find(|o| o.correct)
    }

    pub fn presented(&self) -> PresentedQuestion {
        PresentedQuestion {
            id: self.id.clone(),
            topic_id: self.topic_id.clone(),
            tier: self.tier,
            prompt: self.prompt.clone(),
            options: self
                .options
                .iter()
                .map(|o| PresentedOption {
                    id: o.id.clone(),
                    text: o.text.clone(),
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentedOption {
    pub id: String,
    pub text: String,
}

/// A question as shown to the learner, without correctness flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PresentedQuestion {
    pub id: String,
    pub topic_id: String,
    pub tier: DifficultyTier,
    pub prompt: String,
    pub options: Vec<PresentedOption>,
}

pub trait QuestionPool: Send + Sync {
    fn question(&self, question_id: &str) -> Option<Question>;

    /// `None` for an unknown topic. A known topic may have no questions.
    fn topic_questions(&self, topic_id: &str) -> Option<Vec<Question>>;
}

/// Historical accuracy of a learner on a topic, in 0..=1.
pub trait TopicAccuracy: Send + Sync {
    fn accuracy(&self, learner_id: &str, topic_id: &str) -> Option<f64>;
}

/// Orders the non-review part of a session. `cards` holds the learner's
/// existing cards keyed by question id.
pub trait QuestionOrdering: Send + Sync {
    fn order(&self, questions: Vec<Question>, cards: &HashMap<String, ReviewCard>) -> Vec<Question>;
}

/// Questions the learner has never seen keep their pool order and come
/// first; seen ones follow, soonest due first, then lowest ease.
#[derive(Debug, Clone, Copy, Default)]
pub struct UnseenFirst;

impl QuestionOrdering for UnseenFirst {
    fn order(
        &self,
        questions: Vec<Question>,
        cards: &HashMap<String, ReviewCard>,
    ) -> Vec<Question> {
        let (unseen, mut seen): (Vec<_>, Vec<_>) = questions
            .into_iter()
            .partition(|q| !cards.contains_key(&q.id));
        seen.sort_by(|a, b| match (cards.get(&a.id), cards.get(&b.id)) {
            (Some(ca), Some(cb)) => ca
                .due_at
                .cmp(&cb.due_at)
                .then_with(|| ca.ease_factor.total_cmp(&cb.ease_factor)),
            _ => std::cmp::Ordering::Equal,
        });
        unseen.into_iter().chain(seen).collect()
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticQuestionPool {
    questions: HashMap<String, Question>,
    topics: BTreeMap<String, Vec<String>>,
}

impl StaticQuestionPool {
    pub fn new(questions: impl IntoIterator<Item = Question>) -> Self {
        let mut pool = Self::default();
        for question in questions {
            pool.insert(question);
        }
        pool
    }

    /// Registers a topic even if no question belongs to it yet.
    pub fn with_topic(mut self, topic_id: impl Into<String>) -> Self {
        self.topics.entry(topic_id.into()).or_default();
        self
    }

    pub fn insert(&mut self, question: Question) {
        let ids = self.topics.entry(question.topic_id.clone()).or_default();
        if !ids.contains(&question.id) {
            ids.push(question.id.clone());
        }
        self.questions.insert(question.id.clone(), question);
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}

impl QuestionPool for StaticQuestionPool {
    fn question(&self, question_id: &str) -> Option<Question> {
        self.questions.get(question_id).cloned()
    }

    fn topic_questions(&self, topic_id: &str) -> Option<Vec<Question>> {
        self.topics.get(topic_id).map(|ids| {
            ids.iter()
                .filter_map(|id| self.questions.get(id))
                .filter(|q| q.topic_id == topic_id)
                .cloned()
                .collect()
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct StaticAccuracy {
    by_learner_topic: HashMap<(String, String), f64>,
}

impl StaticAccuracy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(
        mut self,
        learner_id: impl Into<String>,
        topic_id: impl Into<String>,
        accuracy: f64,
    ) -> Self {
        self.by_learner_topic
            .insert((learner_id.into(), topic_id.into()), accuracy);
        self
    }
}

impl TopicAccuracy for StaticAccuracy {
    fn accuracy(&self, learner_id: &str, topic_id: &str) -> Option<f64> {
        self.by_learner_topic
            .get(&(learner_id.to_string(), topic_id.to_string()))
            .copied()
    }
}
