use serde::{Deserialize, Serialize};

use crate::types::DifficultyTier;

const HARD_SEED_ACCURACY: f64 = 0.90;
const MEDIUM_SEED_ACCURACY: f64 = 0.75;
const PROMOTE_TO_HARD_STREAK: u32 = 2;

/// Maps a learner's historical topic accuracy (0..=1, `None` when there is no
/// history) to the tier of the first question of a session.
pub trait SeedPolicy: Send + Sync {
    fn seed(&self, accuracy: Option<f64>) -> DifficultyTier;
}

impl<F> SeedPolicy for F
where
    F: Fn(Option<f64>) -> DifficultyTier + Send + Sync,
{
    fn seed(&self, accuracy: Option<f64>) -> DifficultyTier {
        self(accuracy)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeedBand {
    pub min_accuracy: f64,
    pub tier: DifficultyTier,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ThresholdSeed {
    pub bands: Vec<SeedBand>,
    pub below_bands: DifficultyTier,
    pub no_history: DifficultyTier,
}

impl Default for ThresholdSeed {
    fn default() -> Self {
        Self {
            bands: vec![
                SeedBand {
                    min_accuracy: HARD_SEED_ACCURACY,
                    tier: DifficultyTier::Hard,
                },
                SeedBand {
                    min_accuracy: MEDIUM_SEED_ACCURACY,
                    tier: DifficultyTier::Medium,
                },
            ],
            below_bands: DifficultyTier::Easy,
            no_history: DifficultyTier::Easy,
        }
    }
}

impl SeedPolicy for ThresholdSeed {
    fn seed(&self, accuracy: Option<f64>) -> DifficultyTier {
        let Some(accuracy) = accuracy.filter(|a| a.is_finite()) else {
            return self.no_history;
        };
        self.bands
            .iter()
            .filter(|band| accuracy >= band.min_accuracy)
            .max_by(|a, b| a.min_accuracy.total_cmp(&b.min_accuracy))
            .map(|band| band.tier)
            .unwrap_or(self.below_bands)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DifficultyConfig {
    pub seed: ThresholdSeed,
    /// In-session correct streak needed to move from Medium to Hard.
    pub promote_streak: u32,
}

impl Default for DifficultyConfig {
    fn default() -> Self {
        Self {
            seed: ThresholdSeed::default(),
            promote_streak: PROMOTE_TO_HARD_STREAK,
        }
    }
}

/// Next tier from the current tier, the last answer and the in-session
/// correct streak counted after that answer.
pub fn next_tier(
    current: DifficultyTier,
    correct: bool,
    streak: u32,
    promote_streak: u32,
) -> DifficultyTier {
    match (current, correct) {
        (DifficultyTier::Easy, true) => DifficultyTier::Medium,
        (DifficultyTier::Medium, true) if streak >= promote_streak => DifficultyTier::Hard,
        (DifficultyTier::Medium, true) => DifficultyTier::Medium,
        (DifficultyTier::Hard, true) => DifficultyTier::Hard,
        (tier, false) => tier.easier(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DifficultyPolicy {
    tier: DifficultyTier,
    promote_streak: u32,
}

impl DifficultyPolicy {
    pub fn new(seed: DifficultyTier, promote_streak: u32) -> Self {
        Self {
            tier: seed,
            promote_streak,
        }
    }

    pub fn seeded(config: &DifficultyConfig, seed: &dyn SeedPolicy, accuracy: Option<f64>) -> Self {
        Self::new(seed.seed(accuracy), config.promote_streak)
    }

    pub fn tier(&self) -> DifficultyTier {
        self.tier
    }

    pub fn peek(&self, correct: bool, streak: u32) -> DifficultyTier {
        next_tier(self.tier, correct, streak, self.promote_streak)
    }

    pub fn transition(&mut self, correct: bool, streak: u32) -> DifficultyTier {
        self.tier = self.peek(correct, streak);
        self.tier
    }
}
