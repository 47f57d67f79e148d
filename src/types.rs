//! Common Types and Constants
//!
//! Identifiers and records shared by models, simulators and the scenario.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ==================== Identifiers ====================

/// Synthetic user id in `[0, number_of_users)`
pub type UserId = u32;

/// Synthetic item id in `[0, number_of_items)`
pub type ItemId = u32;

/// Latent skill dimension an item belongs to
pub type ClusterId = u32;

// ==================== Constants ====================

/// Lower bound of the recommendation score normalizer
pub const MIN_SCORE_NORMALIZER: f64 = 1e-3;

/// Prediction of the naive model for an item nobody answered yet
pub const NAIVE_DEFAULT_PREDICTION: f64 = 0.5;

/// Length of the configuration hash prefix used in cache file names
pub const CONFIG_HASH_PREFIX: usize = 10;

// ==================== Population ====================

/// Per-user latent skill, one value per cluster
pub type Skills = BTreeMap<UserId, Vec<f64>>;

/// Per-item difficulty
pub type Difficulties = BTreeMap<ItemId, f64>;

/// Item to cluster assignment
pub type Clusters = BTreeMap<ItemId, ClusterId>;

/// Which generated population a simulator runs on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Test,
    Train,
}

impl Split {
    pub fn is_train(self) -> bool {
        matches!(self, Split::Train)
    }
}

// ==================== Practice ====================

/// One answered item inside a practice trace
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PracticeEvent {
    pub item: ItemId,
    /// Prediction of the simulated model at the moment the item was chosen
    pub predicted: f64,
    pub correct: bool,
    /// Prediction of the ground-truth model
    pub true_probability: f64,
}

impl PracticeEvent {
    pub fn outcome(&self) -> f64 {
        if self.correct {
            1.0
        } else {
            0.0
        }
    }
}

/// Ordered practice events per user
pub type Practice = BTreeMap<UserId, Vec<PracticeEvent>>;

/// Mean and population standard deviation across users
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct MeanStd {
    pub mean: f64,
    pub std: f64,
}
