use std::collections::HashMap;

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Normal};

use crate::error::{Result, SimError};
use crate::types::{ItemId, UserId};

/// Gaussian offset per (user, item), drawn on first request and then fixed.
#[derive(Debug, Clone)]
pub struct PersistentNoise {
    std: f64,
    seed: u64,
    normal: Normal<f64>,
    rng: ChaCha8Rng,
    offsets: HashMap<(UserId, ItemId), f64>,
}

impl PersistentNoise {
    pub fn new(std: f64, seed: u64) -> Result<Self> {
        if !(std.is_finite() && std >= 0.0) {
            return Err(SimError::Config(format!(
                "noise std must be finite and non-negative, got {std}"
            )));
        }
        let normal = Normal::new(0.0, std).map_err(|e| {
            SimError::Config(format!("noise std {std} is not a valid deviation: {e}"))
        })?;
        Ok(Self {
            std,
            seed,
            normal,
            rng: ChaCha8Rng::seed_from_u64(seed),
            offsets: HashMap::new(),
        })
    }

    pub fn std(&self) -> f64 {
        self.std
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    pub fn offset(&mut self, user: UserId, item: ItemId) -> f64 {
        if self.std == 0.0 {
            return 0.0;
        }
        let normal = &self.normal;
        let rng = &mut self.rng;
        *self
            .offsets
            .entry((user, item))
            .or_insert_with(|| normal.sample(rng))
    }
}
