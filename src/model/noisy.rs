use crate::error::Result;
use crate::model::{PersistentNoise, PredictiveModel};
use crate::types::{ItemId, UserId};

/// Adds a fixed Gaussian offset per (user, item) to another model's prediction.
///
/// Offsets survive `reset`; only the inner model forgets.
pub struct NoisyModel {
    inner: Box<dyn PredictiveModel>,
    noise: PersistentNoise,
}

impl NoisyModel {
    pub fn new(inner: Box<dyn PredictiveModel>, std: f64, seed: u64) -> Result<Self> {
        Ok(Self {
            inner,
            noise: PersistentNoise::new(std, seed)?,
        })
    }
}

impl PredictiveModel for NoisyModel {
    fn predict(&mut self, user: UserId, item: ItemId) -> f64 {
        let offset = self.noise.offset(user, item);
        (self.inner.predict(user, item) + offset).clamp(0.0, 1.0)
    }

    fn update(&mut self, user: UserId, item: ItemId, correct: bool) {
        self.inner.update(user, item, correct);
    }

    fn reset(&mut self) {
        self.inner.reset();
    }

    fn describe(&self) -> String {
        format!(
            "noisy({}), std: {}, seed: {}",
            self.inner.describe(),
            self.noise.std(),
            self.noise.seed()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConstantModel, NaiveModel};

    #[test]
    fn test_noise_fixed_per_pair_and_clamped() {
        let mut model = NoisyModel::new(Box::new(ConstantModel::new(0.5)), 2.0, 17).unwrap();
        for user in 0..5 {
            for item in 0..5 {
                let p = model.predict(user, item);
                assert!((0.0..=1.0).contains(&p));
                assert_eq!(model.predict(user, item), p);
            }
        }
    }

    #[test]
    fn test_delegates_learning() {
        let mut model = NoisyModel::new(Box::new(NaiveModel::new()), 0.0, 1).unwrap();
        model.update(0, 0, true);
        assert_eq!(model.predict(1, 0), 1.0);
        model.reset();
        assert_eq!(model.predict(1, 0), 0.5);
    }

    #[test]
    fn test_offsets_survive_reset() {
        let mut model = NoisyModel::new(Box::new(ConstantModel::new(0.5)), 0.1, 4).unwrap();
        let before = model.predict(2, 3);
        model.reset();
        assert_eq!(model.predict(2, 3), before);
    }

    #[test]
    fn test_negative_std_rejected() {
        assert!(NoisyModel::new(Box::new(ConstantModel::new(0.5)), -0.1, 4).is_err());
    }

    #[test]
    fn test_describe_wraps_inner() {
        let model = NoisyModel::new(Box::new(ConstantModel::new(0.5)), 0.1, 4).unwrap();
        assert_eq!(model.describe(), "noisy(constant: 0.5), std: 0.1, seed: 4");
    }
}
