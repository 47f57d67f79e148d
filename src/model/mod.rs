//! Predictive Models
//!
//! Every model answers one question: how likely is `user` to answer `item`
//! correctly right now. Learning models fold observed answers back in through
//! [`PredictiveModel::update`].
//!
//! Variants:
//! - [`OptimalModel`] - ground truth computed from the generated population
//! - [`EloModel`] - online ratings per (user, cluster) and per item
//! - [`NaiveModel`] - running mean correctness per item
//! - [`ConstantModel`] - a fixed prediction
//! - [`NoisyModel`] - memoized Gaussian noise on top of another model

mod constant;
mod elo;
mod naive;
mod noise;
mod noisy;
mod optimal;

pub use constant::ConstantModel;
pub use elo::{EloModel, UserCluster};
pub use naive::NaiveModel;
pub use noise::PersistentNoise;
pub use noisy::NoisyModel;
pub use optimal::OptimalModel;

use crate::types::{ItemId, UserId};

/// Common contract of all student models.
///
/// `predict` takes `&mut self`: noise-carrying models draw and memoize an
/// offset the first time a (user, item) pair is requested.
pub trait PredictiveModel {
    /// Probability of a correct answer.
    fn predict(&mut self, user: UserId, item: ItemId) -> f64;

    /// Records an observed answer.
    fn update(&mut self, user: UserId, item: ItemId, correct: bool);

    /// Forgets everything learned. Must be idempotent.
    fn reset(&mut self);

    /// Identity string encoding the whole configuration; used as a cache key.
    fn describe(&self) -> String;
}

impl<M: PredictiveModel + ?Sized> PredictiveModel for Box<M> {
    fn predict(&mut self, user: UserId, item: ItemId) -> f64 {
        (**self).predict(user, item)
    }

    fn update(&mut self, user: UserId, item: ItemId, correct: bool) {
        (**self).update(user, item, correct)
    }

    fn reset(&mut self) {
        (**self).reset()
    }

    fn describe(&self) -> String {
        (**self).describe()
    }
}

/// Logistic function
pub fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Inverse of [`sigmoid`] on `(0, 1)`
pub fn logit(p: f64) -> f64 {
    (p / (1.0 - p)).ln()
}
