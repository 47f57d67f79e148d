use std::rc::Rc;

use crate::error::Result;
use crate::model::{sigmoid, PersistentNoise, PredictiveModel};
use crate::scenario::Population;
use crate::types::{ItemId, UserId};

/// Ground truth: `sigmoid(skill[user][cluster(item)] - difficulty[item] + noise)`.
///
/// Never learns. With noise configured, each (user, item) pair keeps the
/// offset drawn the first time it was predicted.
#[derive(Debug, Clone)]
pub struct OptimalModel {
    population: Rc<Population>,
    noise: Option<PersistentNoise>,
}

impl OptimalModel {
    pub fn new(population: Rc<Population>) -> Self {
        Self {
            population,
            noise: None,
        }
    }

    pub fn with_noise(population: Rc<Population>, std: f64, seed: u64) -> Result<Self> {
        Ok(Self {
            population,
            noise: Some(PersistentNoise::new(std, seed)?),
        })
    }

    pub fn population(&self) -> &Rc<Population> {
        &self.population
    }

    /// Logit of the noiseless prediction.
    pub fn logit(&self, user: UserId, item: ItemId) -> f64 {
        let cluster = self.population.cluster_of(item);
        self.population.skill(user, cluster) - self.population.difficulty(item)
    }
}

impl PredictiveModel for OptimalModel {
    fn predict(&mut self, user: UserId, item: ItemId) -> f64 {
        let noise = match self.noise.as_mut() {
            Some(noise) => noise.offset(user, item),
            None => 0.0,
        };
        sigmoid(self.logit(user, item) + noise)
    }

    fn update(&mut self, _user: UserId, _item: ItemId, _correct: bool) {}

    fn reset(&mut self) {}

    fn describe(&self) -> String {
        match &self.noise {
            Some(noise) if noise.std() > 0.0 => format!(
                "optimal, noise: {}, seed: {}",
                noise.std(),
                noise.seed()
            ),
            _ => "optimal".to_string(),
        }
    }
}
