use std::collections::HashMap;

use crate::model::PredictiveModel;
use crate::types::{ItemId, UserId, NAIVE_DEFAULT_PREDICTION};

/// Mean correctness of each item over everybody who answered it.
#[derive(Debug, Clone, Default)]
pub struct NaiveModel {
    means: HashMap<ItemId, f64>,
    answers: HashMap<ItemId, u32>,
}

impl NaiveModel {
    pub fn new() -> Self {
        Self::default()
    }
}

impl PredictiveModel for NaiveModel {
    fn predict(&mut self, _user: UserId, item: ItemId) -> f64 {
        self.means
            .get(&item)
            .copied()
            .unwrap_or(NAIVE_DEFAULT_PREDICTION)
    }

    fn update(&mut self, _user: UserId, item: ItemId, correct: bool) {
        let n = self.answers.entry(item).or_insert(0);
        *n += 1;
        let n = f64::from(*n);
        let mean = self.means.entry(item).or_insert(0.0);
        let actual = if correct { 1.0 } else { 0.0 };
        *mean = ((n - 1.0) * *mean + actual) / n;
    }

    fn reset(&mut self) {
        self.means.clear();
        self.answers.clear();
    }

    fn describe(&self) -> String {
        "naive".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unseen_item_is_coin_flip() {
        let mut model = NaiveModel::new();
        assert_eq!(model.predict(0, 7), 0.5);
    }

    #[test]
    fn test_exact_running_mean_across_users() {
        let mut model = NaiveModel::new();
        model.update(0, 1, true);
        model.update(1, 1, false);
        model.update(2, 1, true);
        assert!((model.predict(9, 1) - 2.0 / 3.0).abs() < 1e-12);
        assert_eq!(model.predict(9, 2), 0.5);
    }

    #[test]
    fn test_first_answer_replaces_default() {
        let mut model = NaiveModel::new();
        model.update(0, 1, false);
        assert_eq!(model.predict(0, 1), 0.0);
    }
}
