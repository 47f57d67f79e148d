use crate::model::PredictiveModel;
use crate::types::{ItemId, UserId};

/// Same prediction for every user and item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConstantModel {
    constant: f64,
}

impl ConstantModel {
    pub fn new(constant: f64) -> Self {
        Self { constant }
    }
}

impl PredictiveModel for ConstantModel {
    fn predict(&mut self, _user: UserId, _item: ItemId) -> f64 {
        self.constant
    }

    fn update(&mut self, _user: UserId, _item: ItemId, _correct: bool) {}

    fn reset(&mut self) {}

    fn describe(&self) -> String {
        format!("constant: {}", self.constant)
    }
}
