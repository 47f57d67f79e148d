//! Elo with concepts
//!
//! Ratings live per (user, cluster) and per item, all starting at 0. After an
//! answer both ratings move by `step(n) * (correct - prediction)` in opposite
//! directions, where `n` counts the answers the rating had already absorbed:
//!
//! ```text
//! step(n) = alpha / (1 + dynamic_alpha * n)
//! ```
//!
//! Without a cluster map every item falls into cluster 0 and the model is the
//! classic two-population Elo.

use std::collections::{BTreeSet, HashMap};

use rand::seq::{index, SliceRandom};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::config::EloParams;
use crate::error::{Result, SimError};
use crate::model::{sigmoid, PredictiveModel};
use crate::types::{ClusterId, Clusters, ItemId, UserId};

/// Rating key of a user within one skill dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct UserCluster {
    pub user: UserId,
    pub cluster: ClusterId,
}

#[derive(Debug, Clone)]
pub struct EloModel {
    params: EloParams,
    clusters: Clusters,
    number_of_clusters: usize,
    wrong_clusters: usize,
    user_ratings: HashMap<UserCluster, f64>,
    item_ratings: HashMap<ItemId, f64>,
    user_answers: HashMap<UserCluster, u32>,
    item_answers: HashMap<ItemId, u32>,
}

impl EloModel {
    /// Single implicit cluster.
    pub fn new(params: EloParams) -> Self {
        Self::with_clusters(params, Clusters::new())
    }

    pub fn with_clusters(params: EloParams, clusters: Clusters) -> Self {
        let distinct: BTreeSet<ClusterId> = clusters.values().copied().collect();
        Self {
            params,
            number_of_clusters: distinct.len().max(1),
            clusters,
            wrong_clusters: 0,
            user_ratings: HashMap::new(),
            item_ratings: HashMap::new(),
            user_answers: HashMap::new(),
            item_answers: HashMap::new(),
        }
    }

    /// Moves exactly `count` items to a wrong cluster.
    ///
    /// Only items whose current cluster is in `eligible` are sampled, and the
    /// replacement is drawn uniformly from the other eligible clusters. The
    /// same `seed` always corrupts the same items the same way.
    pub fn with_wrong_clusters(
        mut self,
        count: usize,
        eligible: &[ClusterId],
        seed: u64,
    ) -> Result<Self> {
        if count == 0 {
            return Ok(self);
        }
        let eligible: BTreeSet<ClusterId> = eligible.iter().copied().collect();
        if eligible.len() < 2 {
            return Err(SimError::Config(format!(
                "cannot move items to a wrong cluster with {} eligible cluster(s)",
                eligible.len()
            )));
        }
        let candidates: Vec<ItemId> = self
            .clusters
            .iter()
            .filter(|(_, cluster)| eligible.contains(cluster))
            .map(|(&item, _)| item)
            .collect();
        if count > candidates.len() {
            return Err(SimError::Config(format!(
                "{count} wrong-cluster items requested but only {} items sit in eligible clusters",
                candidates.len()
            )));
        }

        let eligible: Vec<ClusterId> = eligible.into_iter().collect();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);
        for idx in index::sample(&mut rng, candidates.len(), count).into_iter() {
            let item = candidates[idx];
            let current = self.clusters.get(&item).copied().unwrap_or(0);
            let others: Vec<ClusterId> =
                eligible.iter().copied().filter(|&c| c != current).collect();
            if let Some(&wrong) = others.choose(&mut rng) {
                self.clusters.insert(item, wrong);
            }
        }
        self.wrong_clusters = count;
        Ok(self)
    }

    pub fn clusters(&self) -> &Clusters {
        &self.clusters
    }

    pub fn cluster_of(&self, item: ItemId) -> ClusterId {
        self.clusters.get(&item).copied().unwrap_or(0)
    }

    pub fn user_rating(&self, user: UserId, cluster: ClusterId) -> f64 {
        self.user_ratings
            .get(&UserCluster { user, cluster })
            .copied()
            .unwrap_or(0.0)
    }

    pub fn item_rating(&self, item: ItemId) -> f64 {
        self.item_ratings.get(&item).copied().unwrap_or(0.0)
    }

    pub fn user_answers(&self, user: UserId, cluster: ClusterId) -> u32 {
        self.user_answers
            .get(&UserCluster { user, cluster })
            .copied()
            .unwrap_or(0)
    }

    pub fn item_answers(&self, item: ItemId) -> u32 {
        self.item_answers.get(&item).copied().unwrap_or(0)
    }

    fn step(&self, answers: u32) -> f64 {
        self.params.alpha / (1.0 + self.params.dynamic_alpha * f64::from(answers))
    }
}

impl PredictiveModel for EloModel {
    fn predict(&mut self, user: UserId, item: ItemId) -> f64 {
        let cluster = self.cluster_of(item);
        sigmoid(self.user_rating(user, cluster) - self.item_rating(item))
    }

    fn update(&mut self, user: UserId, item: ItemId, correct: bool) {
        let key = UserCluster {
            user,
            cluster: self.cluster_of(item),
        };
        let prediction = self.predict(user, item);
        let actual = if correct { 1.0 } else { 0.0 };
        let error = actual - prediction;

        let user_before = self.user_answers(key.user, key.cluster);
        let item_before = self.item_answers(item);
        self.user_answers.insert(key, user_before + 1);
        self.item_answers.insert(item, item_before + 1);

        let user_step = self.step(user_before);
        let item_step = self.step(item_before);
        *self.user_ratings.entry(key).or_insert(0.0) += user_step * error;
        *self.item_ratings.entry(item).or_insert(0.0) -= item_step * error;
    }

    fn reset(&mut self) {
        self.user_ratings.clear();
        self.item_ratings.clear();
        self.user_answers.clear();
        self.item_answers.clear();
    }

    fn describe(&self) -> String {
        format!(
            "elo, alpha: {}, dynamic alpha: {}, clusters: {}, wrong clusters: {}",
            self.params.alpha, self.params.dynamic_alpha, self.number_of_clusters, self.wrong_clusters
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clusters(n_items: u32, n_clusters: u32) -> Clusters {
        (0..n_items).map(|i| (i, i % n_clusters)).collect()
    }

    #[test]
    fn test_correct_answer_moves_ratings_apart() {
        let mut model = EloModel::new(EloParams::plain());
        model.update(0, 0, true);
        assert!(model.user_rating(0, 0) > 0.0);
        assert!(model.item_rating(0) < 0.0);
        assert!(model.predict(0, 0) > 0.5);
    }

    #[test]
    fn test_wrong_answer_moves_ratings_apart() {
        let mut model = EloModel::new(EloParams::plain());
        model.update(0, 0, false);
        assert!(model.user_rating(0, 0) < 0.0);
        assert!(model.item_rating(0) > 0.0);
    }

    #[test]
    fn test_first_update_uses_full_alpha() {
        let params = EloParams {
            alpha: 0.8,
            dynamic_alpha: 0.05,
        };
        let mut model = EloModel::new(params);
        model.update(0, 0, true);
        assert!((model.user_rating(0, 0) - 0.4).abs() < 1e-12);
        assert!((model.item_rating(0) + 0.4).abs() < 1e-12);

        // second answer of the same user on a fresh item: user step shrinks, item step does not
        let before_user = model.user_rating(0, 0);
        let p = model.predict(0, 1);
        model.update(0, 1, true);
        let user_step = 0.8 / (1.0 + 0.05);
        assert!((model.user_rating(0, 0) - (before_user + user_step * (1.0 - p))).abs() < 1e-12);
        assert!((model.item_rating(1) + 0.8 * (1.0 - p)).abs() < 1e-12);
    }

    #[test]
    fn test_counters_are_independent() {
        let mut model = EloModel::with_clusters(EloParams::clustered(), clusters(4, 2));
        model.update(0, 0, true);
        model.update(0, 2, true);
        model.update(1, 0, false);
        assert_eq!(model.user_answers(0, 0), 2);
        assert_eq!(model.user_answers(0, 1), 0);
        assert_eq!(model.user_answers(1, 0), 1);
        assert_eq!(model.item_answers(0), 2);
        assert_eq!(model.item_answers(2), 1);
    }

    #[test]
    fn test_clusters_separate_user_ratings() {
        let mut model = EloModel::with_clusters(EloParams::clustered(), clusters(4, 2));
        model.update(0, 0, true);
        assert!(model.user_rating(0, 0) > 0.0);
        assert_eq!(model.user_rating(0, 1), 0.0);
        assert_eq!(model.predict(0, 1), 0.5);
    }

    #[test]
    fn test_reset_forgets() {
        let mut model = EloModel::new(EloParams::plain());
        model.update(3, 4, true);
        model.reset();
        model.reset();
        assert_eq!(model.predict(3, 4), 0.5);
        assert_eq!(model.item_answers(4), 0);
    }

    #[test]
    fn test_wrong_clusters_exact_count_and_reproducible() {
        let base = clusters(30, 3);
        let a = EloModel::with_clusters(EloParams::clustered(), base.clone())
            .with_wrong_clusters(7, &[0, 1, 2], 1234)
            .unwrap();
        let b = EloModel::with_clusters(EloParams::clustered(), base.clone())
            .with_wrong_clusters(7, &[0, 1, 2], 1234)
            .unwrap();
        assert_eq!(a.clusters(), b.clusters());
        let moved = base
            .iter()
            .filter(|(item, cluster)| a.clusters()[item] != **cluster)
            .count();
        assert_eq!(moved, 7);
    }

    #[test]
    fn test_wrong_clusters_only_touch_eligible_items() {
        let base = clusters(30, 3);
        let model = EloModel::with_clusters(EloParams::clustered(), base.clone())
            .with_wrong_clusters(5, &[1, 2], 99)
            .unwrap();
        for (item, cluster) in &base {
            if *cluster == 0 {
                assert_eq!(model.clusters()[item], 0);
            } else {
                assert_ne!(model.clusters()[item], 0);
            }
        }
    }

    #[test]
    fn test_wrong_clusters_rejects_impossible_requests() {
        let base = clusters(6, 3);
        assert!(EloModel::with_clusters(EloParams::clustered(), base.clone())
            .with_wrong_clusters(5, &[1, 2], 1)
            .is_err());
        assert!(EloModel::with_clusters(EloParams::clustered(), base)
            .with_wrong_clusters(1, &[1], 1)
            .is_err());
    }

    #[test]
    fn test_describe_encodes_configuration() {
        let plain = EloModel::new(EloParams::plain());
        let same = EloModel::new(EloParams::plain());
        let clustered = EloModel::with_clusters(EloParams::plain(), clusters(6, 3));
        let wrong = EloModel::with_clusters(EloParams::plain(), clusters(6, 3))
            .with_wrong_clusters(2, &[0, 1, 2], 5)
            .unwrap();
        assert_eq!(plain.describe(), same.describe());
        assert_ne!(plain.describe(), clustered.describe());
        assert_ne!(clustered.describe(), wrong.describe());
        assert_ne!(
            plain.describe(),
            EloModel::new(EloParams::clustered()).describe()
        );

        let close = EloModel::new(EloParams {
            alpha: 0.8004,
            dynamic_alpha: 0.05,
        });
        assert_ne!(plain.describe(), close.describe());
        assert_eq!(
            plain.describe(),
            "elo, alpha: 0.8, dynamic alpha: 0.05, clusters: 1, wrong clusters: 0"
        );
    }
}
