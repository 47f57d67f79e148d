//! Practice Simulator
//!
//! Drives one candidate model through a practice sequence for every synthetic
//! user. At each step the model predicts every unpracticed item, the
//! recommender picks one, the ground-truth model decides the outcome and the
//! candidate model learns from it.
//!
//! The trace is produced at most once per instance: it is either loaded from
//! the cache directory or simulated on first request, and never touched
//! afterwards. Statistics derived from it are memoized by their parameters.
//! Caches use interior mutability, so a simulator can be shared through `Rc`
//! and queried through `&self`, but it is not `Sync`.

mod persistence;
mod stats;

pub use stats::SimulatorStats;

use std::cell::{Cell, OnceCell, RefCell};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use tracing::{debug, info};

use crate::config::validate_probability;
use crate::error::{Result, SimError};
use crate::identity::digest_hex;
use crate::model::{OptimalModel, PredictiveModel};
use crate::recommend::recommend;
use crate::scenario::Scenario;
use crate::stats::{mean_std, rmse};
use crate::types::{ItemId, MeanStd, Practice, PracticeEvent, Split, UserId};

// ==================== Options ====================

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SimulatorOptions {
    pub practice_length: usize,
    pub target_probability: f64,
    pub split: Split,
}

impl SimulatorOptions {
    /// Practice length and target probability of the scenario, test split.
    pub fn from_scenario(scenario: &Scenario) -> Self {
        Self {
            practice_length: scenario.practice_length(),
            target_probability: scenario.target_probability(),
            split: Split::Test,
        }
    }

    pub fn with_practice_length(mut self, practice_length: usize) -> Self {
        self.practice_length = practice_length;
        self
    }

    pub fn with_target_probability(mut self, target_probability: f64) -> Self {
        self.target_probability = target_probability;
        self
    }

    pub fn with_split(mut self, split: Split) -> Self {
        self.split = split;
        self
    }
}

// ==================== Simulator ====================

pub struct Simulator {
    description: String,
    hash: String,
    options: SimulatorOptions,
    users: Vec<UserId>,
    items: Vec<ItemId>,
    ground_truth: RefCell<OptimalModel>,
    model: RefCell<Box<dyn PredictiveModel>>,
    rng: RefCell<ChaCha8Rng>,
    practice: OnceCell<Practice>,
    stats: RefCell<SimulatorStats>,
    directory: Option<PathBuf>,
    stats_loaded: Cell<bool>,
    /// Trace file holding exactly the in-memory trace, once known.
    practice_source: RefCell<Option<PathBuf>>,
}

impl Simulator {
    /// Identity string of a simulator running `model_description` with `options`.
    pub fn identity(model_description: &str, options: &SimulatorOptions) -> String {
        format!(
            "simulator, model: {}, practice length: {}, train: {}, target prob: {:.2}",
            model_description,
            options.practice_length,
            options.split.is_train(),
            options.target_probability
        )
    }

    /// Fails when the practice length does not fit the population or the
    /// target is not a probability.
    pub fn new(
        ground_truth: OptimalModel,
        model: Box<dyn PredictiveModel>,
        options: SimulatorOptions,
        seed: u64,
    ) -> Result<Self> {
        let users = ground_truth.population().users();
        let items = ground_truth.population().items();
        if options.practice_length == 0 || options.practice_length > items.len() {
            return Err(SimError::Config(format!(
                "practice length {} must be within 1..={} (number of items)",
                options.practice_length,
                items.len()
            )));
        }
        validate_probability("target probability", options.target_probability)?;

        let description = Self::identity(&model.describe(), &options);
        let hash = digest_hex(&description);
        Ok(Self {
            description,
            hash,
            options,
            users,
            items,
            ground_truth: RefCell::new(ground_truth),
            model: RefCell::new(model),
            rng: RefCell::new(ChaCha8Rng::seed_from_u64(seed)),
            practice: OnceCell::new(),
            stats: RefCell::new(SimulatorStats::default()),
            directory: None,
            stats_loaded: Cell::new(false),
            practice_source: RefCell::new(None),
        })
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn options(&self) -> &SimulatorOptions {
        &self.options
    }

    pub fn practice_length(&self) -> usize {
        self.options.practice_length
    }

    pub fn model_description(&self) -> String {
        self.model.borrow().describe()
    }

    /// Whether a trace is already in memory.
    pub fn is_simulated(&self) -> bool {
        self.practice.get().is_some()
    }

    /// Snapshot of the memoized statistics.
    pub fn stats(&self) -> SimulatorStats {
        self.stats.borrow().clone()
    }

    /// Makes sure the trace exists; a no-op once it does.
    pub fn simulate(&self) -> Result<()> {
        self.practice().map(|_| ())
    }

    /// The practice trace, loaded from the cache directory or simulated on first use.
    pub fn practice(&self) -> Result<&Practice> {
        if let Some(practice) = self.practice.get() {
            return Ok(practice);
        }
        let practice = match self.load_practice()? {
            Some(practice) => practice,
            None => self.run(),
        };
        Ok(self.practice.get_or_init(|| practice))
    }

    /// `(user, item, correct)` for the first `horizon` events of every user.
    pub fn data(&self, horizon: Option<usize>) -> Result<Vec<(UserId, ItemId, bool)>> {
        let horizon = self.horizon(horizon)?;
        Ok(self
            .practice()?
            .iter()
            .flat_map(|(&user, events)| {
                events
                    .iter()
                    .take(horizon)
                    .map(move |e| (user, e.item, e.correct))
            })
            .collect())
    }

    /// RMSE of the recorded predictions against the outcomes of the first `horizon` events.
    pub fn rmse(&self, horizon: Option<usize>) -> Result<f64> {
        let horizon = self.horizon(horizon)?;
        if let Some(&value) = self.stats.borrow().rmse.get(&horizon) {
            return Ok(value);
        }
        let (predicted, actual): (Vec<f64>, Vec<f64>) = self
            .practice()?
            .values()
            .flat_map(|events| events.iter().take(horizon))
            .map(|e| (e.predicted, e.outcome()))
            .unzip();
        let value = rmse(&predicted, &actual);
        self.stats.borrow_mut().rmse.insert(horizon, value);
        debug!(simulator = %self.hash, horizon, rmse = value, "rmse computed");
        Ok(value)
    }

    /// Jaccard similarity of practiced item sets against `baseline`, per user.
    ///
    /// Two empty sets count as identical.
    pub fn jaccard(&self, horizon: Option<usize>, baseline: &Simulator) -> Result<MeanStd> {
        let horizon = self.horizon(horizon)?;
        let key = SimulatorStats::comparison_key(baseline.hash(), horizon);
        if let Some(&value) = self.stats.borrow().jaccard.get(&key) {
            return Ok(value);
        }
        let value = self.compare_item_sets(horizon, baseline, |ours, theirs| {
            let union = ours.union(theirs).count();
            if union == 0 {
                1.0
            } else {
                ours.intersection(theirs).count() as f64 / union as f64
            }
        })?;
        self.stats.borrow_mut().jaccard.insert(key, value);
        debug!(simulator = %self.hash, baseline = %baseline.hash(), horizon, mean = value.mean, "jaccard computed");
        Ok(value)
    }

    /// Size of the intersection of practiced item sets against `baseline`, per user.
    pub fn intersection(&self, horizon: Option<usize>, baseline: &Simulator) -> Result<MeanStd> {
        let horizon = self.horizon(horizon)?;
        let key = SimulatorStats::comparison_key(baseline.hash(), horizon);
        if let Some(&value) = self.stats.borrow().intersection.get(&key) {
            return Ok(value);
        }
        let value = self.compare_item_sets(horizon, baseline, |ours, theirs| {
            ours.intersection(theirs).count() as f64
        })?;
        self.stats.borrow_mut().intersection.insert(key, value);
        debug!(simulator = %self.hash, baseline = %baseline.hash(), horizon, mean = value.mean, "intersection computed");
        Ok(value)
    }

    /// RMSE of `model` when it is fed this simulator's trace instead of its own.
    ///
    /// The model is reset first, then predicts and learns event by event,
    /// users in ascending order.
    pub fn replay(&self, model: &mut dyn PredictiveModel) -> Result<f64> {
        let key = model.describe();
        if let Some(&value) = self.stats.borrow().replay.get(&key) {
            return Ok(value);
        }
        let practice = self.practice()?;
        model.reset();
        let mut predicted = Vec::new();
        let mut actual = Vec::new();
        for (&user, events) in practice {
            for event in events {
                predicted.push(model.predict(user, event.item));
                model.update(user, event.item, event.correct);
                actual.push(event.outcome());
            }
        }
        let value = rmse(&predicted, &actual);
        debug!(simulator = %self.hash, model = %key, rmse = value, "replay computed");
        self.stats.borrow_mut().replay.insert(key, value);
        Ok(value)
    }

    /// Number of answers per item over the whole trace, zero for unpracticed items.
    pub fn number_of_answers(&self) -> Result<BTreeMap<ItemId, u32>> {
        if let Some(counts) = self.stats.borrow().number_of_answers.clone() {
            return Ok(counts);
        }
        let mut counts: BTreeMap<ItemId, u32> = self.items.iter().map(|&i| (i, 0)).collect();
        for event in self.practice()?.values().flatten() {
            *counts.entry(event.item).or_insert(0) += 1;
        }
        self.stats.borrow_mut().number_of_answers = Some(counts.clone());
        Ok(counts)
    }

    fn horizon(&self, horizon: Option<usize>) -> Result<usize> {
        let max = self.options.practice_length;
        let horizon = horizon.unwrap_or(max);
        if horizon == 0 || horizon > max {
            return Err(SimError::Horizon { horizon, max });
        }
        Ok(horizon)
    }

    fn compare_item_sets(
        &self,
        horizon: usize,
        baseline: &Simulator,
        measure: impl Fn(&BTreeSet<ItemId>, &BTreeSet<ItemId>) -> f64,
    ) -> Result<MeanStd> {
        let ours = self.practice()?;
        let theirs = baseline.practice()?;
        let mut values = Vec::with_capacity(ours.len());
        for (user, events) in ours {
            let baseline_events = theirs
                .get(user)
                .ok_or(SimError::MismatchedTraces(*user))?;
            values.push(measure(
                &practiced_items(events, horizon),
                &practiced_items(baseline_events, horizon),
            ));
        }
        Ok(mean_std(&values))
    }

    fn run(&self) -> Practice {
        let mut model = self.model.borrow_mut();
        let mut ground_truth = self.ground_truth.borrow_mut();
        let mut rng = self.rng.borrow_mut();
        let target = self.options.target_probability;

        model.reset();
        let mut practice = Practice::new();
        for &user in &self.users {
            let mut pool: BTreeSet<ItemId> = self.items.iter().copied().collect();
            let mut events = Vec::with_capacity(self.options.practice_length);
            for _ in 0..self.options.practice_length {
                let predictions: BTreeMap<ItemId, f64> = pool
                    .iter()
                    .map(|&item| (item, model.predict(user, item)))
                    .collect();
                let Some(chosen) = recommend(&predictions, target, &mut *rng) else {
                    break;
                };
                let true_probability = ground_truth.predict(user, chosen);
                let correct = rng.gen::<f64>() < true_probability;
                model.update(user, chosen, correct);
                events.push(PracticeEvent {
                    item: chosen,
                    predicted: predictions[&chosen],
                    correct,
                    true_probability,
                });
                pool.remove(&chosen);
            }
            practice.insert(user, events);
        }
        info!(
            simulator = %self.description,
            users = practice.len(),
            practice_length = self.options.practice_length,
            "practice simulated"
        );
        practice
    }
}

fn practiced_items(events: &[PracticeEvent], horizon: usize) -> BTreeSet<ItemId> {
    events.iter().take(horizon).map(|e| e.item).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{ConstantModel, NaiveModel};
    use crate::scenario::Population;
    use crate::types::{Clusters, Difficulties, Skills};
    use std::rc::Rc;

    fn population(users: u32, items: u32) -> Rc<Population> {
        let skills: Skills = (0..users).map(|u| (u, vec![u as f64 * 0.5 - 0.5])).collect();
        let difficulties: Difficulties = (0..items).map(|i| (i, i as f64 * 0.3 - 1.0)).collect();
        let clusters: Clusters = (0..items).map(|i| (i, 0)).collect();
        Rc::new(Population::new(skills, difficulties, clusters))
    }

    fn options(practice_length: usize) -> SimulatorOptions {
        SimulatorOptions {
            practice_length,
            target_probability: 0.7,
            split: Split::Test,
        }
    }

    fn simulator(model: Box<dyn PredictiveModel>, practice_length: usize) -> Simulator {
        let truth = OptimalModel::new(population(3, 8));
        Simulator::new(truth, model, options(practice_length), 42).unwrap()
    }

    #[test]
    fn test_rejects_practice_longer_than_items() {
        let truth = OptimalModel::new(population(2, 3));
        let result = Simulator::new(truth, Box::new(NaiveModel::new()), options(4), 1);
        assert!(matches!(result, Err(SimError::Config(_))));
    }

    #[test]
    fn test_trace_has_no_repeats() {
        let sim = simulator(Box::new(NaiveModel::new()), 8);
        for events in sim.practice().unwrap().values() {
            let items: BTreeSet<ItemId> = events.iter().map(|e| e.item).collect();
            assert_eq!(events.len(), 8);
            assert_eq!(items.len(), 8);
        }
    }

    #[test]
    fn test_optimal_records_true_probability_as_prediction() {
        let truth = OptimalModel::new(population(3, 8));
        let model = OptimalModel::new(population(3, 8));
        let sim = Simulator::new(truth, Box::new(model), options(5), 7).unwrap();
        for event in sim.practice().unwrap().values().flatten() {
            assert_eq!(event.predicted, event.true_probability);
        }
    }

    #[test]
    fn test_simulate_is_idempotent() {
        let sim = simulator(Box::new(NaiveModel::new()), 4);
        let first = sim.practice().unwrap().clone();
        sim.simulate().unwrap();
        assert_eq!(sim.practice().unwrap(), &first);
    }

    #[test]
    fn test_rmse_memoized() {
        let sim = simulator(Box::new(ConstantModel::new(0.7)), 4);
        let first = sim.rmse(None).unwrap();
        assert_eq!(sim.rmse(Some(4)).unwrap(), first);
        assert_eq!(sim.stats().rmse.len(), 1);
    }

    #[test]
    fn test_horizon_bounds() {
        let sim = simulator(Box::new(ConstantModel::new(0.7)), 4);
        assert!(matches!(sim.rmse(Some(0)), Err(SimError::Horizon { .. })));
        assert!(matches!(sim.rmse(Some(5)), Err(SimError::Horizon { .. })));
    }

    #[test]
    fn test_jaccard_against_itself() {
        let sim = simulator(Box::new(NaiveModel::new()), 4);
        let value = sim.jaccard(None, &sim).unwrap();
        assert_eq!(value, MeanStd { mean: 1.0, std: 0.0 });
        let overlap = sim.intersection(Some(2), &sim).unwrap();
        assert_eq!(overlap, MeanStd { mean: 2.0, std: 0.0 });
    }

    #[test]
    fn test_full_length_practice_covers_all_items() {
        let a = simulator(Box::new(NaiveModel::new()), 8);
        let b = simulator(Box::new(ConstantModel::new(0.2)), 8);
        assert_eq!(a.jaccard(None, &b).unwrap().mean, 1.0);
        assert_eq!(a.intersection(None, &b).unwrap().mean, 8.0);
    }

    #[test]
    fn test_replay_resets_and_memoizes() {
        let sim = simulator(Box::new(ConstantModel::new(0.7)), 4);
        let mut naive = NaiveModel::new();
        naive.update(0, 0, true);
        let first = sim.replay(&mut naive).unwrap();
        let mut fresh = NaiveModel::new();
        assert_eq!(sim.replay(&mut fresh).unwrap(), first);
        assert_eq!(sim.stats().replay.len(), 1);

        let mut constant = ConstantModel::new(0.7);
        assert!((sim.replay(&mut constant).unwrap() - sim.rmse(None).unwrap()).abs() < 1e-12);
    }

    #[test]
    fn test_number_of_answers_counts_every_item() {
        let sim = simulator(Box::new(NaiveModel::new()), 4);
        let counts = sim.number_of_answers().unwrap();
        assert_eq!(counts.len(), 8);
        assert_eq!(counts.values().sum::<u32>(), 3 * 4);
    }

    #[test]
    fn test_data_is_ordered_by_user_then_step() {
        let sim = simulator(Box::new(NaiveModel::new()), 6);
        let data = sim.data(Some(4)).unwrap();
        assert_eq!(data.len(), 3 * 4);
        for (user, events) in sim.practice().unwrap() {
            let expected: Vec<_> = events
                .iter()
                .take(4)
                .map(|e| (*user, e.item, e.correct))
                .collect();
            let start = *user as usize * 4;
            assert_eq!(&data[start..start + 4], expected.as_slice());
        }
        assert_eq!(sim.data(None).unwrap().len(), 3 * 6);
    }

    #[test]
    fn test_identity_encodes_options() {
        let a = Simulator::identity("naive", &options(4));
        let b = Simulator::identity("naive", &options(4).with_split(Split::Train));
        let c = Simulator::identity("naive", &options(4).with_target_probability(0.6));
        assert_eq!(
            a,
            "simulator, model: naive, practice length: 4, train: false, target prob: 0.70"
        );
        assert_ne!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_same_seed_same_trace() {
        let a = simulator(Box::new(NaiveModel::new()), 5);
        let b = simulator(Box::new(NaiveModel::new()), 5);
        assert_eq!(a.practice().unwrap(), b.practice().unwrap());
    }
}
