//! Scenario: synthetic world, cache document and simulator registry
//!
//! A scenario owns its configuration (frozen, with a version stamp), the
//! lazily generated population for a `test` and a `train` split, and a flat
//! string-keyed store of derived artifacts. All of it is persisted as one
//! JSON document named after the configuration hash:
//!
//! ```text
//! <dir>/<name>_<hash[..10]>.json      scenario document
//! <dir>/<name>_<hash[..10]>/          simulator cache files and reports
//! ```
//!
//! Simulators are registered by identity string, so asking twice for the same
//! model description and options returns the same instance.

mod population;

pub use population::{Population, PopulationRecord};

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::str::FromStr;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::config::ScenarioConfig;
use crate::error::{Result, SimError};
use crate::identity::{derive_seed, digest_hex};
use crate::model::{ConstantModel, EloModel, NaiveModel, OptimalModel, PredictiveModel};
use crate::simulator::{Simulator, SimulatorOptions};
use crate::stats::convert_map;
use crate::types::{Clusters, Difficulties, MeanStd, Skills, Split, CONFIG_HASH_PREFIX};

/// Which Elo flavour to build from the scenario
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EloVariant {
    /// One implicit cluster, `elo` parameters
    Plain,
    /// True item clusters, `elo_clusters` parameters
    Clustered,
    /// True clusters with the configured number of items moved to a wrong one
    WrongClusters,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ScenarioDocument {
    config: ScenarioConfig,
    #[serde(default)]
    storage: BTreeMap<String, Value>,
    #[serde(default)]
    test_set: PopulationRecord,
    #[serde(default)]
    train_set: PopulationRecord,
}

/// Reads the named scenario from a settings file and stamps it with `version`.
pub fn load_scenario(path: impl AsRef<Path>, name: &str, version: u32) -> Result<Scenario> {
    Scenario::new(ScenarioConfig::from_settings_file(path, name)?, version)
}

pub struct Scenario {
    document: ScenarioDocument,
    config_hash: String,
    loaded: bool,
    rng: ChaCha8Rng,
    populations: HashMap<Split, Rc<Population>>,
    simulators: HashMap<String, Rc<Simulator>>,
    cache_dir: Option<PathBuf>,
}

impl Scenario {
    pub fn new(mut config: ScenarioConfig, version: u32) -> Result<Self> {
        config.version = Some(version);
        config.validate()?;
        // serde_json maps are sorted, so this serialization is key-ordered
        let config_hash = digest_hex(&serde_json::to_value(&config)?.to_string());
        let rng = match config.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed),
            None => ChaCha8Rng::from_entropy(),
        };
        info!(scenario = %config.name, hash = %&config_hash[..CONFIG_HASH_PREFIX], "scenario created");
        Ok(Self {
            document: ScenarioDocument {
                config,
                storage: BTreeMap::new(),
                test_set: PopulationRecord::default(),
                train_set: PopulationRecord::default(),
            },
            config_hash,
            loaded: false,
            rng,
            populations: HashMap::new(),
            simulators: HashMap::new(),
            cache_dir: None,
        })
    }

    // ==================== Configuration ====================

    pub fn config(&self) -> &ScenarioConfig {
        &self.document.config
    }

    /// Hex SHA-256 of the key-sorted configuration JSON.
    pub fn config_hash(&self) -> &str {
        &self.config_hash
    }

    pub fn name(&self) -> &str {
        &self.document.config.name
    }

    pub fn practice_length(&self) -> usize {
        self.document.config.practice_length
    }

    pub fn target_probability(&self) -> f64 {
        self.document.config.target_probability
    }

    pub fn number_of_users(&self) -> usize {
        self.document.config.number_of_users
    }

    pub fn number_of_items(&self) -> usize {
        self.document.config.number_of_items
    }

    pub fn number_of_clusters(&self) -> usize {
        self.document.config.number_of_clusters
    }

    pub fn number_of_items_with_wrong_cluster(&self) -> usize {
        self.document.config.number_of_items_with_wrong_cluster
    }

    /// `<dir>/<name>_<hash prefix>`; the document adds `.json`, artifacts live below it.
    pub fn filename(&self, directory: impl AsRef<Path>) -> PathBuf {
        directory.as_ref().join(format!(
            "{}_{}",
            self.document.config.name,
            &self.config_hash[..CONFIG_HASH_PREFIX]
        ))
    }

    fn document_path(&self, directory: &Path) -> PathBuf {
        let mut path = self.filename(directory).into_os_string();
        path.push(".json");
        PathBuf::from(path)
    }

    /// Deterministic seed for `purpose`, tied to this configuration.
    pub fn derive_seed(&self, purpose: &str) -> u64 {
        derive_seed(&format!("{}:{}", self.config_hash, purpose))
    }

    // ==================== Artifact store ====================

    pub fn write<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let value = serde_json::to_value(value)?;
        self.document.storage.insert(key.to_string(), value);
        self.loaded = false;
        Ok(())
    }

    /// Typed read; a stored value of another shape is an error, not a miss.
    pub fn read<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.document.storage.get(key) {
            None => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|_| SimError::CacheEntry {
                    key: key.to_string(),
                    expected: std::any::type_name::<T>(),
                }),
        }
    }

    /// Reads a stored object back into a map with typed (e.g. integer) keys.
    pub fn read_map<K, V>(&self, key: &str) -> Result<Option<BTreeMap<K, V>>>
    where
        K: FromStr + Ord,
        V: DeserializeOwned,
    {
        self.document
            .storage
            .get(key)
            .map(|value| convert_map(key, value))
            .transpose()
    }

    // ==================== Persistence ====================

    /// Restores the persisted document if there is one and remembers the
    /// directory for simulator caches. Returns whether a document was read.
    pub fn load(&mut self, directory: impl AsRef<Path>) -> Result<bool> {
        let directory = directory.as_ref();
        self.cache_dir = Some(self.filename(directory));
        let path = self.document_path(directory);
        let raw = match fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no cached scenario");
                return Ok(false);
            }
            Err(e) => return Err(SimError::io(&path, e)),
        };
        let document: ScenarioDocument =
            serde_json::from_str(&raw).map_err(|e| SimError::malformed(&path, e))?;
        let loaded_hash = digest_hex(&serde_json::to_value(&document.config)?.to_string());
        if loaded_hash != self.config_hash {
            return Err(SimError::Config(format!(
                "{} was written for another configuration",
                path.display()
            )));
        }
        document.test_set.check_shape(&document.config, "test_set")?;
        document.train_set.check_shape(&document.config, "train_set")?;

        if !self.simulators.is_empty() {
            warn!(
                count = self.simulators.len(),
                "dropping simulators built before the scenario was loaded"
            );
        }
        self.document = document;
        self.populations.clear();
        self.simulators.clear();
        self.loaded = true;
        info!(path = %path.display(), "scenario loaded");
        Ok(true)
    }

    /// Writes the document unless it was just loaded and nothing changed.
    /// Returns whether a file was written.
    pub fn save(&self, directory: impl AsRef<Path>, force: bool) -> Result<bool> {
        if self.loaded && !force {
            debug!("scenario unchanged since load, not saving");
            return Ok(false);
        }
        let directory = directory.as_ref();
        fs::create_dir_all(directory).map_err(|e| SimError::io(directory, e))?;
        let path = self.document_path(directory);
        let bytes = serde_json::to_vec(&self.document)?;
        fs::write(&path, bytes).map_err(|e| SimError::io(&path, e))?;
        info!(path = %path.display(), "scenario saved");
        Ok(true)
    }

    /// Directory where registered simulators read and write their cache files.
    pub fn cache_dir(&self) -> Option<&Path> {
        self.cache_dir.as_deref()
    }

    pub fn set_cache_dir(&mut self, directory: impl Into<PathBuf>) {
        self.cache_dir = Some(directory.into());
    }

    /// Persists every registered simulator into the cache directory.
    pub fn save_simulators(&self) -> Result<()> {
        let Some(directory) = &self.cache_dir else {
            return Ok(());
        };
        for simulator in self.simulators.values() {
            simulator.save(directory)?;
        }
        debug!(count = self.simulators.len(), "simulators saved");
        Ok(())
    }

    // ==================== Population ====================

    pub fn skills(&mut self) -> Result<&Skills> {
        self.population_part(Split::Test, |record, config, rng| record.skills(config, rng))
    }

    pub fn difficulties(&mut self) -> Result<&Difficulties> {
        self.population_part(Split::Test, |record, config, rng| {
            record.difficulties(config, rng)
        })
    }

    pub fn clusters(&mut self) -> Result<&Clusters> {
        self.population_part(Split::Test, |record, config, rng| record.clusters(config, rng))
    }

    pub fn train_skills(&mut self) -> Result<&Skills> {
        self.population_part(Split::Train, |record, config, rng| record.skills(config, rng))
    }

    pub fn train_difficulties(&mut self) -> Result<&Difficulties> {
        self.population_part(Split::Train, |record, config, rng| {
            record.difficulties(config, rng)
        })
    }

    pub fn train_clusters(&mut self) -> Result<&Clusters> {
        self.population_part(Split::Train, |record, config, rng| record.clusters(config, rng))
    }

    /// Complete frozen population of a split, generated on first use.
    pub fn population(&mut self, split: Split) -> Result<Rc<Population>> {
        if let Some(population) = self.populations.get(&split) {
            return Ok(Rc::clone(population));
        }
        let population = Rc::new(self.population_part(split, |record, config, rng| {
            record.population(config, rng)
        })?);
        self.populations.insert(split, Rc::clone(&population));
        Ok(population)
    }

    fn population_part<'a, T>(
        &'a mut self,
        split: Split,
        part: impl FnOnce(&'a mut PopulationRecord, &ScenarioConfig, &mut ChaCha8Rng) -> Result<T>,
    ) -> Result<T> {
        let ScenarioDocument {
            config,
            test_set,
            train_set,
            ..
        } = &mut self.document;
        let record = match split {
            Split::Test => test_set,
            Split::Train => train_set,
        };
        if !record.is_complete() {
            // something may get generated, so the document must be saved again
            self.loaded = false;
        }
        part(record, config, &mut self.rng)
    }

    // ==================== Models ====================

    pub fn optimal_model(&mut self, split: Split) -> Result<OptimalModel> {
        Ok(OptimalModel::new(self.population(split)?))
    }

    /// Ground truth with persistent per-(user, item) noise of deviation `std`.
    pub fn optimal_model_with_noise(&mut self, split: Split, std: f64) -> Result<OptimalModel> {
        let seed = self.derive_seed(&format!("noise:{std}"));
        OptimalModel::with_noise(self.population(split)?, std, seed)
    }

    pub fn elo_model(&mut self, variant: EloVariant) -> Result<EloModel> {
        match variant {
            EloVariant::Plain => Ok(EloModel::new(self.document.config.elo)),
            EloVariant::Clustered => {
                let clusters = self.clusters()?.clone();
                Ok(EloModel::with_clusters(
                    self.document.config.elo_clusters,
                    clusters,
                ))
            }
            EloVariant::WrongClusters => {
                let clusters = self.clusters()?.clone();
                let count = self.number_of_items_with_wrong_cluster();
                let eligible = self.document.config.affected_clusters();
                let seed = self.derive_seed("wrong-clusters");
                EloModel::with_clusters(self.document.config.elo_clusters, clusters)
                    .with_wrong_clusters(count, &eligible, seed)
            }
        }
    }

    pub fn naive_model(&self) -> NaiveModel {
        NaiveModel::new()
    }

    pub fn constant_model(&self) -> ConstantModel {
        ConstantModel::new(self.document.config.constant())
    }

    // ==================== Simulators ====================

    /// Returns the registered simulator for this model description and options,
    /// creating (and attaching to the cache directory) a new one otherwise.
    pub fn init_simulator(
        &mut self,
        model: Box<dyn PredictiveModel>,
        options: SimulatorOptions,
    ) -> Result<Rc<Simulator>> {
        let description = Simulator::identity(&model.describe(), &options);
        if let Some(existing) = self.simulators.get(&description) {
            return Ok(Rc::clone(existing));
        }
        let ground_truth = self.optimal_model(options.split)?;
        let seed = match self.document.config.seed {
            Some(seed) => derive_seed(&format!("{seed}:{description}")),
            None => self.rng.gen(),
        };
        let mut simulator = Simulator::new(ground_truth, model, options, seed)?;
        if let Some(directory) = &self.cache_dir {
            simulator.attach(directory)?;
        }
        debug!(simulator = %description, hash = %simulator.hash(), "simulator registered");
        let simulator = Rc::new(simulator);
        self.simulators.insert(description, Rc::clone(&simulator));
        Ok(simulator)
    }

    /// Simulator of the noiseless ground truth with the scenario's options.
    pub fn optimal_simulator(&mut self) -> Result<Rc<Simulator>> {
        let model = self.optimal_model(Split::Test)?;
        let options = SimulatorOptions::from_scenario(self);
        self.init_simulator(Box::new(model), options)
    }

    pub fn simulators(&self) -> impl Iterator<Item = &Rc<Simulator>> {
        self.simulators.values()
    }

    /// [`Simulator::jaccard`] against the optimal simulator.
    pub fn jaccard_to_optimal(
        &mut self,
        simulator: &Simulator,
        horizon: Option<usize>,
    ) -> Result<MeanStd> {
        let optimal = self.optimal_simulator()?;
        simulator.jaccard(horizon, &optimal)
    }

    /// [`Simulator::intersection`] against the optimal simulator.
    pub fn intersection_to_optimal(
        &mut self,
        simulator: &Simulator,
        horizon: Option<usize>,
    ) -> Result<MeanStd> {
        let optimal = self.optimal_simulator()?;
        simulator.intersection(horizon, &optimal)
    }
}
