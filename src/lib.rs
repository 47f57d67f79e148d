//! # practice-sim - student model comparison by simulation
//!
//! Synthetic users practice synthetic items. A recommender picks every next
//! item from a candidate model's predictions, the ground-truth model decides
//! whether the answer is correct, and the candidate model learns online. The
//! resulting practice traces are compared with the trace produced by the
//! ground-truth model itself.
//!
//! ## Modules
//!
//! - [`model`] - predictive models (optimal, Elo with concepts, naive, constant, noisy)
//! - [`recommend`] - target-probability item recommendation
//! - [`simulator`] - practice simulation, memoized statistics and persistence
//! - [`scenario`] - synthetic population, settings, cache document, simulator registry
//! - [`analysis`] - report data computed over a set of simulators
//! - [`stats`] - RMSE, mean/std, running and windowed helpers
//! - [`config`] - scenario settings and runner configuration
//! - [`error`] - crate error type
//! - [`identity`] - content hashes and derived seeds
//! - [`logging`] - tracing initialisation
//! - [`types`] - shared identifiers and records
//!
//! ## Example
//!
//! ```rust,no_run
//! use practice_sim::{ConstantModel, Scenario, ScenarioConfig, SimulatorOptions};
//!
//! let mut config = ScenarioConfig::new("demo", 10, 0.7, 20, 30);
//! config.seed = Some(7);
//! let mut scenario = Scenario::new(config, 1)?;
//! let optimal = scenario.optimal_simulator()?;
//! let constant = scenario.init_simulator(
//!     Box::new(ConstantModel::new(0.7)),
//!     SimulatorOptions::from_scenario(&scenario),
//! )?;
//! let similarity = constant.jaccard(None, &optimal)?;
//! println!("jaccard {:.3} +- {:.3}", similarity.mean, similarity.std);
//! # Ok::<(), practice_sim::SimError>(())
//! ```

// ============================================================================
// Modules
// ============================================================================

pub mod analysis;
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod model;
pub mod recommend;
pub mod scenario;
pub mod simulator;
pub mod stats;
pub mod types;

// ============================================================================
// Re-exports
// ============================================================================

pub use types::*;

pub use error::{Result, SimError};

pub use config::{EloParams, NoiseSweep, NormalSpec, RunConfig, ScenarioConfig};

pub use model::{
    logit, sigmoid, ConstantModel, EloModel, NaiveModel, NoisyModel, OptimalModel,
    PredictiveModel,
};

pub use recommend::{prediction_score, recommend, recommend_random};

pub use scenario::{load_scenario, EloVariant, Population, Scenario};

pub use simulator::{Simulator, SimulatorOptions, SimulatorStats};
