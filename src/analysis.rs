//! Report data over a lineup of simulators
//!
//! Every function here works on a scenario plus a list of named simulators
//! and returns plain serde data. Trends are cached in the scenario storage,
//! the replay matrix is written there as well; everything else is cheap once
//! the simulators have memoized their statistics.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{GROUP_COMMON, GROUP_NOISE, GROUP_TRENDS};
use crate::error::{Result, SimError};
use crate::model::PredictiveModel;
use crate::recommend::prediction_score;
use crate::scenario::{EloVariant, Scenario};
use crate::simulator::{Simulator, SimulatorOptions};
use crate::types::{ClusterId, MeanStd, Split};

// ==================== Lineup ====================

/// Builds a fresh, untrained model from the scenario.
pub type ModelBuilder = fn(&mut Scenario) -> Result<Box<dyn PredictiveModel>>;

/// A named model of the comparison.
#[derive(Clone, Copy)]
pub struct Contender {
    pub name: &'static str,
    pub build: ModelBuilder,
}

/// A contender together with the simulator that runs it.
pub struct Entry {
    pub name: String,
    pub build: ModelBuilder,
    pub simulator: Rc<Simulator>,
}

fn optimal(scenario: &mut Scenario) -> Result<Box<dyn PredictiveModel>> {
    Ok(Box::new(scenario.optimal_model(Split::Test)?))
}

fn elo(scenario: &mut Scenario) -> Result<Box<dyn PredictiveModel>> {
    Ok(Box::new(scenario.elo_model(EloVariant::Plain)?))
}

fn elo_concepts(scenario: &mut Scenario) -> Result<Box<dyn PredictiveModel>> {
    Ok(Box::new(scenario.elo_model(EloVariant::Clustered)?))
}

fn elo_concepts_wrong(scenario: &mut Scenario) -> Result<Box<dyn PredictiveModel>> {
    Ok(Box::new(scenario.elo_model(EloVariant::WrongClusters)?))
}

fn naive(scenario: &mut Scenario) -> Result<Box<dyn PredictiveModel>> {
    Ok(Box::new(scenario.naive_model()))
}

fn constant(scenario: &mut Scenario) -> Result<Box<dyn PredictiveModel>> {
    Ok(Box::new(scenario.constant_model()))
}

/// Optimal, Elo, Elo Concepts, Elo Concepts (wrong), Naive, Constant.
///
/// The wrong-cluster variant is left out when the scenario moves no items.
pub fn standard_contenders(scenario: &Scenario) -> Vec<Contender> {
    let mut contenders = vec![
        Contender { name: "Optimal", build: optimal },
        Contender { name: "Elo", build: elo },
        Contender { name: "Elo Concepts", build: elo_concepts },
    ];
    if scenario.number_of_items_with_wrong_cluster() > 0 {
        contenders.push(Contender {
            name: "Elo Concepts (wrong)",
            build: elo_concepts_wrong,
        });
    }
    contenders.push(Contender { name: "Naive", build: naive });
    contenders.push(Contender { name: "Constant", build: constant });
    contenders
}

/// Registers one simulator per contender with the scenario's default options.
pub fn lineup(scenario: &mut Scenario, contenders: &[Contender]) -> Result<Vec<Entry>> {
    let options = SimulatorOptions::from_scenario(scenario);
    contenders
        .iter()
        .map(|contender| {
            let model = (contender.build)(scenario)?;
            Ok(Entry {
                name: contender.name.to_string(),
                build: contender.build,
                simulator: scenario.init_simulator(model, options)?,
            })
        })
        .collect()
}

// ==================== Trends ====================

fn trend(
    scenario: &mut Scenario,
    entries: &[Entry],
    kind: &str,
    measure: fn(&Simulator, usize, &Simulator) -> Result<MeanStd>,
) -> Result<BTreeMap<String, Vec<MeanStd>>> {
    let optimal = scenario.optimal_simulator()?;
    let mut trends = BTreeMap::new();
    for entry in entries {
        let key = format!("{kind}_trend:{}", entry.simulator.hash());
        let values = match scenario.read::<Vec<MeanStd>>(&key)? {
            Some(values) => values,
            None => {
                let values = (1..=entry.simulator.practice_length())
                    .map(|horizon| measure(&entry.simulator, horizon, &optimal))
                    .collect::<Result<Vec<_>>>()?;
                scenario.write(&key, &values)?;
                values
            }
        };
        trends.insert(entry.name.clone(), values);
    }
    debug!(kind, simulators = entries.len(), "trends ready");
    Ok(trends)
}

/// Mean Jaccard similarity to the optimal simulator per horizon `1..=practice_length`.
pub fn jaccard_trends(
    scenario: &mut Scenario,
    entries: &[Entry],
) -> Result<BTreeMap<String, Vec<MeanStd>>> {
    trend(scenario, entries, "jaccard", |sim, horizon, optimal| {
        sim.jaccard(Some(horizon), optimal)
    })
}

/// Mean intersection size with the optimal simulator per horizon `1..=practice_length`.
pub fn intersection_trends(
    scenario: &mut Scenario,
    entries: &[Entry],
) -> Result<BTreeMap<String, Vec<MeanStd>>> {
    trend(scenario, entries, "intersection", |sim, horizon, optimal| {
        sim.intersection(Some(horizon), optimal)
    })
}

// ==================== Replay matrix ====================

pub const RMSE_MATRIX_KEY: &str = "rmse_matrix";

/// `matrix[model][data]`: RMSE of a fresh `model` replayed over the trace of `data`.
pub fn rmse_matrix(
    scenario: &mut Scenario,
    entries: &[Entry],
) -> Result<BTreeMap<String, BTreeMap<String, f64>>> {
    let mut matrix = BTreeMap::new();
    for model_entry in entries {
        let mut row = BTreeMap::new();
        for data_entry in entries {
            let mut model = (model_entry.build)(scenario)?;
            let value = data_entry.simulator.replay(&mut *model)?;
            row.insert(data_entry.name.clone(), value);
        }
        matrix.insert(model_entry.name.clone(), row);
    }
    scenario.write(RMSE_MATRIX_KEY, &matrix)?;
    Ok(matrix)
}

// ==================== Answers ====================

/// True success probability of every practiced event, per simulator.
pub fn answers_by_true_probability(entries: &[Entry]) -> Result<BTreeMap<String, Vec<f64>>> {
    entries
        .iter()
        .map(|entry| {
            let probabilities: Vec<f64> = entry
                .simulator
                .practice()?
                .values()
                .flatten()
                .map(|event| event.true_probability)
                .collect();
            Ok((entry.name.clone(), probabilities))
        })
        .collect()
}

/// `points` evenly spaced `(probability, score)` pairs over `[0, 1]`.
pub fn score_curve(target_probability: f64, points: usize) -> Vec<(f64, f64)> {
    match points {
        0 => Vec::new(),
        1 => vec![(0.0, prediction_score(0.0, target_probability))],
        _ => (0..points)
            .map(|i| {
                let p = i as f64 / (points - 1) as f64;
                (p, prediction_score(p, target_probability))
            })
            .collect(),
    }
}

/// Answer counts per item, most practiced first, per simulator.
pub fn answers_distribution(entries: &[Entry]) -> Result<BTreeMap<String, Vec<u32>>> {
    entries
        .iter()
        .map(|entry| {
            let mut counts: Vec<u32> = entry
                .simulator
                .number_of_answers()?
                .into_values()
                .collect();
            counts.sort_unstable_by(|a, b| b.cmp(a));
            Ok((entry.name.clone(), counts))
        })
        .collect()
}

// ==================== Noise sweep ====================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoisePoint {
    pub std: f64,
    pub rmse: f64,
    pub intersection: MeanStd,
}

/// Optimal model with growing persistent noise compared with the noiseless one.
pub fn noise_sweep(scenario: &mut Scenario, levels: &[f64]) -> Result<Vec<NoisePoint>> {
    let options = SimulatorOptions::from_scenario(scenario);
    let mut points = Vec::with_capacity(levels.len());
    for &std in levels {
        let model = scenario.optimal_model_with_noise(Split::Test, std)?;
        let simulator = scenario.init_simulator(Box::new(model), options)?;
        let rmse = simulator.rmse(None)?;
        let intersection = scenario.intersection_to_optimal(&simulator, None)?;
        debug!(std, rmse, intersection = intersection.mean, "noise level simulated");
        points.push(NoisePoint {
            std,
            rmse,
            intersection,
        });
    }
    Ok(points)
}

// ==================== Scenario summary ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioSummary {
    pub skills_by_cluster: BTreeMap<ClusterId, Vec<f64>>,
    pub difficulties: Vec<f64>,
}

pub fn scenario_summary(scenario: &mut Scenario) -> Result<ScenarioSummary> {
    let population = scenario.population(Split::Test)?;
    let mut skills_by_cluster: BTreeMap<ClusterId, Vec<f64>> = BTreeMap::new();
    for skills in population.skills().values() {
        for (cluster, &skill) in skills.iter().enumerate() {
            skills_by_cluster
                .entry(cluster as ClusterId)
                .or_default()
                .push(skill);
        }
    }
    Ok(ScenarioSummary {
        skills_by_cluster,
        difficulties: population.difficulties().values().copied().collect(),
    })
}

// ==================== Report ====================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatorSummary {
    pub name: String,
    pub description: String,
    pub rmse: f64,
    pub jaccard: MeanStd,
    pub intersection: MeanStd,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub scenario: String,
    pub config_hash: String,
    pub simulators: Vec<SimulatorSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<ScenarioSummary>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rmse_matrix: Option<BTreeMap<String, BTreeMap<String, f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers_by_true_probability: Option<BTreeMap<String, Vec<f64>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score_curve: Option<Vec<(f64, f64)>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub answers_distribution: Option<BTreeMap<String, Vec<u32>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jaccard_trends: Option<BTreeMap<String, Vec<MeanStd>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub intersection_trends: Option<BTreeMap<String, Vec<MeanStd>>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub noise_sweep: Option<Vec<NoisePoint>>,
}

const SCORE_CURVE_POINTS: usize = 101;

impl Report {
    /// Computes the groups for which `runs_group` answers true.
    pub fn build(
        scenario: &mut Scenario,
        entries: &[Entry],
        runs_group: impl Fn(&str) -> bool,
    ) -> Result<Self> {
        let mut report = Report {
            scenario: scenario.name().to_string(),
            config_hash: scenario.config_hash().to_string(),
            ..Report::default()
        };
        for entry in entries {
            report.simulators.push(SimulatorSummary {
                name: entry.name.clone(),
                description: entry.simulator.description().to_string(),
                rmse: entry.simulator.rmse(None)?,
                jaccard: scenario.jaccard_to_optimal(&entry.simulator, None)?,
                intersection: scenario.intersection_to_optimal(&entry.simulator, None)?,
            });
        }

        if runs_group(GROUP_COMMON) {
            info!(group = GROUP_COMMON, "computing report group");
            report.summary = Some(scenario_summary(scenario)?);
            report.rmse_matrix = Some(rmse_matrix(scenario, entries)?);
            report.answers_by_true_probability = Some(answers_by_true_probability(entries)?);
            report.score_curve = Some(score_curve(
                scenario.target_probability(),
                SCORE_CURVE_POINTS,
            ));
            report.answers_distribution = Some(answers_distribution(entries)?);
        }
        if runs_group(GROUP_TRENDS) {
            info!(group = GROUP_TRENDS, "computing report group");
            report.jaccard_trends = Some(jaccard_trends(scenario, entries)?);
            report.intersection_trends = Some(intersection_trends(scenario, entries)?);
        }
        if runs_group(GROUP_NOISE) {
            info!(group = GROUP_NOISE, "computing report group");
            let levels = scenario.config().noise.levels();
            report.noise_sweep = Some(noise_sweep(scenario, &levels)?);
        }
        Ok(report)
    }

    pub fn write(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| SimError::io(parent, e))?;
        }
        let bytes = serde_json::to_vec_pretty(self)?;
        fs::write(path, bytes).map_err(|e| SimError::io(path, e))?;
        info!(path = %path.display(), "report written");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ScenarioConfig;

    fn scenario(wrong: usize) -> Scenario {
        let mut config = ScenarioConfig::new("analysis", 4, 0.7, 4, 10);
        config.number_of_clusters = 2;
        config.number_of_items_with_wrong_cluster = wrong;
        config.noise.std_step = 0.1;
        config.noise.std_max = 0.2;
        config.seed = Some(11);
        Scenario::new(config, 1).unwrap()
    }

    #[test]
    fn test_standard_contenders_skip_wrong_variant() {
        let names: Vec<_> = standard_contenders(&scenario(0))
            .iter()
            .map(|c| c.name)
            .collect();
        assert_eq!(names, ["Optimal", "Elo", "Elo Concepts", "Naive", "Constant"]);
        assert_eq!(standard_contenders(&scenario(3)).len(), 6);
    }

    #[test]
    fn test_trends_cover_every_horizon_and_are_cached() {
        let mut scenario = scenario(0);
        let contenders = standard_contenders(&scenario);
        let entries = lineup(&mut scenario, &contenders).unwrap();
        let trends = jaccard_trends(&mut scenario, &entries).unwrap();
        assert!(trends.values().all(|t| t.len() == 4));
        assert!(trends["Optimal"]
            .iter()
            .all(|v| *v == MeanStd { mean: 1.0, std: 0.0 }));

        let key = format!("jaccard_trend:{}", entries[1].simulator.hash());
        let cached: Vec<MeanStd> = scenario.read(&key).unwrap().unwrap();
        assert_eq!(cached, trends["Elo"]);
    }

    #[test]
    fn test_rmse_matrix_diagonal_matches_own_rmse() {
        let mut scenario = scenario(0);
        let contenders = standard_contenders(&scenario);
        let entries = lineup(&mut scenario, &contenders).unwrap();
        let matrix = rmse_matrix(&mut scenario, &entries).unwrap();
        assert_eq!(matrix.len(), entries.len());
        let constant = &entries[entries.len() - 1];
        let own = constant.simulator.rmse(None).unwrap();
        assert!((matrix["Constant"]["Constant"] - own).abs() < 1e-12);
        assert!(scenario
            .read::<BTreeMap<String, BTreeMap<String, f64>>>(RMSE_MATRIX_KEY)
            .unwrap()
            .is_some());
    }

    #[test]
    fn test_score_curve_peaks_at_target() {
        let curve = score_curve(0.7, 11);
        assert_eq!(curve.len(), 11);
        let (best, _) = curve
            .iter()
            .copied()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap();
        assert!((best - 0.7).abs() < 1e-9);
        assert!(score_curve(0.7, 0).is_empty());
    }

    #[test]
    fn test_answers_distribution_sorted_descending() {
        let mut scenario = scenario(0);
        let contenders = standard_contenders(&scenario);
        let entries = lineup(&mut scenario, &contenders).unwrap();
        for counts in answers_distribution(&entries).unwrap().values() {
            assert_eq!(counts.len(), 10);
            assert!(counts.windows(2).all(|w| w[0] >= w[1]));
            assert_eq!(counts.iter().sum::<u32>(), 4 * 4);
        }
    }

    #[test]
    fn test_noise_sweep_zero_noise_matches_optimal() {
        let mut scenario = scenario(0);
        let points = noise_sweep(&mut scenario, &[0.0, 0.2]).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[0].std, 0.0);
        assert!(points.iter().all(|p| p.rmse >= 0.0));
        assert!(points.iter().all(|p| p.intersection.mean <= 4.0));
    }

    #[test]
    fn test_scenario_summary_groups_by_cluster() {
        let mut scenario = scenario(0);
        let summary = scenario_summary(&mut scenario).unwrap();
        assert_eq!(summary.skills_by_cluster.len(), 2);
        assert!(summary.skills_by_cluster.values().all(|s| s.len() == 4));
        assert_eq!(summary.difficulties.len(), 10);
    }

    #[test]
    fn test_report_respects_skipped_groups() {
        let mut scenario = scenario(2);
        let contenders = standard_contenders(&scenario);
        let entries = lineup(&mut scenario, &contenders).unwrap();
        let report = Report::build(&mut scenario, &entries, |g| g != GROUP_NOISE).unwrap();
        assert_eq!(report.simulators.len(), 6);
        assert!(report.rmse_matrix.is_some());
        assert!(report.jaccard_trends.is_some());
        assert!(report.noise_sweep.is_none());
    }
}
