//! Scenario settings and runner configuration
//!
//! A settings file holds several named scenarios:
//!
//! ```json
//! { "scenarios": [ { "name": "small", "practice_length": 20, "target_probability": 0.7,
//!                    "number_of_users": 50, "number_of_items": 100, "number_of_clusters": 3 } ] }
//! ```
//!
//! Every field beyond the five above has a default.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};
use crate::types::ClusterId;

// ==================== Distributions and model parameters ====================

/// Normal distribution parameters
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NormalSpec {
    pub mean: f64,
    pub std: f64,
}

impl Default for NormalSpec {
    fn default() -> Self {
        Self { mean: 0.0, std: 1.0 }
    }
}

impl NormalSpec {
    fn validate(&self, what: &str) -> Result<()> {
        if !self.mean.is_finite() || !self.std.is_finite() || self.std < 0.0 {
            return Err(SimError::Config(format!(
                "{what} needs a finite mean and a non-negative std, got {self:?}"
            )));
        }
        Ok(())
    }
}

/// Step size schedule of the Elo model: `alpha / (1 + dynamic_alpha * n)`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EloParams {
    pub alpha: f64,
    pub dynamic_alpha: f64,
}

impl EloParams {
    /// Defaults for a single implicit cluster.
    pub fn plain() -> Self {
        Self {
            alpha: 0.8,
            dynamic_alpha: 0.05,
        }
    }

    /// Defaults when ratings are split by cluster; each rating sees fewer answers.
    pub fn clustered() -> Self {
        Self {
            alpha: 0.4,
            dynamic_alpha: 0.05,
        }
    }

    fn validate(&self, what: &str) -> Result<()> {
        if !(self.alpha.is_finite() && self.alpha > 0.0) {
            return Err(SimError::Config(format!("{what}.alpha must be positive")));
        }
        if !(self.dynamic_alpha.is_finite() && self.dynamic_alpha >= 0.0) {
            return Err(SimError::Config(format!(
                "{what}.dynamic_alpha must be non-negative"
            )));
        }
        Ok(())
    }
}

impl Default for EloParams {
    fn default() -> Self {
        Self::plain()
    }
}

/// Noise levels explored by the noise sweep: `0, step, 2*step, ... < max`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NoiseSweep {
    pub std_step: f64,
    pub std_max: f64,
}

impl Default for NoiseSweep {
    fn default() -> Self {
        Self {
            std_step: 0.01,
            std_max: 0.35,
        }
    }
}

impl NoiseSweep {
    pub fn levels(&self) -> Vec<f64> {
        let mut levels = Vec::new();
        let mut i = 0u32;
        loop {
            let std = f64::from(i) * self.std_step;
            if std >= self.std_max {
                break;
            }
            levels.push(std);
            i += 1;
        }
        levels
    }
}

// ==================== Scenario configuration ====================

fn default_clusters() -> usize {
    1
}

/// Configuration of one synthetic world. Read-only once a scenario owns it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScenarioConfig {
    pub name: String,
    pub practice_length: usize,
    pub target_probability: f64,
    pub number_of_users: usize,
    pub number_of_items: usize,
    #[serde(default = "default_clusters")]
    pub number_of_clusters: usize,
    #[serde(default)]
    pub skill: NormalSpec,
    /// Overrides `skill` per cluster
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cluster_skills: Option<Vec<NormalSpec>>,
    #[serde(default)]
    pub difficulty: NormalSpec,
    #[serde(default)]
    pub number_of_items_with_wrong_cluster: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub affected_clusters: Option<Vec<ClusterId>>,
    #[serde(default = "EloParams::plain")]
    pub elo: EloParams,
    #[serde(default = "EloParams::clustered")]
    pub elo_clusters: EloParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub constant: Option<f64>,
    #[serde(default)]
    pub noise: NoiseSweep,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
    #[serde(default)]
    pub version: Option<u32>,
}

impl ScenarioConfig {
    pub fn new(
        name: impl Into<String>,
        practice_length: usize,
        target_probability: f64,
        number_of_users: usize,
        number_of_items: usize,
    ) -> Self {
        Self {
            name: name.into(),
            practice_length,
            target_probability,
            number_of_users,
            number_of_items,
            number_of_clusters: default_clusters(),
            skill: NormalSpec::default(),
            cluster_skills: None,
            difficulty: NormalSpec::default(),
            number_of_items_with_wrong_cluster: 0,
            affected_clusters: None,
            elo: EloParams::plain(),
            elo_clusters: EloParams::clustered(),
            constant: None,
            noise: NoiseSweep::default(),
            seed: None,
            version: None,
        }
    }

    /// Reads `{"scenarios": [...]}` and returns the scenario called `name`.
    pub fn from_settings_file(path: impl AsRef<Path>, name: &str) -> Result<Self> {
        #[derive(Deserialize)]
        struct Settings {
            scenarios: Vec<ScenarioConfig>,
        }

        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| SimError::io(path, e))?;
        let settings: Settings =
            serde_json::from_str(&raw).map_err(|e| SimError::malformed(path, e))?;
        settings
            .scenarios
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| SimError::UnknownScenario {
                name: name.to_string(),
                path: path.to_path_buf(),
            })
    }

    /// Skill distribution of one cluster.
    pub fn skill_for(&self, cluster: usize) -> NormalSpec {
        self.cluster_skills
            .as_ref()
            .and_then(|specs| specs.get(cluster).copied())
            .unwrap_or(self.skill)
    }

    /// Clusters eligible for wrong-cluster reassignment, all of them unless configured.
    pub fn affected_clusters(&self) -> Vec<ClusterId> {
        match &self.affected_clusters {
            Some(clusters) => {
                let unique: BTreeSet<ClusterId> = clusters.iter().copied().collect();
                unique.into_iter().collect()
            }
            None => (0..self.number_of_clusters as ClusterId).collect(),
        }
    }

    /// Prediction of the constant baseline, the target probability unless configured.
    pub fn constant(&self) -> f64 {
        self.constant.unwrap_or(self.target_probability)
    }

    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(SimError::Config("scenario name is empty".into()));
        }
        if self.number_of_users == 0 {
            return Err(SimError::Config("number_of_users must be positive".into()));
        }
        if self.number_of_items == 0 {
            return Err(SimError::Config("number_of_items must be positive".into()));
        }
        if self.number_of_clusters == 0 {
            return Err(SimError::Config("number_of_clusters must be positive".into()));
        }
        if self.practice_length == 0 || self.practice_length > self.number_of_items {
            return Err(SimError::Config(format!(
                "practice_length {} must be within 1..={} (number of items)",
                self.practice_length, self.number_of_items
            )));
        }
        validate_probability("target_probability", self.target_probability)?;
        self.skill.validate("skill")?;
        self.difficulty.validate("difficulty")?;
        if let Some(specs) = &self.cluster_skills {
            if specs.len() != self.number_of_clusters {
                return Err(SimError::Config(format!(
                    "cluster_skills has {} entries for {} clusters",
                    specs.len(),
                    self.number_of_clusters
                )));
            }
            for spec in specs {
                spec.validate("cluster_skills")?;
            }
        }
        if let Some(affected) = &self.affected_clusters {
            if let Some(bad) = affected
                .iter()
                .find(|&&c| c as usize >= self.number_of_clusters)
            {
                return Err(SimError::Config(format!(
                    "affected cluster {bad} does not exist ({} clusters)",
                    self.number_of_clusters
                )));
            }
        }
        if self.number_of_items_with_wrong_cluster > self.number_of_items {
            return Err(SimError::Config(format!(
                "number_of_items_with_wrong_cluster {} exceeds {} items",
                self.number_of_items_with_wrong_cluster, self.number_of_items
            )));
        }
        if self.number_of_items_with_wrong_cluster > 0 && self.affected_clusters().len() < 2 {
            return Err(SimError::Config(
                "wrong-cluster reassignment needs at least two affected clusters".into(),
            ));
        }
        self.elo.validate("elo")?;
        self.elo_clusters.validate("elo_clusters")?;
        if let Some(constant) = self.constant {
            if !(0.0..=1.0).contains(&constant) {
                return Err(SimError::Config(format!(
                    "constant {constant} is not a probability"
                )));
            }
        }
        if !(self.noise.std_step.is_finite() && self.noise.std_step > 0.0) {
            return Err(SimError::Config("noise.std_step must be positive".into()));
        }
        if !(self.noise.std_max.is_finite() && self.noise.std_max >= 0.0) {
            return Err(SimError::Config("noise.std_max must be non-negative".into()));
        }
        Ok(())
    }
}

pub(crate) fn validate_probability(what: &str, value: f64) -> Result<()> {
    if !(value.is_finite() && value > 0.0 && value < 1.0) {
        return Err(SimError::Config(format!(
            "{what} must be strictly between 0 and 1, got {value}"
        )));
    }
    Ok(())
}

// ==================== Runner configuration ====================

/// Report groups the runner can skip
pub const GROUP_COMMON: &str = "common";
pub const GROUP_NOISE: &str = "noise";
pub const GROUP_TRENDS: &str = "trends";

#[derive(Debug, Clone)]
pub struct RunConfig {
    pub settings: PathBuf,
    pub scenario: String,
    pub destination: PathBuf,
    pub skip_groups: Vec<String>,
    pub skip_cache: bool,
    pub log_level: String,
}

impl RunConfig {
    pub fn from_env() -> Result<Self> {
        let settings = std::env::var("SIM_SETTINGS")
            .map(PathBuf::from)
            .map_err(|_| SimError::MissingEnv("SIM_SETTINGS"))?;
        let scenario =
            std::env::var("SIM_SCENARIO").map_err(|_| SimError::MissingEnv("SIM_SCENARIO"))?;
        let destination = std::env::var("SIM_DESTINATION")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./data"));
        let skip_groups = std::env::var("SIM_SKIP_GROUPS")
            .map(|value| {
                value
                    .split(',')
                    .map(|g| g.trim().to_string())
                    .filter(|g| !g.is_empty())
                    .collect()
            })
            .unwrap_or_default();
        let skip_cache = std::env::var("SIM_SKIP_CACHE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);
        let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());

        Ok(Self {
            settings,
            scenario,
            destination,
            skip_groups,
            skip_cache,
            log_level,
        })
    }

    pub fn runs_group(&self, group: &str) -> bool {
        !self.skip_groups.iter().any(|g| g == group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> ScenarioConfig {
        ScenarioConfig::new("small", 5, 0.7, 3, 10)
    }

    #[test]
    fn test_defaults_validate() {
        assert!(small().validate().is_ok());
    }

    #[test]
    fn test_practice_length_exceeding_items_rejected() {
        let mut config = small();
        config.practice_length = 11;
        assert!(matches!(config.validate(), Err(SimError::Config(_))));
    }

    #[test]
    fn test_target_probability_bounds() {
        let mut config = small();
        config.target_probability = 1.0;
        assert!(config.validate().is_err());
        config.target_probability = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_wrong_clusters_need_two_affected_clusters() {
        let mut config = small();
        config.number_of_clusters = 3;
        config.number_of_items_with_wrong_cluster = 2;
        config.affected_clusters = Some(vec![1]);
        assert!(config.validate().is_err());

        config.affected_clusters = Some(vec![1, 2]);
        assert!(config.validate().is_ok());

        config.affected_clusters = Some(vec![1, 3]);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_minimal_json_gets_defaults() {
        let json = r#"{"name": "x", "practice_length": 2, "target_probability": 0.6,
                       "number_of_users": 1, "number_of_items": 4}"#;
        let config: ScenarioConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.number_of_clusters, 1);
        assert_eq!(config.elo, EloParams::plain());
        assert_eq!(config.elo_clusters, EloParams::clustered());
        assert_eq!(config.constant(), 0.6);
        assert_eq!(config.affected_clusters(), vec![0]);
    }

    #[test]
    fn test_noise_levels() {
        let sweep = NoiseSweep {
            std_step: 0.1,
            std_max: 0.35,
        };
        let levels = sweep.levels();
        assert_eq!(levels.len(), 4);
        assert_eq!(levels[0], 0.0);
        assert!((levels[3] - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_cluster_skill_override() {
        let mut config = small();
        config.number_of_clusters = 2;
        config.cluster_skills = Some(vec![
            NormalSpec { mean: -1.0, std: 0.5 },
            NormalSpec { mean: 1.0, std: 0.5 },
        ]);
        assert!(config.validate().is_ok());
        assert_eq!(config.skill_for(1).mean, 1.0);
    }
}
