use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

use crate::config::{NormalSpec, ScenarioConfig};
use crate::error::{Result, SimError};
use crate::types::{ClusterId, Clusters, Difficulties, ItemId, Skills, UserId};

/// Frozen ground truth of one split.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Population {
    skills: Skills,
    difficulties: Difficulties,
    clusters: Clusters,
}

impl Population {
    pub fn new(skills: Skills, difficulties: Difficulties, clusters: Clusters) -> Self {
        Self {
            skills,
            difficulties,
            clusters,
        }
    }

    pub fn skills(&self) -> &Skills {
        &self.skills
    }

    pub fn difficulties(&self) -> &Difficulties {
        &self.difficulties
    }

    pub fn clusters(&self) -> &Clusters {
        &self.clusters
    }

    pub fn users(&self) -> Vec<UserId> {
        self.skills.keys().copied().collect()
    }

    pub fn items(&self) -> Vec<ItemId> {
        self.difficulties.keys().copied().collect()
    }

    pub fn skill(&self, user: UserId, cluster: ClusterId) -> f64 {
        self.skills
            .get(&user)
            .and_then(|s| s.get(cluster as usize))
            .copied()
            .unwrap_or(0.0)
    }

    pub fn difficulty(&self, item: ItemId) -> f64 {
        self.difficulties.get(&item).copied().unwrap_or(0.0)
    }

    pub fn cluster_of(&self, item: ItemId) -> ClusterId {
        self.clusters.get(&item).copied().unwrap_or(0)
    }
}

/// Lazily generated population of one split as stored in the scenario document.
///
/// Each part is drawn on first access and never redrawn afterwards.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    skills: Option<Skills>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    difficulties: Option<Difficulties>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    clusters: Option<Clusters>,
}

impl PopulationRecord {
    pub fn is_complete(&self) -> bool {
        self.skills.is_some() && self.difficulties.is_some() && self.clusters.is_some()
    }

    pub fn skills<R: Rng + ?Sized>(
        &mut self,
        config: &ScenarioConfig,
        rng: &mut R,
    ) -> Result<&Skills> {
        if self.skills.is_none() {
            self.skills = Some(generate_skills(config, rng)?);
        }
        Ok(self.skills.get_or_insert_with(Skills::new))
    }

    pub fn difficulties<R: Rng + ?Sized>(
        &mut self,
        config: &ScenarioConfig,
        rng: &mut R,
    ) -> Result<&Difficulties> {
        if self.difficulties.is_none() {
            self.difficulties = Some(generate_difficulties(config, rng)?);
        }
        Ok(self.difficulties.get_or_insert_with(Difficulties::new))
    }

    pub fn clusters<R: Rng + ?Sized>(
        &mut self,
        config: &ScenarioConfig,
        rng: &mut R,
    ) -> Result<&Clusters> {
        if self.clusters.is_none() {
            self.clusters = Some(generate_clusters(config, rng));
        }
        Ok(self.clusters.get_or_insert_with(Clusters::new))
    }

    /// Generates whatever is missing and freezes the result.
    pub fn population<R: Rng + ?Sized>(
        &mut self,
        config: &ScenarioConfig,
        rng: &mut R,
    ) -> Result<Population> {
        let skills = self.skills(config, rng)?.clone();
        let difficulties = self.difficulties(config, rng)?.clone();
        let clusters = self.clusters(config, rng)?.clone();
        Ok(Population::new(skills, difficulties, clusters))
    }

    /// Rejects persisted data whose shape disagrees with the configuration.
    pub fn check_shape(&self, config: &ScenarioConfig, split: &str) -> Result<()> {
        if let Some(skills) = &self.skills {
            let shape_ok = skills.len() == config.number_of_users
                && skills.values().all(|s| s.len() == config.number_of_clusters)
                && skills.keys().all(|&u| (u as usize) < config.number_of_users);
            if !shape_ok {
                return Err(SimError::CacheEntry {
                    key: format!("{split}.skills"),
                    expected: "skill vector per configured user and cluster",
                });
            }
        }
        if let Some(difficulties) = &self.difficulties {
            let shape_ok = difficulties.len() == config.number_of_items
                && difficulties.keys().all(|&i| (i as usize) < config.number_of_items);
            if !shape_ok {
                return Err(SimError::CacheEntry {
                    key: format!("{split}.difficulties"),
                    expected: "difficulty per configured item",
                });
            }
        }
        if let Some(clusters) = &self.clusters {
            let shape_ok = clusters.len() == config.number_of_items
                && clusters.keys().all(|&i| (i as usize) < config.number_of_items)
                && clusters
                    .values()
                    .all(|&c| (c as usize) < config.number_of_clusters);
            if !shape_ok {
                return Err(SimError::CacheEntry {
                    key: format!("{split}.clusters"),
                    expected: "cluster per configured item",
                });
            }
        }
        Ok(())
    }
}

fn normal(spec: NormalSpec) -> Result<Normal<f64>> {
    Normal::new(spec.mean, spec.std)
        .map_err(|e| SimError::Config(format!("invalid distribution {spec:?}: {e}")))
}

fn generate_skills<R: Rng + ?Sized>(config: &ScenarioConfig, rng: &mut R) -> Result<Skills> {
    let distributions = (0..config.number_of_clusters)
        .map(|c| normal(config.skill_for(c)))
        .collect::<Result<Vec<_>>>()?;
    let mut skills = Skills::new();
    for user in 0..config.number_of_users as UserId {
        let mut per_cluster = Vec::with_capacity(distributions.len());
        for distribution in &distributions {
            per_cluster.push(distribution.sample(rng));
        }
        skills.insert(user, per_cluster);
    }
    Ok(skills)
}

fn generate_difficulties<R: Rng + ?Sized>(
    config: &ScenarioConfig,
    rng: &mut R,
) -> Result<Difficulties> {
    let distribution = normal(config.difficulty)?;
    Ok((0..config.number_of_items as ItemId)
        .map(|item| (item, distribution.sample(rng)))
        .collect())
}

fn generate_clusters<R: Rng + ?Sized>(config: &ScenarioConfig, rng: &mut R) -> Clusters {
    let n = config.number_of_clusters as ClusterId;
    (0..config.number_of_items as ItemId)
        .map(|item| (item, rng.gen_range(0..n)))
        .collect()
}
