use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::types::{ItemId, MeanStd};

/// Memoized statistics of one simulator, keyed by the request parameters.
///
/// `jaccard` and `intersection` are keyed by `<baseline hash>:<horizon>`,
/// `replay` by the replayed model's description.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SimulatorStats {
    #[serde(default)]
    pub rmse: BTreeMap<usize, f64>,
    #[serde(default)]
    pub jaccard: BTreeMap<String, MeanStd>,
    #[serde(default)]
    pub intersection: BTreeMap<String, MeanStd>,
    #[serde(default)]
    pub replay: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub number_of_answers: Option<BTreeMap<ItemId, u32>>,
}

impl SimulatorStats {
    pub fn comparison_key(baseline_hash: &str, horizon: usize) -> String {
        format!("{baseline_hash}:{horizon}")
    }

    /// Adds entries from `other` that are not memoized here yet.
    pub fn merge_missing(&mut self, other: SimulatorStats) {
        for (k, v) in other.rmse {
            self.rmse.entry(k).or_insert(v);
        }
        for (k, v) in other.jaccard {
            self.jaccard.entry(k).or_insert(v);
        }
        for (k, v) in other.intersection {
            self.intersection.entry(k).or_insert(v);
        }
        for (k, v) in other.replay {
            self.replay.entry(k).or_insert(v);
        }
        if self.number_of_answers.is_none() {
            self.number_of_answers = other.number_of_answers;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_keeps_in_memory_values() {
        let mut memory = SimulatorStats::default();
        memory.rmse.insert(5, 0.4);

        let mut disk = SimulatorStats::default();
        disk.rmse.insert(5, 0.9);
        disk.rmse.insert(10, 0.45);
        disk.replay.insert("naive".into(), 0.5);

        memory.merge_missing(disk);
        assert_eq!(memory.rmse[&5], 0.4);
        assert_eq!(memory.rmse[&10], 0.45);
        assert_eq!(memory.replay["naive"], 0.5);
    }

    #[test]
    fn test_json_keeps_integer_keys() {
        let mut stats = SimulatorStats::default();
        stats.rmse.insert(3, 0.25);
        stats.number_of_answers = Some([(0, 2), (1, 0)].into_iter().collect());
        let json = serde_json::to_string(&stats).unwrap();
        let back: SimulatorStats = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stats);
    }
}
