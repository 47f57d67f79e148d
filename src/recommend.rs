//! Target-probability recommendation
//!
//! The best next item is the one whose predicted success probability is
//! closest to a target. Distance is normalized by the largest distance
//! possible on that side of the target, so a miss towards 0 and a miss towards
//! 1 are comparable:
//!
//! ```text
//! score(p) = 1 - (|t - p| / max(0.001, |t - 0.5 + sign(t - p) * 0.5|))^2
//! ```

use std::collections::BTreeMap;

use rand::seq::IteratorRandom;
use rand::Rng;

use crate::types::{ItemId, MIN_SCORE_NORMALIZER};

/// 1.0 when the prediction hits the target, decreasing quadratically with distance.
pub fn prediction_score(probability: f64, target_probability: f64) -> f64 {
    let diff = target_probability - probability;
    let sign = if diff > 0.0 { 1.0 } else { -1.0 };
    let normalizer = (target_probability - 0.5 + sign * 0.5)
        .abs()
        .max(MIN_SCORE_NORMALIZER);
    1.0 - (diff.abs() / normalizer).powi(2)
}

/// Picks the best scoring item, uniformly at random among equal scores.
///
/// One tie-break draw is taken per candidate in ascending item order, so the
/// number of draws only depends on the number of candidates.
pub fn recommend<R: Rng + ?Sized>(
    predictions: &BTreeMap<ItemId, f64>,
    target_probability: f64,
    rng: &mut R,
) -> Option<ItemId> {
    let mut best: Option<(f64, f64, ItemId)> = None;
    for (&item, &probability) in predictions {
        let candidate = (
            prediction_score(probability, target_probability),
            rng.gen::<f64>(),
            item,
        );
        best = match best {
            Some(current) if !outranks(&candidate, &current) => Some(current),
            _ => Some(candidate),
        };
    }
    best.map(|(_, _, item)| item)
}

/// Uniform choice over the candidates, ignoring predictions.
pub fn recommend_random<R: Rng + ?Sized>(
    predictions: &BTreeMap<ItemId, f64>,
    rng: &mut R,
) -> Option<ItemId> {
    predictions.keys().copied().choose(rng)
}

/// Descending lexicographic order on (score, tie-break, item).
fn outranks(a: &(f64, f64, ItemId), b: &(f64, f64, ItemId)) -> bool {
    a.0.total_cmp(&b.0)
        .then(a.1.total_cmp(&b.1))
        .then(a.2.cmp(&b.2))
        .is_gt()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn test_score_peaks_at_target() {
        assert_eq!(prediction_score(0.7, 0.7), 1.0);
        assert!(prediction_score(0.6, 0.7) < 1.0);
        assert!(prediction_score(0.8, 0.7) < 1.0);
    }

    #[test]
    fn test_score_normalized_per_side() {
        // below target the worst miss is p = 0, above it p = 1
        assert!((prediction_score(0.0, 0.7)).abs() < 1e-12);
        assert!((prediction_score(1.0, 0.7)).abs() < 1e-12);
        assert!((prediction_score(0.35, 0.7) - 0.75).abs() < 1e-12);
        assert!((prediction_score(0.85, 0.7) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_score_normalizer_floor() {
        let score = prediction_score(0.5, 1.0);
        assert!(score.is_finite());
        assert!((score - 0.75).abs() < 1e-12);
        assert!(prediction_score(1.0, 1.0) == 1.0);
    }

    #[test]
    fn test_recommend_prefers_closest_to_target() {
        let predictions: BTreeMap<ItemId, f64> =
            [(0, 0.2), (1, 0.68), (2, 0.95), (3, 0.5)].into_iter().collect();
        for seed in 0..50 {
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            assert_eq!(recommend(&predictions, 0.7, &mut rng), Some(1));
        }
    }

    #[test]
    fn test_recommend_breaks_ties_randomly() {
        let predictions: BTreeMap<ItemId, f64> = (0..4).map(|i| (i, 0.5)).collect();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut seen = std::collections::BTreeSet::new();
        for _ in 0..200 {
            if let Some(item) = recommend(&predictions, 0.7, &mut rng) {
                seen.insert(item);
            }
        }
        assert_eq!(seen.len(), 4);
    }

    #[test]
    fn test_recommend_empty() {
        let mut rng = ChaCha8Rng::seed_from_u64(0);
        assert_eq!(recommend(&BTreeMap::new(), 0.7, &mut rng), None);
        assert_eq!(recommend_random(&BTreeMap::new(), &mut rng), None);
    }

    #[test]
    fn test_recommend_random_stays_in_pool() {
        let predictions: BTreeMap<ItemId, f64> = [(4, 0.1), (9, 0.9)].into_iter().collect();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        for _ in 0..20 {
            let item = recommend_random(&predictions, &mut rng).unwrap();
            assert!(item == 4 || item == 9);
        }
    }
}
