//! Statistics helpers
//!
//! Small numeric reductions used by simulators and the analysis layer, plus
//! typed reconstruction of string-keyed JSON maps.

use std::collections::BTreeMap;
use std::str::FromStr;

use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Result, SimError};
use crate::types::MeanStd;

/// Root-mean-square error between two equally long series. An empty sample is 0.
pub fn rmse(predicted: &[f64], actual: &[f64]) -> f64 {
    debug_assert_eq!(predicted.len(), actual.len());
    let n = predicted.len().min(actual.len());
    if n == 0 {
        return 0.0;
    }
    let sum: f64 = predicted
        .iter()
        .zip(actual)
        .map(|(p, a)| (p - a).powi(2))
        .sum();
    (sum / n as f64).sqrt()
}

/// Mean and population standard deviation. An empty sample is `(0, 0)`.
pub fn mean_std(values: &[f64]) -> MeanStd {
    if values.is_empty() {
        return MeanStd::default();
    }
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    MeanStd {
        mean,
        std: variance.sqrt(),
    }
}

/// Applies `fun` to every prefix: `[fun(xs[..1]), fun(xs[..2]), ...]`.
pub fn running_fun<T, R>(xs: &[T], fun: impl Fn(&[T]) -> R) -> Vec<R> {
    (1..=xs.len()).map(|end| fun(&xs[..end])).collect()
}

/// Like [`running_fun`] but only the last `size` elements of each prefix are visible.
pub fn window_fun<T, R>(xs: &[T], fun: impl Fn(&[T]) -> R, size: usize) -> Vec<R> {
    running_fun(xs, |prefix| {
        let start = prefix.len().saturating_sub(size);
        fun(&prefix[start..])
    })
}

/// Rebuilds a typed map from a JSON object whose keys went through string conversion.
///
/// Fails on the first key or value that does not parse; nothing is skipped.
pub fn convert_map<K, V>(key: &str, value: &Value) -> Result<BTreeMap<K, V>>
where
    K: FromStr + Ord,
    V: DeserializeOwned,
{
    let object = value.as_object().ok_or_else(|| SimError::CacheEntry {
        key: key.to_string(),
        expected: "object",
    })?;
    object
        .iter()
        .map(|(k, v)| {
            let typed_key = k.parse::<K>().map_err(|_| SimError::CacheEntry {
                key: format!("{key}.{k}"),
                expected: std::any::type_name::<K>(),
            })?;
            let typed_value =
                serde_json::from_value::<V>(v.clone()).map_err(|_| SimError::CacheEntry {
                    key: format!("{key}.{k}"),
                    expected: std::any::type_name::<V>(),
                })?;
            Ok((typed_key, typed_value))
        })
        .collect()
}
