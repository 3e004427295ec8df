//! Aggregate queries over trades and their private releases
//!
//! Each query computes a true aggregate from clipped data and a sensitivity
//! that depends only on the clip bound, never on the observed values.

use std::collections::HashMap;

use rand::Rng;
use serde::Serialize;
use tracing::debug;

use super::dataset::{filter_broker, Trade};
use crate::error::{Error, Result};
use crate::noise::{calibrate, simulate, Mechanism, PrivacyParams, QueryDescriptor};

/// Sensitivity of a count: one record changes it by at most one.
pub const COUNT_SENSITIVITY: f64 = 1.0;

/// Upper-bound clipping
pub fn clip(value: f64, bound: f64) -> f64 {
    value.min(bound)
}

pub fn clipped_sum<I>(values: I, bound: f64) -> f64
where
    I: IntoIterator<Item = f64>,
{
    values.into_iter().map(|v| clip(v, bound)).sum()
}

/// Broker with the most trades; ties go to the smallest id.
pub fn most_active_broker(trades: &[Trade]) -> Option<&str> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for trade in trades {
        *counts.entry(trade.broker_id.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .max_by(|(a_id, a_n), (b_id, b_n)| a_n.cmp(b_n).then_with(|| b_id.cmp(a_id)))
        .map(|(id, _)| id)
}

/// Clipped total quantity traded by one broker
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeQuery {
    pub broker_id: String,
    pub true_value: f64,
    /// Equal to the clip bound
    pub sensitivity: f64,
}

impl VolumeQuery {
    pub fn for_broker(trades: &[Trade], broker_id: &str, clip_bound: f64) -> Self {
        let true_value = clipped_sum(
            filter_broker(trades, broker_id).into_iter().map(|t| t.quantity),
            clip_bound,
        );
        Self {
            broker_id: broker_id.to_string(),
            true_value,
            sensitivity: clip_bound,
        }
    }

    /// Volume query for the most active broker in `trades`.
    pub fn most_active(trades: &[Trade], clip_bound: f64) -> Result<Self> {
        let broker = most_active_broker(trades)
            .ok_or_else(|| Error::DatasetError("no trades to select a broker from".to_string()))?;
        Ok(Self::for_broker(trades, broker, clip_bound))
    }

    pub fn descriptor(&self, mechanism: Mechanism) -> QueryDescriptor {
        QueryDescriptor::new(mechanism, self.true_value, self.sensitivity)
    }
}

/// Trade counts per sector, largest first (ties by name).
pub fn sector_counts(trades: &[Trade]) -> Vec<(String, u64)> {
    let mut counts: HashMap<&str, u64> = HashMap::new();
    for trade in trades {
        *counts.entry(trade.sector.as_str()).or_default() += 1;
    }
    let mut counts: Vec<(String, u64)> = counts
        .into_iter()
        .map(|(sector, n)| (sector.to_string(), n))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistogramBin {
    pub label: String,
    pub true_count: u64,
    pub noisy_count: u64,
}

/// Release each bin with Laplace noise of scale `1/epsilon`.
///
/// Noisy counts are truncated toward zero and floored at zero.
pub fn noisy_histogram<R: Rng + ?Sized>(
    counts: &[(String, u64)],
    epsilon: f64,
    rng: &mut R,
) -> Result<Vec<HistogramBin>> {
    let params = PrivacyParams::pure(epsilon);
    counts
        .iter()
        .map(|(label, count)| -> Result<HistogramBin> {
            let query =
                QueryDescriptor::new(Mechanism::Laplace, *count as f64, COUNT_SENSITIVITY);
            let noisy = simulate(&query, &params, 1, rng)?.example_release;
            Ok(HistogramBin {
                label: label.clone(),
                true_count: *count,
                noisy_count: noisy.trunc().max(0.0) as u64,
            })
        })
        .collect()
}

/// Private average built from an independently privatized sum and count
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct AverageRelease {
    pub true_average: f64,
    pub noisy_sum: f64,
    /// Already clamped to at least 1
    pub noisy_count: f64,
    pub noisy_average: f64,
}

impl AverageRelease {
    pub fn absolute_error(&self) -> f64 {
        (self.true_average - self.noisy_average).abs()
    }
}

/// Noisy counts below one would blow up or flip the sign of the average.
pub fn clamp_count(noisy_count: f64) -> f64 {
    noisy_count.max(1.0)
}

/// Average of `values` under a total budget split evenly between a clipped
/// sum (sensitivity `clip_bound`) and a count (sensitivity 1).
pub fn split_budget_average<R: Rng + ?Sized>(
    values: &[f64],
    clip_bound: f64,
    total_epsilon: f64,
    rng: &mut R,
) -> Result<AverageRelease> {
    if values.is_empty() {
        return Err(Error::DatasetError(
            "cannot average an empty subset".to_string(),
        ));
    }

    let split = PrivacyParams::pure(total_epsilon / 2.0);
    let true_sum = clipped_sum(values.iter().copied(), clip_bound);
    let true_count = values.len() as f64;

    let sum_query = QueryDescriptor::new(Mechanism::Laplace, true_sum, clip_bound);
    let count_query = QueryDescriptor::new(Mechanism::Laplace, true_count, COUNT_SENSITIVITY);
    // Validate both constituents before drawing for either.
    calibrate(sum_query.mechanism, sum_query.sensitivity, &split)?;
    calibrate(count_query.mechanism, count_query.sensitivity, &split)?;

    let noisy_sum = simulate(&sum_query, &split, 1, rng)?.example_release;
    let raw_count = simulate(&count_query, &split, 1, rng)?.example_release;
    let noisy_count = clamp_count(raw_count);

    debug!(true_sum, noisy_sum, true_count, raw_count, "Split-budget average");

    Ok(AverageRelease {
        true_average: true_sum / true_count,
        noisy_sum,
        noisy_count,
        noisy_average: noisy_sum / noisy_count,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::noise::noise_rng;

    fn trade(broker: &str, sector: &str, quantity: f64, value: f64) -> Trade {
        Trade {
            timestamp: "2024-01-02T09:30:00".to_string(),
            ticker: "AAPL".to_string(),
            broker_id: broker.to_string(),
            quantity,
            trade_value: value,
            sector: sector.to_string(),
            country: "US".to_string(),
        }
    }

    #[test]
    fn test_clip_only_bounds_from_above() {
        assert_eq!(clip(50_000.0, 20_000.0), 20_000.0);
        assert_eq!(clip(-5.0, 20_000.0), -5.0);
        assert_eq!(clipped_sum([10.0, 30_000.0, 5.0], 20_000.0), 20_015.0);
    }

    #[test]
    fn test_most_active_broker_breaks_ties_by_id() {
        let trades = vec![
            trade("B2", "Energy", 1.0, 1.0),
            trade("B1", "Energy", 1.0, 1.0),
            trade("B3", "Energy", 1.0, 1.0),
            trade("B3", "Energy", 1.0, 1.0),
            trade("B1", "Energy", 1.0, 1.0),
        ];
        assert_eq!(most_active_broker(&trades), Some("B1"));
        assert_eq!(most_active_broker(&[]), None);
    }

    #[test]
    fn test_volume_query_uses_clip_as_sensitivity() {
        let trades = vec![
            trade("B1", "Energy", 10_000_000.0, 1.0),
            trade("B1", "Energy", 500.0, 1.0),
            trade("B2", "Energy", 700.0, 1.0),
        ];
        let query = VolumeQuery::most_active(&trades, 20_000.0).unwrap();
        assert_eq!(query.broker_id, "B1");
        assert_eq!(query.true_value, 20_500.0);
        assert_eq!(query.sensitivity, 20_000.0);
        assert_eq!(query.descriptor(Mechanism::Gaussian).mechanism, Mechanism::Gaussian);
    }

    #[test]
    fn test_sector_counts_sorted_descending() {
        let trades = vec![
            trade("B1", "Energy", 1.0, 1.0),
            trade("B1", "Technology", 1.0, 1.0),
            trade("B1", "Technology", 1.0, 1.0),
            trade("B1", "Financials", 1.0, 1.0),
        ];
        let counts = sector_counts(&trades);
        assert_eq!(
            counts,
            vec![
                ("Technology".to_string(), 2),
                ("Energy".to_string(), 1),
                ("Financials".to_string(), 1),
            ]
        );
    }

    #[test]
    fn test_noisy_histogram_keeps_labels_and_is_non_negative() {
        let mut rng = noise_rng(Some(17));
        let counts = vec![("Technology".to_string(), 1000), ("Energy".to_string(), 0)];
        let bins = noisy_histogram(&counts, 1.0, &mut rng).unwrap();
        assert_eq!(bins.len(), 2);
        assert_eq!(bins[0].label, "Technology");
        assert_eq!(bins[0].true_count, 1000);
        // Laplace(1) noise beyond 50 has probability e^-50
        assert!(bins[0].noisy_count.abs_diff(1000) < 50);
        assert!(bins[1].noisy_count < 50);
    }

    #[test]
    fn test_noisy_histogram_rejects_bad_epsilon() {
        let mut rng = noise_rng(Some(17));
        let counts = vec![("Technology".to_string(), 10)];
        assert!(noisy_histogram(&counts, 0.0, &mut rng).is_err());
    }

    #[test]
    fn test_clamp_count() {
        assert_eq!(clamp_count(-3.2), 1.0);
        assert_eq!(clamp_count(0.4), 1.0);
        assert_eq!(clamp_count(12.5), 12.5);
    }

    #[test]
    fn test_split_budget_average_tracks_true_average() {
        let mut rng = noise_rng(Some(99));
        let values: Vec<f64> = (0..500).map(|i| 40_000.0 + (i % 7) as f64 * 5_000.0).collect();
        let release = split_budget_average(&values, 100_000.0, 1.0, &mut rng).unwrap();

        let expected = values.iter().sum::<f64>() / values.len() as f64;
        assert_eq!(release.true_average, expected);
        assert!(release.noisy_count >= 1.0);
        assert!(
            release.absolute_error() < 0.25 * expected,
            "noisy {} vs true {}",
            release.noisy_average,
            expected
        );
    }

    #[test]
    fn test_split_budget_average_clips_before_summing() {
        let mut rng = noise_rng(Some(1));
        let values = vec![1_000_000.0; 200];
        let release = split_budget_average(&values, 100_000.0, 1.0, &mut rng).unwrap();
        assert_eq!(release.true_average, 100_000.0);
    }

    #[test]
    fn test_split_budget_average_never_divides_below_one() {
        let mut rng = noise_rng(Some(5));
        for _ in 0..200 {
            let release = split_budget_average(&[10.0], 100_000.0, 0.01, &mut rng).unwrap();
            assert!(release.noisy_count >= 1.0);
            assert!(release.noisy_average.is_finite());
        }
    }

    #[test]
    fn test_split_budget_average_rejects_empty_subset() {
        let mut rng = noise_rng(Some(5));
        let err = split_budget_average(&[], 100_000.0, 1.0, &mut rng).unwrap_err();
        assert!(matches!(err, Error::DatasetError(_)));
    }
}
