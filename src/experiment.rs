//! Experiment driver
//!
//! Runs the volume query under every configured (epsilon, mechanism) pair,
//! then the sector histogram and the split-budget average.

use rand::Rng;
use serde::Serialize;
use tracing::info;

use crate::config::ExperimentConfig;
use crate::error::Result;
use crate::noise::{simulate, Mechanism, PrivacyParams, QueryDescriptor, SimulationOutcome};
use crate::query::{
    filter_sector, noisy_histogram, sector_counts, split_budget_average, AverageRelease,
    HistogramBin, Trade, VolumeQuery,
};

/// One row of the privacy/utility comparison
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultRow {
    pub mechanism: Mechanism,
    pub epsilon: f64,
    pub delta: Option<f64>,
    /// Laplace `b` or Gaussian `sigma`
    pub scale: f64,
    pub mae: f64,
    pub mse: f64,
    pub rmse: f64,
    pub rel_error_pct: f64,
    pub example_release: f64,
}

impl ResultRow {
    pub fn from_outcome(
        mechanism: Mechanism,
        params: &PrivacyParams,
        outcome: &SimulationOutcome,
    ) -> Self {
        Self {
            mechanism,
            epsilon: params.epsilon,
            delta: match mechanism {
                Mechanism::Laplace => None,
                Mechanism::Gaussian => params.delta,
            },
            scale: outcome.scale,
            mae: outcome.metrics.mae,
            mse: outcome.metrics.mse,
            rmse: outcome.metrics.rmse,
            rel_error_pct: outcome.metrics.rel_error_pct,
            example_release: outcome.example_release,
        }
    }
}

/// Privacy parameters for `mechanism`; delta is only passed to Gaussian.
pub fn params_for(mechanism: Mechanism, epsilon: f64, delta: f64) -> PrivacyParams {
    match mechanism {
        Mechanism::Laplace => PrivacyParams::pure(epsilon),
        Mechanism::Gaussian => PrivacyParams::approximate(epsilon, delta),
    }
}

/// Simulate one query and flatten the outcome into a row.
pub fn run_query<R: Rng + ?Sized>(
    query: &QueryDescriptor,
    params: &PrivacyParams,
    run_count: usize,
    rng: &mut R,
) -> Result<ResultRow> {
    let outcome = simulate(query, params, run_count, rng)?;
    Ok(ResultRow::from_outcome(query.mechanism, params, &outcome))
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VolumeReport {
    pub query: VolumeQuery,
    pub rows: Vec<ResultRow>,
}

/// Evaluate every configured epsilon for every configured mechanism on the
/// clipped volume of the most active broker.
pub fn run_volume_experiment<R: Rng + ?Sized>(
    trades: &[Trade],
    config: &ExperimentConfig,
    rng: &mut R,
) -> Result<VolumeReport> {
    let query = VolumeQuery::most_active(trades, config.volume_clip)?;
    info!(
        broker = %query.broker_id,
        true_value = query.true_value,
        sensitivity = query.sensitivity,
        "Running volume experiment"
    );

    let mut rows = Vec::with_capacity(config.epsilons.len() * config.mechanisms.len());
    for &epsilon in &config.epsilons {
        for &mechanism in &config.mechanisms {
            let params = params_for(mechanism, epsilon, config.delta);
            let row = run_query(&query.descriptor(mechanism), &params, config.run_count, rng)?;
            rows.push(row);
        }
    }

    Ok(VolumeReport { query, rows })
}

/// Everything produced by one analysis of a trade dataset
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalysisReport {
    pub volume: VolumeReport,
    pub histogram_epsilon: f64,
    pub histogram: Vec<HistogramBin>,
    pub average_sector: String,
    pub average_epsilon: f64,
    pub average: AverageRelease,
}

pub fn run_analysis<R: Rng + ?Sized>(
    trades: &[Trade],
    config: &ExperimentConfig,
    rng: &mut R,
) -> Result<AnalysisReport> {
    config.validate()?;

    let volume = run_volume_experiment(trades, config, rng)?;

    info!(epsilon = config.histogram_epsilon, "Releasing sector histogram");
    let histogram = noisy_histogram(&sector_counts(trades), config.histogram_epsilon, rng)?;

    info!(
        sector = %config.average_sector,
        epsilon = config.average_epsilon,
        "Releasing split-budget average trade value"
    );
    let values: Vec<f64> = filter_sector(trades, &config.average_sector)
        .into_iter()
        .map(|t| t.trade_value)
        .collect();
    let average = split_budget_average(&values, config.average_clip, config.average_epsilon, rng)?;

    Ok(AnalysisReport {
        volume,
        histogram_epsilon: config.histogram_epsilon,
        histogram,
        average_sector: config.average_sector.clone(),
        average_epsilon: config.average_epsilon,
        average,
    })
}
