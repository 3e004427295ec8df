//! Repeated noisy releases and utility-loss metrics
//!
//! [`simulate`] calibrates a mechanism once, draws `run_count` independent
//! noise terms with that fixed calibration and reduces them to MAE, MSE, RMSE
//! and relative error.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tracing::debug;

use super::mechanism::{calibrate, Calibration, Mechanism, PrivacyParams};
use crate::error::{Error, Result};

/// One statistic to be privatized
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct QueryDescriptor {
    pub true_value: f64,
    /// Maximum change of `true_value` from adding or removing one record.
    /// Supplied by the caller (e.g. a clipping bound) and trusted as-is.
    pub sensitivity: f64,
    pub mechanism: Mechanism,
}

impl QueryDescriptor {
    pub fn new(mechanism: Mechanism, true_value: f64, sensitivity: f64) -> Self {
        Self {
            true_value,
            sensitivity,
            mechanism,
        }
    }
}

/// Ordered noise draws produced under a single calibration
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseSampleSet {
    calibration: Calibration,
    samples: Vec<f64>,
}

impl NoiseSampleSet {
    /// Draw `run_count` samples from `calibration`.
    pub fn draw<R: Rng + ?Sized>(
        calibration: Calibration,
        run_count: usize,
        rng: &mut R,
    ) -> Result<Self> {
        if run_count == 0 {
            return Err(Error::invalid("run_count", "must be at least 1"));
        }
        let sampler = calibration.sampler()?;
        let samples = (0..run_count).map(|_| sampler.draw(rng)).collect();
        Ok(Self {
            calibration,
            samples,
        })
    }

    pub fn calibration(&self) -> Calibration {
        self.calibration
    }

    pub fn samples(&self) -> &[f64] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// First draw; a set always holds at least one sample.
    pub fn first(&self) -> f64 {
        self.samples[0]
    }
}

/// Utility-loss statistics of one simulation run
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct MetricsRecord {
    /// Mean absolute error
    pub mae: f64,
    /// Mean squared error
    pub mse: f64,
    /// Root mean squared error, always `mse.sqrt()`
    pub rmse: f64,
    /// `100 * mae / |true_value|`, or zero when the true value is zero
    pub rel_error_pct: f64,
}

impl MetricsRecord {
    /// Reduce noise samples to metrics. `samples` must be non-empty.
    pub fn from_samples(samples: &[f64], true_value: f64) -> Self {
        let n = samples.len() as f64;
        let mae = samples.iter().map(|s| s.abs()).sum::<f64>() / n;
        let mse = samples.iter().map(|s| s * s).sum::<f64>() / n;
        let rel_error_pct = if true_value != 0.0 {
            mae / true_value.abs() * 100.0
        } else {
            0.0
        };

        Self {
            mae,
            mse,
            rmse: mse.sqrt(),
            rel_error_pct,
        }
    }
}

/// Result of [`simulate`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationOutcome {
    pub metrics: MetricsRecord,
    /// `true_value + samples[0]`, for display only
    pub example_release: f64,
    /// Laplace `b` or Gaussian `sigma` actually used
    pub scale: f64,
    #[serde(skip)]
    pub samples: NoiseSampleSet,
}

/// Run `run_count` independent noisy releases of `query` and summarize them.
///
/// All validation happens before the first draw, so a failing call consumes
/// no randomness.
pub fn simulate<R: Rng + ?Sized>(
    query: &QueryDescriptor,
    params: &PrivacyParams,
    run_count: usize,
    rng: &mut R,
) -> Result<SimulationOutcome> {
    if run_count == 0 {
        return Err(Error::invalid("run_count", "must be at least 1"));
    }
    let calibration = calibrate(query.mechanism, query.sensitivity, params)?;
    let samples = NoiseSampleSet::draw(calibration, run_count, rng)?;

    let metrics = MetricsRecord::from_samples(samples.samples(), query.true_value);
    let example_release = query.true_value + samples.first();

    debug!(
        mechanism = %query.mechanism,
        epsilon = params.epsilon,
        scale = calibration.scale(),
        run_count,
        mae = metrics.mae,
        "Simulation complete"
    );

    Ok(SimulationOutcome {
        metrics,
        example_release,
        scale: calibration.scale(),
        samples,
    })
}

/// Build the generator used for noise draws.
///
/// A fixed seed yields a fixed draw sequence; `None` seeds from OS entropy.
pub fn noise_rng(seed: Option<u64>) -> StdRng {
    match seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    }
}
