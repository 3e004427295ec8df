//! Experiment configuration
//!
//! Loaded from TOML; every field falls back to the defaults of the reference
//! analysis (1000 runs, δ = 1e-5, ε ∈ {0.5, 2.0}).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::noise::Mechanism;

/// Parameters for one full analysis of a trade dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExperimentConfig {
    /// Number of noisy releases per (mechanism, epsilon) pair
    pub run_count: usize,
    /// Failure probability for the Gaussian mechanism
    pub delta: f64,
    /// Privacy budgets evaluated by the volume experiment
    pub epsilons: Vec<f64>,
    pub mechanisms: Vec<Mechanism>,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
    /// Upper bound applied to each trade quantity before summing
    pub volume_clip: f64,
    pub histogram_epsilon: f64,
    /// Total budget of the split-budget average, halved between sum and count
    pub average_epsilon: f64,
    pub average_sector: String,
    /// Upper bound applied to each trade value before averaging
    pub average_clip: f64,
}

impl Default for ExperimentConfig {
    fn default() -> Self {
        Self {
            run_count: 1000,
            delta: 1e-5,
            epsilons: vec![0.5, 2.0],
            mechanisms: Mechanism::ALL.to_vec(),
            seed: None,
            volume_clip: 20_000.0,
            histogram_epsilon: 1.0,
            average_epsilon: 1.0,
            average_sector: "Technology".to_string(),
            average_clip: 100_000.0,
        }
    }
}

impl ExperimentConfig {
    /// Read and validate a TOML configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content).map_err(|e| match e {
            Error::ConfigError(msg) => Error::ConfigError(format!("{}: {msg}", path.display())),
            other => other,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).map_err(|e| {
            // Unknown mechanism names surface through serde; keep their kind.
            match find_unsupported_mechanism(content) {
                Some(name) => Error::UnsupportedMechanism(name),
                None => Error::ConfigError(e.to_string()),
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make every simulation fail.
    pub fn validate(&self) -> Result<()> {
        if self.run_count == 0 {
            return Err(Error::invalid("run_count", "must be at least 1"));
        }
        if !(self.delta > 0.0 && self.delta < 1.0) {
            return Err(Error::invalid(
                "delta",
                format!("must lie in (0, 1), got {}", self.delta),
            ));
        }
        if self.epsilons.is_empty() {
            return Err(Error::ConfigError("epsilons must not be empty".to_string()));
        }
        if self.mechanisms.is_empty() {
            return Err(Error::ConfigError("mechanisms must not be empty".to_string()));
        }
        for &epsilon in &self.epsilons {
            positive("epsilons", epsilon)?;
        }
        positive("histogram_epsilon", self.histogram_epsilon)?;
        positive("average_epsilon", self.average_epsilon)?;
        positive("volume_clip", self.volume_clip)?;
        positive("average_clip", self.average_clip)?;
        Ok(())
    }

    /// Commented TOML with every default spelled out
    pub fn example_toml() -> &'static str {
        r#"# dp-tradeoff configuration

# Noisy releases per (mechanism, epsilon) pair
run_count = 1000
# Failure probability for the Gaussian mechanism
delta = 1e-5
epsilons = [0.5, 2.0]
mechanisms = ["Laplace", "Gaussian"]
# seed = 42

# Volume query: per-trade quantity clip, also the sensitivity of the sum
volume_clip = 20000.0

# Sector histogram budget (count sensitivity is 1)
histogram_epsilon = 1.0

# Split-budget average trade value
average_epsilon = 1.0
average_sector = "Technology"
average_clip = 100000.0
"#
    }
}

fn positive(name: &'static str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(
            name,
            format!("must be a positive finite number, got {value}"),
        ))
    }
}

fn find_unsupported_mechanism(content: &str) -> Option<String> {
    let value: toml::Value = toml::from_str(content).ok()?;
    value
        .get("mechanisms")?
        .as_array()?
        .iter()
        .filter_map(|m| m.as_str())
        .find(|name| name.parse::<Mechanism>().is_err())
        .map(str::to_string)
}
