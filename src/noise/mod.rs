//! Differential-privacy noise engine
//!
//! Provides the Laplace and Gaussian mechanisms and the simulation runner that
//! turns repeated noisy releases into utility-loss metrics.

pub mod mechanism;
pub mod simulation;

pub use mechanism::{
    add_noise, calibrate, draw_noise, gaussian_sigma, laplace_scale, Calibration, Mechanism,
    NoiseSampler, PrivacyParams,
};
pub use simulation::{
    noise_rng, simulate, MetricsRecord, NoiseSampleSet, QueryDescriptor, SimulationOutcome,
};
