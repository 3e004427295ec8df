//! dp-tradeoff: privacy/utility trade-off of differentially private aggregates
//!
//! The [`noise`] module holds the Laplace and Gaussian mechanisms and the
//! simulation runner that reduces repeated noisy releases to MAE, MSE, RMSE
//! and relative error. [`query`], [`experiment`] and [`report`] drive it over
//! a CSV of financial trades.
//!
//! ```no_run
//! use dp_tradeoff::noise::{noise_rng, simulate, Mechanism, PrivacyParams, QueryDescriptor};
//!
//! let query = QueryDescriptor::new(Mechanism::Laplace, 4_645_408.0, 19_787.0);
//! let mut rng = noise_rng(Some(42));
//! let outcome = simulate(&query, &PrivacyParams::pure(0.5), 1000, &mut rng)?;
//! println!("b = {}, MAE = {}", outcome.scale, outcome.metrics.mae);
//! # Ok::<(), dp_tradeoff::Error>(())
//! ```

pub mod config;
pub mod error;
pub mod experiment;
pub mod noise;
pub mod query;
pub mod report;

pub use config::ExperimentConfig;
pub use error::{Error, Result};
