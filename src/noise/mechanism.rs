//! Laplace and Gaussian noise mechanisms
//!
//! A [`Mechanism`] plus a sensitivity and a privacy budget is turned into a
//! [`Calibration`], which carries the exact noise parameter used for every
//! draw. Validation always happens before the generator is touched, so a
//! rejected call leaves the random stream where it was.

use std::fmt;
use std::str::FromStr;

use rand::Rng;
use rand_distr::{Distribution, Exp, Normal};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Noise-addition mechanism
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Mechanism {
    /// Pure (ε, 0)-DP, Laplace noise with scale Δf/ε
    Laplace,
    /// Approximate (ε, δ)-DP, normal noise with calibrated sigma
    Gaussian,
}

impl Mechanism {
    pub const ALL: [Mechanism; 2] = [Mechanism::Laplace, Mechanism::Gaussian];

    pub fn as_str(&self) -> &'static str {
        match self {
            Mechanism::Laplace => "Laplace",
            Mechanism::Gaussian => "Gaussian",
        }
    }

    /// Name of the noise parameter reported for this mechanism
    pub fn scale_label(&self) -> &'static str {
        match self {
            Mechanism::Laplace => "b",
            Mechanism::Gaussian => "sigma",
        }
    }
}

impl fmt::Display for Mechanism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mechanism {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "laplace" => Ok(Mechanism::Laplace),
            "gaussian" => Ok(Mechanism::Gaussian),
            _ => Err(Error::UnsupportedMechanism(s.to_string())),
        }
    }
}

impl TryFrom<String> for Mechanism {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<Mechanism> for String {
    fn from(value: Mechanism) -> Self {
        value.as_str().to_string()
    }
}

/// Privacy budget for a single release
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PrivacyParams {
    /// Privacy budget (lower means more privacy)
    pub epsilon: f64,
    /// Failure probability, only meaningful for the Gaussian mechanism
    pub delta: Option<f64>,
}

impl PrivacyParams {
    /// Budget for pure ε-DP
    pub fn pure(epsilon: f64) -> Self {
        Self {
            epsilon,
            delta: None,
        }
    }

    /// Budget for approximate (ε, δ)-DP
    pub fn approximate(epsilon: f64, delta: f64) -> Self {
        Self {
            epsilon,
            delta: Some(delta),
        }
    }
}

/// A mechanism with its noise parameter already derived
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "mechanism")]
pub enum Calibration {
    Laplace { scale: f64 },
    Gaussian { sigma: f64 },
}

impl Calibration {
    pub fn mechanism(&self) -> Mechanism {
        match self {
            Calibration::Laplace { .. } => Mechanism::Laplace,
            Calibration::Gaussian { .. } => Mechanism::Gaussian,
        }
    }

    /// Laplace scale `b` or Gaussian `sigma`
    pub fn scale(&self) -> f64 {
        match *self {
            Calibration::Laplace { scale } => scale,
            Calibration::Gaussian { sigma } => sigma,
        }
    }

    /// Draw one zero-centred noise term.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<f64> {
        Ok(self.sampler()?.draw(rng))
    }

    /// Build a reusable sampler so repeated draws share one distribution.
    ///
    /// Hand-built calibrations are checked too: a zero, negative or
    /// non-finite parameter would release the true value or NaN.
    pub fn sampler(&self) -> Result<NoiseSampler> {
        match *self {
            Calibration::Laplace { scale } => Exp::new(1.0 / validate_scale("scale", scale)?)
                .map(NoiseSampler::Laplace)
                .map_err(|e| Error::invalid("scale", e.to_string())),
            Calibration::Gaussian { sigma } => Normal::new(0.0, validate_scale("sigma", sigma)?)
                .map(NoiseSampler::Gaussian)
                .map_err(|e| Error::invalid("sigma", e.to_string())),
        }
    }
}

/// Distribution backing a [`Calibration`]
#[derive(Debug, Clone, Copy)]
pub enum NoiseSampler {
    Laplace(Exp<f64>),
    Gaussian(Normal<f64>),
}

impl NoiseSampler {
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> f64 {
        match self {
            // Laplace(0, b) is equivalent to Exp(1/b) - Exp(1/b)
            NoiseSampler::Laplace(exp) => exp.sample(rng) - exp.sample(rng),
            NoiseSampler::Gaussian(normal) => normal.sample(rng),
        }
    }
}

/// Laplace scale `b = Δf / ε`
pub fn laplace_scale(sensitivity: f64, epsilon: f64) -> Result<f64> {
    validate_sensitivity(sensitivity)?;
    validate_epsilon(epsilon)?;
    validate_scale("scale", sensitivity / epsilon)
}

/// Gaussian standard deviation `σ = sqrt(2 ln(1.25/δ)) · Δf / ε`
pub fn gaussian_sigma(sensitivity: f64, epsilon: f64, delta: Option<f64>) -> Result<f64> {
    validate_sensitivity(sensitivity)?;
    validate_epsilon(epsilon)?;
    let delta = validate_delta(delta)?;
    validate_scale(
        "sigma",
        (2.0 * (1.25 / delta).ln()).sqrt() * (sensitivity / epsilon),
    )
}

/// Derive the noise parameter for `mechanism`.
pub fn calibrate(
    mechanism: Mechanism,
    sensitivity: f64,
    params: &PrivacyParams,
) -> Result<Calibration> {
    match mechanism {
        Mechanism::Laplace => Ok(Calibration::Laplace {
            scale: laplace_scale(sensitivity, params.epsilon)?,
        }),
        Mechanism::Gaussian => Ok(Calibration::Gaussian {
            sigma: gaussian_sigma(sensitivity, params.epsilon, params.delta)?,
        }),
    }
}

/// Draw a single noise term for the given configuration.
pub fn draw_noise<R: Rng + ?Sized>(
    mechanism: Mechanism,
    sensitivity: f64,
    params: &PrivacyParams,
    rng: &mut R,
) -> Result<f64> {
    calibrate(mechanism, sensitivity, params)?.sample(rng)
}

/// Privatize `value` with one draw.
pub fn add_noise<R: Rng + ?Sized>(
    value: f64,
    mechanism: Mechanism,
    sensitivity: f64,
    params: &PrivacyParams,
    rng: &mut R,
) -> Result<f64> {
    Ok(value + draw_noise(mechanism, sensitivity, params, rng)?)
}

fn validate_sensitivity(sensitivity: f64) -> Result<()> {
    if sensitivity.is_finite() && sensitivity > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(
            "sensitivity",
            format!("must be a positive finite number, got {sensitivity}"),
        ))
    }
}

fn validate_epsilon(epsilon: f64) -> Result<()> {
    if epsilon.is_finite() && epsilon > 0.0 {
        Ok(())
    } else {
        Err(Error::invalid(
            "epsilon",
            format!("must be a positive finite number, got {epsilon}"),
        ))
    }
}

/// Overflowing ratios (huge sensitivity, tiny epsilon) are rejected too.
fn validate_scale(name: &'static str, scale: f64) -> Result<f64> {
    if scale.is_finite() && scale > 0.0 {
        Ok(scale)
    } else {
        Err(Error::invalid(
            name,
            format!("derived noise parameter is not a positive finite number: {scale}"),
        ))
    }
}

fn validate_delta(delta: Option<f64>) -> Result<f64> {
    match delta {
        None => Err(Error::invalid(
            "delta",
            "required for the Gaussian mechanism",
        )),
        Some(d) if d > 0.0 && d < 1.0 => Ok(d),
        Some(d) => Err(Error::invalid(
            "delta",
            format!("must lie in (0, 1), got {d}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_laplace_scale_is_sensitivity_over_epsilon() {
        assert_eq!(laplace_scale(19787.0, 0.5).unwrap(), 39574.0);
        assert_eq!(laplace_scale(19787.0, 2.0).unwrap(), 9893.5);
    }

    #[test]
    fn test_gaussian_sigma_closed_form() {
        let sigma = gaussian_sigma(20000.0, 1.0, Some(1e-5)).unwrap();
        let expected = (2.0 * (1.25f64 / 1e-5).ln()).sqrt() * 20000.0;
        assert_eq!(sigma, expected);
    }

    #[test]
    fn test_laplace_ignores_delta() {
        let params = PrivacyParams::approximate(1.0, 5.0);
        let calibration = calibrate(Mechanism::Laplace, 1.0, &params).unwrap();
        assert_eq!(calibration, Calibration::Laplace { scale: 1.0 });
    }

    #[test]
    fn test_gaussian_requires_delta() {
        let err = calibrate(Mechanism::Gaussian, 1.0, &PrivacyParams::pure(1.0)).unwrap_err();
        assert!(matches!(err, Error::InvalidParameter { name: "delta", .. }));
    }

    #[test]
    fn test_rejects_bad_parameters() {
        for (sensitivity, epsilon, delta) in [
            (1.0, 0.0, Some(1e-5)),
            (1.0, -1.0, Some(1e-5)),
            (0.0, 1.0, Some(1e-5)),
            (f64::NAN, 1.0, Some(1e-5)),
            (1.0, f64::INFINITY, Some(1e-5)),
            (1.0, 1.0, Some(0.0)),
            (1.0, 1.0, Some(1.0)),
            (f64::MAX, 1e-10, Some(1e-5)),
        ] {
            let params = PrivacyParams { epsilon, delta };
            let err = calibrate(Mechanism::Gaussian, sensitivity, &params).unwrap_err();
            assert!(err.is_parameter_error(), "{sensitivity} {epsilon} {delta:?}");
        }
    }

    #[test]
    fn test_parse_mechanism_names() {
        assert_eq!("Laplace".parse::<Mechanism>().unwrap(), Mechanism::Laplace);
        assert_eq!(" gaussian ".parse::<Mechanism>().unwrap(), Mechanism::Gaussian);
        let err = "Exponential".parse::<Mechanism>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedMechanism(name) if name == "Exponential"));
    }

    #[test]
    fn test_mechanism_serde_uses_names() {
        let json = serde_json::to_string(&Mechanism::Gaussian).unwrap();
        assert_eq!(json, "\"Gaussian\"");
        let parsed: Mechanism = serde_json::from_str("\"laplace\"").unwrap();
        assert_eq!(parsed, Mechanism::Laplace);
        assert!(serde_json::from_str::<Mechanism>("\"Geometric\"").is_err());
    }

    #[test]
    fn test_add_noise_is_value_plus_drawn_noise() {
        let params = PrivacyParams::approximate(0.5, 1e-5);
        for mechanism in Mechanism::ALL {
            let noisy = add_noise(
                4_645_408.0,
                mechanism,
                19_787.0,
                &params,
                &mut StdRng::seed_from_u64(7),
            )
            .unwrap();
            let noise =
                draw_noise(mechanism, 19_787.0, &params, &mut StdRng::seed_from_u64(7)).unwrap();
            assert_eq!(noisy, 4_645_408.0 + noise);
            assert_ne!(noise, 0.0);
        }
    }

    #[test]
    fn test_hand_built_calibration_is_validated() {
        let mut rng = StdRng::seed_from_u64(3);
        for calibration in [
            Calibration::Laplace { scale: 0.0 },
            Calibration::Laplace { scale: -2.0 },
            Calibration::Laplace { scale: f64::INFINITY },
            Calibration::Gaussian { sigma: 0.0 },
            Calibration::Gaussian { sigma: f64::NAN },
        ] {
            let err = calibration.sample(&mut rng).unwrap_err();
            assert!(
                matches!(err, Error::InvalidParameter { .. }),
                "{calibration:?} gave {err:?}"
            );
            assert!(calibration.sampler().is_err());
        }
    }

    #[test]
    fn test_draw_noise_is_reproducible_with_seed() {
        let params = PrivacyParams::approximate(1.0, 1e-5);
        let mut a = StdRng::seed_from_u64(42);
        let mut b = StdRng::seed_from_u64(42);
        for mechanism in Mechanism::ALL {
            let x = draw_noise(mechanism, 10.0, &params, &mut a).unwrap();
            let y = draw_noise(mechanism, 10.0, &params, &mut b).unwrap();
            assert_eq!(x.to_bits(), y.to_bits());
        }
    }

    #[test]
    fn test_sample_mean_is_near_zero() {
        let mut rng = StdRng::seed_from_u64(11);
        for calibration in [
            Calibration::Laplace { scale: 1.0 },
            Calibration::Gaussian { sigma: 1.0 },
        ] {
            let sampler = calibration.sampler().unwrap();
            let n = 20_000;
            let mean: f64 = (0..n).map(|_| sampler.draw(&mut rng)).sum::<f64>() / n as f64;
            assert!(mean.abs() < 0.05, "{calibration:?} mean {mean}");
        }
    }
}
