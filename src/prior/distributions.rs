use enum_dispatch::enum_dispatch;
use ordered_float::NotNan;
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use statrs::distribution::{Continuous, ContinuousCDF, Normal};
use std::fmt::Debug;
use std::hash::Hash;

#[enum_dispatch]
pub trait PriorTrait:
    Clone + Debug + Serialize + DeserializeOwned + PartialEq + Eq + Hash
{
    /// Probability density at x
    ///
    /// Points outside of the support give exactly zero, never a negative value or NaN.
    fn density(&self, x: f64) -> f64;

    /// Map a `[0, 1)` unit-cube coordinate to the parameter space (inverse CDF)
    ///
    /// `None` means that the prior doesn't support this transform.
    fn from_unit_cube(&self, u: f64) -> Option<f64>;
}

/// Prior distribution of a single model parameter
#[enum_dispatch(PriorTrait)]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum Prior {
    Uniform(UniformPrior),
    LogUniform(LogUniformPrior),
    Normal(NormalPrior),
    LogNormal(LogNormalPrior),
    TruncatedNormal(TruncatedNormalPrior),
    Mix(MixPrior),
}

impl Prior {
    pub fn uniform(lower: f64, upper: f64) -> Self {
        UniformPrior::new(lower, upper).into()
    }

    pub fn log_uniform(lower: f64, upper: f64) -> Self {
        LogUniformPrior::new(lower, upper).into()
    }

    pub fn normal(mu: f64, sigma: f64) -> Self {
        NormalPrior::new(mu, sigma).into()
    }

    pub fn log_normal(mu: f64, sigma: f64) -> Self {
        LogNormalPrior::new(mu, sigma).into()
    }

    pub fn truncated_normal(mu: f64, sigma: f64, lower: f64, upper: f64) -> Self {
        TruncatedNormalPrior::new(mu, sigma, lower, upper).into()
    }

    pub fn mix(weight_prior_pairs: &[(f64, Prior)]) -> Self {
        MixPrior::new(weight_prior_pairs).into()
    }
}

fn not_nan_density(density: f64) -> f64 {
    if density.is_nan() { 0.0 } else { density }
}

fn normal_density(mu: f64, sigma: f64, x: f64) -> f64 {
    Normal::new(mu, sigma).map_or(0.0, |normal| not_nan_density(normal.pdf(x)))
}

/// Inverse CDF of the normal distribution, NaN outside of `[0, 1]`
fn normal_quantile(mu: f64, sigma: f64, u: f64) -> Option<f64> {
    let normal = Normal::new(mu, sigma).ok()?;
    if (0.0..=1.0).contains(&u) {
        Some(normal.inverse_cdf(u))
    } else {
        Some(f64::NAN)
    }
}

/// Flat density on `[lower, upper]`
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct UniformPrior {
    lower: NotNan<f64>,
    upper: NotNan<f64>,
}

impl UniformPrior {
    pub fn new(lower: f64, upper: f64) -> Self {
        assert!(lower.is_finite(), "lower must be finite");
        assert!(upper.is_finite(), "upper must be finite");
        assert!(lower < upper, "upper must be larger than lower");
        Self {
            lower: NotNan::new(lower).expect("lower must be not NaN"),
            upper: NotNan::new(upper).expect("upper must be not NaN"),
        }
    }

    pub fn lower(&self) -> f64 {
        self.lower.into_inner()
    }

    pub fn upper(&self) -> f64 {
        self.upper.into_inner()
    }
}

impl PriorTrait for UniformPrior {
    fn density(&self, x: f64) -> f64 {
        if x >= self.lower() && x <= self.upper() {
            (self.upper() - self.lower()).recip()
        } else {
            0.0
        }
    }

    fn from_unit_cube(&self, u: f64) -> Option<f64> {
        Some(self.lower() + u * (self.upper() - self.lower()))
    }
}

/// Density proportional to `1/x` on `[lower, upper]`, `lower` must be positive
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct LogUniformPrior {
    lower: NotNan<f64>,
    upper: NotNan<f64>,
}

impl LogUniformPrior {
    pub fn new(lower: f64, upper: f64) -> Self {
        assert!(lower > 0.0, "lower must be positive");
        assert!(upper.is_finite(), "upper must be finite");
        assert!(lower < upper, "upper must be larger than lower");
        Self {
            lower: NotNan::new(lower).expect("lower must be not NaN"),
            upper: NotNan::new(upper).expect("upper must be not NaN"),
        }
    }

    fn ln_lower(&self) -> f64 {
        f64::ln(self.lower.into_inner())
    }

    fn ln_ratio(&self) -> f64 {
        f64::ln(self.upper.into_inner() / self.lower.into_inner())
    }
}

impl PriorTrait for LogUniformPrior {
    fn density(&self, x: f64) -> f64 {
        if x >= self.lower.into_inner() && x <= self.upper.into_inner() {
            (x * self.ln_ratio()).recip()
        } else {
            0.0
        }
    }

    fn from_unit_cube(&self, u: f64) -> Option<f64> {
        Some(f64::exp(self.ln_lower() + u * self.ln_ratio()))
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct NormalPrior {
    mu: NotNan<f64>,
    sigma: NotNan<f64>,
}

impl NormalPrior {
    pub fn new(mu: f64, sigma: f64) -> Self {
        assert!(mu.is_finite(), "mu must be finite");
        assert!(sigma > 0.0 && sigma.is_finite(), "sigma must be positive and finite");
        Self {
            mu: NotNan::new(mu).expect("mu must be not NaN"),
            sigma: NotNan::new(sigma).expect("sigma must be not NaN"),
        }
    }

    fn mu(&self) -> f64 {
        self.mu.into_inner()
    }

    fn sigma(&self) -> f64 {
        self.sigma.into_inner()
    }
}

impl PriorTrait for NormalPrior {
    fn density(&self, x: f64) -> f64 {
        normal_density(self.mu(), self.sigma(), x)
    }

    fn from_unit_cube(&self, u: f64) -> Option<f64> {
        normal_quantile(self.mu(), self.sigma(), u)
    }
}

/// Normal distribution of `ln(x)`
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct LogNormalPrior {
    mu: NotNan<f64>,
    sigma: NotNan<f64>,
}

impl LogNormalPrior {
    pub fn new(mu: f64, sigma: f64) -> Self {
        assert!(mu.is_finite(), "mu must be finite");
        assert!(sigma > 0.0 && sigma.is_finite(), "sigma must be positive and finite");
        Self {
            mu: NotNan::new(mu).expect("mu must be not NaN"),
            sigma: NotNan::new(sigma).expect("sigma must be not NaN"),
        }
    }
}

impl PriorTrait for LogNormalPrior {
    fn density(&self, x: f64) -> f64 {
        if x > 0.0 {
            let (mu, sigma) = (self.mu.into_inner(), self.sigma.into_inner());
            not_nan_density(normal_density(mu, sigma, f64::ln(x)) / x)
        } else {
            0.0
        }
    }

    fn from_unit_cube(&self, u: f64) -> Option<f64> {
        normal_quantile(self.mu.into_inner(), self.sigma.into_inner(), u).map(f64::exp)
    }
}

/// Normal distribution restricted to `[lower, upper]` and renormalized
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct TruncatedNormalPrior {
    mu: NotNan<f64>,
    sigma: NotNan<f64>,
    lower: NotNan<f64>,
    upper: NotNan<f64>,
}

impl TruncatedNormalPrior {
    pub fn new(mu: f64, sigma: f64, lower: f64, upper: f64) -> Self {
        assert!(mu.is_finite(), "mu must be finite");
        assert!(sigma > 0.0 && sigma.is_finite(), "sigma must be positive and finite");
        assert!(lower < upper, "upper must be larger than lower");
        Self {
            mu: NotNan::new(mu).expect("mu must be not NaN"),
            sigma: NotNan::new(sigma).expect("sigma must be not NaN"),
            lower: NotNan::new(lower).expect("lower must be not NaN"),
            upper: NotNan::new(upper).expect("upper must be not NaN"),
        }
    }

    fn normal(&self) -> Option<Normal> {
        Normal::new(self.mu.into_inner(), self.sigma.into_inner()).ok()
    }

    /// CDF of the untruncated distribution at the bounds
    fn cdf_bounds(normal: &Normal, lower: f64, upper: f64) -> (f64, f64) {
        (normal.cdf(lower), normal.cdf(upper))
    }
}

impl PriorTrait for TruncatedNormalPrior {
    fn density(&self, x: f64) -> f64 {
        let (lower, upper) = (self.lower.into_inner(), self.upper.into_inner());
        if !(x >= lower && x <= upper) {
            return 0.0;
        }
        let Some(normal) = self.normal() else {
            return 0.0;
        };
        let (cdf_lower, cdf_upper) = Self::cdf_bounds(&normal, lower, upper);
        let norm = cdf_upper - cdf_lower;
        if norm <= 0.0 {
            return 0.0;
        }
        not_nan_density(normal.pdf(x) / norm)
    }

    fn from_unit_cube(&self, u: f64) -> Option<f64> {
        let (lower, upper) = (self.lower.into_inner(), self.upper.into_inner());
        let normal = self.normal()?;
        if !(0.0..=1.0).contains(&u) {
            return Some(f64::NAN);
        }
        let (cdf_lower, cdf_upper) = Self::cdf_bounds(&normal, lower, upper);
        let x = normal.inverse_cdf(cdf_lower + u * (cdf_upper - cdf_lower));
        Some(x.clamp(lower, upper))
    }
}

/// Weighted mixture of priors
///
/// The mixture has no closed-form inverse CDF, so it cannot be used with unit-cube samplers.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct MixPrior {
    mix: Vec<(NotNan<f64>, Prior)>,
}

impl MixPrior {
    /// Create [MixPrior] from pairs of a weight (positive number) and a [Prior]
    pub fn new(weight_prior_pairs: &[(f64, Prior)]) -> Self {
        assert!(!weight_prior_pairs.is_empty(), "mixture must not be empty");
        let total_weight: f64 = weight_prior_pairs.iter().map(|(weight, _)| *weight).sum();
        let mix = weight_prior_pairs
            .iter()
            .map(|(weight, prior)| {
                assert!(*weight > 0.0, "weights must be positive and finite");
                (
                    NotNan::new(*weight / total_weight)
                        .expect("weights must be positive and finite"),
                    prior.clone(),
                )
            })
            .collect();
        Self { mix }
    }
}

impl PriorTrait for MixPrior {
    fn density(&self, x: f64) -> f64 {
        self.mix
            .iter()
            .map(|(weight, prior)| weight.into_inner() * prior.density(x))
            .sum()
    }

    fn from_unit_cube(&self, _u: f64) -> Option<f64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    fn integrate(prior: &Prior, a: f64, b: f64) -> f64 {
        const N: usize = 200_000;
        let h = (b - a) / N as f64;
        (0..N)
            .map(|i| prior.density(a + (i as f64 + 0.5) * h) * h)
            .sum()
    }

    #[test]
    fn uniform_density_and_support() {
        let prior = Prior::uniform(0.0, 5.0);
        assert_relative_eq!(prior.density(3.0), 0.2);
        assert_eq!(prior.density(-1e-9), 0.0);
        assert_eq!(prior.density(5.1), 0.0);
        assert_eq!(prior.density(f64::NAN), 0.0);
        assert_relative_eq!(prior.from_unit_cube(0.5).unwrap(), 2.5);
    }

    #[test]
    fn log_uniform_normalized() {
        let prior = Prior::log_uniform(1.0, 100.0);
        assert_relative_eq!(integrate(&prior, 1.0, 100.0), 1.0, epsilon = 1e-6);
        assert_eq!(prior.density(0.5), 0.0);
        assert_relative_eq!(prior.from_unit_cube(0.5).unwrap(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn normal_median_from_unit_cube() {
        let prior = Prior::normal(3.0, 2.0);
        assert_relative_eq!(prior.from_unit_cube(0.5).unwrap(), 3.0, epsilon = 1e-12);
        assert_relative_eq!(integrate(&prior, -17.0, 23.0), 1.0, epsilon = 1e-6);
    }

    #[test]
    fn normal_quantiles() {
        let prior = Prior::normal(3.0, 2.0);
        assert_relative_eq!(
            prior.from_unit_cube(0.975).unwrap(),
            3.0 + 2.0 * 1.959_963_984_540_054,
            epsilon = 1e-8
        );
        assert_relative_eq!(
            prior.from_unit_cube(0.001).unwrap(),
            3.0 - 2.0 * 3.090_232_306_167_813_5,
            epsilon = 1e-8
        );
        assert_eq!(prior.from_unit_cube(0.0).unwrap(), f64::NEG_INFINITY);
        assert!(prior.from_unit_cube(1.5).unwrap().is_nan());
        // 1 / (2 sqrt(2 pi))
        assert_relative_eq!(prior.density(3.0), 0.199_471_140_200_716_35, epsilon = 1e-12);
    }

    #[test]
    fn log_normal_density_is_zero_for_non_positive() {
        let prior = Prior::log_normal(0.0, 1.0);
        assert_eq!(prior.density(0.0), 0.0);
        assert_eq!(prior.density(-1.0), 0.0);
        assert_relative_eq!(prior.from_unit_cube(0.5).unwrap(), 1.0, epsilon = 1e-12);
        assert_relative_eq!(
            prior.from_unit_cube(0.975).unwrap(),
            7.099_071_384_231_335,
            max_relative = 1e-8
        );
        assert_relative_eq!(integrate(&prior, 1e-9, 200.0), 1.0, epsilon = 1e-4);
    }

    #[test]
    fn truncated_normal_stays_in_bounds() {
        let prior = Prior::truncated_normal(0.0, 1.0, -1.0, 2.0);
        assert_relative_eq!(integrate(&prior, -1.0, 2.0), 1.0, epsilon = 1e-6);
        for i in 0..100 {
            let x = prior.from_unit_cube(i as f64 / 100.0).unwrap();
            assert!((-1.0..=2.0).contains(&x));
            assert!(prior.density(x) > 0.0);
        }
        assert_eq!(prior.density(2.5), 0.0);
        // phi(0) / (Phi(2) - Phi(-1))
        assert_relative_eq!(prior.density(0.0), 0.487_350_238_469_530_7, epsilon = 1e-10);
        assert_relative_eq!(prior.from_unit_cube(0.0).unwrap(), -1.0, epsilon = 1e-8);
    }

    #[test]
    fn mix_has_no_unit_cube_transform() {
        let prior = Prior::mix(&[
            (1.0, Prior::normal(0.0, 1.0)),
            (3.0, Prior::uniform(0.0, 1.0)),
        ]);
        assert!(prior.from_unit_cube(0.5).is_none());
        assert_relative_eq!(
            prior.density(0.5),
            0.25 * Prior::normal(0.0, 1.0).density(0.5) + 0.75,
            epsilon = 1e-12
        );
    }

    #[test]
    fn serde_round_trip() {
        let prior = Prior::mix(&[(1.0, Prior::log_uniform(1.0, 10.0))]);
        let json = serde_json::to_string(&prior).unwrap();
        let deserialized: Prior = serde_json::from_str(&json).unwrap();
        assert_eq!(prior, deserialized);
    }
}
