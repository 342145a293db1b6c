use crate::error::SamplerError;
use crate::sampler::chain::RawChain;
use crate::sampler::posterior::Posterior;
use crate::sampler::unit_cube::UnitCubePosterior;
use crate::sampler::SamplingAlgorithmTrait;

use ndarray::{Array1, Array2};
use ordered_float::NotNan;
use rand::prelude::*;
use rand_distr::StandardNormal;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Nested sampling over the unit cube
///
/// A set of live points is drawn uniformly from the unit cube. At every iteration the point with
/// the lowest likelihood is retired and replaced by a constrained random walk started from
/// another live point, accepting only moves with a higher likelihood than the retired one. The
/// prior volume shrinks by `exp(-1 / n_live_points)` per iteration and the evidence is
/// accumulated from the retired points. Sampling stops when the remaining live points could
/// change `ln Z` by less than `dlogz`, or after `max_iterations` iterations.
///
/// Retired and final live points are resampled to an equally weighted posterior chain.
///
/// The algorithm is described in Skilling (2006), the random-walk step follows Sivia & Skilling
/// "Data Analysis: A Bayesian Tutorial" (2006).
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename = "Nested")]
pub struct NestedSampler {
    pub n_live_points: u32,
    pub n_walk_steps: u32,
    pub max_iterations: u32,
    pub dlogz: NotNan<f64>,
    pub seed: Option<u64>,
}

impl NestedSampler {
    pub fn new(
        n_live_points: u32,
        n_walk_steps: u32,
        max_iterations: u32,
        dlogz: f64,
        seed: Option<u64>,
    ) -> Self {
        assert!(n_live_points > 1, "n_live_points must be larger than one");
        assert!(n_walk_steps > 0, "n_walk_steps must be positive");
        assert!(max_iterations > 0, "max_iterations must be positive");
        assert!(dlogz > 0.0, "dlogz must be positive");
        Self {
            n_live_points,
            n_walk_steps,
            max_iterations,
            dlogz: NotNan::new(dlogz).expect("dlogz must not be NaN"),
            seed,
        }
    }

    #[inline]
    pub fn default_n_live_points() -> u32 {
        400
    }

    #[inline]
    pub fn default_n_walk_steps() -> u32 {
        25
    }

    #[inline]
    pub fn default_max_iterations() -> u32 {
        100_000
    }

    #[inline]
    pub fn default_dlogz() -> f64 {
        0.1
    }

    #[inline]
    pub fn default_seed() -> Option<u64> {
        None
    }

    fn rng(&self) -> StdRng {
        match self.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_rng(&mut rand::rng()),
        }
    }

    /// Constrained random walk from `start`, every accepted point has a larger likelihood than
    /// `threshold`
    fn random_walk<R: Rng>(
        &self,
        unit_cube: &UnitCubePosterior,
        start: &LivePoint,
        threshold: f64,
        scale: &mut f64,
        rng: &mut R,
    ) -> Result<LivePoint, SamplerError> {
        let mut current = start.clone();
        let mut accepted = 0_u32;
        let mut rejected = 0_u32;
        for _ in 0..self.n_walk_steps {
            let cube: Vec<f64> = current
                .cube
                .iter()
                .map(|&u| wrap_unit(u + *scale * rng.sample::<f64, _>(StandardNormal)))
                .collect();
            let values = unit_cube.prior_transform(&cube)?;
            let log_like = unit_cube.log_like(&values)?;
            if log_like > threshold {
                current = LivePoint {
                    cube,
                    values,
                    log_like,
                };
                accepted += 1;
            } else {
                rejected += 1;
            }
        }
        if accepted > rejected {
            *scale *= f64::exp(1.0 / accepted as f64);
        }
        if accepted < rejected {
            *scale /= f64::exp(1.0 / rejected as f64);
        }
        *scale = scale.clamp(MIN_SCALE, 1.0);
        Ok(current)
    }
}

impl Default for NestedSampler {
    fn default() -> Self {
        Self::new(
            Self::default_n_live_points(),
            Self::default_n_walk_steps(),
            Self::default_max_iterations(),
            Self::default_dlogz(),
            Self::default_seed(),
        )
    }
}

const MIN_SCALE: f64 = 1e-9;

#[derive(Clone, Debug)]
struct LivePoint {
    cube: Vec<f64>,
    values: Vec<f64>,
    log_like: f64,
}

struct DeadPoint {
    values: Vec<f64>,
    log_like: f64,
    log_weight: f64,
}

/// Periodic boundary of the unit cube
fn wrap_unit(x: f64) -> f64 {
    let u = x.rem_euclid(1.0);
    if u >= 1.0 { 0.0 } else { u }
}

fn log_add_exp(a: f64, b: f64) -> f64 {
    if a == f64::NEG_INFINITY {
        return b;
    }
    if b == f64::NEG_INFINITY {
        return a;
    }
    let max = f64::max(a, b);
    max + f64::ln_1p(f64::exp(-f64::abs(a - b)))
}

impl SamplingAlgorithmTrait for NestedSampler {
    fn validate(&self, posterior: &Posterior) -> Result<(), SamplerError> {
        if posterior.n_free_parameters() == 0 {
            return Err(SamplerError::InvalidSettings(
                "there are no free parameters to sample".into(),
            ));
        }
        // deserialized settings skip the checks of `new`
        if self.n_live_points <= 1 {
            return Err(SamplerError::InvalidSettings(format!(
                "number of live points must be larger than one, got {}",
                self.n_live_points
            )));
        }
        if self.n_walk_steps == 0 || self.max_iterations == 0 {
            return Err(SamplerError::InvalidSettings(
                "n_walk_steps and max_iterations must be positive".into(),
            ));
        }
        if !(self.dlogz.into_inner() > 0.0) {
            return Err(SamplerError::InvalidSettings(format!(
                "dlogz must be positive, got {}",
                self.dlogz
            )));
        }
        let _ = UnitCubePosterior::new(posterior)?;
        Ok(())
    }

    fn run(&self, posterior: &Posterior) -> Result<RawChain, SamplerError> {
        let unit_cube = UnitCubePosterior::new(posterior)?;
        let n_dim = unit_cube.n_dim();
        let n_live = self.n_live_points as usize;
        let mut rng = self.rng();

        let mut live = (0..n_live)
            .map(|_| {
                let cube: Vec<f64> = (0..n_dim).map(|_| rng.random::<f64>()).collect();
                let values = unit_cube.prior_transform(&cube)?;
                let log_like = unit_cube.log_like(&values)?;
                Ok(LivePoint {
                    cube,
                    values,
                    log_like,
                })
            })
            .collect::<Result<Vec<_>, SamplerError>>()?;

        let log_width_factor = f64::ln(-f64::exp_m1(-1.0 / n_live as f64));
        let mut log_volume = 0.0;
        let mut log_z = f64::NEG_INFINITY;
        let mut scale = 0.1;
        let mut dead = vec![];
        for iteration in 0..self.max_iterations {
            let (worst, _) = live
                .iter()
                .enumerate()
                .min_by(|(_, a), (_, b)| a.log_like.total_cmp(&b.log_like))
                .ok_or(SamplerError::EmptyChain)?;
            let log_like_min = live[worst].log_like;
            let log_weight = log_volume + log_width_factor + log_like_min;
            log_z = log_add_exp(log_z, log_weight);
            log_volume -= 1.0 / n_live as f64;
            dead.push(DeadPoint {
                values: live[worst].values.clone(),
                log_like: log_like_min,
                log_weight,
            });

            let log_like_max = live
                .iter()
                .map(|point| point.log_like)
                .fold(f64::NEG_INFINITY, f64::max);
            let remaining = log_add_exp(log_z, log_like_max + log_volume) - log_z;
            if log_z.is_finite() && remaining < self.dlogz.into_inner() {
                log::debug!(
                    "Nested sampling converged after {} iterations, ln Z = {log_z}",
                    iteration + 1
                );
                break;
            }
            if iteration + 1 == self.max_iterations {
                log::warn!(
                    "Nested sampling reached {} iterations, remaining ln Z change is {remaining}",
                    self.max_iterations
                );
            }

            let start = loop {
                let i = rng.random_range(0..n_live);
                if i != worst {
                    break i;
                }
            };
            let start = live[start].clone();
            live[worst] = self.random_walk(&unit_cube, &start, log_like_min, &mut scale, &mut rng)?;
        }

        let log_live_weight = log_volume - f64::ln(n_live as f64);
        for point in live {
            let log_weight = log_live_weight + point.log_like;
            log_z = log_add_exp(log_z, log_weight);
            dead.push(DeadPoint {
                values: point.values,
                log_like: point.log_like,
                log_weight,
            });
        }

        let indices = systematic_resample(&dead, log_z, &mut rng);
        let mut samples = Array2::zeros((indices.len(), n_dim));
        let mut log_like = Array1::zeros(indices.len());
        let mut log_prob = Array1::zeros(indices.len());
        for (row, &i) in indices.iter().enumerate() {
            let point = &dead[i];
            samples
                .row_mut(row)
                .assign(&Array1::from(point.values.clone()));
            log_like[row] = point.log_like;
            log_prob[row] = point.log_like + posterior.evaluate_log_prior(&point.values)?;
        }
        RawChain::new(samples, log_like, log_prob, Some(log_z))
    }
}

/// Indices of an equally weighted sample with the same size as `points`
fn systematic_resample<R: Rng>(points: &[DeadPoint], log_z: f64, rng: &mut R) -> Vec<usize> {
    let n = points.len();
    let offset: f64 = rng.random();
    let mut indices = Vec::with_capacity(n);
    let mut cumulative = 0.0;
    let mut i = 0;
    for (j, point) in points.iter().enumerate() {
        cumulative += f64::exp(point.log_weight - log_z);
        while i < n && (i as f64 + offset) / n as f64 <= cumulative {
            indices.push(j);
            i += 1;
        }
    }
    // rounding of the cumulative weight
    while indices.len() < n {
        indices.push(n - 1);
    }
    indices
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_stats::median;
    use crate::tests::*;

    use approx::assert_abs_diff_eq;

    #[test]
    fn log_add_exp_values() {
        assert_abs_diff_eq!(log_add_exp(0.0, 0.0), f64::ln(2.0), epsilon = 1e-12);
        assert_eq!(log_add_exp(f64::NEG_INFINITY, -3.0), -3.0);
        assert_abs_diff_eq!(
            log_add_exp(-1000.0, -1001.0),
            -1000.0 + f64::ln_1p(f64::exp(-1.0)),
            epsilon = 1e-12
        );
    }

    #[test]
    fn wrap_unit_stays_in_cube() {
        for x in [-1e-20, -0.25, 1.0, 1.75, 0.5] {
            let u = wrap_unit(x);
            assert!((0.0..1.0).contains(&u), "{x} -> {u}");
        }
    }

    #[test]
    fn gaussian_evidence() {
        // Likelihood is exp(-(K - 3.6)^2 / (2 * 0.2)) times a constant, the uniform prior is on
        // [0, 5], so Z = sqrt(2 pi 0.2) / 5 * exp(L_max)
        let posterior = two_dataset_posterior();
        let sampler = NestedSampler::new(200, 20, 20_000, 0.01, Some(0));
        sampler.validate(&posterior).unwrap();
        let chain = sampler.run(&posterior).unwrap();

        let log_like_max = quadratic_log_like(3.6, 2.0, 1.0) + quadratic_log_like(3.6, 4.0, 0.5);
        let desired = log_like_max + f64::ln(f64::sqrt(std::f64::consts::TAU * 0.2) / 5.0);
        let log_z = chain.log_evidence().unwrap();
        assert_abs_diff_eq!(log_z, desired, epsilon = 0.3);

        let median = median(chain.samples().column(0)).unwrap();
        assert_abs_diff_eq!(median, 3.6, epsilon = 0.1);
    }

    #[test]
    fn single_live_point_is_rejected() {
        let posterior = two_dataset_posterior();
        let sampler: NestedSampler = serde_json::from_str(
            r#"{"n_live_points": 1, "n_walk_steps": 20, "max_iterations": 100, "dlogz": 0.1, "seed": 0}"#,
        )
        .unwrap();
        assert!(matches!(
            sampler.validate(&posterior),
            Err(SamplerError::InvalidSettings(_))
        ));
        let sampler = NestedSampler {
            n_live_points: 2,
            ..sampler
        };
        assert!(sampler.validate(&posterior).is_ok());
    }

    #[test]
    fn resample_keeps_size() {
        let mut rng = StdRng::seed_from_u64(0);
        let points: Vec<_> = [-1.0, -2.0, -0.5, -30.0]
            .into_iter()
            .map(|log_weight| DeadPoint {
                values: vec![0.0],
                log_like: 0.0,
                log_weight,
            })
            .collect();
        let log_z = points
            .iter()
            .map(|p| p.log_weight)
            .fold(f64::NEG_INFINITY, log_add_exp);
        let indices = systematic_resample(&points, log_z, &mut rng);
        assert_eq!(indices.len(), 4);
        assert!(!indices.contains(&3));
    }
}
