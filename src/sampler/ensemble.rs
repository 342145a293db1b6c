use crate::error::SamplerError;
use crate::sampler::chain::RawChain;
use crate::sampler::posterior::Posterior;
use crate::sampler::SamplingAlgorithmTrait;

use emcee::{Guess, Prob};
use ndarray::{Array1, Array2};
use ordered_float::NotNan;
use rand::prelude::*;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;

/// Starting positions of ensemble walkers
///
/// Every row is a walker, every column is a free parameter of the posterior. Values are drawn
/// around the current parameter values by [crate::Parameter::get_randomized_value], points
/// outside of the prior support are left for the posterior to reject.
pub fn generate_starting_ensemble<R: Rng + ?Sized>(
    posterior: &Posterior,
    n_walkers: usize,
    variance: f64,
    rng: &mut R,
) -> Array2<f64> {
    let parameters: Vec<_> = posterior.free_parameters().collect();
    Array2::from_shape_fn((n_walkers, parameters.len()), |(_walker, i)| {
        parameters[i].get_randomized_value(variance, rng)
    })
}

/// Affine-invariant ensemble MCMC sampler
///
/// Walkers start around the current values of the free parameters, see
/// [generate_starting_ensemble]. The first `n_burn_in` iterations are discarded, the chain is
/// built from all walkers of the following `n_samples` iterations.
///
/// The engine works in single precision: walker positions and log-probabilities are `f32`.
/// Log-probability differences are resolved to about `1e-7` of their magnitude, so a
/// log-likelihood of order `1e4` moves in steps of about `1e-3`, and acceptance decisions
/// around the maximum become coarse. Subtract a constant from such likelihoods before sampling.
///
/// The algorithm is described in Goodman & Weare (2010) and Foreman-Mackey et al. (2013),
/// implemented by the [emcee](https://docs.rs/emcee/) crate.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[serde(rename = "Emcee")]
pub struct EmceeSampler {
    pub n_walkers: u32,
    pub n_burn_in: u32,
    pub n_samples: u32,
    pub variance: NotNan<f64>,
    pub seed: Option<u64>,
}

impl EmceeSampler {
    /// Create a new [EmceeSampler]
    ///
    /// # Arguments
    /// - `n_walkers`: number of walkers, even and at least twice the number of free parameters
    /// - `n_burn_in`: number of discarded iterations
    /// - `n_samples`: number of kept iterations
    /// - `variance`: relative spread of the starting ensemble
    /// - `seed`: seed of the starting ensemble and of the engine proposals, random if `None`
    pub fn new(
        n_walkers: u32,
        n_burn_in: u32,
        n_samples: u32,
        variance: f64,
        seed: Option<u64>,
    ) -> Self {
        assert!(n_walkers > 0, "n_walkers must be positive");
        assert!(n_samples > 0, "n_samples must be positive");
        assert!(variance >= 0.0, "variance must be non-negative");
        Self {
            n_walkers,
            n_burn_in,
            n_samples,
            variance: NotNan::new(variance).expect("variance must not be NaN"),
            seed,
        }
    }

    #[inline]
    pub fn default_n_walkers() -> u32 {
        20
    }

    #[inline]
    pub fn default_n_burn_in() -> u32 {
        500
    }

    #[inline]
    pub fn default_n_samples() -> u32 {
        500
    }

    #[inline]
    pub fn default_variance() -> f64 {
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
}

impl Default for EmceeSampler {
    fn default() -> Self {
        Self::new(
            Self::default_n_walkers(),
            Self::default_n_burn_in(),
            Self::default_n_samples(),
            Self::default_variance(),
            Self::default_seed(),
        )
    }
}

impl SamplingAlgorithmTrait for EmceeSampler {
    fn validate(&self, posterior: &Posterior) -> Result<(), SamplerError> {
        let n_dim = posterior.n_free_parameters();
        if n_dim == 0 {
            return Err(SamplerError::InvalidSettings(
                "there are no free parameters to sample".into(),
            ));
        }
        if self.n_walkers % 2 != 0 || (self.n_walkers as usize) < 2 * n_dim {
            return Err(SamplerError::InvalidSettings(format!(
                "number of walkers must be even and at least {}, got {}",
                2 * n_dim,
                self.n_walkers
            )));
        }
        Ok(())
    }

    fn run(&self, posterior: &Posterior) -> Result<RawChain, SamplerError> {
        let n_dim = posterior.n_free_parameters();
        let n_walkers = self.n_walkers as usize;

        let mut rng = self.rng();
        let guesses: Vec<_> =
            generate_starting_ensemble(posterior, n_walkers, self.variance.into_inner(), &mut rng)
                .rows()
                .into_iter()
                .map(|row| Guess::new(&row.iter().map(|&x| x as f32).collect::<Vec<_>>()))
                .collect();

        let model = EmceePosterior::new(posterior);
        let mut sampler = emcee::EnsembleSampler::new(n_walkers, n_dim, &model)
            .map_err(|err| SamplerError::Engine(err.to_string()))?;
        if let Some(seed) = self.seed {
            sampler.seed(&[seed as usize]);
        }

        let n_burn_in = self.n_burn_in as usize;
        let n_kept = self.n_samples as usize * n_walkers;
        let mut positions = Vec::with_capacity(n_kept * n_dim);
        let mut log_prob = Vec::with_capacity(n_kept);
        let mut iteration = 0;
        sampler
            .sample(&guesses, n_burn_in + self.n_samples as usize, |step| {
                if iteration >= n_burn_in {
                    for (guess, &lnprob) in step.pos.iter().zip(step.lnprob.iter()) {
                        positions.extend(guess.values.iter().map(|&x| x as f64));
                        log_prob.push(lnprob as f64);
                    }
                }
                iteration += 1;
            })
            .map_err(|err| SamplerError::Engine(err.to_string()))?;
        if let Some(err) = model.error.take() {
            return Err(err);
        }

        let samples = Array2::from_shape_vec((log_prob.len(), n_dim), positions)
            .map_err(|err| SamplerError::Engine(err.to_string()))?;
        let log_prob = Array1::from(log_prob);
        let log_like = samples
            .rows()
            .into_iter()
            .zip(log_prob.iter())
            .map(|(sample, &log_prob)| {
                let log_prior = posterior.evaluate_log_prior(&sample.to_vec())?;
                Ok(log_prob - log_prior)
            })
            .collect::<Result<Array1<_>, SamplerError>>()?;
        RawChain::new(samples, log_like, log_prob, None)
    }
}

/// Posterior seen by the engine
///
/// The engine cannot be interrupted, so the first evaluation error is stored, all later points
/// are rejected, and the error is returned once the engine finishes.
struct EmceePosterior<'a> {
    posterior: &'a Posterior,
    error: RefCell<Option<SamplerError>>,
}

impl<'a> EmceePosterior<'a> {
    fn new(posterior: &'a Posterior) -> Self {
        Self {
            posterior,
            error: RefCell::new(None),
        }
    }

    fn evaluate(
        &self,
        guess: &Guess,
        f: impl Fn(&Posterior, &[f64]) -> Result<f64, SamplerError>,
    ) -> f32 {
        if self.error.borrow().is_some() {
            return f32::NEG_INFINITY;
        }
        let values: Vec<f64> = guess.values.iter().map(|&x| x as f64).collect();
        match f(self.posterior, &values) {
            Ok(value) => value as f32,
            Err(err) => {
                *self.error.borrow_mut() = Some(err);
                f32::NEG_INFINITY
            }
        }
    }
}

impl Prob for EmceePosterior<'_> {
    fn lnlike(&self, params: &Guess) -> f32 {
        self.evaluate(params, Posterior::evaluate_log_likelihood)
    }

    fn lnprior(&self, params: &Guess) -> f32 {
        self.evaluate(params, Posterior::evaluate_log_prior)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::array_stats::{mean, median};
    use crate::dataset::DataList;
    use crate::tests::*;

    #[test]
    fn starting_ensemble_shape_and_spread() {
        let posterior = two_dataset_posterior();
        let mut rng = StdRng::seed_from_u64(0);
        let ensemble = generate_starting_ensemble(&posterior, 1000, 0.1, &mut rng);
        assert_eq!(ensemble.dim(), (1000, 1));
        // K is 1.0 in the model, spread is 0.1
        let mean = mean(ensemble.column(0)).unwrap();
        assert!((mean - 1.0).abs() < 0.02, "mean = {mean}");
    }

    #[test]
    fn odd_number_of_walkers_is_rejected() {
        let posterior = two_dataset_posterior();
        let sampler = EmceeSampler::new(7, 10, 10, 0.1, Some(0));
        assert!(matches!(
            sampler.validate(&posterior),
            Err(SamplerError::InvalidSettings(_))
        ));
    }

    #[test]
    fn gaussian_posterior() {
        // Precisions 1 and 4 of the two datasets add up to 5, so the posterior is normal with
        // mean (2 * 1 + 4 * 4) / 5 = 3.6 and variance 1 / 5, the prior is flat around it
        let posterior = two_dataset_posterior();
        let sampler = EmceeSampler::new(16, 300, 500, 0.5, Some(1));
        sampler.validate(&posterior).unwrap();
        let chain = sampler.run(&posterior).unwrap();
        assert_eq!(chain.n_samples(), 16 * 500);
        let samples = chain.samples().column(0);
        let mean = mean(samples).unwrap();
        assert!((mean - 3.6).abs() < 0.1, "mean = {mean}");
        let median = median(samples).unwrap();
        assert!((median - 3.6).abs() < 0.1, "median = {median}");
        let variance = samples.var(1.0);
        assert!((variance - 0.2).abs() < 0.06, "variance = {variance}");
    }

    #[test]
    fn same_seed_gives_same_chain() {
        let posterior = two_dataset_posterior();
        let sampler = EmceeSampler::new(4, 5, 5, 0.1, Some(42));
        let a = sampler.run(&posterior).unwrap();
        let b = sampler.run(&posterior).unwrap();
        assert_eq!(a.samples(), b.samples());
        assert_eq!(a.log_prob(), b.log_prob());

        let other = EmceeSampler::new(4, 5, 5, 0.1, Some(43))
            .run(&posterior)
            .unwrap();
        assert_ne!(a.samples(), other.samples());
    }

    #[test]
    fn dataset_error_is_propagated() {
        let posterior = Posterior::register(
            single_parameter_model(),
            DataList::new([failing_dataset("broken")]).unwrap(),
        )
        .unwrap();
        let sampler = EmceeSampler::new(4, 1, 1, 0.1, Some(0));
        assert!(matches!(
            sampler.run(&posterior),
            Err(SamplerError::Dataset { .. })
        ));
    }
}
