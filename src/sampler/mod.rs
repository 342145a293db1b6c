//! Bayesian samplers
//!
//! A [BayesianSampler] binds a [crate::LikelihoodModel] to a [crate::DataList] through a
//! [Posterior] and runs one of the [SamplingAlgorithm]s on it. Engines see the posterior only
//! through trial-value vectors aligned with the free parameters: ensemble engines consume
//! [Posterior::evaluate_posterior], nested engines consume a [UnitCubePosterior]. Raw engine
//! output is stored by [SamplerBase], which builds [BayesianResults] right after sampling.

use crate::dataset::DataList;
use crate::error::SamplerError;
use crate::model::LikelihoodModel;

use enum_dispatch::enum_dispatch;
use indexmap::IndexMap;
use ndarray::{Array1, Array2};
use schemars::JsonSchema;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;

mod base;
pub use base::SamplerBase;

mod chain;
pub use chain::RawChain;

mod ensemble;
pub use ensemble::{EmceeSampler, generate_starting_ensemble};

mod nested;
pub use nested::NestedSampler;

mod posterior;
pub use posterior::Posterior;

mod results;
pub use results::BayesianResults;

pub mod statistics;

mod unit_cube;
pub use unit_cube::UnitCubePosterior;

#[enum_dispatch]
pub trait SamplingAlgorithmTrait:
    Clone + Debug + Serialize + DeserializeOwned + JsonSchema + PartialEq
{
    /// Check that the algorithm can run on the posterior, before any expensive work starts
    fn validate(&self, posterior: &Posterior) -> Result<(), SamplerError>;

    /// Sample the posterior
    fn run(&self, posterior: &Posterior) -> Result<RawChain, SamplerError>;
}

/// Sampling strategy used by [BayesianSampler]
#[enum_dispatch(SamplingAlgorithmTrait)]
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum SamplingAlgorithm {
    Emcee(EmceeSampler),
    Nested(NestedSampler),
}

/// Model, datasets and a sampling strategy
///
/// ```
/// use grb_likelihood::prelude::*;
/// use ndarray::array;
///
/// let model = LikelihoodModel::new([
///     Parameter::new("norm", 5.0).with_prior(Prior::log_uniform(0.1, 100.0)),
/// ]);
/// let dataset = PoissonSpectrumLike::new(
///     "det",
///     array![4.0, 7.0, 5.0],
///     array![1.0, 1.0, 1.0],
///     |binding: &ParameterBinding<'_>| {
///         let norm = binding
///             .value("norm")
///             .ok_or_else(|| DatasetError::MissingParameter("norm".into()))?;
///         Ok(array![norm, norm, norm])
///     },
/// );
/// let data_list = DataList::new([Box::new(dataset) as Box<dyn Dataset>]).unwrap();
///
/// let mut sampler = BayesianSampler::new(model, data_list).unwrap();
/// sampler
///     .setup(NestedSampler::new(50, 20, 2000, 0.5, Some(0)))
///     .unwrap();
/// let results = sampler.sample().unwrap();
/// assert!(results.statistical_measure("log(Z)").is_some());
/// ```
#[derive(Debug)]
pub struct BayesianSampler {
    base: SamplerBase,
    algorithm: Option<SamplingAlgorithm>,
}

impl BayesianSampler {
    pub fn new(model: LikelihoodModel, data_list: DataList) -> Result<Self, SamplerError> {
        Ok(Self {
            base: SamplerBase::new(Posterior::register(model, data_list)?),
            algorithm: None,
        })
    }

    /// Replace the model and datasets, previous samples are dropped
    pub fn set_model_and_data(
        &mut self,
        model: LikelihoodModel,
        data_list: DataList,
    ) -> Result<(), SamplerError> {
        self.base = SamplerBase::new(Posterior::register(model, data_list)?);
        Ok(())
    }

    /// Choose and validate the sampling algorithm
    pub fn setup(&mut self, algorithm: impl Into<SamplingAlgorithm>) -> Result<(), SamplerError> {
        let algorithm = algorithm.into();
        algorithm.validate(self.base.posterior())?;
        self.algorithm = Some(algorithm);
        Ok(())
    }

    pub fn algorithm(&self) -> Option<&SamplingAlgorithm> {
        self.algorithm.as_ref()
    }

    /// Run the algorithm and build the results
    ///
    /// Live free parameters are left at the approximate maximum a posteriori point.
    pub fn sample(&mut self) -> Result<&BayesianResults, SamplerError> {
        let algorithm = self.algorithm.as_ref().ok_or(SamplerError::NotSetUp)?;
        self.base.posterior_mut().update_free_parameters()?;
        algorithm.validate(self.base.posterior())?;
        let chain = algorithm.run(self.base.posterior())?;
        self.base.store_chain(chain)
    }

    pub fn posterior(&self) -> &Posterior {
        self.base.posterior()
    }

    pub fn model(&self) -> &LikelihoodModel {
        self.base.posterior().model()
    }

    pub fn base(&self) -> &SamplerBase {
        &self.base
    }

    pub fn results(&self) -> Result<&BayesianResults, SamplerError> {
        self.base.results()
    }

    pub fn samples(&self) -> Result<&IndexMap<String, Array1<f64>>, SamplerError> {
        self.base.samples()
    }

    pub fn raw_samples(&self) -> Result<&Array2<f64>, SamplerError> {
        self.base.raw_samples()
    }

    pub fn log_like_values(&self) -> Result<&Array1<f64>, SamplerError> {
        self.base.log_like_values()
    }

    pub fn log_probability_values(&self) -> Result<&Array1<f64>, SamplerError> {
        self.base.log_probability_values()
    }

    pub fn log_marginal_likelihood(&self) -> Result<Option<f64>, SamplerError> {
        self.base.log_marginal_likelihood()
    }

    pub fn restore_median_fit(&mut self) -> Result<(), SamplerError> {
        self.base.restore_median_fit()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::*;

    #[test]
    fn sample_before_setup() {
        let mut sampler = BayesianSampler::new(
            single_parameter_model(),
            DataList::new([quadratic_dataset("d0", 2.0, 1.0)]).unwrap(),
        )
        .unwrap();
        assert_eq!(sampler.sample().unwrap_err(), SamplerError::NotSetUp);
    }

    #[test]
    fn algorithm_serde_round_trip() {
        let algorithm: SamplingAlgorithm = EmceeSampler::default().into();
        let json = serde_json::to_string(&algorithm).unwrap();
        let deserialized: SamplingAlgorithm = serde_json::from_str(&json).unwrap();
        assert_eq!(algorithm, deserialized);

        let algorithm: SamplingAlgorithm = NestedSampler::default().into();
        let json = serde_json::to_string(&algorithm).unwrap();
        let deserialized: SamplingAlgorithm = serde_json::from_str(&json).unwrap();
        assert_eq!(algorithm, deserialized);
    }

    #[test]
    fn reregistration_replaces_binding() {
        let mut sampler = BayesianSampler::new(
            single_parameter_model(),
            DataList::new([quadratic_dataset("d0", 2.0, 1.0)]).unwrap(),
        )
        .unwrap();
        sampler
            .set_model_and_data(
                single_parameter_model(),
                DataList::new([
                    quadratic_dataset("d0", 2.0, 1.0),
                    quadratic_dataset("d1", 2.0, 1.0),
                ])
                .unwrap(),
            )
            .unwrap();
        assert_eq!(sampler.posterior().data_list().len(), 2);
        assert_eq!(sampler.raw_samples().unwrap_err(), SamplerError::NotSampled);
    }
}
