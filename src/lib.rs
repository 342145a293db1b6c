#![doc = include_str!("../README.md")]

#[cfg(test)]
mod tests;

mod array_stats;

pub mod background;
pub use background::{
    BackgroundFitter, BackgroundModel, BinnedCountSeries, CovarianceEstimator, EventList,
    Polynomial, PoissonCashLikelihood, TimeInterval,
};

mod dataset;
pub use dataset::{DataList, Dataset, PoissonSpectrumLike};

mod error;
pub use error::{BackgroundError, ConfigurationError, DatasetError, NumericalError, SamplerError};

mod model;
pub use model::LikelihoodModel;

mod parameter;
pub use parameter::{Parameter, ParameterBinding};

pub mod prelude;

pub mod prior;
pub use prior::{Prior, PriorTrait};

pub mod sampler;
pub use sampler::{
    BayesianResults, BayesianSampler, EmceeSampler, NestedSampler, Posterior, SamplingAlgorithm,
    SamplingAlgorithmTrait,
};

pub use ndarray;
