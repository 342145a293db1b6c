//! Prior distributions of model parameters
//!
//! Samplers need two views of a prior: its density, used by posterior-evaluating engines such as
//! the ensemble sampler, and its inverse CDF, used by nested samplers which draw points from the
//! unit cube and map them to the physical parameter space.

mod distributions;
pub use distributions::{
    LogNormalPrior, LogUniformPrior, MixPrior, NormalPrior, Prior, PriorTrait,
    TruncatedNormalPrior, UniformPrior,
};
