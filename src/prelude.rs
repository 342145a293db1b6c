pub use crate::background::{
    BackgroundFitter, BackgroundModel, EventList, Polynomial, RateModel, TimeInterval,
};
pub use crate::dataset::{DataList, Dataset, PoissonSpectrumLike};
pub use crate::error::{
    BackgroundError, ConfigurationError, DatasetError, NumericalError, SamplerError,
};
pub use crate::model::LikelihoodModel;
pub use crate::parameter::{Parameter, ParameterBinding};
pub use crate::prior::{Prior, PriorTrait};
pub use crate::sampler::{
    BayesianSampler, EmceeSampler, NestedSampler, SamplingAlgorithm, SamplingAlgorithmTrait,
};
