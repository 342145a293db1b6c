/// Error returned when a model, its datasets or a sampler are wired up inconsistently
///
/// These errors are always raised before any expensive computation starts.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ConfigurationError {
    #[error("free parameter {parameter} has no prior, define priors for all free parameters")]
    MissingPrior { parameter: String },

    #[error(
        "nuisance parameter {parameter} of dataset {dataset} must contain the dataset name, \
         otherwise multiple instances of the same dataset overwrite each other's parameters"
    )]
    NuisanceParameterName { dataset: String, parameter: String },

    #[error("the prior of parameter {parameter} is not compatible with sampling from a unit cube")]
    UnitCubeUnsupported { parameter: String },

    #[error("dataset name {name} is used more than once")]
    DuplicateDataset { name: String },

    #[error("dataset {dataset} cannot use the model: {message}")]
    DatasetSetup { dataset: String, message: String },
}

/// Error returned by [crate::Dataset] likelihood evaluation
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum DatasetError {
    /// Current parameters are physically nonsensical, the point is rejected
    #[error("model is outside of its valid region: {0}")]
    ModelInvalidRegion(String),

    #[error("parameter {0} is not known to the model")]
    MissingParameter(String),

    #[error("dataset failure: {0}")]
    Failed(String),
}

/// Error returned from the covariance estimation and polynomial fitting machinery
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum NumericalError {
    #[error("Hessian matrix is singular and cannot be inverted")]
    SingularHessian,

    #[error(
        "negative element {value} at index {index} in the diagonal of the covariance matrix, \
         try to reduce the polynomial degree"
    )]
    NegativeVariance { index: usize, value: f64 },

    #[error("covariance matrix has non-finite elements")]
    NonFiniteCovariance,

    #[error("dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// Error returned from [crate::BayesianSampler] and the posterior evaluation helpers
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum SamplerError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    #[error("dataset {dataset} failed: {source}")]
    Dataset {
        dataset: String,
        #[source]
        source: DatasetError,
    },

    #[error("number of trial values {actual} does not match number of free parameters {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("sampler is not set up, call setup() before sample()")]
    NotSetUp,

    #[error("no samples available, run the sampler first")]
    NotSampled,

    #[error("sampling engine returned an empty chain")]
    EmptyChain,

    #[error("sampling engine failure: {0}")]
    Engine(String),

    #[error("invalid sampler settings: {0}")]
    InvalidSettings(String),
}

/// Error returned from [crate::BackgroundFitter]
#[derive(Debug, Clone, thiserror::Error, PartialEq)]
pub enum BackgroundError {
    #[error("background fit of channel {channel} failed: {source}")]
    Channel {
        channel: usize,
        #[source]
        source: NumericalError,
    },

    #[error(transparent)]
    Numerical(#[from] NumericalError),

    #[error("at least one background time interval is required")]
    NoBackgroundSelection,

    #[error("bin width must be positive and finite, got {0}")]
    InvalidBinWidth(f64),

    #[error("arrays have different lengths: {0} and {1}")]
    LengthMismatch(usize, usize),

    #[error("event channel {channel} is out of range, number of channels is {n_channels}")]
    ChannelOutOfRange { channel: usize, n_channels: usize },

    #[error("time interval [{start}, {stop}] is invalid")]
    InvalidInterval { start: f64, stop: f64 },
}
