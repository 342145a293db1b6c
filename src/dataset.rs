use crate::background::BackgroundModel;
use crate::error::{ConfigurationError, DatasetError};
use crate::model::LikelihoodModel;
use crate::parameter::{Parameter, ParameterBinding};
use crate::prior::Prior;

use indexmap::IndexMap;
use ndarray::{Array1, Zip};
use statrs::function::gamma::ln_gamma;
use std::fmt::Debug;

/// Data plus instrument description able to compute a log-likelihood for a model
pub trait Dataset: Debug {
    /// Instance name, unique within a [DataList]
    fn name(&self) -> &str;

    /// Bind the dataset to the model, called once on sampler registration
    ///
    /// Datasets may adjust their nuisance parameters here, they are read only after this call.
    fn set_model(&mut self, _model: &LikelihoodModel) -> Result<(), DatasetError> {
        Ok(())
    }

    /// Parameters owned by the dataset, their names must contain the dataset name
    fn nuisance_parameters(&self) -> Vec<Parameter> {
        vec![]
    }

    /// Log-likelihood of the data for the parameter values provided by the binding
    ///
    /// [DatasetError::ModelInvalidRegion] rejects the point, any other error is fatal.
    fn log_like(&self, binding: &ParameterBinding<'_>) -> Result<f64, DatasetError>;

    fn number_of_data_points(&self) -> usize;
}

/// Insertion-ordered collection of datasets keyed by their names
#[derive(Debug, Default)]
pub struct DataList {
    datasets: IndexMap<String, Box<dyn Dataset>>,
}

impl DataList {
    pub fn new(
        datasets: impl IntoIterator<Item = Box<dyn Dataset>>,
    ) -> Result<Self, ConfigurationError> {
        let mut data_list = Self::default();
        for dataset in datasets {
            data_list.push(dataset)?;
        }
        Ok(data_list)
    }

    pub fn push(&mut self, dataset: Box<dyn Dataset>) -> Result<(), ConfigurationError> {
        let name = dataset.name().to_owned();
        if self.datasets.contains_key(&name) {
            return Err(ConfigurationError::DuplicateDataset { name });
        }
        let _ = self.datasets.insert(name, dataset);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&dyn Dataset> {
        self.datasets.get(name).map(|d| d.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = &dyn Dataset> {
        self.datasets.values().map(|d| d.as_ref())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut Box<dyn Dataset>> {
        self.datasets.values_mut()
    }

    pub fn len(&self) -> usize {
        self.datasets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.datasets.is_empty()
    }
}

/// Counts in energy channels with a known background
///
/// The log-likelihood is Poisson,
/// `sum_i [d_i ln(c m_i + b_i) - (c m_i + b_i) - ln(d_i!)]`, where `d_i` are observed counts,
/// `m_i` are model counts folded by the user-provided closure, `b_i` are background counts
/// and `c` is the intercalibration constant, a nuisance parameter named `cons_<name>` which is
/// fixed to unity unless [PoissonSpectrumLike::use_intercalibration_const] is called.
pub struct PoissonSpectrumLike<F> {
    name: String,
    observed: Array1<f64>,
    background: Array1<f64>,
    model_counts: F,
    intercalibration: Parameter,
}

impl<F> PoissonSpectrumLike<F>
where
    F: Fn(&ParameterBinding<'_>) -> Result<Array1<f64>, DatasetError>,
{
    pub fn new(
        name: impl Into<String>,
        observed: impl Into<Array1<f64>>,
        background: impl Into<Array1<f64>>,
        model_counts: F,
    ) -> Self {
        let name = name.into();
        let observed = observed.into();
        let background = background.into();
        assert_eq!(
            observed.len(),
            background.len(),
            "observed and background counts must have the same length"
        );
        let intercalibration = Parameter::new(format!("cons_{name}"), 1.0)
            .with_bounds(Some(0.9), Some(1.1))
            .with_fixed(true);
        Self {
            name,
            observed,
            background,
            model_counts,
            intercalibration,
        }
    }

    /// Take the background from per-channel polynomials integrated over `[tmin, tmax]`
    pub fn from_background_model(
        name: impl Into<String>,
        observed: impl Into<Array1<f64>>,
        background: &BackgroundModel,
        tmin: f64,
        tmax: f64,
        model_counts: F,
    ) -> Self {
        let background: Array1<f64> = background
            .spectrum(tmin, tmax)
            .into_iter()
            .map(|counts| counts.max(0.0))
            .collect();
        Self::new(name, observed, background, model_counts)
    }

    pub fn intercalibration_const(&self) -> &Parameter {
        &self.intercalibration
    }

    /// Free the intercalibration constant within `[low, high]` with a uniform prior
    ///
    /// A current value outside of the new bounds is moved to the closest bound. Register the
    /// dataset again for the change to reach a sampler.
    pub fn use_intercalibration_const(&mut self, low: f64, high: f64) {
        self.intercalibration.set_bounds(Some(low), Some(high));
        self.intercalibration
            .set_prior(Some(Prior::uniform(low, high)));
        self.intercalibration.free();

        let value = self.intercalibration.value();
        if value < low {
            log::warn!(
                "The intercalibration constant was {value}, lower than the provided lower bound {low}. Setting it equal to the lower bound"
            );
            self.intercalibration.set_value(low);
        }
        if value > high {
            log::warn!(
                "The intercalibration constant was {value}, larger than the provided upper bound {high}. Setting it equal to the upper bound"
            );
            self.intercalibration.set_value(high);
        }
    }

    /// Fix the intercalibration constant, optionally to a new value
    pub fn fix_intercalibration_const(&mut self, value: Option<f64>) {
        if let Some(value) = value {
            self.intercalibration.set_value(value);
        }
        self.intercalibration.fix();
    }
}

impl<F> Debug for PoissonSpectrumLike<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoissonSpectrumLike")
            .field("name", &self.name)
            .field("observed", &self.observed)
            .field("background", &self.background)
            .field("intercalibration", &self.intercalibration)
            .finish_non_exhaustive()
    }
}

impl<F> Dataset for PoissonSpectrumLike<F>
where
    F: Fn(&ParameterBinding<'_>) -> Result<Array1<f64>, DatasetError>,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn nuisance_parameters(&self) -> Vec<Parameter> {
        vec![self.intercalibration.clone()]
    }

    fn log_like(&self, binding: &ParameterBinding<'_>) -> Result<f64, DatasetError> {
        let model = (self.model_counts)(binding)?;
        if model.len() != self.observed.len() {
            return Err(DatasetError::Failed(format!(
                "model predicts {} channels, {} are observed",
                model.len(),
                self.observed.len()
            )));
        }
        let constant = binding
            .value(self.intercalibration.name())
            .unwrap_or(self.intercalibration.value());

        let mut log_like = 0.0;
        let mut invalid = None;
        Zip::from(&model)
            .and(&self.observed)
            .and(&self.background)
            .for_each(|&m, &d, &b| {
                let expected = constant * m + b;
                if !(expected >= 0.0) || !expected.is_finite() {
                    invalid.get_or_insert(expected);
                } else if d > 0.0 {
                    log_like += d * f64::ln(expected) - expected - ln_gamma(d + 1.0);
                } else {
                    log_like -= expected;
                }
            });
        match invalid {
            Some(expected) => Err(DatasetError::ModelInvalidRegion(format!(
                "expected counts {expected} must be non-negative and finite"
            ))),
            None => Ok(log_like),
        }
    }

    fn number_of_data_points(&self) -> usize {
        self.observed.len()
    }
}
