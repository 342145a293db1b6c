use crate::dataset::{DataList, Dataset};
use crate::error::{ConfigurationError, DatasetError, SamplerError};
use crate::model::LikelihoodModel;
use crate::parameter::{Parameter, ParameterBinding};
use crate::prior::PriorTrait;

use indexmap::{IndexMap, IndexSet};

/// Model and datasets bound together, able to evaluate the posterior of a trial-value vector
///
/// Trial-value vectors are aligned with [Posterior::free_parameter_names], which is the order of
/// the model free parameters followed by the free nuisance parameters of the datasets. Evaluation
/// never touches live parameter values, datasets receive trial values through a
/// [ParameterBinding].
#[derive(Debug)]
pub struct Posterior {
    model: LikelihoodModel,
    data_list: DataList,
    free_names: IndexSet<String>,
}

impl Posterior {
    /// Bind the model to the datasets
    ///
    /// Every free parameter must have a prior, including free nuisance parameters. Nuisance
    /// parameter names must contain the name of the owning dataset, otherwise two instances of
    /// the same dataset type would silently share a parameter.
    pub fn register(
        mut model: LikelihoodModel,
        mut data_list: DataList,
    ) -> Result<Self, ConfigurationError> {
        if let Some(parameter) = model.free_parameters().find(|p| !p.has_prior()) {
            return Err(ConfigurationError::MissingPrior {
                parameter: parameter.name().to_owned(),
            });
        }

        for dataset in data_list.iter_mut() {
            dataset
                .set_model(&model)
                .map_err(|err| ConfigurationError::DatasetSetup {
                    dataset: dataset.name().to_owned(),
                    message: err.to_string(),
                })?;
            for parameter in dataset.nuisance_parameters() {
                check_nuisance_parameter(&**dataset, &parameter)?;
                model.add_external_parameter(parameter);
            }
        }

        let free_names = model.free_parameter_names();
        Ok(Self {
            model,
            data_list,
            free_names,
        })
    }

    /// Rebuild the free-parameter snapshot after parameters were freed or fixed
    pub fn update_free_parameters(&mut self) -> Result<(), ConfigurationError> {
        if let Some(parameter) = self.model.free_parameters().find(|p| !p.has_prior()) {
            return Err(ConfigurationError::MissingPrior {
                parameter: parameter.name().to_owned(),
            });
        }
        self.free_names = self.model.free_parameter_names();
        Ok(())
    }

    pub fn model(&self) -> &LikelihoodModel {
        &self.model
    }

    pub fn model_mut(&mut self) -> &mut LikelihoodModel {
        &mut self.model
    }

    pub fn data_list(&self) -> &DataList {
        &self.data_list
    }

    pub fn free_parameter_names(&self) -> &IndexSet<String> {
        &self.free_names
    }

    pub fn free_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.free_names
            .iter()
            .filter_map(|name| self.model.parameter(name))
    }

    pub fn n_free_parameters(&self) -> usize {
        self.free_names.len()
    }

    /// Total number of data points over all datasets
    pub fn n_data_points(&self) -> usize {
        self.data_list
            .iter()
            .map(|dataset| dataset.number_of_data_points())
            .sum()
    }

    /// Write trial values to the live free parameters
    pub fn set_free_values(&mut self, values: &[f64]) -> Result<(), SamplerError> {
        self.check_dimension(values)?;
        self.model.set_parameter_values(&self.free_names, values);
        Ok(())
    }

    /// Log-prior plus log-likelihood
    ///
    /// Returns negative infinity without touching datasets if any value is outside of its prior
    /// support.
    pub fn evaluate_posterior(&self, values: &[f64]) -> Result<f64, SamplerError> {
        let log_prior = self.evaluate_log_prior(values)?;
        if log_prior == f64::NEG_INFINITY {
            return Ok(log_prior);
        }
        Ok(log_prior + self.evaluate_log_likelihood(values)?)
    }

    /// Sum of decimal logarithms of the prior densities, negative infinity out of support
    pub fn evaluate_log_prior(&self, values: &[f64]) -> Result<f64, SamplerError> {
        self.check_dimension(values)?;
        let mut log_prior = 0.0;
        for (name, &x) in self.free_names.iter().zip(values) {
            let prior = self
                .model
                .parameter(name)
                .and_then(Parameter::prior)
                .ok_or_else(|| ConfigurationError::MissingPrior {
                    parameter: name.clone(),
                })?;
            let density = prior.density(x);
            if density == 0.0 {
                return Ok(f64::NEG_INFINITY);
            }
            log_prior += f64::log10(density);
        }
        Ok(log_prior)
    }

    /// Sum of dataset log-likelihoods
    ///
    /// The first dataset reporting [DatasetError::ModelInvalidRegion] rejects the point with
    /// negative infinity, later datasets are not evaluated. Any other dataset error is returned.
    /// A non-finite sum is logged and replaced with negative infinity.
    pub fn evaluate_log_likelihood(&self, values: &[f64]) -> Result<f64, SamplerError> {
        self.check_dimension(values)?;
        let binding = ParameterBinding::new(&self.model, &self.free_names, values);
        let mut log_like = 0.0;
        for dataset in self.data_list.iter() {
            match dataset_log_like(dataset, &binding)? {
                Some(value) => log_like += value,
                None => return Ok(f64::NEG_INFINITY),
            }
        }
        if !log_like.is_finite() {
            log::warn!(
                "Likelihood value is infinite or NaN for parameters {:?}",
                self.free_names.iter().zip(values).collect::<Vec<_>>()
            );
            return Ok(f64::NEG_INFINITY);
        }
        Ok(log_like)
    }

    /// Log-likelihood of every dataset, `None` for datasets rejecting the point
    pub(crate) fn log_like_per_dataset(
        &self,
        values: &[f64],
    ) -> Result<IndexMap<String, Option<f64>>, SamplerError> {
        self.check_dimension(values)?;
        let binding = ParameterBinding::new(&self.model, &self.free_names, values);
        self.data_list
            .iter()
            .map(|dataset| {
                let value = dataset_log_like(dataset, &binding)?;
                Ok((dataset.name().to_owned(), value))
            })
            .collect()
    }

    fn check_dimension(&self, values: &[f64]) -> Result<(), SamplerError> {
        if values.len() != self.free_names.len() {
            return Err(SamplerError::DimensionMismatch {
                expected: self.free_names.len(),
                actual: values.len(),
            });
        }
        Ok(())
    }
}

fn dataset_log_like(
    dataset: &dyn Dataset,
    binding: &ParameterBinding<'_>,
) -> Result<Option<f64>, SamplerError> {
    match dataset.log_like(binding) {
        Ok(value) => Ok(Some(value)),
        Err(DatasetError::ModelInvalidRegion(_)) => Ok(None),
        Err(source) => Err(SamplerError::Dataset {
            dataset: dataset.name().to_owned(),
            source,
        }),
    }
}

fn check_nuisance_parameter(
    dataset: &dyn Dataset,
    parameter: &Parameter,
) -> Result<(), ConfigurationError> {
    if !parameter.name().contains(dataset.name()) {
        return Err(ConfigurationError::NuisanceParameterName {
            dataset: dataset.name().to_owned(),
            parameter: parameter.name().to_owned(),
        });
    }
    if parameter.is_free() && !parameter.has_prior() {
        return Err(ConfigurationError::MissingPrior {
            parameter: parameter.name().to_owned(),
        });
    }
    Ok(())
}
