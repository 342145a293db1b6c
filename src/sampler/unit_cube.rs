use crate::error::{ConfigurationError, SamplerError};
use crate::parameter::Parameter;
use crate::prior::{Prior, PriorTrait};
use crate::sampler::posterior::Posterior;

/// Posterior split into a likelihood and a prior transform, as nested samplers consume it
///
/// Coordinates of the unit cube are mapped to parameter values by the inverse CDFs of the
/// priors, so the likelihood is evaluated on physical values and the prior density never enters
/// it. Both transform flavours are provided: [UnitCubePosterior::prior_transform] returns a
/// new vector, [UnitCubePosterior::prior_transform_in_place] overwrites the cube coordinates.
#[derive(Clone, Debug)]
pub struct UnitCubePosterior<'a> {
    posterior: &'a Posterior,
    priors: Vec<(&'a str, &'a Prior)>,
}

impl<'a> UnitCubePosterior<'a> {
    /// Collect the priors of the free parameters and check them with a single transform of the
    /// cube centre
    pub fn new(posterior: &'a Posterior) -> Result<Self, SamplerError> {
        let priors = posterior
            .free_parameter_names()
            .iter()
            .map(|name| {
                posterior
                    .model()
                    .parameter(name)
                    .and_then(Parameter::prior)
                    .map(|prior| (name.as_str(), prior))
                    .ok_or_else(|| ConfigurationError::MissingPrior {
                        parameter: name.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let unit_cube_posterior = Self { posterior, priors };

        let mut centre = vec![0.5; unit_cube_posterior.n_dim()];
        unit_cube_posterior.prior_transform_in_place(&mut centre)?;

        Ok(unit_cube_posterior)
    }

    pub fn n_dim(&self) -> usize {
        self.priors.len()
    }

    /// Sum of dataset log-likelihoods at physical parameter values
    pub fn log_like(&self, values: &[f64]) -> Result<f64, SamplerError> {
        self.posterior.evaluate_log_likelihood(values)
    }

    pub fn prior_transform(&self, cube: &[f64]) -> Result<Vec<f64>, SamplerError> {
        let mut values = cube.to_vec();
        self.prior_transform_in_place(&mut values)?;
        Ok(values)
    }

    pub fn prior_transform_in_place(&self, cube: &mut [f64]) -> Result<(), SamplerError> {
        if cube.len() != self.priors.len() {
            return Err(SamplerError::DimensionMismatch {
                expected: self.priors.len(),
                actual: cube.len(),
            });
        }
        for (u, &(name, prior)) in cube.iter_mut().zip(&self.priors) {
            *u = prior
                .from_unit_cube(*u)
                .ok_or_else(|| ConfigurationError::UnitCubeUnsupported {
                    parameter: name.to_owned(),
                })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::DataList;
    use crate::model::LikelihoodModel;
    use crate::tests::*;

    use approx::assert_relative_eq;

    #[test]
    fn transforms_agree() {
        let posterior = two_dataset_posterior();
        let unit_cube = UnitCubePosterior::new(&posterior).unwrap();
        let mut cube = [0.6];
        let copy = unit_cube.prior_transform(&cube).unwrap();
        unit_cube.prior_transform_in_place(&mut cube).unwrap();
        assert_relative_eq!(copy[0], 3.0);
        assert_eq!(copy[..], cube[..]);
        assert_relative_eq!(
            unit_cube.log_like(&copy).unwrap(),
            quadratic_log_like(3.0, 2.0, 1.0) + quadratic_log_like(3.0, 4.0, 0.5)
        );
    }

    #[test]
    fn unsupported_prior_fails_immediately() {
        let model = LikelihoodModel::new([
            uniform_parameter("K", 1.0),
            Parameter::new("mixed", 0.0).with_prior(Prior::mix(&[
                (1.0, Prior::normal(-1.0, 1.0)),
                (1.0, Prior::normal(1.0, 1.0)),
            ])),
        ]);
        let posterior = Posterior::register(
            model,
            DataList::new([quadratic_dataset("d0", 2.0, 1.0)]).unwrap(),
        )
        .unwrap();
        assert_eq!(
            UnitCubePosterior::new(&posterior).unwrap_err(),
            SamplerError::Configuration(ConfigurationError::UnitCubeUnsupported {
                parameter: "mixed".into()
            })
        );
    }
}
