use crate::dataset::{DataList, Dataset};
use crate::error::DatasetError;
use crate::model::LikelihoodModel;
use crate::parameter::{Parameter, ParameterBinding};
use crate::prior::Prior;
use crate::sampler::Posterior;

/// Number of data points reported by every mock dataset
pub const MOCK_DATA_POINTS: usize = 10;

#[derive(Clone, Debug)]
enum MockKind {
    Quadratic { center: f64, sigma: f64 },
    InvalidAbove { limit: f64 },
    Failing,
    NotFinite,
}

/// Dataset with a closed-form likelihood of the single model parameter `K`
#[derive(Clone, Debug)]
pub struct MockDataset {
    name: String,
    kind: MockKind,
    nuisance: Vec<Parameter>,
}

impl Dataset for MockDataset {
    fn name(&self) -> &str {
        &self.name
    }

    fn nuisance_parameters(&self) -> Vec<Parameter> {
        self.nuisance.clone()
    }

    fn log_like(&self, binding: &ParameterBinding<'_>) -> Result<f64, DatasetError> {
        let k = binding
            .value("K")
            .ok_or_else(|| DatasetError::MissingParameter("K".into()))?;
        match self.kind {
            MockKind::Quadratic { center, sigma } => Ok(quadratic_log_like(k, center, sigma)),
            MockKind::InvalidAbove { limit } if k > limit => Err(
                DatasetError::ModelInvalidRegion(format!("K = {k} is larger than {limit}")),
            ),
            MockKind::InvalidAbove { .. } => Ok(quadratic_log_like(k, 0.0, 1.0)),
            MockKind::Failing => Err(DatasetError::Failed("always fails".into())),
            MockKind::NotFinite => Ok(f64::NAN),
        }
    }

    fn number_of_data_points(&self) -> usize {
        MOCK_DATA_POINTS
    }
}

pub fn quadratic_log_like(x: f64, center: f64, sigma: f64) -> f64 {
    -0.5 * ((x - center) / sigma).powi(2)
}

fn mock(name: &str, kind: MockKind) -> Box<dyn Dataset> {
    Box::new(MockDataset {
        name: name.to_owned(),
        kind,
        nuisance: vec![],
    })
}

pub fn quadratic_dataset(name: &str, center: f64, sigma: f64) -> Box<dyn Dataset> {
    mock(name, MockKind::Quadratic { center, sigma })
}

pub fn invalid_region_dataset(name: &str, limit: f64) -> Box<dyn Dataset> {
    mock(name, MockKind::InvalidAbove { limit })
}

pub fn failing_dataset(name: &str) -> Box<dyn Dataset> {
    mock(name, MockKind::Failing)
}

pub fn nan_dataset(name: &str) -> Box<dyn Dataset> {
    mock(name, MockKind::NotFinite)
}

/// Quadratic dataset owning a free nuisance parameter
pub fn nuisance_dataset(name: &str, parameter_name: &str) -> Box<dyn Dataset> {
    Box::new(MockDataset {
        name: name.to_owned(),
        kind: MockKind::Quadratic {
            center: 2.0,
            sigma: 1.0,
        },
        nuisance: vec![
            Parameter::new(parameter_name, 1.0).with_prior(Prior::uniform(0.5, 1.5)),
        ],
    })
}

/// Parameter with the uniform prior on `[0, 5]`
pub fn uniform_parameter(name: &str, value: f64) -> Parameter {
    Parameter::new(name, value)
        .with_bounds(Some(0.0), Some(5.0))
        .with_prior(Prior::uniform(0.0, 5.0))
}

pub fn single_parameter_model() -> LikelihoodModel {
    LikelihoodModel::new([uniform_parameter("K", 1.0)])
}

/// Quadratic datasets "first" (2 ± 1) and "second" (4 ± 0.5) over [single_parameter_model]
pub fn two_dataset_posterior() -> Posterior {
    Posterior::register(
        single_parameter_model(),
        DataList::new([
            quadratic_dataset("first", 2.0, 1.0),
            quadratic_dataset("second", 4.0, 0.5),
        ])
        .unwrap(),
    )
    .unwrap()
}
