use crate::model::LikelihoodModel;

use indexmap::IndexMap;
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Summary of a completed sampling run
///
/// The model carries parameter values at the approximate maximum a posteriori point.
/// `log_posteriors` maps dataset names to their log-likelihood plus the log-prior at that point.
/// Statistical measures are `AIC`, `BIC`, `DIC`, `PDIC` and, for engines estimating the evidence,
/// `log(Z)`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BayesianResults {
    model: LikelihoodModel,
    parameter_names: Vec<String>,
    samples: Array2<f64>,
    log_posteriors: IndexMap<String, f64>,
    statistical_measures: IndexMap<String, f64>,
}

impl BayesianResults {
    pub(crate) fn new(
        model: LikelihoodModel,
        parameter_names: Vec<String>,
        samples: Array2<f64>,
        log_posteriors: IndexMap<String, f64>,
        statistical_measures: IndexMap<String, f64>,
    ) -> Self {
        assert_eq!(parameter_names.len(), samples.ncols());
        Self {
            model,
            parameter_names,
            samples,
            log_posteriors,
            statistical_measures,
        }
    }

    pub fn model(&self) -> &LikelihoodModel {
        &self.model
    }

    pub fn parameter_names(&self) -> &[String] {
        &self.parameter_names
    }

    pub fn samples(&self) -> &Array2<f64> {
        &self.samples
    }

    /// Samples of a single free parameter
    pub fn parameter_samples(&self, name: &str) -> Option<ArrayView1<'_, f64>> {
        let i = self.parameter_names.iter().position(|n| n == name)?;
        Some(self.samples.column(i))
    }

    pub fn log_posteriors(&self) -> &IndexMap<String, f64> {
        &self.log_posteriors
    }

    pub fn total_log_posterior(&self) -> f64 {
        self.log_posteriors.values().sum()
    }

    pub fn statistical_measures(&self) -> &IndexMap<String, f64> {
        &self.statistical_measures
    }

    pub fn statistical_measure(&self, name: &str) -> Option<f64> {
        self.statistical_measures.get(name).copied()
    }
}
