use crate::array_stats::{argmax, median};
use crate::error::SamplerError;
use crate::sampler::chain::RawChain;
use crate::sampler::posterior::Posterior;
use crate::sampler::results::BayesianResults;
use crate::sampler::statistics::{aic, bic, dic};

use indexmap::IndexMap;
use ndarray::{Array1, Array2, Axis};

/// Posterior plus the output of the last sampling run
#[derive(Debug)]
pub struct SamplerBase {
    posterior: Posterior,
    chain: Option<RawChain>,
    samples: IndexMap<String, Array1<f64>>,
    results: Option<BayesianResults>,
}

impl SamplerBase {
    pub fn new(posterior: Posterior) -> Self {
        Self {
            posterior,
            chain: None,
            samples: IndexMap::new(),
            results: None,
        }
    }

    pub fn posterior(&self) -> &Posterior {
        &self.posterior
    }

    pub fn posterior_mut(&mut self) -> &mut Posterior {
        &mut self.posterior
    }

    /// Store engine output and build the results
    ///
    /// Live free parameters are left at the approximate maximum a posteriori draw.
    pub fn store_chain(&mut self, chain: RawChain) -> Result<&BayesianResults, SamplerError> {
        if chain.n_parameters() != self.posterior.n_free_parameters() {
            return Err(SamplerError::DimensionMismatch {
                expected: self.posterior.n_free_parameters(),
                actual: chain.n_parameters(),
            });
        }
        self.samples = self
            .posterior
            .free_parameter_names()
            .iter()
            .zip(chain.samples().columns())
            .map(|(name, column)| (name.clone(), column.to_owned()))
            .collect();
        self.results = None;
        let results = self.build_results(&chain)?;
        self.chain = Some(chain);
        Ok(self.results.insert(results))
    }

    fn build_results(&mut self, chain: &RawChain) -> Result<BayesianResults, SamplerError> {
        let idx = argmax(chain.log_prob().view()).ok_or(SamplerError::EmptyChain)?;
        let map_point = chain.samples().row(idx).to_vec();
        self.posterior.set_free_values(&map_point)?;

        let log_prior = self.posterior.evaluate_log_prior(&map_point)?;
        let log_posteriors: IndexMap<String, f64> = self
            .posterior
            .log_like_per_dataset(&map_point)?
            .into_iter()
            .map(|(name, log_like)| (name, log_like.unwrap_or(f64::NEG_INFINITY) + log_prior))
            .collect();
        let total_log_posterior: f64 = log_posteriors.values().sum();
        let n_data_points = self.posterior.n_data_points();
        let n_parameters = self.posterior.n_free_parameters();

        let mut statistical_measures = IndexMap::new();
        let _ = statistical_measures.insert(
            "AIC".to_owned(),
            finite_or_zero("AIC", aic(total_log_posterior, n_parameters, n_data_points)),
        );
        let _ = statistical_measures.insert(
            "BIC".to_owned(),
            finite_or_zero("BIC", bic(total_log_posterior, n_parameters, n_data_points)),
        );
        let (dic, pdic) = self.compute_dic(chain)?;
        let _ = statistical_measures.insert("DIC".to_owned(), dic);
        let _ = statistical_measures.insert("PDIC".to_owned(), pdic);
        if let Some(log_evidence) = chain.log_evidence() {
            let _ = statistical_measures.insert("log(Z)".to_owned(), log_evidence);
        }

        Ok(BayesianResults::new(
            self.posterior.model().clone(),
            self.posterior.free_parameter_names().iter().cloned().collect(),
            chain.samples().clone(),
            log_posteriors,
            statistical_measures,
        ))
    }

    fn compute_dic(&self, chain: &RawChain) -> Result<(f64, f64), SamplerError> {
        let mean_point = chain
            .samples()
            .mean_axis(Axis(0))
            .ok_or(SamplerError::EmptyChain)?;
        let log_prob_at_mean = self
            .posterior
            .evaluate_posterior(mean_point.as_slice().ok_or(SamplerError::EmptyChain)?)?;
        Ok(dic(log_prob_at_mean, chain.log_prob().view()))
    }

    /// Set every free parameter to the median of its samples
    pub fn restore_median_fit(&mut self) -> Result<(), SamplerError> {
        if self.chain.is_none() {
            return Err(SamplerError::NotSampled);
        }
        let medians = self
            .samples
            .values()
            .map(|samples| median(samples.view()).ok_or(SamplerError::EmptyChain))
            .collect::<Result<Vec<_>, _>>()?;
        self.posterior.set_free_values(&medians)
    }

    /// Samples keyed by free-parameter name
    pub fn samples(&self) -> Result<&IndexMap<String, Array1<f64>>, SamplerError> {
        self.chain
            .as_ref()
            .map(|_| &self.samples)
            .ok_or(SamplerError::NotSampled)
    }

    pub fn raw_samples(&self) -> Result<&Array2<f64>, SamplerError> {
        self.chain().map(RawChain::samples)
    }

    pub fn log_like_values(&self) -> Result<&Array1<f64>, SamplerError> {
        self.chain().map(RawChain::log_like)
    }

    pub fn log_probability_values(&self) -> Result<&Array1<f64>, SamplerError> {
        self.chain().map(RawChain::log_prob)
    }

    /// `None` if the engine doesn't estimate the evidence
    pub fn log_marginal_likelihood(&self) -> Result<Option<f64>, SamplerError> {
        self.chain().map(RawChain::log_evidence)
    }

    pub fn results(&self) -> Result<&BayesianResults, SamplerError> {
        self.results.as_ref().ok_or(SamplerError::NotSampled)
    }

    fn chain(&self) -> Result<&RawChain, SamplerError> {
        self.chain.as_ref().ok_or(SamplerError::NotSampled)
    }
}

fn finite_or_zero(name: &str, value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        log::warn!("{name} is not finite ({value}), it is set to zero");
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sampler::statistics;
    use crate::tests::*;

    use approx::assert_relative_eq;
    use ndarray::array;

    fn sampled_base() -> SamplerBase {
        let mut base = SamplerBase::new(two_dataset_posterior());
        let samples = array![[1.0], [3.5], [2.0], [4.0], [3.0]];
        let log_prob = samples.column(0).mapv(|x| {
            base.posterior().evaluate_posterior(&[x]).unwrap()
        });
        let log_like = samples.column(0).mapv(|x| {
            base.posterior().evaluate_log_likelihood(&[x]).unwrap()
        });
        let chain = RawChain::new(samples, log_like, log_prob, None).unwrap();
        let _ = base.store_chain(chain).unwrap();
        base
    }

    #[test]
    fn results_are_built_at_map_point() {
        let base = sampled_base();
        let results = base.results().unwrap();
        // the maximum of the combined quadratic likelihood is at 3.6
        assert_eq!(base.posterior().model().parameter("K").unwrap().value(), 3.5);
        let log_prior = f64::log10(0.2);
        assert_relative_eq!(
            results.log_posteriors()["first"],
            quadratic_log_like(3.5, 2.0, 1.0) + log_prior
        );
        assert_relative_eq!(
            results.log_posteriors()["second"],
            quadratic_log_like(3.5, 4.0, 0.5) + log_prior
        );
        let total = results.total_log_posterior();
        let n_data_points = 2 * MOCK_DATA_POINTS;
        assert_relative_eq!(
            results.statistical_measure("AIC").unwrap(),
            statistics::aic(total, 1, n_data_points)
        );
        assert_relative_eq!(
            results.statistical_measure("BIC").unwrap(),
            statistics::bic(total, 1, n_data_points)
        );
        assert!(results.statistical_measure("DIC").is_some());
        assert!(results.statistical_measure("log(Z)").is_none());
    }

    #[test]
    fn restore_median_fit_sets_column_medians() {
        let mut base = sampled_base();
        base.restore_median_fit().unwrap();
        assert_eq!(base.posterior().model().parameter("K").unwrap().value(), 3.0);
    }

    #[test]
    fn accessors_before_sampling() {
        let mut base = SamplerBase::new(two_dataset_posterior());
        assert_eq!(base.raw_samples().unwrap_err(), SamplerError::NotSampled);
        assert_eq!(base.restore_median_fit().unwrap_err(), SamplerError::NotSampled);
    }

    #[test]
    fn samples_by_name() {
        let base = sampled_base();
        assert_eq!(
            base.samples().unwrap()["K"],
            array![1.0, 3.5, 2.0, 4.0, 3.0]
        );
        assert_eq!(base.log_marginal_likelihood().unwrap(), None);
    }

    #[test]
    fn wrong_number_of_columns() {
        let mut base = SamplerBase::new(two_dataset_posterior());
        let chain = RawChain::new(
            array![[1.0, 2.0]],
            array![0.0],
            array![0.0],
            None,
        )
        .unwrap();
        assert!(matches!(
            base.store_chain(chain),
            Err(SamplerError::DimensionMismatch { .. })
        ));
    }
}
