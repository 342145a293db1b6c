use crate::error::SamplerError;

use ndarray::{Array1, Array2};

/// Raw output of a sampling engine
///
/// Rows of `samples` are posterior draws, columns follow the free-parameter order of the
/// [crate::Posterior] the engine ran on. `log_like` and `log_prob` are aligned with the rows.
#[derive(Clone, Debug, PartialEq)]
pub struct RawChain {
    samples: Array2<f64>,
    log_like: Array1<f64>,
    log_prob: Array1<f64>,
    log_evidence: Option<f64>,
}

impl RawChain {
    pub fn new(
        samples: Array2<f64>,
        log_like: Array1<f64>,
        log_prob: Array1<f64>,
        log_evidence: Option<f64>,
    ) -> Result<Self, SamplerError> {
        if samples.nrows() == 0 {
            return Err(SamplerError::EmptyChain);
        }
        for len in [log_like.len(), log_prob.len()] {
            if len != samples.nrows() {
                return Err(SamplerError::DimensionMismatch {
                    expected: samples.nrows(),
                    actual: len,
                });
            }
        }
        Ok(Self {
            samples,
            log_like,
            log_prob,
            log_evidence,
        })
    }

    pub fn samples(&self) -> &Array2<f64> {
        &self.samples
    }

    pub fn log_like(&self) -> &Array1<f64> {
        &self.log_like
    }

    pub fn log_prob(&self) -> &Array1<f64> {
        &self.log_prob
    }

    /// Natural logarithm of the marginal likelihood, if the engine estimates it
    pub fn log_evidence(&self) -> Option<f64> {
        self.log_evidence
    }

    pub fn n_samples(&self) -> usize {
        self.samples.nrows()
    }

    pub fn n_parameters(&self) -> usize {
        self.samples.ncols()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;

    #[test]
    fn misaligned_vectors() {
        let err = RawChain::new(
            array![[1.0], [2.0]],
            array![0.0, 0.0],
            array![0.0],
            None,
        )
        .unwrap_err();
        assert_eq!(
            err,
            SamplerError::DimensionMismatch {
                expected: 2,
                actual: 1
            }
        );
    }

    #[test]
    fn empty_chain() {
        let err = RawChain::new(
            Array2::zeros((0, 2)),
            Array1::zeros(0),
            Array1::zeros(0),
            None,
        )
        .unwrap_err();
        assert_eq!(err, SamplerError::EmptyChain);
    }
}
