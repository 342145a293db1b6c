//! Information criteria of a fit
//!
//! `log_like` arguments are natural-log likelihoods (or posteriors) at the best-fit point.

use crate::array_stats::mean;

use ndarray::ArrayView1;

/// Akaike information criterion with the small-sample correction
///
/// `-2 L + 2 k + 2 k (k + 1) / (n - k - 1)`
pub fn aic(log_like: f64, n_parameters: usize, n_data_points: usize) -> f64 {
    let k = n_parameters as f64;
    let n = n_data_points as f64;
    -2.0 * log_like + 2.0 * k + 2.0 * k * (k + 1.0) / (n - k - 1.0)
}

/// Bayesian information criterion, `-2 L + k ln n`
pub fn bic(log_like: f64, n_parameters: usize, n_data_points: usize) -> f64 {
    -2.0 * log_like + n_parameters as f64 * f64::ln(n_data_points as f64)
}

/// Deviance information criterion and the effective number of parameters
///
/// `log_prob_at_mean` is the log-posterior evaluated at the sample mean, `log_prob` are
/// log-posterior values of the chain. Returns `(DIC, PDIC)`, both zero when not finite.
pub fn dic(log_prob_at_mean: f64, log_prob: ArrayView1<f64>) -> (f64, f64) {
    let mean_log_prob = mean(log_prob).unwrap_or(f64::NAN);
    let pdic = 2.0 * (log_prob_at_mean - mean_log_prob);
    let elpd_dic = log_prob_at_mean - pdic;
    if !pdic.is_finite() || !elpd_dic.is_finite() {
        log::warn!("DIC computation returned a non-finite value, DIC and PDIC are set to zero");
        return (0.0, 0.0);
    }
    (-2.0 * elpd_dic, pdic)
}
