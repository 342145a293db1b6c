use crate::background::polynomial::RateModel;

use macro_const::macro_const;
use ndarray::{Array1, ArrayView1, Zip};

/// Smallest positive normal double, model values below it are treated as zero
pub const TINY: f64 = f64::MIN_POSITIVE;

macro_const! {
    const DOC: &str = r"
Poisson log-likelihood of binned counts, the Cash statistic

$$
C = \sum_i \left(M_i - D_i \ln M_i\right),
$$
where $D_i$ are observed counts and $M_i = \mathrm{model}(x_i) \cdot \mathrm{exposure}_i$ are
model-predicted counts. $C$ is minimised by the best fit, it differs from the Castor statistic
(C-stat) by a data-dependent constant.

- Model values with magnitude not larger than the smallest positive double are snapped to it,
  keeping their sign, to avoid underflow
- Negative model values are replaced with zero
- The logarithm is continued linearly below $2 \cdot \mathrm{tiny}$:
  $\ln M \approx |M| / \mathrm{tiny} + \ln \mathrm{tiny} - 1$
- $D_i \ln M_i$ is exactly zero for empty bins, whatever $M_i$ is

The gradient is
$$
\frac{\partial C}{\partial p_j} = \sum_i \frac{\partial M_i}{\partial p_j}
    \left(1 - \frac{D_i}{M_i}\right),
$$
where $D_i / M_i$ is zero for empty bins.
";
}

#[doc = DOC!()]
#[derive(Clone, Debug)]
pub struct PoissonCashLikelihood<M> {
    x: Array1<f64>,
    counts: Array1<f64>,
    exposure: Array1<f64>,
    model: M,
}

impl<M: RateModel> PoissonCashLikelihood<M> {
    /// Unit exposure in every bin
    pub fn new(x: impl Into<Array1<f64>>, counts: impl Into<Array1<f64>>, model: M) -> Self {
        let x = x.into();
        let counts = counts.into();
        assert_eq!(x.len(), counts.len(), "x and counts must have the same length");
        let exposure = Array1::ones(x.len());
        Self {
            x,
            counts,
            exposure,
            model,
        }
    }

    pub fn with_exposure(mut self, exposure: impl Into<Array1<f64>>) -> Self {
        let exposure = exposure.into();
        assert_eq!(
            exposure.len(),
            self.x.len(),
            "exposure must have the same length as x"
        );
        self.exposure = exposure;
        self
    }

    pub const fn doc() -> &'static str {
        DOC
    }

    pub fn model(&self) -> &M {
        &self.model
    }

    pub fn x(&self) -> ArrayView1<'_, f64> {
        self.x.view()
    }

    pub fn counts(&self) -> ArrayView1<'_, f64> {
        self.counts.view()
    }

    /// Number of bins with positive counts
    pub fn n_nonzero(&self) -> usize {
        self.counts.iter().filter(|&&d| d > 0.0).count()
    }

    /// Cash statistic for the given model parameters
    pub fn evaluate(&self, parameters: &[f64]) -> f64 {
        let mut cash = 0.0;
        Zip::from(&self.x)
            .and(&self.counts)
            .and(&self.exposure)
            .for_each(|&x, &d, &exposure| {
                let m = fix_precision(self.model.value(parameters, x) * exposure).max(0.0);
                let d_log_m = if d > 0.0 { d * stabilized_ln(m) } else { 0.0 };
                cash += m - d_log_m;
            });
        cash
    }

    /// Gradient of the Cash statistic over the model parameters
    pub fn gradient(&self, parameters: &[f64]) -> Array1<f64> {
        let mut gradient = Array1::zeros(self.model.n_parameters());
        let mut derivatives = vec![0.0; self.model.n_parameters()];
        Zip::from(&self.x)
            .and(&self.counts)
            .and(&self.exposure)
            .for_each(|&x, &d, &exposure| {
                let m = fix_precision(self.model.value(parameters, x) * exposure);
                let d_over_m = if d > 0.0 {
                    d / if m == 0.0 { TINY } else { m }
                } else {
                    0.0
                };
                self.model.derivatives(parameters, x, &mut derivatives);
                for (g, &dm) in gradient.iter_mut().zip(derivatives.iter()) {
                    *g += fix_precision(dm * exposure) * (1.0 - d_over_m);
                }
            });
        gradient
    }
}

/// Snap values with magnitude below [TINY] to `sign(v) * TINY`, zero stays zero
fn fix_precision(v: f64) -> f64 {
    if v != 0.0 && v.abs() <= TINY {
        v.signum() * TINY
    } else {
        v
    }
}

/// Natural logarithm continued linearly below `2 * TINY`
fn stabilized_ln(m: f64) -> f64 {
    if m > 2.0 * TINY {
        m.ln()
    } else {
        m.abs() / TINY + TINY.ln() - 1.0
    }
}
