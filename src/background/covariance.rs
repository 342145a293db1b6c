use crate::error::NumericalError;

use nalgebra::DMatrix;
use ndarray::{Array1, Array2};
use ordered_float::NotNan;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Covariance matrix from finite differences of an analytic gradient
///
/// For every parameter `i` the central-difference step `h_i` is adjusted until the change of the
/// i-th gradient component, `g_i(p + h_i e_i) - g_i(p - h_i e_i)`, is within
/// `[min_func_change, max_func_change]`. Each adjustment rescales the step to bring the change
/// to `target`, steps are clipped to `[min_step, max_step]`, and a step hitting one of the
/// limits is accepted as is. The Hessian row is `(g(p + h_i e_i) - g(p - h_i e_i)) / (2 h_i)`,
/// the covariance matrix is its inverse.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct CovarianceEstimator {
    pub init_step: NotNan<f64>,
    pub min_step: NotNan<f64>,
    pub max_step: NotNan<f64>,
    pub max_iters: u32,
    pub target: NotNan<f64>,
    pub min_func_change: NotNan<f64>,
    pub max_func_change: NotNan<f64>,
}

/// Covariance together with the step-size search diagnostics
#[derive(Clone, Debug, PartialEq)]
pub struct CovarianceEstimate {
    pub covariance: Array2<f64>,
    pub hessian: Array2<f64>,
    pub step_sizes: Array1<f64>,
    pub iterations: Vec<u32>,
    /// Step reached the lower limit
    pub min_step_flags: Vec<bool>,
    /// Step reached the upper limit
    pub max_step_flags: Vec<bool>,
}

enum StepRevision {
    Converged,
    Revised(f64),
}

impl CovarianceEstimator {
    pub fn new(
        init_step: f64,
        min_step: f64,
        max_step: f64,
        max_iters: u32,
        target: f64,
        min_func_change: f64,
        max_func_change: f64,
    ) -> Self {
        assert!(init_step > 0.0, "init_step must be positive");
        assert!(min_step > 0.0, "min_step must be positive");
        assert!(max_step > min_step, "max_step must be larger than min_step");
        assert!(max_iters > 0, "max_iters must be positive");
        assert!(target > 0.0, "target must be positive");
        assert!(
            max_func_change > min_func_change,
            "max_func_change must be larger than min_func_change"
        );
        Self {
            init_step: NotNan::new(init_step).expect("init_step must not be NaN"),
            min_step: NotNan::new(min_step).expect("min_step must not be NaN"),
            max_step: NotNan::new(max_step).expect("max_step must not be NaN"),
            max_iters,
            target: NotNan::new(target).expect("target must not be NaN"),
            min_func_change: NotNan::new(min_func_change)
                .expect("min_func_change must not be NaN"),
            max_func_change: NotNan::new(max_func_change)
                .expect("max_func_change must not be NaN"),
        }
    }

    #[inline]
    pub fn default_init_step() -> f64 {
        0.01
    }

    #[inline]
    pub fn default_min_step() -> f64 {
        1e-12
    }

    #[inline]
    pub fn default_max_step() -> f64 {
        1.0
    }

    #[inline]
    pub fn default_max_iters() -> u32 {
        50
    }

    #[inline]
    pub fn default_target() -> f64 {
        0.1
    }

    #[inline]
    pub fn default_min_func_change() -> f64 {
        1e-7
    }

    #[inline]
    pub fn default_max_func_change() -> f64 {
        4.0
    }

    /// Covariance matrix at `parameters`, which should be the minimum of the function
    pub fn covariance<G>(&self, gradient: G, parameters: &[f64]) -> Result<Array2<f64>, NumericalError>
    where
        G: Fn(&[f64]) -> Array1<f64>,
    {
        self.estimate(gradient, parameters)
            .map(|estimate| estimate.covariance)
    }

    /// Covariance matrix with diagnostics
    pub fn estimate<G>(
        &self,
        gradient: G,
        parameters: &[f64],
    ) -> Result<CovarianceEstimate, NumericalError>
    where
        G: Fn(&[f64]) -> Array1<f64>,
    {
        let n = parameters.len();
        let min_step = self.min_step.into_inner();
        let max_step = self.max_step.into_inner();
        let initial_step = self
            .init_step
            .into_inner()
            .max(1.1 * min_step)
            .min(0.9 * max_step);

        let mut step_sizes = Array1::from_elem(n, initial_step);
        let mut hessian = Array2::zeros((n, n));
        let mut iterations = vec![0; n];
        let mut min_step_flags = vec![false; n];
        let mut max_step_flags = vec![false; n];
        let mut p = parameters.to_vec();

        for i in 0..n {
            let mut converged = false;
            let mut step = step_sizes[i];
            let mut difference = Array1::zeros(n);
            for _ in 0..self.max_iters {
                iterations[i] += 1;
                step = step_sizes[i];

                p[i] = parameters[i] + step;
                let g_up = gradient(&p);
                p[i] = parameters[i] - step;
                let g_down = gradient(&p);
                p[i] = parameters[i];
                if g_up.len() != n || g_down.len() != n {
                    return Err(NumericalError::DimensionMismatch {
                        expected: n,
                        actual: g_up.len().max(g_down.len()),
                    });
                }
                difference = g_up - g_down;

                if step == max_step {
                    max_step_flags[i] = true;
                    converged = true;
                } else if step == min_step {
                    min_step_flags[i] = true;
                    converged = true;
                } else {
                    match self.revise_step(difference[i], step) {
                        StepRevision::Converged => converged = true,
                        StepRevision::Revised(new_step) => step_sizes[i] = new_step,
                    }
                }
                if converged {
                    break;
                }
            }
            hessian
                .row_mut(i)
                .assign(&(difference / (2.0 * step)));
            step_sizes[i] = step;
            if !converged {
                log::warn!(
                    "Step size for parameter {i} ({step:.2e}) did not result in convergence"
                );
            }
        }

        let covariance = invert(&hessian)?;
        for (i, &variance) in covariance.diag().iter().enumerate() {
            if variance < 0.0 {
                log::warn!(
                    "Negative variance {variance:.3e} of parameter {i}, the point is not a minimum"
                );
            }
        }
        Ok(CovarianceEstimate {
            covariance,
            hessian,
            step_sizes,
            iterations,
            min_step_flags,
            max_step_flags,
        })
    }

    fn revise_step(&self, delta: f64, step: f64) -> StepRevision {
        let abs_delta = delta.abs();
        if abs_delta < self.min_func_change.into_inner()
            || abs_delta > self.max_func_change.into_inner()
        {
            let new_step = (step / (abs_delta / self.target.into_inner()))
                .min(self.max_step.into_inner())
                .max(self.min_step.into_inner());
            StepRevision::Revised(new_step)
        } else {
            StepRevision::Converged
        }
    }
}

impl Default for CovarianceEstimator {
    fn default() -> Self {
        Self::new(
            Self::default_init_step(),
            Self::default_min_step(),
            Self::default_max_step(),
            Self::default_max_iters(),
            Self::default_target(),
            Self::default_min_func_change(),
            Self::default_max_func_change(),
        )
    }
}

fn invert(matrix: &Array2<f64>) -> Result<Array2<f64>, NumericalError> {
    let n = matrix.nrows();
    if matrix.iter().any(|x| !x.is_finite()) {
        return Err(NumericalError::SingularHessian);
    }
    let inverse = DMatrix::from_fn(n, n, |i, j| matrix[[i, j]])
        .try_inverse()
        .ok_or(NumericalError::SingularHessian)?;
    let inverse = Array2::from_shape_fn((n, n), |(i, j)| inverse[(i, j)]);
    if inverse.iter().any(|x| !x.is_finite()) {
        return Err(NumericalError::NonFiniteCovariance);
    }
    Ok(inverse)
}
