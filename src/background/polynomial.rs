use crate::error::NumericalError;

use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Model of a count rate as a function of a single variable, usually time
///
/// Models are stateless: parameters are passed to every call, which lets the fitter and the
/// covariance estimator probe arbitrary points without mutating the model.
pub trait RateModel {
    fn n_parameters(&self) -> usize;

    /// Model value at `x`
    fn value(&self, parameters: &[f64], x: f64) -> f64;

    /// Partial derivatives of the model value over the parameters at `x`
    fn derivatives(&self, parameters: &[f64], x: f64, derivatives: &mut [f64]);
}

/// Evaluate polynomial with the Horner scheme, coefficients are lowest degree first
pub fn horner<'a, I>(coefficients: I, x: f64) -> f64
where
    I: IntoIterator<Item = &'a f64>,
    I::IntoIter: DoubleEndedIterator,
{
    coefficients
        .into_iter()
        .rev()
        .fold(0.0, |acc, &c| acc * x + c)
}

/// Polynomial with a coefficient covariance matrix
///
/// Coefficients are stored lowest degree first. The covariance matrix is zero until a fit
/// estimates it.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Polynomial {
    coefficients: Array1<f64>,
    covariance: Array2<f64>,
}

impl Polynomial {
    pub fn new(coefficients: impl Into<Array1<f64>>) -> Self {
        let coefficients = coefficients.into();
        assert!(
            !coefficients.is_empty(),
            "polynomial must have at least one coefficient"
        );
        let n = coefficients.len();
        Self {
            coefficients,
            covariance: Array2::zeros((n, n)),
        }
    }

    /// Constant zero polynomial
    pub fn zero() -> Self {
        Self::new(vec![0.0])
    }

    pub fn with_covariance(mut self, covariance: Array2<f64>) -> Result<Self, NumericalError> {
        self.set_covariance(covariance)?;
        Ok(self)
    }

    pub fn set_covariance(&mut self, covariance: Array2<f64>) -> Result<(), NumericalError> {
        let n = self.coefficients.len();
        for actual in [covariance.nrows(), covariance.ncols()] {
            if actual != n {
                return Err(NumericalError::DimensionMismatch {
                    expected: n,
                    actual,
                });
            }
        }
        self.covariance = covariance;
        Ok(())
    }

    pub fn degree(&self) -> usize {
        self.coefficients.len() - 1
    }

    pub fn coefficients(&self) -> ArrayView1<'_, f64> {
        self.coefficients.view()
    }

    pub fn covariance(&self) -> &Array2<f64> {
        &self.covariance
    }

    /// Square roots of the covariance diagonal
    pub fn coefficient_errors(&self) -> Array1<f64> {
        self.covariance.diag().mapv(f64::sqrt)
    }

    pub fn evaluate(&self, x: f64) -> f64 {
        horner(&self.coefficients, x)
    }

    pub fn evaluate_array(&self, x: ArrayView1<f64>) -> Array1<f64> {
        x.mapv(|x| self.evaluate(x))
    }

    /// Definite integral over `[a, b]`
    pub fn integral(&self, a: f64, b: f64) -> f64 {
        let antiderivative = |x: f64| x * horner(&self.antiderivative_coefficients(), x);
        antiderivative(b) - antiderivative(a)
    }

    /// Error of [Polynomial::integral] propagated from the coefficient covariance
    ///
    /// The integral is linear in the coefficients, `I = c . p` with
    /// `c_i = (b^(i+1) - a^(i+1)) / (i + 1)`, so its variance is `c^T Cov c`.
    pub fn integral_error(&self, a: f64, b: f64) -> f64 {
        let c = Array1::from_shape_fn(self.coefficients.len(), |i| {
            let power = (i + 1) as i32;
            (b.powi(power) - a.powi(power)) / power as f64
        });
        let variance = c.dot(&self.covariance.dot(&c));
        f64::sqrt(variance.max(0.0))
    }

    /// Coefficients of the antiderivative divided by x
    fn antiderivative_coefficients(&self) -> Vec<f64> {
        self.coefficients
            .iter()
            .enumerate()
            .map(|(i, &c)| c / (i + 1) as f64)
            .collect()
    }
}

impl RateModel for Polynomial {
    fn n_parameters(&self) -> usize {
        self.coefficients.len()
    }

    fn value(&self, parameters: &[f64], x: f64) -> f64 {
        horner(parameters, x)
    }

    fn derivatives(&self, _parameters: &[f64], x: f64, derivatives: &mut [f64]) {
        let mut power = 1.0;
        for d in derivatives.iter_mut() {
            *d = power;
            power *= x;
        }
    }
}

impl fmt::Display for Polynomial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let line = "-".repeat(68);
        writeln!(f, "{line}")?;
        writeln!(f, "| {:^10} | {:^22} | {:^22} |", "COEFF", "VALUE", "ERROR")?;
        writeln!(f, "|{}", "-".repeat(67))?;
        for (i, (value, error)) in self
            .coefficients
            .iter()
            .zip(self.coefficient_errors())
            .enumerate()
        {
            writeln!(f, "| {i:<10} | {value:>22.5e} | {error:>22.5e} |")?;
        }
        write!(f, "{line}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;
    use ndarray::array;

    #[test]
    fn horner_matches_powers() {
        let p = Polynomial::new(vec![1.0, -2.0, 0.5]);
        for x in [-3.0, 0.0, 0.7, 10.0] {
            assert_relative_eq!(p.evaluate(x), 1.0 - 2.0 * x + 0.5 * x * x);
            assert_eq!(p.evaluate(x), horner(&[1.0, -2.0, 0.5], x));
            assert_eq!(p.evaluate(x), p.value(&[1.0, -2.0, 0.5], x));
        }
        assert_eq!(p.degree(), 2);
    }

    #[test]
    fn integral_of_quadratic() {
        let p = Polynomial::new(vec![1.0, 2.0, 3.0]);
        // x + x^2 + x^3 from 1 to 2
        assert_relative_eq!(p.integral(1.0, 2.0), 14.0 - 3.0);
        assert_relative_eq!(p.integral(2.0, 1.0), -11.0);
    }

    #[test]
    fn integral_error_of_constant() {
        let p = Polynomial::new(vec![5.0])
            .with_covariance(array![[0.25]])
            .unwrap();
        // integral is 5 * (b - a), its error is 0.5 * (b - a)
        assert_relative_eq!(p.integral_error(-1.0, 3.0), 2.0);
    }

    #[test]
    fn integral_error_with_correlation() {
        let covariance = array![[1.0, 0.5], [0.5, 2.0]];
        let p = Polynomial::new(vec![1.0, 1.0])
            .with_covariance(covariance.clone())
            .unwrap();
        let c = array![2.0, (9.0 - 1.0) / 2.0];
        let desired = c.dot(&covariance.dot(&c)).sqrt();
        assert_relative_eq!(p.integral_error(1.0, 3.0), desired);
    }

    #[test]
    fn covariance_dimension_is_checked() {
        let mut p = Polynomial::new(vec![1.0, 1.0]);
        assert_eq!(
            p.set_covariance(Array2::zeros((3, 3))).unwrap_err(),
            NumericalError::DimensionMismatch {
                expected: 2,
                actual: 3
            }
        );
        assert_eq!(p.covariance(), &Array2::<f64>::zeros((2, 2)));
    }

    #[test]
    fn rate_model_derivatives_are_powers() {
        let p = Polynomial::new(vec![0.0; 4]);
        let mut d = [0.0; 4];
        p.derivatives(&[1.0, 1.0, 1.0, 1.0], 2.0, &mut d);
        assert_eq!(d, [1.0, 2.0, 4.0, 8.0]);
    }

    #[test]
    fn display_has_row_per_coefficient() {
        let p = Polynomial::new(vec![1.0, 2.0]);
        let table = p.to_string();
        assert_eq!(table.lines().count(), 6);
        assert!(table.contains("COEFF"));
    }
}
