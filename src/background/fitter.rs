use crate::background::binning::{BinnedCountSeries, EventList, TimeInterval};
use crate::background::cash::PoissonCashLikelihood;
use crate::background::covariance::CovarianceEstimator;
use crate::background::polynomial::Polynomial;
use crate::background::BackgroundModel;
use crate::error::{BackgroundError, NumericalError};

use cobyla::{FailStatus, Func, RhoBeg, StopTols, minimize};
use nalgebra::{DMatrix, DVector};
use ndarray::{Array1, Array2, ArrayView1, Zip};
use ordered_float::NotNan;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Box for the scaled coefficients, COBYLA does not terminate on unbounded problems
const COEFFICIENT_BOUND: f64 = 1e10;

/// Polynomial background fit of binned event counts with the Cash statistic
///
/// The degree is selected once for the channel-summed counts: polynomials of degrees
/// `0..=max_degree` are fitted, and the highest degree `g + 1` with
/// `2 (C_g - C_(g+1)) >= delta_threshold` is selected, zero if there is no such degree. Every
/// channel is then fitted with the selected degree.
///
/// A fit starts from an ordinary least-squares solution, replaced with a positive heuristic
/// guess if the least-squares polynomial is negative somewhere. The degree is lowered while
/// there are less than two degrees of freedom left, then the Cash statistic is minimised with
/// COBYLA. The coefficient covariance is estimated with [CovarianceEstimator].
///
/// The minimisation runs over `x / max|x|` and coefficients are mapped back to `x` afterwards,
/// which keeps polynomial coefficients of similar magnitude.
#[derive(Clone, Debug, Serialize, Deserialize, JsonSchema, PartialEq, Eq, Hash)]
pub struct BackgroundFitter {
    pub max_degree: u32,
    pub delta_threshold: NotNan<f64>,
    pub bin_width: NotNan<f64>,
    pub max_evaluations: u32,
    /// Initial COBYLA step relative to the mean count rate
    pub rhobeg: NotNan<f64>,
    pub ftol_rel: NotNan<f64>,
    pub covariance: CovarianceEstimator,
}

/// Best-fit polynomial and the Cash statistic at the minimum
#[derive(Clone, Debug, PartialEq)]
pub struct PolynomialFit {
    pub polynomial: Polynomial,
    pub cash: f64,
}

/// Outcome of the degree selection
#[derive(Clone, Debug, PartialEq)]
pub struct DegreeSelection {
    pub degree: usize,
    /// Cash statistic for each trial degree
    pub cash: Vec<f64>,
    /// `2 (C_g - C_(g+1))` for each pair of consecutive degrees
    pub delta: Vec<f64>,
}

impl BackgroundFitter {
    pub fn new(
        max_degree: u32,
        delta_threshold: f64,
        bin_width: f64,
        max_evaluations: u32,
        rhobeg: f64,
        ftol_rel: f64,
        covariance: CovarianceEstimator,
    ) -> Self {
        assert!(delta_threshold >= 0.0, "delta_threshold must be non-negative");
        assert!(bin_width > 0.0, "bin_width must be positive");
        assert!(bin_width.is_finite(), "bin_width must be finite");
        assert!(max_evaluations > 0, "max_evaluations must be positive");
        assert!(rhobeg > 0.0, "rhobeg must be positive");
        assert!(rhobeg.is_finite(), "rhobeg must be finite");
        assert!(ftol_rel >= 0.0, "ftol_rel must be non-negative");
        assert!(ftol_rel.is_finite(), "ftol_rel must be finite");
        Self {
            max_degree,
            delta_threshold: NotNan::new(delta_threshold).expect("delta_threshold must not be NaN"),
            bin_width: NotNan::new(bin_width).expect("bin_width must not be NaN"),
            max_evaluations,
            rhobeg: NotNan::new(rhobeg).expect("rhobeg must not be NaN"),
            ftol_rel: NotNan::new(ftol_rel).expect("ftol_rel must not be NaN"),
            covariance,
        }
    }

    #[inline]
    pub fn default_max_degree() -> u32 {
        4
    }

    #[inline]
    pub fn default_delta_threshold() -> f64 {
        9.0
    }

    #[inline]
    pub fn default_bin_width() -> f64 {
        1.0
    }

    #[inline]
    pub fn default_max_evaluations() -> u32 {
        10_000
    }

    #[inline]
    pub fn default_rhobeg() -> f64 {
        0.1
    }

    #[inline]
    pub fn default_ftol_rel() -> f64 {
        1e-10
    }

    #[inline]
    pub fn default_covariance() -> CovarianceEstimator {
        CovarianceEstimator::default()
    }

    /// Fit every channel of the events inside of the background selections
    pub fn fit_background(
        &self,
        events: &EventList,
        selections: &[TimeInterval],
    ) -> Result<BackgroundModel, BackgroundError> {
        if selections.is_empty() {
            return Err(BackgroundError::NoBackgroundSelection);
        }
        let total = self.bin_events(events.times().iter().copied(), events, selections)?;
        let selection = self.select_degree_of_series(&total)?;
        log::info!("Selected polynomial degree is {}", selection.degree);

        let polynomials = (0..events.n_channels())
            .map(|channel| {
                let series =
                    self.bin_events(events.channel_times(channel), events, selections)?;
                let fit = self
                    .fit_series(&series, selection.degree)
                    .map_err(|err| channel_error(channel, err))?;
                log::debug!(
                    "Channel {channel}: Cash statistic {} for {} bins\n{}",
                    fit.cash,
                    series.len(),
                    fit.polynomial
                );
                Ok(fit.polynomial)
            })
            .collect::<Result<Vec<_>, BackgroundError>>()?;

        Ok(BackgroundModel::new(
            polynomials,
            selection.degree,
            selections.to_vec(),
        ))
    }

    fn bin_events(
        &self,
        times: impl IntoIterator<Item = f64>,
        events: &EventList,
        selections: &[TimeInterval],
    ) -> Result<BinnedCountSeries, BackgroundError> {
        BinnedCountSeries::from_events(
            times,
            events.start(),
            events.stop(),
            self.bin_width.into_inner(),
            selections,
        )
    }

    /// Select the polynomial degree for counts `y` at `x`
    pub fn select_degree(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
    ) -> Result<DegreeSelection, BackgroundError> {
        self.select_degree_with_exposure(x, y, Array1::ones(x.len()).view())
    }

    fn select_degree_of_series(
        &self,
        series: &BinnedCountSeries,
    ) -> Result<DegreeSelection, BackgroundError> {
        let exposure = Array1::from_elem(series.len(), series.width());
        self.select_degree_with_exposure(series.time(), series.counts(), exposure.view())
    }

    fn select_degree_with_exposure(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        exposure: ArrayView1<f64>,
    ) -> Result<DegreeSelection, BackgroundError> {
        let cash = (0..=self.max_degree as usize)
            .map(|degree| {
                self.minimize(x, y, exposure, degree)
                    .map(|fit| fit.cash)
            })
            .collect::<Result<Vec<_>, _>>()?;
        let delta: Vec<_> = cash.windows(2).map(|c| 2.0 * (c[0] - c[1])).collect();
        for (degree, d) in delta.iter().enumerate() {
            log::info!("{} -> {}: delta log-likelihood = {d}", degree, degree + 1);
        }
        let degree = delta
            .iter()
            .rposition(|&d| d >= self.delta_threshold.into_inner())
            .map_or(0, |i| i + 1);
        Ok(DegreeSelection {
            degree,
            cash,
            delta,
        })
    }

    /// Fit counts `y` at `x` with a polynomial of the given degree and estimate its covariance
    ///
    /// All-zero counts give the zero polynomial with zero Cash statistic. The degree of the
    /// result may be lower than requested if there are too few non-empty bins.
    pub fn fit_polynomial(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        degree: usize,
    ) -> Result<PolynomialFit, BackgroundError> {
        self.fit_with_exposure(x, y, Array1::ones(x.len()).view(), degree)
    }

    fn fit_series(
        &self,
        series: &BinnedCountSeries,
        degree: usize,
    ) -> Result<PolynomialFit, BackgroundError> {
        let exposure = Array1::from_elem(series.len(), series.width());
        self.fit_with_exposure(series.time(), series.counts(), exposure.view(), degree)
    }

    fn fit_with_exposure(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        exposure: ArrayView1<f64>,
        degree: usize,
    ) -> Result<PolynomialFit, BackgroundError> {
        let fit = self.minimize(x, y, exposure, degree)?;
        let Some(cash) = fit.likelihood else {
            return Ok(PolynomialFit {
                polynomial: Polynomial::zero(),
                cash: 0.0,
            });
        };

        let covariance = self
            .covariance
            .covariance(|p| cash.gradient(p), &fit.coefficients)?;
        check_variances(&covariance)?;

        // c_i = c'_i / s^i, Cov_ij = Cov'_ij / (s^i s^j)
        let n = fit.coefficients.len();
        let inv_scale_powers = Array1::from_shape_fn(n, |i| fit.scale.powi(-(i as i32)));
        let coefficients = Array1::from(fit.coefficients) * &inv_scale_powers;
        let covariance = Array2::from_shape_fn((n, n), |(i, j)| {
            covariance[[i, j]] * inv_scale_powers[i] * inv_scale_powers[j]
        });
        if covariance.iter().any(|x| !x.is_finite()) {
            return Err(NumericalError::NonFiniteCovariance.into());
        }

        Ok(PolynomialFit {
            polynomial: Polynomial::new(coefficients).with_covariance(covariance)?,
            cash: fit.cash,
        })
    }

    /// Minimise the Cash statistic in the scaled abscissa
    fn minimize(
        &self,
        x: ArrayView1<f64>,
        y: ArrayView1<f64>,
        exposure: ArrayView1<f64>,
        degree: usize,
    ) -> Result<ScaledFit, BackgroundError> {
        if x.len() != y.len() {
            return Err(BackgroundError::LengthMismatch(x.len(), y.len()));
        }
        if x.len() != exposure.len() {
            return Err(BackgroundError::LengthMismatch(x.len(), exposure.len()));
        }
        let n_nonzero = y.iter().filter(|&&y| y > 0.0).count();
        if n_nonzero == 0 {
            return Ok(ScaledFit {
                coefficients: vec![0.0],
                scale: 1.0,
                cash: 0.0,
                likelihood: None,
            });
        }

        let scale = match x.fold(0.0_f64, |acc, &x| acc.max(x.abs())) {
            s if s > 0.0 && s.is_finite() => s,
            _ => 1.0,
        };
        let x_scaled = x.mapv(|x| x / scale);
        let mut rate = y.to_owned();
        Zip::from(&mut rate)
            .and(exposure)
            .for_each(|r, &e| *r = if e > 0.0 { *r / e } else { 0.0 });

        let mut guess = initial_guess(x_scaled.view(), rate.view(), degree);

        let mut dof = n_nonzero as i64 - guess.len() as i64;
        if dof <= 2 {
            while dof < 2 && guess.len() > 1 {
                let _ = guess.pop();
                dof = n_nonzero as i64 - guess.len() as i64;
            }
        }

        let likelihood = PoissonCashLikelihood::new(
            x_scaled,
            y.to_owned(),
            Polynomial::new(vec![0.0; guess.len()]),
        )
        .with_exposure(exposure.to_owned());

        let objective = |p: &[f64], _user_data: &mut ()| -> f64 { likelihood.evaluate(p) };
        let bounds = vec![(-COEFFICIENT_BOUND, COEFFICIENT_BOUND); guess.len()];
        let constraints: Vec<&dyn Func<()>> = vec![];
        let stop_tol = StopTols {
            ftol_rel: self.ftol_rel.into(),
            ..StopTols::default()
        };
        let mean_rate = rate.iter().map(|r| r.abs()).sum::<f64>() / rate.len() as f64;
        let rhobeg = self.rhobeg.into_inner() * mean_rate.max(f64::EPSILON);

        let coefficients = match minimize(
            objective,
            &guess,
            &bounds,
            &constraints,
            (),
            self.max_evaluations as usize,
            RhoBeg::All(rhobeg),
            Some(stop_tol),
        ) {
            Ok((status, coefficients, _cash)) => {
                if !matches!(
                    status,
                    cobyla::SuccessStatus::Success
                        | cobyla::SuccessStatus::FtolReached
                        | cobyla::SuccessStatus::XtolReached
                ) {
                    log::warn!(
                        "Direct search for the polynomial of degree {} stopped early: {status:?}",
                        guess.len() - 1
                    );
                }
                coefficients
            }
            // rounding errors stop the search at its converged point
            Err((FailStatus::RoundoffLimited, coefficients, _cash)) => {
                log::debug!(
                    "Direct search for the polynomial of degree {} is limited by roundoff",
                    guess.len() - 1
                );
                coefficients
            }
            Err((status, coefficients, _cash)) => {
                log::warn!(
                    "Direct search for the polynomial of degree {} failed: {status:?}",
                    guess.len() - 1
                );
                coefficients
            }
        };
        let cash = likelihood.evaluate(&coefficients);

        Ok(ScaledFit {
            coefficients,
            scale,
            cash,
            likelihood: Some(likelihood),
        })
    }
}

impl Default for BackgroundFitter {
    fn default() -> Self {
        Self::new(
            Self::default_max_degree(),
            Self::default_delta_threshold(),
            Self::default_bin_width(),
            Self::default_max_evaluations(),
            Self::default_rhobeg(),
            Self::default_ftol_rel(),
            Self::default_covariance(),
        )
    }
}

/// Numerical failures of a channel fit are reported together with the channel index
fn channel_error(channel: usize, err: BackgroundError) -> BackgroundError {
    match err {
        BackgroundError::Numerical(source) => BackgroundError::Channel { channel, source },
        err => err,
    }
}

fn check_variances(covariance: &Array2<f64>) -> Result<(), NumericalError> {
    match covariance
        .diag()
        .iter()
        .enumerate()
        .find(|&(_, &v)| v < 0.0)
    {
        Some((index, &value)) => Err(NumericalError::NegativeVariance { index, value }),
        None => Ok(()),
    }
}

/// Minimisation result over `x / scale`, `likelihood` is `None` for all-zero counts
struct ScaledFit {
    coefficients: Vec<f64>,
    scale: f64,
    cash: f64,
    likelihood: Option<PoissonCashLikelihood<Polynomial>>,
}

/// Least-squares coefficients, or a positive guess if the least-squares polynomial goes
/// negative on `x`
fn initial_guess(x: ArrayView1<f64>, y: ArrayView1<f64>, degree: usize) -> Vec<f64> {
    let least_squares = least_squares_polynomial(x, y, degree);
    if let Some(coefficients) = &least_squares {
        let polynomial = Polynomial::new(coefficients.clone());
        if x.iter().all(|&x| polynomial.evaluate(x) >= 0.0) {
            return coefficients.clone();
        }
    }

    let mean_y = y.sum() / y.len() as f64;
    let mean_x = x.sum() / x.len() as f64;
    let mut guess = least_squares.unwrap_or_else(|| vec![0.0; degree + 1]);
    guess[0] = mean_y;
    for (i, c) in guess.iter_mut().enumerate().skip(1) {
        let power = mean_x.powi(i as i32);
        *c = if power != 0.0 && power.is_finite() {
            c.abs() / power
        } else {
            c.abs()
        };
    }
    guess
}

/// Least-squares polynomial coefficients by the singular value decomposition
fn least_squares_polynomial(x: ArrayView1<f64>, y: ArrayView1<f64>, degree: usize) -> Option<Vec<f64>> {
    let vandermonde = DMatrix::from_fn(x.len(), degree + 1, |i, j| x[i].powi(j as i32));
    let b = DVector::from_iterator(y.len(), y.iter().copied());
    let solution = vandermonde.svd(true, true).solve(&b, f64::EPSILON).ok()?;
    let coefficients: Vec<f64> = solution.iter().copied().collect();
    coefficients
        .iter()
        .all(|c| c.is_finite())
        .then_some(coefficients)
}
