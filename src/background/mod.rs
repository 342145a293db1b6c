//! Polynomial background of time-tagged event data
//!
//! Events inside of user-selected background intervals are binned, the polynomial degree is
//! selected on the channel-summed light curve with a likelihood-ratio criterion, and every
//! channel is fitted with the Cash statistic. The fitted model integrates the background rate
//! over any time interval together with its uncertainty.

mod binning;
pub use binning::{BinnedCountSeries, EventList, TimeInterval};

mod cash;
pub use cash::{PoissonCashLikelihood, TINY};

mod covariance;
pub use covariance::{CovarianceEstimate, CovarianceEstimator};

mod fitter;
pub use fitter::{BackgroundFitter, DegreeSelection, PolynomialFit};

mod polynomial;
pub use polynomial::{Polynomial, RateModel, horner};

use crate::error::BackgroundError;

use serde::{Deserialize, Serialize};

/// Per-channel background polynomials fitted by [BackgroundFitter]
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BackgroundModel {
    polynomials: Vec<Polynomial>,
    degree: usize,
    selections: Vec<TimeInterval>,
}

impl BackgroundModel {
    pub fn new(polynomials: Vec<Polynomial>, degree: usize, selections: Vec<TimeInterval>) -> Self {
        Self {
            polynomials,
            degree,
            selections,
        }
    }

    pub fn n_channels(&self) -> usize {
        self.polynomials.len()
    }

    pub fn polynomials(&self) -> &[Polynomial] {
        &self.polynomials
    }

    pub fn polynomial(&self, channel: usize) -> Result<&Polynomial, BackgroundError> {
        self.polynomials
            .get(channel)
            .ok_or(BackgroundError::ChannelOutOfRange {
                channel,
                n_channels: self.polynomials.len(),
            })
    }

    /// Selected degree, polynomials of channels with few non-empty bins may have lower degree
    pub fn degree(&self) -> usize {
        self.degree
    }

    pub fn selections(&self) -> &[TimeInterval] {
        &self.selections
    }

    /// Expected background counts of the channel between `tmin` and `tmax`
    pub fn counts(&self, channel: usize, tmin: f64, tmax: f64) -> Result<f64, BackgroundError> {
        Ok(self.polynomial(channel)?.integral(tmin, tmax))
    }

    /// Uncertainty of [BackgroundModel::counts]
    pub fn counts_error(&self, channel: usize, tmin: f64, tmax: f64) -> Result<f64, BackgroundError> {
        Ok(self.polynomial(channel)?.integral_error(tmin, tmax))
    }

    /// Expected background counts of every channel between `tmin` and `tmax`
    pub fn spectrum(&self, tmin: f64, tmax: f64) -> Vec<f64> {
        self.polynomials
            .iter()
            .map(|polynomial| polynomial.integral(tmin, tmax))
            .collect()
    }
}
