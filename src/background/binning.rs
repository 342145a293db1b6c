use crate::error::BackgroundError;

use itertools::Itertools;
use ndarray::{Array1, ArrayView1};
use serde::{Deserialize, Serialize};

/// Closed time interval `[start, stop]`
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq)]
pub struct TimeInterval {
    start: f64,
    stop: f64,
}

impl TimeInterval {
    pub fn new(start: f64, stop: f64) -> Result<Self, BackgroundError> {
        if !(start <= stop) || !start.is_finite() || !stop.is_finite() {
            return Err(BackgroundError::InvalidInterval { start, stop });
        }
        Ok(Self { start, stop })
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    pub fn contains(&self, t: f64) -> bool {
        t >= self.start && t <= self.stop
    }

    pub fn duration(&self) -> f64 {
        self.stop - self.start
    }
}

/// Is `t` inside of any of the intervals?
pub(crate) fn in_any(intervals: &[TimeInterval], t: f64) -> bool {
    intervals.iter().any(|interval| interval.contains(t))
}

/// Time-tagged events, each with an energy channel
///
/// Times are relative to a reference time, e.g. the trigger, and events are recorded between
/// `start` and `stop`.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct EventList {
    times: Array1<f64>,
    channels: Array1<usize>,
    n_channels: usize,
    start: f64,
    stop: f64,
}

impl EventList {
    pub fn new(
        times: impl Into<Array1<f64>>,
        channels: impl Into<Array1<usize>>,
        n_channels: usize,
        start: f64,
        stop: f64,
    ) -> Result<Self, BackgroundError> {
        let times = times.into();
        let channels = channels.into();
        if times.len() != channels.len() {
            return Err(BackgroundError::LengthMismatch(times.len(), channels.len()));
        }
        if let Some(&channel) = channels.iter().find(|&&channel| channel >= n_channels) {
            return Err(BackgroundError::ChannelOutOfRange {
                channel,
                n_channels,
            });
        }
        let _ = TimeInterval::new(start, stop)?;
        Ok(Self {
            times,
            channels,
            n_channels,
            start,
            stop,
        })
    }

    pub fn times(&self) -> ArrayView1<'_, f64> {
        self.times.view()
    }

    pub fn channels(&self) -> ArrayView1<'_, usize> {
        self.channels.view()
    }

    pub fn n_channels(&self) -> usize {
        self.n_channels
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    pub fn stop(&self) -> f64 {
        self.stop
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    /// Times of the events of a single channel
    pub fn channel_times(&self, channel: usize) -> impl Iterator<Item = f64> + '_ {
        self.times
            .iter()
            .zip(self.channels.iter())
            .filter(move |&(_, &c)| c == channel)
            .map(|(&t, _)| t)
    }
}

/// Fixed-width binned event counts
///
/// Bin edges are `start + k * width` for all such values smaller than `stop`, events on the
/// last edge fall into the last bin. Only bins with the centre inside of a selection interval
/// and at least one event are kept, only events inside of a selection interval are counted.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct BinnedCountSeries {
    time: Array1<f64>,
    counts: Array1<f64>,
    width: f64,
}

impl BinnedCountSeries {
    pub fn from_events(
        times: impl IntoIterator<Item = f64>,
        start: f64,
        stop: f64,
        width: f64,
        selections: &[TimeInterval],
    ) -> Result<Self, BackgroundError> {
        if !(width > 0.0) || !width.is_finite() {
            return Err(BackgroundError::InvalidBinWidth(width));
        }
        let _ = TimeInterval::new(start, stop)?;

        let n_edges = f64::ceil((stop - start) / width) as usize;
        let n_bins = n_edges.saturating_sub(1);
        if n_bins == 0 {
            return Ok(Self {
                time: Array1::zeros(0),
                counts: Array1::zeros(0),
                width,
            });
        }
        let last_edge = start + n_bins as f64 * width;

        let mut times: Vec<f64> = times
            .into_iter()
            .filter(|&t| t >= start && t <= last_edge && in_any(selections, t))
            .collect();
        times.sort_unstable_by(f64::total_cmp);

        let (time, counts): (Vec<_>, Vec<_>) = times
            .into_iter()
            .chunk_by(|&t| usize::min(f64::floor((t - start) / width) as usize, n_bins - 1))
            .into_iter()
            .map(|(i, chunk)| {
                let centre = start + (i as f64 + 0.5) * width;
                (centre, chunk.count() as f64)
            })
            .filter(|&(centre, _)| in_any(selections, centre))
            .unzip();

        Ok(Self {
            time: time.into(),
            counts: counts.into(),
            width,
        })
    }

    /// Bin centres
    pub fn time(&self) -> ArrayView1<'_, f64> {
        self.time.view()
    }

    pub fn counts(&self) -> ArrayView1<'_, f64> {
        self.counts.view()
    }

    /// Counts divided by the bin width
    pub fn rate(&self) -> Array1<f64> {
        &self.counts / self.width
    }

    pub fn width(&self) -> f64 {
        self.width
    }

    pub fn len(&self) -> usize {
        self.time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.time.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use ndarray::array;

    #[test]
    fn histogram_with_inclusive_last_edge() {
        let selections = [TimeInterval::new(-10.0, 10.0).unwrap()];
        // edges 0, 1, 2, 3; 3.5 is outside, 3.0 is inside of the last bin
        let series = BinnedCountSeries::from_events(
            [0.1, 0.2, 1.5, 3.0, 3.5, 2.2, 0.9],
            0.0,
            3.5,
            1.0,
            &selections,
        )
        .unwrap();
        assert_eq!(series.time(), array![0.5, 1.5, 2.5]);
        assert_eq!(series.counts(), array![3.0, 1.0, 2.0]);
    }

    #[test]
    fn selections_and_empty_bins_are_removed() {
        let selections = [
            TimeInterval::new(0.0, 2.0).unwrap(),
            TimeInterval::new(6.0, 8.0).unwrap(),
        ];
        let series = BinnedCountSeries::from_events(
            [0.5, 1.5, 1.6, 4.5, 6.2, 7.7, 7.8],
            0.0,
            10.0,
            2.0,
            &selections,
        )
        .unwrap();
        // bin [2, 4) is empty, bin [4, 6) is not selected
        assert_eq!(series.time(), array![1.0, 7.0]);
        assert_eq!(series.counts(), array![3.0, 3.0]);
        assert_eq!(series.rate(), array![1.5, 1.5]);
    }

    #[test]
    fn invalid_width() {
        assert_eq!(
            BinnedCountSeries::from_events([], 0.0, 1.0, 0.0, &[]).unwrap_err(),
            BackgroundError::InvalidBinWidth(0.0)
        );
    }

    #[test]
    fn channel_out_of_range() {
        assert_eq!(
            EventList::new(array![0.0, 1.0], array![0_usize, 3], 2, 0.0, 1.0).unwrap_err(),
            BackgroundError::ChannelOutOfRange {
                channel: 3,
                n_channels: 2
            }
        );
    }

    #[test]
    fn channel_times() {
        let events = EventList::new(array![0.0, 1.0, 2.0], array![1_usize, 0, 1], 2, 0.0, 3.0).unwrap();
        assert_eq!(events.channel_times(1).collect::<Vec<_>>(), [0.0, 2.0]);
    }
}
