//! Synthetic Poisson data for tests and benchmarks

use rand::Rng;
use rand_distr::{Distribution, Exp, Poisson};

/// Expected counts of a linear rate in consecutive bins
#[derive(Clone, Debug)]
pub struct PoissonSeries {
    /// Bin centres
    pub time: Vec<f64>,
    pub expected: Vec<f64>,
}

impl PoissonSeries {
    /// Bins of `width` covering `[start, stop)`, rate is `intercept + slope * t` per unit time
    pub fn linear(start: f64, stop: f64, width: f64, intercept: f64, slope: f64) -> Self {
        let n = ((stop - start) / width).round() as usize;
        let time: Vec<_> = (0..n)
            .map(|i| start + (i as f64 + 0.5) * width)
            .collect();
        let expected = time
            .iter()
            .map(|&t| f64::max(intercept + slope * t, 0.0) * width)
            .collect();
        Self { time, expected }
    }
}

/// Poisson realisation of the expected counts
pub fn poisson_counts<R: Rng + ?Sized>(expected: &[f64], rng: &mut R) -> Vec<f64> {
    expected
        .iter()
        .map(|&mu| match Poisson::new(mu) {
            Ok(poisson) => Distribution::<f64>::sample(&poisson, rng),
            Err(_) => 0.0,
        })
        .collect()
}

/// Time-tagged events with a linear rate in every channel
#[derive(Clone, Debug)]
pub struct TteSimulation {
    pub start: f64,
    pub stop: f64,
    /// `(intercept, slope)` of the rate for each channel
    pub rates: Vec<(f64, f64)>,
}

/// Simulate sorted event times and their channels by thinning a homogeneous process
pub fn simulate_events<R: Rng + ?Sized>(
    simulation: &TteSimulation,
    rng: &mut R,
) -> (Vec<f64>, Vec<usize>) {
    let rate = |(intercept, slope): (f64, f64), t: f64| f64::max(intercept + slope * t, 0.0);
    let mut events = vec![];
    for (channel, &line) in simulation.rates.iter().enumerate() {
        let max_rate = f64::max(rate(line, simulation.start), rate(line, simulation.stop));
        if !(max_rate > 0.0) {
            continue;
        }
        let Ok(exp) = Exp::new(max_rate) else {
            continue;
        };
        let mut t = simulation.start;
        loop {
            t += exp.sample(rng);
            if t > simulation.stop {
                break;
            }
            if rng.random::<f64>() * max_rate < rate(line, t) {
                events.push((t, channel));
            }
        }
    }
    events.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));
    events.into_iter().unzip()
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn linear_series() {
        let series = PoissonSeries::linear(0.0, 4.0, 2.0, 1.0, 0.5);
        assert_eq!(series.time, [1.0, 3.0]);
        assert_eq!(series.expected, [3.0, 5.0]);
    }

    #[test]
    fn event_rate() {
        let mut rng = StdRng::seed_from_u64(0);
        let simulation = TteSimulation {
            start: 0.0,
            stop: 1000.0,
            rates: vec![(10.0, 0.0), (0.0, 0.0)],
        };
        let (times, channels) = simulate_events(&simulation, &mut rng);
        // 10000 +- 100
        assert!((times.len() as f64 - 1e4).abs() < 500.0);
        assert!(channels.iter().all(|&c| c == 0));
        assert!(times.windows(2).all(|w| w[0] <= w[1]));
    }
}
