use crate::model::LikelihoodModel;
use crate::prior::Prior;

use indexmap::IndexSet;
use rand::Rng;
use rand_distr::{Distribution, Normal};
use serde::{Deserialize, Serialize};

/// Number of redraws before [Parameter::get_randomized_value] gives up on the bounds
const MAX_RANDOMIZATION_ATTEMPTS: usize = 1000;

/// Named scalar parameter of a model or a dataset
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
pub struct Parameter {
    name: String,
    value: f64,
    min_value: Option<f64>,
    max_value: Option<f64>,
    prior: Option<Prior>,
    free: bool,
}

impl Parameter {
    /// New free parameter without bounds and prior
    pub fn new(name: impl Into<String>, value: f64) -> Self {
        Self {
            name: name.into(),
            value,
            min_value: None,
            max_value: None,
            prior: None,
            free: true,
        }
    }

    pub fn with_bounds(mut self, min_value: Option<f64>, max_value: Option<f64>) -> Self {
        self.set_bounds(min_value, max_value);
        self
    }

    pub fn with_prior(mut self, prior: Prior) -> Self {
        self.prior = Some(prior);
        self
    }

    pub fn with_fixed(mut self, fixed: bool) -> Self {
        self.free = !fixed;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> f64 {
        self.value
    }

    pub fn set_value(&mut self, value: f64) {
        self.value = value;
    }

    pub fn min_value(&self) -> Option<f64> {
        self.min_value
    }

    pub fn max_value(&self) -> Option<f64> {
        self.max_value
    }

    pub fn set_bounds(&mut self, min_value: Option<f64>, max_value: Option<f64>) {
        if let (Some(min), Some(max)) = (min_value, max_value) {
            assert!(min <= max, "min_value must not be larger than max_value");
        }
        self.min_value = min_value;
        self.max_value = max_value;
    }

    pub fn prior(&self) -> Option<&Prior> {
        self.prior.as_ref()
    }

    pub fn set_prior(&mut self, prior: Option<Prior>) {
        self.prior = prior;
    }

    pub fn has_prior(&self) -> bool {
        self.prior.is_some()
    }

    pub fn is_free(&self) -> bool {
        self.free
    }

    pub fn free(&mut self) {
        self.free = true;
    }

    pub fn fix(&mut self) {
        self.free = false;
    }

    /// Is `x` inside of the parameter bounds?
    pub fn within_bounds(&self, x: f64) -> bool {
        self.min_value.is_none_or(|min| x >= min) && self.max_value.is_none_or(|max| x <= max)
    }

    /// Random value close to the current one
    ///
    /// The value is drawn from a normal distribution centered on the current value with standard
    /// deviation `|variance * value|`, or 0.1 if the current value is zero. Bounded parameters
    /// are redrawn until the value is inside of the bounds, which makes the distribution a
    /// truncated normal one.
    pub fn get_randomized_value<R: Rng + ?Sized>(&self, variance: f64, rng: &mut R) -> f64 {
        let mut std = f64::abs(variance * self.value);
        if std == 0.0 || !std.is_finite() {
            std = 0.1;
        }
        let normal = match Normal::new(self.value, std) {
            Ok(normal) => normal,
            Err(_) => return self.value,
        };
        for _ in 0..MAX_RANDOMIZATION_ATTEMPTS {
            let x = normal.sample(rng);
            if self.within_bounds(x) {
                return x;
            }
        }
        self.value
    }
}

/// Explicit binding of trial values to the free parameters for a single evaluation
///
/// Datasets read parameter values from the binding instead of the live model, so evaluating the
/// likelihood never mutates the model. Free parameters take their trial values, everything else
/// is read from the model.
#[derive(Clone, Copy, Debug)]
pub struct ParameterBinding<'a> {
    model: &'a LikelihoodModel,
    free_names: &'a IndexSet<String>,
    values: &'a [f64],
}

impl<'a> ParameterBinding<'a> {
    /// `values` must be aligned with `free_names`
    pub fn new(
        model: &'a LikelihoodModel,
        free_names: &'a IndexSet<String>,
        values: &'a [f64],
    ) -> Self {
        assert_eq!(
            free_names.len(),
            values.len(),
            "every free parameter must have a value"
        );
        Self {
            model,
            free_names,
            values,
        }
    }

    pub fn value(&self, name: &str) -> Option<f64> {
        match self.free_names.get_index_of(name) {
            Some(i) => Some(self.values[i]),
            None => self.model.parameter(name).map(Parameter::value),
        }
    }

    pub fn model(&self) -> &'a LikelihoodModel {
        self.model
    }

    pub fn free_values(&self) -> &'a [f64] {
        self.values
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn randomized_value_respects_bounds() {
        let mut rng = StdRng::seed_from_u64(0);
        let parameter = Parameter::new("index", 1.0).with_bounds(Some(0.95), Some(1.05));
        for _ in 0..1000 {
            let x = parameter.get_randomized_value(0.5, &mut rng);
            assert!((0.95..=1.05).contains(&x));
        }
    }

    #[test]
    fn randomized_value_of_zero_uses_fallback_std() {
        let mut rng = StdRng::seed_from_u64(1);
        let parameter = Parameter::new("offset", 0.0);
        let values: Vec<_> = (0..2000)
            .map(|_| parameter.get_randomized_value(0.1, &mut rng))
            .collect();
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let std = (values.iter().map(|x| (x - mean).powi(2)).sum::<f64>()
            / values.len() as f64)
            .sqrt();
        assert!(mean.abs() < 0.02);
        assert!((std - 0.1).abs() < 0.01);
    }

    #[test]
    fn binding_prefers_trial_values() {
        let model = LikelihoodModel::new([
            Parameter::new("a", 1.0),
            Parameter::new("b", 2.0).with_fixed(true),
        ]);
        let free_names = model.free_parameter_names();
        let values = [10.0];
        let binding = ParameterBinding::new(&model, &free_names, &values);
        assert_eq!(binding.value("a"), Some(10.0));
        assert_eq!(binding.value("b"), Some(2.0));
        assert_eq!(binding.value("c"), None);
    }
}
