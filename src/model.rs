use crate::parameter::Parameter;

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// Ordered container of the parameters of a physical model
///
/// Source parameters come first in insertion order, followed by external parameters, typically
/// nuisance parameters imported from datasets. This ordering defines the index correspondence
/// between free parameters and trial-value vectors used by samplers.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct LikelihoodModel {
    parameters: IndexMap<String, Parameter>,
    external_parameters: IndexMap<String, Parameter>,
}

impl LikelihoodModel {
    pub fn new(parameters: impl IntoIterator<Item = Parameter>) -> Self {
        Self {
            parameters: parameters
                .into_iter()
                .map(|p| (p.name().to_owned(), p))
                .collect(),
            external_parameters: IndexMap::new(),
        }
    }

    /// Add or replace a parameter owned by somebody else, e.g. a dataset
    pub fn add_external_parameter(&mut self, parameter: Parameter) {
        let _ = self
            .external_parameters
            .insert(parameter.name().to_owned(), parameter);
    }

    pub fn remove_external_parameter(&mut self, name: &str) -> Option<Parameter> {
        self.external_parameters.shift_remove(name)
    }

    pub fn parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters
            .values()
            .chain(self.external_parameters.values())
    }

    pub fn free_parameters(&self) -> impl Iterator<Item = &Parameter> {
        self.parameters().filter(|p| p.is_free())
    }

    pub fn free_parameter_names(&self) -> IndexSet<String> {
        self.free_parameters().map(|p| p.name().to_owned()).collect()
    }

    pub fn parameter(&self, name: &str) -> Option<&Parameter> {
        self.parameters
            .get(name)
            .or_else(|| self.external_parameters.get(name))
    }

    pub fn parameter_mut(&mut self, name: &str) -> Option<&mut Parameter> {
        match self.parameters.get_mut(name) {
            Some(p) => Some(p),
            None => self.external_parameters.get_mut(name),
        }
    }

    /// Assign `values` to the parameters listed in `names`, pairwise
    pub fn set_parameter_values(&mut self, names: &IndexSet<String>, values: &[f64]) {
        assert_eq!(names.len(), values.len());
        for (name, &value) in names.iter().zip(values) {
            if let Some(p) = self.parameter_mut(name) {
                p.set_value(value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn external_parameters_follow_source_parameters() {
        let mut model = LikelihoodModel::new([
            Parameter::new("K", 1.0),
            Parameter::new("xc", 300.0).with_fixed(true),
            Parameter::new("index", -1.0),
        ]);
        model.add_external_parameter(Parameter::new("cons_NaI0", 1.0));
        let names: Vec<_> = model.free_parameter_names().into_iter().collect();
        assert_eq!(names, ["K", "index", "cons_NaI0"]);
    }

    #[test]
    fn external_parameter_is_replaced() {
        let mut model = LikelihoodModel::default();
        model.add_external_parameter(Parameter::new("cons_b0", 1.0));
        model.add_external_parameter(Parameter::new("cons_b0", 2.0));
        assert_eq!(model.parameters().count(), 1);
        assert_eq!(model.parameter("cons_b0").unwrap().value(), 2.0);
    }

    #[test]
    fn set_values_by_name() {
        let mut model = LikelihoodModel::new([Parameter::new("a", 0.0), Parameter::new("b", 0.0)]);
        let names = model.free_parameter_names();
        model.set_parameter_values(&names, &[1.0, 2.0]);
        assert_eq!(model.parameter("a").unwrap().value(), 1.0);
        assert_eq!(model.parameter("b").unwrap().value(), 2.0);
    }
}
