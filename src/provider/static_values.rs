use super::ValueProvider;
use crate::compute::EvalError;
use crate::context::CalculationContext;
use crate::formula::Reference;
use std::collections::HashMap;

/// Fixed in-period values supplied by the caller. Claims bare, offset-0
/// references to the codes it holds.
#[derive(Debug, Clone)]
pub struct StaticProvider {
    name: String,
    values: HashMap<String, f64>,
}

impl Default for StaticProvider {
    fn default() -> Self {
        Self { name: "static".into(), values: HashMap::new() }
    }
}

impl StaticProvider {
    pub fn new() -> Self { Self::default() }

    pub fn from_pairs(pairs: &[(&str, f64)]) -> Self {
        let mut provider = Self::new();
        for (code, value) in pairs {
            provider.insert(code, *value);
        }
        provider
    }

    pub fn named(mut self, name: &str) -> Self {
        self.name = name.into();
        self
    }

    pub fn insert(&mut self, code: &str, value: f64) {
        self.values.insert(code.to_string(), value);
    }
}

impl ValueProvider for StaticProvider {
    fn name(&self) -> &str { &self.name }

    fn claims(&self, reference: &Reference) -> bool {
        reference.is_unqualified() && reference.offset == 0 && self.values.contains_key(&reference.code)
    }

    fn resolve(&self, reference: &Reference, _: &CalculationContext) -> Result<f64, EvalError> {
        self.values
            .get(&reference.code)
            .copied()
            .ok_or_else(|| EvalError::UnresolvedReference { reference: reference.clone() })
    }
}
