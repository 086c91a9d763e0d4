use super::statement::TimeSeries;
use super::{target_index, unavailable, ValueProvider};
use crate::compute::{EvalError, Snapshot};
use crate::context::CalculationContext;
use crate::formula::{Namespace, Reference};
use std::sync::Arc;

/// Another domain's results, e.g. the income statement read from the
/// balance sheet as `pl:NET_INCOME`.
#[derive(Debug, Clone)]
pub struct DomainProvider {
    namespace: Namespace,
    series: TimeSeries,
}

impl DomainProvider {
    pub fn new(domain: &str) -> Self {
        Self { namespace: Namespace::from_prefix(domain), series: TimeSeries::new() }
    }

    pub fn with_snapshot(mut self, time_index: i32, snapshot: Arc<Snapshot>) -> Self {
        self.series.insert(time_index, snapshot);
        self
    }

    pub fn insert(&mut self, time_index: i32, snapshot: Arc<Snapshot>) {
        self.series.insert(time_index, snapshot);
    }

    pub fn domain(&self) -> &str { self.namespace.prefix() }
}

impl ValueProvider for DomainProvider {
    fn name(&self) -> &str { self.namespace.prefix() }

    fn claims(&self, reference: &Reference) -> bool {
        reference.namespace.as_ref() == Some(&self.namespace)
    }

    fn resolve(&self, reference: &Reference, context: &CalculationContext) -> Result<f64, EvalError> {
        let time_index = target_index(reference, context)?;
        if let Some(v) = self.series.value(time_index, &reference.code) {
            return Ok(v);
        }
        if reference.offset != 0 {
            return Err(unavailable(reference, time_index));
        }
        Err(EvalError::Provider {
            provider: self.domain().to_string(),
            reference: reference.clone(),
            message: format!("no value at t={}", time_index),
        })
    }
}
