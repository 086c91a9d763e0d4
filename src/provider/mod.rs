//! Value providers and the chain the evaluator resolves references through.
//!
//! Each provider claims a disjoint set of references, so the order of the
//! chain does not change results. It only decides who is asked first.
pub mod domain;
pub mod raw_input;
pub mod statement;
pub mod static_values;

use crate::compute::EvalError;
use crate::context::CalculationContext;
use crate::formula::Reference;

pub use domain::DomainProvider;
pub use raw_input::{PeriodCalendar, RawInputCache, RawInputProvider, RawInputRecord, RawInputSource};
pub use statement::{SnapshotProvider, StatementProvider, TimeSeries};
pub use static_values::StaticProvider;

pub trait ValueProvider: Send + Sync {
    fn name(&self) -> &str;
    fn claims(&self, reference: &Reference) -> bool;
    fn resolve(&self, reference: &Reference, context: &CalculationContext) -> Result<f64, EvalError>;
}

/// The time index `reference` reads from. An index past the `i32` range
/// holds no snapshot, so it fails like any other missing period.
pub(crate) fn target_index(reference: &Reference, context: &CalculationContext) -> Result<i32, EvalError> {
    context
        .shifted(reference.offset)
        .ok_or_else(|| unavailable(reference, context.time_index.saturating_add(reference.offset)))
}

/// Missing-period error for a time-offset reference.
pub(crate) fn unavailable(reference: &Reference, time_index: i32) -> EvalError {
    if reference.offset > 0 {
        EvalError::UnavailableFutureValue { reference: reference.clone(), time_index }
    } else {
        EvalError::UnavailablePriorValue { reference: reference.clone(), time_index }
    }
}

/// An ordered set of borrowed providers.
#[derive(Default, Clone)]
pub struct ProviderChain<'a> {
    providers: Vec<&'a dyn ValueProvider>,
}

impl<'a> ProviderChain<'a> {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, provider: &'a dyn ValueProvider) -> Self {
        self.providers.push(provider);
        self
    }

    pub fn push(&mut self, provider: &'a dyn ValueProvider) {
        self.providers.push(provider);
    }

    pub fn extend(&mut self, providers: &[&'a dyn ValueProvider]) {
        self.providers.extend_from_slice(providers);
    }

    pub fn len(&self) -> usize { self.providers.len() }
    pub fn is_empty(&self) -> bool { self.providers.is_empty() }

    /// Name of the first provider claiming `reference`.
    pub fn claimant(&self, reference: &Reference) -> Option<&str> {
        self.providers.iter().find(|p| p.claims(reference)).map(|p| p.name())
    }

    pub fn resolve(&self, reference: &Reference, context: &CalculationContext) -> Result<f64, EvalError> {
        match self.providers.iter().find(|p| p.claims(reference)) {
            Some(provider) => provider.resolve(reference, context),
            None => Err(EvalError::UnresolvedReference { reference: reference.clone() }),
        }
    }
}

impl std::fmt::Debug for ProviderChain<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.providers.iter().map(|p| p.name()).collect();
        f.debug_struct("ProviderChain").field("providers", &names).finish()
    }
}
