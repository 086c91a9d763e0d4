//! Line items of the template being calculated, now and at other times.
use super::{target_index, unavailable, ValueProvider};
use crate::compute::{EvalError, Ledger, Snapshot};
use crate::context::CalculationContext;
use crate::formula::Reference;
use crate::store::CompiledTemplate;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Snapshots keyed by logical time index: the opening state, closings of
/// earlier periods and any caller-supplied lookahead.
#[derive(Debug, Clone, Default)]
pub struct TimeSeries {
    snapshots: BTreeMap<i32, Arc<Snapshot>>,
}

impl TimeSeries {
    pub fn new() -> Self { Self::default() }

    pub fn insert(&mut self, time_index: i32, snapshot: Arc<Snapshot>) -> Option<Arc<Snapshot>> {
        self.snapshots.insert(time_index, snapshot)
    }

    pub fn get(&self, time_index: i32) -> Option<&Arc<Snapshot>> {
        self.snapshots.get(&time_index)
    }

    pub fn value(&self, time_index: i32, code: &str) -> Option<f64> {
        self.get(time_index)?.get(code)
    }

    pub fn len(&self) -> usize { self.snapshots.len() }
    pub fn is_empty(&self) -> bool { self.snapshots.is_empty() }

    /// Reads `reference` at `context.time_index + offset`. Only meaningful for
    /// nonzero offsets.
    fn resolve_shifted(&self, reference: &Reference, context: &CalculationContext) -> Result<f64, EvalError> {
        let time_index = target_index(reference, context)?;
        self.value(time_index, &reference.code).ok_or_else(|| unavailable(reference, time_index))
    }
}

/// Resolves template codes while a period is in progress.
///
/// Offset 0 reads the current ledger, but only for items that have a
/// formula: a formula-less item read in-period belongs to the raw-input
/// provider. Nonzero offsets read the time series for any template code.
pub struct StatementProvider<'a> {
    template: &'a CompiledTemplate,
    current: &'a Ledger,
    history: &'a TimeSeries,
}

impl<'a> StatementProvider<'a> {
    pub fn new(template: &'a CompiledTemplate, current: &'a Ledger, history: &'a TimeSeries) -> Self {
        Self { template, current, history }
    }
}

impl ValueProvider for StatementProvider<'_> {
    fn name(&self) -> &str { "statement" }

    fn claims(&self, reference: &Reference) -> bool {
        if !reference.is_unqualified() {
            return false;
        }
        match self.template.get(&reference.code) {
            Some(item) => reference.offset != 0 || item.is_computed(),
            None => false,
        }
    }

    fn resolve(&self, reference: &Reference, context: &CalculationContext) -> Result<f64, EvalError> {
        if reference.offset != 0 {
            return self.history.resolve_shifted(reference, context);
        }
        self.template
            .position(&reference.code)
            .and_then(|p| self.current.get(p))
            .ok_or_else(|| EvalError::Provider {
                provider: "statement".into(),
                reference: reference.clone(),
                message: "not yet computed in this period".into(),
            })
    }
}

/// Resolves template codes against a finished period, for validation rules
/// and run invariants. Every code in the snapshot is readable at offset 0.
pub struct SnapshotProvider<'a> {
    current: &'a Snapshot,
    history: &'a TimeSeries,
}

impl<'a> SnapshotProvider<'a> {
    pub fn new(current: &'a Snapshot, history: &'a TimeSeries) -> Self {
        Self { current, history }
    }
}

impl ValueProvider for SnapshotProvider<'_> {
    fn name(&self) -> &str { "snapshot" }

    fn claims(&self, reference: &Reference) -> bool {
        reference.is_unqualified() && (reference.offset != 0 || self.current.contains(&reference.code))
    }

    fn resolve(&self, reference: &Reference, context: &CalculationContext) -> Result<f64, EvalError> {
        if reference.offset != 0 {
            return self.history.resolve_shifted(reference, context);
        }
        self.current
            .get(&reference.code)
            .ok_or_else(|| EvalError::UnresolvedReference { reference: reference.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{LineItem, Template};

    fn template() -> CompiledTemplate {
        CompiledTemplate::compile(&Template::new(
            "BS",
            vec![LineItem::raw("NET"), LineItem::computed("RE", "RE[t-1] + NET")],
        ))
        .unwrap()
    }

    fn history() -> TimeSeries {
        let mut series = TimeSeries::new();
        series.insert(-1, Arc::new([("RE", 1000.0), ("NET", 30.0)].into_iter().collect()));
        series.insert(1, Arc::new([("RE", 1100.0)].into_iter().collect()));
        series
    }

    #[test]
    fn test_claims_follow_formula_presence() {
        let t = template();
        let ledger = Ledger::new(t.len());
        let series = history();
        let p = StatementProvider::new(&t, &ledger, &series);

        assert!(p.claims(&Reference::bare("RE")));
        assert!(!p.claims(&Reference::bare("NET")));
        assert!(p.claims(&Reference::lagged("NET", -1)));
        assert!(!p.claims(&Reference::bare("OTHER")));
        assert!(!p.claims(&Reference::raw_input("RE")));
    }

    #[test]
    fn test_offsets_read_time_series() {
        let t = template();
        let mut ledger = Ledger::new(t.len());
        ledger.insert(t.position("RE").unwrap(), 1040.0);
        let series = history();
        let p = StatementProvider::new(&t, &ledger, &series);
        let ctx = CalculationContext::new("E1", 1, 7, 0);

        assert_eq!(p.resolve(&Reference::lagged("RE", -1), &ctx).unwrap(), 1000.0);
        assert_eq!(p.resolve(&Reference::bare("RE"), &ctx).unwrap(), 1040.0);
        assert_eq!(p.resolve(&Reference::lagged("RE", 1), &ctx).unwrap(), 1100.0);
        assert_eq!(
            p.resolve(&Reference::lagged("RE", 2), &ctx).unwrap_err(),
            EvalError::UnavailableFutureValue { reference: Reference::lagged("RE", 2), time_index: 2 }
        );
        assert_eq!(
            p.resolve(&Reference::lagged("RE", -2), &ctx).unwrap_err(),
            EvalError::UnavailablePriorValue { reference: Reference::lagged("RE", -2), time_index: -2 }
        );
    }

    #[test]
    fn test_snapshot_provider_reads_every_code() {
        let current: Snapshot = [("NET", 40.0), ("RE", 1040.0)].into_iter().collect();
        let series = history();
        let p = SnapshotProvider::new(&current, &series);
        let ctx = CalculationContext::default();
        assert!(p.claims(&Reference::bare("NET")));
        assert!(!p.claims(&Reference::bare("CASH")));
        assert_eq!(p.resolve(&Reference::lagged("NET", -1), &ctx).unwrap(), 30.0);
    }
}
