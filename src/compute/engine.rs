//! A synchronous, single-threaded single-period calculator.
use super::eval::Evaluator;
use super::functions::FunctionRegistry;
use super::ledger::{Ledger, Snapshot};
use crate::config::EngineOptions;
use crate::context::CalculationContext;
use crate::error::EngineError;
use crate::formula::Reference;
use crate::provider::{ProviderChain, SnapshotProvider, StatementProvider, TimeSeries, ValueProvider};
use crate::store::{CompiledRule, CompiledTemplate};
use crate::validation::{ValidationViolation, Validator};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info_span, trace};

/// One period's result. Owned by the caller once returned.
#[derive(Debug, Clone, Serialize)]
pub struct ClosingSnapshot {
    pub context: CalculationContext,
    pub values: Arc<Snapshot>,
    /// The snapshot this period was opened from, if any.
    #[serde(skip)]
    pub opening: Option<Arc<Snapshot>>,
    pub violations: Vec<ValidationViolation>,
}

impl ClosingSnapshot {
    pub fn get(&self, code: &str) -> Option<f64> { self.values.get(code) }
}

/// Computes every line item of a template once, in dependency order.
///
/// The statement provider is always asked first; caller providers (raw
/// inputs, peer domains, static values) follow in the order added.
pub struct PeriodCalculator<'a> {
    template: &'a CompiledTemplate,
    functions: &'a FunctionRegistry,
    options: EngineOptions,
    providers: Vec<&'a dyn ValueProvider>,
}

impl<'a> PeriodCalculator<'a> {
    pub fn new(template: &'a CompiledTemplate) -> Self {
        Self {
            template,
            functions: FunctionRegistry::builtin(),
            options: EngineOptions::default(),
            providers: Vec::new(),
        }
    }

    pub fn with_functions(mut self, functions: &'a FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_provider(mut self, provider: &'a dyn ValueProvider) -> Self {
        self.providers.push(provider);
        self
    }

    /// Calculates a period whose only history is `opening`, placed one step
    /// before `context.time_index`.
    pub fn calculate(
        &self,
        opening: Option<Arc<Snapshot>>,
        context: &CalculationContext,
    ) -> Result<ClosingSnapshot, EngineError> {
        let mut history = TimeSeries::new();
        if let Some(opening) = opening {
            let prior = context.shifted(-1).ok_or_else(|| {
                EngineError::Config(format!("no period precedes t={} to hold the opening state", context.time_index))
            })?;
            history.insert(prior, opening);
        }
        self.calculate_in(&history, context)
    }

    /// Calculates a period against a full time series. Nothing is returned
    /// on failure: a period is all or nothing.
    pub fn calculate_in(
        &self,
        history: &TimeSeries,
        context: &CalculationContext,
    ) -> Result<ClosingSnapshot, EngineError> {
        let _span = info_span!(
            "period",
            entity = %context.entity_id,
            scenario = context.scenario_id,
            period = context.period_id,
            t = context.time_index
        )
        .entered();

        let ledger = self.evaluate_items(history, context)?;
        let values = Arc::new(self.close(&ledger));

        let violations = self.check(self.template.rules(), &values, history, context);
        if self.options.strict && violations.iter().any(ValidationViolation::is_error) {
            return Err(EngineError::ValidationFailed {
                violations: violations.into_iter().filter(ValidationViolation::is_error).collect(),
            });
        }

        debug!(items = values.len(), violations = violations.len(), "period closed");
        Ok(ClosingSnapshot {
            context: context.clone(),
            values,
            opening: context.shifted(-1).and_then(|t| history.get(t)).cloned(),
            violations,
        })
    }

    fn evaluate_items(&self, history: &TimeSeries, context: &CalculationContext) -> Result<Ledger, EngineError> {
        let mut ledger = Ledger::new(self.template.len());

        for &position in self.template.order() {
            let item = self.template.item(position);
            let value = {
                let statement = StatementProvider::new(self.template, &ledger, history);
                let mut chain = ProviderChain::new().with(&statement);
                chain.extend(&self.providers);

                let result = match &item.expr {
                    Some(expr) => Evaluator::new(&chain, self.functions, context).eval(expr),
                    None => chain.resolve(&Reference::bare(&item.code), context),
                };
                result.map_err(|e| e.at_item(&item.code, item.source_text()))?
            };
            trace!(code = %item.code, value, "evaluated");

            if !ledger.insert(position, value) {
                return Err(EngineError::DuplicateWrite { code: item.code.clone() });
            }
        }
        Ok(ledger)
    }

    fn close(&self, ledger: &Ledger) -> Snapshot {
        self.template
            .items()
            .iter()
            .enumerate()
            .filter_map(|(position, item)| ledger.get(position).map(|v| (item.code.as_str(), v)))
            .collect()
    }

    /// Evaluates `rules` against a closed period, with the same caller
    /// providers the items saw.
    pub(crate) fn check(
        &self,
        rules: &[CompiledRule],
        values: &Snapshot,
        history: &TimeSeries,
        context: &CalculationContext,
    ) -> Vec<ValidationViolation> {
        if rules.is_empty() {
            return Vec::new();
        }
        let view = SnapshotProvider::new(values, history);
        let mut chain = ProviderChain::new().with(&view);
        chain.extend(&self.providers);
        Validator::new(&chain, self.functions, self.options.tolerance).validate(rules, values, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compute::functions::Arity;
    use crate::compute::EvalError;
    use crate::provider::{PeriodCalendar, RawInputCache, RawInputProvider, RawInputRecord, StaticProvider};
    use crate::store::{LineItem, RuleKind, Severity, Template, ValidationRule};

    fn compile(template: Template) -> CompiledTemplate {
        CompiledTemplate::compile(&template).expect("compile failed")
    }

    fn ctx() -> CalculationContext {
        CalculationContext::new("E1", 1, 1, 0)
    }

    #[test]
    fn test_net_from_static_inputs() {
        let t = compile(Template::new(
            "PL",
            vec![LineItem::computed("NET", "REVENUE - COST"), LineItem::raw("REVENUE"), LineItem::raw("COST")],
        ));
        let inputs = StaticProvider::from_pairs(&[("REVENUE", 100.0), ("COST", 40.0)]);
        let closing = PeriodCalculator::new(&t).with_provider(&inputs).calculate(None, &ctx()).unwrap();
        assert_eq!(closing.get("NET"), Some(60.0));
        assert_eq!(closing.values.len(), 3);
        assert!(closing.opening.is_none());
    }

    #[test]
    fn test_retained_earnings_roll_forward() {
        let t = compile(Template::new(
            "BS",
            vec![LineItem::computed("RE", "RE[t-1] + NET"), LineItem::computed("NET", "40")],
        ));
        let opening: Snapshot = [("RE", 1000.0)].into_iter().collect();
        let closing = PeriodCalculator::new(&t).calculate(Some(Arc::new(opening)), &ctx()).unwrap();
        assert_eq!(closing.get("RE"), Some(1040.0));
        assert_eq!(t.evaluation_order(), vec!["NET", "RE"]);
    }

    #[test]
    fn test_formula_wins_over_raw_input() {
        let t = compile(Template::new(
            "PL",
            vec![
                LineItem::computed("REVENUE", "rawinput:REVENUE + rawinput:ADJUSTMENT")
                    .with_raw_input_reference("driver:REVENUE"),
            ],
        ));
        assert!(!t.graph().has_edge("REVENUE", "REVENUE"));

        let cache = RawInputCache::from_records(
            "E1",
            1,
            vec![RawInputRecord::new("REVENUE", 1, 100.0), RawInputRecord::new("ADJUSTMENT", 1, 5.0)],
        );
        let calendar = PeriodCalendar::new();
        let raw = RawInputProvider::new(&cache, t.claims(), &calendar);
        assert!(!raw.claims(&Reference::bare("REVENUE")));

        let closing = PeriodCalculator::new(&t).with_provider(&raw).calculate(None, &ctx()).unwrap();
        assert_eq!(closing.get("REVENUE"), Some(105.0));
    }

    #[test]
    fn test_failure_is_tied_to_item() {
        let t = compile(Template::new(
            "PL",
            vec![LineItem::raw("ZERO"), LineItem::computed("MARGIN", "10 / ZERO")],
        ));
        let inputs = StaticProvider::from_pairs(&[("ZERO", 0.0)]);
        let err = PeriodCalculator::new(&t).with_provider(&inputs).calculate(None, &ctx()).unwrap_err();
        assert_eq!(
            err,
            EngineError::FormulaEvaluation {
                code: "MARGIN".into(),
                formula: "10 / ZERO".into(),
                source: EvalError::DivisionByZero,
            }
        );

        let err = PeriodCalculator::new(&t).calculate(None, &ctx()).unwrap_err();
        assert!(matches!(err, EngineError::UnresolvedReference { ref code, .. } if code == "ZERO"));
    }

    #[test]
    fn test_missing_lookahead_fails_period() {
        let t = compile(Template::new("T", vec![LineItem::computed("X", "Y[t+1]"), LineItem::raw("Y")]));
        let inputs = StaticProvider::from_pairs(&[("Y", 1.0)]);
        let err = PeriodCalculator::new(&t).with_provider(&inputs).calculate(None, &ctx()).unwrap_err();
        assert!(matches!(err, EngineError::UnavailableFutureValue { time_index: 1, .. }));
    }

    #[test]
    fn test_far_offsets_fail_without_overflow() {
        let t = compile(Template::new(
            "BS",
            vec![LineItem::computed("RE", "RE[t-1] + NET"), LineItem::computed("NET", "NET[t+2147483647]")],
        ));
        let late = CalculationContext::new("E1", 1, 1, 5);
        let err = PeriodCalculator::new(&t).calculate(None, &late).unwrap_err();
        assert!(matches!(err, EngineError::UnavailableFutureValue { time_index: i32::MAX, .. }));

        let earliest = CalculationContext::new("E1", 1, 1, i32::MIN);
        let opening: Snapshot = [("RE", 1000.0)].into_iter().collect();
        let err = PeriodCalculator::new(&t).calculate(Some(Arc::new(opening)), &earliest).unwrap_err();
        assert!(matches!(err, EngineError::Config(_)));
    }

    #[test]
    fn test_custom_functions_reach_items() {
        let t = compile(Template::new("PL", vec![LineItem::computed("TAX", "TAX_COMPUTE(200, \"FLAT\")")]));
        let mut functions = FunctionRegistry::standard();
        functions.register("TAX_COMPUTE", Arity::Exact(2), |args, _| Ok(args[0].as_number()? * 0.25));
        let closing = PeriodCalculator::new(&t).with_functions(&functions).calculate(None, &ctx()).unwrap();
        assert_eq!(closing.get("TAX"), Some(50.0));
    }

    #[test]
    fn test_rule_severity_and_strict_mode() {
        let template = Template::new("BS", vec![LineItem::computed("ASSETS", "100"), LineItem::computed("DEBTS", "120")])
            .with_rule(ValidationRule::new("SOLVENT", "ASSETS - DEBTS", RuleKind::Boundary))
            .with_rule(
                ValidationRule::new("BIG", "ASSETS > 1000", RuleKind::Assertion).severity(Severity::Warning),
            );
        let t = compile(template);

        let lenient = PeriodCalculator::new(&t).calculate(None, &ctx()).unwrap();
        assert_eq!(lenient.violations.len(), 2);

        let err = PeriodCalculator::new(&t)
            .with_options(EngineOptions::new().strict(true))
            .calculate(None, &ctx())
            .unwrap_err();
        match err {
            EngineError::ValidationFailed { violations } => {
                assert_eq!(violations.len(), 1);
                assert_eq!(violations[0].rule_id, "SOLVENT");
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_recalculation_is_identical() {
        let t = compile(Template::new(
            "PL",
            vec![LineItem::raw("A"), LineItem::computed("B", "A / 3 + A ^ 0.5"), LineItem::computed("C", "B * 7 - A")],
        ));
        let inputs = StaticProvider::from_pairs(&[("A", 2.0)]);
        let calc = PeriodCalculator::new(&t).with_provider(&inputs);
        let first = calc.calculate(None, &ctx()).unwrap();
        let second = calc.calculate(None, &ctx()).unwrap();
        for (code, v) in first.values.iter() {
            assert_eq!(v.to_bits(), second.get(code).unwrap().to_bits());
        }
    }
}
