//! Runs declared rules against a finished period.
use super::error::ValidationViolation;
use crate::compute::{Evaluator, FunctionRegistry, Snapshot};
use crate::context::CalculationContext;
use crate::provider::ProviderChain;
use crate::store::CompiledRule;
use tracing::{trace, warn};

/// Evaluates every rule with the same evaluator used for line items and
/// collects the failures. Never aborts; callers decide what is fatal.
pub struct Validator<'a> {
    chain: &'a ProviderChain<'a>,
    functions: &'a FunctionRegistry,
    default_tolerance: f64,
}

impl<'a> Validator<'a> {
    pub fn new(chain: &'a ProviderChain<'a>, functions: &'a FunctionRegistry, default_tolerance: f64) -> Self {
        Self { chain, functions, default_tolerance }
    }

    pub fn validate(
        &self,
        rules: &[CompiledRule],
        snapshot: &Snapshot,
        context: &CalculationContext,
    ) -> Vec<ValidationViolation> {
        let evaluator = Evaluator::new(self.chain, self.functions, context);
        let mut violations = Vec::new();

        for compiled in rules {
            let rule = &compiled.rule;
            if let Some(missing) = rule.required_items.iter().find(|c| !snapshot.contains(c)) {
                trace!(rule = %rule.id, missing = %missing, "rule skipped");
                continue;
            }

            let tolerance = rule.tolerance.unwrap_or(self.default_tolerance);
            let violation = match evaluator.eval(&compiled.expr) {
                Ok(v) if rule.kind.passes(v, tolerance) => None,
                Ok(v) => Some(ValidationViolation {
                    rule_id: rule.id.clone(),
                    kind: rule.kind,
                    severity: rule.severity,
                    value: Some(v),
                    message: describe(&rule.message, &rule.formula),
                }),
                Err(e) => Some(ValidationViolation {
                    rule_id: rule.id.clone(),
                    kind: rule.kind,
                    severity: rule.severity,
                    value: None,
                    message: format!("{}: {}", describe(&rule.message, &rule.formula), e),
                }),
            };

            if let Some(v) = violation {
                warn!(
                    rule = %v.rule_id,
                    severity = ?v.severity,
                    period = context.period_id,
                    "{}", v
                );
                violations.push(v);
            }
        }
        violations
    }
}

fn describe(message: &str, formula: &str) -> String {
    if message.is_empty() {
        format!("rule '{}' failed", formula)
    } else {
        message.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{SnapshotProvider, TimeSeries};
    use crate::store::{RuleKind, Severity, ValidationRule};
    use rstest::rstest;

    fn snapshot() -> Snapshot {
        [("ASSETS", 500.0), ("LIABILITIES", 300.0), ("EQUITY", 199.995), ("CASH", -2.0)]
            .into_iter()
            .collect()
    }

    fn run(rule: ValidationRule) -> Vec<ValidationViolation> {
        let snap = snapshot();
        let history = TimeSeries::new();
        let view = SnapshotProvider::new(&snap, &history);
        let chain = ProviderChain::new().with(&view);
        let validator = Validator::new(&chain, FunctionRegistry::builtin(), 0.01);
        let compiled = CompiledRule::compile(rule).unwrap();
        validator.validate(&[compiled], &snap, &CalculationContext::default())
    }

    #[rstest]
    #[case(ValidationRule::new("BAL", "ASSETS - LIABILITIES - EQUITY", RuleKind::Equation), 0)]
    #[case(ValidationRule::new("BAL", "ASSETS - LIABILITIES - EQUITY", RuleKind::Equation).tolerance(0.001), 1)]
    #[case(ValidationRule::new("CASH_NN", "CASH", RuleKind::Boundary), 1)]
    #[case(ValidationRule::new("POS", "ASSETS > 0", RuleKind::Assertion), 0)]
    #[case(ValidationRule::new("NEG", "ASSETS < 0", RuleKind::Assertion), 1)]
    #[case(ValidationRule::new("SKIP", "DEBT > 0", RuleKind::Assertion).requires(&["DEBT"]), 0)]
    fn test_rule_outcomes(#[case] rule: ValidationRule, #[case] expected: usize) {
        assert_eq!(run(rule).len(), expected);
    }

    #[test]
    fn test_unevaluable_rule_becomes_violation() {
        let violations = run(
            ValidationRule::new("DEBT_CHECK", "DEBT / ASSETS", RuleKind::Boundary).severity(Severity::Warning),
        );
        assert_eq!(violations.len(), 1);
        let v = &violations[0];
        assert_eq!(v.value, None);
        assert_eq!(v.severity, Severity::Warning);
        assert!(v.message.contains("DEBT"), "{}", v.message);
        assert!(!v.is_error());
    }
}
