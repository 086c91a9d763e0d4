//! Item, period and run level failures.
use crate::compute::EvalError;
use crate::formula::{ParseError, Reference};
use crate::validation::ValidationViolation;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Malformed template: {0}")]
    Template(String),
    #[error("Invalid configuration: {0}")]
    Config(String),
    #[error("Line item '{code}' is defined more than once")]
    DuplicateLineItem { code: String },
    #[error("Cannot parse formula of '{code}' ({formula}): {source}")]
    Parse { code: String, formula: String, source: ParseError },
    #[error("Cyclic dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
    #[error("Unresolved reference '{reference}' in '{code}' ({formula})")]
    UnresolvedReference { code: String, formula: String, reference: Reference },
    #[error("No future value for '{reference}' at t={time_index} in '{code}' ({formula})")]
    UnavailableFutureValue { code: String, formula: String, reference: Reference, time_index: i32 },
    #[error("Evaluation of '{code}' ({formula}) failed: {source}")]
    FormulaEvaluation { code: String, formula: String, source: EvalError },
    #[error("Line item '{code}' was written twice in one period")]
    DuplicateWrite { code: String },
    #[error("{} validation rule(s) failed", violations.len())]
    ValidationFailed { violations: Vec<ValidationViolation> },
    #[error("{} cross-period invariant(s) failed", violations.len())]
    InvariantFailed { violations: Vec<ValidationViolation> },
    #[error("Raw inputs for entity '{entity_id}' scenario {scenario_id} unavailable: {message}")]
    RawInputSource { entity_id: String, scenario_id: u32, message: String },
    #[error("Run cancelled")]
    Cancelled,
}

impl EvalError {
    /// Attaches the offending line item to an expression failure.
    pub fn at_item(self, code: &str, formula: &str) -> EngineError {
        let (code, formula) = (code.to_string(), formula.to_string());
        match self {
            EvalError::Parse(source) => EngineError::Parse { code, formula, source },
            EvalError::UnresolvedReference { reference } => {
                EngineError::UnresolvedReference { code, formula, reference }
            }
            EvalError::UnavailableFutureValue { reference, time_index } => {
                EngineError::UnavailableFutureValue { code, formula, reference, time_index }
            }
            source => EngineError::FormulaEvaluation { code, formula, source },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_item_keeps_reference_errors_distinct() {
        let err = EvalError::UnresolvedReference { reference: Reference::bare("COST") }
            .at_item("NET", "REVENUE - COST");
        assert_eq!(
            err,
            EngineError::UnresolvedReference {
                code: "NET".into(),
                formula: "REVENUE - COST".into(),
                reference: Reference::bare("COST"),
            }
        );

        let err = EvalError::DivisionByZero.at_item("MARGIN", "NET / REVENUE");
        assert!(matches!(err, EngineError::FormulaEvaluation { ref code, .. } if code == "MARGIN"));
        assert!(err.to_string().contains("NET / REVENUE"));
    }

    #[test]
    fn test_cycle_message_lists_path() {
        let err = EngineError::CyclicDependency { cycle: vec!["A".into(), "B".into(), "A".into()] };
        assert_eq!(err.to_string(), "Cyclic dependency: A -> B -> A");
    }
}
