//! Outcome of a failed validation rule.
use crate::store::{RuleKind, Severity};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A declared rule that did not hold for a period's snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationViolation {
    pub rule_id: String,
    pub kind: RuleKind,
    pub severity: Severity,
    /// The rule formula's value, `None` when the formula could not be
    /// evaluated.
    pub value: Option<f64>,
    pub message: String,
}

impl ValidationViolation {
    pub fn is_error(&self) -> bool { self.severity == Severity::Error }
}

impl fmt::Display for ValidationViolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.value {
            Some(v) => write!(f, "[{}] {} (value {:.6})", self.rule_id, self.message, v),
            None => write!(f, "[{}] {}", self.rule_id, self.message),
        }
    }
}
