use crate::error::EngineError;
use serde::{Deserialize, Serialize};

/// One named quantity of a template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineItem {
    pub code: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// Takes precedence over `raw_input_reference` when both are present.
    #[serde(default)]
    pub formula: Option<String>,
    /// Where a formula-less item's value comes from, e.g. `driver:REVENUE_BASE`.
    #[serde(default, alias = "base_value_source")]
    pub raw_input_reference: Option<String>,
}

impl LineItem {
    pub fn computed(code: &str, formula: &str) -> Self {
        Self { code: code.into(), formula: Some(formula.into()), ..Default::default() }
    }

    pub fn raw(code: &str) -> Self {
        Self { code: code.into(), ..Default::default() }
    }

    pub fn with_raw_input_reference(mut self, reference: &str) -> Self {
        self.raw_input_reference = Some(reference.into());
        self
    }

    /// The formula, if any. Blank formulas count as none.
    pub fn active_formula(&self) -> Option<&str> {
        self.formula.as_deref().map(str::trim).filter(|f| !f.is_empty())
    }

    /// Key looked up in the raw-input cache for a formula-less item:
    /// `"driver-source: REVENUE"` yields `REVENUE`, a missing reference
    /// yields the item's own code.
    pub fn raw_input_key(&self) -> String {
        let Some(reference) = self.raw_input_reference.as_deref() else {
            return self.code.clone();
        };
        let key = match reference.split_once(':') {
            Some((_, key)) => key.trim(),
            None => reference.trim(),
        };
        if key.is_empty() { self.code.clone() } else { key.to_string() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    #[default]
    Error,
}

/// How a rule's numeric result is judged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuleKind {
    /// Passes when `|value| <= tolerance`.
    #[serde(alias = "reconciliation")]
    Equation,
    /// Passes when `value >= -tolerance`.
    Boundary,
    /// Passes when the value is non-zero, i.e. a comparison held.
    #[default]
    Assertion,
}

impl RuleKind {
    pub fn passes(&self, value: f64, tolerance: f64) -> bool {
        match self {
            RuleKind::Equation => value.abs() <= tolerance,
            RuleKind::Boundary => value >= -tolerance,
            RuleKind::Assertion => value != 0.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ValidationRule {
    #[serde(alias = "rule_id")]
    pub id: String,
    #[serde(alias = "rule")]
    pub formula: String,
    #[serde(default, alias = "rule_type")]
    pub kind: RuleKind,
    /// Falls back to the engine-wide tolerance when absent.
    #[serde(default)]
    pub tolerance: Option<f64>,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub message: String,
    /// The rule is skipped unless every one of these is in the snapshot.
    #[serde(default, alias = "required_line_items")]
    pub required_items: Vec<String>,
}

impl ValidationRule {
    pub fn new(id: &str, formula: &str, kind: RuleKind) -> Self {
        Self { id: id.into(), formula: formula.into(), kind, ..Default::default() }
    }

    pub fn severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn tolerance(mut self, tolerance: f64) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    pub fn requires(mut self, codes: &[&str]) -> Self {
        self.required_items = codes.iter().map(|c| c.to_string()).collect();
        self
    }
}

/// A template as supplied by the template store. Read-only for the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Template {
    #[serde(default, alias = "template_code")]
    pub code: String,
    #[serde(rename = "line_items")]
    pub items: Vec<LineItem>,
    #[serde(default, rename = "validation_rules")]
    pub rules: Vec<ValidationRule>,
}

impl Template {
    pub fn new(code: &str, items: Vec<LineItem>) -> Self {
        Self { code: code.into(), items, rules: Vec::new() }
    }

    pub fn with_rule(mut self, rule: ValidationRule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        serde_json::from_str(json).map_err(|e| EngineError::Template(e.to_string()))
    }
}
