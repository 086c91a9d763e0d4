//! Engine options supplied by the orchestration caller.
use crate::error::EngineError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineOptions {
    /// Escalate error-severity template rule violations to a period failure.
    pub strict: bool,
    /// Tolerance for rules that do not declare their own.
    pub tolerance: f64,
    /// Logical clock value of the first period of a run.
    pub start_time_index: i32,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self { strict: false, tolerance: 0.01, start_time_index: 0 }
    }
}

impl EngineOptions {
    pub fn new() -> Self { Self::default() }

    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn from_json(json: &str) -> Result<Self, EngineError> {
        let options: Self = serde_json::from_str(json)
            .map_err(|e| EngineError::Config(format!("invalid engine options: {}", e)))?;
        if !options.tolerance.is_finite() || options.tolerance < 0.0 {
            return Err(EngineError::Config(format!(
                "tolerance must be a non-negative number, got {}",
                options.tolerance
            )));
        }
        Ok(options)
    }
}
