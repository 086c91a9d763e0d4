//! ledger.rs
//! Dense per-period value store and the immutable snapshot it closes into.

use crate::formula::{ParseError, Reference};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub use self::error::EvalError;
mod error {
    use super::*;
    use thiserror::Error;

    /// Failure of a single expression, before it is tied to a line item.
    #[derive(Error, Debug, Clone, PartialEq)]
    pub enum EvalError {
        #[error(transparent)]
        Parse(#[from] ParseError),
        #[error("No provider claims '{reference}'")]
        UnresolvedReference { reference: Reference },
        #[error("No lookahead value for '{reference}' at t={time_index}")]
        UnavailableFutureValue { reference: Reference, time_index: i32 },
        #[error("No prior value for '{reference}' at t={time_index}")]
        UnavailablePriorValue { reference: Reference, time_index: i32 },
        #[error("Division by zero")]
        DivisionByZero,
        #[error("Unknown function '{name}'")]
        UnknownFunction { name: String },
        #[error("{name} expects {expected} argument(s), got {actual}")]
        WrongArity { name: String, expected: String, actual: usize },
        #[error("Invalid argument to {name}: {message}")]
        InvalidArgument { name: String, message: String },
        #[error("Text \"{text}\" used where a number is required")]
        TextInNumericPosition { text: String },
        #[error("Non-finite result from {operation}")]
        NonFinite { operation: String },
        #[error("Provider '{provider}' failed on '{reference}': {message}")]
        Provider { provider: String, reference: Reference, message: String },
    }
}

/// Values computed so far in one period, indexed by item position.
/// Each slot is written at most once.
#[derive(Debug, Clone, Default)]
pub struct Ledger {
    values: Vec<Option<f64>>,
}

impl Ledger {
    pub fn new(size: usize) -> Self {
        Self { values: vec![None; size] }
    }

    #[inline(always)]
    pub fn get(&self, position: usize) -> Option<f64> {
        self.values.get(position).copied().flatten()
    }

    /// Returns `false`, leaving the ledger untouched, if the slot was
    /// already written.
    pub fn insert(&mut self, position: usize, value: f64) -> bool {
        if position >= self.values.len() {
            self.values.resize(position + 1, None);
        }
        match self.values[position] {
            Some(_) => false,
            None => {
                self.values[position] = Some(value);
                true
            }
        }
    }

    pub fn filled(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }
}

/// An immutable code -> value mapping for one period.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Snapshot {
    values: BTreeMap<String, f64>,
}

impl Snapshot {
    pub fn new() -> Self { Self::default() }

    pub fn get(&self, code: &str) -> Option<f64> { self.values.get(code).copied() }
    pub fn contains(&self, code: &str) -> bool { self.values.contains_key(code) }
    pub fn len(&self) -> usize { self.values.len() }
    pub fn is_empty(&self) -> bool { self.values.is_empty() }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.values.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn insert(&mut self, code: impl Into<String>, value: f64) -> Option<f64> {
        self.values.insert(code.into(), value)
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for Snapshot {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self { values: iter.into_iter().map(|(k, v)| (k.into(), v)).collect() }
    }
}
