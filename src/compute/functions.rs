//! Function registry keyed by (name, arity).
//!
//! Built-ins and caller registrations share one table. A registration
//! with the same name and arity replaces what was there, so a caller may
//! override a built-in.

use super::ledger::EvalError;
use crate::context::CalculationContext;
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};

/// A typed function argument. Text only ever comes from a string literal.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Number(f64),
    Text(String),
}

impl Arg {
    pub fn as_number(&self) -> Result<f64, EvalError> {
        match self {
            Arg::Number(n) => Ok(*n),
            Arg::Text(t) => Err(EvalError::TextInNumericPosition { text: t.clone() }),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Arg::Text(t) => Some(t),
            Arg::Number(_) => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
}

impl Arity {
    pub fn accepts(&self, count: usize) -> bool {
        match *self {
            Arity::Exact(n) => count == n,
            Arity::AtLeast(n) => count >= n,
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(n) => write!(f, "{}", n),
            Arity::AtLeast(n) => write!(f, "at least {}", n),
        }
    }
}

pub type Callback =
    Arc<dyn Fn(&[Arg], &CalculationContext) -> Result<f64, EvalError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct FunctionRegistry {
    entries: HashMap<String, Vec<(Arity, Callback)>>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<_> = self.entries.keys().collect();
        names.sort();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}

impl FunctionRegistry {
    /// An empty registry, without built-ins.
    pub fn new() -> Self { Self::default() }

    /// The built-ins: SUM, AVG, MIN, MAX, ABS and IF.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("SUM", Arity::AtLeast(1), |args, _| Ok(numbers(args)?.iter().sum()));
        registry.register("AVG", Arity::AtLeast(1), |args, _| {
            let values = numbers(args)?;
            Ok(values.iter().sum::<f64>() / values.len() as f64)
        });
        registry.register("MIN", Arity::AtLeast(1), |args, _| {
            Ok(numbers(args)?.into_iter().fold(f64::INFINITY, f64::min))
        });
        registry.register("MAX", Arity::AtLeast(1), |args, _| {
            Ok(numbers(args)?.into_iter().fold(f64::NEG_INFINITY, f64::max))
        });
        registry.register("ABS", Arity::Exact(1), |args, _| Ok(args[0].as_number()?.abs()));
        // Both branches are already evaluated when IF runs.
        registry.register("IF", Arity::Exact(3), |args, _| {
            let cond = args[0].as_number()?;
            if cond != 0.0 { args[1].as_number() } else { args[2].as_number() }
        });
        registry
    }

    /// Shared instance of [`FunctionRegistry::standard`].
    pub fn builtin() -> &'static FunctionRegistry {
        static BUILTIN: OnceLock<FunctionRegistry> = OnceLock::new();
        BUILTIN.get_or_init(FunctionRegistry::standard)
    }

    pub fn register<F>(&mut self, name: &str, arity: Arity, f: F) -> &mut Self
    where
        F: Fn(&[Arg], &CalculationContext) -> Result<f64, EvalError> + Send + Sync + 'static,
    {
        let overloads = self.entries.entry(name.to_ascii_uppercase()).or_default();
        let callback: Callback = Arc::new(f);
        match overloads.iter_mut().find(|(a, _)| *a == arity) {
            Some(slot) => slot.1 = callback,
            None => overloads.push((arity, callback)),
        }
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_uppercase())
    }

    /// An exact-arity overload wins over a variadic one.
    pub fn lookup(&self, name: &str, count: usize) -> Result<&Callback, EvalError> {
        let upper = name.to_ascii_uppercase();
        let Some(overloads) = self.entries.get(&upper) else {
            return Err(EvalError::UnknownFunction { name: upper });
        };
        overloads
            .iter()
            .find(|(a, _)| *a == Arity::Exact(count))
            .or_else(|| overloads.iter().find(|(a, _)| a.accepts(count)))
            .map(|(_, f)| f)
            .ok_or_else(|| EvalError::WrongArity {
                expected: overloads
                    .iter()
                    .map(|(a, _)| a.to_string())
                    .collect::<Vec<_>>()
                    .join(" or "),
                name: upper,
                actual: count,
            })
    }

    pub fn call(
        &self,
        name: &str,
        args: &[Arg],
        context: &CalculationContext,
    ) -> Result<f64, EvalError> {
        let f = self.lookup(name, args.len())?;
        f(args, context)
    }
}

fn numbers(args: &[Arg]) -> Result<Vec<f64>, EvalError> {
    args.iter().map(Arg::as_number).collect()
}
