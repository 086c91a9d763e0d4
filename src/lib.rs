//! ledgerflow: a formula-defined line-item engine.
//!
//! A template of line items is compiled once (parsed, dependency-ordered,
//! claim table built), then calculated period by period. Each period
//! evaluates every item in dependency order through a chain of value
//! providers and closes into an immutable snapshot, which becomes the
//! next period's opening state.

pub mod analysis;
pub mod compute;
pub mod config;
pub mod context;
pub mod display;
pub mod error;
pub mod formula;
pub mod graph;
pub mod provider;
pub mod store;
pub mod validation;

pub use compute::{
    evaluate, ClosingSnapshot, EvalError, FunctionRegistry, PeriodCalculator, PeriodRunner, RunFailure,
    RunPlan, Snapshot,
};
pub use config::EngineOptions;
pub use context::CalculationContext;
pub use error::EngineError;
pub use formula::{extract_dependencies, parse, ParseError, Reference};
pub use graph::DependencyGraph;
pub use store::{CompiledTemplate, LineItem, Template, ValidationRule};
