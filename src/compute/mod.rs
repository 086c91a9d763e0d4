//! Expression evaluation, the single-period calculator and the
//! multi-period runner.
pub mod engine;
pub mod eval;
pub mod functions;
pub mod ledger;
pub mod runner;

pub use engine::{ClosingSnapshot, PeriodCalculator};
pub use eval::{evaluate, evaluate_with, Evaluator};
pub use functions::{Arg, Arity, Callback, FunctionRegistry};
pub use ledger::{EvalError, Ledger, Snapshot};
pub use runner::{CancelFlag, PeriodRunner, RunFailure, RunOutcome, RunPlan, RunStatus};
