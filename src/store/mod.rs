//! Template definitions and their compiled, immutable form.
pub mod registry;
pub mod types;

pub use registry::{ClaimTable, CompiledItem, CompiledRule, CompiledTemplate};
pub use types::{LineItem, RuleKind, Severity, Template, ValidationRule};
