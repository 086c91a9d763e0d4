//! Dependency graph between the line items of one template.
pub mod dag;

pub use dag::DependencyGraph;
