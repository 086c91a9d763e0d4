//! Read-only analysis of a compiled template's structure.
pub mod topology;
