//! Declared rules checked against closing snapshots.
pub mod error;
pub mod validator;

pub use error::ValidationViolation;
pub use validator::Validator;
