//! Human-readable audit output.
pub mod trace;

pub use trace::format_trace;
