//! The (entity, scenario, period, time index) tuple scoping one evaluation.
use serde::{Deserialize, Serialize};
use std::fmt;

/// Read-only descriptor threaded through every evaluation of a period.
///
/// `time_index` is the only field interpreted by time-offset references. It is
/// a logical clock and need not equal `period_id`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct CalculationContext {
    pub entity_id: String,
    pub scenario_id: u32,
    pub period_id: u32,
    pub time_index: i32,
}

impl CalculationContext {
    pub fn new(entity_id: impl Into<String>, scenario_id: u32, period_id: u32, time_index: i32) -> Self {
        Self { entity_id: entity_id.into(), scenario_id, period_id, time_index }
    }

    /// The time index a reference with `offset` points at, or `None` when it
    /// falls outside the `i32` range.
    pub fn shifted(&self, offset: i32) -> Option<i32> {
        self.time_index.checked_add(offset)
    }
}

impl fmt::Display for CalculationContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "entity={} scenario={} period={} t={}",
            self.entity_id, self.scenario_id, self.period_id, self.time_index
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shifted_stays_in_range() {
        let ctx = CalculationContext::new("E1", 1, 7, 5);
        assert_eq!(ctx.shifted(-1), Some(4));
        assert_eq!(ctx.shifted(i32::MAX), None);
        assert_eq!(CalculationContext::new("E1", 1, 7, i32::MIN).shifted(-1), None);
    }
}
