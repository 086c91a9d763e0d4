//! Externally supplied driver values.
//!
//! Raw inputs are loaded once per (entity, scenario) into a cache owned by
//! the run, before any formula is evaluated. Resolution never performs I/O.
use super::{target_index, unavailable, ValueProvider};
use crate::compute::EvalError;
use crate::context::CalculationContext;
use crate::error::EngineError;
use crate::formula::{Namespace, Reference};
use crate::store::ClaimTable;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawInputRecord {
    pub code: String,
    pub period_id: u32,
    pub value: f64,
}

impl RawInputRecord {
    pub fn new(code: &str, period_id: u32, value: f64) -> Self {
        Self { code: code.into(), period_id, value }
    }
}

/// The driver supplier. Implementations may block: they are only called
/// while warming a cache.
pub trait RawInputSource: Send + Sync {
    fn load(&self, entity_id: &str, scenario_id: u32) -> Result<Vec<RawInputRecord>, String>;
}

/// Every entity and scenario sees the same records.
impl RawInputSource for Vec<RawInputRecord> {
    fn load(&self, _: &str, _: u32) -> Result<Vec<RawInputRecord>, String> {
        Ok(self.clone())
    }
}

/// Raw inputs of one (entity, scenario), keyed by key then period.
#[derive(Debug, Clone, Default)]
pub struct RawInputCache {
    entity_id: String,
    scenario_id: u32,
    values: HashMap<String, HashMap<u32, f64>>,
    records: usize,
}

impl RawInputCache {
    /// Loads everything the source holds for one entity and scenario.
    pub fn warm(source: &dyn RawInputSource, entity_id: &str, scenario_id: u32) -> Result<Self, EngineError> {
        let records = source.load(entity_id, scenario_id).map_err(|message| EngineError::RawInputSource {
            entity_id: entity_id.to_string(),
            scenario_id,
            message,
        })?;
        debug!(entity = entity_id, scenario = scenario_id, records = records.len(), "warmed raw inputs");
        Ok(Self::from_records(entity_id, scenario_id, records))
    }

    pub fn from_records(
        entity_id: &str,
        scenario_id: u32,
        records: impl IntoIterator<Item = RawInputRecord>,
    ) -> Self {
        let mut values: HashMap<String, HashMap<u32, f64>> = HashMap::new();
        for r in records {
            values.entry(r.code).or_default().insert(r.period_id, r.value);
        }
        let records = values.values().map(HashMap::len).sum();
        Self { entity_id: entity_id.to_string(), scenario_id, values, records }
    }

    pub fn entity_id(&self) -> &str { &self.entity_id }
    pub fn scenario_id(&self) -> u32 { self.scenario_id }
    pub fn len(&self) -> usize { self.records }
    pub fn is_empty(&self) -> bool { self.records == 0 }

    pub fn get(&self, key: &str, period_id: u32) -> Option<f64> {
        self.values.get(key)?.get(&period_id).copied()
    }
}

/// Maps logical time indices to period ids, so `rawinput:X[t-1]` can find
/// the driver of the previous period.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeriodCalendar {
    periods: BTreeMap<i32, u32>,
}

impl PeriodCalendar {
    pub fn new() -> Self { Self::default() }

    /// Period ids in run order, the first at `start_time_index`. Periods whose
    /// time index would pass `i32::MAX` are left out.
    pub fn sequential(start_time_index: i32, periods: &[u32]) -> Self {
        let periods = periods
            .iter()
            .enumerate()
            .map_while(|(i, &p)| {
                let step = i32::try_from(i).ok()?;
                Some((start_time_index.checked_add(step)?, p))
            })
            .collect();
        Self { periods }
    }

    pub fn insert(&mut self, time_index: i32, period_id: u32) {
        self.periods.insert(time_index, period_id);
    }

    pub fn period_at(&self, time_index: i32) -> Option<u32> {
        self.periods.get(&time_index).copied()
    }
}

/// Claims `rawinput:`/`driver:` references at any offset, and bare offset-0
/// references to formula-less template items.
pub struct RawInputProvider<'a> {
    cache: &'a RawInputCache,
    claims: &'a ClaimTable,
    calendar: &'a PeriodCalendar,
}

impl<'a> RawInputProvider<'a> {
    pub fn new(cache: &'a RawInputCache, claims: &'a ClaimTable, calendar: &'a PeriodCalendar) -> Self {
        Self { cache, claims, calendar }
    }

    fn key_for<'r>(&'r self, reference: &'r Reference) -> &'r str {
        match reference.namespace {
            Some(Namespace::RawInput) => &reference.code,
            _ => self.claims.raw_key(&reference.code).unwrap_or(&reference.code),
        }
    }

    fn period_for(&self, reference: &Reference, context: &CalculationContext) -> Result<u32, EvalError> {
        if reference.offset == 0 {
            return Ok(context.period_id);
        }
        let time_index = target_index(reference, context)?;
        self.calendar.period_at(time_index).ok_or_else(|| unavailable(reference, time_index))
    }
}

impl ValueProvider for RawInputProvider<'_> {
    fn name(&self) -> &str { "rawinput" }

    fn claims(&self, reference: &Reference) -> bool {
        match &reference.namespace {
            Some(Namespace::RawInput) => true,
            Some(Namespace::Domain(_)) => false,
            None => reference.offset == 0 && self.claims.claims(&reference.code),
        }
    }

    fn resolve(&self, reference: &Reference, context: &CalculationContext) -> Result<f64, EvalError> {
        let period_id = self.period_for(reference, context)?;
        let key = self.key_for(reference);
        self.cache.get(key, period_id).ok_or_else(|| EvalError::Provider {
            provider: "rawinput".into(),
            reference: reference.clone(),
            message: format!(
                "no raw input '{}' for period {} (entity '{}', scenario {})",
                key,
                period_id,
                self.cache.entity_id(),
                self.cache.scenario_id()
            ),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingSource {
        loads: AtomicUsize,
    }

    impl RawInputSource for CountingSource {
        fn load(&self, entity_id: &str, _: u32) -> Result<Vec<RawInputRecord>, String> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            if entity_id == "missing" {
                return Err("entity not found".into());
            }
            Ok(vec![RawInputRecord::new("REVENUE", 1, 100.0), RawInputRecord::new("REVENUE", 2, 110.0)])
        }
    }

    fn claim_table() -> ClaimTable {
        let mut claims = ClaimTable::new();
        claims.insert("PRICE", "UNIT_PRICE");
        claims
    }

    #[test]
    fn test_warm_loads_once_and_reports_failures() {
        let source = CountingSource { loads: AtomicUsize::new(0) };
        let cache = RawInputCache::warm(&source, "E1", 3).unwrap();
        assert_eq!(cache.get("REVENUE", 2), Some(110.0));
        assert_eq!(cache.get("REVENUE", 3), None);
        assert_eq!(cache.get("COST", 2), None);
        assert_eq!(cache.len(), 2);
        assert_eq!(source.loads.load(Ordering::SeqCst), 1);

        let err = RawInputCache::warm(&source, "missing", 3).unwrap_err();
        assert!(matches!(err, EngineError::RawInputSource { scenario_id: 3, .. }));
    }

    #[test]
    fn test_claims_bare_only_through_claim_table() {
        let cache = RawInputCache::default();
        let claims = claim_table();
        let calendar = PeriodCalendar::new();
        let p = RawInputProvider::new(&cache, &claims, &calendar);

        assert!(p.claims(&Reference::bare("PRICE")));
        assert!(!p.claims(&Reference::lagged("PRICE", -1)));
        assert!(!p.claims(&Reference::bare("REVENUE")));
        assert!(p.claims(&Reference::raw_input("REVENUE")));
        assert!(p.claims(&Reference::raw_input("REVENUE").with_offset(-1)));
        assert!(!p.claims(&Reference::in_domain("pl", "PRICE")));
    }

    #[test]
    fn test_resolution_uses_key_and_calendar() {
        let cache = RawInputCache::from_records(
            "E1",
            1,
            vec![
                RawInputRecord::new("UNIT_PRICE", 2020, 9.5),
                RawInputRecord::new("REVENUE", 2020, 100.0),
                RawInputRecord::new("REVENUE", 2021, 120.0),
            ],
        );
        let claims = claim_table();
        let calendar = PeriodCalendar::sequential(0, &[2020, 2021]);
        let p = RawInputProvider::new(&cache, &claims, &calendar);
        let ctx = CalculationContext::new("E1", 1, 2021, 1);

        assert_eq!(p.resolve(&Reference::raw_input("REVENUE"), &ctx).unwrap(), 120.0);
        assert_eq!(p.resolve(&Reference::raw_input("REVENUE").with_offset(-1), &ctx).unwrap(), 100.0);
        assert!(matches!(
            p.resolve(&Reference::raw_input("REVENUE").with_offset(1), &ctx),
            Err(EvalError::UnavailableFutureValue { time_index: 2, .. })
        ));
        assert!(matches!(p.resolve(&Reference::bare("PRICE"), &ctx), Err(EvalError::Provider { .. })));

        let ctx = CalculationContext::new("E1", 1, 2020, 0);
        assert_eq!(p.resolve(&Reference::bare("PRICE"), &ctx).unwrap(), 9.5);
    }

    #[test]
    fn test_later_record_for_same_period_wins() {
        let cache = RawInputCache::from_records(
            "E1",
            1,
            vec![RawInputRecord::new("REVENUE", 1, 100.0), RawInputRecord::new("REVENUE", 1, 105.0)],
        );
        assert_eq!(cache.get("REVENUE", 1), Some(105.0));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_calendar_stops_at_time_range_end() {
        let calendar = PeriodCalendar::sequential(i32::MAX - 1, &[1, 2, 3]);
        assert_eq!(calendar.period_at(i32::MAX - 1), Some(1));
        assert_eq!(calendar.period_at(i32::MAX), Some(2));

        let cache = RawInputCache::from_records("E1", 1, vec![RawInputRecord::new("REVENUE", 2, 50.0)]);
        let claims = ClaimTable::new();
        let p = RawInputProvider::new(&cache, &claims, &calendar);
        let ctx = CalculationContext::new("E1", 1, 2, i32::MAX);
        assert!(matches!(
            p.resolve(&Reference::raw_input("REVENUE").with_offset(1), &ctx),
            Err(EvalError::UnavailableFutureValue { time_index: i32::MAX, .. })
        ));
    }
}
