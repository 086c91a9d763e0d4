//! Multi-period runner.
//!
//! Periods of one run are strictly sequential: the closing snapshot of
//! period i is handed, as the same `Arc`, to period i+1 as its opening
//! state. Independent runs share nothing mutable and may run in parallel.
use super::engine::{ClosingSnapshot, PeriodCalculator};
use super::functions::FunctionRegistry;
use super::ledger::Snapshot;
use crate::config::EngineOptions;
use crate::context::CalculationContext;
use crate::error::EngineError;
use crate::provider::{PeriodCalendar, RawInputCache, RawInputProvider, RawInputSource, TimeSeries, ValueProvider};
use crate::store::{CompiledRule, CompiledTemplate, ValidationRule};
use rayon::prelude::*;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info, info_span};

/// What to run: one entity and scenario over an ordered list of periods.
#[derive(Debug, Clone, Default)]
pub struct RunPlan {
    pub entity_id: String,
    pub scenario_id: u32,
    pub periods: Vec<u32>,
    /// Opening state of the first period.
    pub opening: Option<Arc<Snapshot>>,
    /// Caller-supplied snapshots for lookahead references, by time index.
    pub lookahead: TimeSeries,
}

impl RunPlan {
    pub fn new(entity_id: &str, scenario_id: u32, periods: Vec<u32>) -> Self {
        Self { entity_id: entity_id.into(), scenario_id, periods, ..Default::default() }
    }

    pub fn with_opening(mut self, opening: Snapshot) -> Self {
        self.opening = Some(Arc::new(opening));
        self
    }

    pub fn with_lookahead(mut self, time_index: i32, snapshot: Snapshot) -> Self {
        self.lookahead.insert(time_index, Arc::new(snapshot));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunStatus {
    #[default]
    Pending,
    Running { period_index: usize },
    Completed,
    Failed { period_index: usize },
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Completed | RunStatus::Failed { .. })
    }
}

/// The first period that failed, and why. A failed run is restarted from
/// its first period; there is no partial resumption.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Period {period_index} (id {period_id}) failed: {cause}")]
pub struct RunFailure {
    pub period_index: usize,
    pub period_id: u32,
    pub cause: EngineError,
}

/// Final state of a run with every snapshot completed before it stopped.
#[derive(Debug, Clone, Default)]
pub struct RunOutcome {
    pub status: RunStatus,
    pub snapshots: Vec<ClosingSnapshot>,
    pub failure: Option<RunFailure>,
}

impl RunOutcome {
    fn begin(&mut self, period_index: usize) {
        debug!(from = ?self.status, period_index, "run status");
        self.status = RunStatus::Running { period_index };
    }

    fn fail(&mut self, period_index: usize, period_id: u32, cause: EngineError) {
        info!(period_index, period_id, error = %cause, "run failed");
        self.status = RunStatus::Failed { period_index };
        self.failure = Some(RunFailure { period_index, period_id, cause });
    }

    fn complete(&mut self) {
        info!(periods = self.snapshots.len(), "run completed");
        self.status = RunStatus::Completed;
    }

    pub fn into_result(self) -> Result<Vec<ClosingSnapshot>, RunFailure> {
        match self.failure {
            Some(failure) => Err(failure),
            None => Ok(self.snapshots),
        }
    }
}

/// Shared cancellation switch, checked between periods only.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self { Self::default() }
    pub fn cancel(&self) { self.0.store(true, Ordering::SeqCst) }
    pub fn is_cancelled(&self) -> bool { self.0.load(Ordering::SeqCst) }
}

pub struct PeriodRunner<'a> {
    template: &'a CompiledTemplate,
    functions: &'a FunctionRegistry,
    options: EngineOptions,
    invariants: Vec<CompiledRule>,
    raw_source: Option<&'a dyn RawInputSource>,
    providers: Vec<&'a dyn ValueProvider>,
}

impl<'a> PeriodRunner<'a> {
    pub fn new(template: &'a CompiledTemplate) -> Self {
        Self {
            template,
            functions: FunctionRegistry::builtin(),
            options: EngineOptions::default(),
            invariants: Vec::new(),
            raw_source: None,
            providers: Vec::new(),
        }
    }

    pub fn with_functions(mut self, functions: &'a FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_options(mut self, options: EngineOptions) -> Self {
        self.options = options;
        self
    }

    /// Raw inputs are loaded from `source` once per run, before the first
    /// period.
    pub fn with_raw_inputs(mut self, source: &'a dyn RawInputSource) -> Self {
        self.raw_source = Some(source);
        self
    }

    pub fn with_provider(mut self, provider: &'a dyn ValueProvider) -> Self {
        self.providers.push(provider);
        self
    }

    /// Adds a cross-period identity checked after every period. An
    /// error-severity failure aborts the run.
    pub fn with_invariant(mut self, rule: ValidationRule) -> Result<Self, EngineError> {
        self.invariants.push(CompiledRule::compile(rule)?);
        Ok(self)
    }

    pub fn run(&self, plan: &RunPlan) -> Result<Vec<ClosingSnapshot>, RunFailure> {
        self.execute(plan, &CancelFlag::new()).into_result()
    }

    pub fn run_cancellable(&self, plan: &RunPlan, cancel: &CancelFlag) -> Result<Vec<ClosingSnapshot>, RunFailure> {
        self.execute(plan, cancel).into_result()
    }

    /// Runs independent plans in parallel. Each run owns its raw-input cache
    /// and providers; results come back in plan order.
    pub fn run_scenarios(&self, plans: &[RunPlan]) -> Vec<Result<Vec<ClosingSnapshot>, RunFailure>> {
        plans.par_iter().map(|plan| self.run(plan)).collect()
    }

    pub fn execute(&self, plan: &RunPlan, cancel: &CancelFlag) -> RunOutcome {
        let _span = info_span!(
            "run",
            template = %self.template.code(),
            entity = %plan.entity_id,
            scenario = plan.scenario_id,
            periods = plan.periods.len()
        )
        .entered();
        let mut outcome = RunOutcome::default();
        let start = self.options.start_time_index;
        if let Err(cause) = time_span(start, plan) {
            outcome.fail(0, plan.periods.first().copied().unwrap_or_default(), cause);
            return outcome;
        }

        let cache = match self.raw_source {
            Some(source) => match RawInputCache::warm(source, &plan.entity_id, plan.scenario_id) {
                Ok(cache) => Some(cache),
                Err(cause) => {
                    outcome.fail(0, plan.periods.first().copied().unwrap_or_default(), cause);
                    return outcome;
                }
            },
            None => None,
        };
        let calendar = PeriodCalendar::sequential(start, &plan.periods);
        let raw = cache.as_ref().map(|c| RawInputProvider::new(c, self.template.claims(), &calendar));

        let mut calculator = PeriodCalculator::new(self.template)
            .with_functions(self.functions)
            .with_options(self.options.clone());
        if let Some(raw) = &raw {
            calculator = calculator.with_provider(raw);
        }
        for &provider in &self.providers {
            calculator = calculator.with_provider(provider);
        }

        let mut history = plan.lookahead.clone();
        if let Some(opening) = &plan.opening {
            history.insert(start - 1, Arc::clone(opening));
        }

        for (period_index, &period_id) in plan.periods.iter().enumerate() {
            if cancel.is_cancelled() {
                outcome.fail(period_index, period_id, EngineError::Cancelled);
                return outcome;
            }
            outcome.begin(period_index);

            let context = CalculationContext::new(
                plan.entity_id.clone(),
                plan.scenario_id,
                period_id,
                start + period_index as i32,
            );
            let mut closing = match calculator.calculate_in(&history, &context) {
                Ok(closing) => closing,
                Err(cause) => {
                    outcome.fail(period_index, period_id, cause);
                    return outcome;
                }
            };

            let checked = calculator.check(&self.invariants, &closing.values, &history, &context);
            let (fatal, warnings): (Vec<_>, Vec<_>) = checked.into_iter().partition(|v| v.is_error());
            if !fatal.is_empty() {
                outcome.fail(period_index, period_id, EngineError::InvariantFailed { violations: fatal });
                return outcome;
            }
            closing.violations.extend(warnings);

            history.insert(context.time_index, Arc::clone(&closing.values));
            outcome.snapshots.push(closing);
        }

        outcome.complete();
        outcome
    }
}

/// Checks that the opening slot and every period of `plan` get a time index
/// inside the `i32` range when the first period sits at `start`.
fn time_span(start: i32, plan: &RunPlan) -> Result<(), EngineError> {
    let out_of_range = || {
        EngineError::Config(format!(
            "{} period(s) starting at t={} leave the time index range",
            plan.periods.len(),
            start
        ))
    };
    if plan.opening.is_some() {
        start.checked_sub(1).ok_or_else(out_of_range)?;
    }
    let last = plan.periods.len().saturating_sub(1);
    i32::try_from(last).ok().and_then(|n| start.checked_add(n)).ok_or_else(out_of_range)?;
    Ok(())
}
