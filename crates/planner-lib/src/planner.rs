//! Round driver
//!
//! Selects one batch per round from the machines not yet scheduled, always
//! against the full budget table: machines upgraded in earlier rounds are back
//! in service, so budgets never carry over between rounds. Every successful
//! round removes at least one machine; a round that selects nothing while
//! machines remain is reported as infeasible instead of retried.

use crate::error::PlanError;
use crate::inventory::FleetIndex;
use crate::models::{Batch, ClusterSnapshot, Plan, PlanReport, PlanStats};
use crate::observability::{outcome_label, PlannerMetrics};
use crate::solver::{BatchSolver, ExactSolver, SearchContext, SearchLimits, SolverKind};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for a planning run
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub solver: SolverKind,
    #[serde(flatten)]
    pub limits: SearchLimits,
    /// Search the top-level branches of the exact solver concurrently
    #[serde(default)]
    pub parallel: bool,
}

/// Computes upgrade plans for fleet snapshots
pub struct RoundPlanner {
    config: PlannerConfig,
    solver: Box<dyn BatchSolver>,
    metrics: Option<PlannerMetrics>,
}

impl Default for RoundPlanner {
    fn default() -> Self {
        Self::new(PlannerConfig::default())
    }
}

impl RoundPlanner {
    pub fn new(config: PlannerConfig) -> Self {
        Self {
            solver: config.solver.build(config.parallel),
            config,
            metrics: None,
        }
    }

    /// Record run metrics into the global Prometheus registry
    pub fn with_metrics(mut self, metrics: PlannerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Replace the solver chosen by `config.solver`
    pub fn with_solver(mut self, solver: Box<dyn BatchSolver>) -> Self {
        self.solver = solver;
        self
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    /// Compute the plan without run statistics
    pub fn plan(&self, snapshot: &ClusterSnapshot) -> Result<Plan, PlanError> {
        self.run(snapshot).map(|report| report.plan)
    }

    /// Compute the plan for a snapshot
    pub fn run(&self, snapshot: &ClusterSnapshot) -> Result<PlanReport, PlanError> {
        let started = Instant::now();
        let result = self.run_rounds(snapshot, started);

        if let Err(err) = &result {
            warn!(error = %err, kind = err.kind(), "Planning run failed");
        }

        if let Some(metrics) = &self.metrics {
            metrics.observe_plan_latency(started.elapsed().as_secs_f64());
            metrics.record_outcome(outcome_label(&result));
            if let Ok(report) = &result {
                metrics.observe_batches(report.plan.batches.len());
                metrics.add_search_effort(report.stats.search_steps, report.stats.memo_hits);
            }
        }

        result
    }

    fn run_rounds(
        &self,
        snapshot: &ClusterSnapshot,
        started: Instant,
    ) -> Result<PlanReport, PlanError> {
        let fleet = FleetIndex::build(snapshot)?;
        let budgets = fleet.budgets();

        info!(
            machines = fleet.machine_count(),
            applications = fleet.application_count(),
            solver = self.solver.name(),
            "Planning rolling upgrade"
        );

        let mut remaining: Vec<usize> = (0..fleet.machine_count()).collect();
        let mut plan = Plan::default();
        let mut stats = PlanStats {
            solver: self.solver.name().to_string(),
            ..Default::default()
        };

        while !remaining.is_empty() {
            let round = plan.batches.len() + 1;
            let round_started = Instant::now();
            let mut ctx = SearchContext::new(round, started, self.config.limits);

            let selected = ctx.check_deadline().and_then(|()| {
                self.solver
                    .select_batch(&fleet, &remaining, budgets, &mut ctx)
            });

            stats.search_steps += ctx.steps();
            stats.memo_hits += ctx.memo_hits();
            stats.memo_entries += ctx.memo_entries();
            if let Some(metrics) = &self.metrics {
                metrics.observe_round_latency(round_started.elapsed().as_secs_f64());
            }

            let selected = match selected {
                Ok(selected) => selected,
                Err(aborted) => {
                    warn!(
                        round = round,
                        limit = %aborted.limit,
                        finalized = plan.batches.len(),
                        "Search limit reached, returning partial plan"
                    );
                    return Err(PlanError::DeadlineExceeded {
                        limit: aborted.limit,
                        round,
                        partial: Box::new(plan),
                    });
                }
            };

            if selected.is_empty() {
                let (machine, application) = blocked_machine(&fleet, &remaining, budgets);
                return Err(PlanError::InfeasibleInput {
                    machine,
                    application,
                    round,
                });
            }

            debug!(
                round = round,
                batch_size = selected.len(),
                remaining = remaining.len() - selected.len(),
                steps = ctx.steps(),
                memo_hits = ctx.memo_hits(),
                "Batch selected"
            );

            let mut chosen = vec![false; fleet.machine_count()];
            for &machine in &selected {
                chosen[machine] = true;
            }
            remaining.retain(|&machine| !chosen[machine]);

            plan.batches.push(Batch {
                index: round,
                machines: selected
                    .iter()
                    .map(|&machine| fleet.machine_name(machine).to_string())
                    .collect(),
            });
        }

        plan.complete = true;
        stats.rounds = plan.batches.len();
        stats.elapsed_ms = started.elapsed().as_millis() as u64;

        info!(
            batches = stats.rounds,
            search_steps = stats.search_steps,
            memo_hits = stats.memo_hits,
            elapsed_ms = stats.elapsed_ms,
            "Upgrade plan computed"
        );

        Ok(PlanReport {
            plan,
            stats,
            generated_at: chrono::Utc::now().timestamp(),
        })
    }
}

/// First remaining machine hosting a zero-budget application
fn blocked_machine(fleet: &FleetIndex, remaining: &[usize], budgets: &[u32]) -> (String, String) {
    let blocked = remaining.iter().find_map(|&machine| {
        fleet
            .blocking_application(machine, budgets)
            .map(|application| (machine, application))
    });

    match blocked {
        Some((machine, application)) => (
            fleet.machine_name(machine).to_string(),
            fleet.application_name(application).to_string(),
        ),
        None => {
            let machine = remaining[0];
            let application = fleet
                .applications_of(machine)
                .first()
                .map(|&a| fleet.application_name(a).to_string())
                .unwrap_or_default();
            (fleet.machine_name(machine).to_string(), application)
        }
    }
}

/// Plan a snapshot with the default exact solver and no limits
pub fn plan(snapshot: &ClusterSnapshot) -> Result<Plan, PlanError> {
    RoundPlanner::default().plan(snapshot)
}

/// Largest batch that can be upgraded together from the whole fleet
pub fn select_batch(snapshot: &ClusterSnapshot) -> Result<Vec<String>, PlanError> {
    let fleet = FleetIndex::build(snapshot)?;
    let machines: Vec<usize> = (0..fleet.machine_count()).collect();
    let mut ctx = SearchContext::unbounded(1);

    let selected = ExactSolver::new()
        .select_batch(&fleet, &machines, fleet.budgets(), &mut ctx)
        .map_err(|aborted| PlanError::DeadlineExceeded {
            limit: aborted.limit,
            round: 1,
            partial: Box::default(),
        })?;

    Ok(selected
        .into_iter()
        .map(|machine| fleet.machine_name(machine).to_string())
        .collect())
}
