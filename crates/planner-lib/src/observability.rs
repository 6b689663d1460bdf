//! Observability infrastructure for the upgrade planner
//!
//! Provides:
//! - Prometheus metrics (plan and round latency, outcomes, search effort)
//! - Structured event logging with tracing

use crate::error::PlanError;
use crate::models::PlanReport;
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.005, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 30.0, 60.0,
];

/// Histogram buckets for batches per plan
const BATCH_BUCKETS: &[f64] = &[1.0, 2.0, 3.0, 5.0, 8.0, 13.0, 21.0, 34.0, 55.0, 89.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<PlannerMetricsInner> = OnceLock::new();

struct PlannerMetricsInner {
    plan_latency_seconds: Histogram,
    round_latency_seconds: Histogram,
    plans_total: IntCounterVec,
    batches_per_plan: Histogram,
    search_steps_total: IntCounter,
    memo_hits_total: IntCounter,
}

impl PlannerMetricsInner {
    fn new() -> Self {
        Self {
            plan_latency_seconds: register_histogram!(
                "upgrade_planner_plan_latency_seconds",
                "Time spent computing a full upgrade plan",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register plan_latency_seconds"),

            round_latency_seconds: register_histogram!(
                "upgrade_planner_round_latency_seconds",
                "Time spent selecting a single batch",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register round_latency_seconds"),

            plans_total: register_int_counter_vec!(
                "upgrade_planner_plans_total",
                "Planning runs by outcome",
                &["outcome"]
            )
            .expect("Failed to register plans_total"),

            batches_per_plan: register_histogram!(
                "upgrade_planner_batches_per_plan",
                "Number of batches in completed plans",
                BATCH_BUCKETS.to_vec()
            )
            .expect("Failed to register batches_per_plan"),

            search_steps_total: register_int_counter!(
                "upgrade_planner_search_steps_total",
                "Search states visited by batch solvers"
            )
            .expect("Failed to register search_steps_total"),

            memo_hits_total: register_int_counter!(
                "upgrade_planner_memo_hits_total",
                "Search states answered from the memo table"
            )
            .expect("Failed to register memo_hits_total"),
        }
    }
}

/// Outcome label for a planning run
pub fn outcome_label(result: &Result<PlanReport, PlanError>) -> &'static str {
    match result {
        Ok(_) => "ok",
        Err(PlanError::InfeasibleInput { .. }) => "infeasible",
        Err(PlanError::DeadlineExceeded { .. }) => "deadline_exceeded",
        Err(_) => "invalid_input",
    }
}

/// Planner metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the
/// same underlying metrics.
#[derive(Clone)]
pub struct PlannerMetrics {
    _private: (),
}

impl Default for PlannerMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl PlannerMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(PlannerMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &PlannerMetricsInner {
        GLOBAL_METRICS.get_or_init(PlannerMetricsInner::new)
    }

    pub fn observe_plan_latency(&self, duration_secs: f64) {
        self.inner().plan_latency_seconds.observe(duration_secs);
    }

    pub fn observe_round_latency(&self, duration_secs: f64) {
        self.inner().round_latency_seconds.observe(duration_secs);
    }

    pub fn observe_batches(&self, batches: usize) {
        self.inner().batches_per_plan.observe(batches as f64);
    }

    /// Count a finished run under its outcome label
    pub fn record_outcome(&self, outcome: &str) {
        self.inner()
            .plans_total
            .with_label_values(&[outcome])
            .inc();
    }

    pub fn add_search_effort(&self, steps: u64, memo_hits: u64) {
        self.inner().search_steps_total.inc_by(steps);
        self.inner().memo_hits_total.inc_by(memo_hits);
    }

    /// Current count for an outcome label
    pub fn outcome_count(&self, outcome: &str) -> u64 {
        self.inner()
            .plans_total
            .with_label_values(&[outcome])
            .get()
    }
}

/// Structured logger for planner events
#[derive(Clone)]
pub struct StructuredLogger {
    service: String,
}

impl StructuredLogger {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
        }
    }

    /// Log an incoming plan request
    pub fn log_plan_request(&self, source: &str, machines: usize, applications: usize) {
        info!(
            event = "plan_requested",
            service = %self.service,
            source = %source,
            machines = machines,
            applications = applications,
            "Plan requested"
        );
    }

    /// Log a computed plan
    pub fn log_plan_completed(&self, report: &PlanReport) {
        info!(
            event = "plan_completed",
            service = %self.service,
            solver = %report.stats.solver,
            batches = report.plan.batches.len(),
            machines = report.plan.machine_count(),
            search_steps = report.stats.search_steps,
            memo_hits = report.stats.memo_hits,
            elapsed_ms = report.stats.elapsed_ms,
            fingerprint = %report.plan.fingerprint(),
            "Upgrade plan computed"
        );
    }

    /// Log a failed planning run
    pub fn log_plan_failed(&self, error: &PlanError) {
        match error {
            PlanError::DeadlineExceeded { round, partial, .. } => {
                warn!(
                    event = "plan_failed",
                    service = %self.service,
                    kind = error.kind(),
                    round = round,
                    finalized_batches = partial.batches.len(),
                    error = %error,
                    "Planning stopped at search limit"
                );
            }
            _ => {
                warn!(
                    event = "plan_failed",
                    service = %self.service,
                    kind = error.kind(),
                    error = %error,
                    "Planning failed"
                );
            }
        }
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, solver: &str) {
        info!(
            event = "service_started",
            service = %self.service,
            version = %version,
            solver = %solver,
            "Upgrade planner started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            service = %self.service,
            reason = %reason,
            "Upgrade planner shutting down"
        );
    }
}
