//! Rolling-upgrade batch planning
//!
//! This crate provides the core functionality for:
//! - Fleet snapshots and their sources (fixtures, generated fleets, files)
//! - Per-round batch optimizers (memoized exact search, greedy first-fit)
//! - The round driver that turns a snapshot into an upgrade plan
//! - Health checks and observability

pub mod error;
pub mod health;
pub mod inventory;
pub mod models;
pub mod observability;
pub mod planner;
pub mod solver;

pub use error::{BudgetProblem, PlanError, SearchAborted, SearchLimit};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use inventory::{FleetIndex, SnapshotSource};
pub use models::*;
pub use observability::{PlannerMetrics, StructuredLogger};
pub use planner::{plan, select_batch, PlannerConfig, RoundPlanner};
pub use solver::{BatchSolver, SearchLimits, SolverKind};
