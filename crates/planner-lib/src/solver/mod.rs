//! Per-round batch optimizers

mod context;
mod exact;
mod greedy;
mod memo;

pub use context::{SearchContext, SearchLimits, DEADLINE_CHECK_INTERVAL};
pub use exact::ExactSolver;
pub use greedy::GreedySolver;
pub use memo::{MemoEntry, MemoTable};

use crate::error::SearchAborted;
use crate::inventory::FleetIndex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Trait for batch selection implementations
pub trait BatchSolver: Send + Sync {
    /// Short solver name for logs and reports
    fn name(&self) -> &'static str;

    /// Select machines to upgrade together this round
    ///
    /// `remaining` lists machine indices in input order and `budgets` is the
    /// full budget table. The returned machines are a subset of `remaining`
    /// in the same relative order.
    fn select_batch(
        &self,
        fleet: &FleetIndex,
        remaining: &[usize],
        budgets: &[u32],
        ctx: &mut SearchContext,
    ) -> Result<Vec<usize>, SearchAborted>;
}

/// Available solver implementations
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum SolverKind {
    /// Memoized exact search, largest batch every round
    #[default]
    Exact,
    /// First-fit heuristic for fleets beyond the exact search envelope
    Greedy,
}

impl SolverKind {
    /// Build the solver for this kind
    pub fn build(self, parallel: bool) -> Box<dyn BatchSolver> {
        match self {
            SolverKind::Exact => Box::new(ExactSolver::new().parallel(parallel)),
            SolverKind::Greedy => Box::new(GreedySolver::new()),
        }
    }
}

impl fmt::Display for SolverKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SolverKind::Exact => f.write_str("exact"),
            SolverKind::Greedy => f.write_str("greedy"),
        }
    }
}

impl FromStr for SolverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(SolverKind::Exact),
            "greedy" => Ok(SolverKind::Greedy),
            other => Err(format!("unknown solver '{}' (expected exact or greedy)", other)),
        }
    }
}
