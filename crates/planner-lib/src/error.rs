//! Error types for planning runs

use crate::models::Plan;
use serde::Serialize;
use std::fmt;
use thiserror::Error;

/// Why a budget entry was rejected
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "value")]
pub enum BudgetProblem {
    /// The budget value is below zero
    Negative(i64),
    /// A placement references the application but it has no budget
    Missing,
}

impl fmt::Display for BudgetProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BudgetProblem::Negative(value) => write!(f, "budget {} is negative", value),
            BudgetProblem::Missing => write!(f, "no budget entry"),
        }
    }
}

/// Search resource that ran out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchLimit {
    Time,
    Steps,
}

impl fmt::Display for SearchLimit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchLimit::Time => f.write_str("time"),
            SearchLimit::Steps => f.write_str("step"),
        }
    }
}

/// A solver stopped before finishing its round
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("search aborted: {limit} limit exceeded")]
pub struct SearchAborted {
    pub limit: SearchLimit,
}

/// Errors returned by a planning run
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanError {
    /// A budget is negative, or a hosted application has no budget.
    #[error("invalid budget for application '{application}': {problem}")]
    InvalidBudget {
        application: String,
        problem: BudgetProblem,
    },

    /// Two machines share an identifier.
    #[error("machine '{machine}' is listed more than once")]
    DuplicateMachine { machine: String },

    /// A placement refers to a machine outside the machine set.
    #[error("placement of '{application}' refers to unknown machine '{machine}'")]
    UnknownMachine {
        machine: String,
        application: String,
    },

    /// Remaining machines can never be scheduled.
    #[error(
        "round {round}: no machine can be upgraded; '{machine}' hosts '{application}' whose budget is 0"
    )]
    InfeasibleInput {
        machine: String,
        application: String,
        round: usize,
    },

    /// The caller's time or step budget ran out.
    #[error("round {round}: {limit} limit exceeded after {} finalized batches", .partial.batches.len())]
    DeadlineExceeded {
        limit: SearchLimit,
        round: usize,
        partial: Box<Plan>,
    },
}

impl PlanError {
    /// Returns true if the snapshot itself was rejected before searching
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            PlanError::InvalidBudget { .. }
                | PlanError::DuplicateMachine { .. }
                | PlanError::UnknownMachine { .. }
        )
    }

    /// Short machine-readable kind
    pub fn kind(&self) -> &'static str {
        match self {
            PlanError::InvalidBudget { .. } => "invalid_budget",
            PlanError::DuplicateMachine { .. } => "duplicate_machine",
            PlanError::UnknownMachine { .. } => "unknown_machine",
            PlanError::InfeasibleInput { .. } => "infeasible_input",
            PlanError::DeadlineExceeded { .. } => "deadline_exceeded",
        }
    }

    /// Rounds finalized before the run was aborted
    pub fn partial_plan(&self) -> Option<&Plan> {
        match self {
            PlanError::DeadlineExceeded { partial, .. } => Some(partial.as_ref()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Batch;

    #[test]
    fn test_invalid_budget_message() {
        let err = PlanError::InvalidBudget {
            application: "app1".into(),
            problem: BudgetProblem::Negative(-2),
        };
        assert_eq!(
            err.to_string(),
            "invalid budget for application 'app1': budget -2 is negative"
        );
        assert!(err.is_input_error());
        assert_eq!(err.kind(), "invalid_budget");
    }

    #[test]
    fn test_deadline_exceeded_carries_partial_plan() {
        let partial = Plan {
            batches: vec![Batch {
                index: 1,
                machines: vec!["n1".into()],
            }],
            complete: false,
        };
        let err = PlanError::DeadlineExceeded {
            limit: SearchLimit::Steps,
            round: 2,
            partial: Box::new(partial.clone()),
        };

        assert_eq!(err.partial_plan(), Some(&partial));
        assert!(!err.is_input_error());
        assert!(err.to_string().contains("step limit exceeded"));
    }

    #[test]
    fn test_infeasible_has_no_partial_plan() {
        let err = PlanError::InfeasibleInput {
            machine: "n1".into(),
            application: "db".into(),
            round: 1,
        };
        assert!(err.partial_plan().is_none());
        assert!(err.to_string().contains("'db' whose budget is 0"));
    }
}
