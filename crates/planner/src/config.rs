//! Service configuration

use anyhow::Result;
use planner_lib::planner::PlannerConfig;
use planner_lib::solver::{SearchLimits, SolverKind};
use serde::Deserialize;

/// Service configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// API server port for planning, health and metrics
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Batch solver used when a request does not name one
    #[serde(default)]
    pub solver: SolverKind,

    /// Wall-clock budget per planning run in milliseconds
    #[serde(default = "default_deadline_ms")]
    pub deadline_ms: u64,

    /// Search steps allowed per round
    #[serde(default)]
    pub max_steps: Option<u64>,

    /// Search top-level branches concurrently
    #[serde(default)]
    pub parallel: bool,
}

fn default_api_port() -> u16 {
    8080
}

fn default_deadline_ms() -> u64 {
    30_000
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            solver: SolverKind::default(),
            deadline_ms: default_deadline_ms(),
            max_steps: None,
            parallel: false,
        }
    }
}

impl ServiceConfig {
    /// Load configuration from `PLANNER_*` environment variables
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::Environment::with_prefix("PLANNER").try_parsing(true))
            .build()?;

        Ok(config.try_deserialize()?)
    }

    /// Planner defaults applied to requests without overrides
    pub fn planner(&self) -> PlannerConfig {
        PlannerConfig {
            solver: self.solver,
            limits: SearchLimits {
                deadline_ms: Some(self.deadline_ms),
                max_steps: self.max_steps,
            },
            parallel: self.parallel,
        }
    }
}
