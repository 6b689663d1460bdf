//! Configuration management for the CLI

use crate::output::OutputFormat;
use anyhow::{Context, Result};
use planner_lib::solver::SolverKind;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// User defaults, overridden by command-line flags
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Default batch solver
    #[serde(default)]
    pub solver: Option<SolverKind>,
    /// Default wall-clock budget in milliseconds
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    /// Default output format
    #[serde(default)]
    pub format: Option<OutputFormat>,
}

impl Config {
    /// Load configuration from the user config file, if present
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::config_path()?)
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// Get the configuration file path
    fn config_path() -> Result<PathBuf> {
        let home = dirs_next::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("rup").join("config.json"))
    }
}
