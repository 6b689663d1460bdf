//! Core data models for the upgrade planner

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

/// A schedulable host that is upgraded as one unit
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Machine {
    pub name: String,
}

impl Machine {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// An application instance living on a machine
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Placement {
    pub machine: String,
    pub application: String,
}

impl Placement {
    pub fn new(machine: impl Into<String>, application: impl Into<String>) -> Self {
        Self {
            machine: machine.into(),
            application: application.into(),
        }
    }
}

/// Static fleet snapshot consumed by one planning run
///
/// Budgets are signed so that a negative value reaches validation and is
/// reported instead of failing deserialization.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSnapshot {
    pub machines: Vec<Machine>,
    #[serde(default)]
    pub placements: Vec<Placement>,
    #[serde(default)]
    pub budgets: BTreeMap<String, i64>,
}

impl ClusterSnapshot {
    /// Applications hosted on a machine, sorted and deduplicated
    pub fn applications_on(&self, machine: &str) -> Vec<&str> {
        let mut apps: Vec<&str> = self
            .placements
            .iter()
            .filter(|p| p.machine == machine)
            .map(|p| p.application.as_str())
            .collect();
        apps.sort_unstable();
        apps.dedup();
        apps
    }

    /// Copy of this snapshot restricted to the named machines
    pub fn without_machines(&self, removed: &[String]) -> Self {
        let keep = |name: &String| !removed.contains(name);
        Self {
            machines: self
                .machines
                .iter()
                .filter(|m| keep(&m.name))
                .cloned()
                .collect(),
            placements: self
                .placements
                .iter()
                .filter(|p| keep(&p.machine))
                .cloned()
                .collect(),
            budgets: self.budgets.clone(),
        }
    }
}

/// Machines upgraded together in one maintenance window
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Batch {
    /// 1-based round number
    pub index: usize,
    pub machines: Vec<String>,
}

/// Ordered sequence of batches covering the fleet
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
    pub batches: Vec<Batch>,
    /// False only for the partial plan of an aborted run
    pub complete: bool,
}

impl Plan {
    /// Total machines scheduled across all batches
    pub fn machine_count(&self) -> usize {
        self.batches.iter().map(|b| b.machines.len()).sum()
    }

    /// Hex SHA-256 over the canonical JSON of the batches
    pub fn fingerprint(&self) -> String {
        let canonical = serde_json::to_vec(&self.batches).unwrap_or_default();
        hex::encode(Sha256::digest(&canonical))
    }

    /// Batches as plain name lists
    pub fn into_names(self) -> Vec<Vec<String>> {
        self.batches.into_iter().map(|b| b.machines).collect()
    }
}

/// Search counters for a planning run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanStats {
    pub solver: String,
    pub rounds: usize,
    pub search_steps: u64,
    pub memo_hits: u64,
    pub memo_entries: u64,
    pub elapsed_ms: u64,
}

/// Plan plus the run that produced it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanReport {
    pub plan: Plan,
    pub stats: PlanStats,
    pub generated_at: i64,
}
