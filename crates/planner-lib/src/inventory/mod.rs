//! Fleet inventory: snapshot sources and the validated fleet index
//!
//! A planning run consumes one static [`ClusterSnapshot`]. Sources produce
//! snapshots from files, built-in testcases or random generation; the CLI adds
//! a Kubernetes-backed source on top of the same trait.

mod fixtures;
mod index;
mod random;


pub use fixtures::{fixture, fixtures, Fixture};
pub use index::FleetIndex;
pub use random::RandomFleet;

use crate::models::ClusterSnapshot;
use anyhow::{Context, Result};
use std::path::PathBuf;

pub use async_trait::async_trait;

/// Trait for snapshot providers
#[async_trait]
pub trait SnapshotSource: Send + Sync {
    /// Load the fleet snapshot for one planning run
    async fn load(&self) -> Result<ClusterSnapshot>;

    /// Human-readable origin of the snapshot
    fn describe(&self) -> String;
}

/// Snapshot from a built-in testcase
pub struct FixtureSource {
    index: usize,
}

impl FixtureSource {
    pub fn new(index: usize) -> Self {
        Self { index }
    }
}

#[async_trait]
impl SnapshotSource for FixtureSource {
    async fn load(&self) -> Result<ClusterSnapshot> {
        match fixture(self.index) {
            Some(f) => Ok(f.snapshot),
            None => anyhow::bail!(
                "undefined testcase: {} (valid: 0..={})",
                self.index,
                fixtures().len() - 1
            ),
        }
    }

    fn describe(&self) -> String {
        match fixture(self.index) {
            Some(f) => format!("testcase {} ({})", self.index, f.name),
            None => format!("testcase {}", self.index),
        }
    }
}

/// Snapshot from the random fleet generator
pub struct RandomSource {
    fleet: RandomFleet,
}

impl RandomSource {
    pub fn new(machines: usize, applications: usize, seed: u64) -> Self {
        Self {
            fleet: RandomFleet::new(machines, applications, seed),
        }
    }
}

#[async_trait]
impl SnapshotSource for RandomSource {
    async fn load(&self) -> Result<ClusterSnapshot> {
        Ok(self.fleet.generate())
    }

    fn describe(&self) -> String {
        format!(
            "random fleet ({} machines, {} applications, seed {})",
            self.fleet.machines, self.fleet.applications, self.fleet.seed
        )
    }
}

/// Snapshot from a JSON document on disk
pub struct FileSource {
    path: PathBuf,
}

impl FileSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl SnapshotSource for FileSource {
    async fn load(&self) -> Result<ClusterSnapshot> {
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read snapshot {}", self.path.display()))?;

        serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse snapshot {}", self.path.display()))
    }

    fn describe(&self) -> String {
        format!("file {}", self.path.display())
    }
}
