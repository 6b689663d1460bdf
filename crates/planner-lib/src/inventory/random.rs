//! Random fleet generation for load and property testing
//!
//! Each application targets a random share of the fleet and receives a budget
//! between 1 and the number of machines it actually landed on, so generated
//! snapshots are always schedulable.

use crate::models::{ClusterSnapshot, Machine, Placement};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fleets at or above this size cap the expected hosts per application
const LARGE_FLEET: usize = 200;

/// Applications on at least this many machines cap their budget draw
const LARGE_APPLICATION: usize = 100;

/// Reproducible random fleet generator
#[derive(Debug, Clone)]
pub struct RandomFleet {
    pub machines: usize,
    pub applications: usize,
    pub seed: u64,
}

impl RandomFleet {
    pub fn new(machines: usize, applications: usize, seed: u64) -> Self {
        Self {
            machines,
            applications,
            seed,
        }
    }

    /// Generate the snapshot for this seed
    pub fn generate(&self) -> ClusterSnapshot {
        let mut rng = StdRng::seed_from_u64(self.seed);
        let machines: Vec<Machine> = (1..=self.machines)
            .map(|i| Machine::new(format!("n{}", i)))
            .collect();

        let mut snapshot = ClusterSnapshot {
            machines,
            ..Default::default()
        };
        if self.machines == 0 {
            return snapshot;
        }

        for app in 1..=self.applications {
            let name = format!("app{}", app);
            let expected = if self.machines < LARGE_FLEET {
                rng.random_range(0..self.machines)
            } else {
                rng.random_range(0..LARGE_FLEET)
            };

            let mut hosts = 0usize;
            for machine in 1..=self.machines {
                if rng.random_range(0..self.machines) < expected {
                    snapshot
                        .placements
                        .push(Placement::new(format!("n{}", machine), name.clone()));
                    hosts += 1;
                }
            }

            if hosts > 0 {
                let budget = if hosts < LARGE_APPLICATION {
                    rng.random_range(0..hosts) + 1
                } else {
                    rng.random_range(0..LARGE_APPLICATION) + 1
                };
                snapshot.budgets.insert(name, budget as i64);
            }
        }

        snapshot
    }
}
