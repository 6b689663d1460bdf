//! Greedy first-fit batch selection
//!
//! Orders remaining machines by ascending pressure, the sum of `1 / budget`
//! over the applications they host, and takes each machine that still fits.
//! Runs in `O(n log n + placements)` with no optimality guarantee. A machine
//! that fits the full budgets on its own is always taken when it is reached
//! first, so a round never comes back empty while such a machine remains.

use super::context::SearchContext;
use super::BatchSolver;
use crate::error::SearchAborted;
use crate::inventory::FleetIndex;

#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySolver;

impl GreedySolver {
    pub fn new() -> Self {
        Self
    }

    fn pressure(fleet: &FleetIndex, machine: usize, budgets: &[u32]) -> f64 {
        fleet
            .applications_of(machine)
            .iter()
            .map(|&a| match budgets[a] {
                0 => f64::INFINITY,
                b => 1.0 / b as f64,
            })
            .sum()
    }
}

impl BatchSolver for GreedySolver {
    fn name(&self) -> &'static str {
        "greedy"
    }

    fn select_batch(
        &self,
        fleet: &FleetIndex,
        remaining: &[usize],
        budgets: &[u32],
        ctx: &mut SearchContext,
    ) -> Result<Vec<usize>, SearchAborted> {
        let mut candidates: Vec<(f64, usize)> = remaining
            .iter()
            .enumerate()
            .map(|(position, &machine)| (Self::pressure(fleet, machine, budgets), position))
            .collect();
        candidates.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));

        let mut residual = budgets.to_vec();
        let mut taken = Vec::new();
        for (_, position) in candidates {
            ctx.tick()?;
            let machine = remaining[position];
            if fleet.fits(machine, &residual) {
                for &a in fleet.applications_of(machine) {
                    residual[a] -= 1;
                }
                taken.push(position);
            }
        }

        taken.sort_unstable();
        Ok(taken.into_iter().map(|position| remaining[position]).collect())
    }
}
