//! Exact maximum-batch search
//!
//! Decides machines in input order. At each machine the search first explores
//! leaving it out, then taking it when every application it hosts still has
//! residual budget. Taking it wins only with a strictly larger batch, so among
//! equally large batches the one leaving earlier machines out is returned.
//!
//! States are `(suffix index, residual budgets)`. Before a state is used the
//! residual of every application is clamped to the number of machines in the
//! suffix that still host it: a residual at or above that count can never
//! reject a machine, so clamped states share one memo entry. The number of
//! distinct states is bounded by `n * prod(budget(a) + 1)` over the
//! applications present in a suffix. That stays small while budgets are small
//! or applications are few, and grows exponentially with the number of
//! distinct applications carrying large budgets; use the greedy solver for
//! fleets beyond that envelope.
//!
//! The memo table is released through [`MemoTable::release`] on every exit,
//! including aborts, so freeing a large table does not extend a round past
//! its deadline.

use super::context::SearchContext;
use super::memo::{MemoEntry, MemoTable};
use super::BatchSolver;
use crate::error::SearchAborted;
use crate::inventory::FleetIndex;
use std::thread;

/// Memoized exact solver
#[derive(Debug, Clone, Default)]
pub struct ExactSolver {
    parallel: bool,
}

impl ExactSolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Search the two top-level branches on separate threads
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    fn select_parallel(
        &self,
        suffix: &Suffix<'_>,
        root: Vec<u32>,
        ctx: &mut SearchContext,
    ) -> Result<Vec<usize>, SearchAborted> {
        let excluded_root = suffix.exclude(0, &root);
        let included_root = suffix.include(0, &root);
        let mut include_ctx = ctx.fork();
        let mut exclude_ctx = ctx.fork();

        let include_ctx_ref = &mut include_ctx;
        let (excluded, included) = thread::scope(|scope| {
            let include_branch = included_root.map(move |residual| {
                scope.spawn(move || branch(suffix, residual, include_ctx_ref))
            });
            let excluded = branch(suffix, excluded_root, &mut exclude_ctx);
            let included = include_branch.map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|payload| std::panic::resume_unwind(payload))
            });
            (excluded, included)
        });

        ctx.absorb(&exclude_ctx);
        ctx.absorb(&include_ctx);

        let (excluded_value, excluded_selection) = excluded?;
        match included.transpose()? {
            Some((value, selection)) if value + 1 > excluded_value => {
                let mut batch = Vec::with_capacity(selection.len() + 1);
                batch.push(suffix.order[0]);
                batch.extend(selection);
                Ok(batch)
            }
            _ => Ok(excluded_selection),
        }
    }
}

impl BatchSolver for ExactSolver {
    fn name(&self) -> &'static str {
        "exact"
    }

    fn select_batch(
        &self,
        fleet: &FleetIndex,
        remaining: &[usize],
        budgets: &[u32],
        ctx: &mut SearchContext,
    ) -> Result<Vec<usize>, SearchAborted> {
        let suffix = Suffix::new(fleet, remaining);
        let root = suffix.canonical(0, budgets.to_vec());

        if self.parallel && !remaining.is_empty() {
            return self.select_parallel(&suffix, root, ctx);
        }

        let mut search = Search::new(&suffix);
        let result = search
            .best(0, root.clone(), ctx)
            .map(|_| search.selection(0, root));
        search.memo.release();
        result
    }
}

/// Solve the suffix starting at index 1 from a branch root
fn branch(
    suffix: &Suffix<'_>,
    residual: Vec<u32>,
    ctx: &mut SearchContext,
) -> Result<(u32, Vec<usize>), SearchAborted> {
    let mut search = Search::new(suffix);
    let result = search
        .best(1, residual.clone(), ctx)
        .map(|value| (value, search.selection(1, residual)));
    search.memo.release();
    result
}

/// Remaining machines of one round with per-suffix host counts
struct Suffix<'a> {
    fleet: &'a FleetIndex,
    order: &'a [usize],
    apps: usize,
    /// `hosts[i * apps + a]`: machines in `order[i..]` hosting `a`
    hosts: Vec<u32>,
}

impl<'a> Suffix<'a> {
    fn new(fleet: &'a FleetIndex, order: &'a [usize]) -> Self {
        let apps = fleet.application_count();
        let mut hosts = vec![0u32; (order.len() + 1) * apps];
        for i in (0..order.len()).rev() {
            let (current, next) = hosts.split_at_mut((i + 1) * apps);
            let current = &mut current[i * apps..];
            current.copy_from_slice(&next[..apps]);
            for &a in fleet.applications_of(order[i]) {
                current[a] += 1;
            }
        }
        Self {
            fleet,
            order,
            apps,
            hosts,
        }
    }

    fn len(&self) -> usize {
        self.order.len()
    }

    fn canonical(&self, index: usize, mut residual: Vec<u32>) -> Vec<u32> {
        let hosts = &self.hosts[index * self.apps..(index + 1) * self.apps];
        for (r, &h) in residual.iter_mut().zip(hosts) {
            *r = (*r).min(h);
        }
        residual
    }

    /// Child state when the machine at `index` is left out
    fn exclude(&self, index: usize, residual: &[u32]) -> Vec<u32> {
        self.canonical(index + 1, residual.to_vec())
    }

    /// Child state when the machine at `index` is taken, if it fits
    fn include(&self, index: usize, residual: &[u32]) -> Option<Vec<u32>> {
        let machine = self.order[index];
        if !self.fleet.fits(machine, residual) {
            return None;
        }
        let mut next = residual.to_vec();
        for &a in self.fleet.applications_of(machine) {
            next[a] -= 1;
        }
        Some(self.canonical(index + 1, next))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Enter,
    Excluded,
    Included,
}

struct Frame {
    index: usize,
    residual: Vec<u32>,
    stage: Stage,
    excluded: u32,
}

impl Frame {
    fn new(index: usize, residual: Vec<u32>) -> Self {
        Self {
            index,
            residual,
            stage: Stage::Enter,
            excluded: 0,
        }
    }
}

struct Search<'s, 'a> {
    suffix: &'s Suffix<'a>,
    memo: MemoTable,
}

impl<'s, 'a> Search<'s, 'a> {
    fn new(suffix: &'s Suffix<'a>) -> Self {
        Self {
            suffix,
            memo: MemoTable::new(suffix.len()),
        }
    }

    /// Most machines selectable from a canonical state
    ///
    /// Iterative depth-first search with an explicit frame stack; every
    /// completed state is recorded in the memo table.
    fn best(
        &mut self,
        start: usize,
        residual: Vec<u32>,
        ctx: &mut SearchContext,
    ) -> Result<u32, SearchAborted> {
        let end = self.suffix.len();
        let mut stack = vec![Frame::new(start, residual)];
        let mut ret = 0u32;

        while let Some(top) = stack.len().checked_sub(1) {
            let index = stack[top].index;
            let stage = stack[top].stage;
            match stage {
                Stage::Enter => {
                    ctx.tick()?;
                    if index == end {
                        ret = 0;
                        stack.pop();
                        continue;
                    }
                    if let Some(entry) = self.memo.get(index, &stack[top].residual) {
                        ctx.record_memo_hit();
                        ret = entry.value;
                        stack.pop();
                        continue;
                    }
                    ctx.trace_state(index, &stack[top].residual);
                    let child = self.suffix.exclude(index, &stack[top].residual);
                    stack[top].stage = Stage::Excluded;
                    stack.push(Frame::new(index + 1, child));
                }
                Stage::Excluded => {
                    let excluded = ret;
                    match self.suffix.include(index, &stack[top].residual) {
                        Some(child) => {
                            stack[top].excluded = excluded;
                            stack[top].stage = Stage::Included;
                            stack.push(Frame::new(index + 1, child));
                        }
                        None => ret = self.settle(&mut stack, excluded, false, ctx),
                    }
                }
                Stage::Included => {
                    let included = ret + 1;
                    let excluded = stack[top].excluded;
                    ret = if included > excluded {
                        self.settle(&mut stack, included, true, ctx)
                    } else {
                        self.settle(&mut stack, excluded, false, ctx)
                    };
                }
            }
        }

        Ok(ret)
    }

    fn settle(
        &mut self,
        stack: &mut Vec<Frame>,
        value: u32,
        include: bool,
        ctx: &mut SearchContext,
    ) -> u32 {
        if let Some(frame) = stack.pop() {
            self.memo.insert(
                frame.index,
                frame.residual.into_boxed_slice(),
                MemoEntry { value, include },
            );
            ctx.record_memo_entry();
        }
        value
    }

    /// Replay recorded decisions from a solved state
    fn selection(&self, start: usize, mut residual: Vec<u32>) -> Vec<usize> {
        let mut picked = Vec::new();
        for index in start..self.suffix.len() {
            let include = self
                .memo
                .get(index, &residual)
                .map(|entry| entry.include)
                .unwrap_or(false);
            residual = match self.suffix.include(index, &residual) {
                Some(next) if include => {
                    picked.push(self.suffix.order[index]);
                    next
                }
                _ => self.suffix.exclude(index, &residual),
            };
        }
        picked
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClusterSnapshot, Machine, Placement};

    fn fleet(
        machines: &[&str],
        placements: &[(&str, &str)],
        budgets: &[(&str, i64)],
    ) -> FleetIndex {
        FleetIndex::build(&ClusterSnapshot {
            machines: machines.iter().map(|m| Machine::new(*m)).collect(),
            placements: placements
                .iter()
                .map(|(m, a)| Placement::new(*m, *a))
                .collect(),
            budgets: budgets.iter().map(|(a, b)| (a.to_string(), *b)).collect(),
        })
        .unwrap()
    }

    fn reference_fleet() -> FleetIndex {
        fleet(
            &["n1", "n2", "n3"],
            &[
                ("n1", "app1"),
                ("n2", "app1"),
                ("n1", "app2"),
                ("n2", "app2"),
                ("n2", "app3"),
                ("n3", "app3"),
            ],
            &[("app1", 1), ("app2", 1), ("app3", 1)],
        )
    }

    fn select(solver: &ExactSolver, fleet: &FleetIndex, remaining: &[usize]) -> Vec<usize> {
        let mut ctx = SearchContext::unbounded(1);
        solver
            .select_batch(fleet, remaining, fleet.budgets(), &mut ctx)
            .unwrap()
    }

    #[test]
    fn test_reference_first_round() {
        let fleet = reference_fleet();
        assert_eq!(select(&ExactSolver::new(), &fleet, &[0, 1, 2]), vec![0, 2]);
        assert_eq!(select(&ExactSolver::new(), &fleet, &[1]), vec![1]);
    }

    #[test]
    fn test_ties_prefer_leaving_earlier_machines_out() {
        // n1 and n2 conflict on web; either alone gives a batch of one
        let fleet = fleet(
            &["n1", "n2"],
            &[("n1", "web"), ("n2", "web")],
            &[("web", 1)],
        );
        assert_eq!(select(&ExactSolver::new(), &fleet, &[0, 1]), vec![1]);
    }

    #[test]
    fn test_unconstrained_machines_all_selected() {
        let fleet = fleet(&["a", "b", "c", "d"], &[], &[]);
        assert_eq!(select(&ExactSolver::new(), &fleet, &[0, 1, 2, 3]), vec![0, 1, 2, 3]);
    }

    #[test]
    fn test_zero_budget_machine_never_selected() {
        let fleet = fleet(
            &["n1", "n2"],
            &[("n1", "db"), ("n2", "web")],
            &[("db", 0), ("web", 1)],
        );
        assert_eq!(select(&ExactSolver::new(), &fleet, &[0, 1]), vec![1]);
        assert!(select(&ExactSolver::new(), &fleet, &[0]).is_empty());
    }

    #[test]
    fn test_empty_remaining() {
        let fleet = reference_fleet();
        assert!(select(&ExactSolver::new(), &fleet, &[]).is_empty());
        assert!(select(&ExactSolver::new().parallel(true), &fleet, &[]).is_empty());
    }

    #[test]
    fn test_parallel_matches_sequential() {
        let fleet = fleet(
            &["n1", "n2", "n3", "n4", "n5", "n6"],
            &[
                ("n1", "web"),
                ("n2", "web"),
                ("n3", "web"),
                ("n2", "db"),
                ("n4", "db"),
                ("n5", "cache"),
                ("n6", "cache"),
                ("n6", "web"),
            ],
            &[("web", 2), ("db", 1), ("cache", 1)],
        );
        let remaining: Vec<usize> = (0..6).collect();

        let sequential = select(&ExactSolver::new(), &fleet, &remaining);
        let parallel = select(&ExactSolver::new().parallel(true), &fleet, &remaining);
        assert_eq!(sequential, parallel);
        assert!(fleet.is_feasible(&sequential, fleet.budgets()));
    }

    #[test]
    fn test_memo_collapses_unconstrained_suffix() {
        // 200 independent machines: without memoization 2^200 states
        let names: Vec<String> = (0..200).map(|i| format!("n{}", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let fleet = fleet(&refs, &[], &[]);
        let remaining: Vec<usize> = (0..200).collect();

        let mut ctx = SearchContext::unbounded(1);
        let batch = ExactSolver::new()
            .select_batch(&fleet, &remaining, fleet.budgets(), &mut ctx)
            .unwrap();

        assert_eq!(batch.len(), 200);
        assert!(ctx.steps() < 1_000);
        assert!(ctx.memo_hits() > 0);
    }

    #[test]
    fn test_clamping_shares_states_across_budgets() {
        // budget 50 on an application hosted by 3 machines behaves like budget 3
        let fleet_large = fleet(
            &["n1", "n2", "n3"],
            &[("n1", "web"), ("n2", "web"), ("n3", "web")],
            &[("web", 50)],
        );
        assert_eq!(fleet_large.budgets(), &[3]);
        assert_eq!(select(&ExactSolver::new(), &fleet_large, &[0, 1, 2]), vec![0, 1, 2]);
    }

    #[test]
    fn test_step_limit_aborts() {
        let fleet = reference_fleet();
        let mut ctx = SearchContext::new(
            1,
            std::time::Instant::now(),
            crate::solver::SearchLimits::default().with_max_steps(1),
        );
        let err = ExactSolver::new()
            .select_batch(&fleet, &[0, 1, 2], fleet.budgets(), &mut ctx)
            .unwrap_err();
        assert_eq!(err.limit, crate::error::SearchLimit::Steps);
    }

    #[test]
    fn test_abort_after_large_memo_returns_limit() {
        // overlapping applications keep many residual vectors distinct
        let names: Vec<String> = (0..64).map(|i| format!("n{}", i)).collect();
        let apps: Vec<String> = (0..8).map(|a| format!("app{}", a)).collect();
        let placements: Vec<(&str, &str)> = (0..64)
            .flat_map(|i| {
                [
                    (names[i].as_str(), apps[i % 8].as_str()),
                    (names[i].as_str(), apps[(i / 8 + i) % 8].as_str()),
                ]
            })
            .collect();
        let budgets: Vec<(&str, i64)> = apps.iter().map(|a| (a.as_str(), 4)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let fleet = fleet(&refs, &placements, &budgets);
        let remaining: Vec<usize> = (0..64).collect();

        for solver in [ExactSolver::new(), ExactSolver::new().parallel(true)] {
            let mut ctx = SearchContext::new(
                1,
                std::time::Instant::now(),
                crate::solver::SearchLimits::default().with_max_steps(100_000),
            );
            let result = solver.select_batch(&fleet, &remaining, fleet.budgets(), &mut ctx);

            match result {
                Err(err) => assert_eq!(err.limit, crate::error::SearchLimit::Steps),
                Ok(batch) => assert!(fleet.is_feasible(&batch, fleet.budgets())),
            }
            assert!(ctx.memo_entries() > 0);
        }
    }
}
