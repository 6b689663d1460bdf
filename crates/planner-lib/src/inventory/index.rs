//! Validated, integer-indexed view of a cluster snapshot
//!
//! Solvers never touch names: machines keep their input position as index,
//! hosted applications are numbered by sorted name so every residual budget
//! vector has one canonical layout.

use crate::error::{BudgetProblem, PlanError};
use crate::models::ClusterSnapshot;
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

/// Fleet snapshot after validation
#[derive(Debug, Clone)]
pub struct FleetIndex {
    machines: Vec<String>,
    applications: Vec<String>,
    budgets: Vec<u32>,
    hosted: Vec<Vec<usize>>,
}

impl FleetIndex {
    /// Validate a snapshot and build its index
    ///
    /// Fails on duplicate machine names, placements on unknown machines,
    /// negative budgets and hosted applications without a budget.
    pub fn build(snapshot: &ClusterSnapshot) -> Result<Self, PlanError> {
        let mut positions: HashMap<&str, usize> = HashMap::with_capacity(snapshot.machines.len());
        for (i, machine) in snapshot.machines.iter().enumerate() {
            if positions.insert(machine.name.as_str(), i).is_some() {
                return Err(PlanError::DuplicateMachine {
                    machine: machine.name.clone(),
                });
            }
        }

        for (application, &value) in &snapshot.budgets {
            if value < 0 {
                return Err(PlanError::InvalidBudget {
                    application: application.clone(),
                    problem: BudgetProblem::Negative(value),
                });
            }
        }

        let mut pairs: BTreeSet<(usize, &str)> = BTreeSet::new();
        for placement in &snapshot.placements {
            let Some(&machine) = positions.get(placement.machine.as_str()) else {
                return Err(PlanError::UnknownMachine {
                    machine: placement.machine.clone(),
                    application: placement.application.clone(),
                });
            };
            if !snapshot.budgets.contains_key(&placement.application) {
                return Err(PlanError::InvalidBudget {
                    application: placement.application.clone(),
                    problem: BudgetProblem::Missing,
                });
            }
            pairs.insert((machine, placement.application.as_str()));
        }

        // hosts per application, keyed by name so indices follow name order
        let mut hosts: BTreeMap<&str, usize> = BTreeMap::new();
        for &(_, application) in &pairs {
            *hosts.entry(application).or_default() += 1;
        }

        let lookup: HashMap<&str, usize> = hosts
            .keys()
            .enumerate()
            .map(|(i, &name)| (name, i))
            .collect();

        let applications: Vec<String> = hosts.keys().map(|name| name.to_string()).collect();
        let budgets: Vec<u32> = hosts
            .iter()
            .map(|(&name, &count)| {
                let value = snapshot.budgets.get(name).copied().unwrap_or(0);
                value.min(count as i64) as u32
            })
            .collect();

        let mut hosted = vec![Vec::new(); snapshot.machines.len()];
        for &(machine, application) in &pairs {
            hosted[machine].push(lookup[application]);
        }
        for apps in &mut hosted {
            apps.sort_unstable();
        }

        Ok(Self {
            machines: snapshot.machines.iter().map(|m| m.name.clone()).collect(),
            applications,
            budgets,
            hosted,
        })
    }

    pub fn machine_count(&self) -> usize {
        self.machines.len()
    }

    /// Number of applications hosted on at least one machine
    pub fn application_count(&self) -> usize {
        self.applications.len()
    }

    pub fn machine_name(&self, machine: usize) -> &str {
        &self.machines[machine]
    }

    pub fn application_name(&self, application: usize) -> &str {
        &self.applications[application]
    }

    /// Sorted application indices hosted on a machine
    pub fn applications_of(&self, machine: usize) -> &[usize] {
        &self.hosted[machine]
    }

    /// Budget per application index, clamped to its host count
    pub fn budgets(&self) -> &[u32] {
        &self.budgets
    }

    /// Position of a machine in the input order
    pub fn position(&self, name: &str) -> Option<usize> {
        self.machines.iter().position(|m| m == name)
    }

    /// Whether a machine can be taken with the given residual budgets
    pub fn fits(&self, machine: usize, residual: &[u32]) -> bool {
        self.hosted[machine].iter().all(|&a| residual[a] >= 1)
    }

    /// First hosted application whose budget is zero
    pub fn blocking_application(&self, machine: usize, budgets: &[u32]) -> Option<usize> {
        self.hosted[machine].iter().copied().find(|&a| budgets[a] == 0)
    }

    /// Count of machines in `subset` hosting each application
    pub fn load(&self, subset: &[usize]) -> Vec<u32> {
        let mut load = vec![0u32; self.applications.len()];
        for &machine in subset {
            for &a in &self.hosted[machine] {
                load[a] += 1;
            }
        }
        load
    }

    /// Check that a subset respects every budget and holds no duplicates
    pub fn is_feasible(&self, subset: &[usize], budgets: &[u32]) -> bool {
        let unique: HashSet<usize> = subset.iter().copied().collect();
        unique.len() == subset.len()
            && self
                .load(subset)
                .iter()
                .zip(budgets)
                .all(|(used, allowed)| used <= allowed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Machine, Placement};

    fn snapshot(
        machines: &[&str],
        placements: &[(&str, &str)],
        budgets: &[(&str, i64)],
    ) -> ClusterSnapshot {
        ClusterSnapshot {
            machines: machines.iter().map(|m| Machine::new(*m)).collect(),
            placements: placements
                .iter()
                .map(|(m, a)| Placement::new(*m, *a))
                .collect(),
            budgets: budgets.iter().map(|(a, b)| (a.to_string(), *b)).collect(),
        }
    }

    #[test]
    fn test_applications_indexed_by_name() {
        let index = FleetIndex::build(&snapshot(
            &["n1", "n2"],
            &[("n1", "web"), ("n2", "api"), ("n1", "api")],
            &[("web", 1), ("api", 2)],
        ))
        .unwrap();

        assert_eq!(index.application_count(), 2);
        assert_eq!(index.application_name(0), "api");
        assert_eq!(index.application_name(1), "web");
        assert_eq!(index.applications_of(0), &[0, 1]);
        assert_eq!(index.applications_of(1), &[0]);
        assert_eq!(index.budgets(), &[2, 1]);
    }

    #[test]
    fn test_duplicate_placements_collapse() {
        let index = FleetIndex::build(&snapshot(
            &["n1"],
            &[("n1", "web"), ("n1", "web")],
            &[("web", 5)],
        ))
        .unwrap();

        assert_eq!(index.applications_of(0), &[0]);
        // one host, so the budget can never exceed 1
        assert_eq!(index.budgets(), &[1]);
    }

    #[test]
    fn test_unhosted_budget_entries_ignored() {
        let index = FleetIndex::build(&snapshot(&["n1"], &[], &[("idle", 0)])).unwrap();

        assert_eq!(index.application_count(), 0);
        assert!(index.applications_of(0).is_empty());
        assert!(index.fits(0, index.budgets()));
    }

    #[test]
    fn test_duplicate_machine_rejected() {
        let err = FleetIndex::build(&snapshot(&["n1", "n1"], &[], &[])).unwrap_err();
        assert_eq!(
            err,
            PlanError::DuplicateMachine {
                machine: "n1".into()
            }
        );
    }

    #[test]
    fn test_negative_budget_rejected() {
        let err = FleetIndex::build(&snapshot(&["n1"], &[], &[("web", -1)])).unwrap_err();
        assert_eq!(
            err,
            PlanError::InvalidBudget {
                application: "web".into(),
                problem: BudgetProblem::Negative(-1),
            }
        );
    }

    #[test]
    fn test_missing_budget_rejected() {
        let err = FleetIndex::build(&snapshot(&["n1"], &[("n1", "web")], &[])).unwrap_err();
        assert_eq!(
            err,
            PlanError::InvalidBudget {
                application: "web".into(),
                problem: BudgetProblem::Missing,
            }
        );
    }

    #[test]
    fn test_unknown_machine_rejected() {
        let err =
            FleetIndex::build(&snapshot(&["n1"], &[("n9", "web")], &[("web", 1)])).unwrap_err();
        assert!(matches!(err, PlanError::UnknownMachine { machine, .. } if machine == "n9"));
    }

    #[test]
    fn test_feasibility_helpers() {
        let index = FleetIndex::build(&snapshot(
            &["n1", "n2", "n3"],
            &[("n1", "web"), ("n2", "web"), ("n3", "db")],
            &[("web", 1), ("db", 0)],
        ))
        .unwrap();
        let budgets = index.budgets().to_vec();

        assert!(index.is_feasible(&[0], &budgets));
        assert!(!index.is_feasible(&[0, 1], &budgets));
        assert!(!index.is_feasible(&[0, 0], &budgets));
        assert_eq!(index.blocking_application(2, &budgets), Some(0));
        assert_eq!(index.application_name(0), "db");
        assert_eq!(index.position("n3"), Some(2));
    }
}
