//! Built-in fleet testcases

use crate::models::{ClusterSnapshot, Machine, Placement};

/// A named testcase shipped with the planner
#[derive(Debug, Clone)]
pub struct Fixture {
    pub name: &'static str,
    pub description: &'static str,
    pub snapshot: ClusterSnapshot,
}

fn build(machines: &[&str], placements: &[(&str, &str)], budgets: &[(&str, i64)]) -> ClusterSnapshot {
    ClusterSnapshot {
        machines: machines.iter().map(|m| Machine::new(*m)).collect(),
        placements: placements
            .iter()
            .map(|(m, a)| Placement::new(*m, *a))
            .collect(),
        budgets: budgets.iter().map(|(a, b)| (a.to_string(), *b)).collect(),
    }
}

/// All built-in testcases, in index order
pub fn fixtures() -> Vec<Fixture> {
    vec![
        Fixture {
            name: "shared-apps",
            description: "three machines, three applications, every budget 1",
            snapshot: build(
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
            ),
        },
        Fixture {
            name: "single-machine",
            description: "one machine hosting one application with budget 1",
            snapshot: build(&["n1"], &[("n1", "app1")], &[("app1", 1)]),
        },
        Fixture {
            name: "zero-budget",
            description: "one machine hosting an application that allows no disruption",
            snapshot: build(&["n1"], &[("n1", "app1")], &[("app1", 0)]),
        },
    ]
}

/// Look up a testcase by index
pub fn fixture(index: usize) -> Option<Fixture> {
    fixtures().into_iter().nth(index)
}
