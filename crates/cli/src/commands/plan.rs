//! Upgrade planning command

use anyhow::{Context, Result};
use colored::Colorize;
use planner_lib::inventory::SnapshotSource;
use planner_lib::planner::{PlannerConfig, RoundPlanner};
use planner_lib::{ClusterSnapshot, Plan, PlanError};
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use tabled::Tabled;

use crate::output::{
    color_budget, format_duration, print_heading, print_info, print_success, print_table,
    print_warning, OutputFormat,
};

/// Fleets larger than this are summarized instead of tabulated
const FLEET_TABLE_LIMIT: usize = 50;

/// Row for the fleet table
#[derive(Tabled)]
struct MachineRow {
    #[tabled(rename = "Machine")]
    machine: String,
    #[tabled(rename = "Applications")]
    applications: String,
}

/// Row for the budgets table
#[derive(Tabled)]
struct BudgetRow {
    #[tabled(rename = "Application")]
    application: String,
    #[tabled(rename = "Budget")]
    budget: String,
    #[tabled(rename = "Hosts")]
    hosts: usize,
}

/// Row for the plan table
#[derive(Tabled)]
struct BatchRow {
    #[tabled(rename = "Batch")]
    batch: usize,
    #[tabled(rename = "Size")]
    size: usize,
    #[tabled(rename = "Machines")]
    machines: String,
}

/// JSON body printed for a failed run
#[derive(Serialize)]
struct ErrorReport<'a> {
    error: &'a str,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    partial_plan: Option<&'a Plan>,
}

/// Load a snapshot from `source`, plan it and print the result
pub async fn run_plan(
    source: &dyn SnapshotSource,
    config: PlannerConfig,
    format: OutputFormat,
) -> Result<()> {
    let snapshot = source
        .load()
        .await
        .with_context(|| format!("Failed to load {}", source.describe()))?;

    if let OutputFormat::Table = format {
        print_heading("Rolling Upgrade Plan");
        println!("{}", "=".repeat(60));
        print_info(&format!("Source: {}", source.describe().cyan()));
        println!();
        show_fleet(&snapshot);
    }

    let planned = snapshot.clone();
    let result = tokio::task::spawn_blocking(move || RoundPlanner::new(config).run(&planned))
        .await
        .context("Planning task failed")?;

    match format {
        OutputFormat::Json => match result {
            Ok(report) => {
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(())
            }
            Err(err) => {
                let body = ErrorReport {
                    error: err.kind(),
                    message: err.to_string(),
                    partial_plan: err.partial_plan(),
                };
                println!("{}", serde_json::to_string_pretty(&body)?);
                Err(err.into())
            }
        },
        OutputFormat::Table => match result {
            Ok(report) => {
                print_heading("Plan");
                show_plan(&report.plan);
                println!();
                println!(
                    "Time spent:   {}",
                    format_duration(report.stats.elapsed_ms).cyan()
                );
                println!(
                    "Search:       {} steps, {} memo hits ({} solver)",
                    report.stats.search_steps, report.stats.memo_hits, report.stats.solver
                );
                println!("Fingerprint:  {}", report.plan.fingerprint().dimmed());
                println!();
                print_success(&format!(
                    "{} machines in {} batches",
                    report.plan.machine_count(),
                    report.plan.batches.len()
                ));
                Ok(())
            }
            Err(err) => {
                if let PlanError::DeadlineExceeded { partial, .. } = &err {
                    print_warning("Search limit reached; batches finalized so far:");
                    show_plan(partial);
                }
                Err(err.into())
            }
        },
    }
}

fn show_fleet(snapshot: &ClusterSnapshot) {
    if snapshot.machines.len() > FLEET_TABLE_LIMIT {
        print_info(&format!(
            "Fleet: {} machines, {} budgets (tables omitted)",
            snapshot.machines.len(),
            snapshot.budgets.len()
        ));
        println!();
        return;
    }

    print_heading("Fleet");
    let machines: Vec<MachineRow> = snapshot
        .machines
        .iter()
        .map(|m| MachineRow {
            machine: m.name.clone(),
            applications: snapshot.applications_on(&m.name).join(", "),
        })
        .collect();
    print_table(&machines, "No machines");
    println!();

    let mut hosts: BTreeMap<&str, BTreeSet<&str>> = BTreeMap::new();
    for placement in &snapshot.placements {
        hosts
            .entry(placement.application.as_str())
            .or_default()
            .insert(placement.machine.as_str());
    }

    print_heading("Budgets");
    let budgets: Vec<BudgetRow> = snapshot
        .budgets
        .iter()
        .map(|(application, budget)| BudgetRow {
            application: application.clone(),
            budget: color_budget(*budget),
            hosts: hosts.get(application.as_str()).map_or(0, BTreeSet::len),
        })
        .collect();
    print_table(&budgets, "No budgets");
    println!();
}

fn show_plan(plan: &Plan) {
    let rows: Vec<BatchRow> = plan
        .batches
        .iter()
        .map(|b| BatchRow {
            batch: b.index,
            size: b.machines.len(),
            machines: b.machines.join(", "),
        })
        .collect();
    print_table(&rows, "No batches");
}
