//! Snapshot source backed by a live Kubernetes cluster
//!
//! Nodes become machines and PodDisruptionBudgets become applications. A
//! budget's `disruptionsAllowed` is the number of its hosts that may be down
//! at once, and a node hosts the budget when a running pod on it matches the
//! budget's selector.
//!
//! Placements are per node, not per pod: several matching pods on one node
//! count as a single disruption against the budget. Kubernetes counts
//! `disruptionsAllowed` in pods, so draining such a node can use more of the
//! live budget than the plan accounts for.

use anyhow::{Context, Result};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use k8s_openapi::api::policy::v1::PodDisruptionBudget;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};
use kube::api::{Api, ListParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::Client;
use planner_lib::inventory::SnapshotSource;
use planner_lib::{ClusterSnapshot, Machine, Placement};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Pod phases that no longer occupy their node
const TERMINAL_PHASES: &[&str] = &["Succeeded", "Failed"];

/// Snapshot from the cluster in the current (or given) kubeconfig context
pub struct KubeSource {
    kubeconfig: Option<PathBuf>,
    namespace: Option<String>,
}

impl KubeSource {
    pub fn new(kubeconfig: Option<PathBuf>, namespace: Option<String>) -> Self {
        Self {
            kubeconfig,
            namespace,
        }
    }

    async fn client(&self) -> Result<Client> {
        match &self.kubeconfig {
            Some(path) => {
                let kubeconfig = Kubeconfig::read_from(path)
                    .with_context(|| format!("Failed to read kubeconfig {}", path.display()))?;
                let config =
                    kube::Config::from_custom_kubeconfig(kubeconfig, &KubeConfigOptions::default())
                        .await
                        .context("Failed to load kubeconfig")?;
                Client::try_from(config).context("Failed to create Kubernetes client")
            }
            None => Client::try_default()
                .await
                .context("Failed to create Kubernetes client"),
        }
    }

    fn scoped<K>(&self, client: Client) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        match &self.namespace {
            Some(namespace) => Api::namespaced(client, namespace),
            None => Api::all(client),
        }
    }
}

#[async_trait]
impl SnapshotSource for KubeSource {
    async fn load(&self) -> Result<ClusterSnapshot> {
        let client = self.client().await?;
        let params = ListParams::default();

        let nodes = Api::<Node>::all(client.clone())
            .list(&params)
            .await
            .context("Failed to list nodes")?;
        let pods = self
            .scoped::<Pod>(client.clone())
            .list(&params)
            .await
            .context("Failed to list pods")?;
        let budgets = self
            .scoped::<PodDisruptionBudget>(client)
            .list(&params)
            .await
            .context("Failed to list pod disruption budgets")?;

        debug!(
            nodes = nodes.items.len(),
            pods = pods.items.len(),
            budgets = budgets.items.len(),
            "Listed cluster objects"
        );

        Ok(snapshot_from_objects(&nodes.items, &pods.items, &budgets.items))
    }

    fn describe(&self) -> String {
        match &self.namespace {
            Some(namespace) => format!("cluster (namespace {})", namespace),
            None => "cluster (all namespaces)".to_string(),
        }
    }
}

/// Translate listed cluster objects into a snapshot
pub fn snapshot_from_objects(
    nodes: &[Node],
    pods: &[Pod],
    budgets: &[PodDisruptionBudget],
) -> ClusterSnapshot {
    let names: BTreeSet<&str> = nodes
        .iter()
        .filter_map(|node| node.metadata.name.as_deref())
        .collect();

    let mut snapshot = ClusterSnapshot {
        machines: names.iter().map(|name| Machine::new(*name)).collect(),
        ..Default::default()
    };

    let mut placements = BTreeSet::new();
    for budget in budgets {
        let Some(name) = budget.metadata.name.as_deref() else {
            continue;
        };
        let namespace = budget.metadata.namespace.as_deref().unwrap_or("default");
        let application = format!("{}/{}", namespace, name);

        let allowed = budget
            .status
            .as_ref()
            .map(|status| i64::from(status.disruptions_allowed))
            .unwrap_or(0);
        snapshot.budgets.insert(application.clone(), allowed);

        let selector = budget.spec.as_ref().and_then(|spec| spec.selector.as_ref());
        for pod in pods {
            if pod.metadata.namespace.as_deref().unwrap_or("default") != namespace {
                continue;
            }
            let Some(node) = bound_node(pod) else {
                continue;
            };
            if !names.contains(node) {
                continue;
            }
            if selector.is_some_and(|selector| selector_matches(selector, pod_labels(pod))) {
                placements.insert(Placement::new(node, application.clone()));
            }
        }
    }

    snapshot.placements = placements.into_iter().collect();
    snapshot
}

/// Node of a pod that still occupies it
fn bound_node(pod: &Pod) -> Option<&str> {
    let phase = pod.status.as_ref().and_then(|status| status.phase.as_deref());
    if phase.is_some_and(|phase| TERMINAL_PHASES.contains(&phase)) {
        return None;
    }
    pod.spec.as_ref().and_then(|spec| spec.node_name.as_deref())
}

fn pod_labels(pod: &Pod) -> &BTreeMap<String, String> {
    static EMPTY: BTreeMap<String, String> = BTreeMap::new();
    pod.metadata.labels.as_ref().unwrap_or(&EMPTY)
}

/// Label selector semantics; an empty selector matches everything
pub fn selector_matches(selector: &LabelSelector, labels: &BTreeMap<String, String>) -> bool {
    let labels_match = selector
        .match_labels
        .iter()
        .flatten()
        .all(|(key, value)| labels.get(key) == Some(value));

    labels_match
        && selector
            .match_expressions
            .iter()
            .flatten()
            .all(|requirement| requirement_matches(requirement, labels))
}

fn requirement_matches(
    requirement: &LabelSelectorRequirement,
    labels: &BTreeMap<String, String>,
) -> bool {
    let value = labels.get(&requirement.key);
    let values = requirement.values.as_deref().unwrap_or_default();

    match requirement.operator.as_str() {
        "In" => value.is_some_and(|v| values.contains(v)),
        "NotIn" => value.map_or(true, |v| !values.contains(v)),
        "Exists" => value.is_some(),
        "DoesNotExist" => value.is_none(),
        other => {
            warn!(operator = %other, key = %requirement.key, "Unknown selector operator");
            false
        }
    }
}
