//! The JSON shape `netpolicy` prints: every diagnostic from §4.7, with
//! indices resolved back to names so the output reads like the input
//! rather than requiring a second pass through `pods.json`. `BTreeSet`/
//! `BTreeMap` give the deterministic, sorted ordering §6 requires for free.

use std::collections::BTreeSet;

use serde::Serialize;

use claw_netpolicy::model::{ClusterModel, PodIndex, PolicyIndex};
use claw_netpolicy::reachability::ReachabilityMatrix;
use claw_netpolicy::relation::RelationEngine;
use claw_netpolicy::diagnostics;

use crate::Cli;

/// One diagnostic run's complete output.
#[derive(Debug, Serialize)]
pub struct Report {
    /// Number of workloads in the loaded snapshot.
    pub workload_count: usize,
    /// Number of namespaces in the loaded snapshot.
    pub namespace_count: usize,
    /// Number of policies in the loaded snapshot.
    pub policy_count: usize,
    /// Workloads with a namespace name that did not resolve; each policy
    /// contributes no admissions (§7).
    pub warnings: Vec<String>,
    /// Workloads reachable from every other workload.
    pub all_reachable: BTreeSet<String>,
    /// Workloads reachable from no workload.
    pub all_isolated: BTreeSet<String>,
    /// Workloads reachable from some workload carrying a different value of
    /// `--tenant-label`.
    pub cross_tenant: BTreeSet<String>,
    /// Workloads `--system` cannot reach, if `--system` was given.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_isolated: Option<BTreeSet<String>>,
    /// `(shadowed, shadowing)` policy-name pairs.
    pub policy_shadow: BTreeSet<(String, String)>,
    /// `(a, b)` policy-name pairs with disjoint selection and admission.
    pub policy_conflict: BTreeSet<(String, String)>,
}

impl Report {
    /// Run every §4.7 diagnostic over `matrix`/`engine` and resolve the
    /// results back to names for display.
    #[must_use]
    pub fn build(model: &ClusterModel, matrix: &ReachabilityMatrix, engine: &RelationEngine, cli: &Cli, system: Option<PodIndex>) -> Self {
        let pod_name = |idx: PodIndex| model.workload(idx).name.clone();
        let policy_name = |idx: PolicyIndex| model.policy(idx).name.clone();

        Self {
            workload_count: model.pod_count(),
            namespace_count: model.namespace_count(),
            policy_count: model.policy_count(),
            warnings: model.warnings().iter().map(ToString::to_string).collect(),
            all_reachable: diagnostics::all_reachable(matrix).into_iter().map(pod_name).collect(),
            all_isolated: diagnostics::all_isolated(matrix).into_iter().map(pod_name).collect(),
            cross_tenant: diagnostics::cross_tenant(matrix, model, &cli.tenant_label)
                .into_iter()
                .map(pod_name)
                .collect(),
            system_isolated: system.map(|idx| diagnostics::system_isolation(matrix, idx).into_iter().map(pod_name).collect()),
            policy_shadow: diagnostics::policy_shadow(engine, model.policy_count())
                .into_iter()
                .map(|(a, b)| (policy_name(a), policy_name(b)))
                .collect(),
            policy_conflict: diagnostics::policy_conflict(engine, model.policy_count())
                .into_iter()
                .map(|(a, b)| (policy_name(a), policy_name(b)))
                .collect(),
        }
    }
}
