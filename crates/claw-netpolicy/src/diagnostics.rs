//! Diagnostic queries (C8): the higher-level connectivity questions the
//! crate exists to answer, read over either engine's native output. Every
//! query here is a pure function — empty input yields empty output, and an
//! unknown label key in [`cross_tenant`] behaves exactly as documented in
//! §4.7 rather than erroring.

use std::collections::{BTreeMap, BTreeSet};

use crate::model::{ClusterModel, PodIndex, PolicyIndex};
use crate::reachability::ReachabilityMatrix;
use crate::relation::RelationEngine;

/// Workloads reachable from every other workload: `{ j | ∀i≠j: M[i][j] = 1 }`.
///
/// Quantifies over `i ≠ j`: whether a workload can reach itself is governed
/// entirely by `check_self_ingress_traffic` (§8 invariant 3) and is
/// orthogonal to whether anyone *else* can reach it, so the diagonal is
/// excluded here rather than forcing every self-loop workload to also be
/// unconditionally reachable.
#[must_use]
pub fn all_reachable(matrix: &ReachabilityMatrix) -> BTreeSet<PodIndex> {
    let n = matrix.pod_count();
    (0..n)
        .map(PodIndex)
        .filter(|&dst| (0..n).filter(|&src| src != dst.0).all(|src| matrix.get(PodIndex(src), dst)))
        .collect()
}

/// Workloads reachable from no other workload: `{ j | ∀i≠j: M[i][j] = 0 }`.
///
/// See [`all_reachable`] for why the diagonal is excluded from the
/// quantifier.
#[must_use]
pub fn all_isolated(matrix: &ReachabilityMatrix) -> BTreeSet<PodIndex> {
    let n = matrix.pod_count();
    (0..n)
        .map(PodIndex)
        .filter(|&dst| (0..n).filter(|&src| src != dst.0).all(|src| !matrix.get(PodIndex(src), dst)))
        .collect()
}

/// Sentinel used in place of a missing label value, so workloads lacking
/// the queried label still participate in the comparison rather than being
/// silently dropped.
const MISSING_LABEL_SENTINEL: &str = "\0<missing>";

fn label_value<'a>(model: &'a ClusterModel, pod: PodIndex, label: &str) -> &'a str {
    model
        .workload(pod)
        .labels
        .get(label)
        .map_or(MISSING_LABEL_SENTINEL, String::as_str)
}

/// Destinations reachable from some source carrying a different value of
/// label `label`: `{ j | ∃i: M[i][j] = 1 ∧ L(i) ≠ L(j) }`. A workload
/// missing `label` entirely is compared under a sentinel value rather than
/// excluded — this is not an error case (§7).
#[must_use]
pub fn cross_tenant(matrix: &ReachabilityMatrix, model: &ClusterModel, label: &str) -> BTreeSet<PodIndex> {
    let n = matrix.pod_count();
    let mut out = BTreeSet::new();
    for dst in 0..n {
        let dst_idx = PodIndex(dst);
        let dst_value = label_value(model, dst_idx, label);
        for src in 0..n {
            let src_idx = PodIndex(src);
            if matrix.get(src_idx, dst_idx) && label_value(model, src_idx, label) != dst_value {
                out.insert(dst_idx);
                break;
            }
        }
    }
    out
}

/// Destinations the designated system workload `system` cannot reach:
/// `{ j | M[system][j] = 0 }`. Egress-only view; never computes a path.
#[must_use]
pub fn system_isolation(matrix: &ReachabilityMatrix, system: PodIndex) -> BTreeSet<PodIndex> {
    (0..matrix.pod_count())
        .map(PodIndex)
        .filter(|&dst| !matrix.get(system, dst))
        .collect()
}

/// Per-policy supports over a single relation: for each policy, the set of
/// pod indices it relates to a given column of a two-column relation whose
/// other column is the policy index.
fn supports_by_policy(engine: &RelationEngine, relation: &str, policy_count: usize, pod_col: usize, pol_col: usize) -> BTreeMap<PolicyIndex, BTreeSet<PodIndex>> {
    let mut out: BTreeMap<PolicyIndex, BTreeSet<PodIndex>> =
        (0..policy_count).map(|q| (PolicyIndex(q), BTreeSet::new())).collect();
    for tuple in engine.query(relation) {
        let pol = PolicyIndex(tuple[pol_col] as usize);
        let pod = PodIndex(tuple[pod_col] as usize);
        out.entry(pol).or_default().insert(pod);
    }
    out
}

/// The three supports (`selected`, `ingress_allow`, `egress_allow`) a policy
/// contributes, gathered once and shared by both [`policy_shadow`] and
/// [`policy_conflict`] so each only walks the relation engine's tuples a
/// single time regardless of how many policy pairs are compared.
struct PolicySupports {
    selected: BTreeMap<PolicyIndex, BTreeSet<PodIndex>>,
    ingress_allow: BTreeMap<PolicyIndex, BTreeSet<PodIndex>>,
    egress_allow: BTreeMap<PolicyIndex, BTreeSet<PodIndex>>,
}

impl PolicySupports {
    fn gather(engine: &RelationEngine, policy_count: usize) -> Self {
        Self {
            // selected(pod, pol): pod is column 0, policy is column 1.
            selected: supports_by_policy(engine, "selected", policy_count, 0, 1),
            // ingress_allow(pol, pod) / egress_allow(pol, pod): policy first.
            ingress_allow: supports_by_policy(engine, "ingress_allow", policy_count, 1, 0),
            egress_allow: supports_by_policy(engine, "egress_allow", policy_count, 1, 0),
        }
    }

    fn selected(&self, p: PolicyIndex) -> &BTreeSet<PodIndex> {
        static EMPTY: BTreeSet<PodIndex> = BTreeSet::new();
        self.selected.get(&p).unwrap_or(&EMPTY)
    }

    fn ingress(&self, p: PolicyIndex) -> &BTreeSet<PodIndex> {
        static EMPTY: BTreeSet<PodIndex> = BTreeSet::new();
        self.ingress_allow.get(&p).unwrap_or(&EMPTY)
    }

    fn egress(&self, p: PolicyIndex) -> &BTreeSet<PodIndex> {
        static EMPTY: BTreeSet<PodIndex> = BTreeSet::new();
        self.egress_allow.get(&p).unwrap_or(&EMPTY)
    }
}

fn is_subset(a: &BTreeSet<PodIndex>, b: &BTreeSet<PodIndex>) -> bool {
    a.is_subset(b)
}

fn is_disjoint(a: &BTreeSet<PodIndex>, b: &BTreeSet<PodIndex>) -> bool {
    a.is_disjoint(b)
}

/// `{(a,b) | a ≠ b ∧ b covers a on selection, ingress admission, and egress
/// admission}` — policy `b` shadows policy `a`.
///
/// Reads the `selected`/`ingress_allow`/`egress_allow` relations straight
/// from a compiled, evaluated [`RelationEngine`] (see
/// [`crate::compiler::compile`]); this is the only production definition
/// (§4.7) — the narrower per-pod "common workload" fast path noted in the
/// source is deliberately not implemented here, see DESIGN.md.
#[must_use]
pub fn policy_shadow(engine: &RelationEngine, policy_count: usize) -> BTreeSet<(PolicyIndex, PolicyIndex)> {
    let supports = PolicySupports::gather(engine, policy_count);
    let mut out = BTreeSet::new();
    for a in 0..policy_count {
        for b in 0..policy_count {
            if a == b {
                continue;
            }
            let (a, b) = (PolicyIndex(a), PolicyIndex(b));
            if is_subset(supports.selected(a), supports.selected(b))
                && is_subset(supports.ingress(a), supports.ingress(b))
                && is_subset(supports.egress(a), supports.egress(b))
            {
                out.insert((a, b));
            }
        }
    }
    out
}

/// `{(a,b) | a ≠ b ∧ disjoint selection ∧ disjoint ingress admission ∧
/// disjoint egress admission}` — two policies that share no workload on any
/// of the three axes.
#[must_use]
pub fn policy_conflict(engine: &RelationEngine, policy_count: usize) -> BTreeSet<(PolicyIndex, PolicyIndex)> {
    let supports = PolicySupports::gather(engine, policy_count);
    let mut out = BTreeSet::new();
    for a in 0..policy_count {
        for b in (a + 1)..policy_count {
            let (ai, bi) = (PolicyIndex(a), PolicyIndex(b));
            if is_disjoint(supports.selected(ai), supports.selected(bi))
                && is_disjoint(supports.ingress(ai), supports.ingress(bi))
                && is_disjoint(supports.egress(ai), supports.egress(bi))
            {
                out.insert((ai, bi));
                out.insert((bi, ai));
            }
        }
    }
    out
}
