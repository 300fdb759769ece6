//! The selector evaluator (C4): turns a [`LabelSelector`] plus a scope
//! bitset into the bitset of matching entities, and turns a [`Peer`] into
//! the admission-set bitset over workloads (resolving namespace scoping
//! along the way).

use crate::bitset::Bitset;
use crate::label_index::LabelIndex;
use crate::model::{ClusterModel, LabelSelector, NamespaceIndex, Peer, PodIndex, SelectorClause};

/// Precomputed context the selector evaluator needs beyond the raw label
/// indices: which workloads live in which namespace.
pub struct SelectorContext<'a> {
    model: &'a ClusterModel,
    pod_labels: &'a LabelIndex,
    namespace_labels: &'a LabelIndex,
    pods_by_namespace: Vec<Bitset>,
}

impl<'a> SelectorContext<'a> {
    /// Build a context from a model and its two label indices.
    #[must_use]
    pub fn new(model: &'a ClusterModel, pod_labels: &'a LabelIndex, namespace_labels: &'a LabelIndex) -> Self {
        let mut pods_by_namespace: Vec<Bitset> = model
            .namespace_indices()
            .map(|_| Bitset::new(model.pod_count()))
            .collect();

        for pod_idx in model.pod_indices() {
            let workload = model.workload(pod_idx);
            if let Some(ns_idx) = model.namespace_index(&workload.namespace) {
                pods_by_namespace[ns_idx.0].set(pod_idx.0);
            }
        }

        Self {
            model,
            pod_labels,
            namespace_labels,
            pods_by_namespace,
        }
    }

    /// Workloads belonging to a given namespace index.
    #[must_use]
    pub fn pods_in_namespace(&self, ns: NamespaceIndex) -> &Bitset {
        &self.pods_by_namespace[ns.0]
    }

    /// Evaluate a label selector over workloads, restricted to `scope`.
    #[must_use]
    pub fn evaluate_pod_selector(&self, selector: &LabelSelector, scope: &Bitset) -> Bitset {
        apply_clauses(self.pod_labels, scope, selector)
    }

    /// Evaluate a label selector over namespaces, restricted to `scope`.
    #[must_use]
    pub fn evaluate_namespace_selector(&self, selector: &LabelSelector, scope: &Bitset) -> Bitset {
        apply_clauses(self.namespace_labels, scope, selector)
    }

    /// Expand a single peer clause into the bitset of workloads it admits,
    /// given the home namespace of the policy the peer belongs to.
    ///
    /// `ipBlock` peers are parsed but never evaluated (see Non-goals); they
    /// always contribute the empty set.
    #[must_use]
    pub fn evaluate_peer(&self, home_namespace: NamespaceIndex, peer: &Peer) -> Bitset {
        match peer {
            Peer::PodSelector(sel) => {
                let scope = self.pods_in_namespace(home_namespace);
                self.evaluate_pod_selector(sel, scope)
            }
            Peer::NamespaceSelector(sel) => {
                let ns_full = self.namespace_labels.full_bitset();
                let matched_ns = self.evaluate_namespace_selector(sel, &ns_full);
                self.union_pods_in_namespaces(&matched_ns)
            }
            Peer::PodAndNamespaceSelector { pod, namespace } => {
                let ns_full = self.namespace_labels.full_bitset();
                let matched_ns = self.evaluate_namespace_selector(namespace, &ns_full);
                let pod_scope = self.union_pods_in_namespaces(&matched_ns);
                self.evaluate_pod_selector(pod, &pod_scope)
            }
            Peer::IpBlock(_) => self.pod_labels.empty_bitset(),
        }
    }

    fn union_pods_in_namespaces(&self, matched_ns: &Bitset) -> Bitset {
        let mut out = self.pod_labels.empty_bitset();
        for ns_idx in matched_ns.iter_set() {
            out.or_with(&self.pods_by_namespace[ns_idx]);
        }
        out
    }

    /// Expand an ingress/egress rule's peer list into the admitted-peer
    /// bitset: `None` means "any workload"; `Some([])` means "none";
    /// `Some(peers)` is the union of each peer's admission set.
    #[must_use]
    pub fn evaluate_peers(&self, home_namespace: NamespaceIndex, peers: Option<&[Peer]>) -> Bitset {
        match peers {
            None => self.pod_labels.full_bitset(),
            Some(list) => {
                let mut out = self.pod_labels.empty_bitset();
                for peer in list {
                    out.or_with(&self.evaluate_peer(home_namespace, peer));
                }
                out
            }
        }
    }

    /// The underlying model this context was built from.
    #[must_use]
    pub fn model(&self) -> &ClusterModel {
        self.model
    }

    /// All-pods scope bitset (the "everyone" scope selectors start from).
    #[must_use]
    pub fn full_pod_scope(&self) -> Bitset {
        self.pod_labels.full_bitset()
    }
}

/// Core clause-application loop shared by pod and namespace selector
/// evaluation; differs only in which [`LabelIndex`] backs the lookups.
fn apply_clauses(index: &LabelIndex, scope: &Bitset, selector: &LabelSelector) -> Bitset {
    let mut acc = scope.clone();

    for (key, value) in &selector.match_labels {
        acc.and_with(index.has_kv(key, value));
    }

    for clause in &selector.match_expressions {
        match clause {
            SelectorClause::Exists { key } => acc.and_with(index.has_key(key)),
            SelectorClause::DoesNotExist { key } => acc = acc.and_not(index.has_key(key)),
            SelectorClause::In { key, values } => {
                let mut union = index.empty_bitset();
                for v in values {
                    union.or_with(index.has_kv(key, v));
                }
                acc.and_with(&union);
            }
            SelectorClause::NotIn { key, values } => {
                let mut union = index.empty_bitset();
                for v in values {
                    union.or_with(index.has_kv(key, v));
                }
                // NotIn requires the key to exist: `has_key & !union`, not a
                // bare negation of `union` (see DESIGN.md).
                let allowed = index.has_key(key).and_not(&union);
                acc.and_with(&allowed);
            }
        }
    }

    acc
}

/// Evaluate a pod selector scoped to a single namespace — the common case
/// for a policy's own `pod_selector`.
#[must_use]
pub fn select_in_namespace(ctx: &SelectorContext<'_>, selector: &LabelSelector, namespace: NamespaceIndex) -> Vec<PodIndex> {
    let scope = ctx.pods_in_namespace(namespace);
    ctx.evaluate_pod_selector(selector, scope).iter_set().map(PodIndex).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::label_index::LabelIndex;
    use crate::model::{ClusterModel, Namespace, Workload};

    fn build_ctx() -> (ClusterModel, LabelIndex, LabelIndex) {
        let model = ClusterModel::build(
            vec![
                Workload::new("a", "ns1").with_label("role", "db"),
                Workload::new("b", "ns1").with_label("role", "web"),
                Workload::new("c", "ns2").with_label("role", "db"),
            ],
            vec![Namespace::new("ns1").with_label("env", "prod"), Namespace::new("ns2")],
            vec![],
        );
        let pods = LabelIndex::for_workloads(&model);
        let nss = LabelIndex::for_namespaces(&model);
        (model, pods, nss)
    }

    #[test]
    fn empty_selector_selects_everything_in_scope() {
        let (model, pods, nss) = build_ctx();
        let ctx = SelectorContext::new(&model, &pods, &nss);
        let scope = ctx.pods_in_namespace(NamespaceIndex(0));
        let result = ctx.evaluate_pod_selector(&LabelSelector::default(), scope);
        assert_eq!(result.count(), 2);
    }

    #[test]
    fn match_labels_narrows_scope() {
        let (model, pods, nss) = build_ctx();
        let ctx = SelectorContext::new(&model, &pods, &nss);
        let scope = ctx.full_pod_scope();
        let sel = LabelSelector::matching_label("role", "db");
        let result = ctx.evaluate_pod_selector(&sel, &scope);
        assert_eq!(result.count(), 2);
        assert!(result.test(0));
        assert!(result.test(2));
    }

    #[test]
    fn not_in_requires_key_presence() {
        let (model, pods, nss) = build_ctx();
        let ctx = SelectorContext::new(&model, &pods, &nss);
        let scope = ctx.full_pod_scope();
        let sel = LabelSelector {
            match_labels: Default::default(),
            match_expressions: vec![SelectorClause::NotIn {
                key: "role".into(),
                values: vec!["db".into()],
            }],
        };
        let result = ctx.evaluate_pod_selector(&sel, &scope);
        // Only workload "b" has role=web; none lack the "role" key here, so
        // this is simply "everyone but the db workloads".
        assert_eq!(result.count(), 1);
        assert!(result.test(1));
    }

    #[test]
    fn not_in_excludes_workloads_missing_the_key() {
        let model = ClusterModel::build(
            vec![
                Workload::new("a", "ns1").with_label("role", "web"),
                Workload::new("b", "ns1"), // no "role" label at all
            ],
            vec![Namespace::new("ns1")],
            vec![],
        );
        let pods = LabelIndex::for_workloads(&model);
        let nss = LabelIndex::for_namespaces(&model);
        let ctx = SelectorContext::new(&model, &pods, &nss);
        let sel = LabelSelector {
            match_labels: Default::default(),
            match_expressions: vec![SelectorClause::NotIn {
                key: "role".into(),
                values: vec!["db".into()],
            }],
        };
        let result = ctx.evaluate_pod_selector(&sel, &ctx.full_pod_scope());
        // "b" lacks the key entirely, so it must NOT match NotIn.
        assert!(result.test(0));
        assert!(!result.test(1));
    }

    #[test]
    fn namespace_selector_expands_to_member_pods() {
        let (model, pods, nss) = build_ctx();
        let ctx = SelectorContext::new(&model, &pods, &nss);
        let peer = Peer::NamespaceSelector(LabelSelector::matching_label("env", "prod"));
        let result = ctx.evaluate_peer(NamespaceIndex(1), &peer);
        assert_eq!(result.count(), 2); // a, b are in ns1 which has env=prod
    }

    #[test]
    fn pod_selector_peer_is_scoped_to_home_namespace() {
        let (model, pods, nss) = build_ctx();
        let ctx = SelectorContext::new(&model, &pods, &nss);
        let peer = Peer::PodSelector(LabelSelector::matching_label("role", "db"));
        // home namespace ns2 only contains workload "c"
        let result = ctx.evaluate_peer(NamespaceIndex(1), &peer);
        assert_eq!(result.count(), 1);
        assert!(result.test(2));
    }

    #[test]
    fn ip_block_peer_is_ignored() {
        let (model, pods, nss) = build_ctx();
        let ctx = SelectorContext::new(&model, &pods, &nss);
        let peer = Peer::IpBlock(crate::model::IpBlock {
            cidr: "10.0.0.0/8".into(),
            except: vec![],
        });
        let result = ctx.evaluate_peer(NamespaceIndex(0), &peer);
        assert!(result.all_clear());
    }

    #[test]
    fn peers_none_means_any() {
        let (model, pods, nss) = build_ctx();
        let ctx = SelectorContext::new(&model, &pods, &nss);
        let result = ctx.evaluate_peers(NamespaceIndex(0), None);
        assert_eq!(result.count(), model.pod_count());
    }

    #[test]
    fn peers_empty_means_none() {
        let (model, pods, nss) = build_ctx();
        let ctx = SelectorContext::new(&model, &pods, &nss);
        let result = ctx.evaluate_peers(NamespaceIndex(0), Some(&[]));
        assert!(result.all_clear());
    }
}
