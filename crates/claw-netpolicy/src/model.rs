//! The label model (C1): workloads, namespaces, policies and label
//! selectors, plus the `ClusterModel` that assigns each workload and
//! namespace its dense index.
//!
//! Selectors are a closed sum type (one variant per clause kind) rather than
//! the open, duck-typed dictionaries of the source this crate generalizes
//! from, so the evaluator in [`crate::selector`] is total by construction.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ModelWarning;

/// A mapping from label key to label value. Keys are unique by construction
/// (it's a map).
pub type Labels = HashMap<String, String>;

/// Dense index of a workload within a [`ClusterModel`]. The only identity the
/// engines use for a workload — never a name lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PodIndex(pub usize);

/// Dense index of a namespace within a [`ClusterModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NamespaceIndex(pub usize);

/// Dense index of a policy within a [`ClusterModel`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PolicyIndex(pub usize);

/// A single deployable workload: named, namespaced, labeled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Workload {
    /// Workload name (unique within its namespace, not enforced here).
    pub name: String,
    /// Name of the namespace this workload resides in.
    pub namespace: String,
    /// Label key/value pairs carried by this workload.
    #[serde(default)]
    pub labels: Labels,
}

impl Workload {
    /// Build a new workload.
    #[must_use]
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            labels: Labels::new(),
        }
    }

    /// Attach a label, builder-style.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// A named, labeled namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Namespace {
    /// Namespace name.
    pub name: String,
    /// Label key/value pairs carried by this namespace.
    #[serde(default)]
    pub labels: Labels,
}

impl Namespace {
    /// Build a new, unlabeled namespace.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            labels: Labels::new(),
        }
    }

    /// Attach a label, builder-style.
    #[must_use]
    pub fn with_label(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.labels.insert(key.into(), value.into());
        self
    }
}

/// One `matchExpressions` clause of a [`LabelSelector`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "operator", rename_all = "camelCase")]
pub enum SelectorClause {
    /// Key must be present with one of the given values.
    In {
        /// Label key to test.
        key: String,
        /// Acceptable values.
        values: Vec<String>,
    },
    /// Key must either be absent, or present with a value not in the list.
    NotIn {
        /// Label key to test.
        key: String,
        /// Values to exclude. The standard label-selector semantics require
        /// the key to exist for this to match (see DESIGN.md).
        values: Vec<String>,
    },
    /// Key must be present (with any value).
    Exists {
        /// Label key to test.
        key: String,
    },
    /// Key must be absent.
    DoesNotExist {
        /// Label key to test.
        key: String,
    },
}

/// A conjunctive predicate over label presence and values.
///
/// `LabelSelector::default()` is the "present but empty" selector — it
/// matches everything in scope. The distinction between an absent selector
/// (matches nothing) and this present-but-empty one is carried one level up,
/// by wrapping the selector in `Option` wherever "absent" is a meaningful
/// possibility (see [`Peer`]).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelSelector {
    /// Equality clauses, ANDed with everything else.
    #[serde(default, rename = "matchLabels")]
    pub match_labels: Labels,
    /// Set-based clauses, ANDed with everything else.
    #[serde(default, rename = "matchExpressions")]
    pub match_expressions: Vec<SelectorClause>,
}

impl LabelSelector {
    /// A selector with one equality clause.
    #[must_use]
    pub fn matching_label(key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut match_labels = Labels::new();
        match_labels.insert(key.into(), value.into());
        Self {
            match_labels,
            match_expressions: Vec::new(),
        }
    }

    /// Whether this selector carries no clauses at all (matches everything
    /// in scope).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.match_labels.is_empty() && self.match_expressions.is_empty()
    }
}

/// An IP CIDR block peer. Parsed for forward compatibility but never
/// evaluated by the core (see Non-goals).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpBlock {
    /// CIDR notation, e.g. `"10.0.0.0/8"`.
    pub cidr: String,
    /// CIDR exceptions within `cidr`.
    #[serde(default)]
    pub except: Vec<String>,
}

/// One OR-clause of a rule's allowed other side.
///
/// Re-architected as a closed sum type: a duck-typed "peer" dictionary in
/// the source this generalizes from could in principle carry any
/// combination of fields, but only these four shapes are meaningful.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Peer {
    /// Workloads in the policy's home namespace matching this selector.
    PodSelector(LabelSelector),
    /// All workloads in namespaces matching this selector.
    NamespaceSelector(LabelSelector),
    /// Workloads matching `pod` within namespaces matching `namespace`.
    PodAndNamespaceSelector {
        /// Selector over workload labels.
        pod: LabelSelector,
        /// Selector over namespace labels.
        namespace: LabelSelector,
    },
    /// An IP block peer. Ignored by the core (see Non-goals).
    IpBlock(IpBlock),
}

/// A port restriction. Captured for forward compatibility; does not gate
/// admission (see Non-goals).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRule {
    /// Transport protocol, e.g. `"TCP"`.
    #[serde(default)]
    pub protocol: Option<String>,
    /// Port number or named port.
    #[serde(default)]
    pub port: Option<u16>,
}

/// One ingress or egress rule: a set of peers (ORed) plus ports (ignored).
///
/// `peers == None` means "allow from/to any workload"; `peers == Some(vec![])`
/// means "allow none". These are semantically distinct and must not be
/// collapsed into a single `Vec<Peer>`.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rule {
    /// The OR-list of peers this rule admits. `None` = any peer.
    #[serde(default)]
    pub peers: Option<Vec<Peer>>,
    /// Ports this rule applies to (ignored by the core).
    #[serde(default)]
    pub ports: Vec<PortRule>,
}

impl Rule {
    /// A rule admitting any peer (the `peers == null` case).
    #[must_use]
    pub fn allow_any() -> Self {
        Self {
            peers: None,
            ports: Vec::new(),
        }
    }

    /// A rule admitting no peer (the `peers == []` case).
    #[must_use]
    pub fn allow_none() -> Self {
        Self {
            peers: Some(Vec::new()),
            ports: Vec::new(),
        }
    }

    /// A rule admitting exactly the given peers.
    #[must_use]
    pub fn allowing(peers: Vec<Peer>) -> Self {
        Self {
            peers: Some(peers),
            ports: Vec::new(),
        }
    }
}

/// Which traffic directions a policy governs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyTypes {
    /// Whether this policy imposes ingress isolation/rules.
    pub ingress: bool,
    /// Whether this policy imposes egress isolation/rules.
    pub egress: bool,
}

impl PolicyTypes {
    /// Resolve the effective policy types, applying the documented defaults
    /// when `explicit` is `None`: default to ingress-only, widening to
    /// include egress when egress rules are present.
    #[must_use]
    pub fn resolve(explicit: Option<Self>, has_egress_rules: bool) -> Self {
        explicit.unwrap_or(Self {
            ingress: true,
            egress: has_egress_rules,
        })
    }
}

/// A declarative policy: selects workloads, then imposes ingress/egress
/// admission rules on them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Policy {
    /// Policy name (unique within its namespace, not enforced here).
    pub name: String,
    /// Namespace the policy is defined in; pod-selector peers and the
    /// policy's own selector are scoped to this namespace.
    pub namespace: String,
    /// Selector governing which workloads this policy isolates.
    pub pod_selector: LabelSelector,
    /// Ordered ingress rules (peers ORed within each rule, rules ORed with
    /// each other).
    #[serde(default)]
    pub ingress: Vec<Rule>,
    /// Ordered egress rules.
    #[serde(default)]
    pub egress: Vec<Rule>,
    /// Explicit policy types, if the document specified them.
    #[serde(default)]
    pub policy_types: Option<PolicyTypes>,
}

impl Policy {
    /// The effective policy types, applying §3's defaulting rule.
    #[must_use]
    pub fn effective_types(&self) -> PolicyTypes {
        PolicyTypes::resolve(self.policy_types, !self.egress.is_empty())
    }
}

/// The fully indexed, read-only cluster snapshot that both engines consume.
///
/// Built once via [`ClusterModel::build`]; indices are assigned in insertion
/// order and never change afterward.
#[derive(Debug, Clone)]
pub struct ClusterModel {
    workloads: Vec<Workload>,
    namespaces: Vec<Namespace>,
    namespace_by_name: HashMap<String, NamespaceIndex>,
    policies: Vec<Policy>,
    /// Policies whose home namespace does not exist; recorded so callers can
    /// surface them, but they simply contribute no admissions to either
    /// engine.
    warnings: Vec<ModelWarning>,
}

impl ClusterModel {
    /// Build a model from workloads, namespaces and policies, assigning
    /// dense indices in insertion order.
    #[must_use]
    pub fn build(workloads: Vec<Workload>, namespaces: Vec<Namespace>, policies: Vec<Policy>) -> Self {
        let namespace_by_name = namespaces
            .iter()
            .enumerate()
            .map(|(i, ns)| (ns.name.clone(), NamespaceIndex(i)))
            .collect();

        let mut warnings = Vec::new();
        for policy in &policies {
            if !namespace_by_name.contains_key(&policy.namespace) {
                warnings.push(ModelWarning::UnknownNamespace {
                    policy: policy.name.clone(),
                    namespace: policy.namespace.clone(),
                });
            }
        }

        Self {
            workloads,
            namespaces,
            namespace_by_name,
            policies,
            warnings,
        }
    }

    /// Number of workloads (`N` elsewhere in the design).
    #[must_use]
    pub fn pod_count(&self) -> usize {
        self.workloads.len()
    }

    /// Number of namespaces (`K` elsewhere in the design).
    #[must_use]
    pub fn namespace_count(&self) -> usize {
        self.namespaces.len()
    }

    /// Number of policies.
    #[must_use]
    pub fn policy_count(&self) -> usize {
        self.policies.len()
    }

    /// All workloads, in index order.
    #[must_use]
    pub fn workloads(&self) -> &[Workload] {
        &self.workloads
    }

    /// All namespaces, in index order.
    #[must_use]
    pub fn namespaces(&self) -> &[Namespace] {
        &self.namespaces
    }

    /// All policies, in their original order. Evaluation order never
    /// affects results (see §4.4/§8 invariant 1), so this order is whatever
    /// the caller supplied.
    #[must_use]
    pub fn policies(&self) -> &[Policy] {
        &self.policies
    }

    /// Look up a workload by its index.
    #[must_use]
    pub fn workload(&self, idx: PodIndex) -> &Workload {
        &self.workloads[idx.0]
    }

    /// Look up a namespace by its index.
    #[must_use]
    pub fn namespace(&self, idx: NamespaceIndex) -> &Namespace {
        &self.namespaces[idx.0]
    }

    /// Look up a policy by its index.
    #[must_use]
    pub fn policy(&self, idx: PolicyIndex) -> &Policy {
        &self.policies[idx.0]
    }

    /// Resolve a namespace name to its dense index, if it exists.
    #[must_use]
    pub fn namespace_index(&self, name: &str) -> Option<NamespaceIndex> {
        self.namespace_by_name.get(name).copied()
    }

    /// The home-namespace index of a policy, or `None` if it names an
    /// unknown namespace (in which case the policy is recorded in
    /// [`Self::warnings`] and contributes nothing to either engine).
    #[must_use]
    pub fn policy_namespace_index(&self, policy: &Policy) -> Option<NamespaceIndex> {
        self.namespace_index(&policy.namespace)
    }

    /// Every workload's index, in order.
    pub fn pod_indices(&self) -> impl Iterator<Item = PodIndex> {
        (0..self.pod_count()).map(PodIndex)
    }

    /// Every namespace's index, in order.
    pub fn namespace_indices(&self) -> impl Iterator<Item = NamespaceIndex> {
        (0..self.namespace_count()).map(NamespaceIndex)
    }

    /// Every policy's index, in order.
    pub fn policy_indices(&self) -> impl Iterator<Item = PolicyIndex> {
        (0..self.policy_count()).map(PolicyIndex)
    }

    /// Warnings collected while building the model (currently: policies
    /// referencing unknown namespaces).
    #[must_use]
    pub fn warnings(&self) -> &[ModelWarning] {
        &self.warnings
    }
}
