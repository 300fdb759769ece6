//! The bitmap reachability engine (C5): a single linear pass over policies
//! that builds the workload-by-workload admission matrix `M` directly as
//! [`Bitset`] rows, without ever materializing a symbolic rule set. This is
//! the bitmap twin of [`crate::compiler`]/[`crate::relation`]; §8 invariant 2
//! requires the two to agree on every `M[i][j]`/`edge(i, j)` pair.

use crate::bitset::Bitset;
use crate::config::EngineConfig;
use crate::label_index::LabelIndex;
use crate::model::{ClusterModel, NamespaceIndex, PodIndex, Rule};
use crate::selector::SelectorContext;

/// The final `N x N` admission matrix plus, optionally, a precomputed
/// transpose for O(1) column access.
#[derive(Debug, Clone)]
pub struct ReachabilityMatrix {
    n: usize,
    rows: Vec<Bitset>,
    transpose: Option<Vec<Bitset>>,
}

impl ReachabilityMatrix {
    /// Number of workloads the matrix covers.
    #[must_use]
    pub const fn pod_count(&self) -> usize {
        self.n
    }

    /// Whether `src` is admitted to reach `dst`.
    #[must_use]
    pub fn get(&self, src: PodIndex, dst: PodIndex) -> bool {
        self.rows[src.0].test(dst.0)
    }

    /// All destinations `src` is admitted to reach.
    #[must_use]
    pub fn row(&self, src: PodIndex) -> &Bitset {
        &self.rows[src.0]
    }

    /// All sources admitted to reach `dst`. Uses the precomputed transpose
    /// when available, otherwise builds it for this single column.
    #[must_use]
    pub fn col(&self, dst: PodIndex) -> Bitset {
        if let Some(t) = &self.transpose {
            t[dst.0].clone()
        } else {
            let mut out = Bitset::new(self.n);
            for (src, row) in self.rows.iter().enumerate() {
                if row.test(dst.0) {
                    out.set(src);
                }
            }
            out
        }
    }

    /// Whether the precomputed transpose was built for this matrix.
    #[must_use]
    pub const fn has_transpose(&self) -> bool {
        self.transpose.is_some()
    }
}

/// Build the reachability matrix from a cluster model and engine flags.
///
/// Evaluation order never affects the result (§8 invariant 1): boolean OR is
/// associative/commutative, and the "clear on first selection" step is
/// always performed — via the two upfront bitsets `touched_ingress` /
/// `touched_egress` below — before any admission is OR-ed in for that
/// workload, regardless of which policy in the input order first selects it.
///
/// The two directions default independently. Egress is hardcoded-permissive:
/// a workload untouched by any egress-selecting policy can reach anything,
/// regardless of `check_select_by_no_policy`. Ingress is the only dimension
/// that flag governs. Folding both directions into one "selected by any
/// policy" event (as a literal reading of the clearing step might suggest)
/// makes an ingress-only policy also wipe out the egress side of every
/// workload it selects, which contradicts the documented worked examples:
/// a workload isolated for ingress only must still be able to *initiate*
/// traffic elsewhere.
#[must_use]
pub fn build(model: &ClusterModel, config: EngineConfig) -> ReachabilityMatrix {
    let n = model.pod_count();
    let pod_labels = LabelIndex::for_workloads(model);
    let ns_labels = LabelIndex::for_namespaces(model);
    let ctx = SelectorContext::new(model, &pod_labels, &ns_labels);

    let permissive = config.check_select_by_no_policy;
    let mut out_rows: Vec<Bitset> = (0..n).map(|_| Bitset::new_all_set(n)).collect();
    let mut in_rows: Vec<Bitset> = (0..n)
        .map(|_| if permissive { Bitset::new_all_set(n) } else { Bitset::new(n) })
        .collect();

    let compiled: Vec<CompiledPolicy<'_>> = model
        .policy_indices()
        .filter_map(|q| {
            let policy = model.policy(q);
            let home = model.policy_namespace_index(policy)?;
            let scope = ctx.pods_in_namespace(home);
            let selected = ctx.evaluate_pod_selector(&policy.pod_selector, scope);
            let types = policy.effective_types();
            Some(CompiledPolicy {
                selected,
                ingress: types.ingress,
                egress: types.egress,
                home,
                ingress_rules: &policy.ingress,
                egress_rules: &policy.egress,
            })
        })
        .collect();

    // Clearing pass, one bitset per direction: a workload selected by any
    // ingress-selecting policy has its IN row reset once before admissions
    // are folded in; likewise OUT for egress-selecting policies. The two
    // passes are independent, so an ingress-only policy never touches OUT.
    let mut touched_ingress = pod_labels.empty_bitset();
    let mut touched_egress = pod_labels.empty_bitset();
    for policy in &compiled {
        if policy.ingress {
            touched_ingress.or_with(&policy.selected);
        }
        if policy.egress {
            touched_egress.or_with(&policy.selected);
        }
    }
    for i in touched_ingress.iter_set() {
        in_rows[i].clear_all();
    }
    for i in touched_egress.iter_set() {
        out_rows[i].clear_all();
    }

    for policy in &compiled {
        if policy.ingress {
            for rule in policy.ingress_rules {
                let admitted = ctx.evaluate_peers(policy.home, rule.peers.as_deref());
                for i in policy.selected.iter_set() {
                    in_rows[i].or_with(&admitted);
                }
            }
        }
        if policy.egress {
            for rule in policy.egress_rules {
                let admitted = ctx.evaluate_peers(policy.home, rule.peers.as_deref());
                for i in policy.selected.iter_set() {
                    out_rows[i].or_with(&admitted);
                }
            }
        }
    }

    // M[i][j] = OUT[i][j] & IN[j][i]; transpose IN once so each row of M is
    // a single bitwise AND rather than an O(n) scalar scan.
    let in_transposed = transpose(&in_rows, n);
    let mut rows: Vec<Bitset> = out_rows
        .iter()
        .zip(&in_transposed)
        .map(|(out_row, in_col)| out_row.and(in_col))
        .collect();

    if config.check_self_ingress_traffic {
        for (i, row) in rows.iter_mut().enumerate() {
            row.set(i);
        }
    }

    let transpose_cache = config.build_transpose_matrix.then(|| transpose(&rows, n));

    ReachabilityMatrix {
        n,
        rows,
        transpose: transpose_cache,
    }
}

struct CompiledPolicy<'a> {
    selected: Bitset,
    ingress: bool,
    egress: bool,
    home: NamespaceIndex,
    ingress_rules: &'a [Rule],
    egress_rules: &'a [Rule],
}

fn transpose(source: &[Bitset], n: usize) -> Vec<Bitset> {
    let mut out: Vec<Bitset> = (0..n).map(|_| Bitset::new(n)).collect();
    for (src, row) in source.iter().enumerate() {
        for dst in row.iter_set() {
            out[dst].set(src);
        }
    }
    out
}
