//! Network-policy reachability verification for a container-orchestration
//! cluster.
//!
//! Two independent engines compute the same workload-to-workload admission
//! abstraction from the same [`model::ClusterModel`]:
//!
//! - [`reachability`] materializes the `N x N` admission matrix directly by
//!   intersecting/unioning [`bitset::Bitset`]s over the workload index
//!   space (C2-C5).
//! - [`relation`]/[`compiler`] derive the same edges symbolically as a
//!   bottom-up Datalog fixed point over typed relations with stratified
//!   negation (C6-C7).
//!
//! [`diagnostics`] (C8) answers the higher-level connectivity questions —
//! unconditional reachability/isolation, cross-tenant leaks, system
//! isolation, policy shadowing, policy conflict — over either engine's
//! output; which engine a caller builds is an implementation choice, not a
//! difference in the answers (see the engine-equivalence property checked
//! under `tests/invariants.rs`).

pub mod bitset;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod label_index;
pub mod loader;
pub mod model;
pub mod reachability;
pub mod relation;
pub mod selector;

pub use config::EngineConfig;
pub use error::{LoaderError, ModelWarning, RelationError};
pub use loader::load_dir;
pub use model::{ClusterModel, LabelSelector, Namespace, Peer, Policy, PodIndex, PolicyIndex, Rule, SelectorClause, Workload};
pub use reachability::ReachabilityMatrix;
pub use relation::RelationEngine;

use tracing::{info, warn};

/// Build both engines from a [`ClusterModel`] and the same [`EngineConfig`],
/// logging the model's size and any per-policy warnings the way
/// `clawnode`'s own policy engine does for its iptables compilation step.
///
/// # Errors
///
/// Returns [`RelationError`] if the compiled rule set fails stratification
/// or range-restriction — this indicates a bug in [`compiler::compile`]
/// itself (every rule it builds is hand-verified to satisfy both), not a
/// problem with `model`, but is surfaced rather than unwrapped since it is
/// the one thing standing between a compiler bug and a silent miscompile.
pub fn build_engines(model: &ClusterModel, config: EngineConfig) -> Result<(ReachabilityMatrix, RelationEngine), RelationError> {
    info!(
        workloads = model.pod_count(),
        namespaces = model.namespace_count(),
        policies = model.policy_count(),
        "building network-policy engines"
    );
    for w in model.warnings() {
        warn!("{w}");
    }

    let matrix = reachability::build(model, config);
    let relations = compiler::compile(model, config)?;
    Ok((matrix, relations))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_engines_agrees_on_trivial_model() {
        let model = ClusterModel::build(
            vec![Workload::new("a", "ns"), Workload::new("b", "ns")],
            vec![Namespace::new("ns")],
            vec![],
        );
        let (matrix, engine) = build_engines(&model, EngineConfig::default()).unwrap();
        assert!(!matrix.get(PodIndex(0), PodIndex(1)));
        assert!(!engine.contains("edge", &[0, 1]));
    }
}
