//! The policy-to-rule compiler (C7): translates a [`ClusterModel`] into
//! facts and rules for the [`RelationEngine`] (C6), so every diagnostic can
//! be answered relationally instead of only through the bitmap engine (C5).
//! Engine equivalence requires the two engines to agree on every admission
//! they both model.
//!
//! Relation schema (all arities fixed, all columns domain values):
//!
//! - `is_pod(p)`, `is_ns(n)`, `is_pol(q)` — domain predicates.
//! - `namespace(p, n)` — workload `p` lives in namespace `n`.
//! - `pol_namespace(q, n)` — policy `q`'s home namespace.
//! - `label_<key>(entity, valueId)`, `label_<key>_exists(entity)` — one pair
//!   of relations per label key observed on workloads or namespaces, built
//!   from the same label data [`crate::label_index`] indexes for the bitmap
//!   side. Values are interned to `u32` ids by [`Interner`].
//! - `selected(p, q)` — workload `p` is selected by policy `q`'s
//!   `pod_selector`; this is the canonical store diagnostics read, not a
//!   derived view recomputed per query (see DESIGN.md).
//! - `selected_by_any(p)`, `selected_by_none(p)` — derived from `selected`,
//!   joining over both directions at once; kept for diagnostics that want
//!   "selected by something, regardless of direction".
//! - `selected_ingress(p, q)` / `selected_egress(p, q)`, and their
//!   `selected_by_any_*`/`selected_by_none_*` derivatives — the same facts
//!   narrowed to policies that actually carry that direction (ingress and
//!   egress defaults are independent; see DESIGN.md).
//! - `ingress_allow(q, src)`, `egress_allow(q, dst)` — one fact per
//!   `(policy, admitted peer)` pair contributed by any of that direction's
//!   rules.
//! - `ingress_ok(src, dst)`, `egress_ok(src, dst)` — whether traffic in that
//!   direction is admitted at all. `ingress_ok`'s permissive-default
//!   alternative is gated by [`EngineConfig::check_select_by_no_policy`];
//!   `egress_ok`'s is unconditional — egress defaults to fully open for any
//!   workload no egress-type policy actually selects, regardless of that
//!   flag (see DESIGN.md).
//! - `edge(src, dst)` — `ingress_ok(src, dst) ∧ egress_ok(src, dst)`.
//! - `path(x, z)` — two-hop reachability through `edge`, kept exactly as
//!   specified (not a full transitive closure — no diagnostic reads it, see
//!   DESIGN.md).

use std::collections::HashMap;

use crate::config::EngineConfig;
use crate::model::{ClusterModel, LabelSelector, Peer, Policy, PolicyIndex, SelectorClause};
use crate::relation::{Atom, BodyLiteral, RelationEngine, Rule, Term, Value};

/// Interns `(key, value)` label pairs to dense `u32` ids, so label relations
/// can stay plain binary relations over domain values instead of carrying
/// strings through the engine.
#[derive(Debug, Clone, Default)]
struct Interner {
    ids: HashMap<(String, String), Value>,
}

impl Interner {
    fn intern(&mut self, key: &str, value: &str) -> Value {
        let next = self.ids.len() as Value;
        *self.ids.entry((key.to_string(), value.to_string())).or_insert(next)
    }
}

fn var(name: &str) -> Term {
    Term::Var(name.to_string())
}

fn con(v: Value) -> Term {
    Term::Const(v)
}

/// Compile a [`ClusterModel`] into a populated, evaluated [`RelationEngine`].
///
/// When `config.ground_default_pod` is set, this runs a genuine two-phase
/// compile: the first pass omits the permissive-default rules (which would
/// otherwise force `ingress_ok`/`egress_ok` through a stratum above
/// `selected_by_none_ingress`/`selected_by_none_egress`), evaluates, then
/// grounds those into plain facts before compiling the second pass's
/// admission rules — so the hot path (`ingress_ok`/`egress_ok`/`edge`) never
/// carries a negation, only the one-time grounding step does.
///
/// # Errors
///
/// Returns [`crate::error::RelationError`] if the compiled rule set is not
/// stratifiable or range-restricted. Every rule this compiler builds is
/// hand-verified to satisfy both, so this should never actually fire for a
/// well-formed `model`; it is surfaced rather than unwrapped because the
/// relation engine's checks are the only thing standing between a
/// programmer error here and a silent miscompile.
pub fn compile(model: &ClusterModel, config: EngineConfig) -> Result<RelationEngine, crate::error::RelationError> {
    let mut engine = RelationEngine::new();
    let mut interner = Interner::default();

    declare_domains(&mut engine, model);
    declare_labels(&mut engine, model, &mut interner);
    declare_selection(&mut engine, model)?;

    if config.ground_default_pod {
        compile_grounded(&mut engine, model, config)?;
    } else {
        declare_admission(&mut engine, model, config)?;
    }

    if config.check_self_ingress_traffic {
        engine.declare_relation("edge", 2);
        for p in model.pod_indices() {
            engine.add_fact("edge", vec![p.0 as Value, p.0 as Value]);
        }
    }

    engine.evaluate()?;
    Ok(engine)
}

fn declare_domains(engine: &mut RelationEngine, model: &ClusterModel) {
    engine.declare_relation("is_pod", 1);
    engine.declare_relation("is_ns", 1);
    engine.declare_relation("is_pol", 1);
    engine.declare_relation("namespace", 2);
    engine.declare_relation("pol_namespace", 2);
    engine.declare_relation("ingress_policy", 1);
    engine.declare_relation("egress_policy", 1);

    for p in model.pod_indices() {
        engine.add_fact("is_pod", vec![p.0 as Value]);
        if let Some(ns) = model.namespace_index(&model.workload(p).namespace) {
            engine.add_fact("namespace", vec![p.0 as Value, ns.0 as Value]);
        }
    }
    for n in model.namespace_indices() {
        engine.add_fact("is_ns", vec![n.0 as Value]);
    }
    for q in model.policy_indices() {
        engine.add_fact("is_pol", vec![q.0 as Value]);
        if let Some(ns) = model.policy_namespace_index(model.policy(q)) {
            engine.add_fact("pol_namespace", vec![q.0 as Value, ns.0 as Value]);
        }
        let types = model.policy(q).effective_types();
        if types.ingress {
            engine.add_fact("ingress_policy", vec![q.0 as Value]);
        }
        if types.egress {
            engine.add_fact("egress_policy", vec![q.0 as Value]);
        }
    }
}

fn declare_labels(engine: &mut RelationEngine, model: &ClusterModel, interner: &mut Interner) {
    for p in model.pod_indices() {
        add_labels(engine, interner, "pod", p.0 as Value, &model.workload(p).labels);
    }
    for n in model.namespace_indices() {
        add_labels(engine, interner, "ns", n.0 as Value, &model.namespace(n).labels);
    }
}

fn add_labels(engine: &mut RelationEngine, interner: &mut Interner, scope: &str, entity: Value, labels: &crate::model::Labels) {
    for (key, value) in labels {
        let value_rel = format!("label_{scope}_{key}");
        let exists_rel = format!("label_{scope}_{key}_exists");
        engine.declare_relation(&value_rel, 2);
        engine.declare_relation(&exists_rel, 1);
        let id = interner.intern(key, value);
        engine.add_fact(&value_rel, vec![entity, id]);
        engine.add_fact(&exists_rel, vec![entity]);
    }
}

/// `selected(pod, policy)`: direct facts, computed via the same selector
/// evaluator the bitmap engine uses rather than relationally, because a
/// `matchLabels`/`matchExpressions` selector is most naturally a
/// set-intersection query over [`crate::label_index`] — compiling it into
/// Datalog body literals would just reinvent that evaluator one predicate
/// at a time. `selected` is the seam between the two representations: the
/// compiler computes it once with [`crate::selector::SelectorContext`] and
/// hands it to the relation engine as ground facts.
fn declare_selection(engine: &mut RelationEngine, model: &ClusterModel) -> Result<(), crate::error::RelationError> {
    engine.declare_relation("selected", 2);
    engine.declare_relation("selected_by_any", 1);
    engine.declare_relation("selected_by_none", 1);
    engine.declare_relation("selected_ingress", 2);
    engine.declare_relation("selected_egress", 2);
    engine.declare_relation("selected_by_any_ingress", 1);
    engine.declare_relation("selected_by_none_ingress", 1);
    engine.declare_relation("selected_by_any_egress", 1);
    engine.declare_relation("selected_by_none_egress", 1);

    let pod_labels = crate::label_index::LabelIndex::for_workloads(model);
    let ns_labels = crate::label_index::LabelIndex::for_namespaces(model);
    let ctx = crate::selector::SelectorContext::new(model, &pod_labels, &ns_labels);

    for q in model.policy_indices() {
        let policy = model.policy(q);
        let Some(home) = model.policy_namespace_index(policy) else {
            continue;
        };
        let scope = ctx.pods_in_namespace(home);
        let matched = ctx.evaluate_pod_selector(&policy.pod_selector, scope);
        for pod in matched.iter_set() {
            engine.add_fact("selected", vec![pod as Value, q.0 as Value]);
        }
    }

    engine.add_rule(Rule::new(
        Atom::new("selected_by_any", vec![var("p")]),
        vec![BodyLiteral::Pos(Atom::new("selected", vec![var("p"), var("q")]))],
    ))?;
    engine.add_rule(Rule::new(
        Atom::new("selected_by_none", vec![var("p")]),
        vec![
            BodyLiteral::Pos(Atom::new("is_pod", vec![var("p")])),
            BodyLiteral::Neg(Atom::new("selected_by_any", vec![var("p")])),
        ],
    ))?;

    // Same facts, narrowed to the policies that actually carry each
    // direction — the two defaults in `compile_admission_rules` must never
    // be driven by the joint "selected by something" event above.
    engine.add_rule(Rule::new(
        Atom::new("selected_ingress", vec![var("p"), var("q")]),
        vec![
            BodyLiteral::Pos(Atom::new("selected", vec![var("p"), var("q")])),
            BodyLiteral::Pos(Atom::new("ingress_policy", vec![var("q")])),
        ],
    ))?;
    engine.add_rule(Rule::new(
        Atom::new("selected_egress", vec![var("p"), var("q")]),
        vec![
            BodyLiteral::Pos(Atom::new("selected", vec![var("p"), var("q")])),
            BodyLiteral::Pos(Atom::new("egress_policy", vec![var("q")])),
        ],
    ))?;
    engine.add_rule(Rule::new(
        Atom::new("selected_by_any_ingress", vec![var("p")]),
        vec![BodyLiteral::Pos(Atom::new("selected_ingress", vec![var("p"), var("q")]))],
    ))?;
    engine.add_rule(Rule::new(
        Atom::new("selected_by_none_ingress", vec![var("p")]),
        vec![
            BodyLiteral::Pos(Atom::new("is_pod", vec![var("p")])),
            BodyLiteral::Neg(Atom::new("selected_by_any_ingress", vec![var("p")])),
        ],
    ))?;
    engine.add_rule(Rule::new(
        Atom::new("selected_by_any_egress", vec![var("p")]),
        vec![BodyLiteral::Pos(Atom::new("selected_egress", vec![var("p"), var("q")]))],
    ))?;
    engine.add_rule(Rule::new(
        Atom::new("selected_by_none_egress", vec![var("p")]),
        vec![
            BodyLiteral::Pos(Atom::new("is_pod", vec![var("p")])),
            BodyLiteral::Neg(Atom::new("selected_by_any_egress", vec![var("p")])),
        ],
    ))?;
    Ok(())
}

/// Peer-admission facts and rules for both directions, plus the derived
/// `ingress_ok`/`egress_ok`/`edge`/`path` relations. Shared by the
/// single-pass and grounded compile paths via the `permissive` flag — when
/// `false`, `ingress_ok`/`egress_ok` reduce to exactly what
/// `ingress_allow`/`egress_allow` grant, no negation involved.
fn declare_admission(engine: &mut RelationEngine, model: &ClusterModel, config: EngineConfig) -> Result<(), crate::error::RelationError> {
    compile_peers(engine, model)?;
    compile_admission_rules(engine, config.check_select_by_no_policy)?;
    Ok(())
}

/// The ground-default-pod optimization: evaluate once to materialize
/// `selected_by_none_ingress`/`selected_by_none_egress` as ground facts,
/// then compile the admission rules a second time without ever needing the
/// negation again — `ingress_ok`/`egress_ok` become a plain union of two
/// positive alternatives. `default_admit_egress` is always populated:
/// egress's default-admit is unconditional, not gated by
/// `check_select_by_no_policy` (see DESIGN.md).
fn compile_grounded(engine: &mut RelationEngine, model: &ClusterModel, config: EngineConfig) -> Result<(), crate::error::RelationError> {
    engine.evaluate()?;

    engine.declare_relation("default_admit_ingress", 1);
    engine.declare_relation("default_admit_egress", 1);

    if config.check_select_by_no_policy {
        let unselected_ingress: Vec<Value> =
            engine.query("selected_by_none_ingress").into_iter().map(|t| t[0]).collect();
        for pod in unselected_ingress {
            engine.add_fact("default_admit_ingress", vec![pod]);
        }
    }
    let unselected_egress: Vec<Value> = engine.query("selected_by_none_egress").into_iter().map(|t| t[0]).collect();
    for pod in unselected_egress {
        engine.add_fact("default_admit_egress", vec![pod]);
    }

    compile_peers(engine, model)?;

    engine.add_rule(Rule::new(
        Atom::new("ingress_ok", vec![var("src"), var("dst")]),
        vec![
            BodyLiteral::Pos(Atom::new("is_pod", vec![var("src")])),
            BodyLiteral::Pos(Atom::new("ingress_allow", vec![var("q"), var("src")])),
            BodyLiteral::Pos(Atom::new("selected", vec![var("dst"), var("q")])),
        ],
    ))?;
    engine.add_rule(Rule::new(
        Atom::new("egress_ok", vec![var("src"), var("dst")]),
        vec![
            BodyLiteral::Pos(Atom::new("is_pod", vec![var("dst")])),
            BodyLiteral::Pos(Atom::new("egress_allow", vec![var("q"), var("dst")])),
            BodyLiteral::Pos(Atom::new("selected", vec![var("src"), var("q")])),
        ],
    ))?;
    if config.check_select_by_no_policy {
        engine.add_rule(Rule::new(
            Atom::new("ingress_ok", vec![var("src"), var("dst")]),
            vec![
                BodyLiteral::Pos(Atom::new("is_pod", vec![var("src")])),
                BodyLiteral::Pos(Atom::new("default_admit_ingress", vec![var("dst")])),
            ],
        ))?;
    }
    engine.add_rule(Rule::new(
        Atom::new("egress_ok", vec![var("src"), var("dst")]),
        vec![
            BodyLiteral::Pos(Atom::new("is_pod", vec![var("dst")])),
            BodyLiteral::Pos(Atom::new("default_admit_egress", vec![var("src")])),
        ],
    ))?;
    compile_edge_and_path(engine)?;
    Ok(())
}

/// `ingress_allow(policy, src)` / `egress_allow(policy, dst)`: one fact per
/// `(policy, admitted peer)` pair, computed through the same peer evaluator
/// the bitmap engine uses, for the same reason `selected` is computed that
/// way rather than compiled into body literals.
fn compile_peers(engine: &mut RelationEngine, model: &ClusterModel) -> Result<(), crate::error::RelationError> {
    engine.declare_relation("ingress_allow", 2);
    engine.declare_relation("egress_allow", 2);

    let pod_labels = crate::label_index::LabelIndex::for_workloads(model);
    let ns_labels = crate::label_index::LabelIndex::for_namespaces(model);
    let ctx = crate::selector::SelectorContext::new(model, &pod_labels, &ns_labels);

    for q in model.policy_indices() {
        let policy = model.policy(q);
        let Some(home) = model.policy_namespace_index(policy) else {
            continue;
        };
        let types = policy.effective_types();
        if types.ingress {
            add_direction_facts(engine, "ingress_allow", q, &ctx, home, &policy.ingress);
        }
        if types.egress {
            add_direction_facts(engine, "egress_allow", q, &ctx, home, &policy.egress);
        }
    }
    Ok(())
}

fn add_direction_facts(
    engine: &mut RelationEngine,
    relation: &str,
    policy: PolicyIndex,
    ctx: &crate::selector::SelectorContext<'_>,
    home: crate::model::NamespaceIndex,
    rules: &[crate::model::Rule],
) {
    for rule in rules {
        let admitted = ctx.evaluate_peers(home, rule.peers.as_deref());
        for peer in admitted.iter_set() {
            engine.add_fact(relation, vec![policy.0 as Value, peer as Value]);
        }
    }
}

/// `ingress_ok`/`egress_ok`: what `selected`+`*_allow` grant directly, plus
/// the unselected-workload default-allow rule for each direction.
/// `ingress_ok`'s default alternative is gated by `permissive`
/// (`check_select_by_no_policy`); `egress_ok`'s is unconditional — a
/// workload no egress-type policy selects can always initiate traffic,
/// regardless of that flag (see DESIGN.md).
fn compile_admission_rules(engine: &mut RelationEngine, permissive: bool) -> Result<(), crate::error::RelationError> {
    engine.add_rule(Rule::new(
        Atom::new("ingress_ok", vec![var("src"), var("dst")]),
        vec![
            BodyLiteral::Pos(Atom::new("is_pod", vec![var("src")])),
            BodyLiteral::Pos(Atom::new("ingress_allow", vec![var("q"), var("src")])),
            BodyLiteral::Pos(Atom::new("selected", vec![var("dst"), var("q")])),
        ],
    ))?;
    engine.add_rule(Rule::new(
        Atom::new("egress_ok", vec![var("src"), var("dst")]),
        vec![
            BodyLiteral::Pos(Atom::new("is_pod", vec![var("dst")])),
            BodyLiteral::Pos(Atom::new("egress_allow", vec![var("q"), var("dst")])),
            BodyLiteral::Pos(Atom::new("selected", vec![var("src"), var("q")])),
        ],
    ))?;
    if permissive {
        engine.add_rule(Rule::new(
            Atom::new("ingress_ok", vec![var("src"), var("dst")]),
            vec![
                BodyLiteral::Pos(Atom::new("is_pod", vec![var("src")])),
                BodyLiteral::Pos(Atom::new("selected_by_none_ingress", vec![var("dst")])),
            ],
        ))?;
    }
    engine.add_rule(Rule::new(
        Atom::new("egress_ok", vec![var("src"), var("dst")]),
        vec![
            BodyLiteral::Pos(Atom::new("is_pod", vec![var("dst")])),
            BodyLiteral::Pos(Atom::new("selected_by_none_egress", vec![var("src")])),
        ],
    ))?;
    compile_edge_and_path(engine)?;
    Ok(())
}

fn compile_edge_and_path(engine: &mut RelationEngine) -> Result<(), crate::error::RelationError> {
    engine.add_rule(Rule::new(
        Atom::new("edge", vec![var("src"), var("dst")]),
        vec![
            BodyLiteral::Pos(Atom::new("ingress_ok", vec![var("src"), var("dst")])),
            BodyLiteral::Pos(Atom::new("egress_ok", vec![var("src"), var("dst")])),
        ],
    ))?;
    engine.add_rule(Rule::new(
        Atom::new("path", vec![var("x"), var("y")]),
        vec![BodyLiteral::Pos(Atom::new("edge", vec![var("x"), var("y")]))],
    ))?;
    engine.add_rule(Rule::new(
        Atom::new("path", vec![var("x"), var("z")]),
        vec![
            BodyLiteral::Pos(Atom::new("edge", vec![var("x"), var("y")])),
            BodyLiteral::Pos(Atom::new("edge", vec![var("y"), var("z")])),
        ],
    ))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Namespace, Policy, Rule as ModelRule, Workload};

    fn two_pod_model(ingress: Vec<ModelRule>, permissive: bool) -> (ClusterModel, EngineConfig) {
        let model = ClusterModel::build(
            vec![
                Workload::new("a", "ns").with_label("role", "client"),
                Workload::new("b", "ns").with_label("role", "server"),
            ],
            vec![Namespace::new("ns")],
            vec![Policy {
                name: "p".into(),
                namespace: "ns".into(),
                pod_selector: LabelSelector::matching_label("role", "server"),
                ingress,
                egress: vec![],
                policy_types: None,
            }],
        );
        (model, EngineConfig::default().with_permissive_default(permissive))
    }

    #[test]
    fn restrictive_default_blocks_selected_pod_without_matching_rule() {
        let (model, config) = two_pod_model(vec![ModelRule::allow_none()], false);
        let engine = compile(&model, config).unwrap();
        assert!(!engine.contains("edge", &[0, 1]));
    }

    #[test]
    fn explicit_peer_allows_admitted_traffic() {
        let (model, config) = two_pod_model(
            vec![ModelRule::allowing(vec![Peer::PodSelector(LabelSelector::matching_label("role", "client"))])],
            false,
        );
        let engine = compile(&model, config).unwrap();
        assert!(engine.contains("edge", &[0, 1]));
    }

    #[test]
    fn ingress_only_policy_leaves_egress_ok_unconditionally_open() {
        // b is selected by an ingress-only policy and restrictive defaults
        // are in effect; egress_ok must still hold for b regardless, since
        // no egress-type policy ever selects it.
        let (model, config) = two_pod_model(vec![ModelRule::allow_none()], false);
        let engine = compile(&model, config).unwrap();
        assert!(engine.contains("egress_ok", &[1, 0]));
        assert!(!engine.contains("ingress_ok", &[0, 1]));
    }

    #[test]
    fn self_ingress_flag_forces_edge_diagonal() {
        let (model, config) = two_pod_model(vec![ModelRule::allow_none()], false);
        let engine = compile(&model, config.with_self_ingress(true)).unwrap();
        assert!(engine.contains("edge", &[0, 0]));
        assert!(engine.contains("edge", &[1, 1]));
    }

    #[test]
    fn permissive_default_admits_unselected_workloads() {
        let model = ClusterModel::build(
            vec![Workload::new("a", "ns"), Workload::new("b", "ns")],
            vec![Namespace::new("ns")],
            vec![],
        );
        let config = EngineConfig::default().with_permissive_default(true);
        let engine = compile(&model, config).unwrap();
        assert!(engine.contains("edge", &[0, 1]));
        assert!(engine.contains("edge", &[1, 0]));
    }

    #[test]
    fn grounded_compile_matches_ungrounded_for_permissive_case() {
        let (model, config) = two_pod_model(vec![ModelRule::allow_none()], true);
        let grounded = compile(&model, config.with_ground_default_pod(true)).unwrap();
        let ungrounded = compile(&model, config).unwrap();
        assert_eq!(grounded.query("edge"), ungrounded.query("edge"));
    }

    #[test]
    fn not_in_selector_excludes_via_key_existence() {
        let model = ClusterModel::build(
            vec![
                Workload::new("a", "ns").with_label("tier", "front"),
                Workload::new("b", "ns"),
            ],
            vec![Namespace::new("ns")],
            vec![Policy {
                name: "p".into(),
                namespace: "ns".into(),
                pod_selector: LabelSelector {
                    match_labels: Default::default(),
                    match_expressions: vec![SelectorClause::NotIn {
                        key: "tier".into(),
                        values: vec!["front".into()],
                    }],
                },
                ingress: vec![ModelRule::allow_any()],
                egress: vec![],
                policy_types: None,
            }],
        );
        let engine = compile(&model, EngineConfig::default()).unwrap();
        assert!(!engine.contains("selected", &[0, 0]));
        assert!(engine.contains("selected", &[1, 0]));
    }

    #[test]
    fn unknown_policy_namespace_contributes_no_admissions() {
        let model = ClusterModel::build(
            vec![Workload::new("a", "ns")],
            vec![Namespace::new("ns")],
            vec![Policy {
                name: "p".into(),
                namespace: "ghost".into(),
                pod_selector: LabelSelector::default(),
                ingress: vec![ModelRule::allow_any()],
                egress: vec![],
                policy_types: None,
            }],
        );
        let engine = compile(&model, EngineConfig::default()).unwrap();
        assert!(engine.query("selected").is_empty());
    }

    #[test]
    fn interner_assigns_stable_ids_to_same_pair() {
        let mut interner = Interner::default();
        let first = interner.intern("role", "db");
        let second = interner.intern("role", "db");
        assert_eq!(first, second);
        let third = interner.intern("role", "web");
        assert_ne!(first, third);
    }

    #[test]
    fn const_and_var_helpers_build_expected_terms() {
        assert_eq!(var("x"), Term::Var("x".into()));
        assert_eq!(con(3), Term::Const(3));
    }
}
