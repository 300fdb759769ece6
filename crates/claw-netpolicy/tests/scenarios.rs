//! End-to-end scenarios straight out of the worked examples: each test
//! builds a small [`ClusterModel`] by hand and checks the exact matrix
//! entries / diagnostic sets against both engines, the way
//! `clawnode/tests/node_integration.rs` builds a small node and asserts on
//! its observable state rather than mocking pieces of it out.

use claw_netpolicy::compiler::compile;
use claw_netpolicy::config::EngineConfig;
use claw_netpolicy::diagnostics;
use claw_netpolicy::model::{ClusterModel, LabelSelector, Namespace, Peer, Policy, PodIndex, PolicyIndex, Rule, Workload};
use claw_netpolicy::reachability;

fn ingress_policy(name: &str, ns: &str, selector: LabelSelector, rules: Vec<Rule>) -> Policy {
    Policy {
        name: name.into(),
        namespace: ns.into(),
        pod_selector: selector,
        ingress: rules,
        egress: vec![],
        policy_types: None,
    }
}

/// S1: the three-tier paper example. Five workloads, four ingress-only
/// policies; checked against every matrix entry and diagnostic value the
/// worked example names, under both engines.
#[test]
fn s1_three_tier_paper_example() {
    let workloads = vec![
        Workload::new("a", "ns").with_label("app", "alice").with_label("role", "nginx"), // 0
        Workload::new("b", "ns").with_label("app", "alice").with_label("role", "db"),    // 1
        Workload::new("c", "ns").with_label("app", "alice").with_label("role", "tomcat"), // 2
        Workload::new("d", "ns").with_label("app", "bob").with_label("role", "nginx"),   // 3
        Workload::new("e", "ns").with_label("app", "user").with_label("role", "user"),  // 4
    ];
    let policies = vec![
        ingress_policy(
            "pa",
            "ns",
            LabelSelector::matching_label("role", "db"),
            vec![Rule::allowing(vec![Peer::PodSelector(LabelSelector::matching_label("role", "nginx"))])],
        ),
        ingress_policy(
            "pb",
            "ns",
            LabelSelector::matching_label("role", "tomcat"),
            vec![Rule::allowing(vec![Peer::PodSelector(LabelSelector::matching_label("role", "user"))])],
        ),
        ingress_policy(
            "pc",
            "ns",
            LabelSelector::matching_label("role", "nginx"),
            vec![Rule::allowing(vec![Peer::PodSelector(LabelSelector::matching_label("role", "tomcat"))])],
        ),
        ingress_policy(
            "pd",
            "ns",
            LabelSelector::matching_label("role", "nginx"),
            vec![Rule::allowing(vec![Peer::PodSelector(LabelSelector::matching_label("app", "alice"))])],
        ),
    ];
    let model = ClusterModel::build(workloads, vec![Namespace::new("ns")], policies);

    let config = EngineConfig::default().with_ground_default_pod(true);
    let matrix = reachability::build(&model, config);
    let engine = compile(&model, config).unwrap();

    assert!(matrix.get(PodIndex(0), PodIndex(1)));
    assert!(matrix.get(PodIndex(2), PodIndex(0)));
    assert!(matrix.get(PodIndex(4), PodIndex(2)));
    for (i, j) in [(0, 1), (2, 0), (4, 2)] {
        assert!(
            engine.contains("edge", &[i, j]),
            "relation engine disagrees with bitmap engine on edge({i},{j})"
        );
    }

    assert!(diagnostics::all_reachable(&matrix).is_empty());
    assert_eq!(diagnostics::all_isolated(&matrix), [PodIndex(4)].into_iter().collect());

    let leaks = diagnostics::cross_tenant(&matrix, &model, "app");
    assert_eq!(leaks, [PodIndex(1), PodIndex(2), PodIndex(3)].into_iter().collect());
}

/// S2: default-deny. A single workload selected by a policy with an empty
/// ingress rule list is isolated on both column and row (the only cell
/// there is, with one workload).
#[test]
fn s2_default_deny_isolates_the_selected_workload() {
    let model = ClusterModel::build(
        vec![Workload::new("x", "ns")],
        vec![Namespace::new("ns")],
        vec![ingress_policy("p", "ns", LabelSelector::default(), vec![])],
    );

    let matrix = reachability::build(&model, EngineConfig::default().with_self_ingress(false));
    assert!(!matrix.get(PodIndex(0), PodIndex(0)));

    let with_self = reachability::build(&model, EngineConfig::default().with_self_ingress(true));
    assert!(with_self.get(PodIndex(0), PodIndex(0)));
}

/// S3: allow-all peer. An ingress rule with a single empty pod selector as
/// its one peer admits every workload in the home namespace, including the
/// selected workload itself — so the selected workload reaches itself
/// regardless of `check_self_ingress_traffic`, since the inclusion comes
/// from the peer selector, not the self-loop flag.
#[test]
fn s3_allow_all_peer_admits_every_workload_in_namespace() {
    let model = ClusterModel::build(
        vec![Workload::new("u", "ns"), Workload::new("v", "ns").with_label("role", "server")],
        vec![Namespace::new("ns")],
        vec![ingress_policy(
            "p",
            "ns",
            LabelSelector::matching_label("role", "server"),
            vec![Rule::allowing(vec![Peer::PodSelector(LabelSelector::default())])],
        )],
    );

    let matrix = reachability::build(&model, EngineConfig::default().with_self_ingress(false));
    assert!(matrix.get(PodIndex(0), PodIndex(1)));
    assert!(matrix.get(PodIndex(1), PodIndex(1)));
}

/// S4: namespace isolation. Two namespaces; an ingress policy in ns1 selects
/// all of ns1 and admits an empty pod selector (scoped to ns1, its home
/// namespace), so ns1's two pods reach each other but ns2's pod reaches
/// neither.
#[test]
fn s4_namespace_scoped_policy_does_not_leak_across_namespaces() {
    let model = ClusterModel::build(
        vec![
            Workload::new("p", "ns1"), // 0
            Workload::new("q", "ns1"), // 1
            Workload::new("r", "ns2"), // 2
        ],
        vec![Namespace::new("ns1"), Namespace::new("ns2")],
        vec![ingress_policy(
            "isolate-ns1",
            "ns1",
            LabelSelector::default(),
            vec![Rule::allowing(vec![Peer::PodSelector(LabelSelector::default())])],
        )],
    );

    let matrix = reachability::build(&model, EngineConfig::default());
    assert!(matrix.get(PodIndex(0), PodIndex(1)));
    assert!(matrix.get(PodIndex(1), PodIndex(0)));
    assert!(!matrix.get(PodIndex(2), PodIndex(0)));
    assert!(!matrix.get(PodIndex(2), PodIndex(1)));
}

/// S5: shadow. `pb`'s selection (`role=db, env=prod`) is a strict subset of
/// `pa`'s (`role=db`), and both admit the same peers, so `pb` is shadowed by
/// `pa` — `shadow = {(pb, pa)}` and not the reverse.
#[test]
fn s5_narrower_selector_is_shadowed_by_wider_one() {
    let model = ClusterModel::build(
        vec![
            Workload::new("db-prod", "ns").with_label("role", "db").with_label("env", "prod"),
            Workload::new("db-dev", "ns").with_label("role", "db").with_label("env", "dev"),
            Workload::new("web", "ns").with_label("role", "web"),
        ],
        vec![Namespace::new("ns")],
        vec![
            ingress_policy(
                "pa",
                "ns",
                LabelSelector::matching_label("role", "db"),
                vec![Rule::allowing(vec![Peer::PodSelector(LabelSelector::matching_label("role", "web"))])],
            ),
            ingress_policy(
                "pb",
                "ns",
                LabelSelector {
                    match_labels: [("role".to_string(), "db".to_string()), ("env".to_string(), "prod".to_string())]
                        .into_iter()
                        .collect(),
                    match_expressions: vec![],
                },
                vec![Rule::allowing(vec![Peer::PodSelector(LabelSelector::matching_label("role", "web"))])],
            ),
        ],
    );

    let engine = compile(&model, EngineConfig::default()).unwrap();
    let shadow = diagnostics::policy_shadow(&engine, model.policy_count());
    assert!(shadow.contains(&(PolicyIndex(1), PolicyIndex(0))));
    assert!(!shadow.contains(&(PolicyIndex(0), PolicyIndex(1))));
}

/// S6: conflict. `pa` and `pb` select and admit fully disjoint workload
/// sets on every axis, so both orderings show up in `policy_conflict`.
#[test]
fn s6_disjoint_policies_conflict_both_ways() {
    let model = ClusterModel::build(
        vec![
            Workload::new("front", "ns").with_label("tier", "front").with_label("app", "a"),
            Workload::new("back", "ns").with_label("tier", "back").with_label("app", "b"),
        ],
        vec![Namespace::new("ns")],
        vec![
            ingress_policy(
                "pa",
                "ns",
                LabelSelector::matching_label("tier", "front"),
                vec![Rule::allowing(vec![Peer::PodSelector(LabelSelector::matching_label("app", "a"))])],
            ),
            ingress_policy(
                "pb",
                "ns",
                LabelSelector::matching_label("tier", "back"),
                vec![Rule::allowing(vec![Peer::PodSelector(LabelSelector::matching_label("app", "b"))])],
            ),
        ],
    );

    let engine = compile(&model, EngineConfig::default()).unwrap();
    let conflict = diagnostics::policy_conflict(&engine, model.policy_count());
    assert!(conflict.contains(&(PolicyIndex(0), PolicyIndex(1))));
    assert!(conflict.contains(&(PolicyIndex(1), PolicyIndex(0))));
}
