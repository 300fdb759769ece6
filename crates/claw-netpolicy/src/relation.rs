//! The relation engine (C6): a minimal Datalog-style evaluator over `u32`
//! domain values, with rules built from positive atoms, negated atoms, and
//! variable (dis)equalities, evaluated by naive bottom-up fixed point under
//! explicit stratification.
//!
//! This is the symbolic twin of [`crate::reachability`]: the policy-to-rule
//! compiler (C7) populates an engine instance with facts and rules derived
//! from the same [`crate::model::ClusterModel`] the bitmap engine reads
//! directly, and §8 invariant 2 requires the two to agree.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::error::RelationError;

/// A domain value. Wide enough for workload/namespace/policy indices and
/// interned label-value ids at the scales this crate targets.
pub type Value = u32;

/// A row in a relation.
pub type Tuple = Vec<Value>;

/// A variable or constant appearing in an atom.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Term {
    /// A named logic variable, bound by unification against stored tuples.
    Var(String),
    /// A literal domain value.
    Const(Value),
}

impl Term {
    fn resolve(&self, binding: &HashMap<String, Value>) -> Option<Value> {
        match self {
            Self::Const(c) => Some(*c),
            Self::Var(v) => binding.get(v).copied(),
        }
    }
}

/// `relation(term, term, ...)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Atom {
    /// Name of the relation this atom refers to.
    pub relation: String,
    /// Column terms, in order.
    pub terms: Vec<Term>,
}

impl Atom {
    /// Build an atom over the given relation and terms.
    pub fn new(relation: impl Into<String>, terms: Vec<Term>) -> Self {
        Self {
            relation: relation.into(),
            terms,
        }
    }
}

/// One conjunct of a rule body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BodyLiteral {
    /// A positive atom: must be satisfied by some stored tuple.
    Pos(Atom),
    /// A negated atom: must not be satisfied by any stored tuple, evaluated
    /// against the relation's extension as computed in an earlier stratum.
    Neg(Atom),
    /// Two terms must resolve to the same value.
    Eq(Term, Term),
    /// Two terms must resolve to different values.
    NotEq(Term, Term),
}

/// `head(t1, .., tk) <- body`.
///
/// Every variable in the head, and every variable under negation or in an
/// (in)equality, must also appear in some positive body atom ("range
/// restriction") — checked at [`RelationEngine::add_rule`] time so a
/// malformed rule never reaches evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rule {
    /// The tuple this rule derives when its body is satisfied.
    pub head: Atom,
    /// Conjunction of literals that must hold.
    pub body: Vec<BodyLiteral>,
}

impl Rule {
    /// Build a rule from a head and body.
    pub fn new(head: Atom, body: Vec<BodyLiteral>) -> Self {
        Self { head, body }
    }

    fn positively_bound_vars(&self) -> HashSet<&str> {
        self.body
            .iter()
            .filter_map(|lit| match lit {
                BodyLiteral::Pos(atom) => Some(atom),
                _ => None,
            })
            .flat_map(|atom| atom.terms.iter())
            .filter_map(|t| match t {
                Term::Var(v) => Some(v.as_str()),
                Term::Const(_) => None,
            })
            .collect()
    }
}

/// A minimal Datalog evaluator: named relations of fixed arity, rules with
/// stratified negation, naive bottom-up fixed-point evaluation.
///
/// Facts are added only before [`Self::evaluate`] is called; the engine does
/// not support incremental re-evaluation after new facts are added on top of
/// derived ones (not needed here — the model is a read-only snapshot).
#[derive(Debug, Clone, Default)]
pub struct RelationEngine {
    arities: HashMap<String, usize>,
    facts: HashMap<String, HashSet<Tuple>>,
    rules: Vec<Rule>,
}

impl RelationEngine {
    /// A fresh engine with no relations, facts, or rules.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a relation name with its arity. Idempotent: declaring the
    /// same name twice with the same arity is a no-op; declaring it twice
    /// with different arities is a programmer error.
    pub fn declare_relation(&mut self, name: &str, arity: usize) {
        match self.arities.get(name) {
            Some(&existing) => assert_eq!(
                existing, arity,
                "relation '{name}' redeclared with arity {arity}, was {existing}"
            ),
            None => {
                self.arities.insert(name.to_string(), arity);
                self.facts.entry(name.to_string()).or_default();
            }
        }
    }

    /// Add a ground fact. The relation must already be declared and the
    /// tuple's length must match its arity.
    pub fn add_fact(&mut self, name: &str, tuple: Tuple) {
        let arity = *self
            .arities
            .get(name)
            .unwrap_or_else(|| panic!("fact added to undeclared relation '{name}'"));
        assert_eq!(
            tuple.len(),
            arity,
            "fact for '{name}' has {} columns, expected {arity}",
            tuple.len()
        );
        self.facts.entry(name.to_string()).or_default().insert(tuple);
    }

    /// Add a rule, after checking range restriction (every head variable,
    /// and every variable under negation or in an (in)equality, is bound by
    /// a positive body atom).
    pub fn add_rule(&mut self, rule: Rule) -> Result<(), RelationError> {
        self.declare_relation(&rule.head.relation, rule.head.terms.len());
        for lit in &rule.body {
            if let BodyLiteral::Pos(atom) | BodyLiteral::Neg(atom) = lit {
                self.declare_relation(&atom.relation, atom.terms.len());
            }
        }

        let bound = rule.positively_bound_vars();

        for term in &rule.head.terms {
            if let Term::Var(v) = term {
                if !bound.contains(v.as_str()) {
                    return Err(RelationError::UnboundVariable {
                        head: rule.head.relation.clone(),
                        variable: v.clone(),
                    });
                }
            }
        }

        for lit in &rule.body {
            let terms_to_check: Vec<&Term> = match lit {
                BodyLiteral::Neg(atom) => atom.terms.iter().collect(),
                BodyLiteral::Eq(a, b) | BodyLiteral::NotEq(a, b) => vec![a, b],
                BodyLiteral::Pos(_) => Vec::new(),
            };
            for term in terms_to_check {
                if let Term::Var(v) = term {
                    if !bound.contains(v.as_str()) {
                        return Err(RelationError::UnboundVariable {
                            head: rule.head.relation.clone(),
                            variable: v.clone(),
                        });
                    }
                }
            }
        }

        self.rules.push(rule);
        Ok(())
    }

    /// Dependency edges between predicate names: `(body_predicate,
    /// head_predicate, is_negative)`, one per (rule, body-atom) pair.
    fn predicate_edges(&self) -> (HashSet<String>, Vec<(String, String, bool)>) {
        let mut preds: HashSet<String> = self.arities.keys().cloned().collect();
        let mut edges = Vec::new();
        for rule in &self.rules {
            preds.insert(rule.head.relation.clone());
            for lit in &rule.body {
                match lit {
                    BodyLiteral::Pos(atom) => {
                        preds.insert(atom.relation.clone());
                        edges.push((atom.relation.clone(), rule.head.relation.clone(), false));
                    }
                    BodyLiteral::Neg(atom) => {
                        preds.insert(atom.relation.clone());
                        edges.push((atom.relation.clone(), rule.head.relation.clone(), true));
                    }
                    BodyLiteral::Eq(..) | BodyLiteral::NotEq(..) => {}
                }
            }
        }
        (preds, edges)
    }

    /// Assign each predicate a stratum such that positive edges never
    /// decrease the stratum and negative edges strictly increase it, via
    /// Bellman-Ford-style relaxation over the predicate dependency graph.
    /// A predicate that keeps increasing past `|predicates|` relaxations
    /// sits on a cycle that crosses a negative edge, which is refused.
    fn compute_strata(&self) -> Result<HashMap<String, u32>, RelationError> {
        let (preds, edges) = self.predicate_edges();
        let mut stratum: HashMap<String, u32> = preds.iter().map(|p| (p.clone(), 0)).collect();

        for _ in 0..=preds.len() {
            let mut changed = false;
            for (from, to, negative) in &edges {
                let candidate = stratum[from] + u32::from(*negative);
                if candidate > stratum[to] {
                    stratum.insert(to.clone(), candidate);
                    changed = true;
                }
            }
            if !changed {
                return Ok(stratum);
            }
        }

        for (from, to, negative) in &edges {
            let candidate = stratum[from] + u32::from(*negative);
            if candidate > stratum[to] {
                return Err(RelationError::Unstratified { predicate: to.clone() });
            }
        }
        Ok(stratum)
    }

    /// Run the naive bottom-up fixed point: strata in ascending order, and
    /// within each stratum repeat the rule set until no new tuple is added.
    /// Refuses (without mutating any fact) if the rule set is not
    /// stratifiable.
    pub fn evaluate(&mut self) -> Result<(), RelationError> {
        let strata = self.compute_strata()?;
        let rules = self.rules.clone();
        let max_stratum = strata.values().copied().max().unwrap_or(0);

        for s in 0..=max_stratum {
            loop {
                let mut added_any = false;
                for rule in &rules {
                    if strata[&rule.head.relation] != s {
                        continue;
                    }
                    let derived = self.derive(rule);
                    let bucket = self.facts.entry(rule.head.relation.clone()).or_default();
                    for tuple in derived {
                        if bucket.insert(tuple) {
                            added_any = true;
                        }
                    }
                }
                if !added_any {
                    break;
                }
            }
        }
        Ok(())
    }

    /// All head tuples a single rule derives from the current fact base.
    fn derive(&self, rule: &Rule) -> Vec<Tuple> {
        let empty: HashSet<Tuple> = HashSet::new();
        let mut bindings: Vec<HashMap<String, Value>> = vec![HashMap::new()];

        for lit in &rule.body {
            let BodyLiteral::Pos(atom) = lit else { continue };
            let extension = self.facts.get(&atom.relation).unwrap_or(&empty);
            let mut next = Vec::with_capacity(bindings.len());
            for binding in &bindings {
                for tuple in extension {
                    if tuple.len() != atom.terms.len() {
                        continue;
                    }
                    if let Some(extended) = unify(binding, &atom.terms, tuple) {
                        next.push(extended);
                    }
                }
            }
            bindings = next;
        }

        let mut out = Vec::new();
        'bindings: for binding in bindings {
            for lit in &rule.body {
                match lit {
                    BodyLiteral::Neg(atom) => {
                        let Some(tuple): Option<Tuple> =
                            atom.terms.iter().map(|t| t.resolve(&binding)).collect()
                        else {
                            continue 'bindings;
                        };
                        if self.facts.get(&atom.relation).is_some_and(|r| r.contains(&tuple)) {
                            continue 'bindings;
                        }
                    }
                    BodyLiteral::Eq(a, b) => {
                        if a.resolve(&binding) != b.resolve(&binding) {
                            continue 'bindings;
                        }
                    }
                    BodyLiteral::NotEq(a, b) => {
                        if a.resolve(&binding) == b.resolve(&binding) {
                            continue 'bindings;
                        }
                    }
                    BodyLiteral::Pos(_) => {}
                }
            }
            let head_tuple: Option<Tuple> =
                rule.head.terms.iter().map(|t| t.resolve(&binding)).collect();
            if let Some(tuple) = head_tuple {
                out.push(tuple);
            }
        }
        out
    }

    /// All tuples currently stored for `name`, as a sorted set for
    /// deterministic iteration/output. Empty (not an error) for an unknown
    /// or never-populated relation.
    #[must_use]
    pub fn query(&self, name: &str) -> BTreeSet<Tuple> {
        self.facts.get(name).cloned().unwrap_or_default().into_iter().collect()
    }

    /// Whether `tuple` is currently a member of `name`'s extension.
    #[must_use]
    pub fn contains(&self, name: &str, tuple: &[Value]) -> bool {
        self.facts.get(name).is_some_and(|r| r.contains(tuple))
    }
}

fn unify(binding: &HashMap<String, Value>, terms: &[Term], tuple: &[Value]) -> Option<HashMap<String, Value>> {
    let mut extended = binding.clone();
    for (term, value) in terms.iter().zip(tuple) {
        match term {
            Term::Const(c) => {
                if c != value {
                    return None;
                }
            }
            Term::Var(v) => match extended.get(v) {
                Some(existing) if existing != value => return None,
                Some(_) => {}
                None => {
                    extended.insert(v.clone(), *value);
                }
            },
        }
    }
    Some(extended)
}
