//! The label index (C3): precomputed `key -> bitset` and `(key, value) ->
//! bitset` tables built once from a [`ClusterModel`], consulted by the
//! selector evaluator (C4) on every selector clause.
//!
//! Built for both workloads (width `N`) and namespaces (width `K`); a query
//! against an unknown key returns the empty bitset rather than erroring,
//! per the invariant that a missing key simply fails to restrict anything.

use std::collections::HashMap;

use crate::bitset::Bitset;
use crate::model::{ClusterModel, Labels};

/// `key -> {entities declaring key}` and `(key, value) -> {entities with
/// that value}`, over a fixed-width entity space.
#[derive(Debug, Clone)]
pub struct LabelIndex {
    width: usize,
    has_key: HashMap<String, Bitset>,
    has_kv: HashMap<(String, String), Bitset>,
    empty: Bitset,
}

impl LabelIndex {
    /// Build an index of `width` entities from their label maps, in index
    /// order (the `i`-th `Labels` belongs to entity index `i`).
    #[must_use]
    pub fn build<'a>(width: usize, labels: impl Iterator<Item = &'a Labels>) -> Self {
        let mut has_key: HashMap<String, Bitset> = HashMap::new();
        let mut has_kv: HashMap<(String, String), Bitset> = HashMap::new();

        for (i, entity_labels) in labels.enumerate() {
            for (k, v) in entity_labels {
                has_key
                    .entry(k.clone())
                    .or_insert_with(|| Bitset::new(width))
                    .set(i);
                has_kv
                    .entry((k.clone(), v.clone()))
                    .or_insert_with(|| Bitset::new(width))
                    .set(i);
            }
        }

        Self {
            width,
            has_key,
            has_kv,
            empty: Bitset::new(width),
        }
    }

    /// Build the index directly from a cluster model's workloads.
    #[must_use]
    pub fn for_workloads(model: &ClusterModel) -> Self {
        Self::build(model.pod_count(), model.workloads().iter().map(|w| &w.labels))
    }

    /// Build the index directly from a cluster model's namespaces.
    #[must_use]
    pub fn for_namespaces(model: &ClusterModel) -> Self {
        Self::build(
            model.namespace_count(),
            model.namespaces().iter().map(|n| &n.labels),
        )
    }

    /// Width of the entity space this index covers.
    #[must_use]
    pub const fn width(&self) -> usize {
        self.width
    }

    /// Bitset of entities declaring `key` (any value). Empty if `key` is
    /// unknown.
    #[must_use]
    pub fn has_key(&self, key: &str) -> &Bitset {
        self.has_key.get(key).unwrap_or(&self.empty)
    }

    /// Bitset of entities with `labels[key] == value`. Empty if the pair is
    /// unknown.
    #[must_use]
    pub fn has_kv(&self, key: &str, value: &str) -> &Bitset {
        self.has_kv
            .get(&(key.to_string(), value.to_string()))
            .unwrap_or(&self.empty)
    }

    /// An all-zero bitset sized to this index's width, useful as a
    /// starting accumulator.
    #[must_use]
    pub fn empty_bitset(&self) -> Bitset {
        Bitset::new(self.width)
    }

    /// An all-one bitset sized to this index's width.
    #[must_use]
    pub fn full_bitset(&self) -> Bitset {
        Bitset::new_all_set(self.width)
    }
}
