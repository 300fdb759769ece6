//! Construction-time flags shared by both engines (§6).

/// The four flags that tune reachability evaluation. Both the bitmap engine
/// (C5) and the relation engine (C6) read the same `EngineConfig`, which is
/// how §8 invariant 2 (engine equivalence) gets to compare them directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineConfig {
    /// Force `M[i][i] = 1` for every workload `i`.
    pub check_self_ingress_traffic: bool,
    /// `false` selects the restrictive initial state (no implicit allow);
    /// `true` selects the permissive one (workloads untouched by any
    /// policy stay fully reachable).
    pub check_select_by_no_policy: bool,
    /// Precompute column access for the bitmap engine.
    pub build_transpose_matrix: bool,
    /// Enable the ground-default-pod optimization in the relation engine
    /// (only meaningful when `check_select_by_no_policy` is also set).
    pub ground_default_pod: bool,
}

impl Default for EngineConfig {
    /// Matches the worked examples in §8: self-traffic allowed, restrictive
    /// default (no implicit allow), no transpose, no grounding.
    fn default() -> Self {
        Self {
            check_self_ingress_traffic: true,
            check_select_by_no_policy: false,
            build_transpose_matrix: false,
            ground_default_pod: false,
        }
    }
}

impl EngineConfig {
    /// Builder-style setter for `check_self_ingress_traffic`.
    #[must_use]
    pub const fn with_self_ingress(mut self, value: bool) -> Self {
        self.check_self_ingress_traffic = value;
        self
    }

    /// Builder-style setter for `check_select_by_no_policy`.
    #[must_use]
    pub const fn with_permissive_default(mut self, value: bool) -> Self {
        self.check_select_by_no_policy = value;
        self
    }

    /// Builder-style setter for `build_transpose_matrix`.
    #[must_use]
    pub const fn with_transpose(mut self, value: bool) -> Self {
        self.build_transpose_matrix = value;
        self
    }

    /// Builder-style setter for `ground_default_pod`.
    #[must_use]
    pub const fn with_ground_default_pod(mut self, value: bool) -> Self {
        self.ground_default_pod = value;
        self
    }
}
