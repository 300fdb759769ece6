//! Error types surfaced by the network-policy core.
//!
//! Most per-policy problems degrade gracefully (the offending policy simply
//! contributes nothing, logged via `tracing::warn!`); the types here are for
//! the few failures that abort construction entirely.

use std::path::PathBuf;

use thiserror::Error;

/// A recoverable problem noticed while building the model or compiling a
/// policy. Collected rather than returned, since a single bad policy must
/// not prevent the rest of the model from evaluating.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelWarning {
    /// A policy's home namespace does not exist in the namespace set.
    UnknownNamespace {
        /// Name of the offending policy.
        policy: String,
        /// The namespace name that could not be resolved.
        namespace: String,
    },
}

impl std::fmt::Display for ModelWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownNamespace { policy, namespace } => write!(
                f,
                "policy '{policy}' references unknown namespace '{namespace}'; policy contributes no admissions"
            ),
        }
    }
}

/// Errors that can abort evaluation of the relation engine (C6).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RelationError {
    /// The rule set's negation edges form a cycle, so no valid stratification exists.
    #[error("rule set is not stratifiable: negation cycle through predicate '{predicate}'")]
    Unstratified {
        /// One predicate name participating in the offending cycle.
        predicate: String,
    },

    /// A rule references an unregistered relation name.
    #[error("rule references unknown relation '{relation}'")]
    UnknownRelation {
        /// The relation name that was never registered.
        relation: String,
    },

    /// A rule's head (or a negated body atom) uses a variable that never
    /// appears in a positive body atom.
    #[error("variable '{variable}' in rule for '{head}' is not range-restricted")]
    UnboundVariable {
        /// Head predicate of the offending rule.
        head: String,
        /// The unbound variable's name.
        variable: String,
    },
}

/// Errors that abort [`crate::loader::load_dir`] entirely — unlike
/// [`ModelWarning`], nothing about these is recoverable per-policy, since
/// without a readable, well-formed file there is no model to degrade.
#[derive(Debug, Error)]
pub enum LoaderError {
    /// One of the three expected files could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// The file that could not be read.
        path: PathBuf,
        /// Underlying IO failure.
        #[source]
        source: std::io::Error,
    },

    /// One of the three expected files did not parse as the JSON array it
    /// was expected to be (including a selector clause with a value list but
    /// a missing/unknown `operator`, per §7).
    #[error("failed to parse {path} as JSON: {source}")]
    Parse {
        /// The file that failed to parse.
        path: PathBuf,
        /// Underlying `serde_json` failure.
        #[source]
        source: serde_json::Error,
    },
}
