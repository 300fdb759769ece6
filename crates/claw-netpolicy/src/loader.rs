//! Directory-based JSON loader (A4): the one convenience loader the core
//! ships for its own CLI and its own integration tests, reading the §6
//! three-file contract from a directory — `pods.json`, `namespaces.json`,
//! `policies.json`, each a plain JSON array.
//!
//! Deserialization alone rejects a large class of malformed input for free:
//! [`crate::model::SelectorClause`] is internally tagged on `operator`, so a
//! `matchExpressions` entry with a value list but a missing or unrecognized
//! operator fails at `serde_json::from_str` rather than being silently
//! misinterpreted.

use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::LoaderError;
use crate::model::{ClusterModel, Namespace, Policy, Workload};

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, LoaderError> {
    let text = std::fs::read_to_string(path).map_err(|source| LoaderError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&text).map_err(|source| LoaderError::Parse {
        path: path.to_path_buf(),
        source,
    })
}

/// Load a [`ClusterModel`] from a directory containing `pods.json`,
/// `namespaces.json`, and `policies.json`.
///
/// # Errors
///
/// Returns [`LoaderError`] if any of the three files is missing, unreadable,
/// or fails to parse as the expected JSON array. A policy naming an unknown
/// namespace is not an error here — it is recorded on the resulting
/// [`ClusterModel`] as a [`crate::error::ModelWarning`] instead (§7).
pub fn load_dir(dir: &Path) -> Result<ClusterModel, LoaderError> {
    let workloads: Vec<Workload> = read_json(&pods_path(dir))?;
    let namespaces: Vec<Namespace> = read_json(&namespaces_path(dir))?;
    let policies: Vec<Policy> = read_json(&policies_path(dir))?;
    Ok(ClusterModel::build(workloads, namespaces, policies))
}

/// Path to the pods file within a snapshot directory.
#[must_use]
pub fn pods_path(dir: &Path) -> PathBuf {
    dir.join("pods.json")
}

/// Path to the namespaces file within a snapshot directory.
#[must_use]
pub fn namespaces_path(dir: &Path) -> PathBuf {
    dir.join("namespaces.json")
}

/// Path to the policies file within a snapshot directory.
#[must_use]
pub fn policies_path(dir: &Path) -> PathBuf {
    dir.join("policies.json")
}
