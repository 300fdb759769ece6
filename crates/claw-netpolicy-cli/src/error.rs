//! CLI-specific error types layered under the `anyhow` boundary the binary
//! uses for everything else (§7): these are the failures that are specific
//! to the binary rather than to the core crate it drives.

use thiserror::Error;

/// Failures raised by the `netpolicy` binary itself, as opposed to
/// [`claw_netpolicy::LoaderError`] or [`claw_netpolicy::RelationError`].
#[derive(Debug, Error)]
pub enum CliError {
    /// `--system` named a workload absent from the loaded snapshot.
    #[error("unknown system workload '{0}' (not present in pods.json)")]
    UnknownSystemWorkload(String),
}
