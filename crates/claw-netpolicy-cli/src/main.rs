//! `netpolicy` binary entrypoint.
//!
//! Single-shot CLI: loads a directory of serialized workloads, namespaces,
//! and policies (§6), builds both engines, runs every §4.7 diagnostic, and
//! prints the result as deterministic, sorted JSON.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use claw_netpolicy::{build_engines, loader, ClusterModel, EngineConfig};

mod error;
mod report;

use error::CliError;
use report::Report;

/// netpolicy - network-policy reachability diagnostics
///
/// Loads `pods.json`, `namespaces.json`, and `policies.json` from `DIR`,
/// builds the reachability matrix and relation engine, and prints every
/// diagnostic as JSON.
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(name = "netpolicy")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Directory containing pods.json, namespaces.json, and policies.json.
    #[arg(value_name = "DIR")]
    pub dir: PathBuf,

    /// Force self-traffic: M[i][i] = 1 for every workload.
    #[arg(long, default_value_t = true)]
    pub self_ingress: bool,

    /// Disable forced self-traffic (overrides `--self-ingress`).
    #[arg(long, default_value_t = false, conflicts_with = "self_ingress")]
    pub no_self_ingress: bool,

    /// Permissive default: a workload selected by no policy stays fully
    /// reachable, rather than fully isolated.
    #[arg(long, default_value_t = false)]
    pub permissive_default: bool,

    /// Precompute the transpose matrix for O(1) column access.
    #[arg(long, default_value_t = false)]
    pub transpose: bool,

    /// Enable the ground-default-pod optimization in the relation engine.
    #[arg(long, default_value_t = false)]
    pub ground_default_pod: bool,

    /// Workload name to use for the system-isolation diagnostic.
    #[arg(long, env = "NETPOLICY_SYSTEM")]
    pub system: Option<String>,

    /// Label key used by the cross-tenant diagnostic.
    #[arg(long, default_value = "app")]
    pub tenant_label: String,

    /// Enable verbose logging.
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl Cli {
    /// Resolve the CLI flags into an [`EngineConfig`].
    #[must_use]
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig::default()
            .with_self_ingress(self.self_ingress && !self.no_self_ingress)
            .with_permissive_default(self.permissive_default)
            .with_transpose(self.transpose)
            .with_ground_default_pod(self.ground_default_pod)
    }
}

/// Initialize tracing/logging based on verbosity, matching clawnode's own
/// filter-by-verbosity convention.
fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("netpolicy=debug,info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("netpolicy=info,warn"))
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_system(model: &ClusterModel, name: &str) -> Result<claw_netpolicy::PodIndex> {
    model
        .pod_indices()
        .find(|&idx| model.workload(idx).name == name)
        .ok_or_else(|| CliError::UnknownSystemWorkload(name.to_string()).into())
}

fn run(cli: &Cli) -> Result<Report> {
    info!(dir = %cli.dir.display(), "loading cluster snapshot");
    let model = loader::load_dir(&cli.dir)
        .with_context(|| format!("failed to load cluster snapshot from {}", cli.dir.display()))?;

    let system = cli.system.as_deref().map(|name| resolve_system(&model, name)).transpose()?;

    let config = cli.engine_config();
    let (matrix, engine) = build_engines(&model, config).context("failed to build network-policy engines")?;

    Ok(Report::build(&model, &matrix, &engine, cli, system))
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(report) => match serde_json::to_writer_pretty(std::io::stdout().lock(), &report) {
            Ok(()) => {
                println!();
                ExitCode::SUCCESS
            }
            Err(e) => {
                eprintln!("netpolicy: failed to write output: {e}");
                ExitCode::FAILURE
            }
        },
        Err(e) => {
            eprintln!("netpolicy: {e:?}");
            ExitCode::FAILURE
        }
    }
}
