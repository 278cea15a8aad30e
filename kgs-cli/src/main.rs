//! kgs — reconcile a directory of manifests and chart releases into a cluster.
//!
//! # Usage
//!
//! ```text
//! kgs <repo> [--dry-run] [--sequential] [--jobs <n>] [--json]
//! kgs <repo> --clean [--dry-run]
//! kgs <repo> --list-id
//! ```
//!
//! Exit status: 0 when every manifest finished without `error`, 1 when at
//! least one did, 2 when the run could not start (load, ordering or
//! cluster-reachability failure).

mod reconcile;
mod report;

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use colored::Colorize;

use kgs_cluster::ToolConfig;
use kgs_sync::{DependencyFailurePolicy, ReconcileOptions};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "kgs",
    version,
    about = "Drive a cluster toward the manifests and releases in a directory",
    long_about = None,
)]
struct Cli {
    /// Repository root to reconcile.
    repo: PathBuf,

    /// Delete managed objects that no manifest declares instead of applying.
    #[arg(long)]
    clean: bool,

    /// Report what would change without invoking any mutating command.
    #[arg(long)]
    dry_run: bool,

    /// Print the identity of every manifest and exit.
    #[arg(long)]
    list_id: bool,

    /// Reconcile one manifest at a time in dependency order.
    #[arg(long)]
    sequential: bool,

    /// Maximum reconciles in flight.
    #[arg(long, env = "KGS_JOBS", default_value_t = kgs_sync::pipeline::DEFAULT_JOBS)]
    jobs: usize,

    /// What to do with manifests whose prerequisite failed: skip or proceed.
    #[arg(long, env = "KGS_ON_DEPENDENCY_FAILURE", default_value_t = DependencyFailurePolicy::Skip)]
    on_dependency_failure: DependencyFailurePolicy,

    /// Cluster-apply tool.
    #[arg(long, env = "KGS_KUBECTL", default_value = kgs_cluster::config::DEFAULT_KUBECTL)]
    kubectl: String,

    /// Release tool.
    #[arg(long, env = "KGS_HELM", default_value = kgs_cluster::config::DEFAULT_HELM)]
    helm: String,

    /// Seconds any single external command may run; 0 disables the limit.
    #[arg(long, env = "KGS_COMMAND_TIMEOUT", default_value_t = 300)]
    command_timeout: u64,

    /// Emit the report as JSON.
    #[arg(long)]
    json: bool,

    /// Debug logging (overrides KGS_LOG_LEVEL).
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn options(&self) -> ReconcileOptions {
        ReconcileOptions {
            clean: self.clean,
            dry_run: self.dry_run,
            sequential: self.sequential,
            jobs: self.jobs,
            on_dependency_failure: self.on_dependency_failure,
        }
    }

    fn tool_config(&self) -> ToolConfig {
        ToolConfig {
            kubectl: self.kubectl.clone(),
            helm: self.helm.clone(),
            timeout: (self.command_timeout > 0).then(|| Duration::from_secs(self.command_timeout)),
        }
    }
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match reconcile::run(&cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::from(2)
        }
    }
}

/// Logs go to stderr; stdout carries only the report.
fn init_tracing(verbose: bool) {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_env("KGS_LOG_LEVEL")
            .or_else(|_| EnvFilter::try_from_default_env())
            .unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
