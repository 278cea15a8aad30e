//! The single `kgs` command: list identities, or reconcile/prune a repository.

use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::info_span;

use kgs_cluster::Tools;
use kgs_loader::load_repository;
use kgs_sync::Pipeline;

use crate::report::{self, RunMeta};
use crate::Cli;

pub fn run(cli: &Cli) -> Result<ExitCode> {
    if cli.list_id {
        return list_ids(cli);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    runtime.block_on(reconcile(cli))
}

fn list_ids(cli: &Cli) -> Result<ExitCode> {
    let loaded = load_repository(&cli.repo)
        .with_context(|| format!("failed to load repository {}", cli.repo.display()))?;
    for id in loaded.ids() {
        println!("{id}");
    }
    Ok(ExitCode::SUCCESS)
}

async fn reconcile(cli: &Cli) -> Result<ExitCode> {
    let tools = Tools::new(&cli.tool_config());
    tools
        .kubectl
        .version()
        .await
        .context("cluster is not reachable; check kubectl configuration")?;

    let meta = RunMeta {
        started_at: Utc::now(),
        repo: cli.repo.display().to_string(),
        mode: if cli.clean { "clean" } else { "apply" },
        dry_run: cli.dry_run,
    };
    let span = info_span!("run", repo = %meta.repo, mode = meta.mode, dry_run = meta.dry_run);
    let pipeline = Pipeline::new(tools, cli.options(), span);

    let outcome = pipeline
        .run(&cli.repo)
        .await
        .with_context(|| format!("failed to reconcile {}", cli.repo.display()))?;

    if cli.json {
        report::print_json(&meta, &outcome)?;
    } else {
        report::print_table(&meta, &outcome);
    }

    Ok(if outcome.has_errors() {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}
