//! Report rendering: a table for humans, JSON for machines.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use kgs_core::{ReconcileResult, ResultKind};
use kgs_sync::RunReport;

pub struct RunMeta {
    pub started_at: DateTime<Utc>,
    pub repo: String,
    pub mode: &'static str,
    pub dry_run: bool,
}

#[derive(Serialize)]
struct ReportJson<'a> {
    started_at: DateTime<Utc>,
    repo: &'a str,
    mode: &'a str,
    dry_run: bool,
    results: Vec<ResultJson<'a>>,
    counts: BTreeMap<String, usize>,
}

#[derive(Serialize)]
struct ResultJson<'a> {
    id: &'a str,
    #[serde(flatten)]
    result: &'a ReconcileResult,
}

#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "identity")]
    id: String,
    #[tabled(rename = "result")]
    result: String,
    #[tabled(rename = "detail")]
    detail: String,
}

pub fn print_json(meta: &RunMeta, report: &RunReport) -> Result<()> {
    let payload = ReportJson {
        started_at: meta.started_at,
        repo: &meta.repo,
        mode: meta.mode,
        dry_run: meta.dry_run,
        results: report
            .outcomes
            .iter()
            .map(|o| ResultJson {
                id: o.id.as_str(),
                result: &o.result,
            })
            .collect(),
        counts: report
            .counts()
            .into_iter()
            .map(|(kind, n)| (kind.to_string(), n))
            .collect(),
    };
    println!(
        "{}",
        serde_json::to_string_pretty(&payload).context("failed to serialize report JSON")?
    );
    Ok(())
}

pub fn print_table(meta: &RunMeta, report: &RunReport) {
    let prefix = if meta.dry_run { "[dry-run] " } else { "" };
    println!("{prefix}kgs {} | {} | {} results", meta.mode, meta.repo, report.outcomes.len());

    if report.outcomes.is_empty() {
        println!("Nothing to do.");
    } else {
        let rows: Vec<ResultRow> = report
            .outcomes
            .iter()
            .map(|o| ResultRow {
                id: o.id.to_string(),
                result: paint(o.result.kind),
                detail: detail_message(&o.result),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
    }

    let summary: Vec<String> = report
        .counts()
        .into_iter()
        .filter(|(_, n)| *n > 0)
        .map(|(kind, n)| format!("{n} {kind}"))
        .collect();
    if !summary.is_empty() {
        println!("{prefix}{}", summary.join(", "));
    }
}

fn paint(kind: ResultKind) -> String {
    let label = kind.to_string();
    match kind {
        ResultKind::Success => label.green().to_string(),
        ResultKind::Updated => label.cyan().to_string(),
        ResultKind::DryRunSkipped => label.yellow().to_string(),
        ResultKind::NotFound => label.bright_black().to_string(),
        ResultKind::Error => label.red().bold().to_string(),
    }
}

/// `<error kind>: <msg>` for error results, blank otherwise.
fn detail_message(result: &ReconcileResult) -> String {
    let Some(detail) = &result.detail else {
        return String::new();
    };
    let msg = detail.get("msg").and_then(|m| m.as_str()).unwrap_or_default();
    match result.error_kind() {
        Some(kind) if msg.is_empty() => kind.to_string(),
        Some(kind) => format!("{kind}: {msg}"),
        None => detail.to_string(),
    }
}
