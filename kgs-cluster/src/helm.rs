use std::sync::Arc;

use kgs_core::ReleaseManifest;
use serde::Deserialize;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::error::ClusterError;
use crate::kubectl::{into_checked, parse_json};
use crate::runner::{CommandOutput, CommandRunner, Invocation};

/// One row of `helm list`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ReleaseInfo {
    pub name: String,
    pub namespace: String,
    /// `<chart>-<version>`.
    pub chart: String,
}

/// Client for the release tool.
#[derive(Clone)]
pub struct Helm {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl Helm {
    pub fn new(runner: Arc<dyn CommandRunner>, program: &str) -> Self {
        Self {
            runner,
            program: program.to_string(),
        }
    }

    /// Every installed release, across all namespaces.
    pub async fn list_all(&self) -> Result<Vec<ReleaseInfo>, ClusterError> {
        let inv = self.invocation(["list", "--all-namespaces", "--output", "json"]);
        let out = self.checked(&inv).await?;
        parse_list(&inv, &out.stdout)
    }

    /// The release `name` in `namespace`, or [`ClusterError::NotFound`].
    pub async fn find(&self, namespace: &str, name: &str) -> Result<ReleaseInfo, ClusterError> {
        let filter = format!("^{name}$");
        let inv = self.invocation(["-n", namespace, "list", "--filter", &filter, "--output", "json"]);
        let out = self.checked(&inv).await?;
        parse_list(&inv, &out.stdout)?
            .into_iter()
            .find(|r| r.name == name)
            .ok_or_else(|| ClusterError::NotFound {
                what: format!("release {namespace}/{name}"),
            })
    }

    /// Stored user values of a release; `null` comes back as `{}`.
    pub async fn get_values(&self, namespace: &str, name: &str) -> Result<Value, ClusterError> {
        let inv = self.invocation(["-n", namespace, "get", "values", name, "--output", "json"]);
        let out = self.runner.run(&inv).await?;
        if !out.success() && out.stderr.contains("not found") {
            return Err(ClusterError::NotFound {
                what: format!("release {namespace}/{name}"),
            });
        }
        let out = into_checked(&inv, out)?;
        match parse_json(&inv, &strip_diagnostics(&out.stdout))? {
            Value::Null => Ok(Value::Object(Map::new())),
            v @ Value::Object(_) => Ok(v),
            other => Err(ClusterError::Malformed {
                command: inv.to_string(),
                reason: format!("values are not a mapping: {other}"),
            }),
        }
    }

    /// Installs or upgrades `release` with `values` piped as YAML.
    pub async fn upgrade_install(&self, release: &ReleaseManifest, values: &Value) -> Result<(), ClusterError> {
        let payload = serde_yaml::to_string(values).map_err(|e| ClusterError::Encode {
            command: format!("{} upgrade", self.program),
            reason: e.to_string(),
        })?;
        let chart = release.chart_reference();
        let mut args = vec![
            "upgrade",
            "--install",
            release.name.as_str(),
            chart.as_str(),
            "--namespace",
            release.namespace.as_str(),
            "--version",
            release.chart.version.as_str(),
        ];
        if release.chart.localpath.is_none() {
            if let Some(repo) = &release.chart.repo {
                args.extend(["--repo", repo.as_str()]);
            }
        }
        args.extend(["--values", "-", "--output", "json"]);

        let inv = self.invocation(args).with_stdin(payload);
        let out = self.checked(&inv).await?;
        debug!(release = %release.name, output = %strip_diagnostics(&out.stdout), "upgraded");
        info!(release = %release.name, namespace = %release.namespace, chart = %chart, "installed release");
        Ok(())
    }

    pub async fn uninstall(&self, namespace: &str, name: &str) -> Result<(), ClusterError> {
        let inv = self.invocation(["-n", namespace, "uninstall", name]);
        let out = self.runner.run(&inv).await?;
        if !out.success() && out.stderr.contains("not found") {
            return Err(ClusterError::NotFound {
                what: format!("release {namespace}/{name}"),
            });
        }
        into_checked(&inv, out)?;
        info!(namespace, release = name, "uninstalled release");
        Ok(())
    }

    fn invocation<'a>(&self, args: impl IntoIterator<Item = &'a str>) -> Invocation {
        Invocation::new(&self.program, args)
    }

    async fn checked(&self, inv: &Invocation) -> Result<CommandOutput, ClusterError> {
        let out = self.runner.run(inv).await?;
        into_checked(inv, out)
    }
}

fn parse_list(inv: &Invocation, stdout: &str) -> Result<Vec<ReleaseInfo>, ClusterError> {
    let cleaned = strip_diagnostics(stdout);
    if cleaned.trim().is_empty() {
        return Ok(Vec::new());
    }
    match parse_json(inv, &cleaned)? {
        Value::Null => Ok(Vec::new()),
        list => serde_json::from_value(list).map_err(|e| ClusterError::Malformed {
            command: inv.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Drops the chatter helm mixes into stdout ahead of its JSON.
pub fn strip_diagnostics(stdout: &str) -> String {
    stdout
        .lines()
        .filter(|line| {
            let line = line.trim_start();
            !(line.starts_with("WARNING:") || line.starts_with("DEBUG:") || line.starts_with("Release"))
        })
        .collect::<Vec<_>>()
        .join("\n")
}
