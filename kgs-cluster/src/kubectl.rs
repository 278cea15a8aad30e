use std::sync::Arc;

use kgs_core::keys;
use serde_json::Value;
use tracing::{debug, info};

use crate::error::ClusterError;
use crate::runner::{CommandOutput, CommandRunner, Invocation};

/// Client for the cluster-apply tool.
#[derive(Clone)]
pub struct Kubectl {
    runner: Arc<dyn CommandRunner>,
    program: String,
}

impl Kubectl {
    pub fn new(runner: Arc<dyn CommandRunner>, program: &str) -> Self {
        Self {
            runner,
            program: program.to_string(),
        }
    }

    /// Server version; fails when the cluster is unreachable.
    pub async fn version(&self) -> Result<Value, ClusterError> {
        let inv = self.invocation(["version", "--client=false", "-o", "json"]);
        let out = self.checked(&inv).await?;
        parse_json(&inv, &out.stdout)
    }

    /// Live document for one resource. A missing resource is
    /// [`ClusterError::NotFound`].
    pub async fn get(&self, namespace: &str, kind: &str, name: &str) -> Result<Value, ClusterError> {
        let inv = self.invocation(["-n", namespace, "get", kind, name, "-o", "json"]);
        let out = self.runner.run(&inv).await?;
        if !out.success() && out.stderr.contains("NotFound") {
            return Err(ClusterError::NotFound {
                what: format!("{kind} {namespace}/{name}"),
            });
        }
        let out = into_checked(&inv, out)?;
        parse_json(&inv, &out.stdout)
    }

    /// Applies `document` by piping it as JSON.
    pub async fn apply(&self, namespace: &str, document: &Value) -> Result<(), ClusterError> {
        let payload = serde_json::to_string(document).map_err(|e| ClusterError::Encode {
            command: format!("{} apply", self.program),
            reason: e.to_string(),
        })?;
        let inv = self
            .invocation(["-n", namespace, "apply", "-f", "-"])
            .with_stdin(payload);
        let out = self.checked(&inv).await?;
        debug!(namespace, output = %out.stdout.trim_end(), "applied");
        Ok(())
    }

    /// Creates `namespace`; an existing namespace counts as success.
    pub async fn create_namespace(&self, namespace: &str) -> Result<(), ClusterError> {
        let inv = self.invocation(["create", "namespace", namespace]);
        let out = self.runner.run(&inv).await?;
        if out.success() {
            info!(namespace, "created namespace");
            return Ok(());
        }
        if out.stderr.contains("AlreadyExists") {
            debug!(namespace, "namespace already exists");
            return Ok(());
        }
        into_checked(&inv, out).map(|_| ())
    }

    /// Every live object, across all namespaces and list-able kinds, that
    /// carries the managed label set to `"true"`.
    pub async fn list_managed(&self) -> Result<Vec<Value>, ClusterError> {
        let inv = self.invocation(["api-resources", "--verbs=list", "-o", "name"]);
        let out = self.checked(&inv).await?;
        let kinds: Vec<&str> = out.stdout.split_whitespace().collect();
        if kinds.is_empty() {
            return Ok(Vec::new());
        }

        let selector = format!("{}={}", keys::MANAGED_LABEL, keys::MANAGED_LABEL_VALUE);
        let inv = self.invocation([
            "get",
            &kinds.join(","),
            "--all-namespaces",
            "-l",
            &selector,
            "-o",
            "json",
        ]);
        let out = self.checked(&inv).await?;
        let list = parse_json(&inv, &out.stdout)?;
        let items = match list.get("items") {
            Some(Value::Array(items)) => items.clone(),
            Some(Value::Null) | None => Vec::new(),
            Some(_) => {
                return Err(ClusterError::Malformed {
                    command: inv.to_string(),
                    reason: "`items` is not a list".into(),
                })
            }
        };
        // Some kinds ignore the selector; keep only what really carries the label.
        Ok(items
            .into_iter()
            .filter(kgs_core::fingerprint::is_managed)
            .collect())
    }

    /// Deletes one resource; one that is already gone is [`ClusterError::NotFound`].
    pub async fn delete(&self, namespace: &str, kind: &str, name: &str) -> Result<(), ClusterError> {
        let inv = self.invocation(["-n", namespace, "delete", kind, name]);
        let out = self.runner.run(&inv).await?;
        if !out.success() && out.stderr.contains("NotFound") {
            return Err(ClusterError::NotFound {
                what: format!("{kind} {namespace}/{name}"),
            });
        }
        into_checked(&inv, out)?;
        info!(namespace, kind, name, "deleted");
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

/// Turns a non-zero exit into [`ClusterError::Failed`].
pub(crate) fn into_checked(inv: &Invocation, out: CommandOutput) -> Result<CommandOutput, ClusterError> {
    if out.success() {
        Ok(out)
    } else {
        Err(ClusterError::Failed {
            command: inv.to_string(),
            code: out.code,
            stderr: out.stderr.trim().to_string(),
        })
    }
}

pub(crate) fn parse_json(inv: &Invocation, text: &str) -> Result<Value, ClusterError> {
    serde_json::from_str(text).map_err(|e| ClusterError::Malformed {
        command: inv.to_string(),
        reason: e.to_string(),
    })
}
