//! Per-manifest outcomes and the failure taxonomy.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Failure classification shared by every stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorKind {
    /// Identity fields missing or unparseable.
    InvalidManifest,
    /// The resource or release does not exist; drives the create path.
    NotFound,
    /// Non-zero exit, timeout, or malformed output from an external tool.
    #[serde(rename = "external-command-error")]
    ExternalCommand,
    /// The dependency graph has a cycle.
    CycleDetected,
    /// A manifest file could not be decoded.
    #[serde(rename = "parse-error")]
    Parse,
    /// A prerequisite ended in error and the manifest was not attempted.
    DependencyFailed,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ErrorKind::InvalidManifest => "invalid-manifest",
            ErrorKind::NotFound => "not-found",
            ErrorKind::ExternalCommand => "external-command-error",
            ErrorKind::CycleDetected => "cycle-detected",
            ErrorKind::Parse => "parse-error",
            ErrorKind::DependencyFailed => "dependency-failed",
        };
        f.write_str(s)
    }
}

/// Terminal outcome of reconciling one manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ResultKind {
    /// Live state already matches; nothing was done.
    Success,
    /// The external apply/delete primitive was invoked and succeeded.
    Updated,
    /// A change was needed but `--dry-run` suppressed it.
    DryRunSkipped,
    /// The target was already gone.
    NotFound,
    Error,
}

impl ResultKind {
    pub fn all() -> &'static [ResultKind] {
        &[
            ResultKind::Success,
            ResultKind::Updated,
            ResultKind::DryRunSkipped,
            ResultKind::NotFound,
            ResultKind::Error,
        ]
    }
}

impl fmt::Display for ResultKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ResultKind::Success => "success",
            ResultKind::Updated => "updated",
            ResultKind::DryRunSkipped => "dry-run-skipped",
            ResultKind::NotFound => "not-found",
            ResultKind::Error => "error",
        };
        f.write_str(s)
    }
}

/// Outcome plus optional diagnostics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReconcileResult {
    pub kind: ResultKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<Value>,
}

impl ReconcileResult {
    pub fn new(kind: ResultKind) -> Self {
        Self { kind, detail: None }
    }

    pub fn success() -> Self {
        Self::new(ResultKind::Success)
    }

    pub fn updated() -> Self {
        Self::new(ResultKind::Updated)
    }

    pub fn dry_run_skipped() -> Self {
        Self::new(ResultKind::DryRunSkipped)
    }

    pub fn not_found() -> Self {
        Self::new(ResultKind::NotFound)
    }

    /// An `error` result whose detail records the error kind and message.
    pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind: ResultKind::Error,
            detail: Some(json!({ "error": kind, "msg": message.into() })),
        }
    }

    pub fn with_detail(mut self, detail: Value) -> Self {
        self.detail = Some(detail);
        self
    }

    pub fn is_error(&self) -> bool {
        self.kind == ResultKind::Error
    }

    /// The error kind recorded by [`ReconcileResult::error`], if any.
    pub fn error_kind(&self) -> Option<ErrorKind> {
        let raw = self.detail.as_ref()?.get("error")?.clone();
        serde_json::from_value(raw).ok()
    }
}

impl fmt::Display for ReconcileResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{} {detail}", self.kind),
            None => write!(f, "{}", self.kind),
        }
    }
}
