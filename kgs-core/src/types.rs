//! Domain types for the reconciliation engine.
//!
//! A [`Manifest`] is the desired state of one unit; a [`LiveState`] is what the
//! cluster currently holds for the same identity. Both are closed sum types so
//! callers dispatch exhaustively.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::ManifestError;
use crate::fingerprint;
use crate::keys::DEFAULT_NAMESPACE;

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// A manifest identity, e.g. `deployment.default.web` or `release.default.svc`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ManifestId(pub String);

impl fmt::Display for ManifestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ManifestId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ManifestId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl ManifestId {
    /// Identity of a raw cluster resource.
    pub fn resource(kind: &str, namespace: &str, name: &str) -> Self {
        Self(format!("{}.{namespace}.{name}", kind.to_lowercase()))
    }

    /// Identity of a chart release.
    pub fn release(namespace: &str, name: &str) -> Self {
        Self(format!("release.{namespace}.{name}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

// ---------------------------------------------------------------------------
// Raw manifests
// ---------------------------------------------------------------------------

/// A single cluster-resource document.
#[derive(Debug, Clone, PartialEq)]
pub struct RawManifest {
    pub kind: String,
    pub namespace: String,
    pub name: String,
    /// The document as loaded, with the fingerprint annotation and managed
    /// label injected.
    pub body: Value,
    /// Fingerprint of the document before injection.
    pub content_hash: String,
    /// File the document was read from.
    pub source: PathBuf,
}

impl RawManifest {
    /// Build a manifest from one decoded document.
    ///
    /// Returns `ManifestError::Invalid` when `kind` or `metadata.name` is
    /// missing. `metadata.namespace` defaults to [`DEFAULT_NAMESPACE`].
    pub fn from_document(document: Value, source: &Path) -> Result<Self, ManifestError> {
        if !document.is_object() {
            return Err(ManifestError::invalid(source, "document is not a mapping"));
        }
        let kind = string_field(&document, &["kind"])
            .ok_or_else(|| ManifestError::invalid(source, "missing string field `kind`"))?;
        let name = string_field(&document, &["metadata", "name"])
            .ok_or_else(|| ManifestError::invalid(source, "missing string field `metadata.name`"))?;
        let namespace = match document.get("metadata").and_then(|m| m.get("namespace")) {
            None | Some(Value::Null) => DEFAULT_NAMESPACE.to_string(),
            Some(Value::String(ns)) if !ns.is_empty() => ns.clone(),
            Some(_) => {
                return Err(ManifestError::invalid(
                    source,
                    "`metadata.namespace` must be a non-empty string",
                ))
            }
        };

        let content_hash = fingerprint::raw_fingerprint(&document);
        let mut body = document;
        fingerprint::annotate(&mut body, &content_hash);

        Ok(Self {
            kind,
            namespace,
            name,
            body,
            content_hash,
            source: source.to_path_buf(),
        })
    }

    pub fn id(&self) -> ManifestId {
        ManifestId::resource(&self.kind, &self.namespace, &self.name)
    }
}

// ---------------------------------------------------------------------------
// Release manifests
// ---------------------------------------------------------------------------

/// Chart coordinates of a release.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartRef {
    pub name: String,
    #[serde(deserialize_with = "string_or_number")]
    pub version: String,
    /// Chart repository URL, passed to the release tool as `--repo`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo: Option<String>,
    /// Directory holding the chart source, relative to the descriptor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub localpath: Option<PathBuf>,
}

impl ChartRef {
    /// `name-version`, the form the release tool lists installed charts in.
    pub fn chart_id(&self) -> String {
        format!("{}-{}", self.name, self.version)
    }
}

/// On-disk shape of a `.helm` descriptor.
#[derive(Debug, Clone, Deserialize)]
struct ReleaseDescriptor {
    name: String,
    #[serde(default)]
    namespace: Option<String>,
    chart: ChartRef,
}

/// A packaged-chart release.
#[derive(Debug, Clone, PartialEq)]
pub struct ReleaseManifest {
    pub name: String,
    pub namespace: String,
    pub chart: ChartRef,
    /// Merged values from every sidecar file; always a mapping.
    pub values: Value,
    /// The descriptor file.
    pub source: PathBuf,
    /// Sidecar values files, in merge order.
    pub values_files: Vec<PathBuf>,
}

impl ReleaseManifest {
    /// Parse a descriptor and merge `values` documents into it.
    ///
    /// Later documents override top-level keys of earlier ones; `null`
    /// documents count as empty mappings.
    pub fn from_descriptor(
        descriptor: &str,
        source: &Path,
        values: Vec<(PathBuf, Value)>,
    ) -> Result<Self, ManifestError> {
        let descriptor: ReleaseDescriptor =
            serde_yaml::from_str(descriptor).map_err(|e| ManifestError::Parse {
                path: source.to_path_buf(),
                source: e,
            })?;
        if descriptor.name.is_empty() {
            return Err(ManifestError::invalid(source, "release `name` must not be empty"));
        }

        let mut merged = Map::new();
        let mut values_files = Vec::with_capacity(values.len());
        for (path, doc) in values {
            match doc {
                Value::Null => {}
                Value::Object(map) => merged.extend(map),
                _ => {
                    return Err(ManifestError::invalid(&path, "values document is not a mapping"))
                }
            }
            values_files.push(path);
        }

        Ok(Self {
            name: descriptor.name,
            namespace: descriptor
                .namespace
                .filter(|ns| !ns.is_empty())
                .unwrap_or_else(|| DEFAULT_NAMESPACE.to_string()),
            chart: descriptor.chart,
            values: Value::Object(merged),
            source: source.to_path_buf(),
            values_files,
        })
    }

    pub fn id(&self) -> ManifestId {
        ManifestId::release(&self.namespace, &self.name)
    }

    /// Fingerprint of the desired values, ignoring the managed marker.
    pub fn values_fingerprint(&self) -> String {
        fingerprint::values_fingerprint(&self.values)
    }

    /// Chart location handed to the release tool: `<descriptor dir>/<localpath>/<name>`
    /// when a local path is set, the bare chart name otherwise.
    pub fn chart_reference(&self) -> String {
        match &self.chart.localpath {
            Some(local) => {
                let base = self.source.parent().unwrap_or_else(|| Path::new("."));
                base.join(local).join(&self.chart.name).display().to_string()
            }
            None => self.chart.name.clone(),
        }
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// One unit of desired state.
#[derive(Debug, Clone, PartialEq)]
pub enum Manifest {
    Raw(RawManifest),
    Release(ReleaseManifest),
}

impl Manifest {
    pub fn id(&self) -> ManifestId {
        match self {
            Manifest::Raw(m) => m.id(),
            Manifest::Release(m) => m.id(),
        }
    }

    pub fn namespace(&self) -> &str {
        match self {
            Manifest::Raw(m) => &m.namespace,
            Manifest::Release(m) => &m.namespace,
        }
    }

    /// The file this manifest was declared in.
    pub fn source(&self) -> &Path {
        match self {
            Manifest::Raw(m) => &m.source,
            Manifest::Release(m) => &m.source,
        }
    }
}

impl fmt::Display for Manifest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.id(), self.source().display())
    }
}

// ---------------------------------------------------------------------------
// Live state
// ---------------------------------------------------------------------------

/// What the cluster currently holds for an identity.
///
/// Absence and probe failure are not variants here: probing yields
/// `Result<LiveState, _>` whose error carries the not-found / failure kind.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveState {
    /// The live document of a raw resource.
    Resource(Value),
    /// An installed release.
    Release {
        /// Installed chart as `name-version`.
        chart: String,
        /// Stored values; `null` is normalised to `{}`.
        values: Value,
    },
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

// YAML reads an unquoted `version: 1.10` as the float 1.1, which would never
// match the installed chart id, so floats are rejected; integers are fine.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Version {
        Text(String),
        Int(i64),
        Float(f64),
    }

    match Version::deserialize(deserializer)? {
        Version::Text(s) => Ok(s),
        Version::Int(i) => Ok(i.to_string()),
        Version::Float(f) => Err(serde::de::Error::custom(format!(
            "chart version was read as the number {f}; quote it so it stays a string"
        ))),
    }
}

fn string_field(document: &Value, path: &[&str]) -> Option<String> {
    let mut cur = document;
    for key in path {
        cur = cur.get(key)?;
    }
    cur.as_str().filter(|s| !s.is_empty()).map(str::to_string)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
