//! Repository loading for `kgs`.
//!
//! `load_repository(root)` walks a manifest repository and returns every
//! declared [`Manifest`] plus the disposition of each file it saw. Files are
//! classified by name:
//!
//! | file                               | treatment                                  |
//! |------------------------------------|--------------------------------------------|
//! | `<stem>.helm`                      | release anchor                             |
//! | `<stem>.values.yaml` / `.yml`      | sidecar of `<stem>.helm` in the same dir   |
//! | `*.yaml` / `*.yml`                 | raw manifest stream (one per document)     |
//! | anything below a `Chart.yaml` dir  | not applicable (checked-in chart source)   |
//! | `depends.yaml` at the root         | ignored (ordering file)                    |
//!
//! Association is by directory only; sidecars never pair across directories.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};

use kgs_core::keys::{CHART_FILE, DEPENDS_FILE, MANIFEST_SUFFIXES, RELEASE_SUFFIX, VALUES_SUFFIXES};
use kgs_core::{Manifest, ManifestError, ManifestId, RawManifest, ReleaseManifest};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use walkdir::WalkDir;

// ---------------------------------------------------------------------------
// Public types
// ---------------------------------------------------------------------------

/// What the loader did with a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Disposition {
    /// Parsed into (part of) a manifest.
    Processed,
    /// A values file with no release anchor next to it.
    Skipped,
    /// Not a manifest file, or inside a chart source tree.
    NotApplicable,
}

impl fmt::Display for Disposition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disposition::Processed => write!(f, "processed"),
            Disposition::Skipped => write!(f, "skipped"),
            Disposition::NotApplicable => write!(f, "not-applicable"),
        }
    }
}

/// One line of the load trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileDisposition {
    pub path: PathBuf,
    pub disposition: Disposition,
}

/// Result of loading a repository.
#[derive(Debug, Clone)]
pub struct LoadedRepository {
    pub root: PathBuf,
    /// Manifests in walk order; within a file, in document order.
    pub manifests: Vec<Manifest>,
    /// Every file seen, in walk order.
    pub files: Vec<FileDisposition>,
}

impl LoadedRepository {
    pub fn ids(&self) -> Vec<ManifestId> {
        self.manifests.iter().map(Manifest::id).collect()
    }

    /// Disposition recorded for `path`, if the walk saw it.
    pub fn disposition_of(&self, path: &Path) -> Option<Disposition> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .map(|f| f.disposition)
    }
}

/// Errors from repository loading. Any of them aborts the whole load.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to walk {root}: {source}")]
    Walk {
        root: PathBuf,
        #[source]
        source: walkdir::Error,
    },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("duplicate manifest identity '{id}' declared in {first} and {second}")]
    DuplicateIdentity {
        id: ManifestId,
        first: PathBuf,
        second: PathBuf,
    },
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Load every manifest below `root`.
///
/// Returns `LoadError::Manifest` naming the offending file when a file
/// classified as a manifest cannot be decoded or lacks identity fields, and
/// `LoadError::DuplicateIdentity` when two manifests share an identity.
pub fn load_repository(root: &Path) -> Result<LoadedRepository, LoadError> {
    let paths = collect_files(root)?;

    let chart_dirs: Vec<PathBuf> = paths
        .iter()
        .filter(|p| p.file_name().is_some_and(|n| n == CHART_FILE))
        .filter_map(|p| p.parent().map(Path::to_path_buf))
        .collect();

    let classes: Vec<FileClass> = paths.iter().map(|p| classify(p)).collect();

    // (dir, stem) of every release anchor, and its sidecars in walk order.
    let mut anchors: HashSet<(PathBuf, String)> = HashSet::new();
    let mut sidecars: HashMap<(PathBuf, String), Vec<PathBuf>> = HashMap::new();
    for (path, class) in paths.iter().zip(&classes) {
        if in_chart_tree(path, &chart_dirs) {
            continue;
        }
        match class {
            FileClass::Release { stem } => {
                anchors.insert((parent_of(path), stem.clone()));
            }
            FileClass::Values { stem } => {
                sidecars
                    .entry((parent_of(path), stem.clone()))
                    .or_default()
                    .push(path.clone());
            }
            FileClass::Raw | FileClass::Other => {}
        }
    }

    let mut manifests = Vec::new();
    let mut files = Vec::with_capacity(paths.len());
    for (path, class) in paths.into_iter().zip(classes) {
        let disposition = if in_chart_tree(&path, &chart_dirs) {
            Disposition::NotApplicable
        } else {
            match class {
                FileClass::Release { stem } => {
                    let key = (parent_of(&path), stem);
                    let values = sidecars.get(&key).map(Vec::as_slice).unwrap_or_default();
                    manifests.push(Manifest::Release(load_release(&path, values)?));
                    Disposition::Processed
                }
                FileClass::Values { stem } => {
                    if anchors.contains(&(parent_of(&path), stem)) {
                        Disposition::Processed
                    } else {
                        tracing::warn!("values file without release descriptor: {}", path.display());
                        Disposition::Skipped
                    }
                }
                FileClass::Raw => {
                    manifests.extend(load_raw(&path)?.into_iter().map(Manifest::Raw));
                    Disposition::Processed
                }
                FileClass::Other => Disposition::NotApplicable,
            }
        };
        tracing::debug!("{} -> {}", path.display(), disposition);
        files.push(FileDisposition { path, disposition });
    }

    check_unique(&manifests)?;

    Ok(LoadedRepository {
        root: root.to_path_buf(),
        manifests,
        files,
    })
}

/// Decode every non-null mapping document of a YAML stream.
///
/// Scalars, sequences and empty documents are dropped silently.
pub fn parse_documents(path: &Path, text: &str) -> Result<Vec<Value>, ManifestError> {
    let mut documents = Vec::new();
    for document in serde_yaml::Deserializer::from_str(text) {
        let value = serde_yaml::Value::deserialize(document).map_err(|e| ManifestError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        if !value.is_mapping() {
            continue;
        }
        documents.push(to_json(path, &value)?);
    }
    Ok(documents)
}

// ---------------------------------------------------------------------------
// Classification
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
enum FileClass {
    Release { stem: String },
    Values { stem: String },
    Raw,
    Other,
}

fn classify(path: &Path) -> FileClass {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return FileClass::Other;
    };
    if let Some(stem) = name.strip_suffix(RELEASE_SUFFIX) {
        return FileClass::Release { stem: stem.to_string() };
    }
    // Checked before raw manifests: `x.values.yaml` also ends in `.yaml`.
    for suffix in VALUES_SUFFIXES {
        if let Some(stem) = name.strip_suffix(suffix) {
            return FileClass::Values { stem: stem.to_string() };
        }
    }
    if MANIFEST_SUFFIXES.iter().any(|s| name.ends_with(s)) {
        return FileClass::Raw;
    }
    FileClass::Other
}

fn in_chart_tree(path: &Path, chart_dirs: &[PathBuf]) -> bool {
    chart_dirs.iter().any(|dir| path.starts_with(dir))
}

fn parent_of(path: &Path) -> PathBuf {
    path.parent().map(Path::to_path_buf).unwrap_or_default()
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

fn collect_files(root: &Path) -> Result<Vec<PathBuf>, LoadError> {
    let depends = root.join(DEPENDS_FILE);
    let mut paths = Vec::new();
    // Symlinked files and directories are read through; loops surface as walk errors.
    for entry in WalkDir::new(root).follow_links(true).sort_by_file_name() {
        let entry = entry.map_err(|e| LoadError::Walk {
            root: root.to_path_buf(),
            source: e,
        })?;
        if !entry.file_type().is_file() || entry.path() == depends {
            continue;
        }
        paths.push(entry.into_path());
    }
    Ok(paths)
}

fn load_release(path: &Path, values_files: &[PathBuf]) -> Result<ReleaseManifest, LoadError> {
    let descriptor = read(path)?;
    let mut values = Vec::with_capacity(values_files.len());
    for values_path in values_files {
        let text = read(values_path)?;
        let doc: serde_yaml::Value = if text.trim().is_empty() {
            serde_yaml::Value::Null
        } else {
            serde_yaml::from_str(&text).map_err(|e| ManifestError::Parse {
                path: values_path.clone(),
                source: e,
            })?
        };
        values.push((values_path.clone(), to_json(values_path, &doc)?));
    }
    Ok(ReleaseManifest::from_descriptor(&descriptor, path, values)?)
}

fn load_raw(path: &Path) -> Result<Vec<RawManifest>, LoadError> {
    let text = read(path)?;
    let mut manifests = Vec::new();
    for document in parse_documents(path, &text)? {
        manifests.push(RawManifest::from_document(document, path)?);
    }
    Ok(manifests)
}

fn check_unique(manifests: &[Manifest]) -> Result<(), LoadError> {
    let mut seen: HashMap<ManifestId, &Path> = HashMap::new();
    for manifest in manifests {
        let id = manifest.id();
        if let Some(first) = seen.get(&id) {
            return Err(LoadError::DuplicateIdentity {
                id,
                first: first.to_path_buf(),
                second: manifest.source().to_path_buf(),
            });
        }
        seen.insert(id, manifest.source());
    }
    Ok(())
}

fn read(path: &Path) -> Result<String, LoadError> {
    fs::read_to_string(path).map_err(|e| LoadError::Io {
        path: path.to_path_buf(),
        source: e,
    })
}

fn to_json(path: &Path, value: &serde_yaml::Value) -> Result<Value, ManifestError> {
    serde_json::to_value(value).map_err(|e| ManifestError::Convert {
        path: path.to_path_buf(),
        source: e,
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
