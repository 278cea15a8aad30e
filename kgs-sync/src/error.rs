//! Error types for kgs-sync.

use std::path::PathBuf;

use thiserror::Error;

use kgs_cluster::ClusterError;
use kgs_core::ErrorKind;
use kgs_loader::LoadError;

/// Run-level failures. Anything here aborts the run before (or instead of)
/// per-manifest reconciliation.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Load(#[from] LoadError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// `depends.yaml` is not a mapping of identity to a list of identities.
    #[error("failed to parse {path}: {source}")]
    Depends {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("`{id}` depends on `{prerequisite}`, which is not in the repository")]
    UnknownPrerequisite { id: String, prerequisite: String },

    #[error("dependency cycle between: {}", members.join(", "))]
    Cycle { members: Vec<String> },

    /// Listing live state for a prune failed; nothing was deleted.
    #[error("failed to list live state: {0}")]
    Cluster(#[from] ClusterError),
}

impl SyncError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SyncError::Load(LoadError::Manifest(e)) => e.kind(),
            SyncError::Load(LoadError::DuplicateIdentity { .. }) => ErrorKind::InvalidManifest,
            SyncError::Load(_) | SyncError::Io { .. } | SyncError::Depends { .. } => ErrorKind::Parse,
            SyncError::UnknownPrerequisite { .. } => ErrorKind::InvalidManifest,
            SyncError::Cycle { .. } => ErrorKind::CycleDetected,
            SyncError::Cluster(_) => ErrorKind::ExternalCommand,
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
