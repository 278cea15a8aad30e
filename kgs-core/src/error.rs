//! Error types for kgs-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise while turning documents into manifests.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// A required identity field is missing or has the wrong type.
    #[error("invalid manifest in {path}: {reason}")]
    Invalid { path: PathBuf, reason: String },

    /// The document could not be decoded — includes line context from serde_yaml.
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The YAML document has no JSON equivalent (e.g. a non-string mapping key).
    #[error("failed to convert {path} to a structured document: {source}")]
    Convert {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl ManifestError {
    pub(crate) fn invalid(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Invalid {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// The error-kind token used in reports for this failure.
    pub fn kind(&self) -> crate::ErrorKind {
        match self {
            ManifestError::Invalid { .. } => crate::ErrorKind::InvalidManifest,
            ManifestError::Parse { .. } | ManifestError::Convert { .. } => crate::ErrorKind::Parse,
        }
    }
}
