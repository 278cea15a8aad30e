//! Read-only queries of live state.

use std::fmt;

use tracing::debug;

use kgs_cluster::{ClusterError, Tools};
use kgs_core::{ErrorKind, LiveState, Manifest, ReconcileResult};

/// Why a probe produced no live state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeError {
    /// [`ErrorKind::NotFound`] for absence, [`ErrorKind::ExternalCommand`] otherwise.
    pub kind: ErrorKind,
    pub detail: String,
}

impl ProbeError {
    pub fn is_not_found(&self) -> bool {
        self.kind == ErrorKind::NotFound
    }

    /// The `error` result reported for a failed probe.
    pub fn into_result(self) -> ReconcileResult {
        ReconcileResult::error(self.kind, self.detail)
    }
}

impl fmt::Display for ProbeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.detail)
    }
}

impl std::error::Error for ProbeError {}

impl From<ClusterError> for ProbeError {
    fn from(err: ClusterError) -> Self {
        let kind = if err.is_not_found() {
            ErrorKind::NotFound
        } else {
            ErrorKind::ExternalCommand
        };
        Self {
            kind,
            detail: err.to_string(),
        }
    }
}

/// Fetch what the cluster holds for `manifest`. Never mutates anything.
pub async fn probe(tools: &Tools, manifest: &Manifest) -> Result<LiveState, ProbeError> {
    let live = match manifest {
        Manifest::Raw(m) => LiveState::Resource(tools.kubectl.get(&m.namespace, &m.kind, &m.name).await?),
        Manifest::Release(m) => {
            let installed = tools.helm.find(&m.namespace, &m.name).await?;
            let values = tools.helm.get_values(&m.namespace, &m.name).await?;
            LiveState::Release {
                chart: installed.chart,
                values,
            }
        }
    };
    debug!(id = %manifest.id(), "probed live state");
    Ok(live)
}
