//! Per-manifest create/update and repository-wide prune.

use std::collections::HashSet;

use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

use kgs_cluster::{ClusterError, Tools};
use kgs_core::fingerprint::{is_managed_release, mark_release_values};
use kgs_core::keys::DEFAULT_NAMESPACE;
use kgs_core::{ErrorKind, Manifest, ManifestId, ReconcileResult};

use crate::differ::is_changed;
use crate::error::SyncError;
use crate::prober::probe;

/// A live object the tool manages, eligible for deletion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PruneCandidate {
    Resource {
        kind: String,
        namespace: String,
        name: String,
    },
    Release {
        namespace: String,
        name: String,
    },
}

impl PruneCandidate {
    pub fn id(&self) -> ManifestId {
        match self {
            PruneCandidate::Resource {
                kind,
                namespace,
                name,
            } => ManifestId::resource(kind, namespace, name),
            PruneCandidate::Release { namespace, name } => ManifestId::release(namespace, name),
        }
    }

    fn from_live(doc: &Value) -> Option<Self> {
        let kind = doc.get("kind")?.as_str()?;
        let meta = doc.get("metadata")?;
        let name = meta.get("name")?.as_str()?;
        let namespace = meta
            .get("namespace")
            .and_then(Value::as_str)
            .filter(|ns| !ns.is_empty())
            .unwrap_or(DEFAULT_NAMESPACE);
        Some(PruneCandidate::Resource {
            kind: kind.to_string(),
            namespace: namespace.to_string(),
            name: name.to_string(),
        })
    }
}

/// Drives live state toward manifests through the external tools.
///
/// Holds one piece of per-run state: the namespaces already ensured.
pub struct Reconciler {
    tools: Tools,
    dry_run: bool,
    namespaces: Mutex<HashSet<String>>,
}

impl Reconciler {
    pub fn new(tools: Tools, dry_run: bool) -> Self {
        Self {
            tools,
            dry_run,
            namespaces: Mutex::new(HashSet::new()),
        }
    }

    /// Probe, diff and (unless dry-run) apply one manifest.
    pub async fn create_or_update(&self, manifest: &Manifest) -> ReconcileResult {
        let id = manifest.id();
        match probe(&self.tools, manifest).await {
            Ok(live) if !is_changed(manifest, &live) => {
                debug!(id = %id, "up to date");
                ReconcileResult::success()
            }
            Ok(_) => {
                info!(id = %id, "changed");
                self.apply(manifest).await
            }
            Err(e) if e.is_not_found() => {
                info!(id = %id, "not found; creating");
                self.apply(manifest).await
            }
            Err(e) => {
                error!(id = %id, error = %e, "probe failed");
                e.into_result()
            }
        }
    }

    async fn apply(&self, manifest: &Manifest) -> ReconcileResult {
        let id = manifest.id();
        if self.dry_run {
            info!(id = %id, "[dry-run] would apply");
            return ReconcileResult::dry_run_skipped();
        }

        if let Err(e) = self.ensure_namespace(manifest.namespace()).await {
            error!(id = %id, namespace = manifest.namespace(), error = %e, "namespace create failed");
            return external(&e);
        }

        let applied = match manifest {
            Manifest::Raw(m) => self.tools.kubectl.apply(&m.namespace, &m.body).await,
            Manifest::Release(m) => {
                self.tools
                    .helm
                    .upgrade_install(m, &mark_release_values(&m.values))
                    .await
            }
        };
        match applied {
            Ok(()) => {
                info!(id = %id, "applied");
                ReconcileResult::updated()
            }
            Err(e) => {
                error!(id = %id, error = %e, "apply failed");
                external(&e)
            }
        }
    }

    async fn ensure_namespace(&self, namespace: &str) -> Result<(), ClusterError> {
        let mut seen = self.namespaces.lock().await;
        if seen.contains(namespace) {
            return Ok(());
        }
        self.tools.kubectl.create_namespace(namespace).await?;
        seen.insert(namespace.to_string());
        Ok(())
    }

    /// Managed live objects whose identity is not in `desired`. Objects
    /// without the managed marker never appear here.
    pub async fn prune_candidates(&self, desired: &[Manifest]) -> Result<Vec<PruneCandidate>, SyncError> {
        let keep: HashSet<ManifestId> = desired.iter().map(Manifest::id).collect();
        let mut candidates = Vec::new();

        for doc in self.tools.kubectl.list_managed().await? {
            match PruneCandidate::from_live(&doc) {
                Some(c) if !keep.contains(&c.id()) => candidates.push(c),
                Some(_) => {}
                None => warn!("managed object without kind or name; leaving it alone"),
            }
        }

        for release in self.tools.helm.list_all().await? {
            let id = ManifestId::release(&release.namespace, &release.name);
            if keep.contains(&id) {
                continue;
            }
            match self.tools.helm.get_values(&release.namespace, &release.name).await {
                Ok(values) if is_managed_release(&values) => candidates.push(PruneCandidate::Release {
                    namespace: release.namespace,
                    name: release.name,
                }),
                Ok(_) => debug!(id = %id, "release not managed"),
                Err(e) => warn!(id = %id, error = %e, "cannot read release values; leaving it alone"),
            }
        }
        Ok(candidates)
    }

    /// Delete every managed live object that no manifest in `desired` declares.
    pub async fn destroy_unless_exist_in(
        &self,
        desired: &[Manifest],
    ) -> Result<Vec<(ManifestId, ReconcileResult)>, SyncError> {
        let candidates = self.prune_candidates(desired).await?;
        let mut results = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let id = candidate.id();
            let result = self.destroy(&candidate).await;
            results.push((id, result));
        }
        Ok(results)
    }

    async fn destroy(&self, candidate: &PruneCandidate) -> ReconcileResult {
        let id = candidate.id();
        if self.dry_run {
            info!(id = %id, "[dry-run] would delete");
            return ReconcileResult::dry_run_skipped();
        }
        let deleted = match candidate {
            PruneCandidate::Resource {
                kind,
                namespace,
                name,
            } => self.tools.kubectl.delete(namespace, kind, name).await,
            PruneCandidate::Release { namespace, name } => self.tools.helm.uninstall(namespace, name).await,
        };
        match deleted {
            Ok(()) => {
                info!(id = %id, "deleted");
                ReconcileResult::updated()
            }
            Err(e) if e.is_not_found() => {
                info!(id = %id, "already gone");
                ReconcileResult::not_found()
            }
            Err(e) => {
                error!(id = %id, error = %e, "delete failed");
                external(&e)
            }
        }
    }
}

fn external(err: &ClusterError) -> ReconcileResult {
    ReconcileResult::error(ErrorKind::ExternalCommand, err.to_string())
}
