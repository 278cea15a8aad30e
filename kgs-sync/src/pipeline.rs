//! Run entrypoint: load, order, then reconcile or prune.

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use futures_util::stream::{FuturesUnordered, StreamExt};
use serde::Serialize;
use serde_json::json;
use tracing::{info, info_span, warn, Instrument, Span};

use kgs_cluster::Tools;
use kgs_core::{ErrorKind, Manifest, ManifestId, ReconcileResult, ResultKind};
use kgs_loader::{load_repository, LoadedRepository};

use crate::depends::read_depends;
use crate::error::SyncError;
use crate::reconciler::Reconciler;
use crate::resolver::DependencyGraph;

pub const DEFAULT_JOBS: usize = 4;

/// What happens to a manifest whose prerequisite ended in `error`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyFailurePolicy {
    /// Report it as `error` (`dependency-failed`) without probing it.
    #[default]
    Skip,
    /// Reconcile it anyway once every prerequisite is terminal.
    Proceed,
}

impl fmt::Display for DependencyFailurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DependencyFailurePolicy::Skip => "skip",
            DependencyFailurePolicy::Proceed => "proceed",
        })
    }
}

impl FromStr for DependencyFailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "skip" => Ok(DependencyFailurePolicy::Skip),
            "proceed" => Ok(DependencyFailurePolicy::Proceed),
            other => Err(format!("unknown dependency failure policy `{other}` (expected skip or proceed)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileOptions {
    /// Prune instead of create/update.
    pub clean: bool,
    pub dry_run: bool,
    pub sequential: bool,
    /// In-flight limit for concurrent runs.
    pub jobs: usize,
    pub on_dependency_failure: DependencyFailurePolicy,
}

impl Default for ReconcileOptions {
    fn default() -> Self {
        Self {
            clean: false,
            dry_run: false,
            sequential: false,
            jobs: DEFAULT_JOBS,
            on_dependency_failure: DependencyFailurePolicy::Skip,
        }
    }
}

/// One identity and its terminal result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Outcome {
    pub id: ManifestId,
    pub result: ReconcileResult,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    pub outcomes: Vec<Outcome>,
}

impl RunReport {
    pub fn count(&self, kind: ResultKind) -> usize {
        self.outcomes.iter().filter(|o| o.result.kind == kind).count()
    }

    /// Count per result kind, in [`ResultKind::all`] order.
    pub fn counts(&self) -> Vec<(ResultKind, usize)> {
        ResultKind::all().iter().map(|&k| (k, self.count(k))).collect()
    }

    pub fn has_errors(&self) -> bool {
        self.outcomes.iter().any(|o| o.result.is_error())
    }

    pub fn get(&self, id: &str) -> Option<&ReconcileResult> {
        self.outcomes.iter().find(|o| o.id.as_str() == id).map(|o| &o.result)
    }
}

pub struct Pipeline {
    reconciler: Reconciler,
    options: ReconcileOptions,
    span: Span,
}

impl Pipeline {
    /// `span` parents every event and per-manifest span of the run.
    pub fn new(tools: Tools, options: ReconcileOptions, span: Span) -> Self {
        Self {
            reconciler: Reconciler::new(tools, options.dry_run),
            options,
            span,
        }
    }

    /// Load `root`, validate ordering, then reconcile or prune.
    ///
    /// Load and ordering failures abort before any external call.
    pub async fn run(&self, root: &Path) -> Result<RunReport, SyncError> {
        let span = self.span.clone();
        async {
            let loaded = load_repository(root)?;
            trace_dispositions(&loaded);
            let declared = read_depends(root)?;
            let dag = DependencyGraph::build(&loaded.ids(), &declared)?;
            info!(
                manifests = loaded.manifests.len(),
                clean = self.options.clean,
                dry_run = self.options.dry_run,
                "loaded repository"
            );

            if self.options.clean {
                self.prune(&loaded.manifests).await
            } else {
                Ok(self.apply(&loaded.manifests, &dag).await)
            }
        }
        .instrument(span)
        .await
    }

    /// Create/update every manifest, honouring `dag`.
    pub async fn apply(&self, manifests: &[Manifest], dag: &DependencyGraph) -> RunReport {
        let by_id: HashMap<ManifestId, &Manifest> = manifests.iter().map(|m| (m.id(), m)).collect();
        let mut results = if self.options.sequential {
            self.run_sequential(&by_id, dag).await
        } else {
            self.run_concurrent(&by_id, dag).await
        };

        let outcomes = manifests
            .iter()
            .map(|m| {
                let id = m.id();
                let result = results.remove(&id).unwrap_or_else(|| {
                    ReconcileResult::error(ErrorKind::DependencyFailed, "never became ready")
                });
                Outcome { id, result }
            })
            .collect();
        RunReport { outcomes }
    }

    /// Delete managed live objects that no manifest declares.
    pub async fn prune(&self, manifests: &[Manifest]) -> Result<RunReport, SyncError> {
        let outcomes = self
            .reconciler
            .destroy_unless_exist_in(manifests)
            .instrument(info_span!(parent: &self.span, "prune"))
            .await?
            .into_iter()
            .map(|(id, result)| Outcome { id, result })
            .collect();
        Ok(RunReport { outcomes })
    }

    async fn run_sequential(
        &self,
        by_id: &HashMap<ManifestId, &Manifest>,
        dag: &DependencyGraph,
    ) -> HashMap<ManifestId, ReconcileResult> {
        let mut results = HashMap::with_capacity(by_id.len());
        for id in dag.sequential_order() {
            let Some(&manifest) = by_id.get(&id) else { continue };
            let result = match self.blocked_by(&id, dag, &results) {
                Some(blocked) => blocked,
                None => self.reconcile_one(manifest).await,
            };
            results.insert(id, result);
        }
        results
    }

    /// Ready-set scheduler: at most `jobs` reconciles in flight, waiting on
    /// whichever finishes first before re-evaluating readiness.
    async fn run_concurrent(
        &self,
        by_id: &HashMap<ManifestId, &Manifest>,
        dag: &DependencyGraph,
    ) -> HashMap<ManifestId, ReconcileResult> {
        let jobs = self.options.jobs.max(1);
        let mut results = HashMap::with_capacity(by_id.len());
        let mut ready = dag.ready_set();
        let mut queue: VecDeque<ManifestId> = VecDeque::new();
        let mut in_flight = FuturesUnordered::new();

        loop {
            queue.extend(ready.take_ready());
            while in_flight.len() < jobs {
                let Some(id) = queue.pop_front() else { break };
                if let Some(blocked) = self.blocked_by(&id, dag, &results) {
                    ready.complete(&id);
                    results.insert(id, blocked);
                    queue.extend(ready.take_ready());
                    continue;
                }
                let Some(&manifest) = by_id.get(&id) else {
                    ready.complete(&id);
                    continue;
                };
                in_flight.push(async move { (id, self.reconcile_one(manifest).await) });
            }

            match in_flight.next().await {
                Some((id, result)) => {
                    ready.complete(&id);
                    results.insert(id, result);
                }
                None => break,
            }
        }

        if !ready.is_finished() {
            warn!("scheduler stopped with manifests still waiting");
        }
        results
    }

    async fn reconcile_one(&self, manifest: &Manifest) -> ReconcileResult {
        let span = info_span!(parent: &self.span, "manifest", id = %manifest.id());
        let result = self.reconciler.create_or_update(manifest).instrument(span.clone()).await;
        span.in_scope(|| info!(result = %result.kind, "reconciled"));
        result
    }

    /// Under [`DependencyFailurePolicy::Skip`], the result for `id` when one
    /// of its prerequisites failed.
    fn blocked_by(
        &self,
        id: &ManifestId,
        dag: &DependencyGraph,
        results: &HashMap<ManifestId, ReconcileResult>,
    ) -> Option<ReconcileResult> {
        if self.options.on_dependency_failure == DependencyFailurePolicy::Proceed {
            return None;
        }
        let failed = dag
            .prerequisites(id)
            .into_iter()
            .find(|p| results.get(p).is_some_and(ReconcileResult::is_error))?;
        let _guard = self.span.enter();
        warn!(id = %id, prerequisite = %failed, "skipping: prerequisite failed");
        let msg = format!("prerequisite {failed} failed");
        Some(
            ReconcileResult::error(ErrorKind::DependencyFailed, msg.clone()).with_detail(json!({
                "error": ErrorKind::DependencyFailed,
                "msg": msg,
                "prerequisite": failed,
            })),
        )
    }
}

fn trace_dispositions(loaded: &LoadedRepository) {
    for file in &loaded.files {
        let path = file.path.strip_prefix(&loaded.root).unwrap_or(&file.path);
        info!(path = %path.display(), disposition = %file.disposition, "file");
    }
}
