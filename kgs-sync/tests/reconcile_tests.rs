//! End-to-end reconcile runs against a scripted kubectl/helm.
//!
//! Each test writes a repository into a `TempDir`, scripts the external
//! tools' replies, runs the pipeline and asserts results plus the exact
//! external calls.

use std::fs;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use kgs_cluster::testing::{ScriptedRunner, ANY};
use kgs_cluster::{ClusterError, CommandOutput, CommandRunner, Invocation, ToolConfig, Tools};
use kgs_core::{ErrorKind, ResultKind};
use kgs_sync::{DependencyFailurePolicy, Pipeline, ReconcileOptions, RunReport, SyncError};
use rstest::rstest;
use serde_json::{json, Value};
use tempfile::TempDir;
use tracing::Span;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn make_repo(files: &[(&str, &str)]) -> TempDir {
    let dir = TempDir::new().expect("tempdir");
    for (rel, content) in files {
        let path = dir.path().join(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("mkdir");
        }
        fs::write(path, content).expect("write fixture");
    }
    dir
}

async fn run(repo: &TempDir, runner: &Arc<ScriptedRunner>, options: ReconcileOptions) -> Result<RunReport, SyncError> {
    let tools = Tools::with_runner(&ToolConfig::default(), runner.clone());
    Pipeline::new(tools, options, Span::none()).run(repo.path()).await
}

fn kind_of(report: &RunReport, id: &str) -> ResultKind {
    report.get(id).unwrap_or_else(|| panic!("no result for {id}")).kind
}

/// Calls that would change the cluster.
fn mutating_calls(runner: &ScriptedRunner) -> Vec<String> {
    runner
        .calls()
        .iter()
        .map(ToString::to_string)
        .filter(|line| {
            line.contains(" apply ")
                || line.contains("create namespace")
                || line.starts_with("helm upgrade")
                || line.contains(" delete ")
                || line.contains(" uninstall ")
        })
        .collect()
}

fn not_found(kind: &str, name: &str) -> String {
    format!("Error from server (NotFound): {kind} \"{name}\" not found")
}

const WEB: &str = "kind: Deployment\nmetadata:\n  name: web\n  namespace: default\nspec:\n  replicas: 1\n";
const SVC: &str = "name: svc\nchart:\n  name: nginx\n  version: 1.2.0\n";

fn config_map(name: &str) -> String {
    format!("kind: ConfigMap\nmetadata:\n  name: {name}\ndata:\n  key: value\n")
}

// ---------------------------------------------------------------------------
// Raw manifests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn absent_deployment_is_created_after_namespace() {
    let repo = make_repo(&[("app.yaml", WEB)]);
    let runner = Arc::new(
        ScriptedRunner::new()
            .fail("kubectl -n default get Deployment web", 1, &not_found("deployments.apps", "web"))
            .reply("kubectl create namespace default", "namespace/default created")
            .reply("kubectl -n default apply -f -", "deployment.apps/web created"),
    );

    let report = run(&repo, &runner, ReconcileOptions::default()).await.unwrap();
    assert_eq!(kind_of(&report, "deployment.default.web"), ResultKind::Updated);

    let lines: Vec<String> = runner.calls().iter().map(ToString::to_string).collect();
    assert_eq!(
        lines,
        vec![
            "kubectl -n default get Deployment web -o json",
            "kubectl create namespace default",
            "kubectl -n default apply -f -",
        ]
    );

    let applied: Value = serde_json::from_str(runner.calls()[2].stdin.as_deref().unwrap()).unwrap();
    assert_eq!(applied["metadata"]["labels"]["k8s-gitsync/managed"], "true");
    assert!(applied["metadata"]["annotations"]["k8s-gitsync/last-applied-confighash"].is_string());
}

#[tokio::test]
async fn second_run_over_applied_state_is_a_no_op() {
    let repo = make_repo(&[("app.yaml", WEB)]);
    let first = Arc::new(
        ScriptedRunner::new()
            .fail("kubectl -n default get", 1, &not_found("deployments.apps", "web"))
            .reply("kubectl create namespace", "")
            .reply("kubectl -n default apply", ""),
    );
    run(&repo, &first, ReconcileOptions::default()).await.unwrap();
    let applied = first
        .calls()
        .into_iter()
        .find_map(|c| c.stdin)
        .expect("apply payload");

    // The cluster echoes the applied document back with server-side fields.
    let mut live: Value = serde_json::from_str(&applied).unwrap();
    live["metadata"]["uid"] = json!("7f0c");
    live["metadata"]["resourceVersion"] = json!("42");
    live["status"] = json!({"readyReplicas": 1});

    let second = Arc::new(ScriptedRunner::new().reply("kubectl -n default get Deployment web", &live.to_string()));
    let report = run(&repo, &second, ReconcileOptions::default()).await.unwrap();

    assert_eq!(kind_of(&report, "deployment.default.web"), ResultKind::Success);
    assert!(mutating_calls(&second).is_empty());
}

#[tokio::test]
async fn edited_manifest_is_reapplied() {
    let repo = make_repo(&[("app.yaml", WEB)]);
    let live = json!({"kind": "Deployment", "metadata": {"name": "web", "namespace": "default",
        "annotations": {"k8s-gitsync/last-applied-confighash": "0000"}}});
    let runner = Arc::new(
        ScriptedRunner::new()
            .reply("kubectl -n default get", &live.to_string())
            .reply("kubectl create namespace", "")
            .reply("kubectl -n default apply", ""),
    );

    let report = run(&repo, &runner, ReconcileOptions::default()).await.unwrap();
    assert_eq!(kind_of(&report, "deployment.default.web"), ResultKind::Updated);
}

#[tokio::test]
async fn probe_failure_isolates_the_manifest() {
    let repo = make_repo(&[("a.yaml", config_map("alpha").as_str()), ("b.yaml", config_map("beta").as_str())]);
    let runner = Arc::new(
        ScriptedRunner::new()
            .fail("kubectl -n default get ConfigMap alpha", 1, "error: You must be logged in")
            .fail("kubectl -n default get ConfigMap beta", 1, &not_found("configmaps", "beta"))
            .reply("kubectl create namespace", "")
            .reply("kubectl -n default apply", ""),
    );

    let report = run(&repo, &runner, ReconcileOptions::default()).await.unwrap();
    let alpha = report.get("configmap.default.alpha").unwrap();
    assert_eq!(alpha.kind, ResultKind::Error);
    assert_eq!(alpha.error_kind(), Some(ErrorKind::ExternalCommand));
    assert_eq!(kind_of(&report, "configmap.default.beta"), ResultKind::Updated);
    assert!(report.has_errors());
}

#[tokio::test]
async fn failed_apply_is_an_error_result() {
    let repo = make_repo(&[("app.yaml", WEB)]);
    let runner = Arc::new(
        ScriptedRunner::new()
            .fail("kubectl -n default get", 1, &not_found("deployments.apps", "web"))
            .reply("kubectl create namespace", "")
            .fail("kubectl -n default apply", 1, "error validating data"),
    );

    let report = run(&repo, &runner, ReconcileOptions::default()).await.unwrap();
    let web = report.get("deployment.default.web").unwrap();
    assert_eq!(web.error_kind(), Some(ErrorKind::ExternalCommand));
}

#[tokio::test]
async fn namespace_is_ensured_once_per_run() {
    let repo = make_repo(&[
        ("a.yaml", config_map("alpha").as_str()),
        ("b.yaml", config_map("beta").as_str()),
        ("c.yaml", config_map("gamma").as_str()),
    ]);
    let runner = Arc::new(
        ScriptedRunner::new()
            .fail("kubectl -n default get", 1, &not_found("configmaps", "x"))
            .reply("kubectl create namespace", "")
            .reply("kubectl -n default apply", ""),
    );

    let report = run(&repo, &runner, ReconcileOptions::default()).await.unwrap();
    assert_eq!(report.count(ResultKind::Updated), 3);
    assert_eq!(runner.calls_matching("kubectl create namespace").len(), 1);
}

// ---------------------------------------------------------------------------
// Releases
// ---------------------------------------------------------------------------

fn svc_listing() -> String {
    json!([{"name": "svc", "namespace": "default", "chart": "nginx-1.2.0"}]).to_string()
}

#[tokio::test]
async fn unchanged_release_is_success_without_install() {
    let repo = make_repo(&[("svc.helm", SVC), ("svc.values.yaml", "replicas: 2\n")]);
    let runner = Arc::new(
        ScriptedRunner::new()
            .reply("helm -n default list --filter ^svc$", &svc_listing())
            .reply(
                "helm -n default get values svc",
                r#"{"k8s-gitsync": {"managed": true}, "replicas": 2}"#,
            ),
    );

    let report = run(&repo, &runner, ReconcileOptions::default()).await.unwrap();
    assert_eq!(kind_of(&report, "release.default.svc"), ResultKind::Success);
    assert!(runner.calls_matching("helm upgrade").is_empty());
}

#[rstest]
#[case::values_drift(r#"{"k8s-gitsync": {"managed": true}, "replicas": 3}"#, "nginx-1.2.0")]
#[case::chart_drift(r#"{"k8s-gitsync": {"managed": true}, "replicas": 2}"#, "nginx-1.1.0")]
#[tokio::test]
async fn drifted_release_is_upgraded(#[case] live_values: &str, #[case] live_chart: &str) {
    let repo = make_repo(&[("svc.helm", SVC), ("svc.values.yaml", "replicas: 2\n")]);
    let listing = json!([{"name": "svc", "namespace": "default", "chart": live_chart}]).to_string();
    let runner = Arc::new(
        ScriptedRunner::new()
            .reply("helm -n default list", &listing)
            .reply("helm -n default get values svc", live_values)
            .reply("kubectl create namespace", "")
            .reply("helm upgrade", "{}"),
    );

    let report = run(&repo, &runner, ReconcileOptions::default()).await.unwrap();
    assert_eq!(kind_of(&report, "release.default.svc"), ResultKind::Updated);

    let upgrade = runner
        .calls()
        .into_iter()
        .find(|c| c.args.first().map(String::as_str) == Some("upgrade"))
        .expect("upgrade call");
    let sent: Value = serde_yaml::from_str(upgrade.stdin.as_deref().unwrap()).unwrap();
    assert_eq!(sent, json!({"replicas": 2, "k8s-gitsync": {"managed": true}}));
}

#[tokio::test]
async fn missing_release_is_installed() {
    let repo = make_repo(&[("svc.helm", SVC)]);
    let runner = Arc::new(
        ScriptedRunner::new()
            .reply("helm -n default list", "[]")
            .reply("kubectl create namespace", "")
            .reply("helm upgrade", "{}"),
    );

    let report = run(&repo, &runner, ReconcileOptions::default()).await.unwrap();
    assert_eq!(kind_of(&report, "release.default.svc"), ResultKind::Updated);
    assert_eq!(
        runner.calls_matching("helm upgrade"),
        vec!["helm upgrade --install svc nginx --namespace default --version 1.2.0 --values - --output json"]
    );
}

// ---------------------------------------------------------------------------
// Dry-run
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dry_run_reports_without_mutating() {
    let repo = make_repo(&[
        ("app.yaml", WEB),
        ("svc.helm", SVC),
        ("svc.values.yaml", "replicas: 2\n"),
    ]);
    let runner = Arc::new(
        ScriptedRunner::new()
            .fail("kubectl -n default get", 1, &not_found("deployments.apps", "web"))
            .reply("helm -n default list", &svc_listing())
            .reply("helm -n default get values svc", r#"{"replicas": 5}"#)
            .reply(ANY, ""),
    );

    let options = ReconcileOptions {
        dry_run: true,
        ..ReconcileOptions::default()
    };
    let report = run(&repo, &runner, options).await.unwrap();

    assert_eq!(kind_of(&report, "deployment.default.web"), ResultKind::DryRunSkipped);
    assert_eq!(kind_of(&report, "release.default.svc"), ResultKind::DryRunSkipped);
    assert!(mutating_calls(&runner).is_empty(), "got: {:?}", mutating_calls(&runner));
}

// ---------------------------------------------------------------------------
// Ordering
// ---------------------------------------------------------------------------

const ABC_DEPENDS: &str = "configmap.default.beta: [configmap.default.alpha]\n\
                           configmap.default.gamma: [configmap.default.alpha]\n";

fn abc_repo(depends: &str) -> TempDir {
    // Walk order puts alpha last so ordering is driven by depends.yaml alone.
    make_repo(&[
        ("1-beta.yaml", config_map("beta").as_str()),
        ("2-gamma.yaml", config_map("gamma").as_str()),
        ("3-alpha.yaml", config_map("alpha").as_str()),
        ("depends.yaml", depends),
    ])
}

fn get_position(runner: &ScriptedRunner, name: &str) -> usize {
    let needle = format!("get ConfigMap {name} ");
    runner
        .calls()
        .iter()
        .position(|c| c.to_string().contains(&needle))
        .unwrap_or_else(|| panic!("{name} was never probed"))
}

#[rstest]
#[case::sequential(true)]
#[case::concurrent(false)]
#[tokio::test]
async fn prerequisite_is_reconciled_first(#[case] sequential: bool) {
    let repo = abc_repo(ABC_DEPENDS);
    let runner = Arc::new(
        ScriptedRunner::new()
            .fail("kubectl -n default get", 1, &not_found("configmaps", "x"))
            .reply(ANY, ""),
    );
    let options = ReconcileOptions {
        sequential,
        ..ReconcileOptions::default()
    };

    let report = run(&repo, &runner, options).await.unwrap();
    assert_eq!(report.count(ResultKind::Updated), 3);

    let alpha = get_position(&runner, "alpha");
    assert!(alpha < get_position(&runner, "beta"));
    assert!(alpha < get_position(&runner, "gamma"));
    // Results stay in load order regardless of scheduling.
    let ids: Vec<&str> = report.outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["configmap.default.beta", "configmap.default.gamma", "configmap.default.alpha"]);
}

#[tokio::test]
async fn cycle_fails_before_any_external_call() {
    let repo = make_repo(&[
        ("a.yaml", config_map("alpha").as_str()),
        ("b.yaml", config_map("beta").as_str()),
        (
            "depends.yaml",
            "configmap.default.alpha: [configmap.default.beta]\nconfigmap.default.beta: [configmap.default.alpha]\n",
        ),
    ]);
    let runner = Arc::new(ScriptedRunner::new().reply(ANY, ""));

    let err = run(&repo, &runner, ReconcileOptions::default()).await.unwrap_err();
    assert!(matches!(err, SyncError::Cycle { .. }), "got: {err}");
    assert_eq!(err.kind(), ErrorKind::CycleDetected);
    assert!(runner.calls().is_empty());
}

#[tokio::test]
async fn unknown_prerequisite_fails_the_run() {
    let repo = make_repo(&[
        ("a.yaml", config_map("alpha").as_str()),
        ("depends.yaml", "configmap.default.alpha: [secret.default.ghost]\n"),
    ]);
    let runner = Arc::new(ScriptedRunner::new());

    let err = run(&repo, &runner, ReconcileOptions::default()).await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidManifest);
    assert!(runner.calls().is_empty());
}

#[rstest]
#[case::sequential(true)]
#[case::concurrent(false)]
#[tokio::test]
async fn failed_prerequisite_skips_dependents(#[case] sequential: bool) {
    let repo = abc_repo(&format!("{ABC_DEPENDS}configmap.default.delta: [configmap.default.beta]\n"));
    fs::write(repo.path().join("4-delta.yaml"), config_map("delta")).unwrap();
    let runner = Arc::new(
        ScriptedRunner::new()
            .fail("kubectl -n default get ConfigMap alpha", 1, "connection refused")
            .fail("kubectl -n default get", 1, &not_found("configmaps", "x"))
            .reply(ANY, ""),
    );
    let options = ReconcileOptions {
        sequential,
        ..ReconcileOptions::default()
    };

    let report = run(&repo, &runner, options).await.unwrap();
    assert_eq!(
        report.get("configmap.default.alpha").unwrap().error_kind(),
        Some(ErrorKind::ExternalCommand)
    );
    for dependent in ["configmap.default.beta", "configmap.default.gamma", "configmap.default.delta"] {
        let result = report.get(dependent).unwrap();
        assert_eq!(result.error_kind(), Some(ErrorKind::DependencyFailed), "{dependent}: {result}");
    }
    let beta = report.get("configmap.default.beta").unwrap();
    assert_eq!(beta.detail.as_ref().unwrap()["prerequisite"], "configmap.default.alpha");
    assert!(runner.calls_matching("kubectl -n default get ConfigMap beta").is_empty());
}

#[tokio::test]
async fn proceed_policy_still_runs_dependents() {
    let repo = abc_repo(ABC_DEPENDS);
    let runner = Arc::new(
        ScriptedRunner::new()
            .fail("kubectl -n default get ConfigMap alpha", 1, "connection refused")
            .fail("kubectl -n default get", 1, &not_found("configmaps", "x"))
            .reply(ANY, ""),
    );
    let options = ReconcileOptions {
        on_dependency_failure: DependencyFailurePolicy::Proceed,
        ..ReconcileOptions::default()
    };

    let report = run(&repo, &runner, options).await.unwrap();
    assert_eq!(kind_of(&report, "configmap.default.alpha"), ResultKind::Error);
    assert_eq!(kind_of(&report, "configmap.default.beta"), ResultKind::Updated);
    assert_eq!(kind_of(&report, "configmap.default.gamma"), ResultKind::Updated);
}

#[tokio::test]
async fn single_job_still_completes_everything() {
    let repo = abc_repo(ABC_DEPENDS);
    let runner = Arc::new(
        ScriptedRunner::new()
            .fail("kubectl -n default get", 1, &not_found("configmaps", "x"))
            .reply(ANY, ""),
    );
    let options = ReconcileOptions {
        jobs: 1,
        ..ReconcileOptions::default()
    };
    let report = run(&repo, &runner, options).await.unwrap();
    assert_eq!(report.count(ResultKind::Updated), 3);
}

/// Delegates to a scripted runner while tracking how many calls overlap.
struct OverlapCounter {
    inner: ScriptedRunner,
    current: AtomicUsize,
    peak: AtomicUsize,
}

#[async_trait]
impl CommandRunner for OverlapCounter {
    async fn run(&self, invocation: &Invocation) -> Result<CommandOutput, ClusterError> {
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let out = self.inner.run(invocation).await;
        self.current.fetch_sub(1, Ordering::SeqCst);
        out
    }
}

#[rstest]
#[case(1)]
#[case(2)]
#[case(3)]
#[tokio::test]
async fn in_flight_reconciles_never_exceed_jobs(#[case] jobs: usize) {
    let names = ["a", "b", "c", "d"];
    let files: Vec<(String, String)> = names
        .iter()
        .map(|n| (format!("{n}.yaml"), config_map(n)))
        .collect();
    let refs: Vec<(&str, &str)> = files.iter().map(|(p, c)| (p.as_str(), c.as_str())).collect();
    let repo = make_repo(&refs);

    let counter = Arc::new(OverlapCounter {
        inner: ScriptedRunner::new()
            .fail("kubectl -n default get", 1, &not_found("configmaps", "x"))
            .reply(ANY, ""),
        current: AtomicUsize::new(0),
        peak: AtomicUsize::new(0),
    });
    let tools = Tools::with_runner(&ToolConfig::default(), counter.clone());
    let options = ReconcileOptions {
        jobs,
        ..ReconcileOptions::default()
    };
    let report = Pipeline::new(tools, options, Span::none())
        .run(repo.path())
        .await
        .unwrap();

    assert_eq!(report.count(ResultKind::Updated), names.len());
    assert_eq!(counter.peak.load(Ordering::SeqCst), jobs);
}

#[tokio::test]
async fn missing_kubectl_is_an_external_command_error() {
    let repo = make_repo(&[("app.yaml", WEB)]);
    let runner = Arc::new(ScriptedRunner::new().unavailable("kubectl"));
    let report = run(&repo, &runner, ReconcileOptions::default()).await.unwrap();

    let result = report.get("deployment.default.web").expect("result");
    assert_eq!(result.kind, ResultKind::Error);
    assert_eq!(result.error_kind(), Some(ErrorKind::ExternalCommand));
    assert!(mutating_calls(&runner).is_empty());
}

// ---------------------------------------------------------------------------
// Prune
// ---------------------------------------------------------------------------

fn live_config_map(name: &str, managed: Option<&str>) -> Value {
    let mut doc = json!({"kind": "ConfigMap", "metadata": {"name": name, "namespace": "default"}});
    if let Some(value) = managed {
        doc["metadata"]["labels"] = json!({"k8s-gitsync/managed": value});
    }
    doc
}

fn prune_runner() -> ScriptedRunner {
    let items = json!({"items": [
        live_config_map("keep", Some("true")),
        live_config_map("orphan", Some("true")),
        live_config_map("foreign", None),
        live_config_map("disowned", Some("false")),
    ]});
    let releases = json!([
        {"name": "old", "namespace": "apps", "chart": "redis-1.0.0"},
        {"name": "handmade", "namespace": "apps", "chart": "redis-1.0.0"},
    ]);
    ScriptedRunner::new()
        .reply("kubectl api-resources", "configmaps\n")
        .reply("kubectl get configmaps --all-namespaces", &items.to_string())
        .reply("helm list --all-namespaces", &releases.to_string())
        .reply("helm -n apps get values old", r#"{"k8s-gitsync": {"managed": true}}"#)
        .reply("helm -n apps get values handmade", "null")
        .reply(ANY, "")
}

fn clean() -> ReconcileOptions {
    ReconcileOptions {
        clean: true,
        ..ReconcileOptions::default()
    }
}

#[tokio::test]
async fn prune_deletes_only_managed_orphans() {
    let repo = make_repo(&[("keep.yaml", config_map("keep").as_str())]);
    let runner = Arc::new(prune_runner());

    let report = run(&repo, &runner, clean()).await.unwrap();

    let ids: Vec<&str> = report.outcomes.iter().map(|o| o.id.as_str()).collect();
    assert_eq!(ids, vec!["configmap.default.orphan", "release.apps.old"]);
    assert_eq!(report.count(ResultKind::Updated), 2);
    assert_eq!(
        mutating_calls(&runner),
        vec!["kubectl -n default delete ConfigMap orphan", "helm -n apps uninstall old"]
    );
}

#[tokio::test]
async fn unmanaged_objects_are_never_candidates() {
    // Nothing is declared, so only the marker decides.
    let runner = Arc::new(prune_runner());
    let tools = Tools::with_runner(&ToolConfig::default(), runner.clone());
    let reconciler = kgs_sync::Reconciler::new(tools, true);

    let ids: Vec<String> = reconciler
        .prune_candidates(&[])
        .await
        .unwrap()
        .iter()
        .map(|c| c.id().0)
        .collect();
    assert_eq!(ids, vec!["configmap.default.keep", "configmap.default.orphan", "release.apps.old"]);
}

#[tokio::test]
async fn dry_run_prune_deletes_nothing() {
    let repo = make_repo(&[("keep.yaml", config_map("keep").as_str())]);
    let runner = Arc::new(prune_runner());
    let options = ReconcileOptions {
        dry_run: true,
        ..clean()
    };

    let report = run(&repo, &runner, options).await.unwrap();
    assert_eq!(report.count(ResultKind::DryRunSkipped), 2);
    assert!(mutating_calls(&runner).is_empty());
}

#[tokio::test]
async fn vanished_orphan_is_not_found() {
    let repo = make_repo(&[("keep.yaml", config_map("keep").as_str())]);
    let runner = Arc::new(
        prune_runner()
            .fail("kubectl -n default delete ConfigMap orphan", 1, &not_found("configmaps", "orphan"))
            .fail("helm -n apps uninstall old", 1, "Error: uninstall: Release not loaded: old: release: not found"),
    );

    let report = run(&repo, &runner, clean()).await.unwrap();
    assert_eq!(report.count(ResultKind::NotFound), 2);
    assert!(!report.has_errors());
}

#[tokio::test]
async fn listing_failure_aborts_prune() {
    let repo = make_repo(&[("keep.yaml", config_map("keep").as_str())]);
    let runner = Arc::new(ScriptedRunner::new().fail("kubectl api-resources", 1, "Unauthorized"));

    let err = run(&repo, &runner, clean()).await.unwrap_err();
    assert!(matches!(err, SyncError::Cluster(_)), "got: {err}");
    assert!(mutating_calls(&runner).is_empty());
}

// ---------------------------------------------------------------------------
// Load failures
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_manifest_aborts_before_any_call() {
    let repo = make_repo(&[("ok.yaml", WEB), ("bad.yaml", "kind: [unclosed\n")]);
    let runner = Arc::new(ScriptedRunner::new().reply(ANY, ""));

    let err = run(&repo, &runner, ReconcileOptions::default()).await.unwrap_err();
    assert!(matches!(err, SyncError::Load(_)), "got: {err}");
    assert!(runner.calls().is_empty());
}
