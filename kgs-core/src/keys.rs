//! Well-known names shared by the loader, the reconciler and the cluster.

/// Namespace assumed when a document does not declare one.
pub const DEFAULT_NAMESPACE: &str = "default";

/// Annotation holding the fingerprint of the last applied desired document.
pub const FINGERPRINT_ANNOTATION: &str = "k8s-gitsync/last-applied-confighash";

/// Label marking a live object as owned by this tool.
pub const MANAGED_LABEL: &str = "k8s-gitsync/managed";

/// Value of [`MANAGED_LABEL`] on owned objects.
pub const MANAGED_LABEL_VALUE: &str = "true";

/// Top-level values key marking a release as owned by this tool.
///
/// Its value is `{managed: true}`.
pub const RELEASE_MANAGED_KEY: &str = "k8s-gitsync";

/// Suffix of a release descriptor file.
pub const RELEASE_SUFFIX: &str = ".helm";

/// Suffixes of release values sidecar files.
pub const VALUES_SUFFIXES: [&str; 2] = [".values.yaml", ".values.yml"];

/// Suffixes of raw manifest files.
pub const MANIFEST_SUFFIXES: [&str; 2] = [".yaml", ".yml"];

/// Reserved ordering file at the repository root.
pub const DEPENDS_FILE: &str = "depends.yaml";

/// File that marks a directory as a checked-in chart source tree.
pub const CHART_FILE: &str = "Chart.yaml";
