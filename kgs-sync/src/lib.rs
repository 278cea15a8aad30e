//! # kgs-sync
//!
//! Dependency ordering, live-state probing, diffing and reconciliation.
//!
//! [`Pipeline::run`] is the entrypoint used by the CLI: it loads a
//! repository, validates `depends.yaml`, then either creates/updates every
//! manifest or prunes managed objects nothing declares any more.

pub mod depends;
pub mod differ;
pub mod error;
pub mod pipeline;
pub mod prober;
pub mod reconciler;
pub mod resolver;

pub use differ::is_changed;
pub use error::SyncError;
pub use pipeline::{DependencyFailurePolicy, Outcome, Pipeline, ReconcileOptions, RunReport};
pub use prober::{probe, ProbeError};
pub use reconciler::{PruneCandidate, Reconciler};
pub use resolver::{DependencyGraph, ReadySet};
