//! External collaborators: the cluster-apply tool (`kubectl`) and the
//! release tool (`helm`), driven as child processes.
//!
//! Every call goes through a [`CommandRunner`], so tests can swap the real
//! [`ProcessRunner`] for a scripted one.

pub mod config;
mod error;
pub mod helm;
pub mod kubectl;
pub mod runner;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

use std::sync::Arc;

pub use config::ToolConfig;
pub use error::ClusterError;
pub use helm::{Helm, ReleaseInfo};
pub use kubectl::Kubectl;
pub use runner::{CommandOutput, CommandRunner, Invocation, ProcessRunner};

/// Both clients, sharing one runner.
#[derive(Clone)]
pub struct Tools {
    pub kubectl: Kubectl,
    pub helm: Helm,
}

impl Tools {
    /// Clients that spawn real processes, bounded by `config.timeout`.
    pub fn new(config: &ToolConfig) -> Self {
        Self::with_runner(config, Arc::new(ProcessRunner::new(config.timeout)))
    }

    pub fn with_runner(config: &ToolConfig, runner: Arc<dyn CommandRunner>) -> Self {
        Self {
            kubectl: Kubectl::new(runner.clone(), &config.kubectl),
            helm: Helm::new(runner, &config.helm),
        }
    }
}
