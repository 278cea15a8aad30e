use std::time::Duration;

use thiserror::Error;

/// Error surface of the external tool clients.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// The tool reported that the resource or release does not exist.
    #[error("not found: {what}")]
    NotFound { what: String },

    #[error("failed to spawn `{program}`: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error talking to `{command}`: {source}")]
    Io {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("`{command}` timed out after {}s", after.as_secs())]
    Timeout { command: String, after: Duration },

    #[error("`{command}` exited with {}: {stderr}", code.map_or_else(|| "signal".to_string(), |c| c.to_string()))]
    Failed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    #[error("unexpected output from `{command}`: {reason}")]
    Malformed { command: String, reason: String },

    #[error("failed to encode input for `{command}`: {reason}")]
    Encode { command: String, reason: String },
}

impl ClusterError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ClusterError::NotFound { .. })
    }
}
