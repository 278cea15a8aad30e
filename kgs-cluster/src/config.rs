use std::time::Duration;

pub const DEFAULT_KUBECTL: &str = "kubectl";
pub const DEFAULT_HELM: &str = "helm";
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(300);

/// Where the external tools live and how long one call may take.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolConfig {
    pub kubectl: String,
    pub helm: String,
    /// `None` disables the per-call timeout.
    pub timeout: Option<Duration>,
}

impl Default for ToolConfig {
    fn default() -> Self {
        Self {
            kubectl: DEFAULT_KUBECTL.to_string(),
            helm: DEFAULT_HELM.to_string(),
            timeout: Some(DEFAULT_COMMAND_TIMEOUT),
        }
    }
}
