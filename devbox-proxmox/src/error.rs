use thiserror::Error;

pub type Result<T> = std::result::Result<T, ControlPlaneError>;

#[derive(Error, Debug, Clone)]
pub enum ControlPlaneError {
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Provisioning rejected: {0}")]
    Provisioning(String),

    #[error("Guest id {0} is already in use")]
    GuestExists(u32),

    #[error("Task {upid} did not finish within {timeout_secs}s")]
    TaskTimeout { upid: String, timeout_secs: u64 },

    #[error("Unexpected response: {0}")]
    Protocol(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl ControlPlaneError {
    /// Network-level failures may succeed on a later attempt; everything else
    /// is a verdict from the platform.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ControlPlaneError::Transport(_))
    }
}

impl From<reqwest::Error> for ControlPlaneError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ControlPlaneError::Protocol(err.to_string())
        } else {
            ControlPlaneError::Transport(err.to_string())
        }
    }
}
