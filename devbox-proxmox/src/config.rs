use std::fmt;
use std::time::Duration;

use serde::Deserialize;

/// Connection and authentication settings for the Proxmox API.
///
/// Either `username`/`password` (ticket login) or `token_id`/`token_secret`
/// (API token) must be set. A token takes precedence when both are present.
#[derive(Clone, Deserialize)]
pub struct ProxmoxConfig {
    /// Base URL of the API host, e.g. `https://pve.lan:8006`.
    pub url: String,

    #[serde(default)]
    pub username: String,

    #[serde(default)]
    pub password: String,

    #[serde(default = "default_realm")]
    pub realm: String,

    /// Full token id, e.g. `devbox@pve!launcher`.
    #[serde(default)]
    pub token_id: Option<String>,

    #[serde(default)]
    pub token_secret: Option<String>,

    /// Accept self-signed certificates (default Proxmox install).
    #[serde(default)]
    pub insecure_tls: bool,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_task_timeout")]
    pub task_timeout_secs: u64,

    #[serde(default = "default_task_poll_interval")]
    pub task_poll_interval_ms: u64,
}

fn default_realm() -> String {
    "pam".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_task_timeout() -> u64 {
    300
}

fn default_task_poll_interval() -> u64 {
    1000
}

impl ProxmoxConfig {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            username: String::new(),
            password: String::new(),
            realm: default_realm(),
            token_id: None,
            token_secret: None,
            insecure_tls: false,
            request_timeout_secs: default_request_timeout(),
            task_timeout_secs: default_task_timeout(),
            task_poll_interval_ms: default_task_poll_interval(),
        }
    }

    pub fn with_password(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.username = username.into();
        self.password = password.into();
        self
    }

    /// `user@realm`; the realm is appended unless the username already has one.
    pub fn qualified_username(&self) -> String {
        if self.username.contains('@') {
            self.username.clone()
        } else {
            format!("{}@{}", self.username, self.realm)
        }
    }

    pub fn uses_token(&self) -> bool {
        self.token_id.is_some() && self.token_secret.is_some()
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }

    pub fn task_poll_interval(&self) -> Duration {
        Duration::from_millis(self.task_poll_interval_ms)
    }
}

impl fmt::Debug for ProxmoxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxmoxConfig")
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("realm", &self.realm)
            .field("token_id", &self.token_id)
            .field("token_secret", &self.token_secret.as_ref().map(|_| "<redacted>"))
            .field("insecure_tls", &self.insecure_tls)
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("task_timeout_secs", &self.task_timeout_secs)
            .field("task_poll_interval_ms", &self.task_poll_interval_ms)
            .finish()
    }
}
