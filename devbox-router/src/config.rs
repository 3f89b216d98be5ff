use serde::Deserialize;

/// Caddy admin endpoint and the public naming scheme for workspaces.
#[derive(Debug, Clone, Deserialize)]
pub struct CaddyConfig {
    /// Admin API base, e.g. `http://127.0.0.1:2019`.
    #[serde(default = "default_admin_url")]
    pub admin_url: String,

    /// Name of the HTTP server under `apps.http.servers`.
    #[serde(default = "default_server")]
    pub server: String,

    /// User hosts are `<login>.<base_domain>`.
    pub base_domain: String,

    /// Port the workspace listens on inside the guest.
    #[serde(default = "default_upstream_port")]
    pub upstream_port: u16,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

fn default_admin_url() -> String {
    "http://127.0.0.1:2019".to_string()
}

fn default_server() -> String {
    "srv0".to_string()
}

fn default_upstream_port() -> u16 {
    8080
}

fn default_timeout() -> u64 {
    10
}

impl CaddyConfig {
    pub fn new(admin_url: impl Into<String>, base_domain: impl Into<String>) -> Self {
        Self {
            admin_url: admin_url.into(),
            server: default_server(),
            base_domain: base_domain.into(),
            upstream_port: default_upstream_port(),
            timeout_secs: default_timeout(),
        }
    }
}
