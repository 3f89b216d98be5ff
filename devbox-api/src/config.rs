use std::path::{Path, PathBuf};
use std::time::Duration;

use devbox_core::{AddressTemplate, WorkloadKind};
use devbox_logging::LogSettings;
use devbox_orchestrator::ReconcileSettings;
use devbox_proxmox::{ProxmoxConfig, ResourceSpec};
use devbox_router::CaddyConfig;
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml_ng::Error,
    },

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Service configuration, read from one YAML file.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,

    pub proxmox: ProxmoxConfig,

    pub workload: WorkloadConfig,

    pub caddy: CaddyConfig,

    #[serde(default)]
    pub logging: LogSettings,

    /// Allowed users, JSON or YAML `{users: [{login, id, pubkey?}]}`.
    pub users_file: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Upper bound on one workspace request, readiness wait included.
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

fn default_bind_addr() -> String {
    "0.0.0.0:3121".to_string()
}

fn default_request_timeout() -> u64 {
    180
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Template, placement and sizing of user guests.
#[derive(Debug, Clone, Deserialize)]
pub struct WorkloadConfig {
    pub node: String,

    #[serde(default)]
    pub kind: WorkloadKind,

    pub template_id: u32,

    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    #[serde(default)]
    pub resources: ResourceSpec,

    /// e.g. `10.0.0.%d/24`; `%d` (decimal) or `%x` (hex) is replaced by the user id.
    pub address_template: AddressTemplate,

    #[serde(default = "default_max_wait")]
    pub max_wait_secs: u64,

    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
}

fn default_name_prefix() -> String {
    "codeserver-".to_string()
}

fn default_max_wait() -> u64 {
    120
}

fn default_poll_interval() -> u64 {
    1000
}

impl WorkloadConfig {
    pub fn reconcile_settings(&self) -> ReconcileSettings {
        let mut settings =
            ReconcileSettings::new(&self.node, self.template_id, self.address_template.clone());
        settings.kind = self.kind;
        settings.name_prefix = self.name_prefix.clone();
        settings.resources = self.resources.clone();
        settings.max_wait = Duration::from_secs(self.max_wait_secs);
        settings.poll_interval = Duration::from_millis(self.poll_interval_ms);
        settings
    }
}

impl Config {
    /// Load from `path`, apply environment overrides, then validate.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let mut config: Config =
            serde_yaml_ng::from_str(&content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Secrets and the bind address may come from the environment instead of
    /// the file.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(password) = lookup("DEVBOX_PROXMOX_PASSWORD") {
            debug!("Proxmox password taken from environment");
            self.proxmox.password = password;
        }
        if let Some(secret) = lookup("DEVBOX_PROXMOX_TOKEN_SECRET") {
            debug!("Proxmox token secret taken from environment");
            self.proxmox.token_secret = Some(secret);
        }
        if let Some(bind) = lookup("DEVBOX_BIND") {
            self.server.bind_addr = bind;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Invalid(msg.to_string()));

        if !self.proxmox.uses_token()
            && (self.proxmox.username.is_empty() || self.proxmox.password.is_empty())
        {
            return invalid("proxmox needs username and password, or token_id and token_secret");
        }
        if self.workload.node.trim().is_empty() {
            return invalid("workload.node must not be empty");
        }
        if self.workload.max_wait_secs == 0 || self.workload.poll_interval_ms == 0 {
            return invalid("workload.max_wait_secs and workload.poll_interval_ms must be non-zero");
        }
        if self.workload.poll_interval_ms > self.workload.max_wait_secs * 1000 {
            return invalid("workload.poll_interval_ms exceeds workload.max_wait_secs");
        }
        if self.server.request_timeout_secs == 0 {
            return invalid("server.request_timeout_secs must be non-zero");
        }
        if self.caddy.base_domain.trim().is_empty() {
            return invalid("caddy.base_domain must not be empty");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    const SAMPLE: &str = r#"
server:
  bind_addr: 127.0.0.1:9000
proxmox:
  url: https://pve.lan:8006
  username: devbox
  realm: pve
  insecure_tls: true
workload:
  node: pve
  kind: lxc
  template_id: 9000
  address_template: 10.0.0.%d/24
  resources:
    cores: 4
    memory_mb: 4096
    storage: local-lvm
caddy:
  admin_url: http://127.0.0.1:2019
  base_domain: code.example.com
logging:
  level: debug
  format: json
users_file: /etc/devbox/users.yaml
"#;

    fn parse(yaml: &str) -> Config {
        serde_yaml_ng::from_str(yaml).unwrap()
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.replace("username: devbox", "username: devbox\n  password: pw").as_bytes())
            .unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.workload.template_id, 9000);
        assert_eq!(config.workload.resources.cores, 4);
        assert_eq!(config.caddy.upstream_port, 8080);
        assert_eq!(config.proxmox.qualified_username(), "devbox@pve");
        assert_eq!(config.server.request_timeout(), Duration::from_secs(180));
    }

    #[test]
    fn test_reconcile_settings() {
        let settings = parse(SAMPLE).workload.reconcile_settings();
        assert_eq!(settings.kind, WorkloadKind::Container);
        assert_eq!(settings.name_prefix, "codeserver-");
        assert_eq!(settings.max_wait, Duration::from_secs(120));
        assert_eq!(settings.poll_interval, Duration::from_secs(1));
        assert_eq!(settings.address.render(42).unwrap(), "10.0.0.42/24");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = parse(SAMPLE);
        let env: HashMap<&str, &str> = [
            ("DEVBOX_PROXMOX_PASSWORD", "from-env"),
            ("DEVBOX_BIND", "0.0.0.0:8000"),
        ]
        .into_iter()
        .collect();

        assert!(config.validate().is_err());
        config.apply_overrides(|key| env.get(key).map(|v| v.to_string()));
        assert_eq!(config.proxmox.password, "from-env");
        assert_eq!(config.server.bind_addr, "0.0.0.0:8000");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_bad_address_template() {
        let yaml = SAMPLE.replace("10.0.0.%d/24", "10.0.0.42");
        assert!(serde_yaml_ng::from_str::<Config>(&yaml).is_err());
    }

    #[test]
    fn test_rejects_zero_wait() {
        let mut config = parse(SAMPLE);
        config.proxmox.password = "pw".to_string();
        config.workload.max_wait_secs = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_missing_file() {
        let err = Config::load(Path::new("/nonexistent/devbox.yaml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
