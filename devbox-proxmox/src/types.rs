//! Request parameters and API wire types.

use devbox_core::{Status, WorkloadInfo, WorkloadKind};
use serde::{Deserialize, Deserializer, Serialize};

/// Every Proxmox response wraps its payload in `data`.
#[derive(Debug, Deserialize)]
pub(crate) struct ApiResponse<T> {
    pub data: T,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TicketData {
    pub ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    pub csrf_prevention_token: String,
}

#[derive(Debug, Deserialize)]
pub(crate) struct TaskStatus {
    pub status: String,
    #[serde(default)]
    pub exitstatus: Option<String>,
}

impl TaskStatus {
    pub fn is_finished(&self) -> bool {
        self.status == "stopped"
    }

    /// Tasks that finished with warnings still did their job.
    pub fn succeeded(&self) -> bool {
        matches!(self.exitstatus.as_deref(), Some(exit) if exit == "OK" || exit.starts_with("WARNINGS"))
    }
}

/// Entry of `GET /nodes/{node}/{qemu|lxc}`.
#[derive(Debug, Deserialize)]
pub(crate) struct GuestEntry {
    #[serde(deserialize_with = "number_or_string")]
    pub vmid: u64,
    #[serde(default)]
    pub status: String,
    /// QEMU's own run state; only in VM lists requested with `full=1`.
    #[serde(default)]
    pub qmpstatus: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub lock: Option<String>,
    #[serde(default)]
    pub template: Option<serde_json::Value>,
    #[serde(default)]
    pub uptime: Option<u64>,
    #[serde(default)]
    pub cpus: Option<f64>,
    #[serde(default)]
    pub mem: Option<u64>,
    #[serde(default)]
    pub maxmem: Option<u64>,
    #[serde(default)]
    pub disk: Option<u64>,
    #[serde(default)]
    pub maxdisk: Option<u64>,
}

impl GuestEntry {
    fn is_template(&self) -> bool {
        match &self.template {
            Some(serde_json::Value::Bool(flag)) => *flag,
            Some(serde_json::Value::Number(n)) => n.as_u64() == Some(1),
            Some(serde_json::Value::String(s)) => s == "1",
            _ => false,
        }
    }

    fn status(&self) -> Status {
        let mut reported = Status::from_api(&self.status);
        // Paused and suspended VMs list as `running`.
        if reported == Status::Running {
            if let Some(qmp) = &self.qmpstatus {
                reported = Status::from_api(qmp);
            }
        }

        if self.is_template() {
            Status::Template
        } else if reported == Status::Stopped && self.lock.as_deref() == Some("suspended") {
            // Hibernated to disk; a start resumes it.
            Status::Suspended
        } else if self.lock.is_some() && reported != Status::Running {
            Status::Locked
        } else {
            reported
        }
    }

    /// `None` when the id does not fit a guest id.
    pub fn into_info(self, node: &str, kind: WorkloadKind) -> Option<WorkloadInfo> {
        let status = self.status();
        Some(WorkloadInfo {
            guest_id: u32::try_from(self.vmid).ok()?,
            kind,
            status,
            node: node.to_string(),
            name: self.name.unwrap_or_default(),
            uptime_seconds: self.uptime.unwrap_or(0),
            cpu_count: self.cpus.map(|c| c.round() as u32).unwrap_or(0),
            memory_bytes: self.mem.unwrap_or(0),
            max_memory_bytes: self.maxmem.unwrap_or(0),
            disk_bytes: self.disk.unwrap_or(0),
            max_disk_bytes: self.maxdisk.unwrap_or(0),
        })
    }
}

// The container list reports `vmid` as a string, the VM list as a number.
fn number_or_string<'de, D>(deserializer: D) -> std::result::Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Number(u64),
        Text(String),
    }

    match Raw::deserialize(deserializer)? {
        Raw::Number(n) => Ok(n),
        Raw::Text(s) => s.trim().parse().map_err(serde::de::Error::custom),
    }
}

/// Entry of `GET /cluster/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterNode {
    #[serde(rename = "type")]
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub online: Option<u8>,
    #[serde(default)]
    pub ip: Option<String>,
}

/// Resources applied to a freshly cloned guest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSpec {
    #[serde(default = "default_cores")]
    pub cores: u32,

    #[serde(default = "default_memory_mb")]
    pub memory_mb: u64,

    /// Target storage for a full clone; the template's storage when unset.
    #[serde(default)]
    pub storage: Option<String>,

    #[serde(default = "default_bridge")]
    pub bridge: String,

    #[serde(default = "default_true")]
    pub firewall: bool,

    #[serde(default)]
    pub gateway: Option<String>,

    #[serde(default = "default_true")]
    pub full_clone: bool,
}

fn default_cores() -> u32 {
    2
}

fn default_memory_mb() -> u64 {
    2048
}

fn default_bridge() -> String {
    "vmbr0".to_string()
}

fn default_true() -> bool {
    true
}

impl Default for ResourceSpec {
    fn default() -> Self {
        Self {
            cores: default_cores(),
            memory_mb: default_memory_mb(),
            storage: None,
            bridge: default_bridge(),
            firewall: true,
            gateway: None,
            full_clone: true,
        }
    }
}

impl ResourceSpec {
    /// Configuration keys for `PUT /nodes/{node}/{kind}/{id}/config`.
    ///
    /// Containers carry the address on `net0`; VMs get it through cloud-init
    /// `ipconfig0`.
    pub fn config_params(&self, kind: WorkloadKind, address: &str) -> Vec<(String, String)> {
        let firewall = if self.firewall { "1" } else { "0" };
        let mut ip = format!("ip={}", address);
        if let Some(gateway) = &self.gateway {
            ip.push_str(&format!(",gw={}", gateway));
        }

        let mut params = vec![
            ("cores".to_string(), self.cores.to_string()),
            ("memory".to_string(), self.memory_mb.to_string()),
        ];

        match kind {
            WorkloadKind::Container => {
                params.push((
                    "net0".to_string(),
                    format!("name=eth0,bridge={},firewall={},{}", self.bridge, firewall, ip),
                ));
            }
            WorkloadKind::Vm => {
                params.push((
                    "net0".to_string(),
                    format!("virtio,bridge={},firewall={}", self.bridge, firewall),
                ));
                params.push(("ipconfig0".to_string(), ip));
            }
        }

        params
    }
}

/// Everything needed to turn a template into one user's guest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloneRequest {
    pub new_guest_id: u32,
    pub name: String,
    pub resources: ResourceSpec,
    /// Rendered address, CIDR prefix included.
    pub address: String,
}

impl CloneRequest {
    /// Form fields for `POST /nodes/{node}/{kind}/{template}/clone`.
    pub fn clone_params(&self, kind: WorkloadKind) -> Vec<(String, String)> {
        let name_key = match kind {
            WorkloadKind::Vm => "name",
            WorkloadKind::Container => "hostname",
        };

        let mut params = vec![
            ("newid".to_string(), self.new_guest_id.to_string()),
            (name_key.to_string(), self.name.clone()),
            (
                "full".to_string(),
                if self.resources.full_clone { "1" } else { "0" }.to_string(),
            ),
        ];

        if self.resources.full_clone {
            if let Some(storage) = &self.resources.storage {
                params.push(("storage".to_string(), storage.clone()));
            }
        }

        params
    }
}
