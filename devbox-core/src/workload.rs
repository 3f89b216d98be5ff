use std::fmt;

use serde::{Deserialize, Serialize};

/// Flavour of guest on the virtualization platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum WorkloadKind {
    #[serde(rename = "qemu", alias = "vm")]
    Vm,
    #[default]
    #[serde(rename = "lxc", alias = "container")]
    Container,
}

impl WorkloadKind {
    /// Path segment used by the control-plane API (`/nodes/{node}/{segment}`).
    pub fn api_segment(self) -> &'static str {
        match self {
            WorkloadKind::Vm => "qemu",
            WorkloadKind::Container => "lxc",
        }
    }
}

impl fmt::Display for WorkloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.api_segment())
    }
}

/// Addresses one guest on one cluster node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkloadRef {
    pub guest_id: u32,
    pub node: String,
    pub kind: WorkloadKind,
}

impl WorkloadRef {
    pub fn new(guest_id: u32, node: impl Into<String>, kind: WorkloadKind) -> Self {
        Self {
            guest_id,
            node: node.into(),
            kind,
        }
    }
}

impl fmt::Display for WorkloadRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}@{}", self.kind, self.guest_id, self.node)
    }
}

/// Power state of a guest as reported by the control plane.
///
/// `Missing` is never sent by the platform; the client produces it when the
/// guest id is unknown. Strings the client does not recognise map to
/// `Unknown` so new platform states do not break decoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Running,
    Stopped,
    Paused,
    Suspended,
    Locked,
    Template,
    Starting,
    Stopping,
    Migrating,
    Unknown,
    Missing,
}

impl Status {
    pub fn from_api(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "running" => Status::Running,
            "stopped" => Status::Stopped,
            "paused" => Status::Paused,
            "suspended" | "hibernated" => Status::Suspended,
            "locked" => Status::Locked,
            "template" => Status::Template,
            "starting" | "prelaunch" => Status::Starting,
            "stopping" | "shutdown" => Status::Stopping,
            "migrating" | "migration" | "postmigrate" | "inmigrate" => Status::Migrating,
            "missing" => Status::Missing,
            _ => Status::Unknown,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Running => "running",
            Status::Stopped => "stopped",
            Status::Paused => "paused",
            Status::Suspended => "suspended",
            Status::Locked => "locked",
            Status::Template => "template",
            Status::Starting => "starting",
            Status::Stopping => "stopping",
            Status::Migrating => "migrating",
            Status::Unknown => "unknown",
            Status::Missing => "missing",
        }
    }

    /// States a start request can move to `Running`.
    pub fn is_startable(self) -> bool {
        matches!(self, Status::Stopped | Status::Paused | Status::Suspended)
    }

    /// States that settle on their own; the reconciler waits instead of acting.
    pub fn is_transitional(self) -> bool {
        matches!(
            self,
            Status::Starting | Status::Stopping | Status::Migrating | Status::Locked | Status::Unknown
        )
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of a guest. Never cached across reconcile steps.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkloadInfo {
    pub guest_id: u32,
    pub kind: WorkloadKind,
    pub status: Status,
    pub node: String,
    pub name: String,
    pub uptime_seconds: u64,
    pub cpu_count: u32,
    pub memory_bytes: u64,
    pub max_memory_bytes: u64,
    pub disk_bytes: u64,
    pub max_disk_bytes: u64,
}

impl WorkloadInfo {
    pub fn missing(workload: &WorkloadRef) -> Self {
        Self {
            guest_id: workload.guest_id,
            kind: workload.kind,
            status: Status::Missing,
            node: workload.node.clone(),
            name: String::new(),
            uptime_seconds: 0,
            cpu_count: 0,
            memory_bytes: 0,
            max_memory_bytes: 0,
            disk_bytes: 0,
            max_disk_bytes: 0,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.status == Status::Missing
    }

    pub fn is_running(&self) -> bool {
        self.status == Status::Running
    }
}
