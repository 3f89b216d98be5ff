//! Proxmox VE control-plane access.
//!
//! The [`ControlPlane`] trait is the seam the reconciler depends on;
//! [`ProxmoxClient`] implements it over the HTTPS/JSON API with ticket or
//! API-token authentication. Ticket expiry is handled inside the client:
//! a rejected ticket is refreshed once and the call retried, so callers
//! never see a stale session.

use async_trait::async_trait;
use devbox_core::{WorkloadInfo, WorkloadKind, WorkloadRef};

pub mod client;
pub mod config;
pub mod error;
pub mod session;
pub mod types;

#[cfg(any(test, feature = "test-helpers"))]
pub mod mock;

pub use client::ProxmoxClient;
pub use config::ProxmoxConfig;
pub use error::{ControlPlaneError, Result};
pub use types::{CloneRequest, ClusterNode, ResourceSpec};

/// Read and write operations against the virtualization platform.
///
/// Write operations are fire-and-forget unless stated otherwise: success means
/// the platform accepted the request, not that the transition completed.
#[async_trait]
pub trait ControlPlane: Send + Sync {
    /// Current state of one guest. An unknown guest id yields a
    /// [`WorkloadInfo`] whose status is `Missing`, never an error.
    async fn get_workload_info(&self, workload: &WorkloadRef) -> Result<WorkloadInfo>;

    /// All guests of `kind` on `node`.
    async fn list_workloads(&self, node: &str, kind: WorkloadKind) -> Result<Vec<WorkloadInfo>>;

    /// Clone `template` into a new guest and apply the requested resources.
    /// Returns once the clone task has finished and the configuration is set.
    async fn clone_from_template(
        &self,
        template: &WorkloadRef,
        request: &CloneRequest,
    ) -> Result<WorkloadRef>;

    /// Update guest configuration keys (`cores`, `memory`, `net0`, ...).
    async fn update_config(&self, workload: &WorkloadRef, params: &[(String, String)]) -> Result<()>;

    async fn start(&self, workload: &WorkloadRef) -> Result<()>;

    async fn stop(&self, workload: &WorkloadRef) -> Result<()>;

    async fn cluster_status(&self) -> Result<Vec<ClusterNode>>;
}
