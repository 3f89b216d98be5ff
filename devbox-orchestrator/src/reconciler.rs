use std::future::Future;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use devbox_core::{AddressTemplate, Status, User, WorkloadInfo, WorkloadKind, WorkloadRef};
use devbox_proxmox::{CloneRequest, ControlPlane, ControlPlaneError, ResourceSpec};
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::error::{OrchestratorError, Result};

/// Where and how user guests are created, and how long to wait for them.
#[derive(Debug, Clone)]
pub struct ReconcileSettings {
    pub node: String,
    pub kind: WorkloadKind,
    pub template_id: u32,
    pub name_prefix: String,
    pub resources: ResourceSpec,
    pub address: AddressTemplate,
    pub max_wait: Duration,
    pub poll_interval: Duration,
}

impl ReconcileSettings {
    pub fn new(node: impl Into<String>, template_id: u32, address: AddressTemplate) -> Self {
        Self {
            node: node.into(),
            kind: WorkloadKind::default(),
            template_id,
            name_prefix: "codeserver-".to_string(),
            resources: ResourceSpec::default(),
            address,
            max_wait: Duration::from_secs(120),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn template_ref(&self) -> WorkloadRef {
        WorkloadRef::new(self.template_id, &self.node, self.kind)
    }
}

#[derive(Clone)]
pub struct Reconciler {
    control_plane: Arc<dyn ControlPlane>,
    settings: ReconcileSettings,
}

impl Reconciler {
    pub fn new(control_plane: Arc<dyn ControlPlane>, settings: ReconcileSettings) -> Self {
        Self {
            control_plane,
            settings,
        }
    }

    pub fn settings(&self) -> &ReconcileSettings {
        &self.settings
    }

    /// The guest owned by `user`: its id is the user's id.
    pub fn workload_ref(&self, user: &User) -> WorkloadRef {
        WorkloadRef::new(user.id, &self.settings.node, self.settings.kind)
    }

    /// Private address of the user's guest, identical to the one configured at
    /// clone time.
    pub fn private_address(&self, user: &User) -> Result<IpAddr> {
        Ok(self.settings.address.host(user.id)?)
    }

    pub async fn workload_info(&self, user: &User) -> Result<WorkloadInfo> {
        Ok(self
            .control_plane
            .get_workload_info(&self.workload_ref(user))
            .await?)
    }

    /// Ensure the user's guest exists and is running; returns its private address.
    ///
    /// Sizing and address are re-applied before a stopped guest is started,
    /// so a guest left unconfigured by an interrupted clone is repaired rather
    /// than booted with the template's network.
    ///
    /// Dropping the returned future abandons the wait without leaving any
    /// background work behind.
    pub async fn ensure_running(&self, user: &User) -> Result<IpAddr> {
        let workload = self.workload_ref(user);
        let address = self.private_address(user)?;

        let mut info = self.control_plane.get_workload_info(&workload).await?;
        debug!(login = %user.login, guest_id = workload.guest_id, status = %info.status, "Observed workload");

        let mut configured = false;
        if info.is_missing() {
            configured = self.create(user, &workload).await?;
            info = self.control_plane.get_workload_info(&workload).await?;
            if info.is_missing() {
                return Err(OrchestratorError::InvalidState(format!(
                    "guest {} still missing after clone",
                    workload.guest_id
                )));
            }
        }

        if info.is_running() {
            debug!(login = %user.login, guest_id = workload.guest_id, "Workload already running");
            return Ok(address);
        }

        let deadline = Instant::now() + self.settings.max_wait;
        let mut started = false;

        loop {
            match info.status {
                Status::Running => {
                    info!(login = %user.login, guest_id = workload.guest_id, %address, "Workload running");
                    return Ok(address);
                }
                Status::Template => {
                    return Err(OrchestratorError::InvalidState(format!(
                        "guest {} is a template",
                        workload.guest_id
                    )));
                }
                Status::Missing => {
                    return Err(OrchestratorError::InvalidState(format!(
                        "guest {} disappeared while waiting",
                        workload.guest_id
                    )));
                }
                status if status.is_startable() && !started => {
                    if !configured {
                        self.configure(user, &workload).await?;
                    }
                    info!(login = %user.login, guest_id = workload.guest_id, %status, "Starting workload");
                    self.control_plane.start(&workload).await?;
                    started = true;
                }
                status => {
                    debug!(guest_id = workload.guest_id, %status, "Waiting for workload");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(guest_id = workload.guest_id, last_status = %info.status, "Readiness window elapsed");
                return Err(OrchestratorError::ReadinessTimeout {
                    guest_id: workload.guest_id,
                    last_status: info.status,
                });
            }
            tokio::time::sleep(self.settings.poll_interval.min(deadline - now)).await;

            info = self.control_plane.get_workload_info(&workload).await?;
        }
    }

    /// [`Self::ensure_running`], abandoned with `Cancelled` once `cancel` resolves.
    pub async fn ensure_running_until<F>(&self, user: &User, cancel: F) -> Result<IpAddr>
    where
        F: Future<Output = ()>,
    {
        tokio::select! {
            result = self.ensure_running(user) => result,
            _ = cancel => {
                info!(login = %user.login, "Reconcile cancelled");
                Err(OrchestratorError::Cancelled)
            }
        }
    }

    /// Stop the user's guest if it is up. Returns whether a stop was requested.
    pub async fn ensure_stopped(&self, user: &User) -> Result<bool> {
        let workload = self.workload_ref(user);
        let info = self.control_plane.get_workload_info(&workload).await?;

        match info.status {
            Status::Running | Status::Starting | Status::Paused | Status::Suspended => {
                info!(login = %user.login, guest_id = workload.guest_id, status = %info.status, "Stopping workload");
                self.control_plane.stop(&workload).await?;
                Ok(true)
            }
            Status::Template => Err(OrchestratorError::InvalidState(format!(
                "guest {} is a template",
                workload.guest_id
            ))),
            status => {
                debug!(guest_id = workload.guest_id, %status, "Nothing to stop");
                Ok(false)
            }
        }
    }

    async fn configure(&self, user: &User, workload: &WorkloadRef) -> Result<()> {
        let address = self.settings.address.render(user.id)?;
        let params = self.settings.resources.config_params(self.settings.kind, &address);
        debug!(login = %user.login, guest_id = workload.guest_id, %address, "Applying workload config");
        self.control_plane.update_config(workload, &params).await?;
        Ok(())
    }

    /// Clone the template. Returns whether this call configured the guest;
    /// a guest cloned concurrently by someone else may not be configured yet.
    async fn create(&self, user: &User, workload: &WorkloadRef) -> Result<bool> {
        let request = CloneRequest {
            new_guest_id: workload.guest_id,
            name: format!("{}{}", self.settings.name_prefix, user.login),
            resources: self.settings.resources.clone(),
            address: self.settings.address.render(user.id)?,
        };

        info!(
            login = %user.login,
            guest_id = workload.guest_id,
            template = self.settings.template_id,
            "Creating workload"
        );

        match self
            .control_plane
            .clone_from_template(&self.settings.template_ref(), &request)
            .await
        {
            Ok(_) => Ok(true),
            Err(ControlPlaneError::GuestExists(id)) => {
                info!(guest_id = id, "Guest created concurrently, continuing");
                Ok(false)
            }
            Err(e) => Err(e.into()),
        }
    }
}
