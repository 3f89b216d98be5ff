use devbox_core::{CoreError, Status};
use devbox_proxmox::ControlPlaneError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, OrchestratorError>;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Control plane error: {0}")]
    ControlPlane(#[from] ControlPlaneError),

    #[error("Guest {guest_id} not running after the readiness window (last status: {last_status})")]
    ReadinessTimeout { guest_id: u32, last_status: Status },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(#[from] CoreError),

    #[error("Reconcile cancelled")]
    Cancelled,
}
