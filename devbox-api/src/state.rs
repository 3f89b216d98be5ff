use std::sync::Arc;
use std::time::Duration;

use devbox_core::UserDirectory;
use devbox_orchestrator::{ReconcileSettings, Reconciler};
use devbox_proxmox::ControlPlane;
use devbox_router::RouteManager;

#[derive(Clone)]
pub struct AppState {
    pub control_plane: Arc<dyn ControlPlane>,
    pub reconciler: Arc<Reconciler>,
    pub routes: Arc<RouteManager>,
    pub users: Arc<UserDirectory>,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(
        control_plane: Arc<dyn ControlPlane>,
        settings: ReconcileSettings,
        routes: RouteManager,
        users: UserDirectory,
        request_timeout: Duration,
    ) -> Self {
        Self {
            reconciler: Arc::new(Reconciler::new(control_plane.clone(), settings)),
            control_plane,
            routes: Arc::new(routes),
            users: Arc::new(users),
            request_timeout,
        }
    }
}
