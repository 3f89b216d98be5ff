use std::net::SocketAddr;

use crate::{error::ApiResult, state::AppState};
use axum::{
    extract::State,
    routing::{get, post},
    Extension, Json, Router,
};
use devbox_core::{User, WorkloadInfo};
use serde::{Deserialize, Serialize};
use tracing::info;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/api/v1/workspace", get(get_workspace).post(launch_workspace))
        .route("/api/v1/workspace/stop", post(stop_workspace))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkspaceResponse {
    pub login: String,
    pub guest_id: u32,
    pub address: String,
    pub url: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StopResponse {
    pub login: String,
    pub stopped: bool,
    pub routes_removed: usize,
}

/// Bring the caller's workspace up and publish its route.
async fn launch_workspace(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<WorkspaceResponse>> {
    let deadline = tokio::time::sleep(state.request_timeout);
    let address = state.reconciler.ensure_running_until(&user, deadline).await?;

    let upstream = SocketAddr::new(address, state.routes.config().upstream_port);
    state.routes.ensure_route(&user, &upstream.to_string()).await?;

    let url = state.routes.public_url(&user);
    info!(login = %user.login, %address, %url, "Workspace ready");

    Ok(Json(WorkspaceResponse {
        login: user.login.clone(),
        guest_id: state.reconciler.workload_ref(&user).guest_id,
        address: address.to_string(),
        url,
    }))
}

async fn get_workspace(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<WorkloadInfo>> {
    let info = state.reconciler.workload_info(&user).await?;
    Ok(Json(info))
}

async fn stop_workspace(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> ApiResult<Json<StopResponse>> {
    let stopped = state.reconciler.ensure_stopped(&user).await?;
    let routes_removed = state.routes.remove_route(&user).await?;

    Ok(Json(StopResponse {
        login: user.login,
        stopped,
        routes_removed,
    }))
}
