use crate::{error::ApiError, state::AppState};
use axum::{extract::State, routing::get, Json, Router};
use serde_json::{json, Value};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health_check))
        .route("/health/ready", get(readiness_check))
}

async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "service": "devbox-api",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Ready once the control plane answers; the route table is only touched on login.
async fn readiness_check(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    let nodes = state
        .control_plane
        .cluster_status()
        .await
        .map_err(|e| ApiError::ServiceUnavailable(format!("Control plane unreachable: {}", e)))?;

    let online = nodes
        .iter()
        .filter(|n| n.kind == "node" && n.online == Some(1))
        .count();

    Ok(Json(json!({
        "status": "ready",
        "service": "devbox-api",
        "version": env!("CARGO_PKG_VERSION"),
        "nodes_online": online
    })))
}
