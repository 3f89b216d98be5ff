use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use devbox_orchestrator::OrchestratorError;
use devbox_proxmox::ControlPlaneError;
use devbox_router::RouteError;
use serde_json::json;
use tracing::{error, warn};

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug)]
pub enum ApiError {
    Unauthorized(String),
    Forbidden(String),
    Conflict(String),
    BadGateway(String),
    ServiceUnavailable(String),
    GatewayTimeout(String),
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::BadGateway(msg) => (StatusCode::BAD_GATEWAY, msg),
            ApiError::ServiceUnavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::GatewayTimeout(msg) => (StatusCode::GATEWAY_TIMEOUT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };

        if status.is_server_error() {
            warn!(status = status.as_u16(), error = %message, "Request failed");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl From<ControlPlaneError> for ApiError {
    fn from(err: ControlPlaneError) -> Self {
        match err {
            ControlPlaneError::Config(_) => {
                error!("Control plane misconfigured: {}", err);
                ApiError::Internal(err.to_string())
            }
            _ => ApiError::BadGateway(err.to_string()),
        }
    }
}

impl From<OrchestratorError> for ApiError {
    fn from(err: OrchestratorError) -> Self {
        match err {
            OrchestratorError::ControlPlane(inner) => inner.into(),
            OrchestratorError::ReadinessTimeout { .. } => ApiError::GatewayTimeout(err.to_string()),
            OrchestratorError::Cancelled => {
                ApiError::GatewayTimeout("Workspace did not become ready in time".to_string())
            }
            OrchestratorError::InvalidState(msg) => ApiError::Conflict(msg),
            OrchestratorError::InvalidAddress(_) => ApiError::Internal(err.to_string()),
        }
    }
}

impl From<RouteError> for ApiError {
    fn from(err: RouteError) -> Self {
        match err {
            RouteError::InvalidAddress(_) | RouteError::Config(_) => ApiError::Internal(err.to_string()),
            _ => ApiError::BadGateway(err.to_string()),
        }
    }
}
