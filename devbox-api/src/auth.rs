use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};

use crate::{error::ApiError, state::AppState};

/// Headers carrying the login verified by the auth proxy in front of us.
const IDENTITY_HEADERS: &[&str] = &["x-devbox-user", "x-forwarded-user"];

/// Auth middleware - resolves the proxy-verified login to an allowed [`devbox_core::User`]
///
/// The OAuth handshake happens upstream (oauth2-proxy or similar), which sets
/// one of [`IDENTITY_HEADERS`]. Only logins present in the user directory may
/// launch a workspace.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let login = IDENTITY_HEADERS
        .iter()
        .find_map(|name| req.headers().get(*name))
        .and_then(|h| h.to_str().ok())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ApiError::Unauthorized("Missing identity header".to_string()))?;

    let user = state.users.get(&login).cloned().ok_or_else(|| {
        warn!(login = %login, "Login not in user directory");
        ApiError::Forbidden(format!("User {} is not allowed", login))
    })?;

    debug!(login = %user.login, id = user.id, "Authenticated request");
    req.extensions_mut().insert(user);

    Ok(next.run(req).await)
}
