use crate::AppState;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::{IntoResponse, Response},
};
use service_core::error::AppError;

pub const ADMIN_KEY_HEADER: &str = "x-admin-api-key";

/// Gate for the admin routes. Every provisioning operation is
/// operator-initiated, so a missing or wrong key is rejected before any
/// handler runs.
pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    headers: HeaderMap,
    request: Request,
    next: Next,
) -> Response {
    let api_key = headers
        .get(ADMIN_KEY_HEADER)
        .and_then(|value| value.to_str().ok());

    match api_key {
        Some(key) if key == state.config.security.admin_api_key => next.run(request).await,
        _ => {
            tracing::warn!("Failed admin authentication attempt");
            AppError::Unauthorized(anyhow::anyhow!("Invalid or missing admin API key"))
                .into_response()
        }
    }
}
