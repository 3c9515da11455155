use axum::{extract::State, http::HeaderMap, Json};
use serde::Serialize;

use super::{bearer_token, map_service_error, ApiError};
use crate::services::error::ServiceError;
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct SignOutResponse {
    pub signed_out: bool,
}

/// POST /api/auth/sign-out
///
/// Drops the session for the bearer token along with its query cache and
/// currency preference. Signing out twice is not an error.
pub async fn sign_out(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<SignOutResponse>, ApiError> {
    let token =
        bearer_token(&headers).ok_or_else(|| map_service_error(ServiceError::Unauthenticated))?;
    let signed_out = state.sessions.sign_out(token).await;
    Ok(Json(SignOutResponse { signed_out }))
}
