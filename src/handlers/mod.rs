//! HTTP handlers
//!
//! Every dashboard endpoint authenticates with the `Authorization: Bearer`
//! header, resolves the caller's session and returns either JSON or
//! `(StatusCode, Json<ErrorResponse>)`.

use axum::{
    http::{header::AUTHORIZATION, HeaderMap, StatusCode},
    Json,
};
use std::sync::Arc;
use tracing::{error, warn};

use crate::models::common::ErrorResponse;
use crate::services::error::ServiceError;
use crate::services::remote::RemoteError;
use crate::services::session::SessionContext;
use crate::AppState;

pub mod articles;
pub mod auth;
pub mod beneficiaries;
pub mod donors;
pub mod loans;
pub mod notifications_ws;
pub mod profile;
pub mod reports;
pub mod send_email;

pub type ApiError = (StatusCode, Json<ErrorResponse>);

/// Bearer token from the `Authorization` header, if any
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Resolve the caller's session or fail with 401
pub async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
) -> Result<Arc<SessionContext>, ApiError> {
    let token = bearer_token(headers).ok_or_else(|| {
        warn!("Request without bearer token");
        map_service_error(ServiceError::Unauthenticated)
    })?;

    state
        .sessions
        .resolve(token)
        .await
        .map_err(map_service_error)
}

/// Map ServiceError to HTTP response
pub fn map_service_error(err: ServiceError) -> ApiError {
    match err {
        ServiceError::Unauthenticated => (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse::new(err.to_string(), "UNAUTHORIZED")),
        ),
        ServiceError::Validation(fields) => {
            let mut body = ErrorResponse::new("Formulaire invalide", "VALIDATION_ERROR");
            body.fields = fields;
            (StatusCode::BAD_REQUEST, Json(body))
        }
        ServiceError::NotFound(_) => (
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(err.to_string(), "NOT_FOUND")),
        ),
        ServiceError::InvalidState(msg) => (
            StatusCode::CONFLICT,
            Json(ErrorResponse::new(msg, "INVALID_STATE")),
        ),
        ServiceError::Remote(remote) => map_remote_error(remote),
        ServiceError::Flow {
            flow,
            step,
            source,
            compensated,
        } => {
            let code = if compensated {
                "LOAN_FLOW_FAILED"
            } else {
                error!(flow, step, "Loan flow left partial writes behind");
                "LOAN_FLOW_INCONSISTENT"
            };
            let (status, _) = remote_status(&source);
            let mut body = ErrorResponse::new(source.to_string(), code);
            body.step = Some(step.to_string());
            body.compensated = Some(compensated);
            (status, Json(body))
        }
    }
}

fn remote_status(err: &RemoteError) -> (StatusCode, &'static str) {
    match err {
        RemoteError::Api { status, .. } => match *status {
            401 => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            403 => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            404 => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            409 => (StatusCode::CONFLICT, "CONFLICT"),
            400..=499 => (StatusCode::BAD_REQUEST, "REMOTE_REJECTED"),
            _ => (StatusCode::BAD_GATEWAY, "BACKEND_ERROR"),
        },
        RemoteError::Http(_) => (StatusCode::BAD_GATEWAY, "BACKEND_UNAVAILABLE"),
        RemoteError::Decode(_) => (StatusCode::BAD_GATEWAY, "BACKEND_DECODE_ERROR"),
    }
}

fn map_remote_error(err: RemoteError) -> ApiError {
    let (status, code) = remote_status(&err);
    if status.is_server_error() {
        error!("Backend call failed: {}", err);
    }
    (status, Json(ErrorResponse::new(err.to_string(), code)))
}
