//! `send-email` function
//!
//! POST /functions/v1/send-email with `{to, subject, html}`. Delivery is not
//! wired to a mail provider: a complete request is acknowledged with a stub
//! message. Every response, including the preflight, carries the CORS headers
//! from `cors_headers`.

use axum::{
    body::Bytes,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::{info, warn};

use crate::models::email::{SendEmailRequest, SendEmailResponse};

/// Headers attached to every `send-email` response
pub fn cors_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_ORIGIN,
        HeaderValue::from_static("*"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static("authorization, x-client-info, apikey, content-type"),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static("POST, OPTIONS"),
    );
    headers
}

/// OPTIONS /functions/v1/send-email
pub async fn send_email_preflight() -> Response {
    (StatusCode::OK, cors_headers(), "ok").into_response()
}

/// POST /functions/v1/send-email
pub async fn send_email(body: Bytes) -> Response {
    let request: SendEmailRequest = match serde_json::from_slice(&body) {
        Ok(request) => request,
        Err(e) => {
            warn!("send-email: unreadable body: {}", e);
            return (
                StatusCode::BAD_REQUEST,
                cors_headers(),
                Json(json!({ "error": format!("Invalid JSON body: {}", e) })),
            )
                .into_response();
        }
    };

    let missing = request.missing_fields();
    if !missing.is_empty() {
        warn!(missing = ?missing, "send-email: missing required fields");
        return (
            StatusCode::BAD_REQUEST,
            cors_headers(),
            Json(json!({
                "error": format!("Missing required fields: {}", missing.join(", "))
            })),
        )
            .into_response();
    }

    info!(
        to = request.to.as_deref().unwrap_or_default(),
        "send-email: request accepted (delivery not configured)"
    );

    (
        StatusCode::OK,
        cors_headers(),
        Json(SendEmailResponse {
            success: true,
            message: "Email request received; delivery is not configured".to_string(),
        }),
    )
        .into_response()
}
