use axum::{
    extract::State,
    http::{HeaderMap, StatusCode},
    Json,
};

use super::{authenticate, map_service_error, ApiError};
use crate::models::common::ErrorResponse;
use crate::models::profile::{CurrencyRequest, CurrencyResponse, Profile};
use crate::services::profiles;
use crate::AppState;

/// GET /api/profile
pub async fn get_profile(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Profile>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    match profiles::fetch_profile(&ctx).await {
        Ok(Some(profile)) => Ok(Json(profile)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new("Profil utilisateur introuvable", "NOT_FOUND")),
        )),
        Err(e) => Err(map_service_error(e)),
    }
}

/// GET /api/profile/currency
pub async fn get_currency(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<CurrencyResponse>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    Ok(Json(CurrencyResponse {
        currency: ctx.currency.current(),
    }))
}

/// PUT /api/profile/currency
pub async fn set_currency(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CurrencyRequest>,
) -> Result<Json<CurrencyResponse>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    ctx.currency
        .set(ctx.client(), &request.currency)
        .await
        .map(|currency| Json(CurrencyResponse { currency }))
        .map_err(map_service_error)
}
