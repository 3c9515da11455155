use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use uuid::Uuid;

use super::{authenticate, map_service_error, ApiError};
use crate::models::donor::{Donor, DonorForm};
use crate::models::notification::MutationOutcome;
use crate::services::donors;
use crate::AppState;

pub async fn list_donors(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Donor>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    donors::list_donors(&ctx)
        .await
        .map(Json)
        .map_err(map_service_error)
}

pub async fn create_donor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<DonorForm>,
) -> Result<Json<MutationOutcome<Donor>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    donors::create_donor(&ctx, form)
        .await
        .map(Json)
        .map_err(map_service_error)
}

pub async fn update_donor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(form): Json<DonorForm>,
) -> Result<Json<MutationOutcome<Donor>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    donors::update_donor(&ctx, id, form)
        .await
        .map(Json)
        .map_err(map_service_error)
}

pub async fn delete_donor(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<MutationOutcome<Uuid>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    donors::delete_donor(&ctx, id)
        .await
        .map(Json)
        .map_err(map_service_error)
}
