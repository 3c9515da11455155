use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use uuid::Uuid;

use super::{authenticate, map_service_error, ApiError};
use crate::models::beneficiary::{Beneficiary, BeneficiaryForm};
use crate::models::common::ErrorResponse;
use crate::models::notification::MutationOutcome;
use crate::services::beneficiaries;
use crate::AppState;

pub async fn list_beneficiaries(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Beneficiary>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    beneficiaries::list_beneficiaries(&ctx)
        .await
        .map(Json)
        .map_err(map_service_error)
}

pub async fn get_beneficiary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Beneficiary>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    match beneficiaries::get_beneficiary(&ctx, id).await {
        Ok(Some(beneficiary)) => Ok(Json(beneficiary)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(
                format!("Bénéficiaire {} introuvable", id),
                "NOT_FOUND",
            )),
        )),
        Err(e) => Err(map_service_error(e)),
    }
}

pub async fn create_beneficiary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<BeneficiaryForm>,
) -> Result<Json<MutationOutcome<Beneficiary>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    beneficiaries::create_beneficiary(&ctx, form)
        .await
        .map(Json)
        .map_err(map_service_error)
}

pub async fn update_beneficiary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(form): Json<BeneficiaryForm>,
) -> Result<Json<MutationOutcome<Beneficiary>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    beneficiaries::update_beneficiary(&ctx, id, form)
        .await
        .map(Json)
        .map_err(map_service_error)
}

pub async fn delete_beneficiary(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<MutationOutcome<Uuid>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    beneficiaries::delete_beneficiary(&ctx, id)
        .await
        .map(Json)
        .map_err(map_service_error)
}
