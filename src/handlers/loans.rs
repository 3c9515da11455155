//! Loan endpoints
//!
//! Return, partial return and delete run multi-step flows in
//! `services::loans`. A failed flow answers with the backend's message, the
//! failed step and whether earlier steps were rolled back.

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    Json,
};
use uuid::Uuid;

use super::{authenticate, map_service_error, ApiError};
use crate::models::common::ErrorResponse;
use crate::models::loan::{
    DeleteSummary, Loan, LoanForm, LoanUpdate, PartialReturnRequest, ReturnSummary,
};
use crate::models::notification::MutationOutcome;
use crate::services::loans;
use crate::AppState;

/// GET /api/loans
pub async fn list_loans(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Loan>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    loans::list_loans(&ctx)
        .await
        .map(Json)
        .map_err(map_service_error)
}

/// GET /api/loans/{id}
pub async fn get_loan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Loan>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    match loans::get_loan(&ctx, id).await {
        Ok(Some(loan)) => Ok(Json(loan)),
        Ok(None) => Err((
            StatusCode::NOT_FOUND,
            Json(ErrorResponse::new(format!("Prêt {} introuvable", id), "NOT_FOUND")),
        )),
        Err(e) => Err(map_service_error(e)),
    }
}

/// POST /api/loans
pub async fn create_loan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<LoanForm>,
) -> Result<Json<MutationOutcome<Loan>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    loans::create_loan(&ctx, form)
        .await
        .map(Json)
        .map_err(map_service_error)
}

/// PATCH /api/loans/{id}
///
/// Only `expected_return_date`, `notes` and `contract_signed` are accepted.
pub async fn update_loan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(update): Json<LoanUpdate>,
) -> Result<Json<MutationOutcome<Loan>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    loans::update_loan(&ctx, id, update)
        .await
        .map(Json)
        .map_err(map_service_error)
}

/// POST /api/loans/{id}/return
pub async fn return_loan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<MutationOutcome<ReturnSummary>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    loans::return_loan(&ctx, id)
        .await
        .map(Json)
        .map_err(map_service_error)
}

/// POST /api/loans/{id}/return-partial
pub async fn return_loan_partial(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<PartialReturnRequest>,
) -> Result<Json<MutationOutcome<ReturnSummary>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    loans::return_loan_partial(&ctx, id, request)
        .await
        .map(Json)
        .map_err(map_service_error)
}

/// DELETE /api/loans/{id}
pub async fn delete_loan(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<MutationOutcome<DeleteSummary>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    loans::delete_loan(&ctx, id)
        .await
        .map(Json)
        .map_err(map_service_error)
}
