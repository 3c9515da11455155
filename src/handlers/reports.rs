use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Serialize;

use super::{authenticate, map_service_error, ApiError};
use crate::models::finance::{FinancialTransaction, ReportRange, ReportStats};
use crate::services::format::format_currency;
use crate::services::reports;
use crate::AppState;

/// Report stats plus their amounts rendered in the caller's currency
#[derive(Debug, Serialize)]
pub struct ReportStatsResponse {
    #[serde(flatten)]
    pub stats: ReportStats,
    pub currency: String,
    pub display: DisplayTotals,
}

#[derive(Debug, Serialize)]
pub struct DisplayTotals {
    pub total_income: String,
    pub total_expense: String,
    pub balance: String,
}

/// GET /api/reports/stats?from=YYYY-MM-DD&to=YYYY-MM-DD
pub async fn get_report_stats(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(range): Query<ReportRange>,
) -> Result<Json<ReportStatsResponse>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    let stats = reports::report_stats(&ctx, &range)
        .await
        .map_err(map_service_error)?;

    let currency = ctx.currency.current();
    let display = DisplayTotals {
        total_income: format_currency(stats.total_income, &currency),
        total_expense: format_currency(stats.total_expense, &currency),
        balance: format_currency(stats.balance, &currency),
    };

    Ok(Json(ReportStatsResponse {
        stats,
        currency,
        display,
    }))
}

/// GET /api/reports/transactions?from=YYYY-MM-DD&to=YYYY-MM-DD
pub async fn list_transactions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(range): Query<ReportRange>,
) -> Result<Json<Vec<FinancialTransaction>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    reports::list_transactions(&ctx, &range)
        .await
        .map(Json)
        .map_err(map_service_error)
}
