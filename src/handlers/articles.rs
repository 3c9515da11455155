use axum::{
    extract::{Path, State},
    http::HeaderMap,
    Json,
};
use uuid::Uuid;

use super::{authenticate, map_service_error, ApiError};
use crate::models::article::{Article, ArticleForm};
use crate::models::notification::MutationOutcome;
use crate::services::articles;
use crate::AppState;

/// GET /api/articles
pub async fn list_articles(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Article>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    articles::list_articles(&ctx)
        .await
        .map(Json)
        .map_err(map_service_error)
}

/// GET /api/articles/available
pub async fn list_available_articles(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Article>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    articles::list_available_articles(&ctx)
        .await
        .map(Json)
        .map_err(map_service_error)
}

/// POST /api/articles
pub async fn create_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(form): Json<ArticleForm>,
) -> Result<Json<MutationOutcome<Article>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    articles::create_article(&ctx, form)
        .await
        .map(Json)
        .map_err(map_service_error)
}

/// PUT /api/articles/{id}
pub async fn update_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(form): Json<ArticleForm>,
) -> Result<Json<MutationOutcome<Article>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    articles::update_article(&ctx, id, form)
        .await
        .map(Json)
        .map_err(map_service_error)
}

/// DELETE /api/articles/{id}
pub async fn delete_article(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<MutationOutcome<Uuid>>, ApiError> {
    let ctx = authenticate(&state, &headers).await?;
    articles::delete_article(&ctx, id)
        .await
        .map(Json)
        .map_err(map_service_error)
}
