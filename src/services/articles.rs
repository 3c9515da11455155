use uuid::Uuid;

use crate::models::article::{Article, ArticleForm, ArticleSnapshot, ArticleStatus};
use crate::models::notification::MutationOutcome;
use crate::services::error::ServiceError;
use crate::services::query_cache::{keys, DEFAULT_STALE_TIME};
use crate::services::remote::{fetch_one, fetch_rows, insert_one, tables, Filter, SelectQuery};
use crate::services::session::SessionContext;

/// Whole inventory, newest first, with category and donor names joined
pub async fn list_articles(ctx: &SessionContext) -> Result<Vec<Article>, ServiceError> {
    ctx.queries
        .fetch(&keys::articles(), DEFAULT_STALE_TIME, || async {
            let query = SelectQuery::from(tables::ARTICLES)
                .columns("*, categories(name), donors(name)")
                .order_by("created_at", false);
            fetch_rows(ctx.client(), &query)
                .await
                .map_err(ServiceError::from)
        })
        .await
}

/// Articles that can go on a new loan
pub async fn list_available_articles(ctx: &SessionContext) -> Result<Vec<Article>, ServiceError> {
    ctx.queries
        .fetch(&keys::available_articles(), DEFAULT_STALE_TIME, || async {
            let query = SelectQuery::from(tables::ARTICLES)
                .filter(Filter::eq("status", ArticleStatus::Disponible.as_str()))
                .order_by("name", true);
            fetch_rows(ctx.client(), &query)
                .await
                .map_err(ServiceError::from)
        })
        .await
}

pub async fn create_article(
    ctx: &SessionContext,
    form: ArticleForm,
) -> Result<MutationOutcome<Article>, ServiceError> {
    let result = insert_article(ctx, &form).await;
    ctx.notifier.settle(
        ctx.user_id(),
        result,
        "Article créé avec succès",
        "Erreur lors de la création de l'article",
    )
}

pub async fn update_article(
    ctx: &SessionContext,
    id: Uuid,
    form: ArticleForm,
) -> Result<MutationOutcome<Article>, ServiceError> {
    let result = patch_article(ctx, id, &form).await;
    ctx.notifier.settle(
        ctx.user_id(),
        result,
        "Article mis à jour avec succès",
        "Erreur lors de la mise à jour de l'article",
    )
}

pub async fn delete_article(
    ctx: &SessionContext,
    id: Uuid,
) -> Result<MutationOutcome<Uuid>, ServiceError> {
    let result = remove_article(ctx, id).await;
    ctx.notifier.settle(
        ctx.user_id(),
        result,
        "Article supprimé avec succès",
        "Erreur lors de la suppression de l'article",
    )
}

const LENT_BY_LOAN_ONLY: &str =
    "Le statut \"en prêt\" ne peut être modifié qu'au travers des prêts";

async fn insert_article(ctx: &SessionContext, form: &ArticleForm) -> Result<Article, ServiceError> {
    form.validate()?;
    if form.status == Some(ArticleStatus::EnPret) {
        return Err(ServiceError::InvalidState(LENT_BY_LOAN_ONLY.to_string()));
    }

    let created: Article = insert_one(ctx.client(), tables::ARTICLES, form.to_new_row()).await?;

    // Invalidates the available-articles list too
    ctx.queries.invalidate(&keys::articles()).await;
    Ok(created)
}

async fn patch_article(
    ctx: &SessionContext,
    id: Uuid,
    form: &ArticleForm,
) -> Result<Article, ServiceError> {
    form.validate()?;

    // Moving into or out of `en_pret` belongs to the loan flows
    if let Some(requested) = form.status {
        let current: ArticleSnapshot = fetch_one(
            ctx.client(),
            SelectQuery::from(tables::ARTICLES)
                .columns("id, status, state")
                .filter(Filter::eq("id", id)),
        )
        .await?
        .ok_or(ServiceError::NotFound("Article"))?;

        let touches_loan = requested == ArticleStatus::EnPret || current.status == ArticleStatus::EnPret;
        if requested != current.status && touches_loan {
            return Err(ServiceError::InvalidState(LENT_BY_LOAN_ONLY.to_string()));
        }
    }

    let updated = ctx
        .client()
        .update(tables::ARTICLES, form.to_row(), &[Filter::eq("id", id)])
        .await?
        .into_iter()
        .next()
        .ok_or(ServiceError::NotFound("Article"))?;

    ctx.queries.invalidate(&keys::articles()).await;
    Ok(serde_json::from_value(updated)?)
}

async fn remove_article(ctx: &SessionContext, id: Uuid) -> Result<Uuid, ServiceError> {
    ctx.client()
        .delete(tables::ARTICLES, &[Filter::eq("id", id)])
        .await?;
    ctx.queries.invalidate(&keys::articles()).await;
    Ok(id)
}
