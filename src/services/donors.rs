use uuid::Uuid;

use crate::models::donor::{Donor, DonorForm};
use crate::models::notification::MutationOutcome;
use crate::services::error::ServiceError;
use crate::services::profiles::current_agency;
use crate::services::query_cache::{keys, DEFAULT_STALE_TIME};
use crate::services::remote::{fetch_rows, insert_one, tables, Filter, SelectQuery};
use crate::services::session::SessionContext;

pub async fn list_donors(ctx: &SessionContext) -> Result<Vec<Donor>, ServiceError> {
    ctx.queries
        .fetch(&keys::donors(), DEFAULT_STALE_TIME, || async {
            let query = SelectQuery::from(tables::DONORS).order_by("name", true);
            fetch_rows(ctx.client(), &query)
                .await
                .map_err(ServiceError::from)
        })
        .await
}

pub async fn create_donor(
    ctx: &SessionContext,
    form: DonorForm,
) -> Result<MutationOutcome<Donor>, ServiceError> {
    let result = insert_donor(ctx, &form).await;
    ctx.notifier.settle(
        ctx.user_id(),
        result,
        "Donateur créé avec succès",
        "Erreur lors de la création du donateur",
    )
}

pub async fn update_donor(
    ctx: &SessionContext,
    id: Uuid,
    form: DonorForm,
) -> Result<MutationOutcome<Donor>, ServiceError> {
    let result = patch_donor(ctx, id, &form).await;
    ctx.notifier.settle(
        ctx.user_id(),
        result,
        "Donateur mis à jour avec succès",
        "Erreur lors de la mise à jour du donateur",
    )
}

pub async fn delete_donor(
    ctx: &SessionContext,
    id: Uuid,
) -> Result<MutationOutcome<Uuid>, ServiceError> {
    let result = remove_donor(ctx, id).await;
    ctx.notifier.settle(
        ctx.user_id(),
        result,
        "Donateur supprimé avec succès",
        "Erreur lors de la suppression du donateur",
    )
}

async fn insert_donor(ctx: &SessionContext, form: &DonorForm) -> Result<Donor, ServiceError> {
    form.validate()?;
    let agency_id = current_agency(ctx).await?;

    let created: Donor =
        insert_one(ctx.client(), tables::DONORS, form.to_insert_row(agency_id)).await?;

    ctx.queries.invalidate(&keys::donors()).await;
    Ok(created)
}

async fn patch_donor(ctx: &SessionContext, id: Uuid, form: &DonorForm) -> Result<Donor, ServiceError> {
    form.validate()?;

    let updated = ctx
        .client()
        .update(tables::DONORS, form.to_row(), &[Filter::eq("id", id)])
        .await?
        .into_iter()
        .next()
        .ok_or(ServiceError::NotFound("Donateur"))?;

    ctx.queries.invalidate(&keys::donors()).await;
    Ok(serde_json::from_value(updated)?)
}

async fn remove_donor(ctx: &SessionContext, id: Uuid) -> Result<Uuid, ServiceError> {
    ctx.client()
        .delete(tables::DONORS, &[Filter::eq("id", id)])
        .await?;
    ctx.queries.invalidate(&keys::donors()).await;
    Ok(id)
}
