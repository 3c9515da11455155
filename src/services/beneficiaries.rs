use chrono::Utc;
use uuid::Uuid;

use crate::models::beneficiary::{consent_date_for, Beneficiary, BeneficiaryForm};
use crate::models::notification::MutationOutcome;
use crate::services::error::ServiceError;
use crate::services::profiles::current_agency;
use crate::services::query_cache::{keys, DEFAULT_STALE_TIME};
use crate::services::remote::{fetch_one, fetch_rows, insert_one, tables, Filter, SelectQuery};
use crate::services::session::SessionContext;

/// All beneficiaries visible to the caller, by last name
pub async fn list_beneficiaries(ctx: &SessionContext) -> Result<Vec<Beneficiary>, ServiceError> {
    ctx.queries
        .fetch(&keys::beneficiaries(), DEFAULT_STALE_TIME, || async {
            let query = SelectQuery::from(tables::BENEFICIARIES).order_by("last_name", true);
            fetch_rows(ctx.client(), &query)
                .await
                .map_err(ServiceError::from)
        })
        .await
}

pub async fn get_beneficiary(
    ctx: &SessionContext,
    id: Uuid,
) -> Result<Option<Beneficiary>, ServiceError> {
    ctx.queries
        .fetch(&keys::beneficiary(id), DEFAULT_STALE_TIME, || async {
            let query = SelectQuery::from(tables::BENEFICIARIES).filter(Filter::eq("id", id));
            fetch_one(ctx.client(), query)
                .await
                .map_err(ServiceError::from)
        })
        .await
}

pub async fn create_beneficiary(
    ctx: &SessionContext,
    form: BeneficiaryForm,
) -> Result<MutationOutcome<Beneficiary>, ServiceError> {
    let result = insert_beneficiary(ctx, &form).await;
    ctx.notifier.settle(
        ctx.user_id(),
        result,
        "Bénéficiaire créé avec succès",
        "Erreur lors de la création du bénéficiaire",
    )
}

pub async fn update_beneficiary(
    ctx: &SessionContext,
    id: Uuid,
    form: BeneficiaryForm,
) -> Result<MutationOutcome<Beneficiary>, ServiceError> {
    let result = patch_beneficiary(ctx, id, &form).await;
    ctx.notifier.settle(
        ctx.user_id(),
        result,
        "Bénéficiaire mis à jour avec succès",
        "Erreur lors de la mise à jour du bénéficiaire",
    )
}

pub async fn delete_beneficiary(
    ctx: &SessionContext,
    id: Uuid,
) -> Result<MutationOutcome<Uuid>, ServiceError> {
    let result = remove_beneficiary(ctx, id).await;
    ctx.notifier.settle(
        ctx.user_id(),
        result,
        "Bénéficiaire supprimé avec succès",
        "Erreur lors de la suppression du bénéficiaire",
    )
}

async fn insert_beneficiary(
    ctx: &SessionContext,
    form: &BeneficiaryForm,
) -> Result<Beneficiary, ServiceError> {
    form.validate()?;
    let agency_id = current_agency(ctx).await?;

    let created: Beneficiary = insert_one(
        ctx.client(),
        tables::BENEFICIARIES,
        form.to_insert_row(agency_id, Utc::now()),
    )
    .await?;

    ctx.queries.invalidate(&keys::beneficiaries()).await;
    Ok(created)
}

async fn patch_beneficiary(
    ctx: &SessionContext,
    id: Uuid,
    form: &BeneficiaryForm,
) -> Result<Beneficiary, ServiceError> {
    form.validate()?;

    let previous: Beneficiary = fetch_one(
        ctx.client(),
        SelectQuery::from(tables::BENEFICIARIES).filter(Filter::eq("id", id)),
    )
    .await?
    .ok_or(ServiceError::NotFound("Bénéficiaire"))?;

    let consent_date = consent_date_for(form.consent_given, Some(&previous), Utc::now());
    let updated = ctx
        .client()
        .update(
            tables::BENEFICIARIES,
            form.to_row(consent_date),
            &[Filter::eq("id", id)],
        )
        .await?
        .into_iter()
        .next()
        .ok_or(ServiceError::NotFound("Bénéficiaire"))?;

    ctx.queries.invalidate(&keys::beneficiaries()).await;
    Ok(serde_json::from_value(updated)?)
}

async fn remove_beneficiary(ctx: &SessionContext, id: Uuid) -> Result<Uuid, ServiceError> {
    ctx.client()
        .delete(tables::BENEFICIARIES, &[Filter::eq("id", id)])
        .await?;
    ctx.queries.invalidate(&keys::beneficiaries()).await;
    Ok(id)
}
