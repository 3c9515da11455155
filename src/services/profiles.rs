use uuid::Uuid;

use crate::models::profile::Profile;
use crate::services::error::ServiceError;
use crate::services::remote::{fetch_one, tables, Filter, SelectQuery};
use crate::services::session::SessionContext;

pub async fn fetch_profile(ctx: &SessionContext) -> Result<Option<Profile>, ServiceError> {
    let query = SelectQuery::from(tables::PROFILES).filter(Filter::eq("id", ctx.user_id()));
    Ok(fetch_one(ctx.client(), query).await?)
}

/// Agency the caller's new rows are tagged with
pub async fn current_agency(ctx: &SessionContext) -> Result<Option<Uuid>, ServiceError> {
    let profile = fetch_profile(ctx)
        .await?
        .ok_or(ServiceError::NotFound("Profil utilisateur"))?;
    Ok(profile.agency_id)
}
