use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User profile row; `id` is the auth user id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    pub id: Uuid,
    #[serde(default)]
    pub agency_id: Option<Uuid>,
    #[serde(default)]
    pub full_name: Option<String>,
    #[serde(default)]
    pub preferred_currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyRequest {
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CurrencyResponse {
    pub currency: String,
}
