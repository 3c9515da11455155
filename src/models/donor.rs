use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DonorType {
    Particulier,
    Entreprise,
    Association,
}

impl Default for DonorType {
    fn default() -> Self {
        DonorType::Particulier
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Donor {
    pub id: Uuid,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(rename = "type", default)]
    pub donor_type: DonorType,
    #[serde(default)]
    pub agency_id: Option<Uuid>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DonorForm {
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(rename = "type", default)]
    pub donor_type: DonorType,
}

impl DonorForm {
    pub fn to_row(&self) -> Value {
        json!({
            "name": self.name.trim(),
            "email": self.email,
            "phone": self.phone,
            "address": self.address,
            "type": self.donor_type,
        })
    }

    pub fn to_insert_row(&self, agency_id: Option<Uuid>) -> Value {
        let mut row = self.to_row();
        row["agency_id"] = json!(agency_id);
        row
    }
}
