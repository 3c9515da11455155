use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Beneficiary {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub consent_given: bool,
    #[serde(default)]
    pub consent_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub agency_id: Option<Uuid>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Beneficiary create/update form. RGPD consent is recorded with a timestamp.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BeneficiaryForm {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub consent_given: bool,
}

/// Consent timestamp to store: kept when consent was already recorded,
/// stamped with `now` when it transitions to given, cleared otherwise.
pub fn consent_date_for(
    consent_given: bool,
    previous: Option<&Beneficiary>,
    now: DateTime<Utc>,
) -> Option<DateTime<Utc>> {
    if !consent_given {
        return None;
    }

    match previous {
        Some(b) if b.consent_given => b.consent_date.or(Some(now)),
        _ => Some(now),
    }
}

fn blank_to_none(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl BeneficiaryForm {
    pub fn to_row(&self, consent_date: Option<DateTime<Utc>>) -> Value {
        json!({
            "first_name": self.first_name.trim(),
            "last_name": self.last_name.trim(),
            "email": blank_to_none(&self.email),
            "phone": blank_to_none(&self.phone),
            "address": blank_to_none(&self.address),
            "consent_given": self.consent_given,
            "consent_date": consent_date,
        })
    }

    pub fn to_insert_row(&self, agency_id: Option<Uuid>, now: DateTime<Utc>) -> Value {
        let mut row = self.to_row(consent_date_for(self.consent_given, None, now));
        row["agency_id"] = json!(agency_id);
        row
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn form(consent_given: bool) -> BeneficiaryForm {
        BeneficiaryForm {
            first_name: " Ali ".to_string(),
            last_name: "Ben".to_string(),
            email: Some("  ".to_string()),
            phone: None,
            address: None,
            consent_given,
        }
    }

    #[test]
    fn test_insert_row_stamps_consent() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let row = form(true).to_insert_row(None, now);

        assert_eq!(row["first_name"], "Ali");
        assert_eq!(row["email"], Value::Null);
        assert_eq!(row["consent_given"], true);
        assert_eq!(row["consent_date"], json!(now));
    }

    #[test]
    fn test_insert_row_without_consent_has_no_date() {
        let row = form(false).to_insert_row(Some(Uuid::nil()), Utc::now());
        assert_eq!(row["consent_date"], Value::Null);
        assert_eq!(row["agency_id"], json!(Uuid::nil()));
    }

    #[test]
    fn test_consent_date_kept_when_already_given() {
        let earlier = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let previous = Beneficiary {
            id: Uuid::new_v4(),
            first_name: "A".to_string(),
            last_name: "B".to_string(),
            email: None,
            phone: None,
            address: None,
            consent_given: true,
            consent_date: Some(earlier),
            agency_id: None,
            created_at: None,
        };

        assert_eq!(consent_date_for(true, Some(&previous), now), Some(earlier));
        assert_eq!(consent_date_for(false, Some(&previous), now), None);

        let withdrawn = Beneficiary {
            consent_given: false,
            consent_date: None,
            ..previous
        };
        assert_eq!(consent_date_for(true, Some(&withdrawn), now), Some(now));
    }
}
