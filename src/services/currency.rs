//! Display currency preference
//!
//! Owned by a session: loaded from the user's profile when the session is
//! created and dropped with it. Changes update memory first and are written
//! through to the profile; a failed write restores the previous value.

use parking_lot::RwLock;
use serde_json::json;
use uuid::Uuid;

use crate::models::forms::FieldError;
use crate::models::profile::Profile;
use crate::services::error::ServiceError;
use crate::services::remote::{fetch_one, tables, Filter, SelectQuery, TableClient};

pub const DEFAULT_CURRENCY: &str = "EUR";

/// ISO 4217 shape: three uppercase ASCII letters
pub fn is_valid_currency_code(code: &str) -> bool {
    code.len() == 3 && code.chars().all(|c| c.is_ascii_uppercase())
}

pub struct CurrencyPreference {
    user_id: Uuid,
    current: RwLock<String>,
}

impl CurrencyPreference {
    pub fn new(user_id: Uuid, currency: &str) -> Self {
        Self {
            user_id,
            current: RwLock::new(currency.to_string()),
        }
    }

    /// Read the preference from the profile, falling back to `fallback` when
    /// the profile has none set or cannot be read.
    pub async fn load(client: &dyn TableClient, user_id: Uuid, fallback: &str) -> Self {
        let query = SelectQuery::from(tables::PROFILES)
            .columns("id, preferred_currency")
            .filter(Filter::eq("id", user_id));

        let currency = match fetch_one::<Profile>(client, query).await {
            Ok(profile) => profile
                .and_then(|p| p.preferred_currency)
                .filter(|c| is_valid_currency_code(c))
                .unwrap_or_else(|| fallback.to_string()),
            Err(e) => {
                tracing::warn!(user_id = %user_id, error = %e, "Failed to load currency preference, using default");
                fallback.to_string()
            }
        };

        Self::new(user_id, &currency)
    }

    pub fn current(&self) -> String {
        self.current.read().clone()
    }

    pub async fn set(&self, client: &dyn TableClient, code: &str) -> Result<String, ServiceError> {
        let code = code.trim().to_ascii_uppercase();
        if !is_valid_currency_code(&code) {
            return Err(ServiceError::Validation(vec![FieldError::new(
                "currency",
                "Code devise invalide",
            )]));
        }

        let previous = std::mem::replace(&mut *self.current.write(), code.clone());

        let written = client
            .update(
                tables::PROFILES,
                json!({ "preferred_currency": code }),
                &[Filter::eq("id", self.user_id)],
            )
            .await;

        // No matching row means the profile is missing or hidden from this user
        let failure = match written {
            Ok(rows) if !rows.is_empty() => {
                tracing::info!(user_id = %self.user_id, currency = %code, "Currency preference updated");
                return Ok(code);
            }
            Ok(_) => ServiceError::NotFound("Profil utilisateur"),
            Err(e) => e.into(),
        };

        tracing::warn!(user_id = %self.user_id, error = %failure, "Currency preference not saved, restoring {}", previous);
        *self.current.write() = previous;
        Err(failure)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_currency_code_shape() {
        assert!(is_valid_currency_code("EUR"));
        assert!(is_valid_currency_code("XOF"));
        assert!(!is_valid_currency_code("eur"));
        assert!(!is_valid_currency_code("EURO"));
        assert!(!is_valid_currency_code("E1R"));
    }

    #[test]
    fn test_current_returns_initial_value() {
        let pref = CurrencyPreference::new(Uuid::nil(), "CHF");
        assert_eq!(pref.current(), "CHF");
    }
}
