use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

use super::article::{ArticleState, ArticleStatus};

/// Beneficiary columns joined onto a loan
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BeneficiaryRef {
    pub first_name: String,
    pub last_name: String,
}

/// Article columns joined onto a loan_articles row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleRef {
    pub name: String,
    #[serde(default)]
    pub identifier: Option<String>,
    #[serde(default)]
    pub status: Option<ArticleStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoanArticle {
    pub loan_id: Uuid,
    pub article_id: Uuid,
    #[serde(default)]
    pub return_state: Option<ArticleState>,
    #[serde(default)]
    pub returned_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub returned_by: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub articles: Option<ArticleRef>,
}

impl LoanArticle {
    pub fn is_returned(&self) -> bool {
        self.returned_at.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Loan {
    pub id: Uuid,
    pub loan_number: String,
    pub beneficiary_id: Uuid,
    pub loan_date: NaiveDate,
    #[serde(default)]
    pub expected_return_date: Option<NaiveDate>,
    #[serde(default)]
    pub actual_return_date: Option<DateTime<Utc>>,
    #[serde(default)]
    pub contract_signed: bool,
    #[serde(default)]
    pub notes: Option<String>,
    #[serde(default)]
    pub returned_by: Option<Uuid>,
    #[serde(default)]
    pub created_by: Option<Uuid>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub beneficiaries: Option<BeneficiaryRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub loan_articles: Vec<LoanArticle>,
}

impl Loan {
    pub fn is_returned(&self) -> bool {
        self.actual_return_date.is_some()
    }

    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        !self.is_returned()
            && self
                .expected_return_date
                .map(|expected| expected < today)
                .unwrap_or(false)
    }
}

/// New loan form. The article set given here is final for the loan's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoanForm {
    #[serde(default)]
    pub beneficiary_id: Option<Uuid>,
    #[serde(default)]
    pub article_ids: Vec<Uuid>,
    pub loan_date: NaiveDate,
    #[serde(default)]
    pub expected_return_date: Option<NaiveDate>,
    #[serde(default)]
    pub contract_signed: bool,
    #[serde(default)]
    pub notes: Option<String>,
}

/// The only loan columns that can change after creation. Unknown fields
/// (such as an article list) are rejected. Absent keys are left as stored;
/// an explicit `null` clears a nullable column.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoanUpdate {
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub expected_return_date: Option<Option<NaiveDate>>,
    #[serde(default, deserialize_with = "present", skip_serializing_if = "Option::is_none")]
    pub notes: Option<Option<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub contract_signed: Option<bool>,
}

impl LoanUpdate {
    /// Patch holding only the keys the caller sent
    pub fn to_patch(&self) -> Value {
        let mut patch = Map::new();
        if let Some(date) = &self.expected_return_date {
            patch.insert("expected_return_date".to_string(), json!(date));
        }
        if let Some(notes) = &self.notes {
            patch.insert("notes".to_string(), json!(notes));
        }
        if let Some(signed) = self.contract_signed {
            patch.insert("contract_signed".to_string(), json!(signed));
        }
        Value::Object(patch)
    }
}

/// Key present in the body, possibly as `null`
fn present<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Return condition of one article in a partial return
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArticleReturn {
    pub article_id: Uuid,
    pub return_state: ArticleState,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartialReturnRequest {
    pub articles: Vec<ArticleReturn>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnSummary {
    pub loan_id: Uuid,
    pub articles_returned: usize,
    /// True once every article of the loan is back and the loan is closed
    pub loan_closed: bool,
    /// True when the loan had already been returned and nothing was written
    pub already_returned: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteSummary {
    pub loan_id: Uuid,
    pub articles_released: usize,
}
