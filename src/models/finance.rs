use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    #[serde(alias = "recette")]
    Income,
    #[serde(alias = "depense")]
    Expense,
}

/// Financial transaction, read-only from this service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialTransaction {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub amount: Decimal,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    pub transaction_date: NaiveDate,
}

/// Query parameters for report endpoints (inclusive bounds)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ReportRange {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryTotal {
    pub category: String,
    pub income: Decimal,
    pub expense: Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportStats {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub total_income: Decimal,
    pub total_expense: Decimal,
    pub balance: Decimal,
    pub transaction_count: usize,
    pub by_category: Vec<CategoryTotal>,
    /// Article count per status (`disponible`, `en_pret`, ...)
    pub articles_by_status: BTreeMap<String, usize>,
    pub active_loans: usize,
    pub overdue_loans: usize,
}
