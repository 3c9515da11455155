//! Financial and activity report statistics

use chrono::{NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeMap;

use crate::models::article::ArticleStatus;
use crate::models::finance::{
    CategoryTotal, FinancialTransaction, ReportRange, ReportStats, TransactionType,
};
use crate::services::error::ServiceError;
use crate::services::query_cache::{keys, REPORT_STALE_TIME};
use crate::services::remote::{fetch_rows, tables, Filter, SelectQuery, TableClient};
use crate::services::session::SessionContext;

const UNCATEGORIZED: &str = "Non catégorisé";

#[derive(Debug, Deserialize)]
struct ArticleStatusRow {
    status: ArticleStatus,
}

#[derive(Debug, Deserialize)]
struct LoanDueRow {
    expected_return_date: Option<NaiveDate>,
    actual_return_date: Option<chrono::DateTime<Utc>>,
}

fn transactions_query(range: &ReportRange) -> SelectQuery {
    let mut query = SelectQuery::from(tables::FINANCIAL_TRANSACTIONS)
        .order_by("transaction_date", false);
    if let Some(from) = range.from {
        query = query.filter(Filter::gte("transaction_date", from));
    }
    if let Some(to) = range.to {
        query = query.filter(Filter::lte("transaction_date", to));
    }
    query
}

async fn fetch_transactions(
    client: &dyn TableClient,
    range: &ReportRange,
) -> Result<Vec<FinancialTransaction>, ServiceError> {
    Ok(fetch_rows(client, &transactions_query(range)).await?)
}

/// Transactions in the range, most recent first
pub async fn list_transactions(
    ctx: &SessionContext,
    range: &ReportRange,
) -> Result<Vec<FinancialTransaction>, ServiceError> {
    ctx.queries
        .fetch(&keys::transactions(range), REPORT_STALE_TIME, || {
            fetch_transactions(ctx.client(), range)
        })
        .await
}

/// Dashboard statistics for the range. Cached for `REPORT_STALE_TIME`.
pub async fn report_stats(
    ctx: &SessionContext,
    range: &ReportRange,
) -> Result<ReportStats, ServiceError> {
    ctx.queries
        .fetch(&keys::report_stats(range), REPORT_STALE_TIME, || {
            compute_stats(ctx.client(), range)
        })
        .await
}

async fn compute_stats(
    client: &dyn TableClient,
    range: &ReportRange,
) -> Result<ReportStats, ServiceError> {
    let transactions = fetch_transactions(client, range).await?;

    let articles: Vec<ArticleStatusRow> = fetch_rows(
        client,
        &SelectQuery::from(tables::ARTICLES).columns("status"),
    )
    .await?;

    let open_loans: Vec<LoanDueRow> = fetch_rows(
        client,
        &SelectQuery::from(tables::LOANS)
            .columns("expected_return_date, actual_return_date")
            .filter(Filter::is_null("actual_return_date")),
    )
    .await?;

    let statuses: Vec<ArticleStatus> = articles.into_iter().map(|a| a.status).collect();
    let due_dates: Vec<Option<NaiveDate>> = open_loans
        .into_iter()
        .filter(|l| l.actual_return_date.is_none())
        .map(|l| l.expected_return_date)
        .collect();

    let stats = summarize(
        range,
        &transactions,
        &statuses,
        &due_dates,
        Utc::now().date_naive(),
    );
    tracing::debug!(
        transactions = stats.transaction_count,
        active_loans = stats.active_loans,
        "Report stats computed"
    );
    Ok(stats)
}

/// Aggregate fetched rows into report statistics. `open_loan_due_dates` holds
/// the expected return date of every loan not yet returned.
pub fn summarize(
    range: &ReportRange,
    transactions: &[FinancialTransaction],
    article_statuses: &[ArticleStatus],
    open_loan_due_dates: &[Option<NaiveDate>],
    today: NaiveDate,
) -> ReportStats {
    let mut total_income = Decimal::ZERO;
    let mut total_expense = Decimal::ZERO;
    let mut categories: BTreeMap<String, (Decimal, Decimal)> = BTreeMap::new();

    for tx in transactions {
        let category = tx
            .category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(UNCATEGORIZED)
            .to_string();
        let entry = categories.entry(category).or_default();

        match tx.kind {
            TransactionType::Income => {
                total_income += tx.amount;
                entry.0 += tx.amount;
            }
            TransactionType::Expense => {
                total_expense += tx.amount;
                entry.1 += tx.amount;
            }
        }
    }

    let mut articles_by_status = BTreeMap::new();
    for status in article_statuses {
        *articles_by_status
            .entry(status.as_str().to_string())
            .or_insert(0usize) += 1;
    }

    let overdue_loans = open_loan_due_dates
        .iter()
        .filter(|due| due.map(|d| d < today).unwrap_or(false))
        .count();

    ReportStats {
        from: range.from,
        to: range.to,
        total_income,
        total_expense,
        balance: total_income - total_expense,
        transaction_count: transactions.len(),
        by_category: categories
            .into_iter()
            .map(|(category, (income, expense))| CategoryTotal {
                category,
                income,
                expense,
            })
            .collect(),
        articles_by_status,
        active_loans: open_loan_due_dates.len(),
        overdue_loans,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    fn tx(kind: TransactionType, amount: Decimal, category: Option<&str>) -> FinancialTransaction {
        FinancialTransaction {
            id: Uuid::new_v4(),
            kind,
            amount,
            category: category.map(str::to_string),
            description: None,
            transaction_date: NaiveDate::from_ymd_opt(2024, 3, 10).unwrap(),
        }
    }

    fn date(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, d).unwrap()
    }

    #[test]
    fn test_totals_and_balance() {
        let transactions = vec![
            tx(TransactionType::Income, dec!(1500.00), Some("Subventions")),
            tx(TransactionType::Income, dec!(250.50), Some("Dons")),
            tx(TransactionType::Expense, dec!(320.25), Some("Transport")),
        ];

        let stats = summarize(&ReportRange::default(), &transactions, &[], &[], date(1));

        assert_eq!(stats.total_income, dec!(1750.50));
        assert_eq!(stats.total_expense, dec!(320.25));
        assert_eq!(stats.balance, dec!(1430.25));
        assert_eq!(stats.transaction_count, 3);
    }

    #[test]
    fn test_category_totals_group_blank_categories() {
        let transactions = vec![
            tx(TransactionType::Income, dec!(10), Some("Dons")),
            tx(TransactionType::Expense, dec!(4), Some("Dons")),
            tx(TransactionType::Expense, dec!(7), None),
            tx(TransactionType::Expense, dec!(3), Some("  ")),
        ];

        let stats = summarize(&ReportRange::default(), &transactions, &[], &[], date(1));

        assert_eq!(stats.by_category.len(), 2);
        let dons = stats.by_category.iter().find(|c| c.category == "Dons").unwrap();
        assert_eq!((dons.income, dons.expense), (dec!(10), dec!(4)));
        let other = stats
            .by_category
            .iter()
            .find(|c| c.category == UNCATEGORIZED)
            .unwrap();
        assert_eq!(other.expense, dec!(10));
    }

    #[test]
    fn test_article_and_loan_counts() {
        let statuses = vec![
            ArticleStatus::Disponible,
            ArticleStatus::EnPret,
            ArticleStatus::EnPret,
            ArticleStatus::Maintenance,
        ];
        let due = vec![Some(date(5)), Some(date(20)), None];

        let stats = summarize(&ReportRange::default(), &[], &statuses, &due, date(10));

        assert_eq!(stats.articles_by_status.get("en_pret"), Some(&2));
        assert_eq!(stats.articles_by_status.get("disponible"), Some(&1));
        assert_eq!(stats.articles_by_status.get("retire"), None);
        assert_eq!(stats.active_loans, 3);
        assert_eq!(stats.overdue_loans, 1);
        assert_eq!(stats.balance, Decimal::ZERO);
    }
}
