//! Remote table client
//!
//! Thin client over the managed table backend: a PostgREST-style REST API for
//! the tables plus an auth endpoint resolving the current user. Row-level
//! security is enforced server-side from the bearer token, so every client is
//! scoped to one access token.

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::config::Config;

/// Table names exposed by the backend
pub mod tables {
    pub const ARTICLES: &str = "articles";
    pub const BENEFICIARIES: &str = "beneficiaries";
    pub const DONORS: &str = "donors";
    pub const LOANS: &str = "loans";
    pub const LOAN_ARTICLES: &str = "loan_articles";
    pub const FINANCIAL_TRANSACTIONS: &str = "financial_transactions";
    pub const PROFILES: &str = "profiles";
}

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message}")]
    Api {
        status: u16,
        message: String,
        code: Option<String>,
    },
    #[error("Failed to decode backend response: {0}")]
    Decode(#[from] serde_json::Error),
}

impl RemoteError {
    pub fn api(status: u16, message: impl Into<String>) -> Self {
        RemoteError::Api {
            status,
            message: message.into(),
            code: None,
        }
    }
}

/// Authenticated user as reported by the auth endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthUser {
    pub id: Uuid,
    #[serde(default)]
    pub email: Option<String>,
}

/// Row filter, rendered as `column=op.value` on the wire
#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, String),
    In(String, Vec<String>),
    Gte(String, String),
    Lte(String, String),
    IsNull(String),
}

impl Filter {
    pub fn eq(column: &str, value: impl ToString) -> Self {
        Filter::Eq(column.to_string(), value.to_string())
    }

    pub fn is_in<I, V>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: ToString,
    {
        Filter::In(
            column.to_string(),
            values.into_iter().map(|v| v.to_string()).collect(),
        )
    }

    pub fn gte(column: &str, value: impl ToString) -> Self {
        Filter::Gte(column.to_string(), value.to_string())
    }

    pub fn lte(column: &str, value: impl ToString) -> Self {
        Filter::Lte(column.to_string(), value.to_string())
    }

    pub fn is_null(column: &str) -> Self {
        Filter::IsNull(column.to_string())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _)
            | Filter::In(c, _)
            | Filter::Gte(c, _)
            | Filter::Lte(c, _)
            | Filter::IsNull(c) => c,
        }
    }

    pub fn to_query_pair(&self) -> (String, String) {
        let value = match self {
            Filter::Eq(_, v) => format!("eq.{}", v),
            Filter::In(_, values) => {
                let quoted: Vec<String> = values
                    .iter()
                    .map(|v| format!("\"{}\"", v.replace('"', "\\\"")))
                    .collect();
                format!("in.({})", quoted.join(","))
            }
            Filter::Gte(_, v) => format!("gte.{}", v),
            Filter::Lte(_, v) => format!("lte.{}", v),
            Filter::IsNull(_) => "is.null".to_string(),
        };
        (self.column().to_string(), value)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub column: String,
    pub ascending: bool,
}

/// Read query against one table. Joins are expressed in `columns`
/// (e.g. `*, beneficiaries(first_name,last_name)`) and resolved server-side.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectQuery {
    pub table: String,
    pub columns: String,
    pub filters: Vec<Filter>,
    pub order: Option<Order>,
    pub limit: Option<usize>,
}

impl SelectQuery {
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: "*".to_string(),
            filters: Vec::new(),
            order: None,
            limit: None,
        }
    }

    pub fn columns(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn order_by(mut self, column: &str, ascending: bool) -> Self {
        self.order = Some(Order {
            column: column.to_string(),
            ascending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn to_query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = vec![("select".to_string(), self.columns.replace(' ', ""))];
        pairs.extend(self.filters.iter().map(Filter::to_query_pair));
        if let Some(order) = &self.order {
            let direction = if order.ascending { "asc" } else { "desc" };
            pairs.push(("order".to_string(), format!("{}.{}", order.column, direction)));
        }
        if let Some(limit) = self.limit {
            pairs.push(("limit".to_string(), limit.to_string()));
        }
        pairs
    }
}

/// Table-oriented access to the backend, scoped to one session
#[async_trait]
pub trait TableClient: Send + Sync {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Value>, RemoteError>;

    /// Insert one row (object) or several (array); returns the stored rows
    async fn insert(&self, table: &str, rows: Value) -> Result<Vec<Value>, RemoteError>;

    async fn update(
        &self,
        table: &str,
        patch: Value,
        filters: &[Filter],
    ) -> Result<Vec<Value>, RemoteError>;

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Value>, RemoteError>;

    async fn current_user(&self) -> Result<Option<AuthUser>, RemoteError>;
}

/// Hands out clients scoped to an access token
pub trait RemoteBackend: Send + Sync {
    fn for_token(&self, access_token: &str) -> Arc<dyn TableClient>;
}

pub async fn fetch_rows<T: DeserializeOwned>(
    client: &dyn TableClient,
    query: &SelectQuery,
) -> Result<Vec<T>, RemoteError> {
    client
        .select(query)
        .await?
        .into_iter()
        .map(|row| serde_json::from_value(row).map_err(RemoteError::from))
        .collect()
}

pub async fn fetch_one<T: DeserializeOwned>(
    client: &dyn TableClient,
    query: SelectQuery,
) -> Result<Option<T>, RemoteError> {
    let mut rows = fetch_rows(client, &query.limit(1)).await?;
    Ok(rows.pop())
}

pub async fn insert_one<T: DeserializeOwned>(
    client: &dyn TableClient,
    table: &str,
    row: Value,
) -> Result<T, RemoteError> {
    let row = client
        .insert(table, row)
        .await?
        .into_iter()
        .next()
        .ok_or_else(|| RemoteError::api(500, format!("Insert into {} returned no row", table)))?;
    Ok(serde_json::from_value(row)?)
}

// ============================================================================
// REST implementation
// ============================================================================

#[derive(Clone)]
pub struct RestBackend {
    client: Client,
    base_url: String,
    api_key: String,
}

impl RestBackend {
    pub fn new(config: &Config) -> Result<Self, RemoteError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.remote_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.backend_url.trim_end_matches('/').to_string(),
            api_key: config.backend_anon_key.clone(),
        })
    }

    pub fn client(&self, access_token: Option<&str>) -> RestTableClient {
        RestTableClient {
            client: self.client.clone(),
            base_url: self.base_url.clone(),
            api_key: self.api_key.clone(),
            access_token: access_token.map(str::to_string),
        }
    }
}

impl RemoteBackend for RestBackend {
    fn for_token(&self, access_token: &str) -> Arc<dyn TableClient> {
        Arc::new(self.client(Some(access_token)))
    }
}

#[derive(Clone)]
pub struct RestTableClient {
    client: Client,
    base_url: String,
    api_key: String,
    access_token: Option<String>,
}

impl RestTableClient {
    fn table_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let bearer = self.access_token.as_deref().unwrap_or(&self.api_key);
        request
            .header("apikey", &self.api_key)
            .header("Authorization", format!("Bearer {}", bearer))
            .header("accept", "application/json")
    }

    fn filter_pairs(filters: &[Filter]) -> Vec<(String, String)> {
        filters.iter().map(Filter::to_query_pair).collect()
    }
}

#[async_trait]
impl TableClient for RestTableClient {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Value>, RemoteError> {
        tracing::debug!(table = %query.table, "Remote select");

        let response = self
            .authorize(self.client.get(self.table_url(&query.table)))
            .query(&query.to_query_pairs())
            .send()
            .await?;

        read_rows(response).await
    }

    async fn insert(&self, table: &str, rows: Value) -> Result<Vec<Value>, RemoteError> {
        tracing::debug!(table = %table, "Remote insert");

        let response = self
            .authorize(self.client.post(self.table_url(table)))
            .header("Prefer", "return=representation")
            .json(&rows)
            .send()
            .await?;

        read_rows(response).await
    }

    async fn update(
        &self,
        table: &str,
        patch: Value,
        filters: &[Filter],
    ) -> Result<Vec<Value>, RemoteError> {
        tracing::debug!(table = %table, filters = filters.len(), "Remote update");

        let response = self
            .authorize(self.client.patch(self.table_url(table)))
            .header("Prefer", "return=representation")
            .query(&Self::filter_pairs(filters))
            .json(&patch)
            .send()
            .await?;

        read_rows(response).await
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Value>, RemoteError> {
        tracing::debug!(table = %table, filters = filters.len(), "Remote delete");

        let response = self
            .authorize(self.client.delete(self.table_url(table)))
            .header("Prefer", "return=representation")
            .query(&Self::filter_pairs(filters))
            .send()
            .await?;

        read_rows(response).await
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, RemoteError> {
        if self.access_token.is_none() {
            return Ok(None);
        }

        let url = format!("{}/auth/v1/user", self.base_url);
        let response = self.authorize(self.client.get(&url)).send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Ok(None);
        }

        let body = response.text().await?;
        if !status.is_success() {
            return Err(api_error(status, &body));
        }

        Ok(Some(serde_json::from_str(&body)?))
    }
}

async fn read_rows(response: Response) -> Result<Vec<Value>, RemoteError> {
    let status = response.status();
    let body = response.text().await?;

    if !status.is_success() {
        return Err(api_error(status, &body));
    }

    if body.trim().is_empty() {
        return Ok(Vec::new());
    }

    match serde_json::from_str(&body)? {
        Value::Array(rows) => Ok(rows),
        Value::Null => Ok(Vec::new()),
        row => Ok(vec![row]),
    }
}

/// Error body shapes returned by the table and auth endpoints
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    code: Option<Value>,
}

fn api_error(status: StatusCode, body: &str) -> RemoteError {
    let parsed = serde_json::from_str::<ApiErrorBody>(body).ok();

    let code = parsed.as_ref().and_then(|b| match &b.code {
        Some(Value::String(s)) => Some(s.clone()),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    });

    let message = parsed
        .and_then(|b| b.message.or(b.msg).or(b.error_description))
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| {
            if body.trim().is_empty() {
                format!("Backend request failed with status {}", status)
            } else {
                body.trim().to_string()
            }
        });

    RemoteError::Api {
        status: status.as_u16(),
        message,
        code,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eq_filter_pair() {
        let filter = Filter::eq("status", "disponible");
        assert_eq!(
            filter.to_query_pair(),
            ("status".to_string(), "eq.disponible".to_string())
        );
    }

    #[test]
    fn test_in_filter_quotes_values() {
        let filter = Filter::is_in("id", ["a", "b,c"]);
        assert_eq!(filter.to_query_pair().1, "in.(\"a\",\"b,c\")");
    }

    #[test]
    fn test_is_null_filter() {
        assert_eq!(
            Filter::is_null("actual_return_date").to_query_pair().1,
            "is.null"
        );
    }

    #[test]
    fn test_select_query_pairs() {
        let query = SelectQuery::from(tables::LOANS)
            .columns("*, beneficiaries(first_name, last_name)")
            .filter(Filter::gte("loan_date", "2024-01-01"))
            .order_by("created_at", false)
            .limit(5);

        let pairs = query.to_query_pairs();
        assert_eq!(
            pairs,
            vec![
                (
                    "select".to_string(),
                    "*,beneficiaries(first_name,last_name)".to_string()
                ),
                ("loan_date".to_string(), "gte.2024-01-01".to_string()),
                ("order".to_string(), "created_at.desc".to_string()),
                ("limit".to_string(), "5".to_string()),
            ]
        );
    }

    #[test]
    fn test_api_error_prefers_backend_message() {
        let err = api_error(
            StatusCode::BAD_REQUEST,
            r#"{"message":"duplicate key value","code":"23505"}"#,
        );
        match err {
            RemoteError::Api {
                status,
                message,
                code,
            } => {
                assert_eq!(status, 400);
                assert_eq!(message, "duplicate key value");
                assert_eq!(code.as_deref(), Some("23505"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_api_error_falls_back_to_status() {
        let err = api_error(StatusCode::BAD_GATEWAY, "");
        assert!(err.to_string().contains("502"));
    }
}
