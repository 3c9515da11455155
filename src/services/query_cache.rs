//! Read-query cache
//!
//! Query results are cached per session under a segmented key
//! (`["articles", "available"]`). After a mutation the affected keys are
//! invalidated by prefix and the next read goes back to the backend; cached
//! data is never patched in place.

use moka::future::Cache;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::services::error::ServiceError;

/// Default staleness: cached data is refetched on every read
pub const DEFAULT_STALE_TIME: Duration = Duration::ZERO;

/// Financial reports tolerate 30 seconds of staleness
pub const REPORT_STALE_TIME: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new(root: &str) -> Self {
        Self(vec![root.to_string()])
    }

    pub fn with(mut self, segment: impl ToString) -> Self {
        self.0.push(segment.to_string());
        self
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }
}

/// Query keys used by the dashboard reads
pub mod keys {
    use super::QueryKey;
    use crate::models::finance::ReportRange;
    use uuid::Uuid;

    pub fn articles() -> QueryKey {
        QueryKey::new("articles")
    }

    pub fn available_articles() -> QueryKey {
        articles().with("available")
    }

    pub fn beneficiaries() -> QueryKey {
        QueryKey::new("beneficiaries")
    }

    pub fn beneficiary(id: Uuid) -> QueryKey {
        beneficiaries().with(id)
    }

    pub fn donors() -> QueryKey {
        QueryKey::new("donors")
    }

    pub fn loans() -> QueryKey {
        QueryKey::new("loans")
    }

    pub fn loan(id: Uuid) -> QueryKey {
        loans().with(id)
    }

    pub fn transactions(range: &ReportRange) -> QueryKey {
        QueryKey::new("financial-transactions")
            .with(range.from.map(|d| d.to_string()).unwrap_or_default())
            .with(range.to.map(|d| d.to_string()).unwrap_or_default())
    }

    pub fn report_stats(range: &ReportRange) -> QueryKey {
        QueryKey::new("report-stats")
            .with(range.from.map(|d| d.to_string()).unwrap_or_default())
            .with(range.to.map(|d| d.to_string()).unwrap_or_default())
    }
}

#[derive(Clone)]
struct CachedQuery {
    data: Arc<Value>,
    fetched_at: Instant,
}

#[derive(Clone)]
pub struct QueryCache {
    entries: Cache<QueryKey, CachedQuery>,
}

impl QueryCache {
    pub fn new() -> Self {
        let entries = Cache::builder()
            .max_capacity(500)
            .time_to_idle(Duration::from_secs(600))
            .build();

        Self { entries }
    }

    /// Return the cached result if it is younger than `stale_time`,
    /// otherwise run `fetch` and cache what it returns. Concurrent loads of
    /// the same key share one backend call. Errors are not cached.
    pub async fn fetch<T, F, Fut>(
        &self,
        key: &QueryKey,
        stale_time: Duration,
        fetch: F,
    ) -> Result<T, ServiceError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        if let Some(cached) = self.entries.get(key).await {
            if cached.fetched_at.elapsed() < stale_time {
                tracing::debug!(key = ?key.segments(), "Query cache hit");
                return Ok(serde_json::from_value((*cached.data).clone())?);
            }
            self.entries.invalidate(key).await;
        }

        let loaded = self
            .entries
            .try_get_with(key.clone(), async {
                let fresh = fetch().await?;
                Ok::<_, ServiceError>(CachedQuery {
                    data: Arc::new(serde_json::to_value(&fresh)?),
                    fetched_at: Instant::now(),
                })
            })
            .await
            .map_err(ServiceError::from_shared)?;

        Ok(serde_json::from_value((*loaded.data).clone())?)
    }

    /// Last fetched value for `key`, regardless of staleness
    pub async fn peek(&self, key: &QueryKey) -> Option<Value> {
        self.entries
            .get(key)
            .await
            .map(|cached| (*cached.data).clone())
    }

    /// Drop every entry whose key starts with `prefix`
    pub async fn invalidate(&self, prefix: &QueryKey) {
        let matching: Vec<QueryKey> = self
            .entries
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, _)| (*key).clone())
            .collect();

        for key in &matching {
            self.entries.invalidate(key).await;
        }

        tracing::debug!(
            prefix = ?prefix.segments(),
            invalidated = matching.len(),
            "Query cache invalidated"
        );
    }

    pub async fn invalidate_all(&self, prefixes: &[QueryKey]) {
        for prefix in prefixes {
            self.invalidate(prefix).await;
        }
    }
}

impl Default for QueryCache {
    fn default() -> Self {
        Self::new()
    }
}
