//! Authenticated sessions
//!
//! A bearer token resolves to a `SessionContext` holding everything scoped to
//! that session: the token-scoped backend client, the read-query cache and the
//! currency preference. Contexts are dropped on sign-out or after the idle
//! window, which tears that state down with them.

use moka::future::Cache;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::OwnedMutexGuard;
use uuid::Uuid;

use crate::services::currency::CurrencyPreference;
use crate::services::error::ServiceError;
use crate::services::notifier::Notifier;
use crate::services::query_cache::QueryCache;
use crate::services::remote::{AuthUser, RemoteBackend, TableClient};

/// Per-loan async locks serializing return and delete flows on the same loan
#[derive(Default)]
pub struct LoanLocks {
    locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl LoanLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn acquire(&self, loan_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock();
            // Forget locks nobody holds or waits on
            locks.retain(|_, lock| Arc::strong_count(lock) > 1);
            locks.entry(loan_id).or_default().clone()
        };
        lock.lock_owned().await
    }
}

pub struct SessionContext {
    pub user: AuthUser,
    pub client: Arc<dyn TableClient>,
    pub queries: QueryCache,
    pub currency: CurrencyPreference,
    pub notifier: Notifier,
    pub loan_locks: Arc<LoanLocks>,
}

impl SessionContext {
    pub fn client(&self) -> &dyn TableClient {
        self.client.as_ref()
    }

    pub fn user_id(&self) -> Uuid {
        self.user.id
    }
}

#[derive(Clone)]
pub struct SessionRegistry {
    backend: Arc<dyn RemoteBackend>,
    sessions: Cache<String, Arc<SessionContext>>,
    notifier: Notifier,
    loan_locks: Arc<LoanLocks>,
    default_currency: String,
}

impl SessionRegistry {
    pub fn new(
        backend: Arc<dyn RemoteBackend>,
        notifier: Notifier,
        idle: Duration,
        default_currency: &str,
    ) -> Self {
        let sessions = Cache::builder()
            .max_capacity(10_000)
            .time_to_idle(idle)
            .build();

        Self {
            backend,
            sessions,
            notifier,
            loan_locks: Arc::new(LoanLocks::new()),
            default_currency: default_currency.to_string(),
        }
    }

    /// Resolve a bearer token to its session, creating it on first use.
    /// Fails with `Unauthenticated` when the backend knows no user for it.
    pub async fn resolve(&self, access_token: &str) -> Result<Arc<SessionContext>, ServiceError> {
        if access_token.trim().is_empty() {
            return Err(ServiceError::Unauthenticated);
        }

        if let Some(session) = self.sessions.get(access_token).await {
            return Ok(session);
        }

        let client = self.backend.for_token(access_token);
        let user = client
            .current_user()
            .await?
            .ok_or(ServiceError::Unauthenticated)?;

        let currency =
            CurrencyPreference::load(client.as_ref(), user.id, &self.default_currency).await;

        tracing::info!(user_id = %user.id, currency = %currency.current(), "Session started");

        let session = Arc::new(SessionContext {
            user,
            client,
            queries: QueryCache::new(),
            currency,
            notifier: self.notifier.clone(),
            loan_locks: self.loan_locks.clone(),
        });

        self.sessions
            .insert(access_token.to_string(), session.clone())
            .await;

        Ok(session)
    }

    /// Whether `access_token` still has a live session
    pub fn is_active(&self, access_token: &str) -> bool {
        self.sessions.contains_key(access_token)
    }

    /// Tear the session down. Returns false if it was not active.
    pub async fn sign_out(&self, access_token: &str) -> bool {
        match self.sessions.remove(access_token).await {
            Some(session) => {
                tracing::info!(user_id = %session.user.id, "Session ended");
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn test_loan_lock_serializes_same_loan() {
        let locks = Arc::new(LoanLocks::new());
        let loan_id = Uuid::new_v4();
        let active = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..4 {
            let locks = locks.clone();
            let active = active.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let _guard = locks.acquire(loan_id).await;
                let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                active.fetch_sub(1, Ordering::SeqCst);
            }));
        }

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_different_loans_do_not_block() {
        let locks = LoanLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        let _b = tokio::time::timeout(Duration::from_millis(100), locks.acquire(Uuid::new_v4()))
            .await
            .expect("second loan lock should not wait");
    }
}
