#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::response::Response;
use chrono::Utc;
use http_body_util::BodyExt;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

use aid_inventory_backend::services::notifier::Notifier;
use aid_inventory_backend::services::remote::{
    AuthUser, Filter, RemoteBackend, RemoteError, SelectQuery, TableClient,
};
use aid_inventory_backend::services::session::{SessionContext, SessionRegistry};
use aid_inventory_backend::AppState;

pub const TOKEN: &str = "token-staff";
pub const OTHER_TOKEN: &str = "token-staff-2";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    pub op: Op,
    pub table: String,
}

struct Failure {
    op: Op,
    table: String,
    message: String,
    /// Matching calls to let through before failing
    skip: usize,
    /// Drop the rule after it fires once
    once: bool,
}

pub type Tables = HashMap<String, Vec<Value>>;

/// Change applied to the tables right after a matching call, as if another
/// client wrote in between
struct Hook {
    op: Op,
    table: String,
    action: Box<dyn FnOnce(&mut Tables) + Send>,
}

#[derive(Default)]
struct Store {
    tables: Tables,
    failures: Vec<Failure>,
    hooks: Vec<Hook>,
    calls: Vec<Call>,
}

#[derive(Default)]
struct Shared {
    store: Mutex<Store>,
    users: Mutex<HashMap<String, AuthUser>>,
}

/// In-memory stand-in for the managed table backend. Clones share the same
/// tables, users, failure rules and call log.
#[derive(Clone, Default)]
pub struct MemoryBackend {
    shared: Arc<Shared>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_user(&self, token: &str, user_id: Uuid) {
        self.shared.users.lock().insert(
            token.to_string(),
            AuthUser {
                id: user_id,
                email: Some(format!("{}@example.org", user_id.simple())),
            },
        );
    }

    pub fn seed(&self, table: &str, rows: Vec<Value>) {
        self.shared
            .store
            .lock()
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(rows);
    }

    pub fn rows(&self, table: &str) -> Vec<Value> {
        self.shared
            .store
            .lock()
            .tables
            .get(table)
            .cloned()
            .unwrap_or_default()
    }

    pub fn row(&self, table: &str, id: Uuid) -> Option<Value> {
        let id = id.to_string();
        self.rows(table)
            .into_iter()
            .find(|row| row.get("id").and_then(Value::as_str) == Some(id.as_str()))
    }

    /// Fail every `op` on `table` with a backend error carrying `message`
    pub fn fail(&self, op: Op, table: &str, message: &str) {
        self.shared.store.lock().failures.push(Failure {
            op,
            table: table.to_string(),
            message: message.to_string(),
            skip: 0,
            once: false,
        });
    }

    /// Let `skip` matching calls succeed, then fail the next one only
    pub fn fail_after(&self, op: Op, table: &str, message: &str, skip: usize) {
        self.shared.store.lock().failures.push(Failure {
            op,
            table: table.to_string(),
            message: message.to_string(),
            skip,
            once: true,
        });
    }

    /// Run `action` on the tables once, right after the next `op` on `table`
    pub fn after_next<F>(&self, op: Op, table: &str, action: F)
    where
        F: FnOnce(&mut Tables) + Send + 'static,
    {
        self.shared.store.lock().hooks.push(Hook {
            op,
            table: table.to_string(),
            action: Box::new(action),
        });
    }

    pub fn clear_failures(&self) {
        self.shared.store.lock().failures.clear();
    }

    pub fn calls(&self) -> Vec<Call> {
        self.shared.store.lock().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.shared.store.lock().calls.clear();
    }

    pub fn writes(&self) -> Vec<Call> {
        self.calls()
            .into_iter()
            .filter(|c| c.op != Op::Select)
            .collect()
    }
}

impl RemoteBackend for MemoryBackend {
    fn for_token(&self, access_token: &str) -> Arc<dyn TableClient> {
        Arc::new(MemoryClient {
            shared: self.shared.clone(),
            token: access_token.to_string(),
        })
    }
}

pub struct MemoryClient {
    shared: Arc<Shared>,
    token: String,
}

fn cell_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn matches(row: &Value, filters: &[Filter]) -> bool {
    filters.iter().all(|filter| {
        let cell = row.get(filter.column()).and_then(cell_text);
        match filter {
            Filter::Eq(_, v) => cell.as_deref() == Some(v.as_str()),
            Filter::In(_, values) => cell.map(|c| values.contains(&c)).unwrap_or(false),
            Filter::Gte(_, v) => cell.map(|c| c.as_str() >= v.as_str()).unwrap_or(false),
            Filter::Lte(_, v) => cell.map(|c| c.as_str() <= v.as_str()).unwrap_or(false),
            Filter::IsNull(_) => cell.is_none(),
        }
    })
}

impl Store {
    fn record(&mut self, op: Op, table: &str) -> Result<(), RemoteError> {
        self.calls.push(Call {
            op,
            table: table.to_string(),
        });

        let Some(index) = self
            .failures
            .iter()
            .position(|f| f.op == op && f.table == table)
        else {
            return Ok(());
        };

        let failure = &mut self.failures[index];
        if failure.skip > 0 {
            failure.skip -= 1;
            return Ok(());
        }

        let message = failure.message.clone();
        if failure.once {
            self.failures.remove(index);
        }
        Err(RemoteError::api(400, message))
    }

    fn run_hooks(&mut self, op: Op, table: &str) {
        if let Some(index) = self
            .hooks
            .iter()
            .position(|h| h.op == op && h.table == table)
        {
            let hook = self.hooks.remove(index);
            (hook.action)(&mut self.tables);
        }
    }
}

#[async_trait]
impl TableClient for MemoryClient {
    async fn select(&self, query: &SelectQuery) -> Result<Vec<Value>, RemoteError> {
        let mut store = self.shared.store.lock();
        store.record(Op::Select, &query.table)?;

        let mut rows: Vec<Value> = store
            .tables
            .get(&query.table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| matches(row, &query.filters))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order {
            rows.sort_by(|a, b| {
                let a = a.get(&order.column).and_then(cell_text);
                let b = b.get(&order.column).and_then(cell_text);
                if order.ascending {
                    a.cmp(&b)
                } else {
                    b.cmp(&a)
                }
            });
        }
        if let Some(limit) = query.limit {
            rows.truncate(limit);
        }
        store.run_hooks(Op::Select, &query.table);
        Ok(rows)
    }

    async fn insert(&self, table: &str, rows: Value) -> Result<Vec<Value>, RemoteError> {
        let mut store = self.shared.store.lock();
        store.record(Op::Insert, table)?;

        let rows = match rows {
            Value::Array(rows) => rows,
            row => vec![row],
        };

        let mut stored = Vec::new();
        for row in rows {
            let mut object: Map<String, Value> = match row {
                Value::Object(object) => object,
                other => return Err(RemoteError::api(400, format!("not an object: {}", other))),
            };
            object
                .entry("id")
                .or_insert_with(|| json!(Uuid::new_v4()));
            object
                .entry("created_at")
                .or_insert_with(|| json!(Utc::now()));
            stored.push(Value::Object(object));
        }

        store
            .tables
            .entry(table.to_string())
            .or_default()
            .extend(stored.iter().cloned());
        store.run_hooks(Op::Insert, table);
        Ok(stored)
    }

    async fn update(
        &self,
        table: &str,
        patch: Value,
        filters: &[Filter],
    ) -> Result<Vec<Value>, RemoteError> {
        let mut store = self.shared.store.lock();
        store.record(Op::Update, table)?;

        let patch = match patch {
            Value::Object(patch) => patch,
            other => return Err(RemoteError::api(400, format!("not an object: {}", other))),
        };

        let mut updated = Vec::new();
        if let Some(rows) = store.tables.get_mut(table) {
            for row in rows.iter_mut().filter(|row| matches(row, filters)) {
                if let Value::Object(object) = row {
                    for (key, value) in &patch {
                        object.insert(key.clone(), value.clone());
                    }
                }
                updated.push(row.clone());
            }
        }
        store.run_hooks(Op::Update, table);
        Ok(updated)
    }

    async fn delete(&self, table: &str, filters: &[Filter]) -> Result<Vec<Value>, RemoteError> {
        let mut store = self.shared.store.lock();
        store.record(Op::Delete, table)?;

        let mut deleted = Vec::new();
        if let Some(rows) = store.tables.get_mut(table) {
            rows.retain(|row| {
                if matches(row, filters) {
                    deleted.push(row.clone());
                    false
                } else {
                    true
                }
            });
        }
        store.run_hooks(Op::Delete, table);
        Ok(deleted)
    }

    async fn current_user(&self) -> Result<Option<AuthUser>, RemoteError> {
        Ok(self.shared.users.lock().get(&self.token).cloned())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub struct TestEnv {
    pub backend: MemoryBackend,
    pub sessions: SessionRegistry,
    pub notifier: Notifier,
    pub user_id: Uuid,
    pub agency_id: Uuid,
}

impl TestEnv {
    /// Backend with one staff user (reachable through `TOKEN` and
    /// `OTHER_TOKEN`) whose profile belongs to an agency
    pub fn new() -> Self {
        let backend = MemoryBackend::new();
        let user_id = Uuid::new_v4();
        let agency_id = Uuid::new_v4();

        backend.add_user(TOKEN, user_id);
        backend.add_user(OTHER_TOKEN, user_id);
        backend.seed(
            "profiles",
            vec![json!({
                "id": user_id,
                "agency_id": agency_id,
                "full_name": "Awa Diallo",
                "preferred_currency": "EUR",
            })],
        );

        let notifier = Notifier::new();
        let sessions = SessionRegistry::new(
            Arc::new(backend.clone()),
            notifier.clone(),
            Duration::from_secs(600),
            "EUR",
        );

        Self {
            backend,
            sessions,
            notifier,
            user_id,
            agency_id,
        }
    }

    pub async fn session(&self) -> Arc<SessionContext> {
        self.sessions.resolve(TOKEN).await.unwrap()
    }

    pub fn state(&self) -> AppState {
        AppState {
            sessions: self.sessions.clone(),
            notifier: self.notifier.clone(),
        }
    }

    pub fn seed_article(&self, name: &str, status: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.backend.seed(
            "articles",
            vec![json!({
                "id": id,
                "name": name,
                "identifier": format!("INV-{}", &id.simple().to_string()[..4]),
                "status": status,
                "state": "bon",
                "category_id": null,
                "donor_id": null,
                "description": null,
                "created_at": Utc::now(),
            })],
        );
        id
    }

    pub fn seed_beneficiary(&self, first_name: &str, last_name: &str) -> Uuid {
        let id = Uuid::new_v4();
        self.backend.seed(
            "beneficiaries",
            vec![json!({
                "id": id,
                "first_name": first_name,
                "last_name": last_name,
                "email": null,
                "phone": null,
                "address": null,
                "consent_given": false,
                "consent_date": null,
                "agency_id": self.agency_id,
                "created_at": Utc::now(),
            })],
        );
        id
    }

    /// Open loan on `article_count` fresh articles, which are marked `en_pret`
    pub fn seed_open_loan(&self, article_count: usize) -> (Uuid, Vec<Uuid>) {
        let beneficiary_id = self.seed_beneficiary("Ali", "Ben");
        let article_ids: Vec<Uuid> = (0..article_count)
            .map(|i| self.seed_article(&format!("Fauteuil roulant {}", i + 1), "en_pret"))
            .collect();

        let loan_id = Uuid::new_v4();
        self.backend.seed(
            "loans",
            vec![json!({
                "id": loan_id,
                "loan_number": "PRET-20240501-A1B2C3",
                "beneficiary_id": beneficiary_id,
                "loan_date": "2024-05-01",
                "expected_return_date": "2024-06-01",
                "actual_return_date": null,
                "contract_signed": true,
                "notes": null,
                "returned_by": null,
                "created_by": self.user_id,
                "created_at": Utc::now(),
            })],
        );
        self.backend.seed(
            "loan_articles",
            article_ids
                .iter()
                .map(|article_id| {
                    json!({
                        "id": Uuid::new_v4(),
                        "loan_id": loan_id,
                        "article_id": article_id,
                        "return_state": null,
                        "returned_at": null,
                        "returned_by": null,
                    })
                })
                .collect(),
        );

        (loan_id, article_ids)
    }

    pub fn article_status(&self, id: Uuid) -> String {
        self.backend
            .row("articles", id)
            .and_then(|row| row["status"].as_str().map(str::to_string))
            .unwrap_or_default()
    }

    pub fn links_of(&self, loan_id: Uuid) -> Vec<Value> {
        let loan_id = loan_id.to_string();
        self.backend
            .rows("loan_articles")
            .into_iter()
            .filter(|row| row["loan_id"].as_str() == Some(loan_id.as_str()))
            .collect()
    }
}

pub async fn body_json(response: Response) -> Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap_or(Value::Null)
}

pub async fn body_text(response: Response<Body>) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8_lossy(&bytes).to_string()
}
