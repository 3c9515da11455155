//! Loan lifecycle
//!
//! Creating, returning and deleting a loan each take several remote calls with
//! no server-side transaction. Each flow runs as a saga: the rows it is about
//! to touch are snapshotted first, and when a step fails the steps already
//! committed are undone in reverse order before the error reaches the caller.
//! Flows on the same loan are serialized by an in-process lock.

use chrono::{DateTime, NaiveDate, Utc};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::models::article::{ArticleSnapshot, ArticleState, ArticleStatus};
use crate::models::loan::{
    DeleteSummary, Loan, LoanArticle, LoanForm, LoanUpdate, PartialReturnRequest, ReturnSummary,
};
use crate::models::notification::MutationOutcome;
use crate::services::error::ServiceError;
use crate::services::query_cache::{keys, DEFAULT_STALE_TIME};
use crate::services::remote::{
    fetch_one, fetch_rows, insert_one, tables, Filter, RemoteError, SelectQuery, TableClient,
};
use crate::services::session::SessionContext;

const LOAN_COLUMNS: &str =
    "*, beneficiaries(first_name, last_name), loan_articles(*, articles(name, identifier, status))";

// ============================================================================
// Reads
// ============================================================================

/// All loans, newest first, with beneficiary and articles joined
pub async fn list_loans(ctx: &SessionContext) -> Result<Vec<Loan>, ServiceError> {
    ctx.queries
        .fetch(&keys::loans(), DEFAULT_STALE_TIME, || async {
            let query = SelectQuery::from(tables::LOANS)
                .columns(LOAN_COLUMNS)
                .order_by("created_at", false);
            fetch_rows(ctx.client(), &query)
                .await
                .map_err(ServiceError::from)
        })
        .await
}

pub async fn get_loan(ctx: &SessionContext, id: Uuid) -> Result<Option<Loan>, ServiceError> {
    ctx.queries
        .fetch(&keys::loan(id), DEFAULT_STALE_TIME, || async {
            let query = SelectQuery::from(tables::LOANS)
                .columns(LOAN_COLUMNS)
                .filter(Filter::eq("id", id));
            fetch_one(ctx.client(), query)
                .await
                .map_err(ServiceError::from)
        })
        .await
}

// ============================================================================
// Mutations
// ============================================================================

pub async fn create_loan(
    ctx: &SessionContext,
    form: LoanForm,
) -> Result<MutationOutcome<Loan>, ServiceError> {
    let result = open_loan(ctx, &form).await;
    ctx.notifier.settle(
        ctx.user_id(),
        result,
        "Prêt créé avec succès",
        "Erreur lors de la création du prêt",
    )
}

/// Return every article of the loan in good condition and close it
pub async fn return_loan(
    ctx: &SessionContext,
    loan_id: Uuid,
) -> Result<MutationOutcome<ReturnSummary>, ServiceError> {
    let result = {
        let _guard = ctx.loan_locks.acquire(loan_id).await;
        close_loan(ctx, loan_id).await
    };
    ctx.notifier.settle(
        ctx.user_id(),
        result,
        "Retour enregistré avec succès",
        "Erreur lors du retour du prêt",
    )
}

/// Return a subset of the loan's articles, each with its own condition
pub async fn return_loan_partial(
    ctx: &SessionContext,
    loan_id: Uuid,
    request: PartialReturnRequest,
) -> Result<MutationOutcome<ReturnSummary>, ServiceError> {
    let result = {
        let _guard = ctx.loan_locks.acquire(loan_id).await;
        return_articles(ctx, loan_id, &request).await
    };
    ctx.notifier.settle(
        ctx.user_id(),
        result,
        "Retour partiel enregistré avec succès",
        "Erreur lors du retour partiel",
    )
}

pub async fn delete_loan(
    ctx: &SessionContext,
    loan_id: Uuid,
) -> Result<MutationOutcome<DeleteSummary>, ServiceError> {
    let result = {
        let _guard = ctx.loan_locks.acquire(loan_id).await;
        remove_loan(ctx, loan_id).await
    };
    ctx.notifier.settle(
        ctx.user_id(),
        result,
        "Prêt supprimé avec succès",
        "Erreur lors de la suppression du prêt",
    )
}

/// Change the editable loan columns. The article set is never touched.
pub async fn update_loan(
    ctx: &SessionContext,
    loan_id: Uuid,
    update: LoanUpdate,
) -> Result<MutationOutcome<Loan>, ServiceError> {
    let result = patch_loan(ctx, loan_id, &update).await;
    ctx.notifier.settle(
        ctx.user_id(),
        result,
        "Prêt mis à jour avec succès",
        "Erreur lors de la mise à jour du prêt",
    )
}

/// Human-readable loan number, e.g. `PRET-20240501-3F9A1C`
pub fn generate_loan_number(loan_date: NaiveDate) -> String {
    let suffix = Uuid::new_v4().simple().to_string()[..6].to_uppercase();
    format!("PRET-{}-{}", loan_date.format("%Y%m%d"), suffix)
}

// ============================================================================
// Saga
// ============================================================================

/// Undo action for one committed step
#[derive(Debug, Clone)]
enum Compensation {
    /// Put loan_articles return columns back to their snapshot
    RestoreLinks(Vec<LoanArticle>),
    /// Put article status/state back to their snapshot
    RestoreArticles(Vec<ArticleSnapshot>),
    /// Re-insert deleted loan_articles rows
    RecreateLinks(Vec<LoanArticle>),
    /// Remove loan_articles rows created for a loan
    DeleteLinks(Uuid),
    /// Remove a loan created by the failing flow
    DeleteLoan(Uuid),
}

impl Compensation {
    async fn apply(&self, client: &dyn TableClient) -> Result<(), RemoteError> {
        match self {
            Compensation::RestoreLinks(links) => {
                for link in links {
                    client
                        .update(
                            tables::LOAN_ARTICLES,
                            json!({
                                "return_state": link.return_state,
                                "returned_at": link.returned_at,
                                "returned_by": link.returned_by,
                            }),
                            &link_filters(link.loan_id, &[link.article_id]),
                        )
                        .await?;
                }
            }
            Compensation::RestoreArticles(articles) => {
                for article in articles {
                    client
                        .update(
                            tables::ARTICLES,
                            json!({ "status": article.status, "state": article.state }),
                            &[Filter::eq("id", article.id)],
                        )
                        .await?;
                }
            }
            Compensation::RecreateLinks(links) => {
                if !links.is_empty() {
                    let rows: Vec<Value> = links.iter().map(link_row).collect();
                    client.insert(tables::LOAN_ARTICLES, Value::Array(rows)).await?;
                }
            }
            Compensation::DeleteLinks(loan_id) => {
                client
                    .delete(tables::LOAN_ARTICLES, &[Filter::eq("loan_id", loan_id)])
                    .await?;
            }
            Compensation::DeleteLoan(loan_id) => {
                client
                    .delete(tables::LOANS, &[Filter::eq("id", loan_id)])
                    .await?;
            }
        }
        Ok(())
    }
}

struct Saga<'a> {
    client: &'a dyn TableClient,
    flow: &'static str,
    loan_id: Uuid,
    undo: Vec<Compensation>,
}

impl<'a> Saga<'a> {
    fn new(client: &'a dyn TableClient, flow: &'static str, loan_id: Uuid) -> Self {
        Self {
            client,
            flow,
            loan_id,
            undo: Vec::new(),
        }
    }

    /// Run one step. On failure, undo every committed step and return a
    /// `Flow` error naming the failed step.
    async fn step<T, F>(&mut self, name: &'static str, call: F) -> Result<T, ServiceError>
    where
        F: Future<Output = Result<T, RemoteError>>,
    {
        match call.await {
            Ok(value) => {
                debug!(flow = self.flow, step = name, loan_id = %self.loan_id, "Loan flow step committed");
                Ok(value)
            }
            Err(source) => {
                error!(
                    flow = self.flow,
                    step = name,
                    loan_id = %self.loan_id,
                    error = %source,
                    "Loan flow step failed, compensating"
                );
                let compensated = self.compensate().await;
                Err(ServiceError::Flow {
                    flow: self.flow,
                    step: name,
                    source,
                    compensated,
                })
            }
        }
    }

    /// Register how to undo the step that just committed
    fn committed(&mut self, undo: Compensation) {
        self.undo.push(undo);
    }

    async fn compensate(&mut self) -> bool {
        let mut all_ok = true;
        while let Some(undo) = self.undo.pop() {
            if let Err(e) = undo.apply(self.client).await {
                error!(
                    flow = self.flow,
                    loan_id = %self.loan_id,
                    compensation = ?undo,
                    error = %e,
                    "Compensation failed, loan data may be inconsistent"
                );
                all_ok = false;
            }
        }
        if all_ok {
            warn!(flow = self.flow, loan_id = %self.loan_id, "Loan flow rolled back");
        }
        all_ok
    }
}

/// Rows a flow is about to touch, read before any write
struct LoanSnapshot {
    loan: Loan,
    links: Vec<LoanArticle>,
    articles: Vec<ArticleSnapshot>,
}

impl LoanSnapshot {
    /// Links whose article has not come back yet
    fn open_links(&self) -> Vec<LoanArticle> {
        self.links
            .iter()
            .filter(|l| !l.is_returned())
            .cloned()
            .collect()
    }

    fn articles_on(&self, links: &[LoanArticle]) -> Vec<ArticleSnapshot> {
        self.articles
            .iter()
            .filter(|a| links.iter().any(|l| l.article_id == a.id))
            .cloned()
            .collect()
    }
}

async fn load_snapshot(client: &dyn TableClient, loan_id: Uuid) -> Result<LoanSnapshot, ServiceError> {
    let loan: Loan = fetch_one(
        client,
        SelectQuery::from(tables::LOANS).filter(Filter::eq("id", loan_id)),
    )
    .await?
    .ok_or(ServiceError::NotFound("Prêt"))?;

    let links: Vec<LoanArticle> = fetch_rows(
        client,
        &SelectQuery::from(tables::LOAN_ARTICLES)
            .columns("loan_id, article_id, return_state, returned_at, returned_by")
            .filter(Filter::eq("loan_id", loan_id)),
    )
    .await?;

    let article_ids: Vec<Uuid> = links.iter().map(|l| l.article_id).collect();
    let articles = fetch_article_snapshots(client, &article_ids).await?;

    Ok(LoanSnapshot {
        loan,
        links,
        articles,
    })
}

async fn fetch_article_snapshots(
    client: &dyn TableClient,
    ids: &[Uuid],
) -> Result<Vec<ArticleSnapshot>, RemoteError> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    fetch_rows(
        client,
        &SelectQuery::from(tables::ARTICLES)
            .columns("id, status, state")
            .filter(Filter::is_in("id", ids)),
    )
    .await
}

fn link_filters(loan_id: Uuid, article_ids: &[Uuid]) -> Vec<Filter> {
    vec![
        Filter::eq("loan_id", loan_id),
        Filter::is_in("article_id", article_ids),
    ]
}

fn link_row(link: &LoanArticle) -> Value {
    json!({
        "loan_id": link.loan_id,
        "article_id": link.article_id,
        "return_state": link.return_state,
        "returned_at": link.returned_at,
        "returned_by": link.returned_by,
    })
}

fn returned_patch(state: ArticleState, user_id: Uuid, now: DateTime<Utc>) -> Value {
    json!({
        "return_state": state,
        "returned_at": now,
        "returned_by": user_id,
    })
}

/// Flip the articles to `en_pret`, only from `disponible`. When another loan
/// took one of them since the availability check, the update matches fewer
/// rows: the rows flipped here are put back and the step fails with 409.
async fn mark_articles_lent(client: &dyn TableClient, ids: &[Uuid]) -> Result<(), RemoteError> {
    let flipped = client
        .update(
            tables::ARTICLES,
            json!({ "status": ArticleStatus::EnPret }),
            &[
                Filter::is_in("id", ids),
                Filter::eq("status", ArticleStatus::Disponible.as_str()),
            ],
        )
        .await?;

    if flipped.len() == ids.len() {
        return Ok(());
    }

    let flipped_ids: Vec<String> = flipped
        .iter()
        .filter_map(|row| row.get("id").and_then(Value::as_str).map(str::to_string))
        .collect();
    if !flipped_ids.is_empty() {
        client
            .update(
                tables::ARTICLES,
                json!({ "status": ArticleStatus::Disponible }),
                &[Filter::is_in("id", &flipped_ids)],
            )
            .await?;
    }

    Err(RemoteError::Api {
        status: 409,
        message: "Articles non disponibles: déjà prêtés entre-temps".to_string(),
        code: None,
    })
}

async fn invalidate_loan_queries(ctx: &SessionContext) {
    ctx.queries
        .invalidate_all(&[keys::loans(), keys::articles()])
        .await;
}

// ============================================================================
// Flows
// ============================================================================

async fn open_loan(ctx: &SessionContext, form: &LoanForm) -> Result<Loan, ServiceError> {
    form.validate()?;
    let client = ctx.client();

    let articles = fetch_article_snapshots(client, &form.article_ids).await?;
    let unavailable: Vec<String> = form
        .article_ids
        .iter()
        .filter(|id| {
            !articles
                .iter()
                .any(|a| a.id == **id && a.status == ArticleStatus::Disponible)
        })
        .map(|id| id.to_string())
        .collect();
    if !unavailable.is_empty() {
        return Err(ServiceError::InvalidState(format!(
            "Articles non disponibles: {}",
            unavailable.join(", ")
        )));
    }

    let loan_row = json!({
        "loan_number": generate_loan_number(form.loan_date),
        "beneficiary_id": form.beneficiary_id,
        "loan_date": form.loan_date,
        "expected_return_date": form.expected_return_date,
        "contract_signed": form.contract_signed,
        "notes": form.notes,
        "created_by": ctx.user_id(),
    });

    // The loan id is only known after the insert
    let mut saga = Saga::new(client, "loan_create", Uuid::nil());
    let loan: Loan = saga
        .step("insert_loan", insert_one(client, tables::LOANS, loan_row))
        .await?;
    saga.loan_id = loan.id;
    saga.committed(Compensation::DeleteLoan(loan.id));

    let links: Vec<Value> = form
        .article_ids
        .iter()
        .map(|article_id| json!({ "loan_id": loan.id, "article_id": article_id }))
        .collect();
    saga.step(
        "insert_loan_articles",
        client.insert(tables::LOAN_ARTICLES, Value::Array(links)),
    )
    .await?;
    saga.committed(Compensation::DeleteLinks(loan.id));

    saga.step(
        "mark_articles_lent",
        mark_articles_lent(client, &form.article_ids),
    )
    .await?;

    info!(loan_id = %loan.id, loan_number = %loan.loan_number, articles = form.article_ids.len(), "Loan created");
    invalidate_loan_queries(ctx).await;
    Ok(loan)
}

async fn close_loan(ctx: &SessionContext, loan_id: Uuid) -> Result<ReturnSummary, ServiceError> {
    let client = ctx.client();
    let user_id = ctx.user_id();
    let snapshot = load_snapshot(client, loan_id).await?;

    if snapshot.loan.is_returned() {
        info!(loan_id = %loan_id, "Loan already returned, nothing to do");
        return Ok(ReturnSummary {
            loan_id,
            articles_returned: 0,
            loan_closed: true,
            already_returned: true,
        });
    }

    // Articles already back through a partial return keep their recorded state
    let now = Utc::now();
    let open_links = snapshot.open_links();
    let article_ids: Vec<Uuid> = open_links.iter().map(|l| l.article_id).collect();
    let mut saga = Saga::new(client, "loan_return", loan_id);

    if !article_ids.is_empty() {
        saga.step(
            "update_loan_articles",
            client.update(
                tables::LOAN_ARTICLES,
                returned_patch(ArticleState::Bon, user_id, now),
                &link_filters(loan_id, &article_ids),
            ),
        )
        .await?;
        saga.committed(Compensation::RestoreLinks(open_links.clone()));

        saga.step(
            "update_articles",
            client.update(
                tables::ARTICLES,
                json!({ "status": ArticleStatus::Disponible, "state": ArticleState::Bon }),
                &[Filter::is_in("id", &article_ids)],
            ),
        )
        .await?;
        saga.committed(Compensation::RestoreArticles(snapshot.articles_on(&open_links)));
    }

    saga.step(
        "close_loan",
        client.update(
            tables::LOANS,
            json!({ "actual_return_date": now, "returned_by": user_id }),
            &[Filter::eq("id", loan_id)],
        ),
    )
    .await?;

    info!(loan_id = %loan_id, articles = article_ids.len(), "Loan returned");
    invalidate_loan_queries(ctx).await;

    Ok(ReturnSummary {
        loan_id,
        articles_returned: article_ids.len(),
        loan_closed: true,
        already_returned: false,
    })
}

async fn return_articles(
    ctx: &SessionContext,
    loan_id: Uuid,
    request: &PartialReturnRequest,
) -> Result<ReturnSummary, ServiceError> {
    request.validate()?;
    let client = ctx.client();
    let user_id = ctx.user_id();
    let snapshot = load_snapshot(client, loan_id).await?;

    if snapshot.loan.is_returned() {
        return Err(ServiceError::InvalidState(
            "Ce prêt a déjà été retourné".to_string(),
        ));
    }

    let open_links: HashMap<Uuid, &LoanArticle> = snapshot
        .links
        .iter()
        .filter(|l| !l.is_returned())
        .map(|l| (l.article_id, l))
        .collect();

    if let Some(stray) = request
        .articles
        .iter()
        .find(|a| !open_links.contains_key(&a.article_id))
    {
        return Err(ServiceError::InvalidState(format!(
            "L'article {} ne fait pas partie des articles en cours de prêt",
            stray.article_id
        )));
    }

    let now = Utc::now();
    let mut saga = Saga::new(client, "loan_partial_return", loan_id);

    for item in &request.articles {
        saga.step(
            "update_loan_article",
            client.update(
                tables::LOAN_ARTICLES,
                returned_patch(item.return_state, user_id, now),
                &link_filters(loan_id, &[item.article_id]),
            ),
        )
        .await?;
        let previous = open_links
            .get(&item.article_id)
            .map(|link| vec![(*link).clone()])
            .unwrap_or_default();
        saga.committed(Compensation::RestoreLinks(previous));
    }

    for item in &request.articles {
        saga.step(
            "update_article",
            client.update(
                tables::ARTICLES,
                json!({
                    "status": item.return_state.status_after_return(),
                    "state": item.return_state,
                }),
                &[Filter::eq("id", item.article_id)],
            ),
        )
        .await?;
        let previous = snapshot
            .articles
            .iter()
            .filter(|a| a.id == item.article_id)
            .cloned()
            .collect();
        saga.committed(Compensation::RestoreArticles(previous));
    }

    let loan_closed = open_links.len() == request.articles.len();
    if loan_closed {
        saga.step(
            "close_loan",
            client.update(
                tables::LOANS,
                json!({ "actual_return_date": now, "returned_by": user_id }),
                &[Filter::eq("id", loan_id)],
            ),
        )
        .await?;
    }

    info!(
        loan_id = %loan_id,
        articles = request.articles.len(),
        loan_closed,
        "Partial loan return recorded"
    );
    invalidate_loan_queries(ctx).await;

    Ok(ReturnSummary {
        loan_id,
        articles_returned: request.articles.len(),
        loan_closed,
        already_returned: false,
    })
}

async fn remove_loan(ctx: &SessionContext, loan_id: Uuid) -> Result<DeleteSummary, ServiceError> {
    let client = ctx.client();
    let snapshot = load_snapshot(client, loan_id).await?;

    // Only articles still out on this loan are released. Articles of a
    // returned loan may be lent again elsewhere by now.
    let open_links = if snapshot.loan.is_returned() {
        Vec::new()
    } else {
        snapshot.open_links()
    };
    let released: Vec<Uuid> = open_links.iter().map(|l| l.article_id).collect();
    let mut saga = Saga::new(client, "loan_delete", loan_id);

    if !released.is_empty() {
        saga.step(
            "release_articles",
            client.update(
                tables::ARTICLES,
                json!({ "status": ArticleStatus::Disponible }),
                &[Filter::is_in("id", &released)],
            ),
        )
        .await?;
        saga.committed(Compensation::RestoreArticles(snapshot.articles_on(&open_links)));
    }

    if !snapshot.links.is_empty() {
        saga.step(
            "delete_loan_articles",
            client.delete(tables::LOAN_ARTICLES, &[Filter::eq("loan_id", loan_id)]),
        )
        .await?;
        saga.committed(Compensation::RecreateLinks(snapshot.links.clone()));
    }

    saga.step(
        "delete_loan",
        client.delete(tables::LOANS, &[Filter::eq("id", loan_id)]),
    )
    .await?;

    info!(
        loan_id = %loan_id,
        loan_number = %snapshot.loan.loan_number,
        released = released.len(),
        "Loan deleted"
    );
    invalidate_loan_queries(ctx).await;

    Ok(DeleteSummary {
        loan_id,
        articles_released: released.len(),
    })
}

async fn patch_loan(
    ctx: &SessionContext,
    loan_id: Uuid,
    update: &LoanUpdate,
) -> Result<Loan, ServiceError> {
    let current: Loan = fetch_one(
        ctx.client(),
        SelectQuery::from(tables::LOANS).filter(Filter::eq("id", loan_id)),
    )
    .await?
    .ok_or(ServiceError::NotFound("Prêt"))?;
    update.validate(current.loan_date)?;

    let patch = update.to_patch();
    if patch.as_object().map(|p| p.is_empty()).unwrap_or(true) {
        debug!(loan_id = %loan_id, "Empty loan update, nothing to write");
        return Ok(current);
    }

    let updated = ctx
        .client()
        .update(tables::LOANS, patch, &[Filter::eq("id", loan_id)])
        .await?
        .into_iter()
        .next()
        .ok_or(ServiceError::NotFound("Prêt"))?;

    ctx.queries.invalidate(&keys::loans()).await;
    Ok(serde_json::from_value(updated)?)
}
