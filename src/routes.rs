use axum::{
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use crate::handlers::{
    articles, auth, beneficiaries, donors, loans, notifications_ws, profile, reports, send_email,
};
use crate::AppState;

/// Dashboard API. The `send-email` function sets its own CORS headers and
/// answers its own preflight, so it sits outside the `CorsLayer`.
pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/api/articles", get(articles::list_articles).post(articles::create_article))
        .route("/api/articles/available", get(articles::list_available_articles))
        .route(
            "/api/articles/{id}",
            put(articles::update_article).delete(articles::delete_article),
        )
        .route(
            "/api/beneficiaries",
            get(beneficiaries::list_beneficiaries).post(beneficiaries::create_beneficiary),
        )
        .route(
            "/api/beneficiaries/{id}",
            get(beneficiaries::get_beneficiary)
                .put(beneficiaries::update_beneficiary)
                .delete(beneficiaries::delete_beneficiary),
        )
        .route("/api/donors", get(donors::list_donors).post(donors::create_donor))
        .route(
            "/api/donors/{id}",
            put(donors::update_donor).delete(donors::delete_donor),
        )
        .route("/api/loans", get(loans::list_loans).post(loans::create_loan))
        .route(
            "/api/loans/{id}",
            get(loans::get_loan)
                .patch(loans::update_loan)
                .delete(loans::delete_loan),
        )
        .route("/api/loans/{id}/return", post(loans::return_loan))
        .route("/api/loans/{id}/return-partial", post(loans::return_loan_partial))
        .route("/api/reports/stats", get(reports::get_report_stats))
        .route("/api/reports/transactions", get(reports::list_transactions))
        .route("/api/profile", get(profile::get_profile))
        .route(
            "/api/profile/currency",
            get(profile::get_currency).put(profile::set_currency),
        )
        .route("/api/auth/sign-out", post(auth::sign_out))
        .route(
            "/api/notifications/ws",
            get(notifications_ws::notifications_websocket),
        )
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        );

    let functions = Router::new().route(
        "/functions/v1/send-email",
        post(send_email::send_email).options(send_email::send_email_preflight),
    );

    Router::new()
        .route("/", get(health))
        .merge(api)
        .merge(functions)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> &'static str {
    "Aid inventory backend is running"
}
