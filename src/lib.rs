// src/lib.rs

use services::notifier::Notifier;
use services::session::SessionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub sessions: SessionRegistry,
    pub notifier: Notifier,
}

pub mod config;

pub mod services {
    pub mod remote;
    pub mod error;
    pub mod query_cache;
    pub mod notifier;
    pub mod currency;
    pub mod session;
    pub mod profiles;
    pub mod articles;
    pub mod beneficiaries;
    pub mod donors;
    pub mod loans;
    pub mod reports;
    pub mod format;
}

pub mod models;
pub mod handlers;
pub mod routes;
