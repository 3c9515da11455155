//! Environment-driven configuration

use std::env;
use thiserror::Error;

use crate::services::currency::{is_valid_currency_code, DEFAULT_CURRENCY};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("Invalid value for {key}: {value}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the managed backend (tables under `/rest/v1`, auth under `/auth/v1`)
    pub backend_url: String,
    /// Public API key sent as `apikey` on every backend call
    pub backend_anon_key: String,
    pub bind_addr: String,
    /// Idle time after which a session (query cache, currency) is torn down
    pub session_idle_secs: u64,
    pub remote_timeout_secs: u64,
    pub default_currency: String,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok();

        let backend_url = env::var("BACKEND_URL").map_err(|_| ConfigError::Missing("BACKEND_URL"))?;
        let backend_anon_key =
            env::var("BACKEND_ANON_KEY").map_err(|_| ConfigError::Missing("BACKEND_ANON_KEY"))?;
        let bind_addr = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string());

        let session_idle_secs = parse_u64("SESSION_IDLE_SECS", 3600)?;
        let remote_timeout_secs = parse_u64("REMOTE_TIMEOUT_SECS", 30)?;

        let default_currency =
            env::var("DEFAULT_CURRENCY").unwrap_or_else(|_| DEFAULT_CURRENCY.to_string());
        if !is_valid_currency_code(&default_currency) {
            return Err(ConfigError::Invalid {
                key: "DEFAULT_CURRENCY",
                value: default_currency,
            });
        }

        Ok(Self {
            backend_url,
            backend_anon_key,
            bind_addr,
            session_idle_secs,
            remote_timeout_secs,
            default_currency,
        })
    }
}

fn parse_u64(key: &'static str, default: u64) -> Result<u64, ConfigError> {
    match env::var(key) {
        Ok(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        Err(_) => Ok(default),
    }
}
