use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use aid_inventory_backend::config::Config;
use aid_inventory_backend::routes::router;
use aid_inventory_backend::services::notifier::Notifier;
use aid_inventory_backend::services::remote::RestBackend;
use aid_inventory_backend::services::session::SessionRegistry;
use aid_inventory_backend::AppState;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,aid_inventory_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tracing::info!("Connecting to backend at {}", config.backend_url);
    let backend = RestBackend::new(&config)?;

    let notifier = Notifier::new();
    let sessions = SessionRegistry::new(
        Arc::new(backend),
        notifier.clone(),
        Duration::from_secs(config.session_idle_secs),
        &config.default_currency,
    );

    let state = AppState { sessions, notifier };
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr).await?;
    tracing::info!("Server listening on {}", listener.local_addr()?);

    axum::serve(listener, app).await?;
    Ok(())
}
