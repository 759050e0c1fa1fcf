//! Member Billing - API Server Binary
//!
//! This binary starts the HTTP API of the billing engine.
//!
//! # Usage
//!
//! ```bash
//! # Run with default configuration
//! cargo run --bin billing-api
//!
//! # Run with environment variables
//! BILLING_PORT=8080 BILLING_DATABASE_URL=postgres://... cargo run --bin billing-api
//! ```
//!
//! # Environment Variables
//!
//! * `BILLING_HOST` - Server host (default: 0.0.0.0)
//! * `BILLING_PORT` - Server port (default: 8080)
//! * `BILLING_JWT_SECRET` - JWT signing secret (required in production)
//! * `BILLING_JWT_EXPIRATION_SECS` - JWT token expiration in seconds (default: 3600)
//! * `BILLING_DATABASE_URL` - PostgreSQL connection string
//! * `BILLING_LOG_LEVEL` - Log level: trace, debug, info, warn, error (default: info)
//! * `BILLING_LEDGER_URL` - Base URL of the external ledger (ledger sync is off when unset)
//! * `BILLING_LEDGER_TOKEN` - Bearer token for the ledger
//! * `BILLING_LEDGER_TIMEOUT_SECS` - Ledger request timeout (default: 30)

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use domain_billing::LedgerPort;
use infra_db::{create_pool, run_migrations, DatabaseConfig, PgBillingRepository};
use infra_ledger::{LedgerConfig, RestLedger};
use interface_api::{config::ApiConfig, create_router, AppState};

/// Main entry point for the API server.
///
/// Initializes logging, loads configuration, connects to the database and
/// the ledger, and starts the HTTP server.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present (useful for local development)
    dotenvy::dotenv().ok();

    let config = ApiConfig::from_env().context("Invalid BILLING_* configuration")?;
    init_tracing(&config.log_level);

    tracing::info!(
        host = %config.host,
        port = %config.port,
        "Starting billing API server"
    );

    let pool = create_pool(DatabaseConfig::new(&config.database_url))
        .await
        .context("Failed to connect to the database")?;
    run_migrations(&pool).await.context("Failed to apply migrations")?;
    let repository = Arc::new(PgBillingRepository::new(pool));

    let ledger = connect_ledger(&config)?;
    let state = AppState::new(repository, ledger, config.clone());
    let app = create_router(state);

    let addr: SocketAddr = config
        .server_addr()
        .parse()
        .with_context(|| format!("Invalid server address {}", config.server_addr()))?;

    tracing::info!(%addr, "Server listening");

    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server shutdown complete");
    Ok(())
}

/// Builds the ledger adapter if a ledger URL is configured
fn connect_ledger(config: &ApiConfig) -> anyhow::Result<Option<Arc<dyn LedgerPort>>> {
    let Some(url) = &config.ledger_url else {
        tracing::warn!("BILLING_LEDGER_URL not set, ledger sync disabled");
        return Ok(None);
    };

    let ledger_config = LedgerConfig::new(url, &config.ledger_token).timeout(config.ledger_timeout());
    let ledger = RestLedger::new(ledger_config).context("Failed to build the ledger client")?;
    tracing::info!(url = %url, "Ledger sync enabled");
    Ok(Some(Arc::new(ledger)))
}

/// Initializes the tracing subscriber for structured logging.
///
/// # Arguments
///
/// * `log_level` - The minimum log level to output (trace, debug, info, warn, error)
fn init_tracing(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}

/// Waits for shutdown signal (Ctrl+C or SIGTERM).
///
/// In-flight requests complete before the process exits.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating graceful shutdown");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, initiating graceful shutdown");
        }
    }
}
