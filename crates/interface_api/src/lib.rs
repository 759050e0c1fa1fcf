//! HTTP API Layer
//!
//! This crate provides the REST API of the billing engine using Axum. A
//! book-keeper runs the yearly billing, publishes bills, imports bank
//! payments and pushes bookings to the external ledger through it.
//!
//! # Architecture
//!
//! - **Handlers**: Request handlers per area (billing, payments, ledger)
//! - **Middleware**: Authentication, authorization, tracing, audit logging
//! - **DTOs**: Request/Response data transfer objects
//! - **Error Handling**: Consistent error responses
//!
//! # Example
//!
//! ```rust,ignore
//! use interface_api::{create_router, AppState};
//!
//! let state = AppState::new(repository, Some(ledger), config);
//! axum::serve(listener, create_router(state)).await?;
//! ```

pub mod auth;
pub mod config;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;

use std::sync::Arc;

use axum::{
    middleware as axum_middleware,
    routing::{get, post},
    Router,
};
use tokio::sync::Mutex;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use domain_billing::{BalanceReport, BillAggregator, BillingRepository, BookingGenerator, LedgerPort, PaymentProcessor};

use crate::config::ApiConfig;
use crate::handlers::{billing, health, ledger, payments};
use crate::middleware::{audit_middleware, auth_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub repository: Arc<dyn BillingRepository>,
    /// External ledger; `None` disables ledger sync
    pub ledger: Option<Arc<dyn LedgerPort>>,
    pub config: ApiConfig,
    /// Held by every handler that writes bills or payments
    pub mutations: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(
        repository: Arc<dyn BillingRepository>,
        ledger: Option<Arc<dyn LedgerPort>>,
        config: ApiConfig,
    ) -> Self {
        Self {
            repository,
            ledger,
            config,
            mutations: Arc::new(Mutex::new(())),
        }
    }

    pub fn aggregator(&self) -> BillAggregator {
        BillAggregator::new(self.repository.clone())
    }

    pub fn payments(&self) -> PaymentProcessor {
        PaymentProcessor::new(self.repository.clone())
    }

    pub fn bookings(&self) -> BookingGenerator {
        BookingGenerator::new(self.repository.clone())
    }

    pub fn balances(&self) -> BalanceReport {
        BalanceReport::new(self.repository.clone())
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .field("ledger", &self.ledger.is_some())
            .finish_non_exhaustive()
    }
}

/// Creates the main API router
///
/// # Arguments
///
/// * `state` - Repository, optional ledger and configuration
///
/// # Returns
///
/// Configured Axum router with all routes and middleware
pub fn create_router(state: AppState) -> Router {
    // Public routes (no auth required)
    let public_routes = Router::new()
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::readiness_check));

    let year_routes = Router::new()
        .route("/:id/billable-items", get(billing::list_billable_items))
        .route("/:id/bills", post(billing::create_bills))
        .route("/:id/open-bills", get(billing::list_open_bills));

    let bill_routes = Router::new()
        .route("/publish", post(billing::publish_bills))
        .route("/:id", get(billing::get_bill))
        .route("/:id/recalc", post(billing::recalc_bill))
        .route("/:id/items", post(billing::add_custom_item))
        .route("/:id/reference", get(billing::get_reference));

    let payment_routes = Router::new()
        .route("/check", post(payments::check_payments))
        .route("/import", post(payments::import_payments));

    // Protected API routes
    let api_routes = Router::new()
        .nest("/business-years", year_routes)
        .nest("/bills", bill_routes)
        .nest("/payments", payment_routes)
        .route("/bookings", get(ledger::list_bookings))
        .route("/bookings/export", get(ledger::export_bookings))
        .route("/ledger/sync", post(ledger::sync_ledger))
        .route("/balances", get(ledger::member_balances))
        .layer(axum_middleware::from_fn_with_state(state.clone(), audit_middleware))
        .layer(axum_middleware::from_fn_with_state(state.clone(), auth_middleware));

    Router::new()
        .merge(public_routes)
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}
