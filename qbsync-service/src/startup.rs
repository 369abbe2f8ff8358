//! Application startup and lifecycle management.

use crate::clients::{HttpLedgerConnector, LedgerConnector, QboClient, QuickBooks};
use crate::config::QbsyncConfig;
use crate::handlers;
use crate::services::{
    get_metrics, init_metrics, CustomerMatcher, Database, InvoiceValidator, SkuMatcher, SyncEngine,
    SyncStore,
};
use axum::{
    extract::State,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde_json::json;
use service_core::error::AppError;
use service_core::middleware::metrics::metrics_middleware;
use service_core::middleware::tracing::request_id_middleware;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: QbsyncConfig,
    pub db: Arc<Database>,
    pub customer_matcher: Arc<CustomerMatcher>,
    pub sku_matcher: Arc<SkuMatcher>,
    pub validator: Arc<InvoiceValidator>,
    pub sync: Arc<SyncEngine>,
}

/// Health check endpoint for Docker/K8s liveness probes.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => {
            tracing::debug!("Health check passed");
            (
                StatusCode::OK,
                Json(json!({
                    "status": "ok",
                    "service": "qbsync-service",
                    "version": env!("CARGO_PKG_VERSION")
                })),
            )
        }
        Err(e) => {
            tracing::warn!(error = %e, "Health check failed - database unavailable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "service": "qbsync-service",
                    "error": e.to_string()
                })),
            )
        }
    }
}

/// Readiness check endpoint for K8s readiness probes.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.db.health_check().await {
        Ok(_) => StatusCode::OK,
        Err(e) => {
            tracing::warn!(error = %e, "Readiness check failed");
            StatusCode::SERVICE_UNAVAILABLE
        }
    }
}

/// Metrics endpoint for Prometheus scraping.
async fn metrics_handler() -> impl IntoResponse {
    let metrics = get_metrics();
    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        metrics,
    )
}

/// Build the API router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        // Customer matching
        .route(
            "/api/customers/matching/run",
            post(handlers::customers::run_matching),
        )
        .route(
            "/api/customers/mappings",
            get(handlers::customers::list_mappings)
                .post(handlers::customers::create_mapping)
                .delete(handlers::customers::clear_mappings),
        )
        .route(
            "/api/customers/mappings/stats",
            get(handlers::customers::mapping_stats),
        )
        .route(
            "/api/customers/mappings/:id/approve",
            post(handlers::customers::approve_mapping),
        )
        .route(
            "/api/customers/mappings/:id/reject",
            post(handlers::customers::reject_mapping),
        )
        .route(
            "/api/customers/mappings/:id/qb-customer",
            put(handlers::customers::update_qb_customer),
        )
        // SKU matching
        .route("/api/skus/matching/run", post(handlers::skus::run_matching))
        .route("/api/skus/matching/stats", get(handlers::skus::match_stats))
        .route("/api/skus/mappings", get(handlers::skus::list_mappings))
        .route(
            "/api/skus/matches/approve",
            post(handlers::skus::approve_match),
        )
        .route(
            "/api/skus/matches/approve-all",
            post(handlers::skus::approve_all_matches),
        )
        .route("/api/skus/items", post(handlers::skus::create_item))
        // Validation
        .route(
            "/api/validations",
            get(handlers::validations::list_validations)
                .delete(handlers::validations::clear_all_validations),
        )
        .route(
            "/api/validations/stats",
            get(handlers::validations::validation_stats),
        )
        .route(
            "/api/validations/batch",
            post(handlers::validations::validate_batch),
        )
        .route(
            "/api/validations/run-pending",
            post(handlers::validations::run_pending),
        )
        .route(
            "/api/validations/:invoice_id",
            get(handlers::validations::get_validation)
                .post(handlers::validations::validate_invoice),
        )
        .route(
            "/api/validations/:invoice_id/approve",
            post(handlers::validations::approve_for_sync),
        )
        .route(
            "/api/validations/:invoice_id/mark-synced",
            post(handlers::validations::mark_synced),
        )
        .route(
            "/api/validations/:invoice_id/clear",
            delete(handlers::validations::clear_validation),
        )
        // Sync
        .route(
            "/api/sync/invoices/:invoice_id",
            post(handlers::sync::sync_invoice),
        )
        .route("/api/sync/batch", post(handlers::sync::sync_batch))
        .route("/api/sync/run-ready", post(handlers::sync::sync_all_ready))
        .route(
            "/api/sync/duplicate/:invoice_number",
            get(handlers::sync::check_duplicate),
        )
        // Invoice review
        .route("/api/invoices", get(handlers::sync::list_invoices))
        .route("/api/invoices/:invoice_id", get(handlers::sync::get_invoice))
        .layer(TraceLayer::new_for_http())
        .layer(middleware::from_fn(metrics_middleware))
        .layer(middleware::from_fn(request_id_middleware))
        .with_state(state)
}

/// Application container for managing server lifecycle.
pub struct Application {
    port: u16,
    listener: TcpListener,
    state: AppState,
}

impl Application {
    /// Build the application with the given configuration.
    pub async fn build(config: QbsyncConfig) -> Result<Self, AppError> {
        Self::build_internal(config, true).await
    }

    /// Build the application without running migrations.
    /// Use this in tests when migrations are already applied by the test harness.
    pub async fn build_without_migrations(config: QbsyncConfig) -> Result<Self, AppError> {
        Self::build_internal(config, false).await
    }

    async fn build_internal(config: QbsyncConfig, run_migrations: bool) -> Result<Self, AppError> {
        init_metrics();

        let db = Database::new(
            &config.database.url,
            config.database.max_connections,
            config.database.min_connections,
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to connect to PostgreSQL");
            e
        })?;

        if run_migrations {
            db.run_migrations().await.map_err(|e| {
                tracing::error!(error = %e, "Failed to run migrations");
                e
            })?;
        }

        let db = Arc::new(db);
        let store: Arc<dyn SyncStore> = db.clone();

        let ledger: Arc<dyn LedgerConnector> =
            Arc::new(HttpLedgerConnector::new(config.ledger.url.clone()));

        if config.quickbooks.access_token.is_none() {
            tracing::warn!(
                "QB_ACCESS_TOKEN not set - QuickBooks operations will be unavailable"
            );
        }
        let books: Arc<dyn QuickBooks> = Arc::new(QboClient::new(
            config.quickbooks.base_url.clone(),
            config.quickbooks.realm_id.clone(),
            config.quickbooks.access_token.clone(),
        ));

        let state = AppState {
            customer_matcher: Arc::new(CustomerMatcher::new(
                store.clone(),
                ledger.clone(),
                books.clone(),
            )),
            sku_matcher: Arc::new(SkuMatcher::new(
                store.clone(),
                ledger.clone(),
                books.clone(),
            )),
            validator: Arc::new(InvoiceValidator::new(store.clone(), ledger.clone())),
            sync: Arc::new(SyncEngine::new(
                store,
                ledger,
                books,
                config.tax_config(),
            )),
            db,
            config,
        };

        let addr = SocketAddr::from(([0, 0, 0, 0], state.config.common.port));
        let listener = TcpListener::bind(addr).await.map_err(|e| {
            tracing::error!(error = %e, addr = %addr, "Failed to bind HTTP listener");
            AppError::from(e)
        })?;
        let port = listener.local_addr()?.port();

        tracing::info!(port = port, "qbsync-service listener bound");

        Ok(Self {
            port,
            listener,
            state,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Get a reference to the database.
    pub fn db(&self) -> &Database {
        &self.state.db
    }

    /// Run the application until stopped.
    pub async fn run_until_stopped(self) -> std::io::Result<()> {
        let router = build_router(self.state);

        tracing::info!(
            service = "qbsync-service",
            version = env!("CARGO_PKG_VERSION"),
            port = self.port,
            "Service ready to accept connections"
        );

        axum::serve(self.listener, router).await
    }
}
