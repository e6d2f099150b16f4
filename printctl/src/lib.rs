//! # printctl: print-job settlement and wallet reconciliation
//!
//! `printctl` is the billing core of a campus self-service printing platform. Students upload
//! documents, submit print jobs against a page balance, and top that balance up by bank
//! transfer. This crate owns the two money-like flows:
//!
//! - **Settlement**: document → normalized PDF → page count → page range → cost → balance debit,
//!   persisted as a PENDING print job. See [`settlement`].
//! - **Reconciliation**: payment gateway webhook → matching pending top-up → balance credit,
//!   exactly once per transfer. See [`payments`].
//!
//! ## Architecture
//!
//! The HTTP layer is [Axum](https://github.com/tokio-rs/axum). All balance mutations go through
//! the [`storage::Storage`] trait, which has a PostgreSQL implementation for production and an
//! in-memory implementation for development and tests. Every mutation writes a ledger entry in the
//! same unit of work.
//!
//! Document normalization ([`documents`]) tries an optional HTTP conversion service and then a
//! local headless office engine. PDFs pass straight through.
//!
//! Identity comes from a trusted proxy header set by the gateway in front of this service
//! ([`auth`]); token verification happens there.
//!
//! ## Quick Start
//!
//! ```no_run
//! use clap::Parser;
//! use printctl::{Application, Config};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let args = printctl::config::Args::parse();
//!     let config = Config::load(&args)?;
//!
//!     printctl::telemetry::init_telemetry(config.enable_otel_export)?;
//!
//!     let app = Application::new(config).await?;
//!     app.serve(async {
//!         let _ = tokio::signal::ctrl_c().await;
//!     })
//!     .await
//! }
//! ```
//!
//! ## Configuration
//!
//! See the [`config`] module for configuration options.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod documents;
pub mod errors;
pub mod metrics;
mod openapi;
pub mod payments;
pub mod pricing;
pub mod settlement;
pub mod storage;
pub mod telemetry;
pub mod types;

#[cfg(test)]
pub mod test_utils;

use crate::{
    config::DatabaseConfig,
    documents::{ConversionStrategy, Normalizer, local::LocalEngine, remote::RemoteConversion},
    metrics::LedgerMetrics,
    openapi::ApiDoc,
    payments::Reconciler,
    settlement::Settlement,
    storage::{Storage, in_memory::InMemoryStorage, postgres::PostgresStorage},
};
use axum::{
    Router,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
};
use bon::Builder;
use sqlx::{PgPool, postgres::PgPoolOptions};
use std::{sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tower_http::trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer};
use tracing::{Level, debug, info};
use utoipa::OpenApi;
use utoipa_scalar::{Scalar, Servable};

pub use config::Config;

/// Application state shared across all request handlers.
///
/// # Example
///
/// ```ignore
/// let state = AppState::builder()
///     .config(config)
///     .storage(storage)
///     .settlement(settlement)
///     .reconciler(reconciler)
///     .build();
/// ```
#[derive(Clone, Builder)]
pub struct AppState {
    pub config: Config,
    pub storage: Arc<dyn Storage>,
    pub settlement: Settlement,
    pub reconciler: Reconciler,
    pub metrics: Option<LedgerMetrics>,
}

/// Get the printctl database migrator
pub fn migrator() -> sqlx::migrate::Migrator {
    sqlx::migrate!("./migrations")
}

/// Assemble the conversion strategies in fallback order: remote service, then local engine.
pub fn build_normalizer(config: &config::ConversionConfig, metrics: Option<LedgerMetrics>) -> anyhow::Result<Normalizer> {
    let mut strategies: Vec<Arc<dyn ConversionStrategy>> = Vec::new();

    if let Some(remote) = &config.remote {
        strategies.push(Arc::new(RemoteConversion::new(remote)?));
    }
    if config.local.enabled {
        strategies.push(Arc::new(LocalEngine::new(&config.local)));
    }

    let mut normalizer = Normalizer::new(strategies);
    if let Some(root) = &config.temp_dir {
        normalizer = normalizer.with_temp_root(root);
    }
    if let Some(metrics) = metrics {
        normalizer = normalizer.with_metrics(metrics);
    }

    info!("Conversion strategies: {:?}", normalizer.strategy_names());
    Ok(normalizer)
}

/// Wire settlement and reconciliation on top of `storage`.
pub fn build_state(config: Config, storage: Arc<dyn Storage>) -> anyhow::Result<AppState> {
    let metrics = if config.enable_metrics {
        let registry = prometheus::Registry::new();
        Some(LedgerMetrics::new(&registry).map_err(|e| anyhow::anyhow!("Failed to create ledger metrics: {}", e))?)
    } else {
        None
    };

    let normalizer = build_normalizer(&config.conversion, metrics.clone())?;

    let mut settlement = Settlement::new(storage.clone(), normalizer, config.pricing.a3_multiplier);
    let mut reconciler = Reconciler::new(storage.clone(), &config.payment)?;
    if let Some(metrics) = &metrics {
        settlement = settlement.with_metrics(metrics.clone());
        reconciler = reconciler.with_metrics(metrics.clone());
    }

    Ok(AppState::builder()
        .config(config)
        .storage(storage)
        .settlement(settlement)
        .reconciler(reconciler)
        .maybe_metrics(metrics)
        .build())
}

/// Build the application router.
///
/// - `/healthz`: liveness
/// - `/api/v1/*`: student API
/// - `/webhooks/payments`: payment gateway notifications
/// - `/internal/documents`: upload registration by the upload receiver
/// - `/api/docs`: OpenAPI documentation
/// - `/internal/metrics`: Prometheus metrics, when enabled
pub fn build_router(state: &AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/print-jobs",
            get(api::handlers::print_jobs::list_print_jobs).post(api::handlers::print_jobs::create_print_job),
        )
        .route("/print-jobs/{id}", get(api::handlers::print_jobs::get_print_job))
        .route("/print-jobs/{id}/cancel", post(api::handlers::print_jobs::cancel_print_job))
        .route("/balance", get(api::handlers::balances::get_balance))
        .route("/top-ups", post(api::handlers::transactions::create_top_up))
        .route("/transactions", get(api::handlers::transactions::list_transactions))
        .with_state(state.clone());

    let mut router = Router::new()
        .route("/healthz", get(|| async { "OK" }))
        // Webhook routes (external services, not part of client API docs)
        .route("/webhooks/payments", post(api::handlers::payments::webhook))
        .route("/internal/documents", post(api::handlers::documents::register_document))
        .with_state(state.clone())
        .nest("/api/v1", api_routes)
        .merge(Scalar::with_url("/api/docs", ApiDoc::openapi()));

    if let Some(metrics) = state.metrics.clone() {
        router = router.route(
            "/internal/metrics",
            get(move || async move {
                match metrics.render() {
                    Ok(body) => (StatusCode::OK, body).into_response(),
                    Err(e) => errors::Error::Internal {
                        operation: format!("render metrics: {e}"),
                    }
                    .into_response(),
                }
            }),
        );
    }

    // Add tracing layer
    router.layer(
        TraceLayer::new_for_http()
            .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
            .on_request(DefaultOnRequest::new().level(Level::INFO))
            .on_response(DefaultOnResponse::new().level(Level::INFO)),
    )
}

/// Open the configured ledger, running migrations for PostgreSQL.
async fn setup_storage(config: &Config) -> anyhow::Result<(Arc<dyn Storage>, Option<PgPool>)> {
    let policy = config.balances.policy();

    match &config.database {
        DatabaseConfig::InMemory => {
            info!("Using in-memory ledger; balances will be lost on shutdown");
            Ok((Arc::new(InMemoryStorage::new(policy)), None))
        }
        DatabaseConfig::External { url, pool: settings } => {
            info!("Using external database");
            let seconds = |secs: u64| (secs > 0).then(|| Duration::from_secs(secs));
            let pool = PgPoolOptions::new()
                .max_connections(settings.max_connections)
                .min_connections(settings.min_connections)
                .acquire_timeout(Duration::from_secs(settings.acquire_timeout_secs))
                .idle_timeout(seconds(settings.idle_timeout_secs))
                .max_lifetime(seconds(settings.max_lifetime_secs))
                .connect(url)
                .await?;
            migrator().run(&pool).await?;

            Ok((Arc::new(PostgresStorage::new(pool.clone(), policy)), Some(pool)))
        }
    }
}

pub struct Application {
    router: Router,
    app_state: AppState,
    config: Config,
    pool: Option<PgPool>,
}

impl Application {
    /// Create a new application instance with all resources initialized
    pub async fn new(config: Config) -> anyhow::Result<Self> {
        debug!("Starting printctl with configuration: {:#?}", config);

        let (storage, pool) = setup_storage(&config).await?;
        let app_state = build_state(config.clone(), storage)?;
        let router = build_router(&app_state);

        Ok(Self {
            router,
            app_state,
            config,
            pool,
        })
    }

    pub fn storage(&self) -> Arc<dyn Storage> {
        self.app_state.storage.clone()
    }

    /// Convert application into a test server (for tests)
    #[cfg(test)]
    pub fn into_test_server(self) -> axum_test::TestServer {
        axum_test::TestServer::new(self.router.into_make_service()).expect("Failed to create test server")
    }

    /// Start serving the application
    pub async fn serve<F>(self, shutdown: F) -> anyhow::Result<()>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.config.bind_address();
        let listener = TcpListener::bind(&bind_addr).await?;
        info!(
            "printctl listening on http://{}, available at http://localhost:{}",
            bind_addr, self.config.port
        );

        axum::serve(listener, self.router.into_make_service())
            .with_graceful_shutdown(shutdown)
            .await?;

        if let Some(pool) = self.pool {
            info!("Closing database connections...");
            pool.close().await;
        }

        info!("Shutting down telemetry...");
        telemetry::shutdown_telemetry();

        Ok(())
    }
}
