//! DocSift Gateway
//!
//! The control surface for the audit pipeline. Handles:
//! - Staged-record listing and audit dispositions
//! - Promotion and rejected-submission cleanup
//! - The process_existing scan trigger
//! - Model registry queries
//! - Health and readiness probes
//! - Observability (logging, metrics, tracing)

mod handlers;
mod middleware;

use axum::{
    routing::{get, post},
    Router,
};
use docsift_common::{
    audit::AuditGateway,
    config::AppConfig,
    db::{DbPool, Repository},
    lifecycle::SourceStore,
    metrics,
    policy::{ProvideRoles, RoleDirectory},
    promotion::PromotionEngine,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::signal;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use tracing::{error, info, Level};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub repository: Repository,
    pub audit: AuditGateway,
    pub promotion: PromotionEngine,
    pub store: SourceStore,
    pub roles: RoleDirectory,
}

impl ProvideRoles for AppState {
    fn role_directory(&self) -> &RoleDirectory {
        &self.roles
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting DocSift Gateway v{}", docsift_common::VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;

    let config = Arc::new(config);

    // Initialize metrics
    metrics::register_metrics();
    if config.observability.metrics_port > 0 {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.observability.metrics_port));
        if let Err(e) = builder.install() {
            error!(error = %e, "Failed to install Prometheus exporter");
        }
    }

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repository = Repository::new(db.clone());

    // Open the source store (shared with the worker pool via data_dir)
    let store = SourceStore::open(
        &config.store.data_dir,
        config.lease_ttl(),
        config.store.max_attempts,
    )?;

    // Create app state
    let state = AppState {
        repository: repository.clone(),
        audit: AuditGateway::new(repository.clone()),
        promotion: PromotionEngine::new(db),
        roles: RoleDirectory::from_config(&config.auth),
        store,
        config: config.clone(),
    };

    // Build the router
    let app = create_router(state, &config);

    // Start the server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Create the main application router
fn create_router(state: AppState, config: &AppConfig) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // API routes
    let api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))

        // Record endpoints (audit surface)
        .route("/records", get(handlers::records::list_records))
        .route("/records/{id}/status", post(handlers::records::set_record_status))
        .route("/records/{id}/reset", post(handlers::records::reset_record))

        // Submission endpoints
        .route("/submissions/{id}/promote", post(handlers::submissions::promote_submission))
        .route("/submissions/cleanup", post(handlers::submissions::cleanup_rejected))

        // Document control
        .route("/documents/scan", post(handlers::documents::request_scan))

        // Model registry
        .route("/models/current", get(handlers::models::current_model));

    // Compose the app
    let mut router = Router::new()
        .nest("/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id);

    if config.rate_limit.enabled {
        let limiter = middleware::rate_limit::create_rate_limiter(
            config.rate_limit.requests_per_second,
            config.rate_limit.burst,
        );
        router = router.layer(axum::middleware::from_fn(
            move |req: axum::extract::Request, next: axum::middleware::Next| {
                let limiter = limiter.clone();
                async move {
                    middleware::rate_limit::rate_limit_middleware(req, next, limiter).await
                }
            },
        ));
    }

    router.with_state(state)
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, starting shutdown..."),
        _ = terminate => info!("Received SIGTERM, starting shutdown..."),
    }
}
