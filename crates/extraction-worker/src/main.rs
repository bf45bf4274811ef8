//! DocSift Extraction Worker
//!
//! Long-running worker pool that:
//! 1. Claims documents from the source store's incoming bucket
//! 2. Runs the three-phase extraction (parse, candidates, package)
//! 3. Stages provenance-tagged submissions for audit
//! 4. Routes failures to retry or the dead-letter bucket
//!
//! Run with the `scan` argument for one forced pass over incoming
//! (the `process_existing` control command), or with no arguments as a
//! service.

mod errors;
mod parser;
mod pool;
mod processor;

use crate::pool::{run_maintenance, run_worker, scan_once, PoolContext};
use crate::processor::{ExtractionProcessor, ProcessorConfig};
use docsift_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    inference::create_extractor,
    lifecycle::SourceStore,
    metrics, COMPONENT_EXTRACTION_WORKER, VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Notify};
use tracing::{error, info, Level};

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

    info!("Starting DocSift Extraction Worker v{}", VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;

    let config = Arc::new(config);

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repository = Repository::new(db);

    // Open the source store
    let store = SourceStore::open(
        &config.store.data_dir,
        config.lease_ttl(),
        config.store.max_attempts,
    )?;

    // Initialize the inference client
    let extractor = create_extractor(
        &config.extraction.provider,
        config.extraction.api_base.clone(),
        config.extraction.api_key.clone(),
        Duration::from_secs(config.extraction.timeout_secs),
        config.extraction.max_retries,
    );

    info!(provider = extractor.provider_name(), "Inference client initialized");

    let processor = Arc::new(ExtractionProcessor::new(
        repository.clone(),
        store.clone(),
        extractor,
        ProcessorConfig {
            chunk_size: config.extraction.chunk_size,
            excerpt_len: config.extraction.excerpt_len,
            artifacts_dir: config.store.data_dir.join("artifacts"),
        },
    ));

    // The registry must have an active version before any claim
    repository
        .ensure_baseline_model(&config.model.baseline_tag)
        .await?;

    let ctx = PoolContext {
        store,
        repository: repository.clone(),
        processor,
        poll_interval: Duration::from_secs(config.store.poll_interval_secs),
        baseline_tag: config.model.baseline_tag.clone(),
    };

    // One-shot scan mode
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && args[1] == "scan" {
        info!("Running one forced scan over incoming...");
        let processed = scan_once(&ctx).await;
        println!("Processed {} document(s)", processed);
        return Ok(());
    }

    // Service mode
    metrics::register_metrics();
    if config.observability.metrics_port > 0 {
        let builder = metrics_exporter_prometheus::PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], config.observability.metrics_port));
        if let Err(e) = builder.install() {
            error!(error = %e, "Failed to install Prometheus exporter");
        }
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let wake = Arc::new(Notify::new());

    let mut handles = Vec::new();
    for worker_id in 0..config.store.worker_count {
        handles.push(tokio::spawn(run_worker(
            ctx.clone(),
            worker_id,
            wake.clone(),
            shutdown_rx.clone(),
        )));
    }
    handles.push(tokio::spawn(run_maintenance(
        ctx.clone(),
        wake.clone(),
        shutdown_rx.clone(),
    )));

    info!(
        workers = config.store.worker_count,
        "Extraction worker pool ready"
    );

    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received");

    shutdown_tx.send(true).ok();
    wake.notify_waiters();
    for handle in handles {
        let _ = handle.await;
    }

    // Stop advertising as accepting work
    if let Err(e) = repository
        .upsert_component_status(COMPONENT_EXTRACTION_WORKER, false)
        .await
    {
        error!(error = %e, "Final heartbeat failed");
    }

    info!("Extraction worker shutting down");
    Ok(())
}
