//! DocSift Model Manager
//!
//! Long-running service owning the model-version registry:
//! 1. Accumulates audit feedback per active version
//! 2. Triggers offline retraining once the feedback threshold is crossed
//! 3. Validates candidates against a held-out check
//! 4. Hot-swaps the active version in a single registry transaction

mod manager;
mod trainer;

use crate::manager::{LifecycleConfig, ModelLifecycleManager};
use crate::trainer::create_trainer;
use docsift_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    metrics, COMPONENT_MODEL_MANAGER, VERSION,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn, Level};

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

    info!("Starting DocSift Model Manager v{}", VERSION);

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

    // Initialize the trainer client
    let trainer = create_trainer(
        &config.model.provider,
        config.model.api_base.clone(),
        config.model.api_key.clone(),
        Duration::from_secs(config.model.timeout_secs),
    );

    info!(provider = trainer.provider_name(), "Trainer client initialized");

    let mut manager = ModelLifecycleManager::new(
        repository.clone(),
        trainer,
        LifecycleConfig {
            feedback_threshold: config.model.feedback_threshold,
            min_retrain_interval_secs: config.model.min_retrain_interval_secs,
            validation_min_score: config.model.validation_min_score,
            baseline_tag: config.model.baseline_tag.clone(),
        },
    );

    // Seed the registry so workers always find an active version
    let active = manager.current_model().await?;
    info!(tag = %active.tag, "Active model version");

    metrics::register_metrics();

    let poll_interval = Duration::from_secs(config.model.poll_interval_secs);
    info!(poll_interval_secs = config.model.poll_interval_secs, "Model manager ready");

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = tokio::time::sleep(poll_interval) => {
                if let Err(e) = repository
                    .upsert_component_status(COMPONENT_MODEL_MANAGER, true)
                    .await
                {
                    warn!(error = %e, "Heartbeat update failed");
                }

                match manager.maybe_retrain().await {
                    Ok(Some(activated)) => {
                        info!(tag = %activated.tag, "New model version activated");
                    }
                    Ok(None) => {}
                    Err(e) => {
                        // Failures here never touch the active version
                        error!(error = %e, "Retrain attempt failed");
                    }
                }
            }
        }
    }

    // Stop advertising as accepting work
    if let Err(e) = repository
        .upsert_component_status(COMPONENT_MODEL_MANAGER, false)
        .await
    {
        error!(error = %e, "Final heartbeat failed");
    }

    info!("Model manager shutting down");
    Ok(())
}
