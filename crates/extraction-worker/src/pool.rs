//! Worker pool
//!
//! A configurable number of independent tokio tasks pull documents from the
//! lifecycle manager; the lease keeps any two workers off the same document.
//! A maintenance task sweeps expired leases, heartbeats the health surface,
//! and wakes sleeping workers when an immediate scan is requested.

use crate::errors::ExtractionError;
use crate::processor::ExtractionProcessor;
use docsift_common::lifecycle::SourceStore;
use docsift_common::{metrics, Repository, COMPONENT_EXTRACTION_WORKER};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Notify};
use tracing::{debug, error, info, warn};

/// Shared context for all worker tasks
#[derive(Clone)]
pub struct PoolContext {
    pub store: SourceStore,
    pub repository: Repository,
    pub processor: Arc<ExtractionProcessor>,
    pub poll_interval: Duration,
    pub baseline_tag: String,
}

/// Outcome of one claim attempt
enum ClaimOutcome {
    Processed,
    Idle,
}

/// Claim and process a single document, handling the failure routing:
/// transient errors requeue, permanent errors dead-letter, stale leases
/// discard the result.
async fn process_next(ctx: &PoolContext, worker_name: &str) -> ClaimOutcome {
    let claimed = match ctx.store.claim(worker_name) {
        Ok(Some(doc)) => doc,
        Ok(None) => return ClaimOutcome::Idle,
        Err(e) => {
            error!(error = %e, "Claim failed");
            return ClaimOutcome::Idle;
        }
    };

    // Resolve the model version once per document; in-flight documents
    // finish with whichever version they started with.
    let model_tag = match ctx.repository.active_model().await {
        Ok(Some(model)) => model.tag,
        Ok(None) => match ctx.repository.ensure_baseline_model(&ctx.baseline_tag).await {
            Ok(model) => model.tag,
            Err(e) => {
                error!(error = %e, "No active model and baseline seeding failed");
                let _ = ctx.store.requeue(&claimed.name, claimed.token, "model registry unavailable");
                return ClaimOutcome::Idle;
            }
        },
        Err(e) => {
            error!(error = %e, "Model registry lookup failed");
            let _ = ctx.store.requeue(&claimed.name, claimed.token, "model registry unavailable");
            return ClaimOutcome::Idle;
        }
    };

    let started = Instant::now();
    match ctx.processor.process(&claimed, &model_tag).await {
        Ok(outcome) => {
            match ctx
                .store
                .advance(&claimed.name, claimed.token, docsift_common::lifecycle::Bucket::Processed)
            {
                Ok(()) => {
                    metrics::record_extraction(
                        started.elapsed().as_secs_f64(),
                        outcome.record_count,
                        true,
                    );
                    info!(
                        document = %claimed.name,
                        submission_id = %outcome.submission_id,
                        records = outcome.record_count,
                        "Document processed"
                    );
                }
                Err(e) if matches!(e, docsift_common::AppError::StaleLease { .. }) => {
                    warn!(document = %claimed.name, "Lease reclaimed before advance, result kept by current claimant");
                }
                Err(e) => {
                    // Lifecycle mismatch: reconcile rather than overwrite
                    warn!(document = %claimed.name, error = %e, "Advance conflict, running reconciliation sweep");
                    if let Ok(report) = ctx.store.release_stale() {
                        metrics::record_lease_reclaims(report.requeued.len());
                    }
                }
            }
            ClaimOutcome::Processed
        }
        Err(ExtractionError::StaleLease(document)) => {
            warn!(document = %document, "Late result discarded, lease was reclaimed");
            ClaimOutcome::Processed
        }
        Err(e) if e.is_permanent() => {
            error!(document = %claimed.name, error = %e, "Permanent failure, dead-lettering");
            metrics::record_extraction(started.elapsed().as_secs_f64(), 0, false);
            if let Err(fail_err) = ctx.store.fail(&claimed.name, claimed.token, &e.to_string()) {
                warn!(document = %claimed.name, error = %fail_err, "Dead-letter move failed");
            }
            ClaimOutcome::Processed
        }
        Err(e) => {
            warn!(document = %claimed.name, error = %e, "Transient failure, requeueing");
            if let Err(requeue_err) = ctx.store.requeue(&claimed.name, claimed.token, &e.to_string())
            {
                warn!(document = %claimed.name, error = %requeue_err, "Requeue failed");
            }
            ClaimOutcome::Processed
        }
    }
}

/// One worker task: claim, process, repeat; sleep when incoming is empty
pub async fn run_worker(
    ctx: PoolContext,
    worker_id: usize,
    wake: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    let worker_name = format!("{}-{}", COMPONENT_EXTRACTION_WORKER, worker_id);
    info!(worker = %worker_name, "Worker started");

    loop {
        if *shutdown.borrow() {
            break;
        }

        match process_next(&ctx, &worker_name).await {
            ClaimOutcome::Processed => continue,
            ClaimOutcome::Idle => {
                tokio::select! {
                    _ = tokio::time::sleep(ctx.poll_interval) => {}
                    _ = wake.notified() => {
                        debug!(worker = %worker_name, "Woken for immediate scan");
                    }
                    _ = shutdown.changed() => {}
                }
            }
        }
    }

    info!(worker = %worker_name, "Worker stopped");
}

/// Maintenance task: stale-lease sweeps, heartbeats, scan-request wakeups
pub async fn run_maintenance(
    ctx: PoolContext,
    wake: Arc<Notify>,
    mut shutdown: watch::Receiver<bool>,
) {
    // Sweep well under the lease TTL so expired claims are reclaimed promptly
    let sweep_interval = ctx.poll_interval.min(Duration::from_secs(5));

    loop {
        if *shutdown.borrow() {
            break;
        }

        match ctx.store.release_stale() {
            Ok(report) => {
                metrics::record_lease_reclaims(report.requeued.len());
                if !report.dead_lettered.is_empty() {
                    warn!(
                        documents = ?report.dead_lettered,
                        "Documents dead-lettered by stale-lease sweep"
                    );
                }
            }
            Err(e) => error!(error = %e, "Stale-lease sweep failed"),
        }

        if ctx.store.take_scan_request() {
            info!("Immediate scan requested");
            wake.notify_waiters();
        }

        if let Err(e) = ctx
            .repository
            .upsert_component_status(COMPONENT_EXTRACTION_WORKER, true)
            .await
        {
            warn!(error = %e, "Heartbeat update failed");
        }

        tokio::select! {
            _ = tokio::time::sleep(sweep_interval) => {}
            _ = shutdown.changed() => {}
        }
    }
}

/// One forced pass over incoming: process until the bucket is drained.
/// This is the direct form of the `process_existing` control command.
pub async fn scan_once(ctx: &PoolContext) -> usize {
    let mut processed = 0;
    loop {
        match process_next(ctx, "extraction-worker-scan").await {
            ClaimOutcome::Processed => processed += 1,
            ClaimOutcome::Idle => break,
        }
    }
    processed
}
