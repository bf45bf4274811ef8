//! Model lifecycle manager
//!
//! Accumulates audit feedback per active model version and, once the
//! configured threshold is crossed, retrains a candidate offline and swaps
//! it in behind a held-out validation check. Activation is one registry
//! transaction, so readers of `current_model` always see exactly one
//! active version; a candidate that fails validation never becomes active.

use crate::trainer::ModelTrainer;
use chrono::{DateTime, Utc};
use docsift_common::db::models::ModelVersion;
use docsift_common::errors::Result;
use docsift_common::{metrics, Repository};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, instrument, warn};

/// Lifecycle policy knobs, all operator-configurable
#[derive(Debug, Clone)]
pub struct LifecycleConfig {
    /// Accepted+rejected decisions needed before a retrain is considered
    pub feedback_threshold: u64,
    /// Minimum seconds between retrain attempts
    pub min_retrain_interval_secs: u64,
    /// Held-out score a candidate must reach to be activated
    pub validation_min_score: f64,
    /// Tag seeded when the registry is empty
    pub baseline_tag: String,
}

/// Model lifecycle manager
pub struct ModelLifecycleManager {
    repository: Repository,
    trainer: Arc<dyn ModelTrainer>,
    config: LifecycleConfig,
    /// Throttles repeat attempts while a failing candidate keeps failing
    last_attempt: Option<Instant>,
}

impl ModelLifecycleManager {
    pub fn new(
        repository: Repository,
        trainer: Arc<dyn ModelTrainer>,
        config: LifecycleConfig,
    ) -> Self {
        Self {
            repository,
            trainer,
            config,
            last_attempt: None,
        }
    }

    /// The active model version, seeding the baseline on an empty registry
    pub async fn current_model(&self) -> Result<ModelVersion> {
        match self.repository.active_model().await? {
            Some(model) => Ok(model),
            None => self.repository.ensure_baseline_model(&self.config.baseline_tag).await,
        }
    }

    /// Retrain and hot-swap if enough feedback has accumulated.
    ///
    /// Returns the newly activated version, or None when nothing happened
    /// (below threshold, throttled, or the candidate failed validation —
    /// in which case the active version is untouched and the candidate is
    /// retired with the failure noted).
    #[instrument(skip(self))]
    pub async fn maybe_retrain(&mut self) -> Result<Option<ModelVersion>> {
        let active = self.current_model().await?;
        let activated_at: DateTime<Utc> = active
            .activated_at
            .map(Into::into)
            .unwrap_or_else(|| active.created_at.into());

        if let Some(last) = self.last_attempt {
            if last.elapsed().as_secs() < self.config.min_retrain_interval_secs {
                return Ok(None);
            }
        }

        let feedback = self
            .repository
            .count_feedback_since(&active.tag, activated_at)
            .await?;

        metrics::record_feedback_pending(feedback);

        if feedback < self.config.feedback_threshold {
            return Ok(None);
        }

        info!(
            active = %active.tag,
            feedback = feedback,
            threshold = self.config.feedback_threshold,
            "Feedback threshold crossed, retraining"
        );
        self.last_attempt = Some(Instant::now());

        let snapshot_ref = format!(
            "audit-feedback/{}/{}",
            active.tag,
            Utc::now().format("%Y%m%dT%H%M%SZ")
        );

        let candidate_tag = match self.trainer.train(&snapshot_ref).await {
            Ok(tag) => tag,
            Err(e) => {
                warn!(error = %e, "Training failed, active version untouched");
                metrics::record_retrain("train_error");
                return Err(e);
            }
        };

        let candidate = self
            .repository
            .insert_candidate_model(&candidate_tag, Some(snapshot_ref))
            .await?;

        // Two-phase swap: validate first, activate only on a passing score
        let score = match self.trainer.validate(&candidate_tag).await {
            Ok(score) => score,
            Err(e) => {
                warn!(candidate = %candidate_tag, error = %e, "Validation errored, retiring candidate");
                self.repository
                    .retire_model(candidate.id, Some(format!("validation errored: {}", e)))
                    .await?;
                metrics::record_retrain("validation_error");
                return Err(e);
            }
        };

        if score < self.config.validation_min_score {
            warn!(
                candidate = %candidate_tag,
                score = score,
                minimum = self.config.validation_min_score,
                "Candidate failed held-out validation, active version untouched"
            );
            self.repository
                .retire_model(
                    candidate.id,
                    Some(format!(
                        "validation score {:.3} below minimum {:.3}",
                        score, self.config.validation_min_score
                    )),
                )
                .await?;
            metrics::record_retrain("rejected");
            return Ok(None);
        }

        let activated = self.repository.activate_model(candidate.id).await?;
        metrics::record_retrain("activated");

        info!(
            tag = %activated.tag,
            score = score,
            retired = %active.tag,
            "Candidate validated and activated"
        );

        Ok(Some(activated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trainer::StaticTrainer;
    use docsift_common::db::models::{FeedbackOutcome, ModelStatus};
    use docsift_common::db::schema::create_schema;
    use docsift_common::db::DbPool;
    use sea_orm::Database;
    use uuid::Uuid;

    async fn manager_with(score: f64, threshold: u64) -> (ModelLifecycleManager, Repository) {
        let conn = Database::connect("sqlite::memory:").await.unwrap();
        create_schema(&conn).await.unwrap();
        let repo = Repository::new(DbPool::from_connection(conn));

        let manager = ModelLifecycleManager::new(
            repo.clone(),
            Arc::new(StaticTrainer::with_score(score)),
            LifecycleConfig {
                feedback_threshold: threshold,
                min_retrain_interval_secs: 0,
                validation_min_score: 0.7,
                baseline_tag: "baseline-v1".to_string(),
            },
        );

        (manager, repo)
    }

    async fn push_feedback(repo: &Repository, tag: &str, count: usize) {
        for i in 0..count {
            let outcome = if i % 2 == 0 {
                FeedbackOutcome::Accepted
            } else {
                FeedbackOutcome::Rejected
            };
            repo.insert_feedback(tag, Uuid::new_v4(), outcome).await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_below_threshold_does_nothing() {
        let (mut manager, repo) = manager_with(1.0, 5).await;
        let baseline = manager.current_model().await.unwrap();

        push_feedback(&repo, &baseline.tag, 3).await;

        assert!(manager.maybe_retrain().await.unwrap().is_none());
        assert_eq!(manager.current_model().await.unwrap().tag, baseline.tag);
    }

    #[tokio::test]
    async fn test_threshold_crossed_swaps_model() {
        let (mut manager, repo) = manager_with(0.95, 5).await;
        let baseline = manager.current_model().await.unwrap();

        push_feedback(&repo, &baseline.tag, 5).await;

        let activated = manager.maybe_retrain().await.unwrap().unwrap();
        assert!(activated.tag.starts_with("candidate-"));
        assert_eq!(manager.current_model().await.unwrap().tag, activated.tag);

        let old = repo.find_model_by_tag(&baseline.tag).await.unwrap().unwrap();
        assert_eq!(old.model_status(), Some(ModelStatus::Retired));
    }

    #[tokio::test]
    async fn test_failed_validation_never_activates() {
        let (mut manager, repo) = manager_with(0.2, 5).await;
        let baseline = manager.current_model().await.unwrap();

        push_feedback(&repo, &baseline.tag, 5).await;

        let result = manager.maybe_retrain().await.unwrap();
        assert!(result.is_none());

        // The active version is the same before and after the failed attempt
        assert_eq!(manager.current_model().await.unwrap().tag, baseline.tag);
        let active = repo.active_model().await.unwrap().unwrap();
        assert_eq!(active.tag, baseline.tag);
    }

    #[tokio::test]
    async fn test_retrain_throttle() {
        let (mut manager, repo) = manager_with(1.0, 1).await;
        manager.config.min_retrain_interval_secs = 3600;
        let baseline = manager.current_model().await.unwrap();

        push_feedback(&repo, &baseline.tag, 2).await;

        let first = manager.maybe_retrain().await.unwrap();
        assert!(first.is_some());

        // Fresh feedback for the new version, but the throttle holds
        let active = manager.current_model().await.unwrap();
        push_feedback(&repo, &active.tag, 2).await;
        assert!(manager.maybe_retrain().await.unwrap().is_none());
    }
}
