//! Trainer client abstraction
//!
//! Retraining runs offline in an external service; this module provides a
//! unified interface over it:
//! - HTTP trainer endpoint (production)
//! - Static trainer with a fixed validation score (development and tests)

use docsift_common::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use uuid::Uuid;

/// Trait for model training and held-out validation
#[async_trait]
pub trait ModelTrainer: Send + Sync {
    /// Train a candidate from a training-data snapshot; returns its tag
    async fn train(&self, snapshot_ref: &str) -> Result<String>;

    /// Score a candidate against the held-out check, in [0, 1]
    async fn validate(&self, tag: &str) -> Result<f64>;

    /// Get the provider name
    fn provider_name(&self) -> &str;
}

/// HTTP trainer client
pub struct HttpTrainer {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
}

#[derive(Serialize)]
struct TrainRequest<'a> {
    snapshot: &'a str,
}

#[derive(Deserialize)]
struct TrainResponse {
    tag: String,
}

#[derive(Serialize)]
struct ValidateRequest<'a> {
    model: &'a str,
}

#[derive(Deserialize)]
struct ValidateResponse {
    score: f64,
}

impl HttpTrainer {
    pub fn new(base_url: String, api_key: Option<String>, timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            base_url,
        }
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        request: &Req,
    ) -> Result<Resp> {
        let url = format!("{}{}", self.base_url, path);

        let mut builder = self.client.post(&url).json(request);
        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::Trainer {
                message: format!("Trainer API error {}: {}", status, body),
            });
        }

        response.json().await.map_err(|e| AppError::Trainer {
            message: format!("Failed to parse trainer response: {}", e),
        })
    }
}

#[async_trait]
impl ModelTrainer for HttpTrainer {
    async fn train(&self, snapshot_ref: &str) -> Result<String> {
        let response: TrainResponse = self
            .post("/train", &TrainRequest { snapshot: snapshot_ref })
            .await?;
        Ok(response.tag)
    }

    async fn validate(&self, tag: &str) -> Result<f64> {
        let response: ValidateResponse = self
            .post("/validate", &ValidateRequest { model: tag })
            .await?;
        Ok(response.score)
    }

    fn provider_name(&self) -> &str {
        "http"
    }
}

/// Static trainer for development and tests: every train call mints a fresh
/// candidate tag and validation always returns the configured score.
pub struct StaticTrainer {
    score: f64,
}

impl StaticTrainer {
    pub fn with_score(score: f64) -> Self {
        Self { score }
    }
}

#[async_trait]
impl ModelTrainer for StaticTrainer {
    async fn train(&self, _snapshot_ref: &str) -> Result<String> {
        Ok(format!("candidate-{}", Uuid::new_v4()))
    }

    async fn validate(&self, _tag: &str) -> Result<f64> {
        Ok(self.score)
    }

    fn provider_name(&self) -> &str {
        "static"
    }
}

/// Create a trainer based on configuration
pub fn create_trainer(
    provider: &str,
    api_base: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
) -> Arc<dyn ModelTrainer> {
    match provider {
        "http" => {
            let base = api_base.expect("Trainer API base URL required for http provider");
            Arc::new(HttpTrainer::new(base, api_key, timeout))
        }
        "static" => Arc::new(StaticTrainer::with_score(1.0)),
        _ => {
            tracing::warn!(provider = provider, "Unknown trainer provider, using static");
            Arc::new(StaticTrainer::with_score(1.0))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_trainer_mints_unique_tags() {
        let trainer = StaticTrainer::with_score(0.9);
        let a = trainer.train("snapshot-a").await.unwrap();
        let b = trainer.train("snapshot-a").await.unwrap();
        assert_ne!(a, b);
        assert!((trainer.validate(&a).await.unwrap() - 0.9).abs() < f64::EPSILON);
    }

    #[test]
    fn test_factory_falls_back_to_static() {
        let trainer = create_trainer("nonsense", None, None, Duration::from_secs(5));
        assert_eq!(trainer.provider_name(), "static");
    }
}
