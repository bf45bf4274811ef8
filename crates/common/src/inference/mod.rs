//! Inference client abstraction
//!
//! The extraction algorithm itself is an opaque external service; this
//! module provides a unified interface over it:
//! - HTTP inference endpoint (production)
//! - Deterministic keyword heuristic (development and tests)

use crate::db::models::RecordKind;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

/// A finding proposed by the inference call, before provenance stamping
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateFinding {
    pub kind: RecordKind,
    pub title: String,
    pub body: String,
}

/// Trait for candidate-record generation
#[async_trait]
pub trait CandidateExtractor: Send + Sync {
    /// Propose candidate findings for one text chunk.
    ///
    /// `model_tag` names the model version to run with; the caller resolves
    /// it once per document so a document is never split across versions.
    async fn propose(&self, model_tag: &str, text: &str) -> Result<Vec<CandidateFinding>>;

    /// Get the provider name
    fn provider_name(&self) -> &str;
}

/// HTTP inference client
pub struct HttpExtractor {
    client: reqwest::Client,
    api_key: Option<String>,
    base_url: String,
    timeout_ms: u64,
    max_retries: u32,
}

#[derive(Serialize)]
struct InferenceRequest<'a> {
    model: &'a str,
    text: &'a str,
}

#[derive(Deserialize)]
struct InferenceResponse {
    findings: Vec<CandidateFinding>,
}

impl HttpExtractor {
    pub fn new(
        base_url: String,
        api_key: Option<String>,
        timeout: Duration,
        max_retries: u32,
    ) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            api_key,
            base_url,
            timeout_ms: timeout.as_millis() as u64,
            max_retries,
        }
    }

    /// Make request with retry on transient failures
    async fn request_with_retry(
        &self,
        model_tag: &str,
        text: &str,
    ) -> Result<Vec<CandidateFinding>> {
        let mut last_error = None;

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                // Exponential backoff
                let delay = Duration::from_millis(100 * (2_u64.pow(attempt)));
                tokio::time::sleep(delay).await;
            }

            match self.make_request(model_tag, text).await {
                Ok(findings) => return Ok(findings),
                Err(e) if e.is_transient() => {
                    tracing::warn!(
                        attempt = attempt + 1,
                        max_retries = self.max_retries,
                        error = %e,
                        "Inference request failed, retrying"
                    );
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        Err(last_error.unwrap_or_else(|| AppError::Inference {
            message: "Unknown error after retries".to_string(),
        }))
    }

    async fn make_request(&self, model_tag: &str, text: &str) -> Result<Vec<CandidateFinding>> {
        let url = format!("{}/extract", self.base_url);

        let request = InferenceRequest {
            model: model_tag,
            text,
        };

        let mut builder = self.client.post(&url).json(&request);
        if let Some(ref key) = self.api_key {
            builder = builder.header("Authorization", format!("Bearer {}", key));
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                AppError::InferenceTimeout {
                    timeout_ms: self.timeout_ms,
                }
            } else {
                AppError::HttpClient(e)
            }
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if status.is_server_error() {
                return Err(AppError::ServiceUnavailable {
                    message: format!("Inference API error {}: {}", status, body),
                });
            }
            return Err(AppError::Inference {
                message: format!("Inference API error {}: {}", status, body),
            });
        }

        let result: InferenceResponse = response.json().await.map_err(|e| AppError::Inference {
            message: format!("Failed to parse inference response: {}", e),
        })?;

        Ok(result.findings)
    }
}

#[async_trait]
impl CandidateExtractor for HttpExtractor {
    async fn propose(&self, model_tag: &str, text: &str) -> Result<Vec<CandidateFinding>> {
        self.request_with_retry(model_tag, text).await
    }

    fn provider_name(&self) -> &str {
        "http"
    }
}

/// Deterministic keyword-cue extractor for development and tests.
///
/// Flags sentences with vulnerability cues as vulnerabilities and sentences
/// with recommendation cues as options for consideration.
pub struct KeywordExtractor;

const VULNERABILITY_CUES: &[&str] = &[
    "vulnerab",
    "unsecured",
    "unlocked",
    "exposed",
    "deficien",
    "no camera",
    "single point of failure",
];

const OPTION_CUES: &[&str] = &["recommend", "consider", "should install", "option to", "mitigat"];

impl KeywordExtractor {
    fn title_of(sentence: &str) -> String {
        let trimmed = sentence.trim();
        let mut title: String = trimmed.chars().take(80).collect();
        if trimmed.chars().count() > 80 {
            title.push_str("...");
        }
        title
    }
}

#[async_trait]
impl CandidateExtractor for KeywordExtractor {
    async fn propose(&self, _model_tag: &str, text: &str) -> Result<Vec<CandidateFinding>> {
        let mut findings = Vec::new();

        for sentence in text.split(['.', '\n']) {
            let sentence = sentence.trim();
            if sentence.is_empty() {
                continue;
            }
            let lower = sentence.to_lowercase();

            if VULNERABILITY_CUES.iter().any(|cue| lower.contains(cue)) {
                findings.push(CandidateFinding {
                    kind: RecordKind::Vulnerability,
                    title: Self::title_of(sentence),
                    body: sentence.to_string(),
                });
            } else if OPTION_CUES.iter().any(|cue| lower.contains(cue)) {
                findings.push(CandidateFinding {
                    kind: RecordKind::OptionForConsideration,
                    title: Self::title_of(sentence),
                    body: sentence.to_string(),
                });
            }
        }

        Ok(findings)
    }

    fn provider_name(&self) -> &str {
        "keyword"
    }
}

/// Create an extractor based on configuration
pub fn create_extractor(
    provider: &str,
    api_base: Option<String>,
    api_key: Option<String>,
    timeout: Duration,
    max_retries: u32,
) -> Arc<dyn CandidateExtractor> {
    match provider {
        "http" => {
            let base = api_base.expect("Inference API base URL required for http provider");
            Arc::new(HttpExtractor::new(base, api_key, timeout, max_retries))
        }
        "keyword" => Arc::new(KeywordExtractor),
        _ => {
            tracing::warn!(provider = provider, "Unknown extraction provider, using keyword heuristic");
            Arc::new(KeywordExtractor)
        }
    }
}
