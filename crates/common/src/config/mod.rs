//! Configuration management for DocSift services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    pub server: ServerConfig,

    /// Database configuration
    pub database: DatabaseConfig,

    /// Source store configuration (document lifecycle buckets)
    pub store: StoreConfig,

    /// Extraction pipeline configuration
    pub extraction: ExtractionConfig,

    /// Model lifecycle configuration
    pub model: ModelConfig,

    /// Authentication / role configuration
    pub auth: AuthConfig,

    /// Observability configuration
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Primary database URL (for writes)
    pub url: String,

    /// Read replica URL (optional, falls back to primary)
    pub read_url: Option<String>,

    /// Maximum number of connections
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Minimum number of connections
    #[serde(default = "default_min_connections")]
    pub min_connections: u32,

    /// Connection timeout in seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Idle timeout in seconds
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Root directory holding the lifecycle buckets
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Lease TTL in seconds; a claim older than this is reclaimable
    #[serde(default = "default_lease_ttl")]
    pub lease_ttl_secs: u64,

    /// Attempts before a document is dead-lettered
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Incoming-bucket poll interval in seconds
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Number of concurrent extraction workers
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExtractionConfig {
    /// Inference provider: http, keyword
    #[serde(default = "default_extraction_provider")]
    pub provider: String,

    /// API key for the inference service
    pub api_key: Option<String>,

    /// Inference API base URL
    pub api_base: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_inference_timeout")]
    pub timeout_secs: u64,

    /// Maximum retries for transient inference failures
    #[serde(default = "default_inference_retries")]
    pub max_retries: u32,

    /// Maximum characters per text chunk sent to inference
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Maximum characters kept as a provenance excerpt
    #[serde(default = "default_excerpt_len")]
    pub excerpt_len: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ModelConfig {
    /// Trainer provider: http, static
    #[serde(default = "default_trainer_provider")]
    pub provider: String,

    /// Trainer API base URL
    pub api_base: Option<String>,

    /// API key for the trainer service
    pub api_key: Option<String>,

    /// Trainer request timeout in seconds (training runs offline; only the
    /// trigger/validate calls block on this)
    #[serde(default = "default_trainer_timeout")]
    pub timeout_secs: u64,

    /// Accepted+rejected decisions needed before a retrain is considered
    #[serde(default = "default_feedback_threshold")]
    pub feedback_threshold: u64,

    /// Minimum seconds between retrains of the active version
    #[serde(default = "default_min_retrain_interval")]
    pub min_retrain_interval_secs: u64,

    /// Held-out validation score a candidate must reach to be activated
    #[serde(default = "default_validation_min_score")]
    pub validation_min_score: f64,

    /// Registry poll interval in seconds
    #[serde(default = "default_model_poll_interval")]
    pub poll_interval_secs: u64,

    /// Tag of the version seeded when the registry is empty
    #[serde(default = "default_baseline_tag")]
    pub baseline_tag: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// Header carrying the authenticated actor id
    #[serde(default = "default_actor_header")]
    pub actor_header: String,

    /// Request ID header name
    #[serde(default = "default_request_id_header")]
    pub request_id_header: String,

    /// Actor id -> role ("admin" | "spsa" | "psa"); unmapped actors get psa
    #[serde(default)]
    pub roles: HashMap<String, String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (per actor)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8080 }
fn default_request_timeout() -> u64 { 30 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_connections() -> u32 { 50 }
fn default_min_connections() -> u32 { 5 }
fn default_connect_timeout() -> u64 { 10 }
fn default_idle_timeout() -> u64 { 300 }
fn default_data_dir() -> PathBuf { PathBuf::from("data") }
fn default_lease_ttl() -> u64 { 45 }
fn default_max_attempts() -> u32 { 3 }
fn default_poll_interval() -> u64 { 10 }
fn default_worker_count() -> usize { 4 }
fn default_extraction_provider() -> String { "http".to_string() }
fn default_inference_timeout() -> u64 { 30 }
fn default_inference_retries() -> u32 { 3 }
fn default_chunk_size() -> usize { 4000 }
fn default_excerpt_len() -> usize { 300 }
fn default_trainer_provider() -> String { "http".to_string() }
fn default_trainer_timeout() -> u64 { 300 }
fn default_feedback_threshold() -> u64 { 50 }
fn default_min_retrain_interval() -> u64 { 21_600 }
fn default_validation_min_score() -> f64 { 0.7 }
fn default_model_poll_interval() -> u64 { 60 }
fn default_baseline_tag() -> String { "baseline-v1".to_string() }
fn default_actor_header() -> String { "X-Actor-ID".to_string() }
fn default_request_id_header() -> String { "X-Request-ID".to_string() }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "docsift".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", "0.0.0.0")?
            .set_default("server.port", 8080)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__STORE__LEASE_TTL_SECS=60
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get lease TTL as Duration
    pub fn lease_ttl(&self) -> Duration {
        Duration::from_secs(self.store.lease_ttl_secs)
    }

    /// Get the read database URL (falls back to primary)
    pub fn read_database_url(&self) -> &str {
        self.database.read_url.as_deref().unwrap_or(&self.database.url)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: default_host(),
                port: default_port(),
                request_timeout_secs: default_request_timeout(),
                shutdown_timeout_secs: default_shutdown_timeout(),
            },
            database: DatabaseConfig {
                url: "postgres://localhost/docsift".to_string(),
                read_url: None,
                max_connections: default_max_connections(),
                min_connections: default_min_connections(),
                connect_timeout_secs: default_connect_timeout(),
                idle_timeout_secs: default_idle_timeout(),
            },
            store: StoreConfig {
                data_dir: default_data_dir(),
                lease_ttl_secs: default_lease_ttl(),
                max_attempts: default_max_attempts(),
                poll_interval_secs: default_poll_interval(),
                worker_count: default_worker_count(),
            },
            extraction: ExtractionConfig {
                provider: default_extraction_provider(),
                api_key: None,
                api_base: None,
                timeout_secs: default_inference_timeout(),
                max_retries: default_inference_retries(),
                chunk_size: default_chunk_size(),
                excerpt_len: default_excerpt_len(),
            },
            model: ModelConfig {
                provider: default_trainer_provider(),
                api_base: None,
                api_key: None,
                timeout_secs: default_trainer_timeout(),
                feedback_threshold: default_feedback_threshold(),
                min_retrain_interval_secs: default_min_retrain_interval(),
                validation_min_score: default_validation_min_score(),
                poll_interval_secs: default_model_poll_interval(),
                baseline_tag: default_baseline_tag(),
            },
            auth: AuthConfig {
                actor_header: default_actor_header(),
                request_id_header: default_request_id_header(),
                roles: HashMap::new(),
            },
            observability: ObservabilityConfig {
                log_level: default_log_level(),
                json_logging: default_json_logging(),
                metrics_port: default_metrics_port(),
                service_name: default_service_name(),
            },
            rate_limit: RateLimitConfig {
                requests_per_second: default_rate_limit(),
                burst: default_burst(),
                enabled: default_enabled(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.store.max_attempts, 3);
        assert_eq!(config.extraction.excerpt_len, 300);
        assert_eq!(config.model.baseline_tag, "baseline-v1");
    }

    #[test]
    fn test_read_database_fallback() {
        let config = AppConfig::default();
        assert_eq!(config.read_database_url(), "postgres://localhost/docsift");
    }

    #[test]
    fn test_unmapped_actor_has_no_role_entry() {
        let config = AppConfig::default();
        assert!(config.auth.roles.get("unknown-actor").is_none());
    }
}
