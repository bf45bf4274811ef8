//! Extraction worker error types
//!
//! Failures are classified transient or permanent: transient errors return
//! the document to the lifecycle manager for another attempt, permanent
//! errors route it to the dead-letter bucket.

use docsift_common::errors::AppError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Parse error for {name}: {message}")]
    ParseError { name: String, message: String },

    #[error("No extractable text in {name}")]
    EmptyDocument { name: String },

    #[error("Unsupported document format: {name}")]
    UnsupportedFormat { name: String },

    #[error("Inference error: {0}")]
    InferenceError(String),

    #[error("Artifact store error: {0}")]
    ArtifactError(String),

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Lifecycle conflict: {0}")]
    LifecycleConflict(String),

    #[error("Lease is stale for {0}, result discarded")]
    StaleLease(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ExtractionError {
    /// Permanent failures go to the dead-letter path and are never retried
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ExtractionError::ParseError { .. }
                | ExtractionError::EmptyDocument { .. }
                | ExtractionError::UnsupportedFormat { .. }
        )
    }
}

impl From<AppError> for ExtractionError {
    fn from(e: AppError) -> Self {
        match e {
            AppError::StaleLease { document } => ExtractionError::StaleLease(document),
            AppError::Conflict { message } => ExtractionError::LifecycleConflict(message),
            AppError::PermanentContent { name, message } => {
                ExtractionError::ParseError { name, message }
            }
            AppError::Inference { .. }
            | AppError::InferenceTimeout { .. }
            | AppError::HttpClient(_)
            | AppError::ServiceUnavailable { .. } => ExtractionError::InferenceError(e.to_string()),
            AppError::Database(_) | AppError::DatabaseConnection { .. } => {
                ExtractionError::DatabaseError(e.to_string())
            }
            other => ExtractionError::ArtifactError(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classification() {
        assert!(ExtractionError::EmptyDocument { name: "a.pdf".into() }.is_permanent());
        assert!(!ExtractionError::InferenceError("timeout".into()).is_permanent());
        assert!(!ExtractionError::DatabaseError("pool exhausted".into()).is_permanent());
    }

    #[test]
    fn test_stale_lease_maps_through() {
        let err: ExtractionError = AppError::StaleLease {
            document: "survey.pdf".into(),
        }
        .into();
        assert!(matches!(err, ExtractionError::StaleLease(_)));
    }
}
