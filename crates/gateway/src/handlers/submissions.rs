//! Submission handlers: promotion and cleanup

use axum::{
    extract::{Path, State},
    Json,
};
use serde::Deserialize;
use uuid::Uuid;
use validator::Validate;

use crate::AppState;
use docsift_common::{
    audit::CleanupReport,
    errors::{AppError, Result},
    metrics,
    policy::ActorContext,
    promotion::PromotionReport,
};

/// Promote a submission's accepted records into production
pub async fn promote_submission(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(submission_id): Path<Uuid>,
) -> Result<Json<PromotionReport>> {
    let report = state.promotion.promote(submission_id, actor.role).await?;

    metrics::record_promotion(report.created.len(), report.updated.len());

    Ok(Json(report))
}

/// Request for the cleanup_rejected_submissions control command
#[derive(Debug, Deserialize, Validate)]
pub struct CleanupRequest {
    /// Only submissions older than this many days are eligible
    #[validate(range(min = 0, max = 3650))]
    pub older_than_days: i64,

    /// Report eligible submissions without deleting anything
    #[serde(default)]
    pub dry_run: bool,
}

/// Delete aged fully-rejected submissions
pub async fn cleanup_rejected(
    State(state): State<AppState>,
    actor: ActorContext,
    Json(request): Json<CleanupRequest>,
) -> Result<Json<CleanupReport>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: None,
    })?;

    let report = state
        .audit
        .cleanup_rejected_submissions(request.older_than_days, request.dry_run, actor.role)
        .await?;

    Ok(Json(report))
}
