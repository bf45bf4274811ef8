//! Staged-record handlers: listing and audit dispositions

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::AppState;
use docsift_common::{
    db::models::{AuditStatus, RecordKind, SubmissionRecord},
    db::{RecordFilter, RecordOrder},
    errors::{AppError, Result},
    metrics,
    policy::ActorContext,
};

/// Query parameters for listing records
#[derive(Debug, Default, Deserialize)]
pub struct ListRecordsQuery {
    pub status: Option<String>,
    pub kind: Option<String>,
    pub source_file: Option<String>,
    pub submission_id: Option<Uuid>,
    /// "asc" (default) or "desc" by creation time
    pub order: Option<String>,
    pub offset: Option<u64>,
    pub limit: Option<u64>,
}

/// Record representation returned to audit UIs
#[derive(Serialize)]
pub struct RecordResponse {
    pub id: Uuid,
    pub submission_id: Uuid,
    pub kind: String,
    pub title: String,
    pub body: String,
    pub source_file: Option<String>,
    pub source_page: Option<i32>,
    pub source_excerpt: Option<String>,
    pub audit_status: String,
    pub promoted: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl From<SubmissionRecord> for RecordResponse {
    fn from(record: SubmissionRecord) -> Self {
        RecordResponse {
            id: record.id,
            submission_id: record.submission_id,
            kind: record.kind.clone(),
            title: record.title.clone(),
            body: record.body.clone(),
            source_file: record.source_file.clone(),
            source_page: record.source_page,
            source_excerpt: record.source_excerpt.clone(),
            audit_status: record.audit_status.clone(),
            promoted: record.is_promoted(),
            created_at: record.created_at.to_rfc3339(),
            updated_at: record.updated_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct ListRecordsResponse {
    pub records: Vec<RecordResponse>,
    pub count: usize,
}

/// List staged records with filtering and stable ordering
pub async fn list_records(
    State(state): State<AppState>,
    _actor: ActorContext,
    Query(query): Query<ListRecordsQuery>,
) -> Result<Json<ListRecordsResponse>> {
    let status = query
        .status
        .as_deref()
        .map(|s| {
            AuditStatus::parse(s).ok_or_else(|| AppError::InvalidFormat {
                message: format!("Unknown audit status: {}", s),
            })
        })
        .transpose()?;

    let kind = query
        .kind
        .as_deref()
        .map(|k| {
            RecordKind::parse(k).ok_or_else(|| AppError::InvalidFormat {
                message: format!("Unknown record kind: {}", k),
            })
        })
        .transpose()?;

    let order = match query.order.as_deref() {
        None | Some("asc") => RecordOrder::CreatedAsc,
        Some("desc") => RecordOrder::CreatedDesc,
        Some(other) => {
            return Err(AppError::InvalidFormat {
                message: format!("Unknown order: {}", other),
            });
        }
    };

    let records = state
        .audit
        .list(RecordFilter {
            status,
            kind,
            source_file: query.source_file,
            submission_id: query.submission_id,
            order,
            offset: query.offset,
            limit: query.limit,
        })
        .await?;

    let records: Vec<RecordResponse> = records.into_iter().map(Into::into).collect();
    let count = records.len();

    Ok(Json(ListRecordsResponse { records, count }))
}

/// Request to change a record's audit status
#[derive(Debug, Deserialize)]
pub struct SetStatusRequest {
    /// "accepted" | "rejected" | "review"
    pub status: String,
}

/// Set a record's audit status on behalf of the calling reviewer
pub async fn set_record_status(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(record_id): Path<Uuid>,
    Json(request): Json<SetStatusRequest>,
) -> Result<Json<RecordResponse>> {
    let status = AuditStatus::parse(&request.status).ok_or_else(|| AppError::InvalidFormat {
        message: format!("Unknown audit status: {}", request.status),
    })?;

    let record = state
        .audit
        .set_audit_status(record_id, status, actor.role)
        .await?;

    metrics::record_audit_decision(status.as_str());

    Ok(Json(record.into()))
}

/// Re-open a terminal record back to pending (explicit reset)
pub async fn reset_record(
    State(state): State<AppState>,
    actor: ActorContext,
    Path(record_id): Path<Uuid>,
) -> Result<Json<RecordResponse>> {
    let record = state.audit.reset_status(record_id, actor.role).await?;
    Ok(Json(record.into()))
}
