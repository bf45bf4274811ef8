//! Model registry handlers

use axum::{extract::State, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::AppState;
use docsift_common::{
    errors::{AppError, Result},
    policy::ActorContext,
};

#[derive(Serialize)]
pub struct ModelResponse {
    pub id: Uuid,
    pub tag: String,
    pub status: String,
    pub snapshot_ref: Option<String>,
    pub activated_at: Option<String>,
    pub created_at: String,
}

/// The currently active model version
pub async fn current_model(
    State(state): State<AppState>,
    _actor: ActorContext,
) -> Result<Json<ModelResponse>> {
    let model = state
        .repository
        .active_model()
        .await?
        .ok_or_else(|| AppError::ModelNotFound {
            tag: "active".to_string(),
        })?;

    Ok(Json(ModelResponse {
        id: model.id,
        tag: model.tag,
        status: model.status,
        snapshot_ref: model.snapshot_ref,
        activated_at: model.activated_at.map(|dt| dt.to_rfc3339()),
        created_at: model.created_at.to_rfc3339(),
    }))
}
