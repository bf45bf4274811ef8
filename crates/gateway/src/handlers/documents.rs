//! Document control handlers

use axum::{extract::State, http::StatusCode, Json};
use serde::Serialize;

use crate::AppState;
use docsift_common::{errors::Result, policy::ActorContext};

#[derive(Serialize)]
pub struct ScanResponse {
    pub status: String,
}

/// Force an immediate scan of the incoming bucket (process_existing).
///
/// The worker pool consumes the request on its next maintenance tick and
/// wakes any idle workers.
pub async fn request_scan(
    State(state): State<AppState>,
    _actor: ActorContext,
) -> Result<(StatusCode, Json<ScanResponse>)> {
    state.store.request_scan()?;

    tracing::info!("Incoming scan requested");

    Ok((
        StatusCode::ACCEPTED,
        Json(ScanResponse {
            status: "scan_requested".to_string(),
        }),
    ))
}
