//! Health check handlers

use crate::AppState;
use axum::{extract::State, Json};
use chrono::Utc;
use serde::Serialize;

/// A component older than this is considered stale regardless of its
/// last advertised state
const HEARTBEAT_STALE_SECS: i64 = 60;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
}

#[derive(Serialize)]
pub struct ReadyResponse {
    pub status: String,
    pub checks: HealthChecks,
}

#[derive(Serialize)]
pub struct HealthChecks {
    pub database: CheckResult,
    pub components: Vec<ComponentCheck>,
}

#[derive(Serialize)]
pub struct CheckResult {
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Serialize)]
pub struct ComponentCheck {
    pub component: String,
    pub accepting_work: bool,
    pub last_seen: String,
    pub stale: bool,
}

/// Liveness probe - always returns healthy if server is running
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Readiness probe - checks the database and the long-running components
pub async fn ready(State(state): State<AppState>) -> Json<ReadyResponse> {
    let start = std::time::Instant::now();

    let db_check = match state.repository.ping().await {
        Ok(_) => CheckResult {
            status: "up".to_string(),
            latency_ms: Some(start.elapsed().as_millis() as u64),
            error: None,
        },
        Err(e) => CheckResult {
            status: "down".to_string(),
            latency_ms: None,
            error: Some(e.to_string()),
        },
    };

    let components = match state.repository.list_component_status().await {
        Ok(rows) => rows
            .into_iter()
            .map(|row| {
                let age = Utc::now().signed_duration_since(row.last_seen);
                ComponentCheck {
                    component: row.component,
                    accepting_work: row.accepting_work,
                    last_seen: row.last_seen.to_rfc3339(),
                    stale: age.num_seconds() > HEARTBEAT_STALE_SECS,
                }
            })
            .collect(),
        Err(_) => Vec::new(),
    };

    let all_healthy = db_check.status == "up";

    Json(ReadyResponse {
        status: if all_healthy { "ready" } else { "not_ready" }.to_string(),
        checks: HealthChecks {
            database: db_check,
            components,
        },
    })
}
