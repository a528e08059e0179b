//! Health check endpoints.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::api::state::ApiState;

/// `GET /api/v1/health` — liveness probe; does not touch the Health Monitor's
/// rate-limited cache.
pub async fn health_check() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    }))
}

/// `POST /api/v1/health-check` — forces an immediate database + internet
/// reachability check, bypassing the rate limit.
pub async fn force_health_check(State(state): State<ApiState>) -> Json<Value> {
    let summary = state.manager.force_health_check().await;
    Json(json!({
        "state": format!("{:?}", summary.state),
        "consecutive_failures": summary.consecutive_failures,
        "consecutive_successes": summary.consecutive_successes,
        "last_check": summary.last_check.map(|t| t.to_rfc3339()),
        "last_failure_reason": summary.last_failure_reason,
    }))
}
