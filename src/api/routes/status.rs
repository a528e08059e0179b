//! Scheduler Manager status endpoint.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};

use crate::api::state::ApiState;

/// `GET /api/v1/status` — running/initialized flags, registry size, queue
/// size, worker count, health summary.
pub async fn get_status(State(state): State<ApiState>) -> Json<Value> {
    let status = state.manager.get_status().await;
    Json(json!({
        "running": status.running,
        "initialized": status.initialized,
        "registry_size": status.registry_size,
        "queue_size": status.queue_size,
        "worker_count": status.worker_count,
        "health": {
            "state": format!("{:?}", status.health.state),
            "consecutive_failures": status.health.consecutive_failures,
            "consecutive_successes": status.health.consecutive_successes,
            "last_check": status.health.last_check.map(|t| t.to_rfc3339()),
            "last_failure_reason": status.health.last_failure_reason,
        },
    }))
}
