//! Row types persisted by the engine. Mirrors the rest of this codebase's
//! `storage::schema` shape: plain serde-derived structs that map directly
//! onto SQL rows, one module per logical table.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One probe attempt, as written by the worker after each check.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckResultRow {
    pub endpoint_id: String,
    pub checked_at: DateTime<Utc>,
    pub status_code: Option<u16>,
    pub elapsed_ms: u64,
    pub success: bool,
    pub error_message: Option<String>,
}

/// Mirrors the Registry's durable view of an endpoint, used for the
/// Registry's startup bulk load and for resolving endpoint/workspace names
/// when the Notification Coordinator flushes a buffer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointRow {
    pub id: String,
    pub workspace_id: String,
    pub user_id: String,
    pub name: String,
    pub url: String,
    pub method: String,
    pub headers_json: String,
    pub body: Option<String>,
    pub expected_status: u16,
    pub timeout_seconds: u32,
    pub frequency_minutes: u32,
    pub is_active: bool,
    pub consecutive_failures: u32,
    pub next_check_time: DateTime<Utc>,
}

/// Display name of the workspace an endpoint belongs to, joined in at flush
/// time so email bodies read "workspace: endpoint" rather than raw ids.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointWorkspaceRow {
    pub endpoint_id: String,
    pub endpoint_name: String,
    pub workspace_id: String,
    pub workspace_name: String,
}

/// Persisted per-user notification state machine, one row per user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationStateRow {
    pub user_id: String,
    pub buffer_active: bool,
    pub buffer_started_at: Option<DateTime<Utc>>,
    /// JSON-encoded set of endpoint ids currently buffered.
    pub failing_endpoint_ids_json: String,
    pub cooldown_level: u8,
    pub cooldown_expires_at: Option<DateTime<Utc>>,
}

/// A user's outage-email preferences, read by the Worker Pool before
/// handing a failure to the Notification Coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationSettingsRow {
    pub user_id: String,
    pub email_enabled: bool,
    pub email_address: String,
    /// Consecutive failures required before a failure event qualifies; 5..=20.
    pub failure_threshold: u32,
}

/// Append-only record of a sent (or attempted) outage email, kept for
/// audit/debugging — not read back by the Coordinator's own logic.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationHistoryRow {
    pub id: i64,
    pub user_id: String,
    pub sent_at: DateTime<Utc>,
    pub endpoint_ids_json: String,
    pub cooldown_level: u8,
    pub success: bool,
    pub error_message: Option<String>,
}
