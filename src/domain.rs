//! Fixed-schema domain records shared across the engine.
//!
//! These are the records the Registry owns, the Prober produces, and the
//! Worker Pool and Notification Coordinator consume. Kept schema-fixed and
//! serde-derived so the persistence adapter can map rows to them directly,
//! mirroring the rest of this codebase's domain structs rather than passing
//! untyped maps between layers.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// HTTP method used for a probe request.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Head,
    Put,
    Delete,
}

impl HttpMethod {
    pub fn as_reqwest(&self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Head => reqwest::Method::HEAD,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

/// A monitored HTTP target and everything the Registry needs to schedule it.
///
/// Owned exclusively by the Registry; created by `on_create`, mutated by
/// `on_update` and by the worker (`consecutive_failures`, `next_check_time`),
/// destroyed by `on_delete`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: String,
    pub workspace_id: String,
    pub user_id: String,
    pub name: String,
    pub url: String,
    pub method: HttpMethod,
    pub headers: HashMap<String, String>,
    pub body: Option<String>,
    pub expected_status: u16,
    pub timeout_seconds: u32,
    /// Check frequency in minutes; 1..=60.
    pub frequency_minutes: u32,
    pub is_active: bool,
    pub consecutive_failures: u32,
    pub next_check_time: DateTime<Utc>,
}

impl Endpoint {
    pub fn frequency(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.frequency_minutes as i64)
    }
}

/// A patch applied by `Registry::on_update`; `None` fields are left unchanged.
#[derive(Debug, Clone, Default)]
pub struct EndpointPatch {
    pub name: Option<String>,
    pub url: Option<String>,
    pub method: Option<HttpMethod>,
    pub headers: Option<HashMap<String, String>>,
    pub body: Option<Option<String>>,
    pub expected_status: Option<u16>,
    pub timeout_seconds: Option<u32>,
    pub frequency_minutes: Option<u32>,
    pub is_active: Option<bool>,
}

/// The structured result of one HTTP probe attempt.
///
/// Built by the Prober, consumed by the Worker for persistence and for the
/// failure-counter update, then discarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeOutcome {
    pub success: bool,
    pub retryable: bool,
    pub status_code: u16,
    pub elapsed_ms: u64,
    pub error: Option<String>,
    pub attempt: u8,
}

/// One entry in the probe work queue: an endpoint id and the instant it was
/// scheduled for. At most one entry per endpoint may be in flight at a time
/// (enforced by the Registry advancing `next_check_time` at enqueue time).
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub endpoint_id: String,
    pub scheduled_at: DateTime<Utc>,
}
