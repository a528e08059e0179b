//! Shared builders for the integration suite: sample endpoints, seeded
//! backends, and wiremock server setup so each scenario file only has to
//! describe what makes it distinct.

use std::collections::HashMap;

use uptime_engine::actors::registry::NewEndpoint;
use uptime_engine::domain::{Endpoint, HttpMethod};
use uptime_engine::persistence::memory::InMemoryBackend;
use uptime_engine::persistence::schema::{EndpointRow, NotificationSettingsRow};

/// A `NewEndpoint` pointed at the given URL, with every other field at a
/// reasonable default. Tests override what they care about with `..`.
pub fn new_endpoint(id: &str, user_id: &str, url: &str) -> NewEndpoint {
    NewEndpoint {
        id: id.to_string(),
        workspace_id: "ws-1".to_string(),
        user_id: user_id.to_string(),
        name: format!("endpoint-{id}"),
        url: url.to_string(),
        method: HttpMethod::Get,
        headers: HashMap::new(),
        body: None,
        expected_status: 200,
        timeout_seconds: 5,
        frequency_minutes: 5,
        is_active: true,
    }
}

/// Converts a Registry-owned `Endpoint` into the row shape a persistence
/// backend would hold, the way `SchedulerManager::row_to_endpoint` does the
/// reverse at startup.
pub fn endpoint_row(endpoint: &Endpoint) -> EndpointRow {
    EndpointRow {
        id: endpoint.id.clone(),
        workspace_id: endpoint.workspace_id.clone(),
        user_id: endpoint.user_id.clone(),
        name: endpoint.name.clone(),
        url: endpoint.url.clone(),
        method: format!("{:?}", endpoint.method),
        headers_json: "{}".to_string(),
        body: endpoint.body.clone(),
        expected_status: endpoint.expected_status,
        timeout_seconds: endpoint.timeout_seconds,
        frequency_minutes: endpoint.frequency_minutes,
        is_active: endpoint.is_active,
        consecutive_failures: endpoint.consecutive_failures,
        next_check_time: endpoint.next_check_time,
    }
}

/// An in-memory backend pre-seeded with one endpoint row, mirroring what
/// `SchedulerManager::start` would have loaded from a real database.
pub fn seeded_backend(endpoint: &Endpoint) -> InMemoryBackend {
    let backend = InMemoryBackend::new();
    backend.seed_endpoints(vec![endpoint_row(endpoint)]);
    backend
}

/// Notification settings with email enabled at the given failure threshold.
pub fn notification_settings(user_id: &str, failure_threshold: u32) -> NotificationSettingsRow {
    NotificationSettingsRow {
        user_id: user_id.to_string(),
        email_enabled: true,
        email_address: format!("{user_id}@example.com"),
        failure_threshold,
    }
}
