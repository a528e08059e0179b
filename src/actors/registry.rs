//! Endpoint Registry: the engine's source of truth for monitored endpoints.
//!
//! Deliberately *not* an actor. The specification requires `on_create`,
//! `on_update` and `on_delete` to be callable synchronously from REST
//! handlers without forcing those handlers onto the async runtime's message
//! queue, so this is a plain `std::sync::RwLock`-guarded map, in the shape
//! of this codebase's `api::state::PollingStatusStore` but synchronous
//! rather than `tokio::sync::RwLock`-guarded, since nothing here needs to
//! hold the lock across an `.await`.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use tracing::warn;

use crate::domain::{Endpoint, EndpointPatch, HttpMethod};

/// Thread-safe endpoint store. Cheap to clone (wraps an `Arc` internally via
/// its own `Arc<RwLock<_>>` field), so a single instance is shared between
/// the REST layer and the Scheduling Loop.
#[derive(Debug)]
pub struct Registry {
    endpoints: RwLock<HashMap<String, Endpoint>>,
    /// Soft cap (spec §4.1/§6 `registry_warning_size` / `cache_warning_size`):
    /// `on_create` logs a warning once the registry grows past this, but
    /// never refuses the insert.
    warning_size: usize,
}

impl Default for Registry {
    fn default() -> Self {
        Self::with_warning_size(5000)
    }
}

/// Parameters needed to create a new endpoint; everything the registry
/// cannot derive itself (`id`, counters, `next_check_time`).
#[derive(Debug, Clone)]
pub struct NewEndpoint {
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
    pub frequency_minutes: u32,
    pub is_active: bool,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_warning_size(warning_size: usize) -> Self {
        Self {
            endpoints: RwLock::new(HashMap::new()),
            warning_size,
        }
    }

    /// Bulk-load endpoints at startup (from persistence), bypassing the
    /// `on_create` validation path since these rows are already valid.
    ///
    /// Reseeds `next_check_time = now + frequency` for every loaded entry
    /// rather than trusting whatever was last persisted, so a restart never
    /// stampedes every endpoint onto the queue at once.
    pub fn load(&self, endpoints: Vec<Endpoint>) {
        let now = Utc::now();
        let mut guard = self.endpoints.write().expect("registry lock poisoned");
        for mut endpoint in endpoints {
            endpoint.next_check_time = now + endpoint.frequency();
            guard.insert(endpoint.id.clone(), endpoint);
        }
    }

    /// Register a new endpoint, scheduling its first check 10 seconds out
    /// so a freshly created endpoint is exercised promptly without
    /// stampeding straight into the next scheduling tick.
    pub fn on_create(&self, new: NewEndpoint) -> Endpoint {
        let endpoint = Endpoint {
            id: new.id,
            workspace_id: new.workspace_id,
            user_id: new.user_id,
            name: new.name,
            url: new.url,
            method: new.method,
            headers: new.headers,
            body: new.body,
            expected_status: new.expected_status,
            timeout_seconds: new.timeout_seconds,
            frequency_minutes: new.frequency_minutes,
            is_active: new.is_active,
            consecutive_failures: 0,
            next_check_time: Utc::now() + chrono::Duration::seconds(10),
        };

        let mut guard = self.endpoints.write().expect("registry lock poisoned");
        guard.insert(endpoint.id.clone(), endpoint.clone());
        let size = guard.len();
        drop(guard);

        if size > self.warning_size {
            warn!(
                registry_size = size,
                warning_size = self.warning_size,
                "endpoint registry exceeds its configured soft cap"
            );
        }

        endpoint
    }

    /// Apply a partial update. Changing `frequency_minutes` recomputes
    /// `next_check_time = now + new_frequency`; every other field change
    /// leaves the schedule untouched, so repeated no-op updates are
    /// idempotent on `next_check_time`.
    pub fn on_update(&self, id: &str, patch: EndpointPatch) -> Option<Endpoint> {
        let mut guard = self.endpoints.write().expect("registry lock poisoned");
        let endpoint = guard.get_mut(id)?;

        if let Some(name) = patch.name {
            endpoint.name = name;
        }
        if let Some(url) = patch.url {
            endpoint.url = url;
        }
        if let Some(method) = patch.method {
            endpoint.method = method;
        }
        if let Some(headers) = patch.headers {
            endpoint.headers = headers;
        }
        if let Some(body) = patch.body {
            endpoint.body = body;
        }
        if let Some(expected_status) = patch.expected_status {
            endpoint.expected_status = expected_status;
        }
        if let Some(timeout_seconds) = patch.timeout_seconds {
            endpoint.timeout_seconds = timeout_seconds;
        }
        if let Some(frequency_minutes) = patch.frequency_minutes {
            if frequency_minutes != endpoint.frequency_minutes {
                endpoint.frequency_minutes = frequency_minutes;
                endpoint.next_check_time = Utc::now() + endpoint.frequency();
            }
        }
        if let Some(is_active) = patch.is_active {
            endpoint.is_active = is_active;
        }

        Some(endpoint.clone())
    }

    pub fn on_delete(&self, id: &str) -> Option<Endpoint> {
        let mut guard = self.endpoints.write().expect("registry lock poisoned");
        guard.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<Endpoint> {
        let guard = self.endpoints.read().expect("registry lock poisoned");
        guard.get(id).cloned()
    }

    pub fn len(&self) -> usize {
        let guard = self.endpoints.read().expect("registry lock poisoned");
        guard.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Endpoints whose `next_check_time` has arrived and that are active.
    /// Advances `next_check_time` for each returned endpoint by its
    /// configured frequency so the same endpoint is never enqueued twice
    /// before its check completes.
    pub fn snapshot_due(&self) -> Vec<Endpoint> {
        let now = Utc::now();
        let mut guard = self.endpoints.write().expect("registry lock poisoned");
        let mut due = Vec::new();

        for endpoint in guard.values_mut() {
            if endpoint.is_active && endpoint.next_check_time <= now {
                due.push(endpoint.clone());
                endpoint.next_check_time = now + endpoint.frequency();
            }
        }

        due
    }

    /// Called by the worker after a probe completes: updates the failure
    /// counter and returns the new count so the caller can decide whether to
    /// notify.
    pub fn record_outcome(&self, id: &str, success: bool) -> Option<u32> {
        let mut guard = self.endpoints.write().expect("registry lock poisoned");
        let endpoint = guard.get_mut(id)?;

        if success {
            endpoint.consecutive_failures = 0;
        } else {
            endpoint.consecutive_failures += 1;
        }

        Some(endpoint.consecutive_failures)
    }
}
