//! Persistence backend trait definition.
//!
//! Every storage implementation (SQLite, in-memory) implements this trait.
//! Renamed from this codebase's `StorageBackend` — same async-trait-object
//! shape, but the operations are the ones this engine's components actually
//! need: check-result writes, the Registry's one-time bulk load, and the
//! Notification Coordinator's per-user state.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::error::PersistenceResult;
use super::schema::{
    CheckResultRow, EndpointRow, EndpointWorkspaceRow, NotificationHistoryRow,
    NotificationSettingsRow, NotificationStateRow,
};

#[derive(Debug, Clone)]
pub struct HealthStatus {
    pub healthy: bool,
    pub message: String,
}

/// Trait for persistent storage backends.
///
/// Implementations must be `Send + Sync`: they are shared behind an `Arc`
/// across the Registry's startup load, the Worker Pool, the Health Monitor,
/// and the Notification Coordinator.
#[async_trait]
pub trait PersistenceBackend: Send + Sync {
    /// Loaded once, at startup, by the Registry.
    async fn load_active_endpoints(&self) -> PersistenceResult<Vec<EndpointRow>>;

    /// Written by the Worker Pool after every probe attempt. A foreign-key
    /// violation (the endpoint has since been deleted) must surface as
    /// [`PersistenceError::ForeignKeyViolation`](super::error::PersistenceError::ForeignKeyViolation),
    /// not a generic failure.
    async fn insert_check_result(&self, row: CheckResultRow) -> PersistenceResult<()>;

    /// Used by the Worker Pool to persist the updated failure counter
    /// alongside the registry's in-memory copy.
    async fn update_consecutive_failures(
        &self,
        endpoint_id: &str,
        consecutive_failures: u32,
    ) -> PersistenceResult<()>;

    /// Resolves endpoint + workspace display names for a set of ids, used
    /// by the Notification Coordinator when composing a flush email.
    async fn get_endpoint_workspace_info(
        &self,
        endpoint_ids: &[String],
    ) -> PersistenceResult<Vec<EndpointWorkspaceRow>>;

    async fn get_notification_state(
        &self,
        user_id: &str,
    ) -> PersistenceResult<Option<NotificationStateRow>>;

    async fn put_notification_state(&self, row: NotificationStateRow) -> PersistenceResult<()>;

    /// Read by the Worker Pool before deciding whether a failure qualifies
    /// for the Notification Coordinator.
    async fn get_notification_settings(
        &self,
        user_id: &str,
    ) -> PersistenceResult<Option<NotificationSettingsRow>>;

    async fn insert_notification_history(
        &self,
        row: NotificationHistoryRow,
    ) -> PersistenceResult<()>;

    /// Deletes check results older than `before`. Returns the number deleted.
    async fn cleanup_old_check_results(&self, before: DateTime<Utc>) -> PersistenceResult<usize>;

    /// Lightweight operation to verify the backend is reachable, used by the
    /// Health Monitor's database reachability subcheck.
    async fn health_check(&self) -> PersistenceResult<()>;

    async fn get_stats(&self) -> PersistenceResult<String>;

    async fn close(&self) -> PersistenceResult<()>;
}
