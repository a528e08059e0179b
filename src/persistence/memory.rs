//! In-memory persistence backend (no durability across restarts).
//!
//! The teacher's equivalent (`storage::memory::MemoryBackend`) took `&self`
//! in `insert_batch`/`cleanup_old_metrics` and left them as documented
//! placeholders ("MemoryBackend needs interior mutability... this is a
//! placeholder") — writes were silently discarded. This backend fixes that
//! with a real `std::sync::RwLock` around each table so it actually behaves
//! like a persistence backend for the lifetime of the process, which
//! matters here since it is the default fallback when no SQLite config is
//! given.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use super::backend::PersistenceBackend;
use super::error::PersistenceResult;
use super::schema::{
    CheckResultRow, EndpointRow, EndpointWorkspaceRow, NotificationHistoryRow,
    NotificationSettingsRow, NotificationStateRow,
};

#[derive(Default)]
struct Tables {
    endpoints: HashMap<String, EndpointRow>,
    check_results: Vec<CheckResultRow>,
    notification_states: HashMap<String, NotificationStateRow>,
    notification_settings: HashMap<String, NotificationSettingsRow>,
    notification_history: Vec<NotificationHistoryRow>,
    next_history_id: i64,
}

pub struct InMemoryBackend {
    tables: RwLock<Tables>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(Tables::default()),
        }
    }

    /// Seed endpoints directly, bypassing the check-result/notification
    /// tables. Used by tests that want a backend pre-populated for the
    /// Registry's startup load.
    pub fn seed_endpoints(&self, rows: Vec<EndpointRow>) {
        let mut tables = self.tables.write().expect("memory backend lock poisoned");
        for row in rows {
            tables.endpoints.insert(row.id.clone(), row);
        }
    }

    /// Seed per-user notification preferences. Used by tests and by
    /// deployments that manage settings out of band.
    pub fn seed_notification_settings(&self, rows: Vec<NotificationSettingsRow>) {
        let mut tables = self.tables.write().expect("memory backend lock poisoned");
        for row in rows {
            tables.notification_settings.insert(row.user_id.clone(), row);
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PersistenceBackend for InMemoryBackend {
    async fn load_active_endpoints(&self) -> PersistenceResult<Vec<EndpointRow>> {
        let tables = self.tables.read().expect("memory backend lock poisoned");
        Ok(tables
            .endpoints
            .values()
            .filter(|row| row.is_active)
            .cloned()
            .collect())
    }

    async fn insert_check_result(&self, row: CheckResultRow) -> PersistenceResult<()> {
        let mut tables = self.tables.write().expect("memory backend lock poisoned");
        if !tables.endpoints.contains_key(&row.endpoint_id) {
            return Err(super::error::PersistenceError::ForeignKeyViolation(
                row.endpoint_id,
            ));
        }
        tables.check_results.push(row);
        Ok(())
    }

    async fn update_consecutive_failures(
        &self,
        endpoint_id: &str,
        consecutive_failures: u32,
    ) -> PersistenceResult<()> {
        let mut tables = self.tables.write().expect("memory backend lock poisoned");
        if let Some(endpoint) = tables.endpoints.get_mut(endpoint_id) {
            endpoint.consecutive_failures = consecutive_failures;
        }
        Ok(())
    }

    async fn get_endpoint_workspace_info(
        &self,
        endpoint_ids: &[String],
    ) -> PersistenceResult<Vec<EndpointWorkspaceRow>> {
        let tables = self.tables.read().expect("memory backend lock poisoned");
        Ok(endpoint_ids
            .iter()
            .filter_map(|id| tables.endpoints.get(id))
            .map(|endpoint| EndpointWorkspaceRow {
                endpoint_id: endpoint.id.clone(),
                endpoint_name: endpoint.name.clone(),
                workspace_id: endpoint.workspace_id.clone(),
                workspace_name: endpoint.workspace_id.clone(),
            })
            .collect())
    }

    async fn get_notification_state(
        &self,
        user_id: &str,
    ) -> PersistenceResult<Option<NotificationStateRow>> {
        let tables = self.tables.read().expect("memory backend lock poisoned");
        Ok(tables.notification_states.get(user_id).cloned())
    }

    async fn put_notification_state(&self, row: NotificationStateRow) -> PersistenceResult<()> {
        let mut tables = self.tables.write().expect("memory backend lock poisoned");
        tables.notification_states.insert(row.user_id.clone(), row);
        Ok(())
    }

    async fn get_notification_settings(
        &self,
        user_id: &str,
    ) -> PersistenceResult<Option<NotificationSettingsRow>> {
        let tables = self.tables.read().expect("memory backend lock poisoned");
        Ok(tables.notification_settings.get(user_id).cloned())
    }

    async fn insert_notification_history(
        &self,
        mut row: NotificationHistoryRow,
    ) -> PersistenceResult<()> {
        let mut tables = self.tables.write().expect("memory backend lock poisoned");
        tables.next_history_id += 1;
        row.id = tables.next_history_id;
        tables.notification_history.push(row);
        Ok(())
    }

    async fn cleanup_old_check_results(&self, before: DateTime<Utc>) -> PersistenceResult<usize> {
        let mut tables = self.tables.write().expect("memory backend lock poisoned");
        let before_len = tables.check_results.len();
        tables.check_results.retain(|row| row.checked_at >= before);
        Ok(before_len - tables.check_results.len())
    }

    async fn health_check(&self) -> PersistenceResult<()> {
        debug!("in-memory backend health check: always healthy");
        Ok(())
    }

    async fn get_stats(&self) -> PersistenceResult<String> {
        let tables = self.tables.read().expect("memory backend lock poisoned");
        Ok(format!(
            "In-Memory: {} endpoints, {} check results",
            tables.endpoints.len(),
            tables.check_results.len()
        ))
    }

    async fn close(&self) -> PersistenceResult<()> {
        debug!("closing in-memory backend (no-op)");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::HttpMethod;

    fn endpoint_row(id: &str) -> EndpointRow {
        EndpointRow {
            id: id.to_string(),
            workspace_id: "ws-1".to_string(),
            user_id: "user-1".to_string(),
            name: "example".to_string(),
            url: "https://example.com".to_string(),
            method: format!("{:?}", HttpMethod::Get),
            headers_json: "{}".to_string(),
            body: None,
            expected_status: 200,
            timeout_seconds: 10,
            frequency_minutes: 5,
            is_active: true,
            consecutive_failures: 0,
            next_check_time: Utc::now(),
        }
    }

    #[tokio::test]
    async fn insert_and_load_round_trips() {
        let backend = InMemoryBackend::new();
        backend.seed_endpoints(vec![endpoint_row("a")]);

        let loaded = backend.load_active_endpoints().await.unwrap();
        assert_eq!(loaded.len(), 1);

        backend
            .insert_check_result(CheckResultRow {
                endpoint_id: "a".to_string(),
                checked_at: Utc::now(),
                status_code: Some(200),
                elapsed_ms: 42,
                success: true,
                error_message: None,
            })
            .await
            .unwrap();

        let stats = backend.get_stats().await.unwrap();
        assert!(stats.contains("1 check results"));
    }

    #[tokio::test]
    async fn insert_check_result_for_deleted_endpoint_is_foreign_key_violation() {
        let backend = InMemoryBackend::new();
        let result = backend
            .insert_check_result(CheckResultRow {
                endpoint_id: "missing".to_string(),
                checked_at: Utc::now(),
                status_code: None,
                elapsed_ms: 0,
                success: false,
                error_message: Some("timeout".to_string()),
            })
            .await;

        assert!(matches!(
            result,
            Err(super::super::error::PersistenceError::ForeignKeyViolation(_))
        ));
    }

    #[tokio::test]
    async fn cleanup_removes_old_rows() {
        let backend = InMemoryBackend::new();
        backend.seed_endpoints(vec![endpoint_row("a")]);

        backend
            .insert_check_result(CheckResultRow {
                endpoint_id: "a".to_string(),
                checked_at: Utc::now() - chrono::Duration::days(40),
                status_code: Some(200),
                elapsed_ms: 1,
                success: true,
                error_message: None,
            })
            .await
            .unwrap();

        let deleted = backend
            .cleanup_old_check_results(Utc::now() - chrono::Duration::days(30))
            .await
            .unwrap();
        assert_eq!(deleted, 1);
    }
}
