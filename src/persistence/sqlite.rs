//! SQLite persistence backend.
//!
//! Directly modeled on this codebase's `storage::sqlite::SqliteBackend`:
//! WAL journal mode, bounded connection pool, `sqlx::migrate!` at startup,
//! upsert via `ON CONFLICT ... DO UPDATE`, millisecond-precision timestamp
//! columns.

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Row, Sqlite};
use tracing::{debug, info, instrument};

use super::backend::PersistenceBackend;
use super::error::{PersistenceError, PersistenceResult};
use super::schema::{
    CheckResultRow, EndpointRow, EndpointWorkspaceRow, NotificationHistoryRow,
    NotificationSettingsRow, NotificationStateRow,
};

pub struct SqliteBackend {
    pool: Pool<Sqlite>,
    db_path: String,
}

impl SqliteBackend {
    /// Creates the database file if missing, configures WAL mode, and runs
    /// migrations.
    #[instrument(skip_all)]
    pub async fn new(db_path: impl AsRef<Path>) -> PersistenceResult<Self> {
        let db_path_str = db_path.as_ref().to_string_lossy().to_string();

        info!("initializing SQLite backend at: {}", db_path_str);

        let options = SqliteConnectOptions::new()
            .filename(&db_path_str)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .busy_timeout(std::time::Duration::from_secs(30))
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| PersistenceError::ConnectionFailed(e.to_string()))?;

        info!("SQLite connection pool created");

        debug!("running database migrations");
        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| PersistenceError::MigrationFailed(e.to_string()))?;

        info!("database migrations complete");

        Ok(Self {
            pool,
            db_path: db_path_str,
        })
    }

    fn timestamp_to_millis(dt: &DateTime<Utc>) -> i64 {
        dt.timestamp_millis()
    }

    fn millis_to_timestamp(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap_or_else(Utc::now)
    }
}

#[async_trait]
impl PersistenceBackend for SqliteBackend {
    #[instrument(skip(self))]
    async fn load_active_endpoints(&self) -> PersistenceResult<Vec<EndpointRow>> {
        let rows = sqlx::query(
            r#"
            SELECT id, workspace_id, user_id, name, url, method, headers_json, body,
                   expected_status, timeout_seconds, frequency_minutes, is_active,
                   consecutive_failures, next_check_time
            FROM endpoints
            WHERE is_active = 1
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;

        let endpoints = rows
            .into_iter()
            .map(|row| EndpointRow {
                id: row.get("id"),
                workspace_id: row.get("workspace_id"),
                user_id: row.get("user_id"),
                name: row.get("name"),
                url: row.get("url"),
                method: row.get("method"),
                headers_json: row.get("headers_json"),
                body: row.get("body"),
                expected_status: row.get::<i64, _>("expected_status") as u16,
                timeout_seconds: row.get::<i64, _>("timeout_seconds") as u32,
                frequency_minutes: row.get::<i64, _>("frequency_minutes") as u32,
                is_active: row.get::<i64, _>("is_active") != 0,
                consecutive_failures: row.get::<i64, _>("consecutive_failures") as u32,
                next_check_time: Self::millis_to_timestamp(row.get("next_check_time")),
            })
            .collect();

        Ok(endpoints)
    }

    #[instrument(skip(self, row), fields(endpoint_id = %row.endpoint_id))]
    async fn insert_check_result(&self, row: CheckResultRow) -> PersistenceResult<()> {
        let checked_at = Self::timestamp_to_millis(&row.checked_at);

        sqlx::query(
            r#"
            INSERT INTO check_results (endpoint_id, checked_at, status_code, elapsed_ms, success, error_message)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.endpoint_id)
        .bind(checked_at)
        .bind(row.status_code.map(|s| s as i64))
        .bind(row.elapsed_ms as i64)
        .bind(row.success)
        .bind(&row.error_message)
        .execute(&self.pool)
        .await
        .map_err(PersistenceError::from)?;

        Ok(())
    }

    async fn update_consecutive_failures(
        &self,
        endpoint_id: &str,
        consecutive_failures: u32,
    ) -> PersistenceResult<()> {
        sqlx::query("UPDATE endpoints SET consecutive_failures = ? WHERE id = ?")
            .bind(consecutive_failures as i64)
            .bind(endpoint_id)
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    async fn get_endpoint_workspace_info(
        &self,
        endpoint_ids: &[String],
    ) -> PersistenceResult<Vec<EndpointWorkspaceRow>> {
        if endpoint_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = endpoint_ids.iter().map(|_| "?").collect::<Vec<_>>().join(",");
        let sql = format!(
            r#"
            SELECT e.id AS endpoint_id, e.name AS endpoint_name,
                   e.workspace_id AS workspace_id, w.name AS workspace_name
            FROM endpoints e
            JOIN workspaces w ON w.id = e.workspace_id
            WHERE e.id IN ({})
            "#,
            placeholders
        );

        let mut query = sqlx::query(&sql);
        for id in endpoint_ids {
            query = query.bind(id);
        }

        let rows = query
            .fetch_all(&self.pool)
            .await
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|row| EndpointWorkspaceRow {
                endpoint_id: row.get("endpoint_id"),
                endpoint_name: row.get("endpoint_name"),
                workspace_id: row.get("workspace_id"),
                workspace_name: row.get("workspace_name"),
            })
            .collect())
    }

    async fn get_notification_state(
        &self,
        user_id: &str,
    ) -> PersistenceResult<Option<NotificationStateRow>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, buffer_active, buffer_started_at, failing_endpoint_ids_json,
                   cooldown_level, cooldown_expires_at
            FROM notification_state
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;

        Ok(row.map(|row| NotificationStateRow {
            user_id: row.get("user_id"),
            buffer_active: row.get::<i64, _>("buffer_active") != 0,
            buffer_started_at: row
                .get::<Option<i64>, _>("buffer_started_at")
                .map(Self::millis_to_timestamp),
            failing_endpoint_ids_json: row.get("failing_endpoint_ids_json"),
            cooldown_level: row.get::<i64, _>("cooldown_level") as u8,
            cooldown_expires_at: row
                .get::<Option<i64>, _>("cooldown_expires_at")
                .map(Self::millis_to_timestamp),
        }))
    }

    async fn put_notification_state(&self, row: NotificationStateRow) -> PersistenceResult<()> {
        sqlx::query(
            r#"
            INSERT INTO notification_state
                (user_id, buffer_active, buffer_started_at, failing_endpoint_ids_json, cooldown_level, cooldown_expires_at)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id) DO UPDATE SET
                buffer_active = excluded.buffer_active,
                buffer_started_at = excluded.buffer_started_at,
                failing_endpoint_ids_json = excluded.failing_endpoint_ids_json,
                cooldown_level = excluded.cooldown_level,
                cooldown_expires_at = excluded.cooldown_expires_at
            "#,
        )
        .bind(&row.user_id)
        .bind(row.buffer_active)
        .bind(row.buffer_started_at.as_ref().map(Self::timestamp_to_millis))
        .bind(&row.failing_endpoint_ids_json)
        .bind(row.cooldown_level as i64)
        .bind(row.cooldown_expires_at.as_ref().map(Self::timestamp_to_millis))
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    async fn get_notification_settings(
        &self,
        user_id: &str,
    ) -> PersistenceResult<Option<NotificationSettingsRow>> {
        let row = sqlx::query(
            r#"
            SELECT user_id, email_enabled, email_address, failure_threshold
            FROM notification_settings
            WHERE user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;

        Ok(row.map(|row| NotificationSettingsRow {
            user_id: row.get("user_id"),
            email_enabled: row.get::<i64, _>("email_enabled") != 0,
            email_address: row.get("email_address"),
            failure_threshold: row.get::<i64, _>("failure_threshold") as u32,
        }))
    }

    async fn insert_notification_history(
        &self,
        row: NotificationHistoryRow,
    ) -> PersistenceResult<()> {
        let sent_at = Self::timestamp_to_millis(&row.sent_at);

        sqlx::query(
            r#"
            INSERT INTO notification_history
                (user_id, sent_at, endpoint_ids_json, cooldown_level, success, error_message)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&row.user_id)
        .bind(sent_at)
        .bind(&row.endpoint_ids_json)
        .bind(row.cooldown_level as i64)
        .bind(row.success)
        .bind(&row.error_message)
        .execute(&self.pool)
        .await
        .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;

        Ok(())
    }

    #[instrument(skip(self))]
    async fn cleanup_old_check_results(&self, before: DateTime<Utc>) -> PersistenceResult<usize> {
        let before_millis = Self::timestamp_to_millis(&before);

        let result = sqlx::query("DELETE FROM check_results WHERE checked_at < ?")
            .bind(before_millis)
            .execute(&self.pool)
            .await
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?;

        Ok(result.rows_affected() as usize)
    }

    async fn health_check(&self) -> PersistenceResult<()> {
        sqlx::query("SELECT 1")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PersistenceError::UnhealthyBackend(e.to_string()))?;
        Ok(())
    }

    async fn get_stats(&self) -> PersistenceResult<String> {
        let endpoint_count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM endpoints")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?
            .get("count");

        let check_count: i64 = sqlx::query("SELECT COUNT(*) AS count FROM check_results")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| PersistenceError::QueryFailed(e.to_string()))?
            .get("count");

        let file_size = std::fs::metadata(&self.db_path)
            .map(|m| m.len())
            .unwrap_or(0);

        Ok(format!(
            "SQLite ({}): {} endpoints, {} check results, {:.2} MB on disk",
            self.db_path,
            endpoint_count,
            check_count,
            file_size as f64 / 1_048_576.0
        ))
    }

    async fn close(&self) -> PersistenceResult<()> {
        self.pool.close().await;
        Ok(())
    }
}
