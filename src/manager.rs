//! Scheduler Manager: owns the engine's startup/shutdown lifecycle.
//!
//! Grounded on the teacher's `src/bin/hub.rs::run_monitoring` (spawn-then-
//! reverse-order-shutdown pattern), pulled out of the binary into a reusable
//! struct the way `original_source/app/services/scheduler_manager.py`'s
//! singleton `initialize`/`shutdown`/`get_status` shape suggests.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::info;

use crate::actors::health::{HealthMonitor, HealthSummary};
use crate::actors::notifier::NotifierHandle;
use crate::actors::prober::Prober;
use crate::actors::registry::Registry;
use crate::actors::scheduler::SchedulerHandle;
use crate::actors::worker::WorkerPool;
use crate::config::{ResolvedConfig, StorageConfig};
use crate::domain::QueueEntry;
use crate::email::{EmailProvider, NoopEmailProvider};
use crate::persistence::PersistenceBackend;

/// Snapshot returned by [`SchedulerManager::get_status`]. Safe to call at
/// any time, including before `start()` (everything reads zero/false).
#[derive(Debug, Clone)]
pub struct StatusSnapshot {
    pub running: bool,
    pub initialized: bool,
    pub registry_size: usize,
    pub queue_size: usize,
    pub worker_count: usize,
    pub health: HealthSummary,
}

pub struct SchedulerManager {
    config: ResolvedConfig,
    persistence: Arc<dyn PersistenceBackend>,
    registry: Arc<Registry>,
    health: Arc<HealthMonitor>,
    queue_size: Arc<AtomicUsize>,
    running: std::sync::atomic::AtomicBool,
    workers: tokio::sync::Mutex<Option<WorkerPool>>,
    scheduler_handle: tokio::sync::Mutex<Option<SchedulerHandle>>,
    notifier_handle: tokio::sync::Mutex<Option<NotifierHandle>>,
    retention_task: tokio::sync::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl SchedulerManager {
    /// Builds the Health Monitor and Registry but does not yet bulk-load
    /// endpoints or spawn any tasks — that happens in `start()`.
    pub fn new(config: ResolvedConfig, persistence: Arc<dyn PersistenceBackend>) -> anyhow::Result<Self> {
        let health = Arc::new(HealthMonitor::new(
            persistence.clone(),
            config.failure_threshold,
            config.success_threshold,
            config.health_check_interval_secs,
            config.queue_overwhelmed_size,
        )?);
        let registry = Arc::new(Registry::with_warning_size(config.registry_warning_size));

        Ok(Self {
            config,
            persistence,
            registry,
            health,
            queue_size: Arc::new(AtomicUsize::new(0)),
            running: std::sync::atomic::AtomicBool::new(false),
            workers: tokio::sync::Mutex::new(None),
            scheduler_handle: tokio::sync::Mutex::new(None),
            notifier_handle: tokio::sync::Mutex::new(None),
            retention_task: tokio::sync::Mutex::new(None),
        })
    }

    /// Bulk-loads the registry and spawns the Notification Coordinator
    /// unconditionally. The Worker Pool and Scheduling Loop only spawn when
    /// `scheduler_enabled` is set (mirroring
    /// `original_source/app/services/scheduler_manager.py::initialize`'s
    /// early return when the setting is off) — a deployment can run with
    /// scheduling disabled while still draining any buffered notifications.
    pub async fn start(&self, email_provider: Option<Arc<dyn EmailProvider>>) -> anyhow::Result<()> {
        info!("starting scheduler manager");

        let endpoints = self.persistence.load_active_endpoints().await?;
        let endpoint_count = endpoints.len();
        self.registry.load(endpoints.into_iter().map(row_to_endpoint).collect());
        info!(endpoint_count, "bulk-loaded active endpoints into registry");

        let email_provider = email_provider.unwrap_or_else(|| Arc::new(NoopEmailProvider));
        let notifier = NotifierHandle::spawn(self.persistence.clone(), email_provider, 60);
        *self.notifier_handle.lock().await = Some(notifier.clone());

        if !self.config.scheduler_enabled {
            info!("scheduler disabled in configuration");
            *self.retention_task.lock().await = self.spawn_retention_task();
            self.running.store(true, Ordering::SeqCst);
            return Ok(());
        }

        let prober = Arc::new(Prober::new(self.config.http_timeout_secs, self.config.worker_count)?);

        let (queue_tx, queue_rx) = tokio::sync::mpsc::unbounded_channel::<QueueEntry>();
        let workers = WorkerPool::spawn(
            self.config.worker_count,
            queue_rx,
            self.queue_size.clone(),
            self.registry.clone(),
            prober,
            self.persistence.clone(),
            notifier.sender(),
            self.config.retry_delay_secs,
        );

        let scheduler = SchedulerHandle::spawn(
            self.registry.clone(),
            self.health.clone(),
            queue_tx,
            self.queue_size.clone(),
            self.config.scheduler_interval_secs,
            self.config.queue_warning_size,
        );

        *self.workers.lock().await = Some(workers);
        *self.scheduler_handle.lock().await = Some(scheduler);
        *self.retention_task.lock().await = self.spawn_retention_task();
        self.running.store(true, Ordering::SeqCst);

        info!(
            worker_count = self.config.worker_count,
            "scheduler manager fully started"
        );
        Ok(())
    }

    /// Reverses the startup order: stop the Scheduling Loop first (no more
    /// enqueues), then the Worker Pool (drain in-flight work), then the
    /// Notification Coordinator, finally close persistence and the Health
    /// Monitor's own resources.
    pub async fn shutdown(&self) {
        info!("shutting down scheduler manager");
        self.running.store(false, Ordering::SeqCst);

        if let Some(scheduler) = self.scheduler_handle.lock().await.take() {
            scheduler.shutdown().await;
        }
        if let Some(workers) = self.workers.lock().await.take() {
            workers.shutdown().await;
        }
        if let Some(notifier) = self.notifier_handle.lock().await.take() {
            notifier.shutdown().await;
        }
        if let Some(retention_task) = self.retention_task.lock().await.take() {
            retention_task.abort();
        }
        if let Err(err) = self.persistence.close().await {
            tracing::warn!(error = %err, "error closing persistence backend during shutdown");
        }

        info!("scheduler manager shut down");
    }

    /// Spawns the periodic check-result retention cleanup, grounded on the
    /// teacher's `actors::storage::StorageActor::run_cleanup` ticker — runs
    /// once immediately, then on `cleanup_interval_hours`, deleting rows
    /// older than `retention_days`. A no-op when no SQLite retention policy
    /// is configured.
    fn spawn_retention_task(&self) -> Option<tokio::task::JoinHandle<()>> {
        let StorageConfig::Sqlite {
            retention_days,
            cleanup_interval_hours,
            ..
        } = self.config.storage.as_ref()?
        else {
            return None;
        };

        let persistence = self.persistence.clone();
        let retention_days = *retention_days;
        let interval_duration = std::time::Duration::from_secs(*cleanup_interval_hours as u64 * 3600);

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval_duration);
            loop {
                ticker.tick().await;
                let cutoff = chrono::Utc::now() - chrono::Duration::days(retention_days as i64);
                match persistence.cleanup_old_check_results(cutoff).await {
                    Ok(deleted) if deleted > 0 => {
                        info!(deleted, retention_days, "retention cleanup removed old check results")
                    }
                    Ok(_) => {}
                    Err(err) => {
                        tracing::warn!(error = %err, "retention cleanup failed, will retry next interval")
                    }
                }
            }
        }))
    }

    pub async fn get_status(&self) -> StatusSnapshot {
        let workers_guard = self.workers.lock().await;
        let worker_count = workers_guard.as_ref().map(WorkerPool::worker_count).unwrap_or(0);
        drop(workers_guard);

        StatusSnapshot {
            running: self.running.load(Ordering::SeqCst),
            initialized: true,
            registry_size: self.registry.len(),
            queue_size: self.queue_size.load(Ordering::Relaxed),
            worker_count,
            health: self.health.summary().await,
        }
    }

    pub fn registry(&self) -> Arc<Registry> {
        self.registry.clone()
    }

    pub fn health(&self) -> Arc<HealthMonitor> {
        self.health.clone()
    }

    pub async fn force_health_check(&self) -> HealthSummary {
        self.health.force_health_check().await
    }
}

fn row_to_endpoint(row: crate::persistence::schema::EndpointRow) -> crate::domain::Endpoint {
    let method = match row.method.as_str() {
        "Post" => crate::domain::HttpMethod::Post,
        "Head" => crate::domain::HttpMethod::Head,
        "Put" => crate::domain::HttpMethod::Put,
        "Delete" => crate::domain::HttpMethod::Delete,
        _ => crate::domain::HttpMethod::Get,
    };
    let headers: std::collections::HashMap<String, String> =
        serde_json::from_str(&row.headers_json).unwrap_or_default();

    crate::domain::Endpoint {
        id: row.id,
        workspace_id: row.workspace_id,
        user_id: row.user_id,
        name: row.name,
        url: row.url,
        method,
        headers,
        body: row.body,
        expected_status: row.expected_status,
        timeout_seconds: row.timeout_seconds,
        frequency_minutes: row.frequency_minutes,
        is_active: row.is_active,
        consecutive_failures: row.consecutive_failures,
        next_check_time: row.next_check_time,
    }
}
