//! Worker Pool: drains the probe queue, executes probes with one retry,
//! persists outcomes, and bridges failures into the Notification
//! Coordinator.
//!
//! The teacher has no worker-pool analog — its actors are one-per-target.
//! The drain-with-timeout loop is grounded directly on
//! `original_source/app/services/endpoint_scheduler.py::_worker`
//! (`asyncio.wait_for(queue.get(), timeout=1.0)` →
//! `tokio::time::timeout(Duration::from_secs(1), ...)`), and the
//! attempt-then-retry-once flow on `_check_endpoint_with_retry`. The queue
//! is a single `mpsc::UnboundedReceiver` shared between workers behind a
//! `tokio::sync::Mutex`, since tokio's mpsc receivers are not `Clone`.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, error, warn};

use super::health::HealthMonitor;
use super::messages::{CheckCompletedEvent, NotificationCommand};
use super::prober::Prober;
use super::registry::Registry;
use crate::domain::QueueEntry;
use crate::persistence::schema::CheckResultRow;
use crate::persistence::{PersistenceBackend, PersistenceError};

pub struct WorkerPool {
    handles: Vec<tokio::task::JoinHandle<()>>,
    shutdown: Arc<AtomicBool>,
}

impl WorkerPool {
    #[allow(clippy::too_many_arguments)]
    pub fn spawn(
        worker_count: usize,
        queue_rx: mpsc::UnboundedReceiver<QueueEntry>,
        queue_size: Arc<AtomicUsize>,
        registry: Arc<Registry>,
        prober: Arc<Prober>,
        persistence: Arc<dyn PersistenceBackend>,
        notifier_tx: mpsc::Sender<NotificationCommand>,
        retry_delay_secs: u64,
    ) -> Self {
        let queue_rx = Arc::new(Mutex::new(queue_rx));
        let shutdown = Arc::new(AtomicBool::new(false));
        let mut handles = Vec::with_capacity(worker_count);

        for worker_id in 0..worker_count {
            let worker = Worker {
                worker_id,
                queue_rx: queue_rx.clone(),
                queue_size: queue_size.clone(),
                registry: registry.clone(),
                prober: prober.clone(),
                persistence: persistence.clone(),
                notifier_tx: notifier_tx.clone(),
                retry_delay: Duration::from_secs(retry_delay_secs),
                shutdown: shutdown.clone(),
            };
            handles.push(tokio::spawn(worker.run()));
        }

        Self { handles, shutdown }
    }

    /// Signals every worker to stop after its current iteration and waits
    /// for them to drain. In-flight probes are allowed to finish; only the
    /// queue-wait loop observes the flag.
    pub async fn shutdown(self) {
        self.shutdown.store(true, Ordering::SeqCst);
        for handle in self.handles {
            let _ = handle.await;
        }
    }

    pub fn worker_count(&self) -> usize {
        self.handles.len()
    }
}

struct Worker {
    worker_id: usize,
    queue_rx: Arc<Mutex<mpsc::UnboundedReceiver<QueueEntry>>>,
    queue_size: Arc<AtomicUsize>,
    registry: Arc<Registry>,
    prober: Arc<Prober>,
    persistence: Arc<dyn PersistenceBackend>,
    notifier_tx: mpsc::Sender<NotificationCommand>,
    retry_delay: Duration,
    shutdown: Arc<AtomicBool>,
}

impl Worker {
    async fn run(self) {
        debug!(worker_id = self.worker_id, "worker started");

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            let entry = {
                let mut rx = self.queue_rx.lock().await;
                tokio::time::timeout(Duration::from_secs(1), rx.recv()).await
            };

            match entry {
                Ok(Some(entry)) => {
                    self.queue_size.fetch_sub(1, Ordering::Relaxed);
                    self.handle_entry(entry).await;
                }
                Ok(None) => {
                    warn!(worker_id = self.worker_id, "probe queue closed, shutting down");
                    break;
                }
                Err(_) => continue, // 1s observe-timeout, loop back to check shutdown
            }
        }

        debug!(worker_id = self.worker_id, "worker stopped");
    }

    async fn handle_entry(&self, entry: QueueEntry) {
        let Some(endpoint) = self.registry.get(&entry.endpoint_id) else {
            debug!(endpoint_id = %entry.endpoint_id, "endpoint deleted before dispatch, discarding");
            return;
        };

        let mut outcome = self.prober.probe(&endpoint, 1).await;
        if !outcome.success && outcome.retryable {
            tokio::time::sleep(self.retry_delay).await;
            outcome = self.prober.probe(&endpoint, 2).await;
        }

        let checked_at = Utc::now();
        let row = CheckResultRow {
            endpoint_id: endpoint.id.clone(),
            checked_at,
            status_code: if outcome.status_code == 0 {
                None
            } else {
                Some(outcome.status_code)
            },
            elapsed_ms: outcome.elapsed_ms,
            success: outcome.success,
            error_message: outcome.error.clone(),
        };

        match self.persistence.insert_check_result(row).await {
            Ok(()) => {}
            Err(PersistenceError::ForeignKeyViolation(_)) => {
                debug!(endpoint_id = %endpoint.id, "endpoint deleted during flight, evicting stale registry entry");
                self.registry.on_delete(&endpoint.id);
                return;
            }
            Err(err) => {
                error!(endpoint_id = %endpoint.id, error = %err, "failed to persist check result");
            }
        }

        let Some(consecutive_failures) = self.registry.record_outcome(&endpoint.id, outcome.success) else {
            return; // deleted between probe and registry update
        };

        if let Err(err) = self
            .persistence
            .update_consecutive_failures(&endpoint.id, consecutive_failures)
            .await
        {
            warn!(endpoint_id = %endpoint.id, error = %err, "failed to persist consecutive failure count");
        }

        if outcome.success {
            return;
        }

        self.maybe_notify(&endpoint, consecutive_failures, checked_at, outcome.clone())
            .await;
    }

    async fn maybe_notify(
        &self,
        endpoint: &crate::domain::Endpoint,
        consecutive_failures: u32,
        checked_at: chrono::DateTime<Utc>,
        outcome: crate::domain::ProbeOutcome,
    ) {
        let settings = match self
            .persistence
            .get_notification_settings(&endpoint.user_id)
            .await
        {
            Ok(Some(settings)) => settings,
            Ok(None) => return,
            Err(err) => {
                warn!(user_id = %endpoint.user_id, error = %err, "failed to read notification settings");
                return;
            }
        };

        if !settings.email_enabled || consecutive_failures < settings.failure_threshold {
            return;
        }

        let event = CheckCompletedEvent {
            endpoint_id: endpoint.id.clone(),
            workspace_id: endpoint.workspace_id.clone(),
            user_id: endpoint.user_id.clone(),
            endpoint_name: endpoint.name.clone(),
            timestamp: checked_at,
            outcome,
            consecutive_failures,
        };

        if self
            .notifier_tx
            .send(NotificationCommand::HandleCheckResult(event))
            .await
            .is_err()
        {
            warn!(endpoint_id = %endpoint.id, "notification coordinator channel closed");
        }
    }
}

/// Consults the Health Monitor and queue depth the way the Scheduling Loop
/// does, exposed here so the Scheduler Manager's status snapshot can report
/// a single "is the system currently able to make progress" bit without
/// duplicating the gating logic.
pub async fn is_accepting_work(health: &HealthMonitor, queue_size: usize) -> bool {
    let summary = health.summary().await;
    summary.state == super::health::HealthState::Healthy && !health.is_queue_overwhelmed(queue_size)
}
