//! Scheduling Loop: turns due Registry entries into queued probe jobs.
//!
//! Grounded on this codebase's `actors::service_monitor::ServiceMonitorActor::run`
//! `tokio::select!` shape (ticker + command channel + else-arm shutdown),
//! generalized so the ticker branch gates on health/queue state and enqueues
//! many entries per tick instead of performing one check directly.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::health::HealthMonitor;
use super::messages::SchedulerCommand;
use super::registry::Registry;
use crate::domain::QueueEntry;

pub struct SchedulingLoop {
    registry: Arc<Registry>,
    health: Arc<HealthMonitor>,
    queue_tx: mpsc::UnboundedSender<QueueEntry>,
    queue_size: Arc<std::sync::atomic::AtomicUsize>,
    command_rx: mpsc::Receiver<SchedulerCommand>,
    interval_duration: Duration,
    queue_warning_size: usize,
}

impl SchedulingLoop {
    pub fn new(
        registry: Arc<Registry>,
        health: Arc<HealthMonitor>,
        queue_tx: mpsc::UnboundedSender<QueueEntry>,
        queue_size: Arc<std::sync::atomic::AtomicUsize>,
        command_rx: mpsc::Receiver<SchedulerCommand>,
        interval_secs: u64,
        queue_warning_size: usize,
    ) -> Self {
        Self {
            registry,
            health,
            queue_tx,
            queue_size,
            command_rx,
            interval_duration: Duration::from_secs(interval_secs),
            queue_warning_size,
        }
    }

    pub async fn run(mut self) {
        debug!("starting scheduling loop");

        let mut ticker = interval(self.interval_duration);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    let enqueued = self.tick().await;
                    debug!(enqueued, "scheduling tick complete");
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        SchedulerCommand::TickNow { respond_to } => {
                            let enqueued = self.tick().await;
                            let _ = respond_to.send(Ok(enqueued));
                        }
                        SchedulerCommand::Shutdown => {
                            debug!("received shutdown command");
                            break;
                        }
                    }
                }

                else => {
                    warn!("command channel closed, shutting down");
                    break;
                }
            }
        }

        debug!("scheduling loop stopped");
    }

    /// Runs one scan/enqueue cycle; returns the number of entries enqueued.
    async fn tick(&self) -> usize {
        let health = self.health.check_system_health().await;
        if health.state != super::health::HealthState::Healthy {
            warn!("system unhealthy, skipping scheduling tick");
            return 0;
        }

        let current_queue_size = self.queue_size.load(std::sync::atomic::Ordering::Relaxed);
        if self.health.is_queue_overwhelmed(current_queue_size) {
            warn!(queue_size = current_queue_size, "probe queue overwhelmed, skipping tick");
            return 0;
        }

        let due = self.registry.snapshot_due();
        for endpoint in &due {
            let entry = QueueEntry {
                endpoint_id: endpoint.id.clone(),
                scheduled_at: chrono::Utc::now(),
            };
            if self.queue_tx.send(entry).is_err() {
                warn!("probe queue receiver dropped, cannot enqueue");
                break;
            }
            self.queue_size.fetch_add(1, std::sync::atomic::Ordering::Relaxed);
        }

        let new_size = self.queue_size.load(std::sync::atomic::Ordering::Relaxed);
        if new_size >= self.queue_warning_size {
            warn!(queue_size = new_size, "probe queue above warning threshold");
        }

        if !due.is_empty() {
            info!(count = due.len(), "enqueued due endpoints for probing");
        }

        due.len()
    }
}

#[derive(Clone)]
pub struct SchedulerHandle {
    sender: mpsc::Sender<SchedulerCommand>,
}

impl SchedulerHandle {
    /// Builds the command channel, constructs the loop, and spawns it onto
    /// its own task, returning a cloneable handle for callers (tests, the
    /// Scheduler Manager) to drive it without touching the loop directly.
    pub fn spawn(
        registry: Arc<Registry>,
        health: Arc<HealthMonitor>,
        queue_tx: mpsc::UnboundedSender<QueueEntry>,
        queue_size: Arc<std::sync::atomic::AtomicUsize>,
        interval_secs: u64,
        queue_warning_size: usize,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(32);
        let scheduling_loop = SchedulingLoop::new(
            registry,
            health,
            queue_tx,
            queue_size,
            command_rx,
            interval_secs,
            queue_warning_size,
        );
        tokio::spawn(scheduling_loop.run());
        Self { sender: command_tx }
    }

    pub fn new(sender: mpsc::Sender<SchedulerCommand>) -> Self {
        Self { sender }
    }

    pub async fn tick_now(&self) -> anyhow::Result<usize> {
        let (tx, rx) = tokio::sync::oneshot::channel();
        self.sender
            .send(SchedulerCommand::TickNow { respond_to: tx })
            .await?;
        rx.await?
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(SchedulerCommand::Shutdown).await;
    }
}
