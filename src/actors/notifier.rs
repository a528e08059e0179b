//! Notification Coordinator: batches per-user failure events into at most
//! one outage email per cooldown-bounded window, with escalating backoff.
//!
//! The full actor here (own task, `mpsc::Sender<NotificationCommand>`
//! handle, internal `tokio::select!` over the command channel and a scan
//! ticker) follows the same shape as `scheduler::SchedulingLoop`/
//! `SchedulerHandle`, grounded on this codebase's
//! `actors::alert::AlertActor`/`AlertHandle`. The buffer/cooldown state
//! machine and cooldown level table are grounded on
//! `original_source/app/services/outage_notification_service.py`.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot};
use tokio::time::interval;
use tracing::{debug, info, warn};

use super::messages::{CheckCompletedEvent, NotificationCommand, UserNotificationState};
use crate::email::{BufferedEndpoint, EmailProvider};
use crate::persistence::schema::{NotificationHistoryRow, NotificationStateRow};
use crate::persistence::PersistenceBackend;

const BUFFER_WINDOW: chrono::Duration = chrono::Duration::minutes(15);

/// `(next_level, duration_hours)` indexed by current cooldown level.
/// Cycles back to level 0's duration after level 4.
const COOLDOWN_LEVELS: [(u8, i64); 5] = [(1, 1), (2, 2), (3, 3), (4, 5), (1, 1)];

/// Public lookup into [`COOLDOWN_LEVELS`] (spec §4.6's cooldown level table),
/// exposed for integration/property tests exercising the escalation cycle
/// without driving the whole actor.
pub fn cooldown_level_duration(level: u8) -> (u8, i64) {
    COOLDOWN_LEVELS[level as usize % COOLDOWN_LEVELS.len()]
}

/// The notification state machine, plus a `level` carried on every variant.
///
/// `level` is the cooldown level the *next* flush will treat as "current" —
/// i.e. the index into [`COOLDOWN_LEVELS`] to read when that flush happens.
/// It must survive the Cooldown → Ready transition on expiry: reset to level
/// 0 is not automatic, otherwise a user who cycles through Ready between
/// outages would always flush at level 0 and never escalate past a 1-hour
/// cooldown.
#[derive(Debug, Clone)]
enum CoordinatorState {
    Ready {
        level: u8,
    },
    Buffering {
        started_at: DateTime<Utc>,
        /// endpoint id -> consecutive failure count as of the last event seen.
        endpoints: HashMap<String, u32>,
        level: u8,
    },
    Cooldown {
        expires_at: DateTime<Utc>,
        level: u8,
    },
}

impl CoordinatorState {
    fn to_public(&self) -> UserNotificationState {
        match self {
            CoordinatorState::Ready { .. } => UserNotificationState::Ready,
            CoordinatorState::Buffering { started_at, .. } => UserNotificationState::Buffering {
                until: *started_at + BUFFER_WINDOW,
            },
            CoordinatorState::Cooldown { expires_at, level } => UserNotificationState::Cooldown {
                until: *expires_at,
                level: *level,
            },
        }
    }

    fn to_row(&self, user_id: &str) -> NotificationStateRow {
        match self {
            CoordinatorState::Ready { level } => NotificationStateRow {
                user_id: user_id.to_string(),
                buffer_active: false,
                buffer_started_at: None,
                failing_endpoint_ids_json: "[]".to_string(),
                cooldown_level: *level,
                cooldown_expires_at: None,
            },
            CoordinatorState::Buffering { started_at, endpoints, level } => NotificationStateRow {
                user_id: user_id.to_string(),
                buffer_active: true,
                buffer_started_at: Some(*started_at),
                failing_endpoint_ids_json: serde_json::to_string(
                    &endpoints.keys().collect::<Vec<_>>(),
                )
                .unwrap_or_else(|_| "[]".to_string()),
                cooldown_level: *level,
                cooldown_expires_at: None,
            },
            CoordinatorState::Cooldown { expires_at, level } => NotificationStateRow {
                user_id: user_id.to_string(),
                buffer_active: false,
                buffer_started_at: None,
                failing_endpoint_ids_json: "[]".to_string(),
                cooldown_level: *level,
                cooldown_expires_at: Some(*expires_at),
            },
        }
    }

    fn from_row(row: &NotificationStateRow) -> Self {
        if row.buffer_active {
            let endpoints: Vec<String> =
                serde_json::from_str(&row.failing_endpoint_ids_json).unwrap_or_default();
            CoordinatorState::Buffering {
                started_at: row.buffer_started_at.unwrap_or_else(Utc::now),
                endpoints: endpoints.into_iter().map(|id| (id, 0)).collect(),
                level: row.cooldown_level,
            }
        } else if let Some(expires_at) = row.cooldown_expires_at {
            CoordinatorState::Cooldown {
                expires_at,
                level: row.cooldown_level,
            }
        } else {
            CoordinatorState::Ready { level: row.cooldown_level }
        }
    }
}

pub struct NotificationCoordinator {
    persistence: Arc<dyn PersistenceBackend>,
    email_provider: Arc<dyn EmailProvider>,
    command_rx: mpsc::Receiver<NotificationCommand>,
    scan_interval: Duration,
    states: HashMap<String, CoordinatorState>,
}

impl NotificationCoordinator {
    pub fn new(
        persistence: Arc<dyn PersistenceBackend>,
        email_provider: Arc<dyn EmailProvider>,
        command_rx: mpsc::Receiver<NotificationCommand>,
        scan_interval_secs: u64,
    ) -> Self {
        Self {
            persistence,
            email_provider,
            command_rx,
            scan_interval: Duration::from_secs(scan_interval_secs),
            states: HashMap::new(),
        }
    }

    pub async fn run(mut self) {
        debug!("starting notification coordinator");
        let mut ticker = interval(self.scan_interval);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.scan().await;
                }

                Some(cmd) = self.command_rx.recv() => {
                    match cmd {
                        NotificationCommand::HandleCheckResult(event) => {
                            self.handle_failure(event).await;
                        }
                        NotificationCommand::GetState { user_id, respond_to } => {
                            let state = self.states.get(&user_id).map(CoordinatorState::to_public);
                            let _ = respond_to.send(state);
                        }
                        NotificationCommand::Shutdown => {
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

        debug!("notification coordinator stopped");
    }

    /// Loads (or lazily initializes) a user's state, applying the per-state
    /// transition rules for one qualifying failure event.
    async fn handle_failure(&mut self, event: CheckCompletedEvent) {
        let user_id = event.user_id.clone();
        let mut state = self.load_state(&user_id).await;

        let now = Utc::now();
        state = match state {
            CoordinatorState::Cooldown { expires_at, level } if now < expires_at => {
                debug!(user_id = %user_id, "dropping failure event: user in cooldown");
                CoordinatorState::Cooldown { expires_at, level }
            }
            CoordinatorState::Cooldown { level, .. } | CoordinatorState::Ready { level } => {
                let mut endpoints = HashMap::new();
                endpoints.insert(event.endpoint_id.clone(), event.consecutive_failures);
                info!(user_id = %user_id, endpoint_id = %event.endpoint_id, "opening notification buffer");
                CoordinatorState::Buffering {
                    started_at: now,
                    endpoints,
                    level,
                }
            }
            CoordinatorState::Buffering { started_at, mut endpoints, level } => {
                endpoints.insert(event.endpoint_id.clone(), event.consecutive_failures);
                CoordinatorState::Buffering { started_at, endpoints, level }
            }
        };

        self.persist_state(&user_id, &state).await;
        self.states.insert(user_id, state);
    }

    /// Scans every user state this process currently holds for expired
    /// buffers (→ flush) and expired cooldowns (→ Ready). States for users
    /// this process has never handled an event for are not in memory and so
    /// are not scanned; they are loaded lazily the next time an event for
    /// that user arrives, per the persistence interface's lack of a
    /// select-all-users operation.
    async fn scan(&mut self) {
        let now = Utc::now();
        let user_ids: Vec<String> = self.states.keys().cloned().collect();

        for user_id in user_ids {
            let state = self
                .states
                .get(&user_id)
                .cloned()
                .unwrap_or(CoordinatorState::Ready { level: 0 });

            match state {
                CoordinatorState::Buffering { started_at, endpoints, level } => {
                    if now - started_at >= BUFFER_WINDOW {
                        let next = self.flush(&user_id, endpoints, level).await;
                        self.persist_state(&user_id, &next).await;
                        self.states.insert(user_id, next);
                    }
                }
                CoordinatorState::Cooldown { expires_at, level } => {
                    if now >= expires_at {
                        info!(user_id = %user_id, "cooldown expired, returning to ready");
                        let ready = CoordinatorState::Ready { level };
                        self.persist_state(&user_id, &ready).await;
                        self.states.insert(user_id, ready);
                    }
                }
                CoordinatorState::Ready { .. } => {}
            }
        }
    }

    /// Sends the outage email for a buffer and returns the resulting state:
    /// `Cooldown` at the next level on success, `Ready` on failure (spec
    /// §4.6's "On email failure" rule). `current_level` is the level this
    /// buffer was carrying (inherited from whichever Ready/Cooldown state it
    /// opened from) — the index into [`COOLDOWN_LEVELS`] for this flush.
    async fn flush(&self, user_id: &str, endpoints: HashMap<String, u32>, current_level: u8) -> CoordinatorState {
        let endpoint_ids: Vec<String> = endpoints.keys().cloned().collect();
        let names = self
            .persistence
            .get_endpoint_workspace_info(&endpoint_ids)
            .await
            .unwrap_or_default();

        let buffered: Vec<BufferedEndpoint> = names
            .into_iter()
            .map(|row| BufferedEndpoint {
                consecutive_failures: endpoints.get(&row.endpoint_id).copied().unwrap_or(0),
                endpoint_id: row.endpoint_id,
                endpoint_name: row.endpoint_name,
                workspace_name: row.workspace_name,
            })
            .collect();

        let email = crate::email::render_outage_email(&buffered);

        let settings = self.persistence.get_notification_settings(user_id).await.ok().flatten();
        let Some(settings) = settings else {
            warn!(user_id, "no notification settings found at flush time, dropping buffer");
            return CoordinatorState::Ready { level: current_level };
        };

        let sent = self
            .email_provider
            .send_outage_email(&settings.email_address, &email)
            .await;

        let history_row = NotificationHistoryRow {
            id: 0,
            user_id: user_id.to_string(),
            sent_at: Utc::now(),
            endpoint_ids_json: serde_json::to_string(&endpoint_ids).unwrap_or_else(|_| "[]".to_string()),
            cooldown_level: current_level,
            success: sent,
            error_message: if sent { None } else { Some("email provider rejected send".to_string()) },
        };
        if let Err(err) = self.persistence.insert_notification_history(history_row).await {
            warn!(user_id, error = %err, "failed to record notification history");
        }

        if !sent {
            warn!(user_id, "outage email send failed, reverting to ready");
            return CoordinatorState::Ready { level: current_level };
        }

        let (next_level, duration_hours) = cooldown_level_duration(current_level);
        info!(user_id, level = current_level, next_level, "outage email sent, entering cooldown");
        CoordinatorState::Cooldown {
            expires_at: Utc::now() + chrono::Duration::hours(duration_hours),
            level: next_level,
        }
    }

    async fn load_state(&self, user_id: &str) -> CoordinatorState {
        if let Some(state) = self.states.get(user_id) {
            return state.clone();
        }
        match self.persistence.get_notification_state(user_id).await {
            Ok(Some(row)) => CoordinatorState::from_row(&row),
            Ok(None) => CoordinatorState::Ready { level: 0 },
            Err(err) => {
                warn!(user_id, error = %err, "failed to load notification state, defaulting to ready");
                CoordinatorState::Ready { level: 0 }
            }
        }
    }

    async fn persist_state(&self, user_id: &str, state: &CoordinatorState) {
        if let Err(err) = self
            .persistence
            .put_notification_state(state.to_row(user_id))
            .await
        {
            warn!(user_id, error = %err, "failed to persist notification state");
        }
    }
}

#[derive(Clone)]
pub struct NotifierHandle {
    sender: mpsc::Sender<NotificationCommand>,
}

impl NotifierHandle {
    pub fn spawn(
        persistence: Arc<dyn PersistenceBackend>,
        email_provider: Arc<dyn EmailProvider>,
        scan_interval_secs: u64,
    ) -> Self {
        let (command_tx, command_rx) = mpsc::channel(256);
        let coordinator =
            NotificationCoordinator::new(persistence, email_provider, command_rx, scan_interval_secs);
        tokio::spawn(coordinator.run());
        Self { sender: command_tx }
    }

    pub fn new(sender: mpsc::Sender<NotificationCommand>) -> Self {
        Self { sender }
    }

    pub fn sender(&self) -> mpsc::Sender<NotificationCommand> {
        self.sender.clone()
    }

    pub async fn get_state(&self, user_id: String) -> Option<UserNotificationState> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(NotificationCommand::GetState { user_id, respond_to: tx })
            .await
            .ok()?;
        rx.await.ok().flatten()
    }

    pub async fn shutdown(&self) {
        let _ = self.sender.send(NotificationCommand::Shutdown).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory::InMemoryBackend;
    use crate::persistence::schema::{EndpointRow, NotificationSettingsRow};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct RecordingEmailProvider {
        succeed: AtomicBool,
        sent_count: AtomicUsize,
        last_subject: StdMutex<Option<String>>,
    }

    #[async_trait]
    impl EmailProvider for RecordingEmailProvider {
        async fn send_outage_email(&self, _to: &str, email: &crate::email::RenderedEmail) -> bool {
            self.sent_count.fetch_add(1, Ordering::SeqCst);
            *self.last_subject.lock().unwrap() = Some(email.subject.clone());
            self.succeed.load(Ordering::SeqCst)
        }
    }

    fn endpoint_row(id: &str, user_id: &str) -> EndpointRow {
        EndpointRow {
            id: id.to_string(),
            workspace_id: "ws-1".to_string(),
            user_id: user_id.to_string(),
            name: format!("endpoint-{id}"),
            url: "https://example.com".to_string(),
            method: "Get".to_string(),
            headers_json: "{}".to_string(),
            body: None,
            expected_status: 200,
            timeout_seconds: 10,
            frequency_minutes: 5,
            is_active: true,
            consecutive_failures: 3,
            next_check_time: Utc::now(),
        }
    }

    fn failure_event(endpoint_id: &str, user_id: &str, consecutive_failures: u32) -> CheckCompletedEvent {
        CheckCompletedEvent {
            endpoint_id: endpoint_id.to_string(),
            workspace_id: "ws-1".to_string(),
            user_id: user_id.to_string(),
            endpoint_name: format!("endpoint-{endpoint_id}"),
            timestamp: Utc::now(),
            outcome: crate::domain::ProbeOutcome {
                success: false,
                retryable: true,
                status_code: 500,
                elapsed_ms: 10,
                error: Some("server error".to_string()),
                attempt: 2,
            },
            consecutive_failures,
        }
    }

    #[tokio::test]
    async fn first_failure_opens_a_buffer() {
        let memory = InMemoryBackend::new();
        memory.seed_endpoints(vec![endpoint_row("a", "user-1")]);
        let persistence: Arc<dyn PersistenceBackend> = Arc::new(memory);
        let email: Arc<dyn EmailProvider> = Arc::new(RecordingEmailProvider::default());

        let (_tx, rx) = mpsc::channel(8);
        let mut coordinator = NotificationCoordinator::new(persistence, email, rx, 60);

        coordinator.handle_failure(failure_event("a", "user-1", 5)).await;

        match coordinator.states.get("user-1") {
            Some(CoordinatorState::Buffering { endpoints, .. }) => {
                assert_eq!(endpoints.get("a"), Some(&5));
            }
            other => panic!("expected buffering state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn expired_buffer_flushes_and_enters_cooldown() {
        let memory = InMemoryBackend::new();
        memory.seed_endpoints(vec![endpoint_row("a", "user-1")]);
        memory.seed_notification_settings(vec![NotificationSettingsRow {
            user_id: "user-1".to_string(),
            email_enabled: true,
            email_address: "user@example.com".to_string(),
            failure_threshold: 5,
        }]);
        let persistence: Arc<dyn PersistenceBackend> = Arc::new(memory);
        let provider = Arc::new(RecordingEmailProvider::default());
        provider.succeed.store(true, Ordering::SeqCst);
        let email: Arc<dyn EmailProvider> = provider.clone();

        let (_tx, rx) = mpsc::channel(8);
        let mut coordinator = NotificationCoordinator::new(persistence, email, rx, 60);

        coordinator.handle_failure(failure_event("a", "user-1", 5)).await;
        // Force the buffer to look expired without sleeping in the test.
        if let Some(CoordinatorState::Buffering { started_at, .. }) =
            coordinator.states.get_mut("user-1")
        {
            *started_at = Utc::now() - chrono::Duration::minutes(16);
        }

        coordinator.scan().await;

        assert_eq!(provider.sent_count.load(Ordering::SeqCst), 1);
        match coordinator.states.get("user-1") {
            Some(CoordinatorState::Cooldown { level, .. }) => assert_eq!(*level, 1),
            other => panic!("expected cooldown state, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn repeated_outages_escalate_through_the_full_cooldown_cycle() {
        let memory = InMemoryBackend::new();
        memory.seed_endpoints(vec![endpoint_row("a", "user-1")]);
        memory.seed_notification_settings(vec![NotificationSettingsRow {
            user_id: "user-1".to_string(),
            email_enabled: true,
            email_address: "user@example.com".to_string(),
            failure_threshold: 5,
        }]);
        let persistence: Arc<dyn PersistenceBackend> = Arc::new(memory);
        let provider = Arc::new(RecordingEmailProvider::default());
        provider.succeed.store(true, Ordering::SeqCst);
        let email: Arc<dyn EmailProvider> = provider.clone();

        let (_tx, rx) = mpsc::channel(8);
        let mut coordinator = NotificationCoordinator::new(persistence, email, rx, 60);

        // Cycle through five outages; each one opens a buffer once the prior
        // cooldown has expired, flushes, and should escalate one step along
        // COOLDOWN_LEVELS: 1h -> 2h -> 3h -> 5h -> back to 1h.
        let expected_levels = [1u8, 2, 3, 4, 1];
        for expected_level in expected_levels {
            coordinator.handle_failure(failure_event("a", "user-1", 5)).await;
            if let Some(CoordinatorState::Buffering { started_at, .. }) =
                coordinator.states.get_mut("user-1")
            {
                *started_at = Utc::now() - chrono::Duration::minutes(16);
            }
            coordinator.scan().await;

            match coordinator.states.get("user-1") {
                Some(CoordinatorState::Cooldown { level, .. }) => assert_eq!(*level, expected_level),
                other => panic!("expected cooldown state, got {other:?}"),
            }

            // Expire the cooldown immediately so the next outage can open a
            // fresh buffer instead of being dropped.
            if let Some(CoordinatorState::Cooldown { expires_at, .. }) =
                coordinator.states.get_mut("user-1")
            {
                *expires_at = Utc::now() - chrono::Duration::seconds(1);
            }
            coordinator.scan().await;
            assert!(matches!(
                coordinator.states.get("user-1"),
                Some(CoordinatorState::Ready { .. })
            ));
        }
    }

    #[tokio::test]
    async fn event_during_cooldown_is_dropped() {
        let memory = InMemoryBackend::new();
        memory.seed_endpoints(vec![endpoint_row("a", "user-1")]);
        let persistence: Arc<dyn PersistenceBackend> = Arc::new(memory);
        let email: Arc<dyn EmailProvider> = Arc::new(RecordingEmailProvider::default());

        let (_tx, rx) = mpsc::channel(8);
        let mut coordinator = NotificationCoordinator::new(persistence, email, rx, 60);
        coordinator.states.insert(
            "user-1".to_string(),
            CoordinatorState::Cooldown {
                expires_at: Utc::now() + chrono::Duration::hours(1),
                level: 1,
            },
        );

        coordinator.handle_failure(failure_event("a", "user-1", 5)).await;

        match coordinator.states.get("user-1") {
            Some(CoordinatorState::Cooldown { level, .. }) => assert_eq!(*level, 1),
            other => panic!("expected state to remain in cooldown, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_send_reverts_to_ready() {
        let memory = InMemoryBackend::new();
        memory.seed_endpoints(vec![endpoint_row("a", "user-1")]);
        memory.seed_notification_settings(vec![NotificationSettingsRow {
            user_id: "user-1".to_string(),
            email_enabled: true,
            email_address: "user@example.com".to_string(),
            failure_threshold: 5,
        }]);
        let persistence: Arc<dyn PersistenceBackend> = Arc::new(memory);
        let provider = Arc::new(RecordingEmailProvider::default());
        provider.succeed.store(false, Ordering::SeqCst);
        let email: Arc<dyn EmailProvider> = provider;

        let (_tx, rx) = mpsc::channel(8);
        let mut coordinator = NotificationCoordinator::new(persistence, email, rx, 60);

        coordinator.handle_failure(failure_event("a", "user-1", 5)).await;
        if let Some(CoordinatorState::Buffering { started_at, .. }) =
            coordinator.states.get_mut("user-1")
        {
            *started_at = Utc::now() - chrono::Duration::minutes(16);
        }

        coordinator.scan().await;

        assert!(matches!(coordinator.states.get("user-1"), Some(CoordinatorState::Ready { .. })));
    }
}
