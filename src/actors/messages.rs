//! Message types shared between the engine's actors.
//!
//! ## Design Principles
//!
//! 1. **Commands**: request/response messages sent to a specific actor via mpsc.
//! 2. **Events**: fan-out notifications consumed by more than one subscriber.
//! 3. **Immutability**: messages are cloneable for multi-subscriber patterns.

use chrono::{DateTime, Utc};
use tokio::sync::oneshot;

use crate::domain::ProbeOutcome;

/// Published by the Worker Pool once a probe attempt (including any retry)
/// has finished. The Notification Coordinator listens for `success: false`;
/// the Scheduling Loop and Status API do not subscribe, they poll the
/// Registry directly.
#[derive(Debug, Clone)]
pub struct CheckCompletedEvent {
    pub endpoint_id: String,
    pub workspace_id: String,
    pub user_id: String,
    pub endpoint_name: String,
    pub timestamp: DateTime<Utc>,
    pub outcome: ProbeOutcome,
    /// Consecutive failure count *after* this check, as recorded by the registry.
    pub consecutive_failures: u32,
}

/// Commands accepted by the Notification Coordinator actor.
#[derive(Debug)]
pub enum NotificationCommand {
    /// A check just completed; the coordinator decides whether it crosses
    /// the failure threshold and whether the user's state machine allows
    /// sending right now.
    HandleCheckResult(CheckCompletedEvent),

    /// Inspect the current per-user state (used by tests and the status API).
    GetState {
        user_id: String,
        respond_to: oneshot::Sender<Option<UserNotificationState>>,
    },

    Shutdown,
}

/// Snapshot of one user's outage-notification state machine.
#[derive(Debug, Clone, PartialEq)]
pub enum UserNotificationState {
    Ready,
    Buffering { until: DateTime<Utc> },
    Cooldown { until: DateTime<Utc>, level: u8 },
}

/// Commands accepted by the Scheduling Loop, mostly used by tests to force
/// a tick without waiting on the interval.
#[derive(Debug)]
pub enum SchedulerCommand {
    TickNow {
        respond_to: oneshot::Sender<anyhow::Result<usize>>,
    },
    Shutdown,
}
