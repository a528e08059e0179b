//! Health Monitor: circuit breaker gating the Scheduling Loop on external
//! dependency health.
//!
//! Not an actor — the specification describes this component as "implicit
//! inside the scheduling loop," so it is a plain async struct behind
//! `tokio::sync::RwLock`, read in-line by the Scheduling Loop rather than
//! queried through a channel round trip. The counter-pair transition logic
//! (consecutive failures/successes flipping a Healthy/Unhealthy flag) is
//! this codebase's grace-period hysteresis idea from `monitors/resources.rs`
//! generalized from a single grace counter to the two-threshold circuit
//! breaker the specification describes.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::warn;

use crate::persistence::PersistenceBackend;

const INTERNET_CHECK_URLS: &[&str] = &[
    "https://www.google.com/generate_204",
    "https://1.1.1.1",
    "https://www.cloudflare.com",
];

const INTERNET_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthState {
    Healthy,
    Unhealthy,
}

#[derive(Debug, Clone)]
pub struct HealthSummary {
    pub state: HealthState,
    pub consecutive_failures: u32,
    pub consecutive_successes: u32,
    pub last_check: Option<DateTime<Utc>>,
    pub last_failure_reason: Option<String>,
}

impl Default for HealthSummary {
    fn default() -> Self {
        Self {
            state: HealthState::Healthy,
            consecutive_failures: 0,
            consecutive_successes: 0,
            last_check: None,
            last_failure_reason: None,
        }
    }
}

pub struct HealthMonitor {
    inner: RwLock<HealthSummary>,
    http_client: reqwest::Client,
    persistence: Arc<dyn PersistenceBackend>,
    failure_threshold: u32,
    success_threshold: u32,
    check_interval: Duration,
    queue_overwhelmed_size: usize,
}

impl HealthMonitor {
    pub fn new(
        persistence: Arc<dyn PersistenceBackend>,
        failure_threshold: u32,
        success_threshold: u32,
        check_interval_secs: u64,
        queue_overwhelmed_size: usize,
    ) -> anyhow::Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(INTERNET_CHECK_TIMEOUT)
            .build()?;

        Ok(Self {
            inner: RwLock::new(HealthSummary::default()),
            http_client,
            persistence,
            failure_threshold,
            success_threshold,
            check_interval: Duration::from_secs(check_interval_secs),
            queue_overwhelmed_size,
        })
    }

    /// Rate-limited health check. Returns the cached state if the previous
    /// check happened within `check_interval`.
    pub async fn check_system_health(&self) -> HealthSummary {
        {
            let guard = self.inner.read().await;
            if let Some(last) = guard.last_check {
                if Utc::now() - last < chrono::Duration::from_std(self.check_interval).unwrap() {
                    return guard.clone();
                }
            }
        }

        self.force_health_check().await
    }

    /// Bypasses the rate limit and runs both subchecks immediately.
    pub async fn force_health_check(&self) -> HealthSummary {
        let database_ok = self.check_database().await;
        let internet_ok = self.check_internet().await;
        let success = database_ok && internet_ok;
        let failure_reason = if success {
            None
        } else if !database_ok {
            Some("database reachability check failed".to_string())
        } else {
            Some("internet reachability check failed".to_string())
        };

        let mut guard = self.inner.write().await;
        apply_check_result(
            &mut guard,
            success,
            failure_reason,
            self.failure_threshold,
            self.success_threshold,
        );
        guard.clone()
    }

    async fn check_database(&self) -> bool {
        match self.persistence.health_check().await {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "database reachability subcheck failed");
                false
            }
        }
    }

    async fn check_internet(&self) -> bool {
        for url in INTERNET_CHECK_URLS {
            match self.http_client.get(*url).send().await {
                Ok(response) if response.status() == reqwest::StatusCode::OK => return true,
                Ok(_) => continue,
                Err(_) => continue,
            }
        }
        warn!("internet reachability subcheck failed against all known endpoints");
        false
    }

    /// `true` when `size >= queue_overwhelmed_size`. Always logs a warning
    /// at half that threshold, independent of the verdict returned.
    pub fn is_queue_overwhelmed(&self, size: usize) -> bool {
        let half = self.queue_overwhelmed_size / 2;
        if size >= half {
            warn!(
                queue_size = size,
                threshold = self.queue_overwhelmed_size,
                "probe queue at or above half its overwhelmed threshold"
            );
        }
        size >= self.queue_overwhelmed_size
    }

    pub async fn summary(&self) -> HealthSummary {
        self.inner.read().await.clone()
    }
}

/// The circuit breaker's pure transition step (spec §4.2): advances the
/// consecutive counters for one check result and flips `state` once a
/// threshold is crossed. Factored out of `force_health_check` so the
/// transition algebra is testable without performing real I/O, the way this
/// codebase's `monitors::resources::ResourceEvaluation::evaluate` is a pure
/// function callers feed observations into.
fn apply_check_result(
    summary: &mut HealthSummary,
    success: bool,
    failure_reason: Option<String>,
    failure_threshold: u32,
    success_threshold: u32,
) {
    summary.last_check = Some(Utc::now());

    if success {
        summary.consecutive_successes += 1;
        summary.consecutive_failures = 0;
        summary.last_failure_reason = None;

        if summary.state == HealthState::Unhealthy && summary.consecutive_successes >= success_threshold {
            summary.state = HealthState::Healthy;
        }
    } else {
        summary.consecutive_failures += 1;
        summary.consecutive_successes = 0;
        summary.last_failure_reason = failure_reason;

        if summary.state == HealthState::Healthy && summary.consecutive_failures >= failure_threshold {
            summary.state = HealthState::Unhealthy;
            warn!(
                consecutive_failures = summary.consecutive_failures,
                "system health transitioned to unhealthy"
            );
        }
    }
}
