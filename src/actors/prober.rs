//! HTTP Prober: a stateless single-request executor.
//!
//! Grounded on this codebase's `actors::service_monitor::ServiceMonitorActor::execute_request`/
//! `evaluate_response` — same reqwest `Method` construction, same
//! skip-body-read-on-HEAD nuance. Unlike that actor, the Prober owns no
//! per-endpoint state and is not itself an actor: it is a thin wrapper
//! around a pooled `reqwest::Client` invoked directly by the Worker Pool.
//! `retryable` classification is grounded on
//! `original_source/app/services/endpoint_scheduler.py`'s non-retryable
//! substring list, since the teacher has no retry concept at all.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::Semaphore;
use tracing::trace;

use crate::domain::{Endpoint, ProbeOutcome};

const DEFAULT_USER_AGENT: &str = "uptime-engine/0.1";

/// Per-host cap on pooled connections (spec §5's "per-host concurrency cap (10)").
const PER_HOST_POOL_SIZE: usize = 10;

/// Substrings in a request error that indicate permanent misconfiguration
/// rather than a transient network blip — retrying would never help.
const NON_RETRYABLE_ERROR_SUBSTRINGS: &[&str] = &[
    "name or service not known",
    "no address associated with hostname",
    "invalid url",
    "unsupported protocol",
];

pub struct Prober {
    client: reqwest::Client,
    /// Bounds in-flight requests across the whole client to `2 * worker_count`
    /// (spec §5's "total concurrency cap"), since `pool_max_idle_per_host`
    /// only bounds idle pooled connections, not requests actually in flight.
    concurrency: Arc<Semaphore>,
}

impl Prober {
    /// `http_timeout_secs` becomes the client's default request timeout —
    /// applied whenever a probe's own `tokio::time::timeout` (set from the
    /// endpoint's per-probe `timeout_seconds`) doesn't fire first.
    /// `worker_count` sizes the total in-flight concurrency cap at `2 ×
    /// worker_count`.
    pub fn new(http_timeout_secs: u64, worker_count: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(PER_HOST_POOL_SIZE)
            .timeout(Duration::from_secs(http_timeout_secs))
            .build()?;

        let total_concurrency = (worker_count.max(1)) * 2;

        Ok(Self {
            client,
            concurrency: Arc::new(Semaphore::new(total_concurrency)),
        })
    }

    /// Executes one probe attempt against `endpoint`, honoring its
    /// per-endpoint timeout. `attempt` is recorded on the outcome for
    /// observability; it does not change behavior.
    pub async fn probe(&self, endpoint: &Endpoint, attempt: u8) -> ProbeOutcome {
        trace!(endpoint_id = %endpoint.id, attempt, "probing endpoint");

        let start = Instant::now();
        let timeout = Duration::from_secs(endpoint.timeout_seconds as u64);

        let result = tokio::time::timeout(timeout, self.execute_request(endpoint)).await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(status_code)) => ProbeOutcome {
                success: status_code == endpoint.expected_status,
                retryable: true,
                status_code,
                elapsed_ms,
                error: if status_code == endpoint.expected_status {
                    None
                } else {
                    Some(format!(
                        "expected status {}, got {}",
                        endpoint.expected_status, status_code
                    ))
                },
                attempt,
            },
            Ok(Err(err)) => {
                let message = err.to_string();
                ProbeOutcome {
                    success: false,
                    retryable: !is_non_retryable(&message),
                    status_code: 0,
                    elapsed_ms,
                    error: Some(message),
                    attempt,
                }
            }
            Err(_) => ProbeOutcome {
                success: false,
                retryable: true,
                status_code: 0,
                elapsed_ms,
                error: Some(format!("request timed out after {}s", endpoint.timeout_seconds)),
                attempt,
            },
        }
    }

    async fn execute_request(&self, endpoint: &Endpoint) -> anyhow::Result<u16> {
        let mut request = self
            .client
            .request(endpoint.method.as_reqwest(), &endpoint.url);

        for (key, value) in &endpoint.headers {
            request = request.header(key, value);
        }
        if !endpoint.headers.contains_key("User-Agent") {
            request = request.header("User-Agent", DEFAULT_USER_AGENT);
        }
        if let Some(body) = &endpoint.body {
            request = request.body(body.clone());
        }

        let _permit = self
            .concurrency
            .acquire()
            .await
            .expect("concurrency semaphore is never closed");
        let response = request.send().await?;
        let status_code = response.status().as_u16();

        // Skip reading the body for HEAD requests and for anything else —
        // the Prober only ever reports the status code.
        Ok(status_code)
    }
}

fn is_non_retryable(error_message: &str) -> bool {
    let lower = error_message.to_lowercase();
    NON_RETRYABLE_ERROR_SUBSTRINGS
        .iter()
        .any(|substring| lower.contains(substring))
}
