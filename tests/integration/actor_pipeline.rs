//! End-to-end: a queued probe flows through the Worker Pool, lands in
//! persistence, updates the Registry's failure counter, and crosses the
//! Notification Coordinator's threshold into a buffered outage — all
//! through the same public handles `SchedulerManager` wires together,
//! without needing a live scheduler tick (see `concurrency.rs` for that).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uptime_engine::actors::messages::UserNotificationState;
use uptime_engine::actors::notifier::NotifierHandle;
use uptime_engine::actors::prober::Prober;
use uptime_engine::actors::registry::Registry;
use uptime_engine::actors::worker::WorkerPool;
use uptime_engine::domain::QueueEntry;
use uptime_engine::email::NoopEmailProvider;
use uptime_engine::persistence::PersistenceBackend;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::helpers::{new_endpoint, notification_settings, seeded_backend};

/// Polls `check` every 20ms until it resolves to `true` or `timeout`
/// elapses, to observe the outcome of work handed off across actor
/// boundaries without hard-coding a sleep long enough to always be safe.
async fn wait_until<F, Fut>(mut check: F, timeout: Duration)
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if check().await {
            return;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("condition did not become true within {timeout:?}");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
}

#[tokio::test]
async fn failing_probe_flows_through_worker_pool_into_buffered_outage() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/down"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let registry = Arc::new(Registry::new());
    let created = registry.on_create(new_endpoint("a", "user-1", &format!("{}/down", server.uri())));

    let memory = seeded_backend(&created);
    memory.seed_notification_settings(vec![notification_settings("user-1", 2)]);
    let persistence: Arc<dyn PersistenceBackend> = Arc::new(memory);

    let notifier = NotifierHandle::spawn(persistence.clone(), Arc::new(NoopEmailProvider), 1);

    let (queue_tx, queue_rx) = mpsc::unbounded_channel::<QueueEntry>();
    let queue_size = Arc::new(AtomicUsize::new(0));
    let prober = Arc::new(Prober::new(20, 12).unwrap());

    let workers = WorkerPool::spawn(
        2,
        queue_rx,
        queue_size.clone(),
        registry.clone(),
        prober,
        persistence.clone(),
        notifier.sender(),
        0,
    );

    // Two failing checks, matching the seeded failure_threshold of 2. Each is
    // enqueued only after the previous one has been recorded, so the second
    // check's `consecutive_failures` is deterministically 2.
    for expected_failures in 1..=2u32 {
        queue_tx
            .send(QueueEntry {
                endpoint_id: "a".to_string(),
                scheduled_at: chrono::Utc::now(),
            })
            .unwrap();
        queue_size.fetch_add(1, Ordering::Relaxed);

        wait_until(
            || async {
                registry
                    .get("a")
                    .map(|e| e.consecutive_failures >= expected_failures)
                    .unwrap_or(false)
            },
            Duration::from_secs(2),
        )
        .await;
    }

    wait_until(
        || async {
            matches!(
                notifier.get_state("user-1".to_string()).await,
                Some(UserNotificationState::Buffering { .. })
            )
        },
        Duration::from_secs(2),
    )
    .await;

    let stats = persistence.get_stats().await.unwrap();
    assert!(stats.contains("2 check results"));

    workers.shutdown().await;
    notifier.shutdown().await;
}
