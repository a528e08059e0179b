//! Chaos scenarios: unreachable targets, malformed URLs, slow responses,
//! and an endpoint that disappears from persistence while a check is in
//! flight. Each exercises a path the happy-path unit tests never hit.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use uptime_engine::actors::notifier::NotifierHandle;
use uptime_engine::actors::prober::Prober;
use uptime_engine::actors::registry::Registry;
use uptime_engine::actors::worker::WorkerPool;
use uptime_engine::domain::{Endpoint, HttpMethod, QueueEntry};
use uptime_engine::email::NoopEmailProvider;
use uptime_engine::persistence::memory::InMemoryBackend;
use uptime_engine::persistence::PersistenceBackend;
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

use super::helpers::new_endpoint;

fn bare_endpoint(id: &str, url: String, expected_status: u16, timeout_seconds: u32) -> Endpoint {
    Endpoint {
        id: id.to_string(),
        workspace_id: "ws-1".to_string(),
        user_id: "user-1".to_string(),
        name: "chaos".to_string(),
        url,
        method: HttpMethod::Get,
        headers: Default::default(),
        body: None,
        expected_status,
        timeout_seconds,
        frequency_minutes: 5,
        is_active: true,
        consecutive_failures: 0,
        next_check_time: chrono::Utc::now(),
    }
}

#[tokio::test]
async fn connection_refused_is_reported_as_retryable() {
    // Port 1 is a reserved, never-listening port; connecting to it refuses
    // immediately rather than hanging, unlike an unroutable address.
    let prober = Prober::new(20, 12).unwrap();
    let endpoint = bare_endpoint("a", "http://127.0.0.1:1".to_string(), 200, 5);

    let outcome = prober.probe(&endpoint, 1).await;

    assert!(!outcome.success);
    assert!(outcome.retryable);
    assert_eq!(outcome.status_code, 0);
}

#[tokio::test]
async fn endpoint_url_with_query_parameters_is_probed_exactly() {
    // Endpoint URLs aren't always bare paths — building one with `url::Url`
    // (as a caller assembling an endpoint from user-supplied pieces would)
    // must survive unchanged through to the actual request the Prober sends.
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/search"))
        .and(query_param("status", "down"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut url = url::Url::parse(&server.uri()).expect("mock server uri is a valid url");
    url.set_path("/search");
    url.query_pairs_mut().append_pair("status", "down");

    let prober = Prober::new(20, 12).unwrap();
    let endpoint = bare_endpoint("a", url.to_string(), 200, 5);

    let outcome = prober.probe(&endpoint, 1).await;

    assert!(outcome.success);
    assert_eq!(outcome.status_code, 200);
}

#[tokio::test]
async fn response_slower_than_timeout_is_retryable_timeout() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/slow"))
        .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_millis(500)))
        .mount(&server)
        .await;

    let prober = Prober::new(20, 12).unwrap();
    let endpoint = bare_endpoint("a", format!("{}/slow", server.uri()), 200, 1);

    let outcome = prober.probe(&endpoint, 1).await;

    assert!(!outcome.success);
    assert!(outcome.retryable);
    assert!(outcome.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn endpoint_removed_from_persistence_mid_flight_evicts_stale_registry_entry() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/ok"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let registry = Arc::new(Registry::new());
    registry.on_create(new_endpoint("a", "user-1", &format!("{}/ok", server.uri())));

    // The registry still holds the endpoint (as it would mid-flight right
    // after dispatch), but persistence has nothing for it — as if a
    // concurrent `on_delete` had already removed the row backing it.
    let persistence: Arc<dyn PersistenceBackend> = Arc::new(InMemoryBackend::new());

    let notifier = NotifierHandle::spawn(persistence.clone(), Arc::new(NoopEmailProvider), 60);
    let (queue_tx, queue_rx) = mpsc::unbounded_channel::<QueueEntry>();
    let queue_size = Arc::new(AtomicUsize::new(0));
    let prober = Arc::new(Prober::new(20, 12).unwrap());

    let workers = WorkerPool::spawn(
        1,
        queue_rx,
        queue_size,
        registry.clone(),
        prober,
        persistence,
        notifier.sender(),
        0,
    );

    queue_tx
        .send(QueueEntry {
            endpoint_id: "a".to_string(),
            scheduled_at: chrono::Utc::now(),
        })
        .unwrap();

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        if registry.get("a").is_none() {
            break;
        }
        if tokio::time::Instant::now() >= deadline {
            panic!("stale registry entry was never evicted after the foreign-key violation");
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }

    workers.shutdown().await;
    notifier.shutdown().await;
}
