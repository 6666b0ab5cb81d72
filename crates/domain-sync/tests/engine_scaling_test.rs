//! End-to-end scaling tests for the engine
//!
//! Run with: cargo test -p domain-sync --test engine_scaling_test
//!
//! These tests use real time on a multi-threaded runtime, so assertions are
//! written against ranges and eventual states rather than exact timings.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use domain_sync::prelude::*;
use domain_sync::{SharedDocumentGenerator, SharedRequestGenerator};

// ============================================
// Helpers
// ============================================

fn name(domain: &str) -> DomainName {
    DomainName::new(domain).unwrap()
}

fn identity(domain: DomainName, n: usize) -> Result<RequestIdentity, GeneratorError> {
    RequestIdentity::new(domain, n.to_string(), "usize")
        .map_err(|e| GeneratorError::non_retryable(e.to_string()))
}

/// Yields a new request on every call, forever
fn endless_requests() -> SharedRequestGenerator {
    let counter = Arc::new(AtomicUsize::new(0));
    request_generator_fn(move |domain| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move { Ok(Some(SyncRequest::new(identity(domain, n)?))) }
    })
}

/// Yields `limit` requests, then nothing forever
fn limited_requests(limit: usize) -> SharedRequestGenerator {
    let counter = Arc::new(AtomicUsize::new(0));
    request_generator_fn(move |domain| {
        let n = counter.fetch_add(1, Ordering::SeqCst);
        async move {
            if n >= limit {
                tokio::time::sleep(Duration::from_millis(1)).await;
                return Ok(None);
            }
            Ok(Some(SyncRequest::new(identity(domain, n)?)))
        }
    })
}

/// Never yields a request
fn no_requests() -> SharedRequestGenerator {
    request_generator_fn(|_| async {
        tokio::time::sleep(Duration::from_millis(1)).await;
        Ok(None)
    })
}

/// Takes `delay` per document and counts processing per identity
fn recording_documents(
    delay: Duration,
    seen: Arc<Mutex<HashMap<String, usize>>>,
) -> SharedDocumentGenerator {
    document_generator_fn(move |request: SyncRequest| {
        let seen = Arc::clone(&seen);
        async move {
            tokio::time::sleep(delay).await;
            *seen
                .lock()
                .entry(request.identity.identity.clone())
                .or_insert(0) += 1;
            let payload = serde_json::json!({ "identity": request.identity.identity });
            Ok(DocumentResult::new(request, payload))
        }
    })
}

fn slow_documents(delay: Duration) -> SharedDocumentGenerator {
    recording_documents(delay, Arc::new(Mutex::new(HashMap::new())))
}

fn policy(
    domain: &str,
    min: usize,
    max: usize,
    requests: SharedRequestGenerator,
    documents: SharedDocumentGenerator,
) -> DomainPolicy {
    DomainPolicy::builder(name(domain))
        .with_workers(min, max)
        .with_request_generator(requests)
        .with_document_generator(documents)
        .build()
        .unwrap()
}

fn quiet_engine(policies: Vec<DomainPolicy>) -> Engine {
    Engine::builder()
        .observer(NoopObserver)
        .domains(policies)
        .start()
        .unwrap()
}

async fn wait_for(timeout: Duration, mut condition: impl FnMut() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if condition() {
            return true;
        }
        if tokio::time::Instant::now() >= deadline {
            return false;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
}

// ============================================
// Construction
// ============================================

#[test]
fn test_max_below_min_fails_before_engine_exists() {
    let err = DomainPolicy::builder(name("Patient"))
        .with_workers(5, 2)
        .with_request_generator(no_requests())
        .with_document_generator(slow_documents(Duration::ZERO))
        .build()
        .unwrap_err();

    assert_eq!(err, PolicyError::MaxBelowMin { min: 5, max: 2 });
}

#[tokio::test]
async fn test_empty_policy_set_fails() {
    let err = Engine::builder().start().unwrap_err();
    assert!(matches!(err, EngineError::NoDomains));
}

// ============================================
// Scaling scenarios
// ============================================

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_steady_load_stays_within_bounds() {
    let patient = name("Patient");
    let engine = quiet_engine(vec![policy(
        "Patient",
        2,
        5,
        endless_requests(),
        slow_documents(Duration::from_millis(50)),
    )]);

    let mut max_backlog = 0;
    let mut max_live = 0;
    let start = tokio::time::Instant::now();
    while start.elapsed() < Duration::from_millis(500) {
        let stats = engine.stats(&patient).unwrap();
        assert!(stats.live_workers >= 2, "dropped below floor: {stats:?}");
        assert!(stats.live_workers <= 5, "exceeded ceiling: {stats:?}");
        assert!(stats.backlog <= 5, "backlog exceeded ceiling: {stats:?}");
        max_backlog = max_backlog.max(stats.backlog);
        max_live = max_live.max(stats.live_workers);
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    let stats = engine.stats(&patient).unwrap();
    assert!((2..=5).contains(&stats.live_workers));
    assert!(stats.processed > 0);
    if max_backlog > 2 {
        assert!(max_live > 2, "backlog reached {max_backlog} but pool never grew");
    }

    engine.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_burst_converges_to_ceiling_and_throttles() {
    let claims = name("Claims");
    let engine = quiet_engine(vec![policy(
        "Claims",
        1,
        4,
        endless_requests(),
        slow_documents(Duration::from_secs(2)),
    )]);

    // Four workers each hold one request, four more are queued
    assert!(
        wait_for(Duration::from_secs(2), || {
            let stats = engine.stats(&claims).unwrap();
            stats.live_workers == 4 && stats.backlog == 4
        })
        .await
    );

    // While documents are stuck the puller must not enqueue anything else
    let before = engine.stats(&claims).unwrap();
    tokio::time::sleep(Duration::from_millis(200)).await;
    let after = engine.stats(&claims).unwrap();
    assert_eq!(before.enqueued, after.enqueued);
    assert_eq!(after.enqueued, 8);
    assert_eq!(after.live_workers, 4);
    assert_eq!(after.spawned, 4);

    engine.cancel();
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_drained_backlog_shrinks_to_floor() {
    let orders = name("Orders");
    let engine = quiet_engine(vec![policy(
        "Orders",
        2,
        6,
        limited_requests(40),
        slow_documents(Duration::from_millis(10)),
    )]);

    assert!(
        wait_for(Duration::from_secs(5), || {
            engine.stats(&orders).unwrap().processed == 40
        })
        .await
    );
    assert!(engine.stats(&orders).unwrap().spawned > 2);

    assert!(
        wait_for(Duration::from_secs(2), || {
            engine.live_ranks(&orders).unwrap() == vec![1, 2]
        })
        .await,
        "elastic workers did not retire: {:?}",
        engine.live_ranks(&orders)
    );

    engine.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_idle_domain_settles_at_floor() {
    let audit = name("Audit");
    let engine = quiet_engine(vec![policy(
        "Audit",
        3,
        8,
        no_requests(),
        slow_documents(Duration::ZERO),
    )]);

    tokio::time::sleep(Duration::from_millis(200)).await;
    let stats = engine.stats(&audit).unwrap();
    assert_eq!(stats.live_workers, 3);
    assert_eq!(stats.enqueued, 0);
    assert_eq!(engine.live_ranks(&audit), Some(vec![1, 2, 3]));

    engine.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_every_request_processed_exactly_once() {
    let ledger = name("Ledger");
    let seen = Arc::new(Mutex::new(HashMap::new()));
    let engine = quiet_engine(vec![policy(
        "Ledger",
        2,
        8,
        limited_requests(500),
        recording_documents(Duration::from_millis(1), Arc::clone(&seen)),
    )]);

    assert!(
        wait_for(Duration::from_secs(10), || {
            engine.stats(&ledger).unwrap().processed == 500
        })
        .await
    );
    tokio::time::sleep(Duration::from_millis(50)).await;

    let seen = seen.lock();
    assert_eq!(seen.len(), 500);
    assert!(seen.values().all(|count| *count == 1));
    assert_eq!(engine.stats(&ledger).unwrap().processed, 500);
}

// ============================================
// Failure isolation
// ============================================

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_failing_domain_does_not_affect_others() {
    let broken = name("Broken");
    let healthy = name("Healthy");
    let failing_documents = document_generator_fn(|_request: SyncRequest| async {
        tokio::time::sleep(Duration::from_millis(2)).await;
        Err(GeneratorError::non_retryable("renderer unavailable"))
    });

    let engine = quiet_engine(vec![
        policy("Broken", 1, 3, endless_requests(), failing_documents),
        policy(
            "Healthy",
            1,
            3,
            limited_requests(30),
            slow_documents(Duration::from_millis(2)),
        ),
    ]);

    assert!(
        wait_for(Duration::from_secs(5), || {
            engine.stats(&healthy).unwrap().processed == 30
        })
        .await
    );

    let stats = engine.stats(&broken).unwrap();
    assert!(stats.failed > 1, "failed workers were not replaced: {stats:?}");
    assert_eq!(stats.processed, 0);
    assert!(stats.live_workers <= 3);
    assert_eq!(engine.is_producing(&broken), Some(true));

    engine.shutdown(Duration::from_secs(5)).await.unwrap();
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_producer_halts_after_retry_budget() {
    let feed = name("Feed");
    let requests = request_generator_fn(|_| async { Err(GeneratorError::retryable("feed down")) });
    let config = EngineConfig::new()
        .with_producer_retry(RetryPolicy::fixed(Duration::from_millis(5), 3));

    let engine = Engine::builder()
        .config(config)
        .observer(NoopObserver)
        .domain(policy("Feed", 1, 2, requests, slow_documents(Duration::ZERO)))
        .start()
        .unwrap();

    assert!(
        wait_for(Duration::from_secs(2), || {
            engine.is_producing(&feed) == Some(false)
        })
        .await
    );
    // Floor workers keep running even though nothing will arrive
    assert_eq!(engine.live_ranks(&feed), Some(vec![1]));

    engine.shutdown(Duration::from_secs(5)).await.unwrap();
}

// ============================================
// Shutdown
// ============================================

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 4))]
async fn test_shutdown_token_stops_all_domains() {
    let token = CancellationToken::new();
    let engine = Engine::builder()
        .observer(NoopObserver)
        .shutdown_token(token.clone())
        .domain(policy(
            "A",
            2,
            4,
            endless_requests(),
            slow_documents(Duration::from_millis(5)),
        ))
        .domain(policy("B", 1, 1, no_requests(), slow_documents(Duration::ZERO)))
        .start()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();
    assert!(engine.is_cancelled());

    let stopped = wait_for(Duration::from_secs(2), || {
        engine.all_stats().iter().all(|s| s.live_workers == 0)
    })
    .await;
    assert!(stopped);
    engine.shutdown(Duration::from_secs(1)).await.unwrap();
}

#[test_log::test(tokio::test(flavor = "multi_thread", worker_threads = 2))]
async fn test_shutdown_times_out_on_stuck_document() {
    let engine = quiet_engine(vec![policy(
        "Stuck",
        1,
        1,
        limited_requests(1),
        slow_documents(Duration::from_secs(30)),
    )]);

    let stuck = name("Stuck");
    assert!(
        wait_for(Duration::from_secs(2), || {
            let stats = engine.stats(&stuck).unwrap();
            stats.enqueued == 1 && stats.backlog == 0
        })
        .await
    );

    let err = engine
        .shutdown(Duration::from_millis(100))
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ShutdownTimeout { remaining: 1 }));
}
