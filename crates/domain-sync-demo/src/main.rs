mod telemetry;

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use domain_sync::prelude::*;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::telemetry::{init_telemetry, TelemetryConfig};

// =============================================================================
// Configuration
// =============================================================================

/// Demo process configuration
#[derive(Debug, Clone)]
struct DemoConfig {
    domain: String,
    min_workers: usize,
    max_workers: usize,
    sync_url: String,
    request_latency: Duration,
    document_latency: Duration,
    /// Stop producing after this many requests; unlimited when `None`
    request_budget: Option<i64>,
    stats_interval: Duration,
    shutdown_timeout: Duration,
}

impl Default for DemoConfig {
    fn default() -> Self {
        Self {
            domain: "Patient".to_string(),
            min_workers: 2,
            max_workers: 5,
            sync_url: "https://blobstore.local/patient-documents".to_string(),
            request_latency: Duration::from_millis(5),
            document_latency: Duration::from_millis(50),
            request_budget: None,
            stats_interval: Duration::from_secs(1),
            shutdown_timeout: Duration::from_secs(30),
        }
    }
}

impl DemoConfig {
    /// Create configuration from environment variables
    ///
    /// Environment variables:
    /// - `DEMO_DOMAIN`: Domain name (default: "Patient")
    /// - `DEMO_MIN_WORKERS` / `DEMO_MAX_WORKERS`: Pool bounds (default: 2 / 5)
    /// - `DEMO_SYNC_URL`: Blob target URL
    /// - `DEMO_REQUEST_LATENCY_MS`: Delay per produced request (default: 5)
    /// - `DEMO_DOCUMENT_LATENCY_MS`: Delay per generated document (default: 50)
    /// - `DEMO_REQUEST_BUDGET`: Total requests to produce (default: unlimited)
    /// - `DEMO_STATS_INTERVAL_MS`: Stats reporting interval (default: 1000)
    fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            domain: std::env::var("DEMO_DOMAIN").unwrap_or(defaults.domain),
            min_workers: env_parse("DEMO_MIN_WORKERS").unwrap_or(defaults.min_workers),
            max_workers: env_parse("DEMO_MAX_WORKERS").unwrap_or(defaults.max_workers),
            sync_url: std::env::var("DEMO_SYNC_URL").unwrap_or(defaults.sync_url),
            request_latency: env_parse("DEMO_REQUEST_LATENCY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_latency),
            document_latency: env_parse("DEMO_DOCUMENT_LATENCY_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.document_latency),
            request_budget: env_parse("DEMO_REQUEST_BUDGET").or(defaults.request_budget),
            stats_interval: env_parse("DEMO_STATS_INTERVAL_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.stats_interval),
            shutdown_timeout: defaults.shutdown_timeout,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.parse().ok())
}

// =============================================================================
// Generators
// =============================================================================

/// Produces requests with increasing integer identities
struct CounterRequests {
    next: AtomicI64,
    budget: Option<i64>,
    latency: Duration,
}

impl CounterRequests {
    fn new(budget: Option<i64>, latency: Duration) -> Self {
        Self {
            next: AtomicI64::new(1),
            budget,
            latency,
        }
    }
}

#[async_trait]
impl RequestGenerator for CounterRequests {
    async fn next_request(
        &self,
        domain: &DomainName,
    ) -> Result<Option<SyncRequest>, GeneratorError> {
        tokio::time::sleep(self.latency).await;

        let id = self.next.load(Ordering::Relaxed);
        if self.budget.is_some_and(|budget| id > budget) {
            return Ok(None);
        }
        self.next.store(id + 1, Ordering::Relaxed);

        let identity = RequestIdentity::new(domain.clone(), id.to_string(), "i64")
            .map_err(|e| GeneratorError::non_retryable(e.to_string()))?;
        Ok(Some(SyncRequest::new(identity)))
    }
}

/// Renders each request as a small JSON document
struct JsonDocuments {
    latency: Duration,
}

#[async_trait]
impl DocumentGenerator for JsonDocuments {
    async fn generate(&self, request: SyncRequest) -> Result<DocumentResult, GeneratorError> {
        tokio::time::sleep(self.latency).await;

        let payload = serde_json::json!({
            "document_id": Uuid::now_v7(),
            "domain": request.domain().as_str(),
            "identity": request.identity.identity,
            "identity_type": request.identity.identity_type,
            "requested_at": request.requested_at,
        });
        Ok(DocumentResult::new(request, payload))
    }
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    // Configure via environment variables:
    // - RUST_LOG or LOG_LEVEL: Log filter (default: "domain_sync=debug")
    // - DEMO_*: see DemoConfig::from_env
    // - DOMAIN_SYNC_*: see EngineConfig::from_env
    if let Ok(path) = dotenvy::dotenv() {
        eprintln!("Loaded .env from {:?}", path);
    }

    init_telemetry(TelemetryConfig::from_env());

    let config = DemoConfig::from_env();
    let engine_config = EngineConfig::from_env();

    tracing::info!(
        domain = %config.domain,
        min_workers = config.min_workers,
        max_workers = config.max_workers,
        request_budget = ?config.request_budget,
        "domain-sync-demo starting..."
    );

    let domain = DomainName::new(&config.domain).context("Invalid DEMO_DOMAIN")?;
    let target = SyncTarget::blob(&config.sync_url).context("Invalid DEMO_SYNC_URL")?;

    let policy = DomainPolicy::builder(domain.clone())
        .with_workers(config.min_workers, config.max_workers)
        .with_sync_target(target)
        .with_request_generator(Arc::new(CounterRequests::new(
            config.request_budget,
            config.request_latency,
        )))
        .with_document_generator(Arc::new(JsonDocuments {
            latency: config.document_latency,
        }))
        .build()
        .context("Invalid domain policy")?;

    let shutdown = CancellationToken::new();
    let engine = Engine::builder()
        .config(engine_config)
        .shutdown_token(shutdown.clone())
        .domain(policy)
        .start()
        .context("Failed to start engine")?;

    let mut stats_tick = tokio::time::interval(config.stats_interval);
    loop {
        tokio::select! {
            _ = stats_tick.tick() => {
                for stats in engine.all_stats() {
                    tracing::info!(
                        domain = %stats.domain,
                        live_workers = stats.live_workers,
                        backlog = stats.backlog,
                        processed = stats.processed,
                        failed = stats.failed,
                        oldest_worker_since = ?stats.oldest_worker_since,
                        "Engine stats"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received shutdown signal");
                shutdown.cancel();
                break;
            }
        }
    }

    engine
        .shutdown(config.shutdown_timeout)
        .await
        .context("Engine did not shut down cleanly")?;

    tracing::info!(domain = %domain, "Demo shutdown complete");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn patient() -> DomainName {
        DomainName::new("Patient").unwrap()
    }

    #[tokio::test]
    async fn test_counter_requests_respect_budget() {
        let generator = CounterRequests::new(Some(2), Duration::ZERO);
        let domain = patient();

        let first = generator.next_request(&domain).await.unwrap().unwrap();
        let second = generator.next_request(&domain).await.unwrap().unwrap();
        assert_eq!(first.identity.identity, "1");
        assert_eq!(second.identity.identity, "2");
        assert!(generator.next_request(&domain).await.unwrap().is_none());
        assert!(generator.next_request(&domain).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_json_document_carries_identity() {
        let generator = JsonDocuments {
            latency: Duration::ZERO,
        };
        let identity = RequestIdentity::new(patient(), "42", "i64").unwrap();

        let document = generator.generate(SyncRequest::new(identity)).await.unwrap();
        assert_eq!(document.payload["domain"], "Patient");
        assert_eq!(document.payload["identity"], "42");
        assert_eq!(document.payload["identity_type"], "i64");
    }

    #[test]
    fn test_default_config_matches_patient_domain() {
        let config = DemoConfig::default();
        assert_eq!(config.domain, "Patient");
        assert_eq!((config.min_workers, config.max_workers), (2, 5));
        assert!(config.request_budget.is_none());
    }
}
