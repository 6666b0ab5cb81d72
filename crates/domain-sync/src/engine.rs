//! Engine assembly
//!
//! The [`Engine`] validates the domain set, builds one queue, one worker pool
//! and one puller per domain, and starts them. After that it only offers
//! read-only inspection and shutdown; it never touches queues or pools.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::config::EngineConfig;
use crate::domain::DomainName;
use crate::observer::{EngineObserver, SharedObserver, TracingObserver};
use crate::policy::{DomainPolicy, PolicyError};
use crate::queue::RequestQueue;
use crate::worker::{DomainStats, Puller, PullerExit, WorkerPool};

/// Engine construction and shutdown errors
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Empty policy set
    #[error("at least one domain policy is required")]
    NoDomains,

    /// Two policies share a domain name
    #[error("domain '{0}' is configured more than once")]
    DuplicateDomain(DomainName),

    /// Invalid domain policy
    #[error("invalid domain policy: {0}")]
    Policy(#[from] PolicyError),

    /// Not called from within a tokio runtime
    #[error("the engine must be started from within a tokio runtime")]
    NoRuntime,

    /// Post-spawn consistency check failed
    #[error("engine startup check failed: {0}")]
    Startup(String),

    /// Workers still running when the shutdown deadline passed
    #[error("shutdown timed out with {remaining} workers still running")]
    ShutdownTimeout { remaining: usize },
}

struct DomainRuntime {
    pool: Arc<WorkerPool>,
    puller: Option<JoinHandle<PullerExit>>,
}

/// Elastic multi-domain scheduler
///
/// # Example
///
/// ```ignore
/// use domain_sync::prelude::*;
///
/// let policy = DomainPolicy::builder(DomainName::new("Patient")?)
///     .with_workers(2, 5)
///     .with_request_generator(requests)
///     .with_document_generator(documents)
///     .build()?;
///
/// let engine = Engine::builder()
///     .config(EngineConfig::from_env())
///     .domain(policy)
///     .start()?;
///
/// // ... later
/// engine.shutdown(Duration::from_secs(30)).await?;
/// ```
pub struct Engine {
    domains: BTreeMap<DomainName, DomainRuntime>,
    shutdown: CancellationToken,
}

impl Engine {
    pub fn builder() -> EngineBuilder {
        EngineBuilder::default()
    }

    /// Start an engine with default configuration and the tracing observer
    pub fn start(policies: impl IntoIterator<Item = DomainPolicy>) -> Result<Self, EngineError> {
        Self::builder().domains(policies).start()
    }

    /// Configured domains, in name order
    pub fn domains(&self) -> impl Iterator<Item = &DomainName> {
        self.domains.keys()
    }

    pub fn domain_count(&self) -> usize {
        self.domains.len()
    }

    /// Snapshot of one domain
    pub fn stats(&self, domain: &DomainName) -> Option<DomainStats> {
        self.domains.get(domain).map(|d| d.pool.stats())
    }

    /// Snapshots of every domain, in name order
    pub fn all_stats(&self) -> Vec<DomainStats> {
        self.domains.values().map(|d| d.pool.stats()).collect()
    }

    /// Ranks of the live workers of a domain, ascending
    pub fn live_ranks(&self, domain: &DomainName) -> Option<Vec<usize>> {
        self.domains.get(domain).map(|d| d.pool.live_ranks())
    }

    /// Whether the domain's puller is still producing
    pub fn is_producing(&self, domain: &DomainName) -> Option<bool> {
        self.domains.get(domain).map(|d| {
            d.puller
                .as_ref()
                .is_some_and(|handle| !handle.is_finished())
        })
    }

    /// Ask every puller and worker to stop without waiting for them
    pub fn cancel(&self) {
        self.shutdown.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Stop producing, let in-flight documents finish, wait for all workers
    #[instrument(skip(self))]
    pub async fn shutdown(mut self, timeout: Duration) -> Result<(), EngineError> {
        info!(domains = self.domains.len(), "Initiating engine shutdown");
        self.shutdown.cancel();

        let deadline = tokio::time::Instant::now() + timeout;

        for (name, domain) in self.domains.iter_mut() {
            if let Some(handle) = domain.puller.take() {
                match tokio::time::timeout_at(deadline, handle).await {
                    Ok(Ok(exit)) => debug!(domain = %name, ?exit, "Puller joined"),
                    Ok(Err(e)) => warn!(domain = %name, error = %e, "Puller task failed"),
                    Err(_) => warn!(domain = %name, "Puller did not stop before deadline"),
                }
            }
        }

        loop {
            let remaining: usize = self
                .domains
                .values()
                .map(|d| d.pool.live_workers())
                .sum();
            if remaining == 0 {
                debug!("All workers stopped");
                break;
            }

            if tokio::time::Instant::now() >= deadline {
                warn!(remaining, "Shutdown timeout reached");
                return Err(EngineError::ShutdownTimeout { remaining });
            }

            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        info!("Engine stopped");
        Ok(())
    }

    /// Post-spawn consistency check
    fn verify_started(&self, expected: usize) -> Result<(), EngineError> {
        let pools = self.domains.len();
        let pullers = self
            .domains
            .values()
            .filter(|d| d.puller.is_some())
            .count();

        if pullers != expected {
            return Err(EngineError::Startup(format!(
                "{pullers} pullers started for {expected} domains"
            )));
        }
        if pools != expected {
            return Err(EngineError::Startup(format!(
                "{pools} worker pools created for {expected} domains"
            )));
        }
        Ok(())
    }
}

impl Drop for Engine {
    fn drop(&mut self) {
        self.shutdown.cancel();
        for domain in self.domains.values_mut() {
            if let Some(handle) = domain.puller.take() {
                handle.abort();
            }
        }
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("domains", &self.domains.keys().collect::<Vec<_>>())
            .field("cancelled", &self.shutdown.is_cancelled())
            .finish()
    }
}

/// Builder for [`Engine`]
#[must_use]
pub struct EngineBuilder {
    config: EngineConfig,
    observer: SharedObserver,
    shutdown: Option<CancellationToken>,
    policies: Vec<DomainPolicy>,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self {
            config: EngineConfig::default(),
            observer: Arc::new(TracingObserver),
            shutdown: None,
            policies: Vec::new(),
        }
    }
}

impl EngineBuilder {
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn observer(mut self, observer: impl EngineObserver) -> Self {
        self.observer = Arc::new(observer);
        self
    }

    pub fn shared_observer(mut self, observer: SharedObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Stop the engine when `token` is cancelled
    ///
    /// The engine works on a child token, so dropping or shutting down the
    /// engine never cancels the caller's token.
    pub fn shutdown_token(mut self, token: CancellationToken) -> Self {
        self.shutdown = Some(token);
        self
    }

    pub fn domain(mut self, policy: DomainPolicy) -> Self {
        self.policies.push(policy);
        self
    }

    pub fn domains(mut self, policies: impl IntoIterator<Item = DomainPolicy>) -> Self {
        self.policies.extend(policies);
        self
    }

    /// Validate the domain set and start every domain
    ///
    /// Nothing is spawned unless validation succeeds.
    #[instrument(skip(self), fields(domains = self.policies.len()))]
    pub fn start(self) -> Result<Engine, EngineError> {
        if self.policies.is_empty() {
            return Err(EngineError::NoDomains);
        }

        let mut policies = BTreeMap::new();
        for policy in self.policies {
            let name = policy.name().clone();
            if policies.contains_key(&name) {
                return Err(EngineError::DuplicateDomain(name));
            }
            policies.insert(name, policy);
        }

        let runtime = Handle::try_current().map_err(|_| EngineError::NoRuntime)?;
        let shutdown = self
            .shutdown
            .map(|token| token.child_token())
            .unwrap_or_default();
        let expected = policies.len();

        let mut engine = Engine {
            domains: BTreeMap::new(),
            shutdown: shutdown.clone(),
        };

        for (name, policy) in policies {
            info!(
                domain = %name,
                min_workers = policy.min_workers(),
                max_workers = policy.max_workers(),
                sync_target = policy.sync_target().map(|t| t.kind()),
                "Starting domain"
            );

            let pool = WorkerPool::new(
                policy,
                Arc::new(RequestQueue::new()),
                Arc::clone(&self.observer),
                self.config.idle_wait,
                shutdown.clone(),
                runtime.clone(),
            );
            // Floor workers exist before the first request arrives
            pool.rebalance();

            let floor = pool.policy().min_workers();
            if pool.live_workers() < floor {
                return Err(EngineError::Startup(format!(
                    "domain '{}' started {} of {} floor workers",
                    name,
                    pool.live_workers(),
                    floor
                )));
            }

            engine.domains.insert(name, DomainRuntime { pool, puller: None });
        }

        for domain in engine.domains.values_mut() {
            let puller = Puller::new(
                Arc::clone(&domain.pool),
                self.config.poll_interval,
                self.config.producer_retry.clone(),
                shutdown.clone(),
            );
            domain.puller = Some(runtime.spawn(puller.run()));
        }

        engine.verify_started(expected)?;

        info!(domains = engine.domain_count(), "Engine started");
        Ok(engine)
    }
}
