//! Per-domain worker pool
//!
//! Owns the live-worker map of one domain and the growth side of the
//! scaling policy. Shrinking is left to the workers themselves.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

use super::handle::{WorkerHandle, WorkerSlot};
use super::runner::Worker;
use super::scaling;
use crate::domain::DomainName;
use crate::observer::SharedObserver;
use crate::policy::DomainPolicy;
use crate::queue::RequestQueue;

/// Point-in-time view of a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DomainStats {
    pub domain: DomainName,
    pub min_workers: usize,
    pub max_workers: usize,
    /// Workers currently registered
    pub live_workers: usize,
    /// Requests waiting in the queue
    pub backlog: usize,
    /// Requests accepted from the generator
    pub enqueued: u64,
    /// Documents generated successfully
    pub processed: u64,
    /// Document generations that failed
    pub failed: u64,
    /// Workers started since the engine came up
    pub spawned: u64,
    /// Registration time of the longest-running live worker
    pub oldest_worker_since: Option<DateTime<Utc>>,
}

/// Dynamic set of workers serving one domain
pub struct WorkerPool {
    policy: DomainPolicy,
    queue: Arc<RequestQueue>,
    live: DashMap<WorkerHandle, WorkerSlot>,
    observer: SharedObserver,
    idle_wait: Duration,
    shutdown: CancellationToken,
    runtime: Handle,
    processed: AtomicU64,
    failed: AtomicU64,
    spawned: AtomicU64,
}

impl WorkerPool {
    pub(crate) fn new(
        policy: DomainPolicy,
        queue: Arc<RequestQueue>,
        observer: SharedObserver,
        idle_wait: Duration,
        shutdown: CancellationToken,
        runtime: Handle,
    ) -> Arc<Self> {
        Arc::new(Self {
            policy,
            queue,
            live: DashMap::new(),
            observer,
            idle_wait,
            shutdown,
            runtime,
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            spawned: AtomicU64::new(0),
        })
    }

    pub fn domain(&self) -> &DomainName {
        self.policy.name()
    }

    pub fn policy(&self) -> &DomainPolicy {
        &self.policy
    }

    pub fn queue(&self) -> &Arc<RequestQueue> {
        &self.queue
    }

    pub(crate) fn observer(&self) -> &SharedObserver {
        &self.observer
    }

    pub(crate) fn idle_wait(&self) -> Duration {
        self.idle_wait
    }

    pub(crate) fn shutdown_token(&self) -> &CancellationToken {
        &self.shutdown
    }

    /// Number of registered workers
    pub fn live_workers(&self) -> usize {
        self.live.len()
    }

    /// Ranks of the registered workers, ascending
    pub fn live_ranks(&self) -> Vec<usize> {
        let mut ranks: Vec<usize> = self.live.iter().map(|entry| entry.key().rank()).collect();
        ranks.sort_unstable();
        ranks
    }

    /// Registration time of the longest-running live worker
    pub fn oldest_worker_since(&self) -> Option<DateTime<Utc>> {
        self.live.iter().map(|entry| entry.value().spawned_at).min()
    }

    /// Snapshot of the pool and its queue
    pub fn stats(&self) -> DomainStats {
        DomainStats {
            domain: self.domain().clone(),
            min_workers: self.policy.min_workers(),
            max_workers: self.policy.max_workers(),
            live_workers: self.live_workers(),
            backlog: self.queue.len(),
            enqueued: self.queue.enqueued(),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            spawned: self.spawned.load(Ordering::Relaxed),
            oldest_worker_since: self.oldest_worker_since(),
        }
    }

    /// Grow the pool until it matches the policy and the current backlog
    ///
    /// Growth only. Counts are re-read on every pass because workers may be
    /// retiring concurrently. Returns the number of workers started.
    #[instrument(level = "trace", skip(self), fields(domain = %self.domain()))]
    pub fn rebalance(self: &Arc<Self>) -> usize {
        let before = self.live_workers();
        let mut started = 0;

        loop {
            if self.shutdown.is_cancelled() {
                break;
            }

            let live = self.live.len();
            let backlog = self.queue.len();
            if !scaling::should_grow(
                live,
                backlog,
                self.policy.min_workers(),
                self.policy.max_workers(),
            ) {
                break;
            }

            let Some(handle) = self.claim_rank(live) else {
                break;
            };
            self.start_worker(handle);
            started += 1;
        }

        if started > 0 {
            let after = self.live_workers();
            debug!(domain = %self.domain(), from = before, to = after, started, "Rebalanced");
            self.observer.pool_grew(self.domain(), before, after);
        }

        started
    }

    /// Register the lowest vacant rank in `1..=live + 1`
    ///
    /// Only rebalance inserts into the map, so at most `live` ranks are taken
    /// and one of the first `live + 1` is always free.
    fn claim_rank(&self, live: usize) -> Option<WorkerHandle> {
        for rank in 1..=live + 1 {
            let handle = WorkerHandle::new(self.domain().clone(), rank);
            if let Entry::Vacant(vacant) = self.live.entry(handle.clone()) {
                vacant.insert(WorkerSlot::now());
                return Some(handle);
            }
        }
        None
    }

    fn start_worker(self: &Arc<Self>, handle: WorkerHandle) {
        self.spawned.fetch_add(1, Ordering::Relaxed);
        self.observer.worker_spawned(&handle);
        let worker = Worker::new(Arc::clone(self), handle);
        self.runtime.spawn(worker.run());
    }

    /// Remove a worker from the live map
    pub(crate) fn deregister(&self, handle: &WorkerHandle) -> bool {
        self.live.remove(handle).is_some()
    }

    pub(crate) fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }
}

impl std::fmt::Debug for WorkerPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerPool")
            .field("domain", self.domain())
            .field("live_ranks", &self.live_ranks())
            .field("backlog", &self.queue.len())
            .finish_non_exhaustive()
    }
}
