//! Request puller
//!
//! One long-lived loop per domain that feeds the queue and triggers growth.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument};

use super::pool::WorkerPool;
use super::scaling;
use crate::reliability::RetryPolicy;

/// Producer loop of one domain
///
/// Alternates between producing (backlog below the ceiling) and sleeping
/// (backlog at the ceiling). Every accepted request is followed by a
/// rebalance, which is the only way the pool ever grows.
pub(crate) struct Puller {
    pool: Arc<WorkerPool>,
    poll_interval: Duration,
    retry: RetryPolicy,
    shutdown: CancellationToken,
}

/// How a puller loop ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PullerExit {
    Shutdown,
    Halted,
}

impl Puller {
    pub(crate) fn new(
        pool: Arc<WorkerPool>,
        poll_interval: Duration,
        retry: RetryPolicy,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            pool,
            poll_interval,
            retry,
            shutdown,
        }
    }

    #[instrument(name = "puller", skip(self), fields(domain = %self.pool.domain()))]
    pub(crate) async fn run(self) -> PullerExit {
        let domain = self.pool.domain().clone();
        let queue = Arc::clone(self.pool.queue());
        let generator = Arc::clone(self.pool.policy().request_generator());
        let observer = Arc::clone(self.pool.observer());
        let max_workers = self.pool.policy().max_workers();
        let mut failures: u32 = 0;

        info!(%domain, max_backlog = max_workers, "Puller started");

        let exit = loop {
            if self.shutdown.is_cancelled() {
                break PullerExit::Shutdown;
            }

            let backlog = queue.len();
            if scaling::is_throttled(backlog, max_workers) {
                observer.throttled(&domain, backlog);
                if self.sleep(self.poll_interval).await {
                    break PullerExit::Shutdown;
                }
                continue;
            }

            let next = tokio::select! {
                next = generator.next_request(&domain) => next,
                _ = self.shutdown.cancelled() => break PullerExit::Shutdown,
            };

            match next {
                Ok(Some(request)) => {
                    failures = 0;
                    queue.enqueue(request);
                    self.pool.rebalance();
                }
                Ok(None) => {
                    failures = 0;
                    tokio::task::yield_now().await;
                }
                Err(error) => {
                    failures = failures.saturating_add(1);
                    observer.producer_failed(&domain, &error, failures);

                    if !error.retryable || !self.retry.has_attempts_remaining(failures) {
                        observer.producer_halted(&domain, failures);
                        break PullerExit::Halted;
                    }
                    if self.sleep(self.retry.delay_for_failure(failures)).await {
                        break PullerExit::Shutdown;
                    }
                }
            }
        };

        debug!(%domain, ?exit, "Puller exited");
        exit
    }

    /// Sleep for `duration`; returns true if shutdown was requested meanwhile
    async fn sleep(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(duration) => false,
            _ = self.shutdown.cancelled() => true,
        }
    }
}
