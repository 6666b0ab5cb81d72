//! Worker execution loop

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use tracing::{instrument, trace};

use super::handle::{WorkerExit, WorkerHandle};
use super::pool::WorkerPool;
use super::scaling;
use crate::domain::SyncRequest;
use crate::generator::GeneratorError;

/// A single worker bound to one rank of a pool
pub(crate) struct Worker {
    pool: Arc<WorkerPool>,
    handle: WorkerHandle,
}

impl Worker {
    pub(crate) fn new(pool: Arc<WorkerPool>, handle: WorkerHandle) -> Self {
        Self { pool, handle }
    }

    /// Run until the worker decides to retire
    ///
    /// The rank is released by a guard, so an aborted task or a panicking
    /// document generator still frees it for the next rebalance.
    #[instrument(
        name = "worker",
        skip(self),
        fields(domain = %self.handle.domain(), rank = self.handle.rank())
    )]
    pub(crate) async fn run(self) {
        let mut registration = Registration {
            pool: Arc::clone(&self.pool),
            handle: self.handle.clone(),
            exit: None,
        };
        let exit = match AssertUnwindSafe(self.work()).catch_unwind().await {
            Ok(exit) => exit,
            Err(_) => WorkerExit::Panicked,
        };
        registration.exit = Some(exit);
    }

    async fn work(&self) -> WorkerExit {
        let queue = Arc::clone(self.pool.queue());
        let shutdown = self.pool.shutdown_token().clone();
        let min_workers = self.pool.policy().min_workers();
        let rank = self.handle.rank();

        loop {
            if shutdown.is_cancelled() {
                return WorkerExit::Shutdown;
            }

            let took_request = match queue.try_dequeue() {
                Some(request) => {
                    if self.process(request).await.is_err() {
                        return WorkerExit::Failed;
                    }
                    true
                }
                None => false,
            };

            let backlog = queue.len();
            if !scaling::should_continue(rank, min_workers, backlog) {
                trace!(backlog, "Backlog below rank, retiring");
                return WorkerExit::Idle;
            }

            if took_request {
                tokio::task::yield_now().await;
            } else {
                tokio::select! {
                    _ = queue.wait_for_work(self.pool.idle_wait()) => {}
                    _ = shutdown.cancelled() => return WorkerExit::Shutdown,
                }
            }
        }
    }

    async fn process(&self, request: SyncRequest) -> Result<(), GeneratorError> {
        let generator = self.pool.policy().document_generator();
        match generator.generate(request.clone()).await {
            Ok(document) => {
                self.pool.record_processed();
                self.pool
                    .observer()
                    .document_generated(&self.handle, &document);
                Ok(())
            }
            Err(error) => {
                self.pool.record_failed();
                self.pool
                    .observer()
                    .document_failed(&self.handle, &request, &error);
                Err(error)
            }
        }
    }
}

/// Keeps a rank registered for as long as the worker future is alive
struct Registration {
    pool: Arc<WorkerPool>,
    handle: WorkerHandle,
    exit: Option<WorkerExit>,
}

impl Drop for Registration {
    fn drop(&mut self) {
        // No recorded exit: the task was aborted or the runtime is shutting down
        let exit = self.exit.unwrap_or(WorkerExit::Shutdown);
        if self.pool.deregister(&self.handle) {
            self.pool.observer().worker_exited(&self.handle, exit);
        }
    }
}
