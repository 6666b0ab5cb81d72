//! Engine event hooks
//!
//! The engine itself never prints anything; everything noteworthy is
//! reported to an [`EngineObserver`]. [`TracingObserver`] is the default and
//! turns events into structured log records.

use std::sync::Arc;

use tracing::{debug, error, info, trace, warn};

use crate::domain::{DocumentResult, DomainName, SyncRequest};
use crate::generator::GeneratorError;
use crate::worker::{WorkerExit, WorkerHandle};

/// Receives engine lifecycle events
///
/// All methods have empty default bodies. They are called inline from the
/// puller and worker tasks, so implementations should return quickly.
pub trait EngineObserver: Send + Sync + 'static {
    /// A worker was registered and started
    fn worker_spawned(&self, _worker: &WorkerHandle) {}

    /// A worker left the pool
    fn worker_exited(&self, _worker: &WorkerHandle, _reason: WorkerExit) {}

    /// A rebalance pass grew the pool
    fn pool_grew(&self, _domain: &DomainName, _from: usize, _to: usize) {}

    /// A document was generated successfully
    fn document_generated(&self, _worker: &WorkerHandle, _document: &DocumentResult) {}

    /// The document generator failed; the worker will exit
    fn document_failed(
        &self,
        _worker: &WorkerHandle,
        _request: &SyncRequest,
        _error: &GeneratorError,
    ) {
    }

    /// The request generator failed `failures` times in a row
    fn producer_failed(&self, _domain: &DomainName, _error: &GeneratorError, _failures: u32) {}

    /// The puller gave up after exhausting its retry budget
    fn producer_halted(&self, _domain: &DomainName, _failures: u32) {}

    /// The puller found the backlog at the ceiling and is backing off
    fn throttled(&self, _domain: &DomainName, _backlog: usize) {}
}

/// Shared observer handle
pub type SharedObserver = Arc<dyn EngineObserver>;

/// Observer that ignores every event
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl EngineObserver for NoopObserver {}

/// Observer that logs events through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingObserver;

impl EngineObserver for TracingObserver {
    fn worker_spawned(&self, worker: &WorkerHandle) {
        debug!(domain = %worker.domain(), rank = worker.rank(), "Worker started");
    }

    fn worker_exited(&self, worker: &WorkerHandle, reason: WorkerExit) {
        match reason {
            WorkerExit::Panicked => {
                error!(domain = %worker.domain(), rank = worker.rank(), %reason, "Worker exited")
            }
            WorkerExit::Failed => {
                warn!(domain = %worker.domain(), rank = worker.rank(), %reason, "Worker exited")
            }
            WorkerExit::Idle | WorkerExit::Shutdown => {
                info!(domain = %worker.domain(), rank = worker.rank(), %reason, "Worker exited")
            }
        }
    }

    fn pool_grew(&self, domain: &DomainName, from: usize, to: usize) {
        info!(%domain, from, to, "Worker pool grew");
    }

    fn document_generated(&self, worker: &WorkerHandle, document: &DocumentResult) {
        trace!(
            domain = %worker.domain(),
            rank = worker.rank(),
            identity = %document.request.identity.identity,
            "Document generated"
        );
    }

    fn document_failed(
        &self,
        worker: &WorkerHandle,
        request: &SyncRequest,
        error: &GeneratorError,
    ) {
        error!(
            domain = %worker.domain(),
            rank = worker.rank(),
            identity = %request.identity.identity,
            error = %error,
            "Document generation failed"
        );
    }

    fn producer_failed(&self, domain: &DomainName, error: &GeneratorError, failures: u32) {
        warn!(%domain, failures, error = %error, "Request generation failed");
    }

    fn producer_halted(&self, domain: &DomainName, failures: u32) {
        error!(%domain, failures, "Request generation halted after repeated failures");
    }

    fn throttled(&self, domain: &DomainName, backlog: usize) {
        trace!(%domain, backlog, "Backlog at ceiling, puller sleeping");
    }
}
