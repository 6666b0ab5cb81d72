//! Per-domain request queue
//!
//! The only hand-off point between a domain's puller and its workers. Backed
//! by a crossbeam MPMC channel: `try_dequeue` is atomic and exclusive, so a
//! request is handed to exactly one worker even when several race for it.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender, TryRecvError};
use tokio::sync::Notify;

use crate::domain::SyncRequest;

/// Concurrent FIFO of pending requests
pub struct RequestQueue {
    tx: Sender<SyncRequest>,
    rx: Receiver<SyncRequest>,
    ready: Notify,
    enqueued: AtomicU64,
    dequeued: AtomicU64,
}

impl RequestQueue {
    pub fn new() -> Self {
        let (tx, rx) = crossbeam_channel::unbounded();
        Self {
            tx,
            rx,
            ready: Notify::new(),
            enqueued: AtomicU64::new(0),
            dequeued: AtomicU64::new(0),
        }
    }

    /// Append a request and wake one idle worker
    pub fn enqueue(&self, request: SyncRequest) {
        // The queue owns its receiver, so the channel can never be disconnected.
        if self.tx.send(request).is_ok() {
            self.enqueued.fetch_add(1, Ordering::Relaxed);
            self.ready.notify_one();
        }
    }

    /// Take the oldest request, if any
    pub fn try_dequeue(&self) -> Option<SyncRequest> {
        match self.rx.try_recv() {
            Ok(request) => {
                self.dequeued.fetch_add(1, Ordering::Relaxed);
                Some(request)
            }
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Current backlog
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }

    /// Total requests ever enqueued
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Total requests ever dequeued
    pub fn dequeued(&self) -> u64 {
        self.dequeued.load(Ordering::Relaxed)
    }

    /// Park until a request is enqueued or `timeout` elapses
    ///
    /// A wake-up does not guarantee the caller wins the next dequeue.
    pub async fn wait_for_work(&self, timeout: Duration) {
        let _ = tokio::time::timeout(timeout, self.ready.notified()).await;
    }
}

impl Default for RequestQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RequestQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("backlog", &self.len())
            .field("enqueued", &self.enqueued())
            .field("dequeued", &self.dequeued())
            .finish()
    }
}
