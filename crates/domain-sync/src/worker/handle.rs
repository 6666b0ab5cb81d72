//! Worker identity

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::DomainName;

/// Identity of a live worker
///
/// `rank` is 1-based and unique among the live workers of a domain. Ranks up
/// to the domain's `min_workers` are floor workers, higher ranks are elastic.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct WorkerHandle {
    domain: DomainName,
    rank: usize,
}

impl WorkerHandle {
    pub(crate) fn new(domain: DomainName, rank: usize) -> Self {
        debug_assert!(rank >= 1, "worker ranks are 1-based");
        Self { domain, rank }
    }

    pub fn domain(&self) -> &DomainName {
        &self.domain
    }

    /// Sequence number assigned at spawn
    pub fn rank(&self) -> usize {
        self.rank
    }
}

impl fmt::Display for WorkerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.domain, self.rank)
    }
}

/// Bookkeeping stored for each live worker
#[derive(Debug, Clone)]
pub struct WorkerSlot {
    /// When the worker was registered
    pub spawned_at: DateTime<Utc>,
}

impl WorkerSlot {
    pub(crate) fn now() -> Self {
        Self {
            spawned_at: Utc::now(),
        }
    }
}

/// Why a worker left its pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerExit {
    /// Elastic worker whose rank exceeded the backlog
    Idle,
    /// The document generator returned an error
    Failed,
    /// The document generator panicked
    Panicked,
    /// Engine shut down or the task was aborted
    Shutdown,
}

impl fmt::Display for WorkerExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Failed => write!(f, "failed"),
            Self::Panicked => write!(f, "panicked"),
            Self::Shutdown => write!(f, "shutdown"),
        }
    }
}
