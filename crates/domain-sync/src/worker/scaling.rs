//! Scaling rules
//!
//! Pure decision functions shared by the pool (growth) and the workers
//! (shrink). They take plain counts so they can be checked in isolation from
//! any concurrency.

/// Whether rebalance should add one more worker
///
/// Below the floor the pool always grows. Between floor and ceiling it grows
/// only while the backlog outnumbers the live workers.
pub fn should_grow(live: usize, backlog: usize, min_workers: usize, max_workers: usize) -> bool {
    if live < min_workers {
        return true;
    }
    live < max_workers && backlog > live
}

/// Whether a worker of `rank` keeps running after observing `backlog`
///
/// Floor ranks never stop. An elastic rank keeps running only while the
/// backlog is at least as large as its rank, so the highest ranks retire
/// first as the queue drains.
pub fn should_continue(rank: usize, min_workers: usize, backlog: usize) -> bool {
    rank <= min_workers || rank <= backlog
}

/// Whether the puller must hold off producing
pub fn is_throttled(backlog: usize, max_workers: usize) -> bool {
    backlog >= max_workers
}
