//! Reliability primitives
//!
//! Backoff policy applied when a domain's request generator fails.

mod retry;

pub use retry::RetryPolicy;
