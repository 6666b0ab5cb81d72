//! Per-domain scheduling
//!
//! This module provides:
//! - [`WorkerPool`] - live-worker map of one domain plus the growth policy
//! - the puller, one producer loop per domain
//! - the worker loop, which decides on its own when to retire
//! - [`scaling`] - the pure growth/shrink rules both sides share
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                     Domain "Patient"                         │
//! │  ┌─────────────┐   enqueue    ┌──────────────────────────┐   │
//! │  │   Puller    │ ───────────► │      RequestQueue        │   │
//! │  │ (throttles  │              │  (backlog <= max_workers)│   │
//! │  │  at ceiling)│              └────────────┬─────────────┘   │
//! │  └──────┬──────┘                           │ try_dequeue     │
//! │         │ rebalance (growth only)          ▼                 │
//! │         ▼                   ┌──────────────────────────┐     │
//! │  ┌─────────────┐   spawn    │ Worker #1 .. #min (floor)│     │
//! │  │ WorkerPool  │ ─────────► │ Worker #min+1 .. (elastic│     │
//! │  │ (DashMap)   │ ◄───────── │  retire when rank >      │     │
//! │  └─────────────┘ deregister │  backlog)                │     │
//! │                             └──────────────────────────┘     │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod handle;
mod pool;
mod puller;
mod runner;
pub mod scaling;

pub use handle::{WorkerExit, WorkerHandle, WorkerSlot};
pub use pool::{DomainStats, WorkerPool};
pub(crate) use puller::{Puller, PullerExit};
