//! # Domain Sync Engine
//!
//! An elastic, multi-tenant worker-pool scheduler for document synchronization.
//!
//! For every configured domain the engine runs one request puller and a pool of
//! document workers whose size follows the backlog between a floor and a
//! ceiling.
//!
//! ## Features
//!
//! - **Backlog-driven growth**: the puller rebalances the pool after every request it enqueues
//! - **Decentralized shrink**: elastic workers retire themselves once the backlog drops below their rank
//! - **Backpressure**: a domain never holds more pending requests than its worker ceiling
//! - **Isolation**: each domain has its own queue, pool and puller; failures stay local
//! - **Observability**: every lifecycle event goes to an [`EngineObserver`], logged via `tracing` by default
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                          Engine                              │
//! │   (validates policies, starts one bundle per domain)        │
//! └─────────────────────────────────────────────────────────────┘
//!                              │
//!                              ▼
//! ┌─────────────────────────────────────────────────────────────┐
//! │        Puller ──► RequestQueue ──► Workers (WorkerPool)     │
//! │   (request generator)              (document generator)     │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use domain_sync::prelude::*;
//!
//! let requests = request_generator_fn(|domain| async move {
//!     let identity = RequestIdentity::new(domain, next_id(), "i64")?;
//!     Ok(Some(SyncRequest::new(identity)))
//! });
//! let documents = document_generator_fn(|request| async move {
//!     let payload = render(&request).await?;
//!     Ok(DocumentResult::new(request, payload))
//! });
//!
//! let policy = DomainPolicy::builder(DomainName::new("Patient")?)
//!     .with_workers(2, 5)
//!     .with_request_generator(requests)
//!     .with_document_generator(documents)
//!     .build()?;
//!
//! let engine = Engine::start([policy])?;
//! ```

pub mod config;
pub mod domain;
pub mod engine;
pub mod generator;
pub mod observer;
pub mod policy;
pub mod queue;
pub mod reliability;
pub mod worker;

mod serde_util;

/// Prelude for common imports
pub mod prelude {
    pub use crate::config::EngineConfig;
    pub use crate::domain::{DocumentResult, DomainName, RequestIdentity, SyncRequest, SyncTarget};
    pub use crate::engine::{Engine, EngineBuilder, EngineError};
    pub use crate::generator::{
        document_generator_fn, request_generator_fn, DocumentGenerator, GeneratorError,
        RequestGenerator,
    };
    pub use crate::observer::{EngineObserver, NoopObserver, TracingObserver};
    pub use crate::policy::{DomainPolicy, PolicyError};
    pub use crate::reliability::RetryPolicy;
    pub use crate::worker::{DomainStats, WorkerExit, WorkerHandle};
}

// Re-export key types at crate root
pub use config::EngineConfig;
pub use domain::{DocumentResult, DomainName, EmptyNameError, RequestIdentity, SyncRequest, SyncTarget};
pub use engine::{Engine, EngineBuilder, EngineError};
pub use generator::{
    document_generator_fn, request_generator_fn, DocumentGenerator, GeneratorError,
    RequestGenerator, SharedDocumentGenerator, SharedRequestGenerator,
};
pub use observer::{EngineObserver, NoopObserver, SharedObserver, TracingObserver};
pub use policy::{DomainPolicy, DomainPolicyBuilder, PolicyError};
pub use queue::RequestQueue;
pub use reliability::RetryPolicy;
pub use worker::{DomainStats, WorkerExit, WorkerHandle, WorkerPool};
