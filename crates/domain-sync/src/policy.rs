//! Per-domain scheduling policy
//!
//! A [`DomainPolicy`] is immutable once built. All validation happens in
//! [`DomainPolicyBuilder::build`], so an invalid policy never exists.

use std::fmt;

use crate::domain::{DomainName, SyncTarget};
use crate::generator::{SharedDocumentGenerator, SharedRequestGenerator};

/// Policy validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PolicyError {
    /// Floor below one worker
    #[error("min_workers must be at least 1, got {0}")]
    MinWorkersTooSmall(usize),

    /// Ceiling below floor
    #[error("max_workers ({max}) must not be less than min_workers ({min})")]
    MaxBelowMin { min: usize, max: usize },

    /// No request generator configured
    #[error("request_generator is required")]
    MissingRequestGenerator,

    /// No document generator configured
    #[error("document_generator is required")]
    MissingDocumentGenerator,
}

impl PolicyError {
    /// Name of the offending field
    pub fn field(&self) -> &'static str {
        match self {
            Self::MinWorkersTooSmall(_) => "min_workers",
            Self::MaxBelowMin { .. } => "max_workers",
            Self::MissingRequestGenerator => "request_generator",
            Self::MissingDocumentGenerator => "document_generator",
        }
    }
}

/// Scheduling policy of one domain
#[derive(Clone)]
pub struct DomainPolicy {
    name: DomainName,
    min_workers: usize,
    max_workers: usize,
    request_generator: SharedRequestGenerator,
    document_generator: SharedDocumentGenerator,
    sync_target: Option<SyncTarget>,
}

impl DomainPolicy {
    /// Start building a policy for `name`
    pub fn builder(name: DomainName) -> DomainPolicyBuilder {
        DomainPolicyBuilder::new(name)
    }

    pub fn name(&self) -> &DomainName {
        &self.name
    }

    /// Number of permanent workers
    pub fn min_workers(&self) -> usize {
        self.min_workers
    }

    /// Upper bound on live workers, also the backlog ceiling
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub fn request_generator(&self) -> &SharedRequestGenerator {
        &self.request_generator
    }

    pub fn document_generator(&self) -> &SharedDocumentGenerator {
        &self.document_generator
    }

    pub fn sync_target(&self) -> Option<&SyncTarget> {
        self.sync_target.as_ref()
    }

    /// Whether a worker of this rank belongs to the permanent floor
    pub fn is_floor_rank(&self, rank: usize) -> bool {
        rank <= self.min_workers
    }
}

impl fmt::Debug for DomainPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DomainPolicy")
            .field("name", &self.name)
            .field("min_workers", &self.min_workers)
            .field("max_workers", &self.max_workers)
            .field("sync_target", &self.sync_target)
            .finish_non_exhaustive()
    }
}

/// Builder for [`DomainPolicy`]
///
/// # Example
///
/// ```ignore
/// let policy = DomainPolicy::builder(DomainName::new("Patient")?)
///     .with_workers(2, 5)
///     .with_request_generator(requests)
///     .with_document_generator(documents)
///     .with_sync_target(SyncTarget::blob("http://blob.local")?)
///     .build()?;
/// ```
#[must_use]
pub struct DomainPolicyBuilder {
    name: DomainName,
    min_workers: usize,
    max_workers: usize,
    request_generator: Option<SharedRequestGenerator>,
    document_generator: Option<SharedDocumentGenerator>,
    sync_target: Option<SyncTarget>,
}

impl DomainPolicyBuilder {
    /// New builder with a single permanent worker
    pub fn new(name: DomainName) -> Self {
        Self {
            name,
            min_workers: 1,
            max_workers: 1,
            request_generator: None,
            document_generator: None,
            sync_target: None,
        }
    }

    /// Set the worker floor and ceiling
    pub fn with_workers(mut self, min: usize, max: usize) -> Self {
        self.min_workers = min;
        self.max_workers = max;
        self
    }

    pub fn with_min_workers(mut self, min: usize) -> Self {
        self.min_workers = min;
        self
    }

    pub fn with_max_workers(mut self, max: usize) -> Self {
        self.max_workers = max;
        self
    }

    pub fn with_request_generator(mut self, generator: SharedRequestGenerator) -> Self {
        self.request_generator = Some(generator);
        self
    }

    pub fn with_document_generator(mut self, generator: SharedDocumentGenerator) -> Self {
        self.document_generator = Some(generator);
        self
    }

    pub fn with_sync_target(mut self, target: SyncTarget) -> Self {
        self.sync_target = Some(target);
        self
    }

    /// Validate and build the policy
    pub fn build(self) -> Result<DomainPolicy, PolicyError> {
        if self.max_workers < self.min_workers {
            return Err(PolicyError::MaxBelowMin {
                min: self.min_workers,
                max: self.max_workers,
            });
        }
        if self.min_workers < 1 {
            return Err(PolicyError::MinWorkersTooSmall(self.min_workers));
        }
        let request_generator = self
            .request_generator
            .ok_or(PolicyError::MissingRequestGenerator)?;
        let document_generator = self
            .document_generator
            .ok_or(PolicyError::MissingDocumentGenerator)?;

        Ok(DomainPolicy {
            name: self.name,
            min_workers: self.min_workers,
            max_workers: self.max_workers,
            request_generator,
            document_generator,
            sync_target: self.sync_target,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::DocumentResult;
    use crate::generator::{document_generator_fn, request_generator_fn};

    fn builder() -> DomainPolicyBuilder {
        DomainPolicy::builder(DomainName::new("Patient").unwrap())
            .with_request_generator(request_generator_fn(|_| async { Ok(None) }))
            .with_document_generator(document_generator_fn(|request| async move {
                Ok(DocumentResult::new(request, serde_json::Value::Null))
            }))
    }

    #[test]
    fn test_valid_policy() {
        let policy = builder().with_workers(2, 5).build().unwrap();
        assert_eq!(policy.min_workers(), 2);
        assert_eq!(policy.max_workers(), 5);
        assert!(policy.is_floor_rank(2));
        assert!(!policy.is_floor_rank(3));
        assert!(policy.sync_target().is_none());
    }

    #[test]
    fn test_max_below_min_rejected() {
        let err = builder().with_workers(4, 2).build().unwrap_err();
        assert_eq!(err, PolicyError::MaxBelowMin { min: 4, max: 2 });
        assert_eq!(err.field(), "max_workers");
    }

    #[test]
    fn test_bounds_set_separately() {
        let policy = builder()
            .with_max_workers(8)
            .with_min_workers(3)
            .build()
            .unwrap();
        assert_eq!((policy.min_workers(), policy.max_workers()), (3, 8));

        // Raising the floor alone keeps the default ceiling of one
        let err = builder().with_min_workers(2).build().unwrap_err();
        assert_eq!(err, PolicyError::MaxBelowMin { min: 2, max: 1 });
    }

    #[test]
    fn test_zero_min_rejected() {
        let err = builder().with_workers(0, 3).build().unwrap_err();
        assert_eq!(err, PolicyError::MinWorkersTooSmall(0));
        assert_eq!(err.field(), "min_workers");
    }

    #[test]
    fn test_missing_generators_rejected() {
        let name = DomainName::new("Patient").unwrap();
        let err = DomainPolicy::builder(name.clone()).build().unwrap_err();
        assert_eq!(err, PolicyError::MissingRequestGenerator);

        let err = DomainPolicy::builder(name)
            .with_request_generator(request_generator_fn(|_| async { Ok(None) }))
            .build()
            .unwrap_err();
        assert_eq!(err, PolicyError::MissingDocumentGenerator);
        assert_eq!(err.field(), "document_generator");
    }

    #[test]
    fn test_equal_bounds_allowed() {
        let policy = builder().with_workers(3, 3).build().unwrap();
        assert_eq!(policy.min_workers(), policy.max_workers());
    }
}
