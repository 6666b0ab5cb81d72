//! Pluggable request and document generators
//!
//! The engine knows nothing about how requests are discovered or how
//! documents are built. Both sides are supplied as trait objects, or as
//! closures through [`request_generator_fn`] and [`document_generator_fn`].

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::domain::{DocumentResult, DomainName, SyncRequest};

/// Error returned by a generator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GeneratorError {
    /// Error message
    pub message: String,

    /// Whether retrying the call may succeed
    ///
    /// Only consulted for request generators; a failed document is never retried.
    pub retryable: bool,
}

impl GeneratorError {
    /// Create a retryable error
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: true,
        }
    }

    /// Create a non-retryable error
    pub fn non_retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            retryable: false,
        }
    }
}

impl std::fmt::Display for GeneratorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for GeneratorError {}

impl From<anyhow::Error> for GeneratorError {
    fn from(err: anyhow::Error) -> Self {
        Self::retryable(err.to_string())
    }
}

/// Produces synchronization requests for a domain
///
/// Called in a loop by the domain's puller, never concurrently with itself.
/// Returning `Ok(None)` means nothing is pending right now.
///
/// # Example
///
/// ```ignore
/// struct ChangeFeed { /* ... */ }
///
/// #[async_trait]
/// impl RequestGenerator for ChangeFeed {
///     async fn next_request(
///         &self,
///         domain: &DomainName,
///     ) -> Result<Option<SyncRequest>, GeneratorError> {
///         let change = self.poll_change().await?;
///         Ok(change.map(|c| SyncRequest::new(c.identity(domain))))
///     }
/// }
/// ```
#[async_trait]
pub trait RequestGenerator: Send + Sync + 'static {
    async fn next_request(&self, domain: &DomainName)
        -> Result<Option<SyncRequest>, GeneratorError>;
}

/// Turns a request into a document
///
/// Called concurrently by every worker of a domain, so implementations must
/// tolerate parallel invocations.
#[async_trait]
pub trait DocumentGenerator: Send + Sync + 'static {
    async fn generate(&self, request: SyncRequest) -> Result<DocumentResult, GeneratorError>;
}

/// Shared request generator handle
pub type SharedRequestGenerator = Arc<dyn RequestGenerator>;

/// Shared document generator handle
pub type SharedDocumentGenerator = Arc<dyn DocumentGenerator>;

struct RequestGeneratorFn<F>(F);

#[async_trait]
impl<F, Fut> RequestGenerator for RequestGeneratorFn<F>
where
    F: Fn(DomainName) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<SyncRequest>, GeneratorError>> + Send + 'static,
{
    async fn next_request(
        &self,
        domain: &DomainName,
    ) -> Result<Option<SyncRequest>, GeneratorError> {
        (self.0)(domain.clone()).await
    }
}

struct DocumentGeneratorFn<F>(F);

#[async_trait]
impl<F, Fut> DocumentGenerator for DocumentGeneratorFn<F>
where
    F: Fn(SyncRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<DocumentResult, GeneratorError>> + Send + 'static,
{
    async fn generate(&self, request: SyncRequest) -> Result<DocumentResult, GeneratorError> {
        (self.0)(request).await
    }
}

/// Wrap an async closure as a request generator
///
/// ```ignore
/// let generator = request_generator_fn(|domain| async move {
///     Ok(Some(SyncRequest::new(RequestIdentity::new(domain, "1", "i64")?)))
/// });
/// ```
pub fn request_generator_fn<F, Fut>(f: F) -> SharedRequestGenerator
where
    F: Fn(DomainName) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<SyncRequest>, GeneratorError>> + Send + 'static,
{
    Arc::new(RequestGeneratorFn(f))
}

/// Wrap an async closure as a document generator
pub fn document_generator_fn<F, Fut>(f: F) -> SharedDocumentGenerator
where
    F: Fn(SyncRequest) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<DocumentResult, GeneratorError>> + Send + 'static,
{
    Arc::new(DocumentGeneratorFn(f))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::RequestIdentity;

    #[test]
    fn test_error_constructors() {
        assert!(GeneratorError::retryable("timeout").retryable);
        assert!(!GeneratorError::non_retryable("bad input").retryable);

        let err: GeneratorError = anyhow::anyhow!("connection reset").into();
        assert_eq!(err.to_string(), "connection reset");
        assert!(err.retryable);
    }

    #[tokio::test]
    async fn test_closure_adapters() {
        let requests = request_generator_fn(|domain| async move {
            let identity = RequestIdentity::new(domain, "7", "i64")
                .map_err(|e| GeneratorError::non_retryable(e.to_string()))?;
            Ok(Some(SyncRequest::new(identity)))
        });
        let documents = document_generator_fn(|request| async move {
            let payload = serde_json::json!({ "identity": request.identity.identity });
            Ok(DocumentResult::new(request, payload))
        });

        let domain = DomainName::new("Patient").unwrap();
        let request = requests.next_request(&domain).await.unwrap().unwrap();
        assert_eq!(request.identity.identity, "7");

        let document = documents.generate(request).await.unwrap();
        assert_eq!(document.payload["identity"], "7");
    }
}
