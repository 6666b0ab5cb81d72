//! Domain value types
//!
//! The data that flows through the engine: domain names, synchronization
//! requests and the documents produced from them.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Error for an empty identifier
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} must not be empty")]
pub struct EmptyNameError {
    /// Which value was empty
    pub field: &'static str,
}

/// Name of a domain
///
/// Non-empty and cheap to clone; used as the key for every per-domain
/// collection owned by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DomainName(Arc<str>);

impl DomainName {
    /// Create a domain name, rejecting empty strings
    pub fn new(name: impl AsRef<str>) -> Result<Self, EmptyNameError> {
        let name = name.as_ref();
        if name.is_empty() {
            return Err(EmptyNameError {
                field: "domain_name",
            });
        }
        Ok(Self(Arc::from(name)))
    }

    /// Borrow the name
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for DomainName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for DomainName {
    type Error = EmptyNameError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for DomainName {
    type Error = EmptyNameError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<DomainName> for String {
    fn from(value: DomainName) -> Self {
        value.0.to_string()
    }
}

/// Where finished documents of a domain are synchronized to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncTarget {
    /// Blob storage reachable at `url`
    Blob { url: String },
}

impl SyncTarget {
    /// Blob storage target, rejecting an empty URL
    pub fn blob(url: impl Into<String>) -> Result<Self, EmptyNameError> {
        let url = url.into();
        if url.is_empty() {
            return Err(EmptyNameError { field: "sync_url" });
        }
        Ok(Self::Blob { url })
    }

    /// Short label used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Blob { .. } => "blob",
        }
    }
}

/// Identity of the record a request refers to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RequestIdentity {
    /// Domain the record belongs to
    pub domain: DomainName,

    /// Opaque record identity (for example a primary key)
    pub identity: String,

    /// Label describing the identity's type (for example `"i64"` or `"uuid"`)
    pub identity_type: String,
}

impl RequestIdentity {
    /// Create an identity; both strings must be non-empty
    pub fn new(
        domain: DomainName,
        identity: impl Into<String>,
        identity_type: impl Into<String>,
    ) -> Result<Self, EmptyNameError> {
        let identity = identity.into();
        let identity_type = identity_type.into();
        if identity.is_empty() {
            return Err(EmptyNameError { field: "identity" });
        }
        if identity_type.is_empty() {
            return Err(EmptyNameError {
                field: "identity_type",
            });
        }
        Ok(Self {
            domain,
            identity,
            identity_type,
        })
    }
}

/// A pending synchronization request
///
/// Created by a request generator, consumed by exactly one worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncRequest {
    /// What is being synchronized
    pub identity: RequestIdentity,

    /// When the request was produced
    pub requested_at: DateTime<Utc>,
}

impl SyncRequest {
    /// Create a request stamped with the current time
    pub fn new(identity: RequestIdentity) -> Self {
        Self {
            identity,
            requested_at: Utc::now(),
        }
    }

    /// Create a request with an explicit timestamp
    pub fn at(identity: RequestIdentity, requested_at: DateTime<Utc>) -> Self {
        Self {
            identity,
            requested_at,
        }
    }

    /// Domain this request belongs to
    pub fn domain(&self) -> &DomainName {
        &self.identity.domain
    }
}

/// Document produced from a request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentResult {
    /// The request the document was generated for
    pub request: SyncRequest,

    /// Generated document body
    pub payload: serde_json::Value,
}

impl DocumentResult {
    pub fn new(request: SyncRequest, payload: serde_json::Value) -> Self {
        Self { request, payload }
    }
}
