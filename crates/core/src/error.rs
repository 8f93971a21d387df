//! Error types for contextd
//!
//! A single `thiserror` enum is used across the workspace so that callers can
//! match on variants without caring which crate raised them. Tenancy and
//! validation errors are never wrapped or rewritten downstream — they are
//! returned as-is all the way to the caller.

use thiserror::Error;

/// Result type alias for contextd operations.
pub type Result<T> = std::result::Result<T, ContextdError>;

/// Coarse category of an error, for callers that want to branch on kind
/// without matching the full enum shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Tenant context missing, invalid, or a filter tried to smuggle it in.
    Tenancy,
    /// Malformed input (bad collection name, oversized query, empty batch).
    Validation,
    /// Resource state conflict (not found / already exists).
    Resource,
    /// Transport-level failure to a backend (transient or permanent).
    Transport,
    /// On-disk or on-wire integrity failure.
    Integrity,
}

/// Unified error type for all contextd operations.
#[derive(Debug, Error)]
pub enum ContextdError {
    /// No `TenantContext` was present in the operation context.
    #[error("missing tenant context")]
    MissingTenant,

    /// A `TenantContext` was present but failed validation (empty tenant id).
    #[error("invalid tenant: {0}")]
    InvalidTenant(String),

    /// A caller-supplied filter contained a reserved tenant key.
    #[error("filter contains reserved tenant key: {0}")]
    TenantFilterInUserFilters(String),

    /// `collectionName` does not match `^[a-z0-9_]{1,64}$`.
    #[error("invalid collection name: {0}")]
    InvalidCollectionName(String),

    /// A write batch was empty when at least one document was required.
    #[error("empty document batch")]
    EmptyDocuments,

    /// An entry or query exceeded a configured size/count limit.
    #[error("oversized input: {0}")]
    OversizedInput(String),

    /// The named collection does not exist.
    #[error("collection not found: {0}")]
    CollectionNotFound(String),

    /// The named collection already exists.
    #[error("collection already exists: {0}")]
    CollectionExists(String),

    /// Vector size on `CreateCollection` did not match the configured size.
    #[error("vector size mismatch: expected {expected}, got {actual}")]
    VectorSizeMismatch {
        /// Configured vector size for the collection.
        expected: usize,
        /// Vector size supplied by the caller.
        actual: usize,
    },

    /// Generating an embedding for a document or query failed.
    #[error("embedding failed: {0}")]
    EmbeddingFailed(String),

    /// A transient transport failure (unavailable, deadline-exceeded,
    /// aborted, resource-exhausted). Safe to retry and drives the circuit
    /// breaker's failure counter.
    #[error("transient transport error: {0}")]
    Transient(String),

    /// A permanent transport failure (invalid-argument, not-found,
    /// permission-denied, unauthenticated). Never retried.
    #[error("permanent transport error: {0}")]
    Permanent(String),

    /// A WAL entry or collection on disk failed an integrity check and was
    /// dropped or quarantined.
    #[error("integrity error: {0}")]
    Integrity(String),

    /// I/O failure underlying any of the above.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ContextdError {
    /// Coarse category for this error, for callers that branch on kind.
    pub fn kind(&self) -> ErrorKind {
        match self {
            ContextdError::MissingTenant
            | ContextdError::InvalidTenant(_)
            | ContextdError::TenantFilterInUserFilters(_) => ErrorKind::Tenancy,
            ContextdError::InvalidCollectionName(_)
            | ContextdError::EmptyDocuments
            | ContextdError::OversizedInput(_)
            | ContextdError::VectorSizeMismatch { .. } => ErrorKind::Validation,
            ContextdError::CollectionNotFound(_) | ContextdError::CollectionExists(_) => {
                ErrorKind::Resource
            }
            ContextdError::EmbeddingFailed(_)
            | ContextdError::Transient(_)
            | ContextdError::Permanent(_) => ErrorKind::Transport,
            ContextdError::Integrity(_) => ErrorKind::Integrity,
            ContextdError::Io(_) | ContextdError::Serialization(_) => ErrorKind::Integrity,
        }
    }

    /// Whether this transport error is transient (safe to retry, drives the
    /// circuit breaker's failure counter) per spec §4.4/§7.
    pub fn is_transient(&self) -> bool {
        matches!(self, ContextdError::Transient(_))
    }
}
