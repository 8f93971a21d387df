//! The uniform Store contract (spec §6) consumed by every caller.

use crate::document::{CollectionInfo, Document, SearchResult};
use crate::error::Result;
use crate::filter::FilterMap;
use crate::isolation::IsolationMode;
use crate::tenant::OpContext;
use async_trait::async_trait;

/// The reserved metadata/filter keys a tenant scope occupies. Exactly these
/// three per spec §3 — callers may never set them directly.
pub const RESERVED_TENANT_KEYS: &[&str] = &["tenant_id", "team_id", "project_id"];

/// Maximum number of results a caller may request from a search.
pub const MAX_SEARCH_K: usize = 10_000;
/// Maximum query length in characters.
pub const MAX_QUERY_CHARS: usize = 10_000;

/// The uniform operation surface every backend (remote, local) and the
/// Fallback Store implement.
///
/// Validation rules at the boundary (spec §6): `k` must be positive and
/// capped at [`MAX_SEARCH_K`]; `query` must be non-empty and at most
/// [`MAX_QUERY_CHARS`] characters; `collection` must match
/// `^[a-z0-9_]{1,64}$`; `filters` must not contain reserved tenant keys.
/// Implementations are expected to validate these themselves since the
/// trait has no default-method enforcement point that runs before isolation
/// injection.
#[async_trait]
pub trait Store: Send + Sync {
    /// Add documents to the default (or per-document-overridden) collection.
    /// Returns the assigned ids, in input order.
    async fn add_documents(&self, ctx: &OpContext, docs: Vec<Document>) -> Result<Vec<String>>;

    /// Semantic search against the default collection.
    async fn search(&self, ctx: &OpContext, query: &str, k: usize) -> Result<Vec<SearchResult>>;

    /// Semantic search with an additional metadata filter.
    async fn search_with_filters(
        &self,
        ctx: &OpContext,
        query: &str,
        k: usize,
        filters: FilterMap,
    ) -> Result<Vec<SearchResult>>;

    /// Semantic search scoped to a named collection.
    async fn search_in_collection(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Forces the brute-force search path (bypasses any ANN index).
    async fn exact_search(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>>;

    /// Delete documents by id from the default collection.
    async fn delete_documents(&self, ctx: &OpContext, ids: Vec<String>) -> Result<()>;

    /// Delete documents by id from a named collection.
    async fn delete_documents_from_collection(
        &self,
        ctx: &OpContext,
        collection: &str,
        ids: Vec<String>,
    ) -> Result<()>;

    /// Create a collection with the given vector size.
    async fn create_collection(
        &self,
        ctx: &OpContext,
        name: &str,
        vector_size: usize,
    ) -> Result<()>;

    /// Delete a collection.
    async fn delete_collection(&self, ctx: &OpContext, name: &str) -> Result<()>;

    /// Check whether a collection exists.
    async fn collection_exists(&self, ctx: &OpContext, name: &str) -> Result<bool>;

    /// List all collection names.
    async fn list_collections(&self, ctx: &OpContext) -> Result<Vec<String>>;

    /// Fetch admin info about a collection.
    async fn get_collection_info(&self, ctx: &OpContext, name: &str) -> Result<CollectionInfo>;

    /// Switch the active isolation mode. Deprecated: prefer config-time
    /// selection; kept for callers that must flip modes at runtime (tests).
    fn set_isolation_mode(&self, mode: IsolationMode);

    /// The currently active isolation mode.
    fn isolation_mode(&self) -> IsolationMode;

    /// Stop all background work and release resources. Implementations
    /// aggregate sub-component errors rather than stopping at the first.
    async fn close(&self) -> Result<()>;
}

/// Validate `k` and `query` against the boundary rules in spec §6.
pub fn validate_search_args(query: &str, k: usize) -> Result<()> {
    use crate::error::ContextdError;
    if k == 0 {
        return Err(ContextdError::OversizedInput("k must be positive".into()));
    }
    if k > MAX_SEARCH_K {
        return Err(ContextdError::OversizedInput(format!(
            "k={k} exceeds max {MAX_SEARCH_K}"
        )));
    }
    if query.is_empty() {
        return Err(ContextdError::OversizedInput("query must not be empty".into()));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(ContextdError::OversizedInput(format!(
            "query exceeds max {MAX_QUERY_CHARS} characters"
        )));
    }
    Ok(())
}
