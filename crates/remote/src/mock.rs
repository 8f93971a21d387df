//! An in-memory stand-in for the real remote vector database, used in
//! `contextd-store`'s integration tests (spec §8, Properties 6/7).

use async_trait::async_trait;
use contextd_core::filter::FilterMap;
use contextd_core::store::validate_search_args;
use contextd_core::{
    document::validate_collection_name, CollectionInfo, ContextdError, Document, IsolationMode,
    Result, SearchResult, Store,
};
use contextd_core::tenant::OpContext;
use contextd_sync::RemoteSync;
use parking_lot::Mutex;
use std::collections::BTreeMap;

#[derive(Debug, Clone)]
struct StoredDoc {
    content: String,
    metadata: contextd_core::document::Metadata,
}

struct CollectionState {
    vector_size: usize,
    docs: BTreeMap<String, StoredDoc>,
}

/// An in-process `Store` + `RemoteSync` implementation with no persistence,
/// no network I/O, and an injectable failure mode for failover tests.
pub struct MockRemoteStore {
    collections: Mutex<BTreeMap<String, CollectionState>>,
    default_collection: String,
    isolation_mode: Mutex<IsolationMode>,
    fail_next: std::sync::atomic::AtomicUsize,
}

impl MockRemoteStore {
    /// Construct an empty mock store.
    pub fn new() -> Self {
        Self {
            collections: Mutex::new(BTreeMap::new()),
            default_collection: "default".to_string(),
            isolation_mode: Mutex::new(IsolationMode::default()),
            fail_next: std::sync::atomic::AtomicUsize::new(0),
        }
    }

    /// Make the next `n` write/search calls fail with a transient error,
    /// simulating a remote outage for failover tests.
    pub fn fail_next_calls(&self, n: usize) {
        self.fail_next.store(n, std::sync::atomic::Ordering::SeqCst);
    }

    fn maybe_fail(&self) -> Result<()> {
        let remaining = self.fail_next.load(std::sync::atomic::Ordering::SeqCst);
        if remaining > 0 {
            self.fail_next.fetch_sub(1, std::sync::atomic::Ordering::SeqCst);
            return Err(ContextdError::Transient("mock remote unavailable".into()));
        }
        Ok(())
    }

    fn upsert_into(&self, collection: &str, docs: Vec<Document>) -> Vec<String> {
        let mut collections = self.collections.lock();
        let state = collections
            .entry(collection.to_string())
            .or_insert_with(|| CollectionState { vector_size: 0, docs: BTreeMap::new() });
        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = doc.id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            state.docs.insert(
                id.clone(),
                StoredDoc {
                    content: doc.content,
                    metadata: doc.metadata,
                },
            );
            ids.push(id);
        }
        ids
    }
}

impl Default for MockRemoteStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSync for MockRemoteStore {
    async fn upsert_documents(&self, docs: Vec<Document>) -> Result<Vec<String>> {
        self.maybe_fail()?;
        Ok(self.upsert_into(&self.default_collection.clone(), docs))
    }

    async fn delete_documents(&self, ids: Vec<String>) -> Result<()> {
        self.maybe_fail()?;
        let mut collections = self.collections.lock();
        if let Some(state) = collections.get_mut(&self.default_collection) {
            for id in ids {
                state.docs.remove(&id);
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Store for MockRemoteStore {
    async fn add_documents(&self, ctx: &OpContext, docs: Vec<Document>) -> Result<Vec<String>> {
        self.maybe_fail()?;
        let mode = *self.isolation_mode.lock();
        let tenant = ctx.tenant().ok();
        mode.validate(tenant)?;
        let docs = mode.inject_metadata(docs, tenant)?;
        let collection = docs
            .iter()
            .find_map(|d| d.collection.clone())
            .unwrap_or_else(|| self.default_collection.clone());
        Ok(self.upsert_into(&collection, docs))
    }

    async fn search(&self, ctx: &OpContext, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.search_with_filters(ctx, query, k, FilterMap::new()).await
    }

    async fn search_with_filters(
        &self,
        ctx: &OpContext,
        query: &str,
        k: usize,
        filters: FilterMap,
    ) -> Result<Vec<SearchResult>> {
        self.maybe_fail()?;
        validate_search_args(query, k)?;
        let mode = *self.isolation_mode.lock();
        let tenant = ctx.tenant().ok();
        mode.validate(tenant)?;
        let filters = mode.inject_filter(filters, tenant)?;

        let collections = self.collections.lock();
        let Some(state) = collections.get(&self.default_collection) else {
            return Ok(Vec::new());
        };
        let mut results: Vec<SearchResult> = state
            .docs
            .iter()
            .filter(|(_, d)| filters.iter().all(|(k, v)| d.metadata.get(k) == Some(v)))
            .filter(|(_, d)| d.content.to_lowercase().contains(&query.to_lowercase()))
            .map(|(id, d)| SearchResult {
                id: id.clone(),
                content: d.content.clone(),
                score: 1.0,
                metadata: d.metadata.clone(),
            })
            .collect();
        results.truncate(k);
        Ok(results)
    }

    async fn search_in_collection(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        if !validate_collection_name(collection) {
            return Err(ContextdError::InvalidCollectionName(collection.to_string()));
        }
        self.search_with_filters(ctx, query, k, FilterMap::new()).await
    }

    async fn exact_search(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        self.search_in_collection(ctx, collection, query, k).await
    }

    async fn delete_documents(&self, _ctx: &OpContext, ids: Vec<String>) -> Result<()> {
        RemoteSync::delete_documents(self, ids).await
    }

    async fn delete_documents_from_collection(
        &self,
        _ctx: &OpContext,
        collection: &str,
        ids: Vec<String>,
    ) -> Result<()> {
        self.maybe_fail()?;
        let mut collections = self.collections.lock();
        if let Some(state) = collections.get_mut(collection) {
            for id in ids {
                state.docs.remove(&id);
            }
        }
        Ok(())
    }

    async fn create_collection(
        &self,
        _ctx: &OpContext,
        name: &str,
        vector_size: usize,
    ) -> Result<()> {
        if !validate_collection_name(name) {
            return Err(ContextdError::InvalidCollectionName(name.to_string()));
        }
        let mut collections = self.collections.lock();
        if collections.contains_key(name) {
            return Err(ContextdError::CollectionExists(name.to_string()));
        }
        collections.insert(name.to_string(), CollectionState { vector_size, docs: BTreeMap::new() });
        Ok(())
    }

    async fn delete_collection(&self, _ctx: &OpContext, name: &str) -> Result<()> {
        self.collections.lock().remove(name);
        Ok(())
    }

    async fn collection_exists(&self, _ctx: &OpContext, name: &str) -> Result<bool> {
        Ok(self.collections.lock().contains_key(name))
    }

    async fn list_collections(&self, _ctx: &OpContext) -> Result<Vec<String>> {
        Ok(self.collections.lock().keys().cloned().collect())
    }

    async fn get_collection_info(&self, _ctx: &OpContext, name: &str) -> Result<CollectionInfo> {
        let collections = self.collections.lock();
        let state = collections
            .get(name)
            .ok_or_else(|| ContextdError::CollectionNotFound(name.to_string()))?;
        Ok(CollectionInfo {
            name: name.to_string(),
            point_count: state.docs.len() as u64,
            vector_size: state.vector_size,
        })
    }

    fn set_isolation_mode(&self, mode: IsolationMode) {
        *self.isolation_mode.lock() = mode;
    }

    fn isolation_mode(&self) -> IsolationMode {
        *self.isolation_mode.lock()
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextd_core::{TenantContext, TenantId};

    #[tokio::test]
    async fn fail_next_calls_injects_transient_errors() {
        let store = MockRemoteStore::new();
        store.fail_next_calls(1);
        let ctx = OpContext::with_tenant(TenantContext::new(TenantId::new("org-1").unwrap()));
        let err = store
            .add_documents(&ctx, vec![Document::new("x").with_id("d1")])
            .await
            .unwrap_err();
        assert!(err.is_transient());

        let ids = store
            .add_documents(&ctx, vec![Document::new("x").with_id("d1")])
            .await
            .unwrap();
        assert_eq!(ids, vec!["d1"]);
    }
}
