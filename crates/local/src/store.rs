//! The embedded `Store` implementation: documents and collection metadata
//! as files under a local base directory, with a brute-force text scorer
//! standing in for the real (out-of-scope) ANN index.

use crate::collection::{self, CollectionMetadata, DocumentRecord};
use async_trait::async_trait;
use contextd_core::filter::FilterMap;
use contextd_core::store::validate_search_args;
use contextd_core::{
    document::validate_collection_name, CollectionInfo, ContextdError, Document, IsolationMode,
    Result, SearchResult, Store,
};
use contextd_core::tenant::{OpContext, TenantContext};
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};

/// Configuration for a [`LocalStore`].
#[derive(Debug, Clone)]
pub struct LocalStoreConfig {
    /// Root directory holding one subdirectory per collection.
    pub base_path: PathBuf,
    /// Collection used when a document/search call doesn't override one.
    pub default_collection: String,
    /// Isolation mode this store enforces on its own operations.
    pub isolation_mode: IsolationMode,
}

impl LocalStoreConfig {
    /// Construct a config rooted at `base_path` with sensible defaults.
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
            default_collection: "default".to_string(),
            isolation_mode: IsolationMode::default(),
        }
    }
}

/// File-backed embedded `Store`. No external service, no network calls —
/// every operation is synchronous disk I/O wrapped in an `async fn` to
/// satisfy the trait.
pub struct LocalStore {
    base: PathBuf,
    default_collection: String,
    isolation_mode: RwLock<IsolationMode>,
}

impl LocalStore {
    /// Open (creating if absent) a local store rooted at `config.base_path`.
    ///
    /// Refuses to open over a base directory that already contains a
    /// collection directory with leftover document files but no metadata
    /// sidecar — that shape only arises from a crash or filesystem
    /// corruption mid-write, and silently treating it as an empty new
    /// collection would discard the orphaned documents for good. Callers
    /// that want to recover from this should open through
    /// [`crate::quarantine::resilient_open`], which retries after moving
    /// the corrupt directory aside.
    pub fn open(config: LocalStoreConfig) -> Result<Self> {
        fs::create_dir_all(&config.base_path)?;
        reject_orphaned_collections(&config.base_path)?;
        Ok(Self {
            base: config.base_path,
            default_collection: config.default_collection,
            isolation_mode: RwLock::new(config.isolation_mode),
        })
    }

    /// The base directory this store is rooted at.
    pub fn base(&self) -> &Path {
        &self.base
    }

    fn resolve_base(&self, tenant: Option<&TenantContext>) -> PathBuf {
        match (*self.isolation_mode.read(), tenant) {
            (IsolationMode::Filesystem, Some(tenant)) => {
                self.base.join(collection::collection_hash(tenant.tenant_id.as_str()))
            }
            _ => self.base.clone(),
        }
    }

    fn target_collection<'a>(&'a self, docs: &[Document]) -> Result<&'a str> {
        // Checked by caller to all share one collection; take the first
        // override present, else the default.
        Ok(docs
            .iter()
            .find_map(|d| d.collection.as_deref())
            .unwrap_or(&self.default_collection))
    }

    fn ensure_collection(&self, base: &Path, name: &str) -> Result<()> {
        let dir = collection::collection_dir(base, name);
        fs::create_dir_all(&dir)?;
        let meta_path = collection::metadata_path(&dir);
        if !meta_path.is_file() {
            if !document_files_in(&dir)?.is_empty() {
                return Err(missing_metadata_error(name));
            }
            let meta = CollectionMetadata {
                name: name.to_string(),
                vector_size: 0,
            };
            let encoded = bincode::serialize(&meta).map_err(|e| {
                ContextdError::Serialization(e.to_string())
            })?;
            fs::write(&meta_path, encoded)?;
        }
        Ok(())
    }

    fn read_metadata(&self, dir: &Path) -> Result<Option<CollectionMetadata>> {
        let path = collection::metadata_path(dir);
        if !path.is_file() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let meta: CollectionMetadata =
            bincode::deserialize(&bytes).map_err(|e| ContextdError::Serialization(e.to_string()))?;
        Ok(Some(meta))
    }

    fn document_files(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        document_files_in(dir)
    }

    fn do_search(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: &str,
        k: usize,
        filters: FilterMap,
    ) -> Result<Vec<SearchResult>> {
        validate_search_args(query, k)?;
        if !validate_collection_name(collection) {
            return Err(ContextdError::InvalidCollectionName(collection.to_string()));
        }

        let mode = *self.isolation_mode.read();
        let tenant = ctx.tenant().ok();
        mode.validate(tenant)?;
        let filters = mode.inject_filter(filters, tenant)?;

        let base = self.resolve_base(tenant);
        let dir = collection::collection_dir(&base, collection);
        let mut scored: Vec<(f32, DocumentRecord)> = Vec::new();

        for path in self.document_files(&dir)? {
            let bytes = fs::read(&path)?;
            let record: DocumentRecord = bincode::deserialize(&bytes)
                .map_err(|e| ContextdError::Serialization(e.to_string()))?;
            if !matches_filters(&record, &filters) {
                continue;
            }
            let score = score_match(query, &record.content);
            if score > 0.0 {
                scored.push((score, record));
            }
        }

        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(score, record)| SearchResult {
                id: record.id,
                content: record.content,
                score,
                metadata: record.metadata,
            })
            .collect())
    }
}

fn matches_filters(record: &DocumentRecord, filters: &FilterMap) -> bool {
    filters
        .iter()
        .all(|(k, v)| record.metadata.get(k) == Some(v))
}

/// Deterministic brute-force relevance score in `[0, 1]`: exact
/// case-insensitive substring match scores 1.0, otherwise the fraction of
/// query tokens present in the content.
fn score_match(query: &str, content: &str) -> f32 {
    let query_lower = query.to_lowercase();
    let content_lower = content.to_lowercase();
    if content_lower.contains(&query_lower) {
        return 1.0;
    }
    let query_tokens: Vec<&str> = query_lower.split_whitespace().collect();
    if query_tokens.is_empty() {
        return 0.0;
    }
    let matched = query_tokens
        .iter()
        .filter(|t| content_lower.contains(**t))
        .count();
    matched as f32 / query_tokens.len() as f32
}

fn document_files_in(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let metadata_name = collection::metadata_path(dir);
    let mut out = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path == metadata_name || !path.is_file() {
            continue;
        }
        out.push(path);
    }
    Ok(out)
}

fn missing_metadata_error(name: &str) -> ContextdError {
    ContextdError::Integrity(format!(
        "collection metadata file not found for {name:?}: directory has document files but no metadata sidecar"
    ))
}

/// Reject (rather than silently heal) any existing collection directory
/// under `base` that has document files but no metadata sidecar — the
/// shape left behind by a crash between writing the first document and
/// writing the sidecar, or by filesystem corruption.
fn reject_orphaned_collections(base: &Path) -> Result<()> {
    if !base.is_dir() {
        return Ok(());
    }
    for entry in fs::read_dir(base)? {
        let entry = entry?;
        let path = entry.path();
        if !path.is_dir() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().into_owned();
        if name == collection::QUARANTINE_DIR || !collection::is_collection_hash(&name) {
            continue;
        }
        let meta_path = collection::metadata_path(&path);
        if !meta_path.is_file() && !document_files_in(&path)?.is_empty() {
            return Err(missing_metadata_error(&name));
        }
    }
    Ok(())
}

#[async_trait]
impl Store for LocalStore {
    async fn add_documents(&self, ctx: &OpContext, docs: Vec<Document>) -> Result<Vec<String>> {
        if docs.is_empty() {
            return Err(ContextdError::EmptyDocuments);
        }
        let mode = *self.isolation_mode.read();
        let tenant = ctx.tenant().ok();
        mode.validate(tenant)?;
        let docs = mode.inject_metadata(docs, tenant)?;

        let collection = self.target_collection(&docs)?.to_string();
        if !validate_collection_name(&collection) {
            return Err(ContextdError::InvalidCollectionName(collection));
        }

        let base = self.resolve_base(tenant);
        self.ensure_collection(&base, &collection)?;
        let dir = collection::collection_dir(&base, &collection);

        let mut ids = Vec::with_capacity(docs.len());
        for doc in docs {
            let id = doc.id.clone().unwrap_or_else(|| uuid::Uuid::new_v4().to_string());
            let record = DocumentRecord::from_document(id.clone(), &doc);
            let encoded = bincode::serialize(&record)
                .map_err(|e| ContextdError::Serialization(e.to_string()))?;
            fs::write(collection::document_path(&dir, &id), encoded)?;
            ids.push(id);
        }
        Ok(ids)
    }

    async fn search(&self, ctx: &OpContext, query: &str, k: usize) -> Result<Vec<SearchResult>> {
        self.do_search(ctx, &self.default_collection.clone(), query, k, FilterMap::new())
    }

    async fn search_with_filters(
        &self,
        ctx: &OpContext,
        query: &str,
        k: usize,
        filters: FilterMap,
    ) -> Result<Vec<SearchResult>> {
        self.do_search(ctx, &self.default_collection.clone(), query, k, filters)
    }

    async fn search_in_collection(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        self.do_search(ctx, collection, query, k, FilterMap::new())
    }

    async fn exact_search(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        // Already brute-force — there is no ANN index to bypass here.
        self.do_search(ctx, collection, query, k, FilterMap::new())
    }

    async fn delete_documents(&self, ctx: &OpContext, ids: Vec<String>) -> Result<()> {
        let default = self.default_collection.clone();
        self.delete_documents_from_collection(ctx, &default, ids).await
    }

    async fn delete_documents_from_collection(
        &self,
        ctx: &OpContext,
        collection: &str,
        ids: Vec<String>,
    ) -> Result<()> {
        if !validate_collection_name(collection) {
            return Err(ContextdError::InvalidCollectionName(collection.to_string()));
        }
        let mode = *self.isolation_mode.read();
        let tenant = ctx.tenant().ok();
        mode.validate(tenant)?;

        let base = self.resolve_base(tenant);
        let dir = collection::collection_dir(&base, collection);
        for id in ids {
            let path = collection::document_path(&dir, &id);
            if path.is_file() {
                fs::remove_file(&path)?;
            }
        }
        Ok(())
    }

    async fn create_collection(
        &self,
        ctx: &OpContext,
        name: &str,
        vector_size: usize,
    ) -> Result<()> {
        if !validate_collection_name(name) {
            return Err(ContextdError::InvalidCollectionName(name.to_string()));
        }
        let mode = *self.isolation_mode.read();
        let tenant = ctx.tenant().ok();
        mode.validate(tenant)?;

        let base = self.resolve_base(tenant);
        let dir = collection::collection_dir(&base, name);
        if collection::metadata_path(&dir).is_file() {
            return Err(ContextdError::CollectionExists(name.to_string()));
        }
        fs::create_dir_all(&dir)?;
        let meta = CollectionMetadata {
            name: name.to_string(),
            vector_size,
        };
        let encoded = bincode::serialize(&meta).map_err(|e| ContextdError::Serialization(e.to_string()))?;
        fs::write(collection::metadata_path(&dir), encoded)?;
        Ok(())
    }

    async fn delete_collection(&self, ctx: &OpContext, name: &str) -> Result<()> {
        if !validate_collection_name(name) {
            return Err(ContextdError::InvalidCollectionName(name.to_string()));
        }
        let tenant = ctx.tenant().ok();
        let base = self.resolve_base(tenant);
        let dir = collection::collection_dir(&base, name);
        if dir.is_dir() {
            fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    async fn collection_exists(&self, ctx: &OpContext, name: &str) -> Result<bool> {
        if !validate_collection_name(name) {
            return Err(ContextdError::InvalidCollectionName(name.to_string()));
        }
        let tenant = ctx.tenant().ok();
        let base = self.resolve_base(tenant);
        let dir = collection::collection_dir(&base, name);
        Ok(collection::metadata_path(&dir).is_file())
    }

    async fn list_collections(&self, ctx: &OpContext) -> Result<Vec<String>> {
        let tenant = ctx.tenant().ok();
        let base = self.resolve_base(tenant);
        if !base.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in fs::read_dir(&base)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            if let Some(meta) = self.read_metadata(&path)? {
                names.push(meta.name);
            }
        }
        Ok(names)
    }

    async fn get_collection_info(&self, ctx: &OpContext, name: &str) -> Result<CollectionInfo> {
        if !validate_collection_name(name) {
            return Err(ContextdError::InvalidCollectionName(name.to_string()));
        }
        let tenant = ctx.tenant().ok();
        let base = self.resolve_base(tenant);
        let dir = collection::collection_dir(&base, name);
        let meta = self
            .read_metadata(&dir)?
            .ok_or_else(|| ContextdError::CollectionNotFound(name.to_string()))?;
        let point_count = self.document_files(&dir)?.len() as u64;
        Ok(meta.to_info(point_count))
    }

    fn set_isolation_mode(&self, mode: IsolationMode) {
        *self.isolation_mode.write() = mode;
    }

    fn isolation_mode(&self) -> IsolationMode {
        *self.isolation_mode.read()
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextd_core::TenantId;

    fn ctx_for(tenant: &str) -> OpContext {
        OpContext::with_tenant(TenantContext::new(TenantId::new(tenant).unwrap()))
    }

    fn store() -> (tempfile::TempDir, LocalStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalStore::open(LocalStoreConfig::new(dir.path())).unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn add_then_search_round_trips() {
        let (_dir, store) = store();
        let ctx = ctx_for("org-1");
        let ids = store
            .add_documents(&ctx, vec![Document::new("hello world").with_id("d1")])
            .await
            .unwrap();
        assert_eq!(ids, vec!["d1"]);

        let results = store.search(&ctx, "hello", 5).await.unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].id, "d1");
        assert_eq!(
            results[0].metadata.get("tenant_id"),
            Some(&contextd_core::MetadataValue::String("org-1".into()))
        );
    }

    #[tokio::test]
    async fn missing_tenant_is_rejected_with_no_side_effects() {
        let (_dir, store) = store();
        let ctx = OpContext::empty();
        let err = store
            .add_documents(&ctx, vec![Document::new("x")])
            .await
            .unwrap_err();
        assert!(matches!(err, ContextdError::MissingTenant));
        assert_eq!(store.list_collections(&ctx_for("org-1")).await.unwrap().len(), 0);
    }

    #[tokio::test]
    async fn search_does_not_cross_tenants_in_filesystem_mode() {
        let (_dir, store) = store();
        store.set_isolation_mode(IsolationMode::Filesystem);

        store
            .add_documents(&ctx_for("org-1"), vec![Document::new("shared secret").with_id("d1")])
            .await
            .unwrap();

        let other = store.search(&ctx_for("org-2"), "shared", 5).await.unwrap();
        assert!(other.is_empty());

        let own = store.search(&ctx_for("org-1"), "shared", 5).await.unwrap();
        assert_eq!(own.len(), 1);
    }

    #[tokio::test]
    async fn collection_admin_round_trips() {
        let (_dir, store) = store();
        let ctx = ctx_for("org-1");
        store.create_collection(&ctx, "docs", 128).await.unwrap();
        assert!(store.collection_exists(&ctx, "docs").await.unwrap());

        let err = store.create_collection(&ctx, "docs", 128).await.unwrap_err();
        assert!(matches!(err, ContextdError::CollectionExists(_)));

        store
            .add_documents(&ctx, vec![Document::new("x").with_id("d1").with_collection("docs")])
            .await
            .unwrap();
        let info = store.get_collection_info(&ctx, "docs").await.unwrap();
        assert_eq!(info.point_count, 1);

        store.delete_collection(&ctx, "docs").await.unwrap();
        assert!(!store.collection_exists(&ctx, "docs").await.unwrap());
    }

    #[tokio::test]
    async fn filters_restrict_results() {
        let (_dir, store) = store();
        let ctx = ctx_for("org-1");
        let mut doc = Document::new("apples and oranges").with_id("d1");
        doc.metadata.insert("category".into(), "fruit".into());
        store.add_documents(&ctx, vec![doc]).await.unwrap();

        let mut filters = FilterMap::new();
        filters.insert("category".into(), "vegetable".into());
        let results = store
            .search_with_filters(&ctx, "apples", 5, filters)
            .await
            .unwrap();
        assert!(results.is_empty());
    }
}
