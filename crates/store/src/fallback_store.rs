//! The Fallback Store: the orchestrator that implements the Store contract
//! on top of a remote backend, a local embedded backend, a WAL, a Health
//! Monitor, a Circuit Breaker, and a Sync Manager (spec §4.6).

use crate::config::FallbackConfig;
use async_trait::async_trait;
use contextd_core::document::validate_collection_name;
use contextd_core::filter::FilterMap;
use contextd_core::store::validate_search_args;
use contextd_core::tenant::OpContext;
use contextd_core::{
    CollectionInfo, ContextdError, Document, IsolationMode, MetadataValue, Result, SearchResult,
    Store,
};
use contextd_local::{BackgroundScanner, LocalStore, LocalStoreConfig, ScannerConfig, StartupValidator};
use contextd_resilience::{CircuitBreaker, HealthMonitor, HealthMonitorConfig};
use contextd_sync::{RemoteSync, SyncManager};
use contextd_wal::{RegexScrubber, Wal, WalEntry, WalOperation};
use parking_lot::RwLock;
use rand::RngCore;
use std::collections::HashSet;
use std::sync::Arc;

/// Orchestrates writes and reads across the remote and local backends under
/// the Health Monitor's current view, durable via the WAL (spec §4.6).
///
/// The `RwLock<()>` guards only mode switches (`set_isolation_mode`) and
/// `close`; every other operation takes the read side and runs
/// concurrently, matching spec §5's shared-state discipline.
pub struct FallbackStore {
    mode_gate: RwLock<()>,
    wal: Arc<Wal>,
    health: Arc<HealthMonitor>,
    breaker: Arc<CircuitBreaker>,
    sync_manager: Arc<SyncManager>,
    scanner: Arc<BackgroundScanner>,
    local: Arc<LocalStore>,
    remote: Arc<dyn Store>,
    wal_retention_days: i64,
}

fn random_entry_id() -> String {
    // `rand::thread_rng` is infallible in practice; spec §4.6's "fall back
    // to timestamp only if the RNG fails" branch has no counterpart to
    // build against in safe Rust, so it is not modeled here.
    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

fn absolute(path: &std::path::Path) -> std::io::Result<std::path::PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

impl FallbackStore {
    /// Open a Fallback Store: opens the WAL and local backend (quarantining
    /// corrupt local collections along the way), starts the Health
    /// Monitor's ping loop, the Sync Manager, and the Background Scanner,
    /// and adopts `remote` as the remote backend.
    ///
    /// `remote` must implement both `Store` (the uniform operation surface)
    /// and `RemoteSync` (the narrower contract the Sync Manager replays
    /// against) — every concrete remote adapter in this workspace
    /// implements both.
    pub fn open<R>(config: FallbackConfig, remote: Arc<R>) -> Result<Arc<Self>>
    where
        R: Store + RemoteSync + 'static,
    {
        let wal_root = absolute(&config.wal_path)?;
        std::fs::create_dir_all(&wal_root)?;
        let wal = Arc::new(Wal::open(&wal_root, Box::new(RegexScrubber))?);

        std::fs::create_dir_all(&config.local_path)?;
        StartupValidator::new(&config.local_path, config.startup_policy).run()?;

        let local_path = config.local_path.clone();
        let default_collection = config.default_collection.clone();
        let isolation_mode = config.isolation_mode;
        let local = contextd_local::resilient_open(&local_path, || {
            LocalStore::open(LocalStoreConfig {
                base_path: local_path.clone(),
                default_collection: default_collection.clone(),
                isolation_mode,
            })
        })?;
        let local = Arc::new(local);

        remote.set_isolation_mode(config.isolation_mode);
        let remote_sync: Arc<dyn RemoteSync> = remote.clone();
        let remote_store: Arc<dyn Store> = remote;

        let health = HealthMonitor::new(HealthMonitorConfig {
            ping_interval: config.health_check_interval,
            ..HealthMonitorConfig::default()
        });
        let breaker = Arc::new(CircuitBreaker::new(config.circuit_breaker));

        let sync_manager = SyncManager::start(
            Arc::clone(&wal),
            Arc::clone(&health),
            Arc::clone(&breaker),
            remote_sync,
        );

        let ping_target = Arc::clone(&remote_store);
        health.start_ping_loop(move || {
            let ping_target = Arc::clone(&ping_target);
            async move { ping_target.list_collections(&OpContext::empty()).await.is_ok() }
        });

        let scanner = BackgroundScanner::new(
            config.local_path.clone(),
            ScannerConfig {
                interval: config.background_scan_interval,
            },
        );
        scanner.start();

        if config.sync_on_connect {
            sync_manager.trigger_sync();
        }

        Ok(Arc::new(Self {
            mode_gate: RwLock::new(()),
            wal,
            health,
            breaker,
            sync_manager,
            scanner,
            local,
            remote: remote_store,
            wal_retention_days: config.wal_retention_days,
        }))
    }

    /// The Health Monitor driving failover decisions, exposed so tests and
    /// adapters can force a state transition without waiting on the ping
    /// loop's interval.
    pub fn health_monitor(&self) -> &Arc<HealthMonitor> {
        &self.health
    }

    /// The circuit breaker guarding sync replay to the remote.
    pub fn circuit_breaker(&self) -> &Arc<CircuitBreaker> {
        &self.breaker
    }

    /// The Sync Manager, exposed so tests can wait on a manually triggered
    /// replay instead of the health-transition trigger.
    pub fn sync_manager(&self) -> &Arc<SyncManager> {
        &self.sync_manager
    }

    /// The write-ahead log, exposed for tests asserting on pending entries.
    pub fn wal(&self) -> &Arc<Wal> {
        &self.wal
    }

    async fn merge_remote_with_pending(
        &self,
        ctx: &OpContext,
        mut results: Vec<SearchResult>,
        collection: Option<&str>,
        query: &str,
        k: usize,
    ) -> Vec<SearchResult> {
        let pending_ids = self.pending_add_ids();
        if pending_ids.is_empty() {
            return results;
        }

        let local_results = match collection {
            Some(c) => self.local.search_in_collection(ctx, c, query, k).await,
            None => self.local.search(ctx, query, k).await,
        }
        .unwrap_or_default();

        let matching: Vec<SearchResult> =
            local_results.into_iter().filter(|r| pending_ids.contains(&r.id)).collect();
        let matching_ids: HashSet<String> = matching.iter().map(|r| r.id.clone()).collect();

        results.retain(|r| !matching_ids.contains(&r.id));
        let mut merged = matching;
        merged.extend(results);
        if merged.len() > k {
            // Pending local documents replace rather than append when the
            // combined set would exceed k (spec §4.6).
            merged.truncate(k);
        }

        let pending_count = merged.iter().filter(|r| matching_ids.contains(&r.id)).count();
        for result in merged.iter_mut() {
            result.metadata.insert("source".to_string(), MetadataValue::String("merged".to_string()));
            result
                .metadata
                .insert("pending_count".to_string(), MetadataValue::Int(pending_count as i64));
        }
        merged
    }

    fn pending_add_ids(&self) -> HashSet<String> {
        self.wal
            .pending_entries()
            .into_iter()
            .filter(|e| matches!(e.operation, WalOperation::Add))
            .filter_map(|e| e.docs)
            .flatten()
            .filter_map(|d| d.id)
            .collect()
    }

    fn tag_local_fallback(results: &mut [SearchResult]) {
        for result in results.iter_mut() {
            result.metadata.insert("source".to_string(), MetadataValue::String("local".to_string()));
            result.metadata.insert("stale_warning".to_string(), MetadataValue::Bool(true));
        }
    }

    async fn write_ahead_add(&self, docs: Vec<Document>, synced: bool) {
        let mut entry = WalEntry::new_add(random_entry_id(), docs, chrono::Utc::now());
        entry.synced = synced;
        if let Err(e) = self.wal.write_entry(entry) {
            tracing::warn!(error = %e, synced, "failed to write WAL add entry");
        }
    }

    async fn write_ahead_delete(&self, ids: Vec<String>, synced: bool) {
        let mut entry = WalEntry::new_delete(random_entry_id(), ids, chrono::Utc::now());
        entry.synced = synced;
        if let Err(e) = self.wal.write_entry(entry) {
            tracing::warn!(error = %e, synced, "failed to write WAL delete entry");
        }
    }
}

#[async_trait]
impl Store for FallbackStore {
    async fn add_documents(&self, ctx: &OpContext, docs: Vec<Document>) -> Result<Vec<String>> {
        let _guard = self.mode_gate.read();
        if docs.is_empty() {
            return Err(ContextdError::EmptyDocuments);
        }
        let tenant = ctx.tenant()?.snapshot();
        let ctx = OpContext::with_tenant(tenant);

        metrics::counter!("documents_total", "operation" => "add").increment(docs.len() as u64);

        if self.health.is_healthy() {
            match self.remote.add_documents(&ctx, docs.clone()).await {
                Ok(ids) => {
                    if let Err(e) = self.local.add_documents(&ctx, docs.clone()).await {
                        tracing::warn!(error = %e, "local mirror write failed after remote success");
                    }
                    self.write_ahead_add(docs, true).await;
                    return Ok(ids);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "remote add_documents failed, falling back to local+WAL");
                    metrics::counter!("errors_total", "operation" => "add").increment(1);
                }
            }
        }

        // Write-ahead durability: the pending WAL entry lands before local
        // storage is touched (spec §4.6, step 4).
        self.write_ahead_add(docs.clone(), false).await;
        self.local.add_documents(&ctx, docs).await
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
        let _guard = self.mode_gate.read();
        validate_search_args(query, k)?;
        let tenant = ctx.tenant()?.snapshot();
        let ctx = OpContext::with_tenant(tenant);

        if self.health.is_healthy() {
            match self.remote.search_with_filters(&ctx, query, k, filters.clone()).await {
                Ok(results) => {
                    let merged = self.merge_remote_with_pending(&ctx, results, None, query, k).await;
                    metrics::histogram!("search_results_size", "operation" => "search").record(merged.len() as f64);
                    return Ok(merged);
                }
                Err(e) => {
                    tracing::warn!(error = %e, "remote search failed, falling back to local");
                    metrics::counter!("errors_total", "operation" => "search").increment(1);
                }
            }
        }

        let mut results = self.local.search_with_filters(&ctx, query, k, filters).await?;
        Self::tag_local_fallback(&mut results);
        Ok(results)
    }

    async fn search_in_collection(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        self.search_scoped(ctx, collection, query, k, false).await
    }

    async fn exact_search(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: &str,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        self.search_scoped(ctx, collection, query, k, true).await
    }

    async fn delete_documents(&self, ctx: &OpContext, ids: Vec<String>) -> Result<()> {
        self.delete_scoped(ctx, None, ids).await
    }

    async fn delete_documents_from_collection(
        &self,
        ctx: &OpContext,
        collection: &str,
        ids: Vec<String>,
    ) -> Result<()> {
        self.delete_scoped(ctx, Some(collection), ids).await
    }

    async fn create_collection(&self, ctx: &OpContext, name: &str, vector_size: usize) -> Result<()> {
        let _guard = self.mode_gate.read();
        if !validate_collection_name(name) {
            return Err(ContextdError::InvalidCollectionName(name.to_string()));
        }
        if self.health.is_healthy() {
            if let Err(e) = self.remote.create_collection(ctx, name, vector_size).await {
                tracing::warn!(error = %e, collection = name, "remote create_collection failed, local still created");
            }
        }
        self.local.create_collection(ctx, name, vector_size).await
    }

    async fn delete_collection(&self, ctx: &OpContext, name: &str) -> Result<()> {
        let _guard = self.mode_gate.read();
        if self.health.is_healthy() {
            if let Err(e) = self.remote.delete_collection(ctx, name).await {
                tracing::warn!(error = %e, collection = name, "remote delete_collection failed, local still deleted");
            }
        }
        self.local.delete_collection(ctx, name).await
    }

    async fn collection_exists(&self, ctx: &OpContext, name: &str) -> Result<bool> {
        let _guard = self.mode_gate.read();
        if self.health.is_healthy() {
            match self.remote.collection_exists(ctx, name).await {
                Ok(exists) => return Ok(exists),
                Err(e) => tracing::warn!(error = %e, "remote collection_exists failed, falling back to local"),
            }
        }
        self.local.collection_exists(ctx, name).await
    }

    async fn list_collections(&self, ctx: &OpContext) -> Result<Vec<String>> {
        let _guard = self.mode_gate.read();
        if self.health.is_healthy() {
            match self.remote.list_collections(ctx).await {
                Ok(names) => return Ok(names),
                Err(e) => tracing::warn!(error = %e, "remote list_collections failed, falling back to local"),
            }
        }
        self.local.list_collections(ctx).await
    }

    async fn get_collection_info(&self, ctx: &OpContext, name: &str) -> Result<CollectionInfo> {
        let _guard = self.mode_gate.read();
        if self.health.is_healthy() {
            match self.remote.get_collection_info(ctx, name).await {
                Ok(info) => return Ok(info),
                Err(e) => tracing::warn!(error = %e, "remote get_collection_info failed, falling back to local"),
            }
        }
        self.local.get_collection_info(ctx, name).await
    }

    fn set_isolation_mode(&self, mode: IsolationMode) {
        let _guard = self.mode_gate.write();
        self.local.set_isolation_mode(mode);
        self.remote.set_isolation_mode(mode);
    }

    fn isolation_mode(&self) -> IsolationMode {
        let _guard = self.mode_gate.read();
        self.local.isolation_mode()
    }

    async fn close(&self) -> Result<()> {
        let _guard = self.mode_gate.write();
        let mut errors = Vec::new();

        self.sync_manager.stop().await;
        self.health.stop().await;
        self.scanner.stop().await;
        if let Err(e) = self.wal.compact(chrono::Duration::days(self.wal_retention_days)) {
            errors.push(e.to_string());
        }
        if let Err(e) = self.local.close().await {
            errors.push(e.to_string());
        }
        if let Err(e) = self.remote.close().await {
            errors.push(e.to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ContextdError::Integrity(errors.join("; ")))
        }
    }
}

impl FallbackStore {
    async fn search_scoped(
        &self,
        ctx: &OpContext,
        collection: &str,
        query: &str,
        k: usize,
        exact: bool,
    ) -> Result<Vec<SearchResult>> {
        let _guard = self.mode_gate.read();
        validate_search_args(query, k)?;
        let tenant = ctx.tenant()?.snapshot();
        let ctx = OpContext::with_tenant(tenant);

        if self.health.is_healthy() {
            let remote_result = if exact {
                self.remote.exact_search(&ctx, collection, query, k).await
            } else {
                self.remote.search_in_collection(&ctx, collection, query, k).await
            };
            match remote_result {
                Ok(results) => {
                    let merged = self
                        .merge_remote_with_pending(&ctx, results, Some(collection), query, k)
                        .await;
                    return Ok(merged);
                }
                Err(e) => {
                    tracing::warn!(error = %e, collection, "remote search failed, falling back to local");
                }
            }
        }

        let mut results = if exact {
            self.local.exact_search(&ctx, collection, query, k).await?
        } else {
            self.local.search_in_collection(&ctx, collection, query, k).await?
        };
        Self::tag_local_fallback(&mut results);
        Ok(results)
    }

    async fn delete_scoped(&self, ctx: &OpContext, collection: Option<&str>, ids: Vec<String>) -> Result<()> {
        let _guard = self.mode_gate.read();
        let tenant = ctx.tenant()?.snapshot();
        let ctx = OpContext::with_tenant(tenant);

        if self.health.is_healthy() {
            let remote_result = match collection {
                Some(c) => self.remote.delete_documents_from_collection(&ctx, c, ids.clone()).await,
                None => self.remote.delete_documents(&ctx, ids.clone()).await,
            };
            if let Ok(()) = remote_result {
                let local_result = match collection {
                    Some(c) => self.local.delete_documents_from_collection(&ctx, c, ids.clone()).await,
                    None => self.local.delete_documents(&ctx, ids.clone()).await,
                };
                if let Err(e) = local_result {
                    tracing::warn!(error = %e, "local mirror delete failed after remote success");
                }
                self.write_ahead_delete(ids, true).await;
                return Ok(());
            }
            if let Err(e) = remote_result {
                tracing::warn!(error = %e, "remote delete failed, falling back to local+WAL");
            }
        }

        self.write_ahead_delete(ids.clone(), false).await;
        match collection {
            Some(c) => self.local.delete_documents_from_collection(&ctx, c, ids).await,
            None => self.local.delete_documents(&ctx, ids).await,
        }
    }
}
