//! contextd: a multi-tenant vector storage subsystem with offline
//! resilience.
//!
//! A [`FallbackStore`] implements the uniform [`Store`] trait on top of a
//! remote backend and a local embedded backend, failing over between them
//! under a [`Store`]-wide tenant isolation policy. Writes are durable via a
//! write-ahead log even when the remote is unreachable; a background Sync
//! Manager replays pending writes once the remote recovers.
//!
//! ```no_run
//! use contextd::{Document, FallbackConfig, FallbackStore, OpContext, TenantContext, TenantId};
//! use std::sync::Arc;
//!
//! # async fn run(remote: Arc<contextd::MockRemoteStore>) -> contextd::Result<()> {
//! let store = FallbackStore::open(FallbackConfig::default(), remote)?;
//! let ctx = OpContext::with_tenant(TenantContext::new(TenantId::new("acme")?));
//! store.add_documents(&ctx, vec![Document::new("hello world")]).await?;
//! let hits = store.search(&ctx, "hello", 10).await?;
//! # let _ = hits;
//! # Ok(())
//! # }
//! ```

pub use contextd_core::document::{validate_collection_name, Metadata};
pub use contextd_core::filter::FilterMap;
pub use contextd_core::isolation::IsolationMode;
pub use contextd_core::tenant::OpContext;
pub use contextd_core::{
    merge_filters, CollectionInfo, ContextdError, Document, ErrorKind, MetadataValue, ProjectId,
    Result, SearchResult, Store, TeamId, TenantContext, TenantId, RESERVED_TENANT_KEYS,
};

pub use contextd_local::{
    resilient_open, BackgroundScanner, CollectionHealth, LocalStore, LocalStoreConfig,
    MetadataHealth, MetadataHealthChecker, ScannerConfig,
};
pub use contextd_resilience::{
    CircuitBreaker, CircuitBreakerConfig, CircuitState, HealthMonitor, HealthMonitorConfig,
};
pub use contextd_sync::{RemoteSync, SyncManager, SyncOutcome};
pub use contextd_wal::{Wal, WalEntry, WalOperation};

pub use contextd_remote::{MockRemoteStore, TcpRemoteStore};

pub use contextd_store::{FallbackConfig, FallbackStore, StartupPolicy};
