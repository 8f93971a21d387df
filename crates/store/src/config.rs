//! Configuration structs with the defaults enumerated in spec §6.

use contextd_core::IsolationMode;
use contextd_resilience::CircuitBreakerConfig;
use std::path::PathBuf;
use std::time::Duration;

/// How strictly startup reacts to a non-healthy Metadata Health Checker
/// result, forwarded to [`contextd_local::StartupValidator`].
pub type StartupPolicy = contextd_local::StartupPolicy;

/// Top-level Fallback Store configuration.
///
/// Defaults match spec §6's "Configuration (enumerated)" table; the one
/// open question it leaves (circuit breaker `reset_after` of 5 min vs 30 s)
/// is resolved in [`CircuitBreakerConfig::default`] — see DESIGN.md.
#[derive(Debug, Clone)]
pub struct FallbackConfig {
    /// Whether the fallback/resilience machinery is active. When `false`,
    /// callers should construct a bare backend `Store` directly instead —
    /// this flag exists for config parity with the teacher's `Enabled`
    /// toggle, not enforced inside `FallbackStore` itself.
    pub enabled: bool,
    /// Root directory for the local embedded backend.
    pub local_path: PathBuf,
    /// Root directory for the write-ahead log.
    pub wal_path: PathBuf,
    /// Trigger an initial sync cycle immediately on open.
    pub sync_on_connect: bool,
    /// Interval between Health Monitor pings.
    pub health_check_interval: Duration,
    /// Days a synced WAL entry is retained before compaction drops it.
    pub wal_retention_days: i64,
    /// Interval between Background Scanner runs.
    pub background_scan_interval: Duration,
    /// Circuit breaker threshold / reset-after.
    pub circuit_breaker: CircuitBreakerConfig,
    /// Active isolation mode.
    pub isolation_mode: IsolationMode,
    /// Collection targeted when a call doesn't override one.
    pub default_collection: String,
    /// Optional pre-flight gate run against the local backend's on-disk
    /// state before it is opened.
    pub startup_policy: StartupPolicy,
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            local_path: PathBuf::from(".claude/contextd/store"),
            wal_path: PathBuf::from(".claude/contextd/wal"),
            sync_on_connect: true,
            health_check_interval: Duration::from_secs(30),
            wal_retention_days: 7,
            background_scan_interval: Duration::from_secs(5 * 60),
            circuit_breaker: CircuitBreakerConfig::default(),
            isolation_mode: IsolationMode::default(),
            default_collection: "default".to_string(),
            startup_policy: StartupPolicy::default(),
        }
    }
}
