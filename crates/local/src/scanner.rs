//! Background Scanner: periodically invokes the Metadata Health Checker
//! and fires edge-triggered degraded/recovered callbacks (spec §4.7, C11).

use crate::health_checker::{MetadataHealth, MetadataHealthChecker};
use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;

/// A registered edge-triggered scanner callback.
pub type ScannerCallback = Arc<dyn Fn() -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

/// Configuration for a [`BackgroundScanner`].
#[derive(Debug, Clone, Copy)]
pub struct ScannerConfig {
    /// Interval between scans after the immediate first one.
    pub interval: Duration,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5 * 60),
        }
    }
}

/// Periodically runs [`MetadataHealthChecker`], tracking the last result
/// and error, and firing `on_degraded`/`on_recovered` on state transitions.
pub struct BackgroundScanner {
    checker: MetadataHealthChecker,
    config: ScannerConfig,
    last_health: Mutex<Option<MetadataHealth>>,
    last_error: Mutex<Option<String>>,
    was_healthy: AtomicBool,
    on_degraded: Mutex<Vec<ScannerCallback>>,
    on_recovered: Mutex<Vec<ScannerCallback>>,
    running: AtomicBool,
    handle: Mutex<Option<JoinHandle<()>>>,
    cancel: tokio_util::sync::CancellationToken,
}

impl BackgroundScanner {
    /// Construct a scanner rooted at `base`, not yet started.
    pub fn new(base: impl Into<std::path::PathBuf>, config: ScannerConfig) -> Arc<Self> {
        Arc::new(Self {
            checker: MetadataHealthChecker::new(base),
            config,
            last_health: Mutex::new(None),
            last_error: Mutex::new(None),
            was_healthy: AtomicBool::new(true),
            on_degraded: Mutex::new(Vec::new()),
            on_recovered: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            handle: Mutex::new(None),
            cancel: tokio_util::sync::CancellationToken::new(),
        })
    }

    /// Register a callback fired when a healthy-or-unknown state becomes
    /// unhealthy (at least one corrupt collection).
    pub fn on_degraded(&self, callback: ScannerCallback) {
        self.on_degraded.lock().push(callback);
    }

    /// Register a callback fired when an unhealthy state becomes healthy.
    pub fn on_recovered(&self, callback: ScannerCallback) {
        self.on_recovered.lock().push(callback);
    }

    /// The most recent scan result, if any scan has run.
    pub fn last_health(&self) -> Option<MetadataHealth> {
        self.last_health.lock().clone()
    }

    /// The most recent scan error, if the last scan failed.
    pub fn last_error(&self) -> Option<String> {
        self.last_error.lock().clone()
    }

    /// Start the scanner: runs one scan immediately, then on `interval`.
    /// Idempotent — a second call while already running is a no-op.
    pub fn start(self: &Arc<Self>) {
        if self.running.swap(true, Ordering::AcqRel) {
            return;
        }
        let this = Arc::clone(self);
        let cancel = self.cancel.clone();
        let interval = self.config.interval;
        let handle = tokio::spawn(async move {
            this.run_once().await;
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await; // consume the immediate first tick
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        this.run_once().await;
                    }
                }
            }
        });
        *self.handle.lock() = Some(handle);
    }

    async fn run_once(self: &Arc<Self>) {
        match self.checker.check() {
            Ok(health) => {
                let now_healthy = health.is_healthy();
                *self.last_health.lock() = Some(health);
                *self.last_error.lock() = None;
                let was_healthy = self.was_healthy.swap(now_healthy, Ordering::AcqRel);
                if was_healthy && !now_healthy {
                    self.fire(&self.on_degraded).await;
                } else if !was_healthy && now_healthy {
                    self.fire(&self.on_recovered).await;
                }
            }
            Err(err) => {
                tracing::warn!(error = %err, "background scan failed");
                *self.last_error.lock() = Some(err.to_string());
                metrics::counter!("health_checks_total", "result" => "error").increment(1);
            }
        }
    }

    async fn fire(&self, callbacks: &Mutex<Vec<ScannerCallback>>) {
        let callbacks: Vec<ScannerCallback> = callbacks.lock().clone();
        for callback in callbacks {
            callback().await;
        }
    }

    /// Stop the scanner and wait for the worker to exit. Idempotent.
    pub async fn stop(self: &Arc<Self>) {
        if !self.running.swap(false, Ordering::AcqRel) {
            return;
        }
        self.cancel.cancel();
        let handle = self.handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn fires_on_degraded_then_on_recovered() {
        let dir = tempfile::tempdir().unwrap();
        let base = dir.path().to_path_buf();
        let scanner = BackgroundScanner::new(base.clone(), ScannerConfig {
            interval: Duration::from_secs(3600),
        });

        let degraded = Arc::new(AtomicUsize::new(0));
        let degraded2 = Arc::clone(&degraded);
        scanner.on_degraded(Arc::new(move || {
            let d = Arc::clone(&degraded2);
            Box::pin(async move {
                d.fetch_add(1, Ordering::SeqCst);
            })
        }));
        let recovered = Arc::new(AtomicUsize::new(0));
        let recovered2 = Arc::clone(&recovered);
        scanner.on_recovered(Arc::new(move || {
            let r = Arc::clone(&recovered2);
            Box::pin(async move {
                r.fetch_add(1, Ordering::SeqCst);
            })
        }));

        scanner.run_once().await;
        assert_eq!(degraded.load(Ordering::SeqCst), 0);

        let corrupt = base.join("abcdef01");
        fs::create_dir_all(&corrupt).unwrap();
        File::create(corrupt.join("d1.bin")).unwrap();
        scanner.run_once().await;
        assert_eq!(degraded.load(Ordering::SeqCst), 1);

        fs::remove_dir_all(&corrupt).unwrap();
        scanner.run_once().await;
        assert_eq!(recovered.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn start_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = BackgroundScanner::new(dir.path(), ScannerConfig {
            interval: Duration::from_secs(3600),
        });
        scanner.start();
        scanner.start();
        scanner.stop().await;
    }
}
