//! Health Monitor: tracks remote reachability, fans state-change callbacks
//! out to bounded, isolated, timed-out workers (spec §4.3).

use parking_lot::Mutex;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;

/// Per-callback timeout (spec §4.3).
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(5);

/// A registered health-state-change callback.
///
/// Boxed to allow both closures and async blocks; returns a boxed future so
/// the monitor can spawn it without generic callback storage.
pub type HealthCallback = Arc<
    dyn Fn(bool) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync,
>;

/// Configuration for a [`HealthMonitor`].
#[derive(Debug, Clone, Copy)]
pub struct HealthMonitorConfig {
    /// Interval between periodic pings.
    pub ping_interval: Duration,
    /// Per-callback timeout. Defaults to [`CALLBACK_TIMEOUT`]; overridable
    /// in tests that want to exercise the timeout path quickly.
    pub callback_timeout: Duration,
}

impl Default for HealthMonitorConfig {
    fn default() -> Self {
        Self {
            ping_interval: Duration::from_secs(30),
            callback_timeout: CALLBACK_TIMEOUT,
        }
    }
}

/// Tracks a single boolean "healthy" state, updated from a backend-supplied
/// watcher and/or a periodic ping, and fans state transitions out to
/// registered callbacks.
pub struct HealthMonitor {
    healthy: AtomicBool,
    last_check_millis: AtomicI64,
    start: Instant,
    callbacks: Mutex<Vec<HealthCallback>>,
    config: HealthMonitorConfig,
    ping_handle: Mutex<Option<JoinHandle<()>>>,
    cancel: tokio_util::sync::CancellationToken,
}

impl HealthMonitor {
    /// Construct a monitor, initially healthy.
    pub fn new(config: HealthMonitorConfig) -> Arc<Self> {
        Arc::new(Self {
            healthy: AtomicBool::new(true),
            last_check_millis: AtomicI64::new(0),
            start: Instant::now(),
            callbacks: Mutex::new(Vec::new()),
            config,
            ping_handle: Mutex::new(None),
            cancel: tokio_util::sync::CancellationToken::new(),
        })
    }

    /// Register a state-change callback. Errors if called with no-op
    /// intent is not representable in safe Rust (there is no nil closure),
    /// so this always succeeds — kept `Result`-shaped for API stability
    /// with callers that migrate from a nullable-callback language.
    pub fn register_callback(&self, callback: HealthCallback) {
        self.callbacks.lock().push(callback);
    }

    /// Lock-free read of the current healthy state.
    pub fn is_healthy(&self) -> bool {
        self.healthy.load(Ordering::Acquire)
    }

    /// Lock-free read of the last check time, as a duration since monitor
    /// construction.
    pub fn last_check(&self) -> Duration {
        Duration::from_millis(self.last_check_millis.load(Ordering::Acquire).max(0) as u64)
    }

    /// Update the health state. Only fans callbacks out on a transition;
    /// callbacks observe the new state only after `is_healthy` already
    /// reflects it (spec §5, Ordering guarantees).
    pub async fn update_health(self: &Arc<Self>, healthy: bool) {
        self.last_check_millis
            .store(self.start.elapsed().as_millis() as i64, Ordering::Release);
        let previous = self.healthy.swap(healthy, Ordering::AcqRel);
        if previous != healthy {
            self.fan_out(healthy).await;
        }
    }

    async fn fan_out(self: &Arc<Self>, healthy: bool) {
        let callbacks: Vec<HealthCallback> = self.callbacks.lock().clone();
        let mut handles = Vec::with_capacity(callbacks.len());
        for callback in callbacks {
            let timeout = self.config.callback_timeout;
            handles.push(tokio::spawn(async move {
                let fut = callback(healthy);
                match tokio::time::timeout(timeout, fut).await {
                    Ok(()) => {}
                    Err(_) => {
                        tracing::warn!("health callback timed out after {:?}", timeout);
                    }
                }
            }));
        }
        for handle in handles {
            if let Err(join_err) = handle.await {
                if join_err.is_panic() {
                    tracing::warn!("health callback panicked: {join_err}");
                }
            }
        }
    }

    /// Start the periodic ping loop, calling `ping` on each tick and
    /// feeding its result into `update_health`.
    pub fn start_ping_loop<F, Fut>(self: &Arc<Self>, ping: F)
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let this = Arc::clone(self);
        let interval = self.config.ping_interval;
        let cancel = self.cancel.clone();
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        let healthy = ping().await;
                        this.update_health(healthy).await;
                    }
                }
            }
        });
        *self.ping_handle.lock() = Some(handle);
    }

    /// Cancel the ping loop and wait for it (and any in-flight callback
    /// fan-out) to drain.
    pub async fn stop(self: &Arc<Self>) {
        self.cancel.cancel();
        let handle = self.ping_handle.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[tokio::test]
    async fn fans_out_only_on_transition() {
        let monitor = HealthMonitor::new(HealthMonitorConfig::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let calls2 = Arc::clone(&calls);
        monitor.register_callback(Arc::new(move |_healthy| {
            let calls = Arc::clone(&calls2);
            Box::pin(async move {
                calls.fetch_add(1, Ordering::SeqCst);
            })
        }));

        monitor.update_health(true).await; // already healthy, no transition
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        monitor.update_health(false).await; // transition
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        monitor.update_health(false).await; // no transition
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn blocking_callback_is_cancelled_at_timeout() {
        let config = HealthMonitorConfig {
            ping_interval: Duration::from_secs(30),
            callback_timeout: Duration::from_millis(20),
        };
        let monitor = HealthMonitor::new(config);
        let completed = Arc::new(AtomicBool::new(false));
        let completed2 = Arc::clone(&completed);
        monitor.register_callback(Arc::new(move |_| {
            let completed = Arc::clone(&completed2);
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(200)).await;
                completed.store(true, Ordering::SeqCst);
            })
        }));

        let start = Instant::now();
        monitor.update_health(false).await;
        assert!(start.elapsed() < Duration::from_millis(150));
        assert!(!completed.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn panicking_callback_does_not_block_others() {
        let monitor = HealthMonitor::new(HealthMonitorConfig::default());
        monitor.register_callback(Arc::new(|_| {
            Box::pin(async move {
                panic!("boom");
            })
        }));
        let ran = Arc::new(AtomicBool::new(false));
        let ran2 = Arc::clone(&ran);
        monitor.register_callback(Arc::new(move |_| {
            let ran = Arc::clone(&ran2);
            Box::pin(async move {
                ran.store(true, Ordering::SeqCst);
            })
        }));

        monitor.update_health(false).await;
        assert!(ran.load(Ordering::SeqCst));
    }
}
