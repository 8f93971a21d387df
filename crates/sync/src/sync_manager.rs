//! The Sync Manager worker: drains a bounded trigger channel and replays
//! the WAL's pending entries to the remote in FIFO order.

use crate::remote_sync::RemoteSync;
use contextd_resilience::{CircuitBreaker, HealthMonitor};
use contextd_wal::{Wal, WalOperation};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Trigger channel capacity (spec §4.5).
pub const CHANNEL_CAPACITY: usize = 100;

/// Aggregate outcome of one sync cycle, returned for tests/diagnostics.
#[derive(Debug, Default, Clone, Copy)]
pub struct SyncOutcome {
    /// Entries that synced successfully this cycle.
    pub succeeded: usize,
    /// Entries that failed this cycle (remain pending).
    pub failed: usize,
}

/// Owns the bounded trigger channel and the dedicated worker task that
/// drains it.
pub struct SyncManager {
    tx: mpsc::Sender<()>,
    worker: parking_lot::Mutex<Option<JoinHandle<()>>>,
    cancel: tokio_util::sync::CancellationToken,
}

impl SyncManager {
    /// Construct and start the worker task.
    ///
    /// On start, registers a health callback on `health` so that each
    /// healthy-transition enqueues a sync (spec §4.5).
    pub fn start(
        wal: Arc<Wal>,
        health: Arc<HealthMonitor>,
        breaker: Arc<CircuitBreaker>,
        remote: Arc<dyn RemoteSync>,
    ) -> Arc<Self> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let cancel = tokio_util::sync::CancellationToken::new();

        let worker_cancel = cancel.clone();
        let worker = tokio::spawn(run_worker(rx, worker_cancel, wal, Arc::clone(&health), breaker, remote));

        let manager = Arc::new(Self {
            tx,
            worker: parking_lot::Mutex::new(Some(worker)),
            cancel,
        });

        let trigger_tx = manager.tx.clone();
        health.register_callback(Arc::new(move |healthy| {
            let trigger_tx = trigger_tx.clone();
            Box::pin(async move {
                if healthy {
                    if let Err(mpsc::error::TrySendError::Full(())) = trigger_tx.try_send(()) {
                        tracing::warn!("sync trigger channel full, dropping duplicate trigger");
                    }
                }
            })
        }));

        manager
    }

    /// Non-blocking trigger: enqueue a sync cycle. Logs and drops the
    /// trigger on backpressure (the channel is saturated with pending
    /// triggers, a cycle is already about to run).
    pub fn trigger_sync(&self) {
        if let Err(mpsc::error::TrySendError::Full(())) = self.tx.try_send(()) {
            tracing::warn!("sync trigger channel full, backpressure");
        }
    }

    /// Cancel the worker and wait for it to exit.
    pub async fn stop(&self) {
        self.cancel.cancel();
        let handle = self.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<()>,
    cancel: tokio_util::sync::CancellationToken,
    wal: Arc<Wal>,
    health: Arc<HealthMonitor>,
    breaker: Arc<CircuitBreaker>,
    remote: Arc<dyn RemoteSync>,
) {
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            signal = rx.recv() => {
                if signal.is_none() {
                    break;
                }
                run_cycle(&wal, &health, &breaker, remote.as_ref()).await;
            }
        }
    }
}

/// Run one sync cycle: check health and the breaker, fetch pending
/// entries, replay each in FIFO order, log aggregate counts.
pub async fn run_cycle(
    wal: &Wal,
    health: &HealthMonitor,
    breaker: &CircuitBreaker,
    remote: &dyn RemoteSync,
) -> SyncOutcome {
    if !health.is_healthy() {
        tracing::debug!("sync cycle skipped: remote unhealthy");
        return SyncOutcome::default();
    }
    if !breaker.allow() {
        tracing::debug!("sync cycle skipped: circuit breaker denies");
        return SyncOutcome::default();
    }

    let pending = wal.pending_entries();
    if pending.is_empty() {
        return SyncOutcome::default();
    }

    let start = Instant::now();
    let mut outcome = SyncOutcome::default();

    for entry in pending {
        let result = match entry.operation {
            WalOperation::Add => match entry.docs.clone() {
                Some(docs) => remote.upsert_documents(docs).await.map(|_| ()),
                None => Ok(()),
            },
            WalOperation::Delete => match entry.ids.clone() {
                Some(ids) => remote.delete_documents(ids).await,
                None => Ok(()),
            },
        };

        match result {
            Ok(()) => {
                breaker.record_success();
                if let Err(e) = wal.mark_synced(&entry.id) {
                    tracing::warn!(id = %entry.id, error = %e, "failed to mark WAL entry synced");
                }
                outcome.succeeded += 1;
            }
            Err(e) => {
                breaker.record_failure();
                if let Err(record_err) = wal.record_sync_attempt(&entry.id, Some(e.to_string())) {
                    tracing::warn!(id = %entry.id, error = %record_err, "failed to record sync attempt");
                }
                outcome.failed += 1;
            }
        }
    }

    tracing::info!(
        succeeded = outcome.succeeded,
        failed = outcome.failed,
        duration_ms = start.elapsed().as_millis() as u64,
        "sync cycle complete"
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use contextd_core::{ContextdError, Document};
    use contextd_resilience::{CircuitBreakerConfig, HealthMonitorConfig};
    use contextd_wal::{RegexScrubber, WalEntry};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex as StdMutex;

    struct MockRemote {
        upsert_calls: StdMutex<Vec<Vec<String>>>,
        fail_first_n: AtomicUsize,
    }

    #[async_trait::async_trait]
    impl RemoteSync for MockRemote {
        async fn upsert_documents(&self, docs: Vec<Document>) -> contextd_core::Result<Vec<String>> {
            if self.fail_first_n.load(Ordering::SeqCst) > 0 {
                self.fail_first_n.fetch_sub(1, Ordering::SeqCst);
                return Err(ContextdError::Transient("mock failure".into()));
            }
            let ids: Vec<String> = docs.iter().filter_map(|d| d.id.clone()).collect();
            self.upsert_calls.lock().unwrap().push(ids.clone());
            Ok(ids)
        }

        async fn delete_documents(&self, _ids: Vec<String>) -> contextd_core::Result<()> {
            Ok(())
        }
    }

    #[tokio::test]
    async fn replays_pending_entries_in_fifo_order() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Arc::new(Wal::open(dir.path(), Box::new(RegexScrubber)).unwrap());
        for i in 0..3 {
            let entry = WalEntry::new_add(
                format!("e{i}"),
                vec![Document::new("x").with_id(format!("d{i}"))],
                chrono::Utc::now(),
            );
            wal.write_entry(entry).unwrap();
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }

        let health = HealthMonitor::new(HealthMonitorConfig::default());
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
        let remote = Arc::new(MockRemote {
            upsert_calls: StdMutex::new(Vec::new()),
            fail_first_n: AtomicUsize::new(0),
        });

        let outcome = run_cycle(&wal, &health, &breaker, remote.as_ref()).await;
        assert_eq!(outcome.succeeded, 3);
        assert_eq!(outcome.failed, 0);
        assert_eq!(wal.pending_entries().len(), 0);

        let calls = remote.upsert_calls.lock().unwrap();
        assert_eq!(calls[0], vec!["d0"]);
        assert_eq!(calls[1], vec!["d1"]);
        assert_eq!(calls[2], vec!["d2"]);
    }

    #[tokio::test]
    async fn failed_entries_remain_pending_with_recorded_error() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Arc::new(Wal::open(dir.path(), Box::new(RegexScrubber)).unwrap());
        let entry = WalEntry::new_add(
            "e1",
            vec![Document::new("x").with_id("d1")],
            chrono::Utc::now(),
        );
        wal.write_entry(entry).unwrap();

        let health = HealthMonitor::new(HealthMonitorConfig::default());
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
        let remote = Arc::new(MockRemote {
            upsert_calls: StdMutex::new(Vec::new()),
            fail_first_n: AtomicUsize::new(1),
        });

        let outcome = run_cycle(&wal, &health, &breaker, remote.as_ref()).await;
        assert_eq!(outcome.failed, 1);
        let pending = wal.pending_entries();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].sync_attempts, 1);
        assert!(pending[0].sync_error.is_some());
    }

    #[tokio::test]
    async fn skips_cycle_when_unhealthy() {
        let dir = tempfile::tempdir().unwrap();
        let wal = Arc::new(Wal::open(dir.path(), Box::new(RegexScrubber)).unwrap());
        let entry = WalEntry::new_add(
            "e1",
            vec![Document::new("x").with_id("d1")],
            chrono::Utc::now(),
        );
        wal.write_entry(entry).unwrap();

        let health = HealthMonitor::new(HealthMonitorConfig::default());
        health.update_health(false).await;
        let breaker = Arc::new(CircuitBreaker::new(CircuitBreakerConfig::default()));
        let remote = Arc::new(MockRemote {
            upsert_calls: StdMutex::new(Vec::new()),
            fail_first_n: AtomicUsize::new(0),
        });

        let outcome = run_cycle(&wal, &health, &breaker, remote.as_ref()).await;
        assert_eq!(outcome.succeeded, 0);
        assert_eq!(outcome.failed, 0);
        assert_eq!(wal.pending_entries().len(), 1);
        assert!(remote.upsert_calls.lock().unwrap().is_empty());
    }
}
