use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use cavastock_inventory::LedgerSnapshot;

use super::{RemoteStore, SyncError, SyncStatus};

/// Timeout and retry settings for remote pushes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    /// Upper bound for a single push attempt.
    pub timeout: Duration,
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubles after each failure.
    pub backoff: Duration,
}

impl Default for SyncPolicy {
    fn default() -> Self {
        Self {
            timeout: Duration::from_millis(5_000),
            max_retries: 3,
            backoff: Duration::from_millis(500),
        }
    }
}

/// Background task pushing the newest snapshot to a [`RemoteStore`].
pub struct SyncWorker {
    remote: Arc<dyn RemoteStore>,
    policy: SyncPolicy,
}

impl SyncWorker {
    pub fn new(remote: Arc<dyn RemoteStore>, policy: SyncPolicy) -> Self {
        Self { remote, policy }
    }

    /// Start the worker on the current tokio runtime.
    pub fn spawn(self) -> SyncHandle {
        let (pending, rx) = watch::channel::<Option<LedgerSnapshot>>(None);
        let (status_tx, status) = watch::channel(SyncStatus::Idle);

        info!(remote = %self.remote.describe(), "sync worker started");
        let task = tokio::spawn(self.run(rx, status_tx));

        SyncHandle {
            pending,
            status,
            task,
        }
    }

    async fn run(
        self,
        mut pending: watch::Receiver<Option<LedgerSnapshot>>,
        status: watch::Sender<SyncStatus>,
    ) {
        // Intermediate snapshots submitted while a push is in flight are skipped;
        // only the newest one matters.
        while pending.changed().await.is_ok() {
            let next = pending.borrow_and_update().clone();
            let Some(snapshot) = next else {
                continue;
            };
            let version = snapshot.version();

            match self.push_with_retry(&snapshot, &status).await {
                Ok(attempts) => {
                    info!(version, attempts, "snapshot synced");
                    status.send_replace(SyncStatus::Success {
                        version,
                        synced_at: Utc::now(),
                    });
                }
                Err(err) => {
                    error!(version, error = %err, "snapshot sync failed");
                    status.send_replace(SyncStatus::Error {
                        version,
                        message: err.to_string(),
                    });
                }
            }
        }

        debug!("sync worker stopped");
    }

    /// Push one snapshot, retrying with exponential backoff.
    ///
    /// Returns the number of attempts used.
    pub async fn push_with_retry(
        &self,
        snapshot: &LedgerSnapshot,
        status: &watch::Sender<SyncStatus>,
    ) -> Result<u32, SyncError> {
        let version = snapshot.version();
        let attempts = self.policy.max_retries + 1;
        let mut delay = self.policy.backoff;
        let mut last = SyncError::Remote("no attempt made".to_string());

        for attempt in 1..=attempts {
            status.send_replace(SyncStatus::Syncing { version, attempt });

            let outcome = tokio::time::timeout(self.policy.timeout, self.remote.push(snapshot)).await;
            match outcome {
                Ok(Ok(())) => return Ok(attempt),
                Ok(Err(err)) => last = err,
                Err(_) => last = SyncError::Timeout(self.policy.timeout),
            }

            if attempt < attempts {
                warn!(version, attempt, error = %last, ?delay, "sync attempt failed, retrying");
                tokio::time::sleep(delay).await;
                delay = delay.saturating_mul(2);
            }
        }

        Err(SyncError::Exhausted {
            attempts,
            last: last.to_string(),
        })
    }
}

/// Owner side of a running [`SyncWorker`].
#[derive(Debug)]
pub struct SyncHandle {
    pending: watch::Sender<Option<LedgerSnapshot>>,
    status: watch::Receiver<SyncStatus>,
    task: JoinHandle<()>,
}

impl SyncHandle {
    /// Queue `snapshot`, replacing any snapshot not yet picked up. Never blocks.
    pub fn submit(&self, snapshot: LedgerSnapshot) {
        self.pending.send_replace(Some(snapshot));
    }

    pub fn status(&self) -> SyncStatus {
        self.status.borrow().clone()
    }

    pub fn watch_status(&self) -> watch::Receiver<SyncStatus> {
        self.status.clone()
    }

    /// Stop accepting snapshots and wait for the pending push to finish.
    pub async fn shutdown(self) {
        let SyncHandle { pending, task, .. } = self;
        drop(pending);
        if let Err(err) = task.await {
            warn!(error = %err, "sync worker ended abnormally");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::versions;
    use async_trait::async_trait;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Remote that fails a fixed number of times, optionally slowly.
    struct ScriptedRemote {
        failures_left: AtomicU32,
        delay: Duration,
        pushed: Mutex<Vec<u64>>,
    }

    impl ScriptedRemote {
        fn new(failures: u32, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                failures_left: AtomicU32::new(failures),
                delay,
                pushed: Mutex::new(Vec::new()),
            })
        }

        fn pushed(&self) -> Vec<u64> {
            self.pushed.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl RemoteStore for ScriptedRemote {
        async fn push(&self, snapshot: &LedgerSnapshot) -> Result<(), SyncError> {
            tokio::time::sleep(self.delay).await;
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(SyncError::Remote("drive unreachable".into()));
            }
            self.pushed.lock().unwrap().push(snapshot.version());
            Ok(())
        }

        fn describe(&self) -> String {
            "scripted".into()
        }
    }

    fn fast_policy(max_retries: u32) -> SyncPolicy {
        SyncPolicy {
            timeout: Duration::from_millis(200),
            max_retries,
            backoff: Duration::from_millis(1),
        }
    }

    async fn settle(handle: &SyncHandle) -> SyncStatus {
        let mut rx = handle.watch_status();
        let status = tokio::time::timeout(
            Duration::from_secs(5),
            rx.wait_for(|s| matches!(s, SyncStatus::Success { .. } | SyncStatus::Error { .. })),
        )
        .await
        .expect("sync did not settle")
        .expect("status channel closed")
        .clone();
        status
    }

    #[tokio::test]
    async fn retries_until_success() {
        let remote = ScriptedRemote::new(2, Duration::ZERO);
        let handle = SyncWorker::new(remote.clone(), fast_policy(3)).spawn();
        assert_eq!(handle.status(), SyncStatus::Idle);

        let snapshot = versions(1).pop().unwrap();
        handle.submit(snapshot);

        match settle(&handle).await {
            SyncStatus::Success { version, .. } => assert_eq!(version, 1),
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(remote.pushed(), vec![1]);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn gives_up_after_max_retries() {
        let remote = ScriptedRemote::new(100, Duration::ZERO);
        let handle = SyncWorker::new(remote.clone(), fast_policy(2)).spawn();
        handle.submit(versions(1).pop().unwrap());

        match settle(&handle).await {
            SyncStatus::Error { message, .. } => {
                assert!(message.contains("3 attempts"), "{message}");
                assert!(message.contains("drive unreachable"), "{message}");
            }
            other => panic!("expected error, got {other:?}"),
        }
        assert!(remote.pushed().is_empty());
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn slow_pushes_time_out() {
        let remote = ScriptedRemote::new(0, Duration::from_millis(500));
        let policy = SyncPolicy {
            timeout: Duration::from_millis(10),
            max_retries: 1,
            backoff: Duration::from_millis(1),
        };
        let worker = SyncWorker::new(remote, policy);
        let (status, _rx) = watch::channel(SyncStatus::Idle);

        let err = worker
            .push_with_retry(&versions(1).pop().unwrap(), &status)
            .await
            .unwrap_err();
        match err {
            SyncError::Exhausted { attempts, last } => {
                assert_eq!(attempts, 2);
                assert!(last.contains("timed out"), "{last}");
            }
            other => panic!("expected exhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn only_newest_pending_snapshot_is_pushed() {
        let remote = ScriptedRemote::new(0, Duration::ZERO);
        let handle = SyncWorker::new(remote.clone(), fast_policy(0)).spawn();

        // Nothing yields between submits, so the worker only ever sees the last one.
        for snapshot in versions(3) {
            handle.submit(snapshot);
        }

        match settle(&handle).await {
            SyncStatus::Success { version, .. } => assert_eq!(version, 3),
            other => panic!("expected success, got {other:?}"),
        }
        assert_eq!(remote.pushed(), vec![3]);
        handle.shutdown().await;
    }

    #[tokio::test]
    async fn shutdown_flushes_pending_snapshot() {
        let remote = ScriptedRemote::new(0, Duration::ZERO);
        let handle = SyncWorker::new(remote.clone(), fast_policy(0)).spawn();
        handle.submit(versions(1).pop().unwrap());
        handle.shutdown().await;
        assert_eq!(remote.pushed(), vec![1]);
    }
}
