use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender, SyncSender};
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};

use cavastock_inventory::LedgerSnapshot;

use super::{SavedLedger, SnapshotStore, StoreError};

struct SaveJob {
    snapshot: LedgerSnapshot,
    reply: SyncSender<Result<(), StoreError>>,
}

/// Bounds how long a caller waits on `save`.
///
/// Saves run on one dedicated writer thread, in submission order. A save that
/// outlives `timeout` is reported as [`StoreError::Timeout`] but keeps running;
/// its result is only logged. `load` is passed straight through.
pub struct TimedStore {
    inner: Arc<dyn SnapshotStore>,
    jobs: Sender<SaveJob>,
    timeout: Duration,
}

impl TimedStore {
    pub fn new(inner: Arc<dyn SnapshotStore>, timeout: Duration) -> Result<Self, StoreError> {
        let (jobs, queue) = mpsc::channel::<SaveJob>();
        let writer = Arc::clone(&inner);

        thread::Builder::new()
            .name("snapshot-writer".to_string())
            .spawn(move || {
                for job in queue {
                    let version = job.snapshot.version();
                    let result = writer.save(&job.snapshot);
                    if let Err(unclaimed) = job.reply.send(result) {
                        match unclaimed.0 {
                            Ok(()) => debug!(version, "late snapshot save completed"),
                            Err(err) => warn!(version, error = %err, "late snapshot save failed"),
                        }
                    }
                }
            })?;

        Ok(Self { inner, jobs, timeout })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl std::fmt::Debug for TimedStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimedStore")
            .field("inner", &self.inner.describe())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl SnapshotStore for TimedStore {
    fn load(&self) -> Result<Option<SavedLedger>, StoreError> {
        self.inner.load()
    }

    fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), StoreError> {
        let (reply, outcome) = mpsc::sync_channel(1);
        self.jobs
            .send(SaveJob {
                snapshot: snapshot.clone(),
                reply,
            })
            .map_err(|_| StoreError::Unavailable("snapshot writer stopped".to_string()))?;

        match outcome.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => Err(StoreError::Timeout(self.timeout)),
            Err(RecvTimeoutError::Disconnected) => {
                Err(StoreError::Unavailable("snapshot writer stopped".to_string()))
            }
        }
    }

    fn describe(&self) -> String {
        self.inner.describe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemorySnapshotStore;
    use crate::test_support::versions;
    use std::time::Instant;

    /// Wraps an in-memory store and sleeps before every save.
    struct SlowStore {
        delay: Duration,
        inner: InMemorySnapshotStore,
    }

    impl SnapshotStore for SlowStore {
        fn load(&self) -> Result<Option<SavedLedger>, StoreError> {
            self.inner.load()
        }

        fn save(&self, snapshot: &LedgerSnapshot) -> Result<(), StoreError> {
            thread::sleep(self.delay);
            self.inner.save(snapshot)
        }

        fn describe(&self) -> String {
            "slow".to_string()
        }
    }

    fn wait_for(store: &InMemorySnapshotStore, saves: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while store.save_count() < saves {
            assert!(Instant::now() < deadline, "writer never caught up");
            thread::sleep(Duration::from_millis(10));
        }
    }

    #[test]
    fn fast_saves_pass_through() {
        let inner = Arc::new(InMemorySnapshotStore::new());
        let store = TimedStore::new(inner.clone(), Duration::from_secs(5)).unwrap();
        let snapshots = versions(2);

        store.save(&snapshots[0]).unwrap();
        store.save(&snapshots[1]).unwrap();
        assert_eq!(inner.save_count(), 2);
        assert_eq!(inner.last_version(), Some(2));
        assert_eq!(store.load().unwrap().unwrap().version, 2);
    }

    #[test]
    fn slow_save_times_out_and_finishes_in_order() {
        let slow = Arc::new(SlowStore {
            delay: Duration::from_millis(200),
            inner: InMemorySnapshotStore::new(),
        });
        let store = TimedStore::new(slow.clone(), Duration::from_millis(20)).unwrap();
        let snapshots = versions(2);

        let started = Instant::now();
        let err = store.save(&snapshots[0]).unwrap_err();
        assert!(matches!(err, StoreError::Timeout(_)));
        assert!(started.elapsed() < Duration::from_millis(200));
        assert!(matches!(store.save(&snapshots[1]), Err(StoreError::Timeout(_))));

        wait_for(&slow.inner, 2);
        assert_eq!(slow.inner.last_version(), Some(2));
        assert_eq!(slow.inner.last_saved().unwrap().len(), 2);
    }

    #[test]
    fn failures_of_the_inner_store_are_returned() {
        let inner = Arc::new(InMemorySnapshotStore::new());
        inner.set_failing(true);
        let store = TimedStore::new(inner, Duration::from_secs(5)).unwrap();

        let err = store.save(&versions(1)[0]).unwrap_err();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
