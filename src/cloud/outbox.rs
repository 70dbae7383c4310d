//! Cloud Save Outbox
//!
//! Writes that could not be committed right away wait here and are replayed
//! against the remote store until they succeed or run out of attempts.
//!
//! ```text
//!   enqueue ──► Queued ──commit ok──────────────► Committed  (callback true)
//!                 │ ▲
//!                 │ └─ commit failed, attempts < max
//!                 └──── commit failed, attempts = max ──► Abandoned (callback false)
//! ```
//!
//! Only the head of the queue is ever attempted, so a failing head holds
//! back everything behind it until it is abandoned.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

use crate::cloud::remote::{RemoteError, RemoteStore};
use crate::cloud::store::KeyValueStore;
use crate::events::CloudEvent;
use crate::{MAX_RETRY_ATTEMPTS, RETRY_DELAY};

/// Store key holding the serialized pending queue.
pub const MANIFEST_KEY: &str = "outbox_pending";

/// Completion callback: `(success, key)`. Runs at most once.
pub type SaveCallback = Box<dyn FnOnce(bool, &str) + Send + 'static>;

/// Store key of the locally cached value for `key`.
pub fn cache_key(key: &str) -> String {
    format!("cached_{}", key)
}

/// Store key of the time `key` was cached.
pub fn cache_timestamp_key(key: &str) -> String {
    format!("cached_{}_timestamp", key)
}

/// Outbox configuration.
#[derive(Debug, Clone)]
pub struct OutboxConfig {
    /// Attempts before an operation is abandoned.
    pub max_attempts: u32,
    /// Pause between replay cycles.
    pub retry_delay: Duration,
}

impl Default for OutboxConfig {
    fn default() -> Self {
        Self {
            max_attempts: MAX_RETRY_ATTEMPTS,
            retry_delay: RETRY_DELAY,
        }
    }
}

/// One deferred write.
pub struct PendingOperation {
    /// Key to write.
    pub key: String,
    /// Value to write.
    pub value: String,
    /// Failed replay attempts so far.
    pub retry_count: u32,
    callback: Option<SaveCallback>,
    seq: u64,
}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("key", &self.key)
            .field("value", &self.value)
            .field("retry_count", &self.retry_count)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}

/// Manifest entry; callbacks do not survive a restart.
#[derive(Debug, Serialize, Deserialize)]
struct PendingRecord {
    key: String,
    value: String,
    retry_count: u32,
}

#[derive(Default)]
struct OutboxState {
    queue: VecDeque<PendingOperation>,
    replaying: bool,
    next_seq: u64,
}

struct OutboxInner {
    config: OutboxConfig,
    remote: Arc<dyn RemoteStore>,
    store: Arc<dyn KeyValueStore>,
    authorized: Arc<AtomicBool>,
    state: Mutex<OutboxState>,
    event_tx: broadcast::Sender<CloudEvent>,
}

/// FIFO queue of deferred writes with a single replay task.
#[derive(Clone)]
pub struct Outbox {
    inner: Arc<OutboxInner>,
}

impl Outbox {
    /// Create an empty outbox. Replay only commits while `authorized` is set.
    pub fn new(
        config: OutboxConfig,
        remote: Arc<dyn RemoteStore>,
        store: Arc<dyn KeyValueStore>,
        authorized: Arc<AtomicBool>,
        event_tx: broadcast::Sender<CloudEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(OutboxInner {
                config,
                remote,
                store,
                authorized,
                state: Mutex::new(OutboxState::default()),
                event_tx,
            }),
        }
    }

    /// Queue a write, cache its value locally and make sure replay runs.
    pub fn enqueue(&self, key: &str, value: &str, callback: Option<SaveCallback>) {
        self.inner.cache_locally(key, value);

        let pending = {
            let mut state = self.inner.lock_state();
            let seq = state.next_seq;
            state.next_seq += 1;
            state.queue.push_back(PendingOperation {
                key: key.to_string(),
                value: value.to_string(),
                retry_count: 0,
                callback,
                seq,
            });
            state.queue.len()
        };
        info!(target: "cloud", "Operation queued: {} (pending: {})", key, pending);

        self.inner.persist_manifest();
        self.ensure_replaying();
    }

    /// Re-queue operations saved by a previous run. Returns how many were
    /// restored.
    pub fn restore(&self) -> usize {
        let Some(json) = self.inner.store.get(MANIFEST_KEY) else {
            return 0;
        };
        let records: Vec<PendingRecord> = match serde_json::from_str(&json) {
            Ok(records) => records,
            Err(e) => {
                warn!(target: "cloud", "Discarding unreadable outbox manifest: {}", e);
                self.inner.store.remove(MANIFEST_KEY);
                return 0;
            }
        };

        let restored = records.len();
        {
            let mut state = self.inner.lock_state();
            for record in records {
                let seq = state.next_seq;
                state.next_seq += 1;
                state.queue.push_back(PendingOperation {
                    key: record.key,
                    value: record.value,
                    retry_count: record.retry_count,
                    callback: None,
                    seq,
                });
            }
        }

        if restored > 0 {
            info!(target: "cloud", "Restored {} pending operations", restored);
            self.inner.persist_manifest();
            self.ensure_replaying();
        }
        restored
    }

    /// Drop every pending operation without running callbacks.
    pub fn clear(&self) {
        let dropped = {
            let mut state = self.inner.lock_state();
            let dropped = state.queue.len();
            state.queue.clear();
            dropped
        };
        if dropped > 0 {
            debug!(target: "cloud", "Dropped {} pending operations", dropped);
        }
        self.inner.persist_manifest();
    }

    /// Pending operation count.
    pub fn len(&self) -> usize {
        self.inner.lock_state().queue.len()
    }

    /// True if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keys in queue order.
    pub fn pending_keys(&self) -> Vec<String> {
        self.inner.lock_state().queue.iter().map(|op| op.key.clone()).collect()
    }

    /// True while the replay task is alive.
    pub fn is_replaying(&self) -> bool {
        self.inner.lock_state().replaying
    }

    fn ensure_replaying(&self) {
        {
            let mut state = self.inner.lock_state();
            if state.replaying || state.queue.is_empty() {
                return;
            }
            state.replaying = true;
        }
        tokio::spawn(replay(Arc::clone(&self.inner)));
    }
}

/// Replay loop. Exits once the queue is drained.
async fn replay(inner: Arc<OutboxInner>) {
    let delay = inner.config.retry_delay;

    loop {
        let (seq, key, value, attempt) = {
            let mut state = inner.lock_state();
            match state.queue.front() {
                Some(op) => (op.seq, op.key.clone(), op.value.clone(), op.retry_count + 1),
                None => {
                    state.replaying = false;
                    break;
                }
            }
        };

        if !inner.authorized.load(Ordering::SeqCst) {
            debug!(target: "cloud", "Waiting for authorization...");
            tokio::time::sleep(delay).await;
            continue;
        }

        info!(
            target: "cloud",
            "Retrying save: {} (attempt {}/{})",
            key, attempt, inner.config.max_attempts
        );
        let result = inner.remote.commit(&key, &value).await;
        inner.settle_head(seq, result);

        tokio::time::sleep(delay).await;
    }

    debug!(target: "cloud", "Outbox drained");
}

impl OutboxInner {
    fn lock_state(&self) -> MutexGuard<'_, OutboxState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply a commit result to the head operation, if it is still `seq`.
    fn settle_head(&self, seq: u64, result: Result<(), RemoteError>) {
        let finished = {
            let mut state = self.lock_state();
            let outcome = match state.queue.front_mut() {
                Some(head) if head.seq == seq => match &result {
                    Ok(()) => Some(true),
                    Err(e) => {
                        head.retry_count += 1;
                        if head.retry_count >= self.config.max_attempts {
                            error!(target: "cloud", "Retry limit reached: {} ({})", head.key, e);
                            Some(false)
                        } else {
                            warn!(
                                target: "cloud",
                                "Save failed: {} ({}), {} attempts left",
                                head.key, e, self.config.max_attempts - head.retry_count
                            );
                            None
                        }
                    }
                },
                // Cleared while the commit was in flight.
                _ => return,
            };
            outcome.and_then(|success| state.queue.pop_front().map(|op| (op, success)))
        };

        self.persist_manifest();

        let Some((op, success)) = finished else {
            return;
        };
        if success {
            info!(target: "cloud", "Saved from outbox: {}", op.key);
        }
        if let Some(callback) = op.callback {
            callback(success, &op.key);
        }
        let event = if success {
            CloudEvent::SaveSucceeded { key: op.key }
        } else {
            CloudEvent::SaveAbandoned { key: op.key }
        };
        let _ = self.event_tx.send(event);
    }

    fn cache_locally(&self, key: &str, value: &str) {
        self.store.set(&cache_key(key), value);
        self.store.set(&cache_timestamp_key(key), &Utc::now().to_rfc3339());
        match self.store.flush() {
            Ok(()) => debug!(target: "cloud", "Local cache saved: {}", key),
            Err(e) => error!(target: "cloud", "Failed to persist local cache for {}: {}", key, e),
        }
    }

    /// Mirror the queue into the store.
    ///
    /// The manifest entry is written under the state lock, so it always
    /// reflects the latest queue even when callers race.
    fn persist_manifest(&self) {
        {
            let state = self.lock_state();
            let records: Vec<PendingRecord> = state
                .queue
                .iter()
                .map(|op| PendingRecord {
                    key: op.key.clone(),
                    value: op.value.clone(),
                    retry_count: op.retry_count,
                })
                .collect();

            if records.is_empty() {
                self.store.remove(MANIFEST_KEY);
            } else {
                match serde_json::to_string(&records) {
                    Ok(json) => self.store.set(MANIFEST_KEY, &json),
                    Err(e) => error!(target: "cloud", "Failed to encode outbox manifest: {}", e),
                }
            }
        }

        if let Err(e) = self.store.flush() {
            error!(target: "cloud", "Failed to persist outbox manifest: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cloud::remote::{MemoryRemote, PlayerProfile};
    use crate::cloud::store::MemoryStore;

    type Calls = Arc<Mutex<Vec<(bool, String)>>>;

    struct Harness {
        outbox: Outbox,
        remote: Arc<MemoryRemote>,
        store: Arc<MemoryStore>,
        authorized: Arc<AtomicBool>,
        events: broadcast::Receiver<CloudEvent>,
    }

    fn harness(authorized: bool) -> Harness {
        let remote = Arc::new(MemoryRemote::new(PlayerProfile {
            id: 1,
            name: "tester".into(),
            level: 1,
        }));
        let store = Arc::new(MemoryStore::new());
        harness_with(remote, store, authorized)
    }

    fn harness_with(remote: Arc<MemoryRemote>, store: Arc<MemoryStore>, authorized: bool) -> Harness {
        let authorized = Arc::new(AtomicBool::new(authorized));
        let (event_tx, events) = broadcast::channel(16);
        let outbox = Outbox::new(
            OutboxConfig::default(),
            remote.clone(),
            store.clone(),
            authorized.clone(),
            event_tx,
        );
        Harness {
            outbox,
            remote,
            store,
            authorized,
            events,
        }
    }

    fn recorder() -> (Calls, impl Fn() -> SaveCallback) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let make = {
            let calls = calls.clone();
            move || -> SaveCallback {
                let calls = calls.clone();
                Box::new(move |ok: bool, key: &str| calls.lock().unwrap().push((ok, key.to_string())))
            }
        };
        (calls, make)
    }

    #[tokio::test(start_paused = true)]
    async fn test_abandoned_after_three_failures() {
        let mut h = harness(true);
        let (calls, callback) = recorder();
        h.remote.fail_next_commits(10);

        h.outbox.enqueue("coins", "50", Some(callback()));
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(*calls.lock().unwrap(), vec![(false, "coins".to_string())]);
        assert_eq!(h.remote.commit_attempts(), 3);
        assert!(h.outbox.is_empty());
        assert!(!h.outbox.is_replaying());
        assert_eq!(
            h.events.recv().await.unwrap(),
            CloudEvent::SaveAbandoned { key: "coins".into() }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_second_attempt() {
        let h = harness(true);
        let (calls, callback) = recorder();
        h.remote.fail_next_commits(1);

        h.outbox.enqueue("coins", "50", Some(callback()));
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(*calls.lock().unwrap(), vec![(true, "coins".to_string())]);
        assert_eq!(h.remote.commit_attempts(), 2);
        assert_eq!(h.remote.value("coins").as_deref(), Some("50"));
        assert!(h.outbox.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_waits_for_authorization() {
        let h = harness(false);
        h.outbox.enqueue("level", "4", None);

        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(h.remote.commit_attempts(), 0);
        assert_eq!(h.outbox.len(), 1);
        assert!(h.outbox.is_replaying());

        h.authorized.store(true, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(h.remote.value("level").as_deref(), Some("4"));
        assert!(h.outbox.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stuck_head_blocks_later_items() {
        let h = harness(true);
        let (calls, callback) = recorder();
        h.remote.fail_next_commits(3);

        h.outbox.enqueue("first", "1", Some(callback()));
        h.outbox.enqueue("second", "2", Some(callback()));
        assert_eq!(h.outbox.pending_keys(), vec!["first", "second"]);

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(
            *calls.lock().unwrap(),
            vec![(false, "first".to_string()), (true, "second".to_string())]
        );
        assert_eq!(h.remote.commit_attempts(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueue_caches_value_locally() {
        let h = harness(true);
        h.outbox.enqueue("coins", "50", None);

        assert_eq!(h.store.get(&cache_key("coins")).as_deref(), Some("50"));
        assert!(h.store.contains(&cache_timestamp_key("coins")));
        assert!(h.store.contains(MANIFEST_KEY));

        tokio::time::sleep(Duration::from_secs(10)).await;

        // Cached value stays after the commit; the manifest does not.
        assert_eq!(h.store.get(&cache_key("coins")).as_deref(), Some("50"));
        assert!(!h.store.contains(MANIFEST_KEY));
    }

    #[tokio::test(start_paused = true)]
    async fn test_restore_after_restart() {
        let before = harness(false);
        before.outbox.enqueue("coins", "50", None);
        before.outbox.enqueue("level", "2", None);

        let after = harness_with(before.remote.clone(), before.store.clone(), true);
        assert_eq!(after.outbox.restore(), 2);
        assert_eq!(after.outbox.pending_keys(), vec!["coins", "level"]);

        // Stop the old instance's replay loop.
        before.outbox.clear();
        tokio::time::sleep(Duration::from_secs(30)).await;

        assert_eq!(after.remote.value("coins").as_deref(), Some("50"));
        assert_eq!(after.remote.value("level").as_deref(), Some("2"));
        assert!(after.outbox.is_empty());
    }

    /// Store whose first manifest removal stalls, widening the window in
    /// which another task can enqueue.
    #[derive(Default)]
    struct StallingStore {
        inner: MemoryStore,
        stalled: AtomicBool,
    }

    impl KeyValueStore for StallingStore {
        fn get(&self, key: &str) -> Option<String> {
            self.inner.get(key)
        }

        fn set(&self, key: &str, value: &str) {
            self.inner.set(key, value);
        }

        fn remove(&self, key: &str) -> bool {
            if key == MANIFEST_KEY && !self.stalled.swap(true, Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(300));
            }
            self.inner.remove(key)
        }

        fn clear(&self) {
            self.inner.clear();
        }

        fn flush(&self) -> Result<(), crate::cloud::store::StoreError> {
            Ok(())
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_manifest_keeps_write_enqueued_during_settle() {
        let remote = Arc::new(MemoryRemote::new(PlayerProfile {
            id: 1,
            name: "tester".into(),
            level: 1,
        }));
        let store = Arc::new(StallingStore::default());
        let (event_tx, _events) = broadcast::channel(16);
        let outbox = Outbox::new(
            OutboxConfig::default(),
            remote.clone(),
            store.clone(),
            Arc::new(AtomicBool::new(true)),
            event_tx,
        );

        // "first" commits at once and its settle stalls on the manifest.
        outbox.enqueue("first", "1", None);
        tokio::time::sleep(Duration::from_millis(100)).await;
        outbox.enqueue("second", "2", None);

        assert_eq!(remote.value("first").as_deref(), Some("1"));
        assert_eq!(outbox.pending_keys(), vec!["second"]);
        let manifest: Vec<PendingRecord> =
            serde_json::from_str(&store.get(MANIFEST_KEY).unwrap()).unwrap();
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].key, "second");
    }

    #[tokio::test(start_paused = true)]
    async fn test_clear_drops_pending() {
        let h = harness(false);
        h.outbox.enqueue("coins", "50", None);

        h.outbox.clear();
        tokio::time::sleep(Duration::from_secs(10)).await;

        assert!(h.outbox.is_empty());
        assert!(!h.outbox.is_replaying());
        assert!(!h.store.contains(MANIFEST_KEY));
    }
}
