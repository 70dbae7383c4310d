//! Remote Session Store
//!
//! The backend SDK seen as an opaque authorize-then-call service. Its wire
//! protocol belongs to the vendor; only success or failure matters here.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Remote call failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// Backend not reachable.
    #[error("remote unavailable")]
    Unavailable,
    /// Call requires an authorized player.
    #[error("not authorized")]
    Unauthorized,
    /// Backend refused the request.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Signed-in player as reported by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlayerProfile {
    /// Backend player id.
    pub id: u64,
    /// Display name.
    pub name: String,
    /// Account level.
    pub level: u32,
}

/// Cloud save backend.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Bring the SDK up.
    async fn initialize(&self) -> Result<(), RemoteError>;
    /// Sign the player in.
    async fn authorize(&self) -> Result<PlayerProfile, RemoteError>;
    /// Write one key and sync it.
    async fn commit(&self, key: &str, value: &str) -> Result<(), RemoteError>;
    /// Read one key; `None` when the backend has no value.
    async fn fetch(&self, key: &str) -> Result<Option<String>, RemoteError>;
    /// Push a leaderboard score.
    async fn submit_score(&self, leaderboard: &str, score: i64) -> Result<(), RemoteError>;
}

/// In-memory backend with switchable failures, for demos and tests.
#[derive(Debug)]
pub struct MemoryRemote {
    profile: PlayerProfile,
    data: Mutex<BTreeMap<String, String>>,
    scores: Mutex<Vec<(String, i64)>>,
    online: AtomicBool,
    reject_auth: AtomicBool,
    failing_commits: AtomicUsize,
    commit_attempts: AtomicUsize,
}

impl MemoryRemote {
    /// Backend that authorizes as `profile`.
    pub fn new(profile: PlayerProfile) -> Self {
        Self {
            profile,
            data: Mutex::new(BTreeMap::new()),
            scores: Mutex::new(Vec::new()),
            online: AtomicBool::new(true),
            reject_auth: AtomicBool::new(false),
            failing_commits: AtomicUsize::new(0),
            commit_attempts: AtomicUsize::new(0),
        }
    }

    /// While offline every call fails with [`RemoteError::Unavailable`].
    pub fn set_online(&self, online: bool) {
        self.online.store(online, Ordering::SeqCst);
    }

    /// Make `authorize` refuse the player.
    pub fn reject_authorization(&self, reject: bool) {
        self.reject_auth.store(reject, Ordering::SeqCst);
    }

    /// Fail the next `n` commits.
    pub fn fail_next_commits(&self, n: usize) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Commits attempted so far, failed ones included.
    pub fn commit_attempts(&self) -> usize {
        self.commit_attempts.load(Ordering::SeqCst)
    }

    /// Committed value for `key`.
    pub fn value(&self, key: &str) -> Option<String> {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).get(key).cloned()
    }

    /// Scores accepted so far.
    pub fn scores(&self) -> Vec<(String, i64)> {
        self.scores.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn check_online(&self) -> Result<(), RemoteError> {
        if self.online.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(RemoteError::Unavailable)
        }
    }
}

#[async_trait]
impl RemoteStore for MemoryRemote {
    async fn initialize(&self) -> Result<(), RemoteError> {
        self.check_online()
    }

    async fn authorize(&self) -> Result<PlayerProfile, RemoteError> {
        self.check_online()?;
        if self.reject_auth.load(Ordering::SeqCst) {
            return Err(RemoteError::Rejected("authorization refused".into()));
        }
        Ok(self.profile.clone())
    }

    async fn commit(&self, key: &str, value: &str) -> Result<(), RemoteError> {
        self.commit_attempts.fetch_add(1, Ordering::SeqCst);
        self.check_online()?;

        let failing = self
            .failing_commits
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        if failing.is_ok() {
            return Err(RemoteError::Rejected("sync failed".into()));
        }

        self.data
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn fetch(&self, key: &str) -> Result<Option<String>, RemoteError> {
        self.check_online()?;
        Ok(self.value(key))
    }

    async fn submit_score(&self, leaderboard: &str, score: i64) -> Result<(), RemoteError> {
        self.check_online()?;
        self.scores
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((leaderboard.to_string(), score));
        Ok(())
    }
}
