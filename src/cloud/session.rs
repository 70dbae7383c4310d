//! Cloud Session
//!
//! Player sign-in and cloud saves on top of a [`RemoteStore`]. Writes that
//! cannot be committed go to the [`Outbox`]; reads that cannot reach the
//! backend fall back to the local cache once and return.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, error, info, instrument, warn};

use crate::cloud::outbox::{cache_key, cache_timestamp_key, Outbox, OutboxConfig, SaveCallback};
use crate::cloud::remote::{PlayerProfile, RemoteError, RemoteStore};
use crate::cloud::store::KeyValueStore;
use crate::events::{CloudEvent, EVENT_CHANNEL_CAPACITY};
use crate::{AUTH_POLL_INTERVAL, AUTH_WAIT_LIMIT};

/// Session configuration.
#[derive(Debug, Clone)]
pub struct CloudConfig {
    /// Outbox retry policy.
    pub outbox: OutboxConfig,
    /// Sign in as soon as the SDK is ready.
    pub auto_authorize: bool,
    /// How often a deferred sign-in checks for the SDK.
    pub auth_poll_interval: Duration,
    /// How long a deferred sign-in waits for the SDK.
    pub auth_wait_limit: Duration,
}

impl Default for CloudConfig {
    fn default() -> Self {
        Self {
            outbox: OutboxConfig::default(),
            auto_authorize: true,
            auth_poll_interval: AUTH_POLL_INTERVAL,
            auth_wait_limit: AUTH_WAIT_LIMIT,
        }
    }
}

/// Session errors.
#[derive(Debug, Error)]
pub enum SessionError {
    /// SDK never became ready while sign-in was waiting.
    #[error("SDK initialization timed out")]
    InitTimeout,
    /// Call requires a signed-in player.
    #[error("player is not authorized")]
    NotAuthorized,
    /// Backend call failed.
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
}

/// What happened to a save request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SaveOutcome {
    /// Committed to the backend directly.
    Committed,
    /// Handed to the outbox.
    Queued,
}

/// Signed-in cloud session.
pub struct CloudSession {
    config: CloudConfig,
    remote: Arc<dyn RemoteStore>,
    store: Arc<dyn KeyValueStore>,
    initialized: AtomicBool,
    authorized: Arc<AtomicBool>,
    player: RwLock<Option<PlayerProfile>>,
    outbox: Outbox,
    event_tx: broadcast::Sender<CloudEvent>,
}

impl CloudSession {
    /// Create a session; nothing talks to the backend until
    /// [`CloudSession::initialize`].
    pub fn new(
        config: CloudConfig,
        remote: Arc<dyn RemoteStore>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let authorized = Arc::new(AtomicBool::new(false));
        let outbox = Outbox::new(
            config.outbox.clone(),
            remote.clone(),
            store.clone(),
            authorized.clone(),
            event_tx.clone(),
        );

        Self {
            config,
            remote,
            store,
            initialized: AtomicBool::new(false),
            authorized,
            player: RwLock::new(None),
            outbox,
            event_tx,
        }
    }

    /// Subscribe to session events.
    pub fn subscribe(&self) -> broadcast::Receiver<CloudEvent> {
        self.event_tx.subscribe()
    }

    /// Bring the SDK up, resume writes left over from the last run and sign
    /// in if `auto_authorize` is set.
    #[instrument(skip(self))]
    pub async fn initialize(&self) -> Result<(), SessionError> {
        info!(target: "cloud", "Initializing SDK...");
        if let Err(e) = self.remote.initialize().await {
            error!(target: "cloud", "SDK error: {}", e);
            return Err(e.into());
        }

        self.initialized.store(true, Ordering::SeqCst);
        info!(target: "cloud", "SDK initialized");
        let _ = self.event_tx.send(CloudEvent::Initialized);

        self.outbox.restore();

        if self.config.auto_authorize {
            self.authorize().await?;
        }
        Ok(())
    }

    /// Sign the player in, waiting for the SDK if it is not ready yet.
    #[instrument(skip(self))]
    pub async fn authorize(&self) -> Result<PlayerProfile, SessionError> {
        if !self.is_initialized() {
            warn!(target: "cloud", "SDK not initialized, authorization deferred");
            self.wait_for_initialization().await?;
        }

        info!(target: "cloud", "Authorizing player...");
        match self.remote.authorize().await {
            Ok(profile) => {
                info!(
                    target: "cloud",
                    "Authorized: id {}, name {}, level {}",
                    profile.id, profile.name, profile.level
                );
                *self.player.write().unwrap_or_else(PoisonError::into_inner) = Some(profile.clone());
                self.authorized.store(true, Ordering::SeqCst);
                let _ = self.event_tx.send(CloudEvent::Authorized);
                Ok(profile)
            }
            Err(e) => {
                error!(target: "cloud", "Authorization failed: {}", e);
                Err(e.into())
            }
        }
    }

    async fn wait_for_initialization(&self) -> Result<(), SessionError> {
        let mut waited = Duration::ZERO;
        while !self.is_initialized() && waited < self.config.auth_wait_limit {
            tokio::time::sleep(self.config.auth_poll_interval).await;
            waited += self.config.auth_poll_interval;
        }

        if self.is_initialized() {
            Ok(())
        } else {
            error!(target: "cloud", "SDK initialization timed out");
            Err(SessionError::InitTimeout)
        }
    }

    /// Save a key to the cloud.
    ///
    /// Without a signed-in player the write is queued and `callback` runs
    /// when the outbox settles it. With one, the write is committed
    /// directly; if that fails `callback` reports the failure and the write
    /// is queued for retry without it.
    pub async fn save(
        &self,
        key: &str,
        value: &str,
        callback: Option<SaveCallback>,
    ) -> SaveOutcome {
        if !self.is_authorized() {
            warn!(target: "cloud", "Player not authorized, queueing save: {}", key);
            self.outbox.enqueue(key, value, callback);
            return SaveOutcome::Queued;
        }

        debug!(target: "cloud", "Saving: {} = {}", key, value);
        match self.remote.commit(key, value).await {
            Ok(()) => {
                info!(target: "cloud", "Cloud save succeeded: {}", key);
                let _ = self.event_tx.send(CloudEvent::SaveSucceeded { key: key.to_string() });
                if let Some(callback) = callback {
                    callback(true, key);
                }
                SaveOutcome::Committed
            }
            Err(e) => {
                error!(target: "cloud", "Cloud save failed: {} ({})", key, e);
                let _ = self.event_tx.send(CloudEvent::SaveFailed { key: key.to_string() });
                if let Some(callback) = callback {
                    callback(false, key);
                }
                self.outbox.enqueue(key, value, None);
                SaveOutcome::Queued
            }
        }
    }

    /// Load a key, from the cloud when possible and from the local cache
    /// otherwise. Returns an empty string when neither has a value.
    pub async fn load(&self, key: &str) -> String {
        if !self.is_authorized() {
            warn!(target: "cloud", "Player not authorized, loading from local cache: {}", key);
            return self.cached_value(key);
        }

        debug!(target: "cloud", "Loading: {}", key);
        match self.remote.fetch(key).await {
            Ok(value) => {
                let value = value.unwrap_or_default();
                info!(target: "cloud", "Cloud load succeeded: {} = {}", key, value);
                let _ = self.event_tx.send(CloudEvent::LoadSucceeded { key: key.to_string() });
                value
            }
            Err(e) => {
                error!(target: "cloud", "Cloud load failed: {} ({})", key, e);
                let _ = self.event_tx.send(CloudEvent::LoadFailed { key: key.to_string() });
                self.cached_value(key)
            }
        }
    }

    /// Locally cached value for `key`, or an empty string.
    pub fn cached_value(&self, key: &str) -> String {
        match self.store.get(&cache_key(key)) {
            Some(value) => {
                let timestamp = self
                    .store
                    .get(&cache_timestamp_key(key))
                    .unwrap_or_else(|| "unknown".to_string());
                debug!(target: "cloud", "Loaded from local cache: {} = {} (from {})", key, value, timestamp);
                value
            }
            None => {
                debug!(target: "cloud", "No cached data: {}", key);
                String::new()
            }
        }
    }

    /// Push a leaderboard score. Requires a signed-in player.
    pub async fn submit_score(&self, leaderboard: &str, score: i64) -> Result<(), SessionError> {
        if !self.is_authorized() {
            warn!(target: "cloud", "Player not authorized, cannot submit score");
            return Err(SessionError::NotAuthorized);
        }

        self.remote.submit_score(leaderboard, score).await.map_err(|e| {
            error!(target: "cloud", "Score submission failed: {}", e);
            SessionError::from(e)
        })?;

        info!(target: "cloud", "Score submitted: {} = {}", leaderboard, score);
        let _ = self.event_tx.send(CloudEvent::ScoreSubmitted {
            leaderboard: leaderboard.to_string(),
            score,
        });
        Ok(())
    }

    /// Drop pending writes and every locally cached value.
    pub fn clear_cache(&self) {
        self.outbox.clear();
        self.store.clear();
        if let Err(e) = self.store.flush() {
            error!(target: "cloud", "Failed to persist cleared cache: {}", e);
        }
        info!(target: "cloud", "Cache cleared");
    }

    /// True once the SDK is ready.
    pub fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    /// True once a player is signed in.
    pub fn is_authorized(&self) -> bool {
        self.authorized.load(Ordering::SeqCst)
    }

    /// Signed-in player's id, or `"Not Authorized"`.
    pub fn player_id(&self) -> String {
        self.with_player(|p| p.id.to_string())
            .unwrap_or_else(|| "Not Authorized".to_string())
    }

    /// Signed-in player's name, or `"Guest"`.
    pub fn player_name(&self) -> String {
        self.with_player(|p| p.name.clone())
            .unwrap_or_else(|| "Guest".to_string())
    }

    /// Signed-in player's level, or 0.
    pub fn player_level(&self) -> u32 {
        self.with_player(|p| p.level).unwrap_or(0)
    }

    /// The outbox behind this session.
    pub fn outbox(&self) -> &Outbox {
        &self.outbox
    }

    fn with_player<T>(&self, f: impl FnOnce(&PlayerProfile) -> T) -> Option<T> {
        if !self.is_authorized() {
            return None;
        }
        self.player
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(f)
    }
}
