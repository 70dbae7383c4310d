//! Remote Config Loader
//!
//! Fetch → parse → install → persist, with the snapshot and the built-in
//! table as fallbacks.
//!
//! ```text
//!   new() ── snapshot? ──yes──► table (Cache)
//!                 └─────no────► table (Defaults)
//!
//!   load() ── fetch ─ parse ──ok──► swap table (Remote), Loaded, save snapshot
//!                         └─err──► Error(reason); defaults if table empty
//! ```

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;

use thiserror::Error;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use crate::config::parser::{parse_document, ConfigFormat, ParseError};
use crate::config::snapshot::{ConfigSnapshot, SnapshotStore, SNAPSHOT_FILE_NAME};
use crate::config::source::{ConfigSource, SourceError};
use crate::config::table::{TableOrigin, WeaponTable};
use crate::config::weapon::{fallback_for, WeaponDefinition};
use crate::events::{ConfigEvent, EVENT_CHANNEL_CAPACITY};
use crate::DEFAULT_FETCH_TIMEOUT;

/// Loader configuration.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Format of the remote document.
    pub format: ConfigFormat,
    /// Upper bound on a single fetch.
    pub fetch_timeout: Duration,
    /// Fetch in [`ConfigLoader::start`] even when a snapshot was restored.
    pub fetch_on_start: bool,
    /// Snapshot file location.
    pub cache_path: PathBuf,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            format: ConfigFormat::Csv,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            fetch_on_start: false,
            cache_path: PathBuf::from("data").join(SNAPSHOT_FILE_NAME),
        }
    }
}

/// Reasons a load attempt failed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Document could not be retrieved.
    #[error("Network error: {0}")]
    Source(#[from] SourceError),
    /// Document was retrieved but rejected.
    #[error("Failed to parse config data: {0}")]
    Parse(#[from] ParseError),
}

/// Outcome of a load call that did not fail.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// A new table was installed.
    Loaded {
        /// Weapons in the new table.
        weapons: usize,
    },
    /// Another fetch was already running; nothing was done.
    InFlight,
}

struct ActiveTable {
    table: Arc<WeaponTable>,
    origin: TableOrigin,
}

/// Owner of the active weapon table.
pub struct ConfigLoader {
    config: LoaderConfig,
    source: Arc<dyn ConfigSource>,
    snapshots: SnapshotStore,
    active: RwLock<ActiveTable>,
    /// Held for the duration of a fetch.
    fetch_lock: Mutex<()>,
    event_tx: broadcast::Sender<ConfigEvent>,
}

impl ConfigLoader {
    /// Create a loader and restore the last snapshot, or the built-in
    /// table when there is none.
    pub fn new(config: LoaderConfig, source: Arc<dyn ConfigSource>) -> Self {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let snapshots = SnapshotStore::new(config.cache_path.clone());
        debug!(target: "remote_config", "Local cache path: {}", snapshots.path().display());

        let (table, origin) = restore(&snapshots);

        Self {
            config,
            source,
            snapshots,
            active: RwLock::new(ActiveTable {
                table: Arc::new(table),
                origin,
            }),
            fetch_lock: Mutex::new(()),
            event_tx,
        }
    }

    /// Subscribe to loader events.
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigEvent> {
        self.event_tx.subscribe()
    }

    /// Startup hook: fetch when configured to, or when only the built-in
    /// table is available. Returns `None` if no fetch was needed.
    pub async fn start(&self) -> Option<Result<LoadStatus, ConfigError>> {
        if self.config.fetch_on_start || self.origin() == TableOrigin::Defaults {
            Some(self.load().await)
        } else {
            None
        }
    }

    /// Fetch and install the remote document.
    ///
    /// A call made while another fetch is running returns
    /// [`LoadStatus::InFlight`] without touching the network.
    #[instrument(skip(self), fields(source = %self.source.describe()))]
    pub async fn load(&self) -> Result<LoadStatus, ConfigError> {
        let Ok(_guard) = self.fetch_lock.try_lock() else {
            debug!(target: "remote_config", "Load already in flight");
            return Ok(LoadStatus::InFlight);
        };
        self.fetch_and_install().await
    }

    /// Drop the table and the snapshot, then fetch again.
    ///
    /// The snapshot is gone by the time this returns. The returned task
    /// performs exactly one fetch, after any fetch already in flight.
    pub fn reload(self: &Arc<Self>) -> JoinHandle<Result<LoadStatus, ConfigError>> {
        self.clear_cache();
        self.install(WeaponTable::new(), TableOrigin::Empty);

        let loader = Arc::clone(self);
        tokio::spawn(async move {
            let _guard = loader.fetch_lock.lock().await;
            loader.fetch_and_install().await
        })
    }

    /// Delete the snapshot file, leaving the in-memory table alone.
    pub fn clear_cache(&self) {
        match self.snapshots.remove() {
            Ok(true) => info!(target: "remote_config", "Local cache cleared"),
            Ok(false) => {}
            Err(e) => warn!(target: "remote_config", "Failed to delete cache: {}", e),
        }
    }

    /// Case-insensitive lookup; unknown ids resolve to a built-in stand-in.
    pub fn get_weapon(&self, id: &str) -> WeaponDefinition {
        if let Some(weapon) = self.table().get(id) {
            return weapon.clone();
        }
        warn!(target: "remote_config", "Weapon not found: {}, using defaults", id);
        fallback_for(id)
    }

    /// Resolve a weapon for gameplay use and announce it.
    pub fn apply_weapon(&self, id: &str) -> WeaponDefinition {
        let weapon = self.get_weapon(id);
        info!(target: "remote_config", "Applied config to weapon: {}", weapon);
        let _ = self.event_tx.send(ConfigEvent::WeaponApplied {
            weapon: weapon.clone(),
        });
        weapon
    }

    /// Copy of every weapon in the active table.
    pub fn all_weapons(&self) -> BTreeMap<String, WeaponDefinition> {
        self.table().to_map()
    }

    /// The active table.
    pub fn table(&self) -> Arc<WeaponTable> {
        let active = self.active.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&active.table)
    }

    /// Where the active table came from.
    pub fn origin(&self) -> TableOrigin {
        self.active.read().unwrap_or_else(PoisonError::into_inner).origin
    }

    /// True while a fetch is running.
    pub fn is_loading(&self) -> bool {
        self.fetch_lock.try_lock().is_err()
    }

    /// Snapshot location.
    pub fn snapshot_store(&self) -> &SnapshotStore {
        &self.snapshots
    }

    async fn fetch_and_install(&self) -> Result<LoadStatus, ConfigError> {
        info!(target: "remote_config", "Fetching remote config from: {}", self.source.describe());

        let table = match self.fetch_table().await {
            Ok(table) => table,
            Err(e) => {
                self.handle_error(&e);
                return Err(e);
            }
        };

        let weapons = table.len();
        let snapshot = ConfigSnapshot::capture(&table, self.source.describe());
        self.install(table, TableOrigin::Remote);
        info!(target: "remote_config", "Loaded {} weapons ({})", weapons, self.config.format);
        let _ = self.event_tx.send(ConfigEvent::Loaded { weapons });

        if let Err(e) = self.snapshots.save(&snapshot) {
            error!(target: "remote_config", "Failed to save cache: {}", e);
        }

        Ok(LoadStatus::Loaded { weapons })
    }

    async fn fetch_table(&self) -> Result<WeaponTable, ConfigError> {
        let timeout = self.config.fetch_timeout;
        let raw = tokio::time::timeout(timeout, self.source.fetch())
            .await
            .map_err(|_| SourceError::Timeout(timeout))??;
        debug!(target: "remote_config", "Received data: {} bytes", raw.len());

        Ok(parse_document(self.config.format, &raw)?)
    }

    fn handle_error(&self, e: &ConfigError) {
        let reason = e.to_string();
        error!(target: "remote_config", "{}", reason);
        let _ = self.event_tx.send(ConfigEvent::Error { reason });

        if self.table().is_empty() {
            info!(target: "remote_config", "No cache available, loading defaults");
            self.install(WeaponTable::defaults(), TableOrigin::Defaults);
        }
    }

    fn install(&self, table: WeaponTable, origin: TableOrigin) {
        let mut active = self.active.write().unwrap_or_else(PoisonError::into_inner);
        *active = ActiveTable {
            table: Arc::new(table),
            origin,
        };
    }
}

/// Table to start with: the snapshot if it holds any valid weapon.
fn restore(snapshots: &SnapshotStore) -> (WeaponTable, TableOrigin) {
    match snapshots.load() {
        Ok(Some(snapshot)) if !snapshot.weapons.is_empty() => {
            info!(
                target: "remote_config",
                "Loaded {} weapons from cache (cache date: {})",
                snapshot.weapons.len(),
                snapshot.last_updated
            );
            (snapshot.table(), TableOrigin::Cache)
        }
        Ok(Some(_)) => {
            warn!(target: "remote_config", "Cache holds no valid weapons, loading defaults");
            (WeaponTable::defaults(), TableOrigin::Defaults)
        }
        Ok(None) => {
            info!(target: "remote_config", "No local cache found, loading defaults");
            (WeaponTable::defaults(), TableOrigin::Defaults)
        }
        Err(e) => {
            error!(target: "remote_config", "Failed to load cache: {}", e);
            (WeaponTable::defaults(), TableOrigin::Defaults)
        }
    }
}
