//! Config Snapshot
//!
//! Last-known-good weapon table persisted between runs.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::parser::RawWeapon;
use crate::config::table::WeaponTable;
use crate::config::weapon::WeaponDefinition;

/// File name of the snapshot inside the data directory.
pub const SNAPSHOT_FILE_NAME: &str = "remote_config.cache";

/// Snapshot read/write errors.
#[derive(Debug, Error)]
pub enum SnapshotError {
    /// Filesystem failure.
    #[error("snapshot io error: {0}")]
    Io(#[from] io::Error),
    /// File is not a valid snapshot document.
    #[error("snapshot is corrupt: {0}")]
    Corrupt(#[from] serde_json::Error),
}

/// Persisted copy of the active table.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfigSnapshot {
    /// Weapons in id order.
    pub weapons: Vec<WeaponDefinition>,
    /// When the table was fetched.
    pub last_updated: DateTime<Utc>,
    /// Where the table was fetched from.
    pub source: String,
}

/// On-disk shape; records are re-validated on read.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StoredSnapshot {
    #[serde(default)]
    weapons: Vec<serde_json::Value>,
    #[serde(default)]
    last_updated: Option<DateTime<Utc>>,
    #[serde(default)]
    source: String,
}

impl ConfigSnapshot {
    /// Capture a table fetched from `source`, stamped now.
    pub fn capture(table: &WeaponTable, source: impl Into<String>) -> Self {
        Self {
            weapons: table.iter().cloned().collect(),
            last_updated: Utc::now(),
            source: source.into(),
        }
    }

    /// Rebuild the lookup table.
    pub fn table(&self) -> WeaponTable {
        self.weapons.iter().cloned().collect()
    }
}

/// File-backed snapshot storage.
#[derive(Debug, Clone)]
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    /// Store at an explicit file path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Store at the default file name inside `dir`.
    pub fn in_dir(dir: impl AsRef<Path>) -> Self {
        Self::new(dir.as_ref().join(SNAPSHOT_FILE_NAME))
    }

    /// Snapshot file path.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True if a snapshot file is present.
    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Read the snapshot. Invalid records are dropped silently.
    ///
    /// Returns `Ok(None)` when no file exists.
    pub fn load(&self) -> Result<Option<ConfigSnapshot>, SnapshotError> {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let stored: StoredSnapshot = serde_json::from_str(&text)?;
        let weapons = stored
            .weapons
            .into_iter()
            .filter_map(|value| RawWeapon::from_value(value).ok()?.into_definition().ok())
            .collect();

        Ok(Some(ConfigSnapshot {
            weapons,
            last_updated: stored.last_updated.unwrap_or_default(),
            source: stored.source,
        }))
    }

    /// Replace the snapshot file.
    ///
    /// The document is written next to the target and renamed over it, so a
    /// failed write leaves the previous snapshot intact.
    pub fn save(&self, snapshot: &ConfigSnapshot) -> Result<(), SnapshotError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let json = serde_json::to_string_pretty(snapshot)?;
        let tmp = self.path.with_extension("tmp");
        fs::write(&tmp, json)?;
        fs::rename(&tmp, &self.path)?;

        debug!(target: "remote_config", "Saved {} weapons to {}", snapshot.weapons.len(), self.path.display());
        Ok(())
    }

    /// Delete the snapshot file. Returns whether a file was removed.
    pub fn remove(&self) -> Result<bool, SnapshotError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_table() -> WeaponTable {
        vec![
            WeaponDefinition::new("rifle", 25.0, 0.2).unwrap(),
            WeaponDefinition::new("rocket", 100.0, 3.0).unwrap(),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::in_dir(dir.path());
        let snapshot = ConfigSnapshot::capture(&sample_table(), "https://example.test/weapons.csv");

        store.save(&snapshot).unwrap();
        let loaded = store.load().unwrap().unwrap();

        assert_eq!(loaded.table(), sample_table());
        assert_eq!(loaded.source, "https://example.test/weapons.csv");
        assert_eq!(loaded.last_updated, snapshot.last_updated);
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::in_dir(dir.path());

        assert!(store.load().unwrap().is_none());
        assert!(!store.remove().unwrap());
    }

    #[test]
    fn test_invalid_records_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::in_dir(dir.path());
        fs::write(
            store.path(),
            r#"{"weapons":[{"id":"Rifle","damage":25,"cooldown":0.2},{"id":"bad","damage":-1,"cooldown":1},{"id":null,"damage":1,"cooldown":1}],
               "lastUpdated":"2024-01-01T00:00:00Z","source":"test"}"#,
        )
        .unwrap();

        let loaded = store.load().unwrap().unwrap();
        assert_eq!(loaded.weapons.len(), 1);
        assert_eq!(loaded.weapons[0].id, "rifle");
    }

    #[test]
    fn test_corrupt_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::in_dir(dir.path());
        fs::write(store.path(), "{{{").unwrap();

        assert!(matches!(store.load(), Err(SnapshotError::Corrupt(_))));
    }

    #[test]
    fn test_written_keys_are_camel_case() {
        let dir = tempfile::tempdir().unwrap();
        let store = SnapshotStore::in_dir(dir.path());
        store.save(&ConfigSnapshot::capture(&sample_table(), "src")).unwrap();

        let text = fs::read_to_string(store.path()).unwrap();
        assert!(text.contains("\"lastUpdated\""));
        assert!(text.contains("\"source\": \"src\""));
        assert!(!dir.path().join("remote_config.tmp").exists());
    }
}
