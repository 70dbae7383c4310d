//! Host Notifications
//!
//! Events published to any number of listeners over
//! `tokio::sync::broadcast`. Listeners that fall behind lose the oldest
//! events; nothing in the core waits on them.

use serde::{Deserialize, Serialize};

use crate::config::weapon::WeaponDefinition;

/// Capacity of each broadcast channel.
pub const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Config pipeline notifications.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConfigEvent {
    /// A fetched document replaced the active table.
    Loaded {
        /// Number of weapons in the new table.
        weapons: usize,
    },
    /// A fetch or parse failed.
    Error {
        /// Human-readable reason.
        reason: String,
    },
    /// A weapon definition was handed to gameplay code.
    WeaponApplied {
        /// The applied definition.
        weapon: WeaponDefinition,
    },
}

/// Cloud session notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CloudEvent {
    /// Remote SDK is ready.
    Initialized,
    /// Player signed in.
    Authorized,
    /// A key was committed remotely (directly or from the outbox).
    SaveSucceeded {
        /// Saved key.
        key: String,
    },
    /// A direct commit failed; the write was queued.
    SaveFailed {
        /// Key being saved.
        key: String,
    },
    /// A queued write hit the retry ceiling and was dropped.
    SaveAbandoned {
        /// Dropped key.
        key: String,
    },
    /// A key was read from the remote store.
    LoadSucceeded {
        /// Loaded key.
        key: String,
    },
    /// A remote read failed; the cached value was used.
    LoadFailed {
        /// Key being loaded.
        key: String,
    },
    /// A leaderboard score was accepted.
    ScoreSubmitted {
        /// Leaderboard id.
        leaderboard: String,
        /// Submitted score.
        score: i64,
    },
}
