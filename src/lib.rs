//! # Armory Client
//!
//! Remote weapon configuration and cloud saves for a game client.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      ARMORY CLIENT                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │  config/         - Remote weapon configuration               │
//! │  ├── weapon.rs   - Weapon record, validation, defaults       │
//! │  ├── table.rs    - Immutable id → weapon lookup              │
//! │  ├── csv.rs      - Lenient weapon sheet reader               │
//! │  ├── parser.rs   - Format selection, JSON reader             │
//! │  ├── snapshot.rs - Last-known-good table on disk             │
//! │  ├── source.rs   - HTTP and file document sources            │
//! │  └── loader.rs   - Fetch, install, fall back                 │
//! │                                                              │
//! │  cloud/          - Player saves                              │
//! │  ├── store.rs    - Device-local key/value store              │
//! │  ├── remote.rs   - Backend SDK seam                          │
//! │  ├── outbox.rs   - Offline write queue with retries          │
//! │  └── session.rs  - Sign-in, save/load, scores                │
//! │                                                              │
//! │  events.rs       - Broadcast notifications                   │
//! │  settings.rs     - Environment configuration                 │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Fallback Guarantee
//!
//! Neither half ever leaves the game without data:
//! - A weapon lookup always returns a definition (remote, cached, built-in,
//!   or the generic fallback)
//! - A failed remote read returns the locally cached value
//! - A failed remote write is kept and retried, up to a fixed ceiling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(unsafe_code)]

use std::time::Duration;

pub mod config;
pub mod cloud;
pub mod events;
pub mod settings;

// Re-export commonly used types
pub use config::{ConfigLoader, LoaderConfig, WeaponDefinition, WeaponTable, TableOrigin};
pub use cloud::{CloudSession, CloudConfig, Outbox, KeyValueStore, RemoteStore};
pub use events::{ConfigEvent, CloudEvent};
pub use settings::ClientSettings;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Replay attempts before a pending write is abandoned
pub const MAX_RETRY_ATTEMPTS: u32 = 3;

/// Pause between outbox replay attempts
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Upper bound on one config fetch
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// How often deferred sign-in checks whether the SDK is up
pub const AUTH_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// How long deferred sign-in waits for the SDK (20 polls)
pub const AUTH_WAIT_LIMIT: Duration = Duration::from_secs(10);
