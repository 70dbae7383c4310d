//! Config Pipeline
//!
//! Remote weapon configuration: fetch, parse, validate, cache.
//!
//! ## Module Structure
//!
//! - `weapon`: weapon record, validation, built-in defaults
//! - `table`: immutable id → weapon lookup
//! - `csv`: lenient weapon-sheet reader and quoted-field CSV reader
//! - `parser`: format selection and the JSON reader
//! - `snapshot`: last-known-good table on disk
//! - `source`: HTTP and file document sources
//! - `loader`: orchestration and fallbacks

pub mod weapon;
pub mod table;
pub mod csv;
pub mod parser;
pub mod snapshot;
pub mod source;
pub mod loader;

// Re-export key types
pub use weapon::{WeaponDefinition, WeaponError, default_weapons, fallback_for};
pub use table::{WeaponTable, TableOrigin};
pub use parser::{ConfigFormat, ParseError, parse_document};
pub use snapshot::{ConfigSnapshot, SnapshotStore, SnapshotError, SNAPSHOT_FILE_NAME};
pub use source::{ConfigSource, HttpSource, FileSource, SourceError};
pub use loader::{ConfigLoader, LoaderConfig, LoadStatus, ConfigError};
