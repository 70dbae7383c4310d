//! Cloud Saves
//!
//! Player sign-in, cloud key/value saves and the offline outbox.
//!
//! ## Module Structure
//!
//! - `store`: device-local string store
//! - `remote`: backend SDK seam and an in-memory backend
//! - `outbox`: durable FIFO of writes awaiting retry
//! - `session`: sign-in, save/load, leaderboard scores

pub mod store;
pub mod remote;
pub mod outbox;
pub mod session;

// Re-export key types
pub use store::{KeyValueStore, MemoryStore, FileStore, StoreError};
pub use remote::{RemoteStore, MemoryRemote, PlayerProfile, RemoteError};
pub use outbox::{Outbox, OutboxConfig, PendingOperation, SaveCallback};
pub use session::{CloudSession, CloudConfig, SaveOutcome, SessionError};
