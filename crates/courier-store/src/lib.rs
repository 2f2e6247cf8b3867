//! Namespaced persistence for the Courier command queue.
//!
//! The scheduler keeps three collections per world: the pending queue and
//! the two append-only ledgers (sent, expired). Each is stored as a JSON
//! array under a world-prefixed key so that distinct game worlds never see
//! each other's commands.
//!
//! # Key Patterns
//!
//! | Key | Content |
//! |-----|---------|
//! | `{world}-queue-commands` | Pending commands, sorted by send time |
//! | `{world}-queue-sended` | Dispatched commands |
//! | `{world}-queue-expired` | Commands that missed their window |
//!
//! # Modules
//!
//! - [`kv`] -- The [`KeyValueStore`] trait with memory and file backends
//! - [`queue_store`] -- Typed, namespaced access to the three collections
//! - [`error`] -- Shared error type

pub mod error;
pub mod kv;
pub mod queue_store;

// Re-export primary types for convenience.
pub use error::StoreError;
pub use kv::{FileStore, KeyValueStore, MemoryStore};
pub use queue_store::QueueStore;
