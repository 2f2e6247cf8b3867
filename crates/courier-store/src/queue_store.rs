//! Typed, world-scoped access to the pending queue and the two ledgers.

use courier_types::Command;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::StoreError;
use crate::kv::KeyValueStore;

const PENDING_SUFFIX: &str = "queue-commands";
const SENT_SUFFIX: &str = "queue-sended";
const EXPIRED_SUFFIX: &str = "queue-expired";

/// Persistence for one world's command collections.
pub struct QueueStore {
    backend: Box<dyn KeyValueStore>,
    world: String,
}

impl core::fmt::Debug for QueueStore {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("QueueStore")
            .field("world", &self.world)
            .finish_non_exhaustive()
    }
}

impl QueueStore {
    /// Bind a backend to a world namespace.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError::InvalidNamespace`] if `world` is empty or
    /// contains whitespace or path separators.
    pub fn new(backend: Box<dyn KeyValueStore>, world: impl Into<String>) -> Result<Self, StoreError> {
        let world = world.into();
        if world.is_empty()
            || world
                .chars()
                .any(|c| c.is_whitespace() || c == '/' || c == '\\')
        {
            return Err(StoreError::InvalidNamespace(world));
        }
        Ok(Self { backend, world })
    }

    /// The world namespace.
    pub fn world(&self) -> &str {
        &self.world
    }

    /// Storage key of the pending queue snapshot.
    pub fn pending_key(&self) -> String {
        self.key(PENDING_SUFFIX)
    }

    /// Storage key of the sent ledger.
    pub fn sent_key(&self) -> String {
        self.key(SENT_SUFFIX)
    }

    /// Storage key of the expired ledger.
    pub fn expired_key(&self) -> String {
        self.key(EXPIRED_SUFFIX)
    }

    fn key(&self, suffix: &str) -> String {
        format!("{}-{suffix}", self.world)
    }

    // =========================================================================
    // Loads
    // =========================================================================

    /// Load the pending queue snapshot (empty if never written).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the value cannot be read or decoded.
    pub fn load_pending(&self) -> Result<Vec<Command>, StoreError> {
        self.read_list(&self.pending_key())
    }

    /// Load the sent ledger (empty if never written).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the value cannot be read or decoded.
    pub fn load_sent(&self) -> Result<Vec<Command>, StoreError> {
        self.read_list(&self.sent_key())
    }

    /// Load the expired ledger (empty if never written).
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the value cannot be read or decoded.
    pub fn load_expired(&self) -> Result<Vec<Command>, StoreError> {
        self.read_list(&self.expired_key())
    }

    // =========================================================================
    // Saves
    // =========================================================================

    /// Replace the pending queue snapshot.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the value cannot be encoded or written.
    pub fn save_pending(&mut self, commands: &[Command]) -> Result<(), StoreError> {
        let key = self.pending_key();
        self.write_list(&key, commands)
    }

    /// Replace the sent ledger.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the value cannot be encoded or written.
    pub fn save_sent(&mut self, commands: &[Command]) -> Result<(), StoreError> {
        let key = self.sent_key();
        self.write_list(&key, commands)
    }

    /// Replace the expired ledger.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the value cannot be encoded or written.
    pub fn save_expired(&mut self, commands: &[Command]) -> Result<(), StoreError> {
        let key = self.expired_key();
        self.write_list(&key, commands)
    }

    // =========================================================================
    // Generic JSON list get/set
    // =========================================================================

    fn read_list<T: DeserializeOwned>(&self, key: &str) -> Result<Vec<T>, StoreError> {
        let Some(raw) = self.backend.get(key)? else {
            return Ok(Vec::new());
        };
        let items: Vec<T> =
            serde_json::from_str(&raw).map_err(|source| StoreError::Serialization {
                key: key.to_owned(),
                source,
            })?;
        tracing::trace!(key, count = items.len(), "Loaded list");
        Ok(items)
    }

    fn write_list<T: Serialize>(&mut self, key: &str, items: &[T]) -> Result<(), StoreError> {
        let json = serde_json::to_string(items).map_err(|source| StoreError::Serialization {
            key: key.to_owned(),
            source,
        })?;
        self.backend.set(key, &json)?;
        tracing::trace!(key, count = items.len(), "Stored list");
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use courier_types::{
        CommandId, Coords, MovementType, Officers, UnitAmount, UnitMap, VillageRef,
    };

    use super::*;
    use crate::kv::MemoryStore;

    fn command(send_time: i64) -> Command {
        let mut units = UnitMap::new();
        units.insert("spear".to_owned(), UnitAmount::Exact(10));
        Command {
            id: CommandId::new(),
            origin: VillageRef::unresolved(Coords::new(500, 500)),
            target: VillageRef::unresolved(Coords::new(501, 501)),
            units,
            officers: Officers::new(),
            movement_type: MovementType::Attack,
            arrive_time: send_time.saturating_add(1_000),
            travel_time: 1_000,
            send_time,
            dispatch_failures: 0,
            dispatched_units: None,
        }
    }

    #[test]
    fn keys_are_world_prefixed() {
        let store = QueueStore::new(Box::new(MemoryStore::new()), "en12").unwrap();
        assert_eq!(store.pending_key(), "en12-queue-commands");
        assert_eq!(store.sent_key(), "en12-queue-sended");
        assert_eq!(store.expired_key(), "en12-queue-expired");
    }

    #[test]
    fn rejects_bad_namespaces() {
        for bad in ["", "en 12", "a/b"] {
            assert!(QueueStore::new(Box::new(MemoryStore::new()), bad).is_err());
        }
    }

    #[test]
    fn missing_keys_load_as_empty() {
        let store = QueueStore::new(Box::new(MemoryStore::new()), "w").unwrap();
        assert!(store.load_pending().unwrap().is_empty());
        assert!(store.load_sent().unwrap().is_empty());
        assert!(store.load_expired().unwrap().is_empty());
    }

    #[test]
    fn worlds_are_isolated() {
        let backend = MemoryStore::new();
        let mut w1 = QueueStore::new(Box::new(backend.clone()), "w1").unwrap();
        let w2 = QueueStore::new(Box::new(backend), "w2").unwrap();

        w1.save_pending(&[command(5), command(7)]).unwrap();
        assert_eq!(w1.load_pending().unwrap().len(), 2);
        assert!(w2.load_pending().unwrap().is_empty());
    }

    #[test]
    fn ledgers_are_stored_independently() {
        let mut store = QueueStore::new(Box::new(MemoryStore::new()), "w").unwrap();
        let sent = command(1);
        let expired = command(2);
        store.save_sent(std::slice::from_ref(&sent)).unwrap();
        store.save_expired(std::slice::from_ref(&expired)).unwrap();
        assert_eq!(store.load_sent().unwrap(), vec![sent]);
        assert_eq!(store.load_expired().unwrap(), vec![expired]);
    }

    #[test]
    fn corrupt_snapshot_is_an_error() {
        let mut backend = MemoryStore::new();
        backend.set("w-queue-commands", "{not json").unwrap();
        let store = QueueStore::new(Box::new(backend), "w").unwrap();
        assert!(matches!(
            store.load_pending(),
            Err(StoreError::Serialization { .. })
        ));
    }
}
