//! The pending queue and the two outcome ledgers.
//!
//! [`CommandQueue`] is the single source of truth for which collection a
//! command belongs to. It keeps:
//!
//! - **pending** -- sorted ascending by `send_time` after every insertion;
//!   the dispatcher stops scanning at the first command that is not due.
//! - **sent** / **expired** -- append-only ledgers of terminal outcomes.
//!
//! Every mutation writes the affected collection through the world's
//! [`QueueStore`]. Writes are best effort: a failed write is logged and the
//! in-memory state stays authoritative.

use courier_store::{QueueStore, StoreError};
use courier_types::{Command, CommandId, Millis};
use tracing::{debug, warn};

/// Outcome of loading persisted state at startup.
#[derive(Debug, Default)]
pub struct Restored {
    /// Commands whose send time passed while the process was offline.
    /// Already appended to the expired ledger.
    pub expired: Vec<Command>,
    /// Number of commands re-enqueued as pending.
    pub pending: usize,
}

/// In-memory collections backed by a [`QueueStore`].
#[derive(Debug)]
pub struct CommandQueue {
    pending: Vec<Command>,
    sent: Vec<Command>,
    expired: Vec<Command>,
    store: QueueStore,
}

impl CommandQueue {
    /// Create an empty queue over `store`. Nothing is loaded until
    /// [`restore`](Self::restore) is called.
    pub const fn new(store: QueueStore) -> Self {
        Self {
            pending: Vec::new(),
            sent: Vec::new(),
            expired: Vec::new(),
            store,
        }
    }

    /// The world namespace this queue persists under.
    pub fn world(&self) -> &str {
        self.store.world()
    }

    /// Load persisted state and reconcile it against `now`.
    ///
    /// Both ledgers are loaded first. Each command of the pending snapshot
    /// whose send time has already elapsed is moved to the expired ledger;
    /// the rest are enqueued in send-time order. The reconciled pending
    /// queue and expired ledger are written back.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if any collection cannot be read or decoded.
    /// In that case the in-memory state is left untouched.
    pub fn restore(&mut self, now: Millis) -> Result<Restored, StoreError> {
        let sent = self.store.load_sent()?;
        let mut expired = self.store.load_expired()?;
        let snapshot = self.store.load_pending()?;

        let (stale, mut pending): (Vec<Command>, Vec<Command>) =
            snapshot.into_iter().partition(|command| command.is_due(now));
        pending.sort_by_key(|command| command.send_time);
        expired.extend(stale.iter().cloned());

        self.sent = sent;
        self.expired = expired;
        self.pending = pending;

        if !stale.is_empty() {
            self.persist_expired();
        }
        self.persist_pending();

        Ok(Restored {
            pending: self.pending.len(),
            expired: stale,
        })
    }

    // =========================================================================
    // Pending queue
    // =========================================================================

    /// Pending commands, ascending by send time.
    pub fn pending(&self) -> &[Command] {
        &self.pending
    }

    /// Look up a pending command by id.
    pub fn get(&self, id: CommandId) -> Option<&Command> {
        self.pending.iter().find(|command| command.id == id)
    }

    /// Add `command` to the pending queue, restore send-time order, and
    /// persist the snapshot.
    pub fn insert(&mut self, command: Command) {
        self.pending.push(command);
        self.pending.sort_by_key(|command| command.send_time);
        self.persist_pending();
    }

    /// Remove a pending command by id and persist the snapshot.
    pub fn remove(&mut self, id: CommandId) -> Option<Command> {
        let pos = self.pending.iter().position(|command| command.id == id)?;
        let command = self.pending.remove(pos);
        self.persist_pending();
        Some(command)
    }

    /// Ids of every command due at `now`, in queue order.
    ///
    /// Scanning stops at the first command that is not yet due.
    pub fn due_ids(&self, now: Millis) -> Vec<CommandId> {
        self.pending
            .iter()
            .take_while(|command| command.is_due(now))
            .map(|command| command.id)
            .collect()
    }

    /// Count one more failed dispatch for a pending command and persist.
    ///
    /// Returns the new failure count, or `None` if the id is not pending.
    pub fn record_failure(&mut self, id: CommandId) -> Option<u32> {
        let command = self.pending.iter_mut().find(|command| command.id == id)?;
        command.dispatch_failures = command.dispatch_failures.saturating_add(1);
        let failures = command.dispatch_failures;
        self.persist_pending();
        Some(failures)
    }

    // =========================================================================
    // Ledgers
    // =========================================================================

    /// Dispatched commands, in dispatch order.
    pub fn sent(&self) -> &[Command] {
        &self.sent
    }

    /// Expired commands, in expiry order.
    pub fn expired(&self) -> &[Command] {
        &self.expired
    }

    /// Append to the sent ledger and persist it.
    pub fn record_sent(&mut self, command: Command) {
        self.sent.push(command);
        self.persist_sent();
    }

    /// Append to the expired ledger and persist it.
    pub fn record_expired(&mut self, command: Command) {
        self.expired.push(command);
        self.persist_expired();
    }

    /// Empty both ledgers in memory and in storage. The pending queue is
    /// not touched.
    pub fn clear_ledgers(&mut self) {
        self.sent.clear();
        self.expired.clear();
        self.persist_sent();
        self.persist_expired();
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    /// Write all three collections.
    pub fn persist_all(&mut self) {
        self.persist_pending();
        self.persist_sent();
        self.persist_expired();
    }

    fn persist_pending(&mut self) {
        let result = self.store.save_pending(&self.pending);
        log_write(self.store.world(), "pending", self.pending.len(), result);
    }

    fn persist_sent(&mut self) {
        let result = self.store.save_sent(&self.sent);
        log_write(self.store.world(), "sent", self.sent.len(), result);
    }

    fn persist_expired(&mut self) {
        let result = self.store.save_expired(&self.expired);
        log_write(self.store.world(), "expired", self.expired.len(), result);
    }
}

fn log_write(world: &str, collection: &str, count: usize, result: Result<(), StoreError>) {
    match result {
        Ok(()) => debug!(world, collection, count, "Persisted collection"),
        Err(e) => warn!(world, collection, count, error = %e, "Failed to persist collection"),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use courier_store::{KeyValueStore, MemoryStore};
    use courier_types::{Coords, MovementType, Officers, UnitAmount, UnitMap, VillageRef};

    use super::*;

    fn command(send_time: Millis) -> Command {
        let mut units = UnitMap::new();
        units.insert("spear".to_owned(), UnitAmount::All);
        Command {
            id: CommandId::new(),
            origin: VillageRef::unresolved(Coords::new(500, 500)),
            target: VillageRef::unresolved(Coords::new(505, 505)),
            units,
            officers: Officers::new(),
            movement_type: MovementType::Attack,
            arrive_time: send_time.saturating_add(100),
            travel_time: 100,
            send_time,
            dispatch_failures: 0,
            dispatched_units: None,
        }
    }

    fn queue_over(backend: &MemoryStore) -> CommandQueue {
        CommandQueue::new(QueueStore::new(Box::new(backend.clone()), "w").unwrap())
    }

    #[test]
    fn insert_keeps_send_time_order() {
        let backend = MemoryStore::new();
        let mut queue = queue_over(&backend);
        for t in [300, 100, 200, 100] {
            queue.insert(command(t));
            let times: Vec<_> = queue.pending().iter().map(|c| c.send_time).collect();
            let mut sorted = times.clone();
            sorted.sort_unstable();
            assert_eq!(times, sorted);
        }
        assert_eq!(queue.pending().len(), 4);
    }

    #[test]
    fn insert_persists_snapshot() {
        let backend = MemoryStore::new();
        let mut queue = queue_over(&backend);
        queue.insert(command(10));
        let raw = backend.get("w-queue-commands").unwrap().unwrap();
        let stored: Vec<Command> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[test]
    fn remove_by_id() {
        let backend = MemoryStore::new();
        let mut queue = queue_over(&backend);
        let a = command(10);
        let id = a.id;
        queue.insert(a);
        queue.insert(command(20));
        assert_eq!(queue.remove(id).map(|c| c.id), Some(id));
        assert!(queue.remove(id).is_none());
        assert_eq!(queue.pending().len(), 1);
    }

    #[test]
    fn due_ids_stop_at_first_future_command() {
        let backend = MemoryStore::new();
        let mut queue = queue_over(&backend);
        queue.insert(command(10));
        queue.insert(command(20));
        queue.insert(command(30));
        assert_eq!(queue.due_ids(5).len(), 0);
        assert_eq!(queue.due_ids(20).len(), 1);
        assert_eq!(queue.due_ids(21).len(), 2);
        assert_eq!(queue.due_ids(100).len(), 3);
    }

    #[test]
    fn restore_expires_commands_missed_while_offline() {
        let backend = MemoryStore::new();
        let past = command(1_000);
        let future = command(9_000);
        {
            let mut queue = queue_over(&backend);
            queue.insert(future.clone());
            queue.insert(past.clone());
        }

        let mut queue = queue_over(&backend);
        let restored = queue.restore(5_000).unwrap();
        assert_eq!(restored.pending, 1);
        assert_eq!(restored.expired, vec![past.clone()]);
        assert_eq!(queue.pending(), std::slice::from_ref(&future));
        assert_eq!(queue.expired(), std::slice::from_ref(&past));

        // The stale entry is gone from the snapshot, so a second restart
        // does not expire it again.
        let mut again = queue_over(&backend);
        let restored = again.restore(5_000).unwrap();
        assert!(restored.expired.is_empty());
        assert_eq!(again.expired().len(), 1);
    }

    #[test]
    fn symbolic_units_survive_a_restart() {
        let backend = MemoryStore::new();
        let mut pending = command(9_000);
        pending.units = [
            ("axe".to_owned(), UnitAmount::All),
            ("spear".to_owned(), UnitAmount::Reserve(0)),
            ("sword".to_owned(), UnitAmount::Reserve(20)),
            ("ram".to_owned(), UnitAmount::Exact(2)),
        ]
        .into();
        queue_over(&backend).insert(pending.clone());

        let mut queue = queue_over(&backend);
        queue.restore(5_000).unwrap();
        let units = &queue.pending().first().unwrap().units;
        assert_eq!(units.get("axe"), Some(&UnitAmount::All));
        assert_eq!(units.get("spear"), Some(&UnitAmount::All));
        assert_eq!(units.get("sword"), Some(&UnitAmount::Reserve(20)));
        assert_eq!(units.get("ram"), Some(&UnitAmount::Exact(2)));
    }

    #[test]
    fn restore_fails_on_corrupt_snapshot() {
        let mut backend = MemoryStore::new();
        backend.set("w-queue-expired", "nope").unwrap();
        let mut queue = queue_over(&backend);
        assert!(queue.restore(0).is_err());
        assert!(queue.pending().is_empty());
    }

    #[test]
    fn clear_ledgers_leaves_pending_alone() {
        let backend = MemoryStore::new();
        let mut queue = queue_over(&backend);
        queue.insert(command(50));
        queue.record_sent(command(1));
        queue.record_expired(command(2));
        queue.clear_ledgers();
        assert!(queue.sent().is_empty());
        assert!(queue.expired().is_empty());
        assert_eq!(queue.pending().len(), 1);
        assert_eq!(backend.get("w-queue-sended").unwrap().as_deref(), Some("[]"));
        assert_eq!(backend.get("w-queue-expired").unwrap().as_deref(), Some("[]"));
    }

    #[test]
    fn failures_are_counted_and_persisted() {
        let backend = MemoryStore::new();
        let mut queue = queue_over(&backend);
        let c = command(10);
        let id = c.id;
        queue.insert(c);
        assert_eq!(queue.record_failure(id), Some(1));
        assert_eq!(queue.record_failure(id), Some(2));
        assert_eq!(queue.record_failure(CommandId::new()), None);

        let mut reopened = queue_over(&backend);
        reopened.restore(0).unwrap();
        assert_eq!(reopened.get(id).map(|c| c.dispatch_failures), Some(2));
    }
}
