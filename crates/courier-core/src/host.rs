//! Capabilities the scheduler borrows from its host.
//!
//! The scheduler owns none of the game state it depends on. Village
//! identities, live troop counts, and the outgoing transport are supplied
//! by the host through the traits in this module:
//!
//! - [`VillageLookup`] -- asynchronous coordinate to village resolution.
//! - [`TroopInventory`] -- units currently available in one of the
//!   player's villages.
//! - [`Transport`] -- fire-and-forget emission of a resolved order.
//!
//! [`StaticVillages`] and [`RecordingTransport`] are in-memory
//! implementations for tests, replays, and offline hosts.

use std::collections::BTreeMap;
use std::sync::Mutex;

use courier_types::{ArmyOrder, Composition, Coords, VillageId, VillageInfo};
use futures::FutureExt;
use futures::future::{self, BoxFuture};

/// A village lookup could not be performed at all (as opposed to finding
/// no village at the coordinates).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("village lookup failed: {message}")]
pub struct LookupError {
    /// Description of the failure.
    pub message: String,
}

/// The transport could not accept an order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport failed: {message}")]
pub struct TransportError {
    /// Description of the failure.
    pub message: String,
}

/// Resolves map coordinates to a village identity.
pub trait VillageLookup: Send + Sync {
    /// Look up the village at `coords`.
    ///
    /// Resolves to `Ok(None)` when no village exists there.
    fn village_by_coords(&self, coords: Coords) -> BoxFuture<'_, Result<Option<VillageInfo>, LookupError>>;
}

/// Live troop availability in the player's own villages.
pub trait TroopInventory: Send + Sync {
    /// Units currently at home in `village`, or `None` if the village is
    /// not one of the player's (or not loaded locally).
    fn available_units(&self, village: VillageId) -> Option<Composition>;
}

/// Emits a resolved order downstream. No acknowledgement is expected.
pub trait Transport: Send + Sync {
    /// Hand `order` to the game connection.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError`] if the order could not be handed off
    /// locally (e.g. the connection is closed).
    fn emit(&self, order: &ArmyOrder) -> Result<(), TransportError>;
}

// ---------------------------------------------------------------------------
// StaticVillages
// ---------------------------------------------------------------------------

/// A fixed village table with mutable troop counts.
///
/// Villages registered with troops count as the player's own and are
/// visible to [`TroopInventory`]; villages registered without troops are
/// only resolvable by coordinates.
#[derive(Debug, Default)]
pub struct StaticVillages {
    villages: BTreeMap<Coords, VillageInfo>,
    troops: Mutex<BTreeMap<VillageId, Composition>>,
}

impl StaticVillages {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a foreign village (resolvable, no troop information).
    #[must_use]
    pub fn with_village(mut self, coords: Coords, id: VillageId, name: &str) -> Self {
        self.villages.insert(
            coords,
            VillageInfo {
                id,
                name: name.to_owned(),
            },
        );
        self
    }

    /// Register one of the player's villages with its current troops.
    #[must_use]
    pub fn with_own_village(
        self,
        coords: Coords,
        id: VillageId,
        name: &str,
        troops: Composition,
    ) -> Self {
        let mut this = self.with_village(coords, id, name);
        if let Ok(table) = this.troops.get_mut() {
            table.insert(id, troops);
        }
        this
    }

    /// Overwrite the available count of one unit type in an own village.
    ///
    /// Returns `false` if `village` is not an own village.
    pub fn set_available(&self, village: VillageId, unit: &str, count: u32) -> bool {
        let Ok(mut table) = self.troops.lock() else {
            return false;
        };
        table.get_mut(&village).is_some_and(|units| {
            units.insert(unit.to_owned(), count);
            true
        })
    }

    /// Number of registered villages.
    pub fn len(&self) -> usize {
        self.villages.len()
    }

    /// Whether no villages are registered.
    pub fn is_empty(&self) -> bool {
        self.villages.is_empty()
    }
}

impl VillageLookup for StaticVillages {
    fn village_by_coords(&self, coords: Coords) -> BoxFuture<'_, Result<Option<VillageInfo>, LookupError>> {
        future::ready(Ok(self.villages.get(&coords).cloned())).boxed()
    }
}

impl TroopInventory for StaticVillages {
    fn available_units(&self, village: VillageId) -> Option<Composition> {
        self.troops.lock().ok()?.get(&village).cloned()
    }
}

// ---------------------------------------------------------------------------
// RecordingTransport
// ---------------------------------------------------------------------------

/// A transport that keeps every emitted order in memory.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    orders: Mutex<Vec<ArmyOrder>>,
}

impl RecordingTransport {
    /// Create an empty recorder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Every order emitted so far, oldest first.
    pub fn orders(&self) -> Vec<ArmyOrder> {
        self.orders.lock().map(|o| o.clone()).unwrap_or_default()
    }
}

impl Transport for RecordingTransport {
    fn emit(&self, order: &ArmyOrder) -> Result<(), TransportError> {
        self.orders
            .lock()
            .map_err(|_err| TransportError {
                message: "recorder lock poisoned".to_owned(),
            })?
            .push(order.clone());
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use courier_types::MovementType;

    use super::*;

    fn troops(pairs: &[(&str, u32)]) -> Composition {
        pairs.iter().map(|(u, n)| ((*u).to_owned(), *n)).collect()
    }

    #[tokio::test]
    async fn static_lookup_resolves_known_coords() {
        let villages = StaticVillages::new().with_village(Coords::new(505, 505), VillageId(9), "Target");
        let hit = villages.village_by_coords(Coords::new(505, 505)).await.unwrap();
        assert_eq!(hit.map(|v| v.id), Some(VillageId(9)));
        let miss = villages.village_by_coords(Coords::new(1, 1)).await.unwrap();
        assert!(miss.is_none());
    }

    #[test]
    fn inventory_only_covers_own_villages() {
        let villages = StaticVillages::new()
            .with_own_village(Coords::new(500, 500), VillageId(1), "Home", troops(&[("spear", 50)]))
            .with_village(Coords::new(505, 505), VillageId(2), "Enemy");
        assert_eq!(villages.len(), 2);
        assert_eq!(
            villages.available_units(VillageId(1)).and_then(|u| u.get("spear").copied()),
            Some(50)
        );
        assert!(villages.available_units(VillageId(2)).is_none());
    }

    #[test]
    fn set_available_updates_live_counts() {
        let villages = StaticVillages::new().with_own_village(
            Coords::new(500, 500),
            VillageId(1),
            "Home",
            Composition::new(),
        );
        assert!(villages.set_available(VillageId(1), "axe", 7));
        assert!(!villages.set_available(VillageId(3), "axe", 7));
        assert_eq!(
            villages.available_units(VillageId(1)).unwrap().get("axe"),
            Some(&7)
        );
    }

    #[test]
    fn recorder_keeps_orders_in_order() {
        let transport = RecordingTransport::new();
        for target in [2, 3] {
            let order = ArmyOrder {
                start_village: VillageId(1),
                target_village: VillageId(target),
                movement_type: MovementType::Attack,
                units: troops(&[("spear", 1)]),
                icon: 0,
                officers: BTreeMap::new(),
                catapult_target: None,
            };
            transport.emit(&order).unwrap();
        }
        let targets: Vec<_> = transport.orders().iter().map(|o| o.target_village).collect();
        assert_eq!(targets, vec![VillageId(2), VillageId(3)]);
    }
}
