//! Dispatch-time resolution of symbolic unit quantities.
//!
//! Wildcards and reservations are only meaningful against the troops that
//! are at home at the instant the command leaves, so resolution happens in
//! the dispatcher, never at admission.

use std::sync::Arc;

use courier_types::{Command, Composition, Coords, UnitAmount, UnitMap};

use crate::host::TroopInventory;

/// Errors raised while resolving a command's units.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// The origin village was never resolved to an id.
    #[error("origin village {coords} has no resolved id")]
    UnresolvedOrigin {
        /// Origin coordinates.
        coords: Coords,
    },

    /// The origin is not one of the player's locally known villages.
    #[error("origin village {coords} is not known locally")]
    UnknownOrigin {
        /// Origin coordinates.
        coords: Coords,
    },

    /// A reservation asks to keep more units than are at home.
    #[error("not enough {unit} to send: {available} at home, {reserve} must stay")]
    InsufficientUnits {
        /// Unit type that fell short.
        unit: String,
        /// Units currently at home.
        available: u32,
        /// Units the command asked to keep.
        reserve: u32,
    },

    /// Every entry resolved to zero, leaving nothing to send.
    #[error("no units left to send")]
    NothingToSend,
}

/// Resolve `units` against the troops currently `available`.
///
/// - `Exact(n)` is used as-is.
/// - `All` becomes the available count and is omitted when that is zero.
/// - `Reserve(k)` becomes `available - k`, omitted when exactly zero and
///   failing the whole command when negative.
///
/// Unit types missing from `available` count as zero.
///
/// # Errors
///
/// Returns [`ResolveError::InsufficientUnits`] on a failed reservation and
/// [`ResolveError::NothingToSend`] if nothing remains.
pub fn resolve_units(units: &UnitMap, available: &Composition) -> Result<Composition, ResolveError> {
    let mut resolved = Composition::new();
    for (unit, amount) in units {
        let at_home = available.get(unit).copied().unwrap_or(0);
        let count = match *amount {
            UnitAmount::Exact(n) => n,
            UnitAmount::All => at_home,
            UnitAmount::Reserve(reserve) => {
                at_home
                    .checked_sub(reserve)
                    .ok_or_else(|| ResolveError::InsufficientUnits {
                        unit: unit.clone(),
                        available: at_home,
                        reserve,
                    })?
            }
        };
        if count > 0 {
            resolved.insert(unit.clone(), count);
        }
    }
    if resolved.is_empty() {
        return Err(ResolveError::NothingToSend);
    }
    Ok(resolved)
}

/// Resolves commands against a live [`TroopInventory`].
#[derive(Clone)]
pub struct UnitResolver {
    inventory: Arc<dyn TroopInventory>,
}

impl core::fmt::Debug for UnitResolver {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("UnitResolver").finish_non_exhaustive()
    }
}

impl UnitResolver {
    /// Create a resolver reading from `inventory`.
    pub fn new(inventory: Arc<dyn TroopInventory>) -> Self {
        Self { inventory }
    }

    /// Resolve `command`'s units against its origin's troops right now.
    ///
    /// # Errors
    ///
    /// Returns [`ResolveError`] if the origin is unknown or the units
    /// cannot be satisfied.
    pub fn resolve(&self, command: &Command) -> Result<Composition, ResolveError> {
        let coords = command.origin.coords;
        let village = command
            .origin
            .id
            .ok_or(ResolveError::UnresolvedOrigin { coords })?;
        let available = self
            .inventory
            .available_units(village)
            .ok_or(ResolveError::UnknownOrigin { coords })?;
        resolve_units(&command.units, &available)
    }
}
