//! Type-safe identifier wrappers.
//!
//! Command identifiers are generated locally at admission and wrap a random
//! [`Uuid`]. Village identifiers come from the game and are plain integers,
//! so they get their own newtype to keep the two from being mixed up.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for a scheduled command within a world namespace.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommandId(pub Uuid);

impl CommandId {
    /// Create a new random identifier (UUID v4).
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Return the inner [`Uuid`] value.
    pub const fn into_inner(self) -> Uuid {
        self.0
    }
}

impl Default for CommandId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for CommandId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<Uuid> for CommandId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl From<CommandId> for Uuid {
    fn from(id: CommandId) -> Self {
        id.0
    }
}

/// Game-side identifier of a village, as returned by the coordinate lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VillageId(pub u64);

impl VillageId {
    /// Return the raw numeric identifier.
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl core::fmt::Display for VillageId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for VillageId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}
