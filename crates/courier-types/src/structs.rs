//! Core entity structs: coordinates, village references, commands, and the
//! resolved order emitted downstream.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::enums::MovementType;
use crate::ids::{CommandId, VillageId};
use crate::units::{Composition, UnitMap};

/// Milliseconds in the game's own time base.
pub type Millis = i64;

/// Officer flags in protocol form: every requested officer maps to `1`.
pub type Officers = BTreeMap<String, u8>;

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

/// Map coordinates of a village, written `"XXX|YYY"` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Coords {
    /// Column.
    pub x: u16,
    /// Row.
    pub y: u16,
}

/// Returned when a string is not in `"###|###"` form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MalformedCoords(pub String);

impl core::fmt::Display for MalformedCoords {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "coordinates {:?} are not in ###|### form", self.0)
    }
}

impl std::error::Error for MalformedCoords {}

impl Coords {
    /// Create coordinates from their components.
    pub const fn new(x: u16, y: u16) -> Self {
        Self { x, y }
    }
}

fn parse_axis(part: &str) -> Option<u16> {
    if part.len() == 3 && part.bytes().all(|b| b.is_ascii_digit()) {
        part.parse().ok()
    } else {
        None
    }
}

impl core::str::FromStr for Coords {
    type Err = MalformedCoords;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let malformed = || MalformedCoords(s.to_owned());
        let (x, y) = s.split_once('|').ok_or_else(malformed)?;
        let x = parse_axis(x).ok_or_else(malformed)?;
        let y = parse_axis(y).ok_or_else(malformed)?;
        Ok(Self { x, y })
    }
}

impl core::fmt::Display for Coords {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:03}|{:03}", self.x, self.y)
    }
}

impl Serialize for Coords {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Coords {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ---------------------------------------------------------------------------
// Villages
// ---------------------------------------------------------------------------

/// A village as known to the game: id and display name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VillageInfo {
    /// Game identifier.
    pub id: VillageId,
    /// Display name.
    pub name: String,
}

/// One end of a command: the coordinates plus the identity resolved at
/// admission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VillageRef {
    /// Map coordinates, immutable once resolved.
    pub coords: Coords,
    /// Game identifier, `None` until resolved.
    #[serde(default)]
    pub id: Option<VillageId>,
    /// Display name, `None` until resolved.
    #[serde(default)]
    pub name: Option<String>,
}

impl VillageRef {
    /// An unresolved reference to the given coordinates.
    pub const fn unresolved(coords: Coords) -> Self {
        Self {
            coords,
            id: None,
            name: None,
        }
    }

    /// A reference resolved to a known village.
    pub fn resolved(coords: Coords, info: VillageInfo) -> Self {
        Self {
            coords,
            id: Some(info.id),
            name: Some(info.name),
        }
    }
}

// ---------------------------------------------------------------------------
// Requests
// ---------------------------------------------------------------------------

/// Caller-supplied arrival instant, before parsing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ArrivalTime {
    /// Milliseconds in the game time base.
    Millis(Millis),
    /// A date-time string such as `"2026-10-18 21:30:00.500"`.
    Text(String),
}

/// A proposed command, exactly as a caller submits it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandRequest {
    /// Origin coordinates in `"XXX|YYY"` form.
    pub origin: String,
    /// Target coordinates in `"XXX|YYY"` form.
    pub target: String,
    /// Requested unit quantities.
    pub units: UnitMap,
    /// Requested officers (`true` = requested).
    #[serde(default)]
    pub officers: BTreeMap<String, bool>,
    /// Kind of movement.
    #[serde(rename = "type", alias = "movement_type")]
    pub movement_type: MovementType,
    /// Desired arrival instant at the target.
    pub arrive: ArrivalTime,
}

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// A scheduled command.
///
/// Every command lives in exactly one of the pending queue, the sent
/// ledger, or the expired ledger. `send_time` is always
/// `arrive_time - travel_time`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Command {
    /// Identifier, unique within a world namespace.
    pub id: CommandId,
    /// Sending village.
    pub origin: VillageRef,
    /// Receiving village.
    pub target: VillageRef,
    /// Symbolic unit quantities, resolved only at dispatch. On sent
    /// commands these are the exact counts that went out.
    pub units: UnitMap,
    /// Normalized officer flags.
    #[serde(default)]
    pub officers: Officers,
    /// Kind of movement.
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    /// Arrival instant at the target (game time, ms).
    pub arrive_time: Millis,
    /// Transit duration (ms).
    pub travel_time: Millis,
    /// Instant the command must leave the origin (game time, ms).
    pub send_time: Millis,
    /// Consecutive failed dispatch attempts.
    #[serde(default)]
    pub dispatch_failures: u32,
    /// Composition actually emitted; only set on sent commands.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dispatched_units: Option<Composition>,
}

impl Command {
    /// Milliseconds until this command is due, negative once overdue.
    pub const fn due_in(&self, now: Millis) -> Millis {
        self.send_time.saturating_sub(now)
    }

    /// Whether the send instant has already elapsed at `now`.
    pub const fn is_due(&self, now: Millis) -> bool {
        self.due_in(now) < 0
    }

    /// Build the downstream order for a resolved composition.
    ///
    /// Returns `None` if either village was never resolved.
    pub fn order(&self, units: Composition) -> Option<ArmyOrder> {
        Some(ArmyOrder {
            start_village: self.origin.id?,
            target_village: self.target.id?,
            movement_type: self.movement_type,
            units,
            icon: 0,
            officers: self.officers.clone(),
            catapult_target: None,
        })
    }
}

/// The fully resolved payload handed to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArmyOrder {
    /// Sending village id.
    pub start_village: VillageId,
    /// Receiving village id.
    pub target_village: VillageId,
    /// Kind of movement.
    #[serde(rename = "type")]
    pub movement_type: MovementType,
    /// Concrete unit counts.
    pub units: Composition,
    /// Command icon; always `0`.
    pub icon: u8,
    /// Officer flags.
    pub officers: Officers,
    /// Catapult building target; never set by the scheduler.
    pub catapult_target: Option<String>,
}
