//! Shared type definitions for the Courier command scheduler.
//!
//! This crate is the single source of truth for the data model shared by
//! the scheduler core, the persistence layer, and host binaries.
//!
//! # Modules
//!
//! - [`ids`] -- Command and village identifiers
//! - [`enums`] -- Movement types, removal reasons, event names
//! - [`units`] -- Symbolic unit quantities (`exact`, `"*"`, `-k`)
//! - [`structs`] -- Coordinates, commands, and the resolved army order
//! - [`events`] -- Lifecycle events published by the scheduler

pub mod enums;
pub mod events;
pub mod ids;
pub mod structs;
pub mod units;

// Re-export all public types at crate root for convenience.
pub use enums::{EventKind, MovementType, RemoveReason, UnknownEventKind};
pub use events::QueueEvent;
pub use ids::{CommandId, VillageId};
pub use structs::{
    ArmyOrder, ArrivalTime, Command, CommandRequest, Coords, MalformedCoords, Millis, Officers,
    VillageInfo, VillageRef,
};
pub use units::{Composition, UnitAmount, UnitMap, WILDCARD, exact_units};
