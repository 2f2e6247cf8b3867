//! Enumeration types shared by the scheduler and its hosts.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Movement
// ---------------------------------------------------------------------------

/// The kind of army movement a command dispatches.
///
/// Serialized lowercase, matching the game protocol's `type` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementType {
    /// Hostile movement against the target village.
    Attack,
    /// Troops stationed at the target village in its defence.
    Support,
    /// Troops moved permanently between two of the player's own villages.
    Relocate,
}

impl core::fmt::Display for MovementType {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Self::Attack => "attack",
            Self::Support => "support",
            Self::Relocate => "relocate",
        };
        f.write_str(name)
    }
}

// ---------------------------------------------------------------------------
// Removal
// ---------------------------------------------------------------------------

/// Why a command is being taken out of the pending queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RemoveReason {
    /// The command was dispatched; the `send` event follows separately.
    Sent,
    /// The send window was missed.
    Expired,
    /// The user cancelled the command.
    Removed,
}

// ---------------------------------------------------------------------------
// Event kinds
// ---------------------------------------------------------------------------

/// The name of a lifecycle event, used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    /// A command was admitted to the pending queue.
    Add,
    /// A removal was attempted (found or not).
    Remove,
    /// A command was dispatched.
    Send,
    /// A command missed its window.
    Expired,
    /// An operation failed.
    Error,
    /// The scheduler entered the running state.
    Start,
    /// The scheduler left the running state.
    Stop,
}

impl EventKind {
    /// Every event kind, in canonical order.
    pub const ALL: [Self; 7] = [
        Self::Add,
        Self::Remove,
        Self::Send,
        Self::Expired,
        Self::Error,
        Self::Start,
        Self::Stop,
    ];

    /// The canonical lowercase event name.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Add => "add",
            Self::Remove => "remove",
            Self::Send => "send",
            Self::Expired => "expired",
            Self::Error => "error",
            Self::Start => "start",
            Self::Stop => "stop",
        }
    }
}

impl core::fmt::Display for EventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when an event name does not match any [`EventKind`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownEventKind(pub String);

impl core::fmt::Display for UnknownEventKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "unknown event name: {}", self.0)
    }
}

impl std::error::Error for UnknownEventKind {}

impl core::str::FromStr for EventKind {
    type Err = UnknownEventKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownEventKind(s.to_owned()))
    }
}
