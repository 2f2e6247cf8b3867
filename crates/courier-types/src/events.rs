//! Lifecycle events published by the scheduler.

use serde::{Deserialize, Serialize};

use crate::enums::EventKind;
use crate::structs::Command;

/// A lifecycle notification with its positional payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "lowercase")]
pub enum QueueEvent {
    /// A command was admitted to the pending queue.
    Add(Box<Command>),
    /// A removal was attempted.
    Remove {
        /// Whether the command was found in the pending queue.
        found: bool,
        /// The removed command, when found.
        command: Option<Box<Command>>,
        /// Whether the removal was a user cancellation.
        manual: bool,
    },
    /// A command was dispatched; its `units` hold the exact counts emitted.
    Send(Box<Command>),
    /// A command missed its send window.
    Expired(Box<Command>),
    /// An operation failed; carries a human-readable reason.
    Error {
        /// Description of the failure.
        reason: String,
    },
    /// The scheduler started running.
    Start {
        /// Whether this is the first start of the session.
        first_run: bool,
    },
    /// The scheduler stopped running.
    Stop,
}

impl QueueEvent {
    /// The subscription key this event is delivered under.
    pub const fn kind(&self) -> EventKind {
        match self {
            Self::Add(_) => EventKind::Add,
            Self::Remove { .. } => EventKind::Remove,
            Self::Send(_) => EventKind::Send,
            Self::Expired(_) => EventKind::Expired,
            Self::Error { .. } => EventKind::Error,
            Self::Start { .. } => EventKind::Start,
            Self::Stop => EventKind::Stop,
        }
    }

    /// Convenience constructor for [`QueueEvent::Error`].
    pub fn error(reason: impl Into<String>) -> Self {
        Self::Error {
            reason: reason.into(),
        }
    }

    /// The command carried by this event, if any.
    pub fn command(&self) -> Option<&Command> {
        match self {
            Self::Add(command) | Self::Send(command) | Self::Expired(command) => Some(command),
            Self::Remove { command, .. } => command.as_deref(),
            Self::Error { .. } | Self::Start { .. } | Self::Stop => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_match_variants() {
        assert_eq!(QueueEvent::Stop.kind(), EventKind::Stop);
        assert_eq!(QueueEvent::error("boom").kind(), EventKind::Error);
        assert_eq!(QueueEvent::Start { first_run: true }.kind(), EventKind::Start);
        let missing = QueueEvent::Remove {
            found: false,
            command: None,
            manual: false,
        };
        assert_eq!(missing.kind(), EventKind::Remove);
        assert!(missing.command().is_none());
    }

    #[test]
    fn events_serialize_with_their_name() {
        let json = serde_json::to_value(QueueEvent::Start { first_run: false }).unwrap_or_default();
        assert_eq!(json["event"], "start");
        assert_eq!(json["first_run"], false);
    }
}
