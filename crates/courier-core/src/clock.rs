//! Game clock sources.
//!
//! The scheduler never reads wall-clock time directly. All temporal
//! decisions go through a [`GameClock`], which reports "now" in the game
//! server's own time base (milliseconds since the Unix epoch, shifted by the
//! server's offset from the local machine).
//!
//! - [`SystemGameClock`] -- local UTC time plus a fixed server offset.
//! - [`ManualClock`] -- a shared, settable clock for tests and replays.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use courier_types::Millis;

/// A source of the current game time.
pub trait GameClock: Send + Sync {
    /// Current instant in game time, in milliseconds.
    fn now(&self) -> Millis;
}

/// Local UTC time corrected by the game server's clock offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SystemGameClock {
    /// Milliseconds to add to local time to obtain server time.
    offset_ms: Millis,
}

impl SystemGameClock {
    /// Create a clock that runs `offset_ms` ahead of local UTC time
    /// (negative values run behind).
    pub const fn new(offset_ms: Millis) -> Self {
        Self { offset_ms }
    }

    /// The configured server offset.
    pub const fn offset_ms(&self) -> Millis {
        self.offset_ms
    }
}

impl GameClock for SystemGameClock {
    fn now(&self) -> Millis {
        Utc::now().timestamp_millis().saturating_add(self.offset_ms)
    }
}

/// A clock that only moves when told to. Clones share the same instant.
#[derive(Debug, Clone, Default)]
pub struct ManualClock {
    now: Arc<AtomicI64>,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: Millis) -> Self {
        Self {
            now: Arc::new(AtomicI64::new(start)),
        }
    }

    /// Jump to an absolute instant.
    pub fn set(&self, now: Millis) {
        self.now.store(now, Ordering::SeqCst);
    }

    /// Move forward by `delta` milliseconds (backwards if negative).
    /// Returns the new instant.
    pub fn advance(&self, delta: Millis) -> Millis {
        let previous = self
            .now
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |t| {
                Some(t.saturating_add(delta))
            })
            .unwrap_or_else(|t| t);
        previous.saturating_add(delta)
    }
}

impl GameClock for ManualClock {
    fn now(&self) -> Millis {
        self.now.load(Ordering::SeqCst)
    }
}
