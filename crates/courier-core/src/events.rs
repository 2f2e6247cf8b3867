//! Synchronous publish/subscribe for scheduler lifecycle events.
//!
//! Handlers are keyed by [`EventKind`] and run in subscription order on the
//! publishing thread. A handler that returns an error or panics is logged
//! and skipped; the remaining handlers for the event still run.

use std::collections::BTreeMap;
use std::panic::{AssertUnwindSafe, catch_unwind};

use courier_types::{EventKind, QueueEvent};
use tracing::warn;

/// A subscriber reported failure while handling an event.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct HandlerError(pub String);

impl From<String> for HandlerError {
    fn from(message: String) -> Self {
        Self(message)
    }
}

impl From<&str> for HandlerError {
    fn from(message: &str) -> Self {
        Self(message.to_owned())
    }
}

/// What a subscriber returns.
pub type HandlerResult = Result<(), HandlerError>;

/// A boxed subscriber.
pub type Handler = Box<dyn FnMut(&QueueEvent) -> HandlerResult + Send>;

/// Handle returned by [`EventBus::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// Name-keyed registry of event handlers.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: BTreeMap<EventKind, Vec<(SubscriptionId, Handler)>>,
}

impl core::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let counts: BTreeMap<EventKind, usize> = self
            .listeners
            .iter()
            .map(|(kind, handlers)| (*kind, handlers.len()))
            .collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}

impl EventBus {
    /// Create a bus with no subscribers.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handler` for events of `kind`.
    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&QueueEvent) -> HandlerResult + Send + 'static,
    {
        self.subscribe_boxed(kind, Box::new(handler))
    }

    /// Register an already boxed handler for events of `kind`.
    pub fn subscribe_boxed(&mut self, kind: EventKind, handler: Handler) -> SubscriptionId {
        let id = SubscriptionId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.listeners.entry(kind).or_default().push((id, handler));
        id
    }

    /// Remove a subscription. Returns `false` if it was not registered.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        for handlers in self.listeners.values_mut() {
            if let Some(pos) = handlers.iter().position(|(sid, _)| *sid == id) {
                handlers.remove(pos);
                return true;
            }
        }
        false
    }

    /// Number of handlers registered for `kind`.
    pub fn listener_count(&self, kind: EventKind) -> usize {
        self.listeners.get(&kind).map_or(0, Vec::len)
    }

    /// Deliver `event` to every handler of its kind, in subscription order.
    ///
    /// Returns the number of handlers that completed successfully.
    pub fn publish(&mut self, event: &QueueEvent) -> usize {
        let kind = event.kind();
        let Some(handlers) = self.listeners.get_mut(&kind) else {
            return 0;
        };
        let mut delivered: usize = 0;
        for (id, handler) in handlers.iter_mut() {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(Ok(())) => delivered = delivered.saturating_add(1),
                Ok(Err(e)) => {
                    warn!(event = %kind, subscription = ?id, error = %e, "Event handler failed");
                }
                Err(_) => {
                    warn!(event = %kind, subscription = ?id, "Event handler panicked");
                }
            }
        }
        delivered
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;

    fn log() -> Arc<Mutex<Vec<String>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn delivers_in_subscription_order() {
        let seen = log();
        let mut bus = EventBus::new();
        for name in ["first", "second", "third"] {
            let seen = Arc::clone(&seen);
            bus.subscribe(EventKind::Stop, move |_| {
                seen.lock().unwrap().push(name.to_owned());
                Ok(())
            });
        }
        assert_eq!(bus.publish(&QueueEvent::Stop), 3);
        assert_eq!(*seen.lock().unwrap(), vec!["first", "second", "third"]);
    }

    #[test]
    fn only_matching_kind_is_delivered() {
        let seen = log();
        let mut bus = EventBus::new();
        let sink = Arc::clone(&seen);
        bus.subscribe(EventKind::Start, move |event| {
            sink.lock().unwrap().push(event.kind().to_string());
            Ok(())
        });
        assert_eq!(bus.publish(&QueueEvent::Stop), 0);
        assert_eq!(bus.publish(&QueueEvent::Start { first_run: true }), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["start"]);
    }

    #[test]
    fn failing_handlers_do_not_block_others() {
        let seen = log();
        let mut bus = EventBus::new();
        bus.subscribe(EventKind::Error, |_| Err("refused".into()));
        bus.subscribe(EventKind::Error, |_| panic!("subscriber bug"));
        let sink = Arc::clone(&seen);
        bus.subscribe(EventKind::Error, move |event| {
            if let QueueEvent::Error { reason } = event {
                sink.lock().unwrap().push(reason.clone());
            }
            Ok(())
        });

        assert_eq!(bus.publish(&QueueEvent::error("boom")), 1);
        assert_eq!(*seen.lock().unwrap(), vec!["boom"]);
    }

    #[test]
    fn unsubscribe_removes_only_that_handler() {
        let mut bus = EventBus::new();
        let a = bus.subscribe(EventKind::Add, |_| Ok(()));
        let _b = bus.subscribe(EventKind::Add, |_| Ok(()));
        assert_eq!(bus.listener_count(EventKind::Add), 2);
        assert!(bus.unsubscribe(a));
        assert!(!bus.unsubscribe(a));
        assert_eq!(bus.listener_count(EventKind::Add), 1);
    }
}
