//! Delayed-command scheduling engine for Courier.
//!
//! A command says "have this army arrive at that village at this instant".
//! The engine works backwards from the arrival instant to the moment the
//! army must leave, holds the command until then, and emits it with the
//! troops that are actually at home when it departs.
//!
//! # Modules
//!
//! - [`clock`] -- [`GameClock`] trait with system and manual clocks.
//! - [`config`] -- Configuration loading from `courier-config.yaml` into
//!   strongly-typed structs.
//! - [`events`] -- [`EventBus`] with per-subscriber failure isolation.
//! - [`host`] -- Capabilities borrowed from the host: village lookup, troop
//!   inventory, transport.
//! - [`queue`] -- Sorted pending queue and the sent/expired ledgers.
//! - [`resolver`] -- Dispatch-time resolution of wildcard and reserve
//!   unit quantities.
//! - [`runner`] -- Async tick loop and the [`SchedulerHandle`] control
//!   plane.
//! - [`scheduler`] -- Admission, removal, and the dispatcher step.
//! - [`travel`] -- Transit duration between two villages.
//! - [`validator`] -- Shape checks for proposed commands.
//!
//! [`GameClock`]: clock::GameClock
//! [`EventBus`]: events::EventBus
//! [`SchedulerHandle`]: runner::SchedulerHandle

pub mod clock;
pub mod config;
pub mod events;
pub mod host;
pub mod queue;
pub mod resolver;
pub mod runner;
pub mod scheduler;
pub mod travel;
pub mod validator;

pub use clock::{GameClock, ManualClock, SystemGameClock};
pub use config::{ConfigError, CourierConfig};
pub use events::{EventBus, HandlerError, HandlerResult, SubscriptionId};
pub use host::{LookupError, RecordingTransport, StaticVillages, TroopInventory, Transport, TransportError, VillageLookup};
pub use runner::{QueueSnapshot, RunSummary, RunnerClosed, RunnerError, SchedulerHandle, SchedulerRunner, spawn_scheduler};
pub use scheduler::{
    AdmissionError, DispatchError, InitReport, Scheduler, SchedulerError, SchedulerHost, SchedulerSettings, TickReport,
};
pub use travel::{TravelError, TravelTimeCalculator};
pub use validator::{ValidationError, VillageSide};
