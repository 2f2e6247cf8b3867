//! The scheduling engine.
//!
//! [`Scheduler`] ties the pieces together: admission runs the validator,
//! the travel calculator, and the village lookups before a command enters
//! the [`CommandQueue`]; [`Scheduler::tick`] is one step of the dispatcher
//! loop; lifecycle changes are announced on the [`EventBus`].
//!
//! The scheduler is single-owner and synchronous apart from admission,
//! which awaits the host's village lookups. The async driver lives in
//! [`crate::runner`].

use std::sync::Arc;

use courier_store::{QueueStore, StoreError};
use courier_types::{
    Command, CommandId, CommandRequest, Coords, EventKind, Millis, QueueEvent, RemoveReason,
    VillageRef, exact_units,
};
use futures::future;
use tracing::{debug, info, warn};

use crate::clock::GameClock;
use crate::config::SchedulerConfig;
use crate::events::{EventBus, Handler, HandlerResult, SubscriptionId};
use crate::host::{LookupError, TransportError, TroopInventory, Transport, VillageLookup};
use crate::queue::CommandQueue;
use crate::resolver::{ResolveError, UnitResolver};
use crate::travel::{TravelError, TravelTimeCalculator};
use crate::validator::{self, ValidatedRequest, ValidationError, VillageSide};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Reasons a proposed command is refused. Nothing is queued on any of them.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum AdmissionError {
    /// The request is malformed.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The transit duration could not be computed.
    #[error(transparent)]
    Travel(#[from] TravelError),

    /// The command would have to leave now or in the past.
    #[error("command already expired at creation: send time {send_time} is not after {now}")]
    CommandAlreadyExpiredAtCreation {
        /// Derived send instant.
        send_time: Millis,
        /// Clock reading at admission.
        now: Millis,
    },

    /// No village exists at the given coordinates.
    #[error("{side} village {coords} does not exist")]
    UnknownVillage {
        /// Which end failed to resolve.
        side: VillageSide,
        /// The coordinates looked up.
        coords: Coords,
    },

    /// The lookup capability itself failed.
    #[error("{side} village lookup failed: {source}")]
    Lookup {
        /// Which end failed to resolve.
        side: VillageSide,
        /// Underlying lookup failure.
        #[source]
        source: LookupError,
    },

    /// `init` has not been called yet.
    #[error("scheduler is not initialized")]
    NotInitialized,
}

/// Reasons a due command could not be dispatched on this tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// Unit quantities could not be resolved against live troops.
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// The transport refused the order.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The target village carries no resolved id.
    #[error("target village {coords} has no resolved id")]
    UnresolvedTarget {
        /// Target coordinates.
        coords: Coords,
    },
}

/// Errors from scheduler lifecycle operations.
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// Persisted state could not be loaded.
    #[error("store error: {source}")]
    Store {
        /// The underlying store error.
        #[from]
        source: StoreError,
    },
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Capabilities the host lends to the scheduler.
#[derive(Clone)]
pub struct SchedulerHost {
    /// Source of game time.
    pub clock: Arc<dyn GameClock>,
    /// Coordinate to village resolution.
    pub villages: Arc<dyn VillageLookup>,
    /// Live troop counts of the player's villages.
    pub troops: Arc<dyn TroopInventory>,
    /// Outgoing order channel.
    pub transport: Arc<dyn Transport>,
    /// Transit duration calculator.
    pub travel: TravelTimeCalculator,
}

impl core::fmt::Debug for SchedulerHost {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SchedulerHost")
            .field("travel", &self.travel)
            .finish_non_exhaustive()
    }
}

/// Tunables for the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SchedulerSettings {
    /// Failed dispatch attempts after which a command is expired.
    /// `0` retries on every tick until the command is removed.
    pub max_dispatch_attempts: u32,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self::from_config(&SchedulerConfig::default())
    }
}

impl SchedulerSettings {
    /// Settings from the `scheduler` configuration section.
    pub const fn from_config(config: &SchedulerConfig) -> Self {
        Self {
            max_dispatch_attempts: config.max_dispatch_attempts,
        }
    }
}

/// What `init` found in storage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InitReport {
    /// Commands restored to the pending queue.
    pub pending: usize,
    /// Commands expired because their send time passed while offline.
    pub expired: usize,
}

/// Outcome counts of one dispatcher step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Commands dispatched.
    pub sent: usize,
    /// Commands moved to the expired ledger (stopped scheduler or
    /// exhausted attempts).
    pub expired: usize,
    /// Dispatch attempts that failed.
    pub failed: usize,
}

impl TickReport {
    /// Whether the step changed nothing.
    pub const fn is_idle(&self) -> bool {
        self.sent == 0 && self.expired == 0 && self.failed == 0
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// The command scheduler for one world.
#[derive(Debug)]
pub struct Scheduler {
    host: SchedulerHost,
    resolver: UnitResolver,
    queue: CommandQueue,
    events: EventBus,
    settings: SchedulerSettings,
    running: bool,
    initialized: bool,
}

impl Scheduler {
    /// Create a stopped, uninitialized scheduler persisting through `store`.
    pub fn new(host: SchedulerHost, store: QueueStore, settings: SchedulerSettings) -> Self {
        let resolver = UnitResolver::new(Arc::clone(&host.troops));
        Self {
            host,
            resolver,
            queue: CommandQueue::new(store),
            events: EventBus::new(),
            settings,
            running: false,
            initialized: false,
        }
    }

    /// Load persisted state and reconcile it with the current clock.
    ///
    /// Commands whose send time elapsed while the process was offline are
    /// moved to the expired ledger and announced with `expired` events.
    /// Calling `init` again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError::Store`] if persisted state is unreadable;
    /// the scheduler stays uninitialized.
    pub fn init(&mut self) -> Result<InitReport, SchedulerError> {
        if self.initialized {
            debug!(world = self.queue.world(), "Scheduler already initialized");
            return Ok(InitReport {
                pending: self.queue.pending().len(),
                expired: 0,
            });
        }

        let now = self.host.clock.now();
        let restored = self.queue.restore(now)?;
        self.initialized = true;

        for command in restored.expired.iter().cloned() {
            warn!(id = %command.id, send_time = command.send_time, now, "Command missed while offline");
            self.emit(&QueueEvent::Expired(Box::new(command)));
        }

        let report = InitReport {
            pending: restored.pending,
            expired: restored.expired.len(),
        };
        info!(
            world = self.queue.world(),
            pending = report.pending,
            expired = report.expired,
            sent = self.queue.sent().len(),
            "Scheduler initialized"
        );
        Ok(report)
    }

    /// Whether [`init`](Self::init) has completed.
    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    // =========================================================================
    // Admission
    // =========================================================================

    /// Validate, schedule, and enqueue a proposed command.
    ///
    /// On success the command is in the pending queue and an `add` event
    /// has been emitted. On failure an `error` event carrying the reason
    /// is emitted and nothing is queued.
    ///
    /// # Errors
    ///
    /// Returns the [`AdmissionError`] that rejected the request.
    pub async fn add_command(&mut self, request: &CommandRequest) -> Result<Command, AdmissionError> {
        let prepared = self.prepare(request);
        let admitted = match prepared {
            Ok(draft) => resolve_villages(self.host.villages.as_ref(), draft).await,
            Err(e) => Err(e),
        };

        match admitted {
            Ok(command) => {
                debug!(
                    id = %command.id,
                    origin = %command.origin.coords,
                    target = %command.target.coords,
                    send_time = command.send_time,
                    "Command admitted"
                );
                self.queue.insert(command.clone());
                self.emit(&QueueEvent::Add(Box::new(command.clone())));
                Ok(command)
            }
            Err(e) => {
                warn!(origin = %request.origin, target = %request.target, error = %e, "Command rejected");
                self.emit(&QueueEvent::error(e.to_string()));
                Err(e)
            }
        }
    }

    fn prepare(&self, request: &CommandRequest) -> Result<Draft, AdmissionError> {
        if !self.initialized {
            return Err(AdmissionError::NotInitialized);
        }
        let valid = validator::validate(request)?;
        let travel_time = self.host.travel.travel_time(
            valid.origin,
            valid.target,
            &valid.units,
            valid.movement_type,
            &valid.officers,
        )?;
        let send_time = valid.arrive_time.saturating_sub(travel_time);
        let now = self.host.clock.now();
        if send_time <= now {
            return Err(AdmissionError::CommandAlreadyExpiredAtCreation { send_time, now });
        }
        Ok(Draft {
            valid,
            travel_time,
            send_time,
        })
    }

    // =========================================================================
    // Removal
    // =========================================================================

    /// Take a command out of the pending queue.
    ///
    /// Emits `expired` for [`RemoveReason::Expired`], `remove` for
    /// [`RemoveReason::Removed`], and nothing for [`RemoveReason::Sent`]
    /// (the `send` event follows from the dispatcher). When the id is not
    /// pending a `remove` event with `found: false` is emitted.
    ///
    /// Ledger appends are the caller's job.
    pub fn remove_command(&mut self, id: CommandId, reason: RemoveReason) -> bool {
        let manual = reason == RemoveReason::Removed;
        let Some(command) = self.queue.remove(id) else {
            debug!(%id, ?reason, "Command not found for removal");
            self.emit(&QueueEvent::Remove {
                found: false,
                command: None,
                manual,
            });
            return false;
        };

        debug!(%id, ?reason, "Command removed from queue");
        match reason {
            RemoveReason::Sent => {}
            RemoveReason::Expired => self.emit(&QueueEvent::Expired(Box::new(command))),
            RemoveReason::Removed => self.emit(&QueueEvent::Remove {
                found: true,
                command: Some(Box::new(command)),
                manual,
            }),
        }
        true
    }

    // =========================================================================
    // Running state
    // =========================================================================

    /// Switch to the running state. Due commands are dispatched from now on.
    pub fn start(&mut self, first_run: bool) {
        self.running = true;
        info!(world = self.queue.world(), first_run, "Scheduler started");
        self.emit(&QueueEvent::Start { first_run });
    }

    /// Switch to the stopped state. Due commands expire instead of sending.
    pub fn stop(&mut self) {
        self.running = false;
        info!(world = self.queue.world(), "Scheduler stopped");
        self.emit(&QueueEvent::Stop);
    }

    /// Whether due commands are being dispatched.
    pub const fn is_running(&self) -> bool {
        self.running
    }

    // =========================================================================
    // Collections
    // =========================================================================

    /// Pending commands, ascending by send time.
    pub fn commands(&self) -> &[Command] {
        self.queue.pending()
    }

    /// The sent ledger.
    pub fn sent(&self) -> &[Command] {
        self.queue.sent()
    }

    /// The expired ledger.
    pub fn expired(&self) -> &[Command] {
        self.queue.expired()
    }

    /// Empty both ledgers. Pending commands are kept.
    pub fn clear_registers(&mut self) {
        info!(
            world = self.queue.world(),
            sent = self.queue.sent().len(),
            expired = self.queue.expired().len(),
            "Clearing ledgers"
        );
        self.queue.clear_ledgers();
    }

    // =========================================================================
    // Events
    // =========================================================================

    /// Register `handler` for events of `kind`.
    pub fn subscribe<F>(&mut self, kind: EventKind, handler: F) -> SubscriptionId
    where
        F: FnMut(&QueueEvent) -> HandlerResult + Send + 'static,
    {
        self.events.subscribe(kind, handler)
    }

    /// Register an already boxed handler for events of `kind`.
    pub fn subscribe_boxed(&mut self, kind: EventKind, handler: Handler) -> SubscriptionId {
        self.events.subscribe_boxed(kind, handler)
    }

    /// Remove a subscription.
    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    fn emit(&mut self, event: &QueueEvent) {
        self.events.publish(event);
    }

    // =========================================================================
    // Dispatch
    // =========================================================================

    /// Run one dispatcher step.
    ///
    /// Reads the clock once, then walks the pending queue from the front
    /// and handles every command whose send time has elapsed: dispatched
    /// while running, expired while stopped. Stops at the first command
    /// that is not yet due. A failed dispatch leaves the command pending
    /// until `max_dispatch_attempts` is reached.
    pub fn tick(&mut self) -> TickReport {
        let mut report = TickReport::default();
        if !self.initialized || self.queue.pending().is_empty() {
            return report;
        }

        let now = self.host.clock.now();
        for id in self.queue.due_ids(now) {
            let Some(command) = self.queue.get(id).cloned() else {
                continue;
            };
            if !self.running {
                debug!(%id, send_time = command.send_time, now, "Scheduler stopped at send time");
                self.expire_command(command);
                report.expired = report.expired.saturating_add(1);
                continue;
            }
            match self.send_command(command) {
                Ok(()) => report.sent = report.sent.saturating_add(1),
                Err(e) => {
                    report.failed = report.failed.saturating_add(1);
                    if self.dispatch_failed(id, &e) {
                        report.expired = report.expired.saturating_add(1);
                    }
                }
            }
        }

        if !report.is_idle() {
            debug!(
                now,
                sent = report.sent,
                expired = report.expired,
                failed = report.failed,
                "Tick complete"
            );
        }
        report
    }

    fn send_command(&mut self, mut command: Command) -> Result<(), DispatchError> {
        let units = self.resolver.resolve(&command)?;
        let order = command
            .order(units.clone())
            .ok_or(DispatchError::UnresolvedTarget {
                coords: command.target.coords,
            })?;
        self.host.transport.emit(&order)?;

        info!(
            id = %command.id,
            start_village = %order.start_village,
            target_village = %order.target_village,
            movement_type = %order.movement_type,
            "Command dispatched"
        );
        command.units = exact_units(&units);
        command.dispatched_units = Some(units);
        let id = command.id;
        self.queue.record_sent(command.clone());
        self.remove_command(id, RemoveReason::Sent);
        self.emit(&QueueEvent::Send(Box::new(command)));
        Ok(())
    }

    fn expire_command(&mut self, command: Command) {
        let id = command.id;
        self.queue.record_expired(command);
        self.remove_command(id, RemoveReason::Expired);
    }

    /// Count a failed attempt. Returns `true` if the command was expired.
    fn dispatch_failed(&mut self, id: CommandId, error: &DispatchError) -> bool {
        let failures = self.queue.record_failure(id).unwrap_or(0);
        warn!(%id, failures, error = %error, "Dispatch failed");
        self.emit(&QueueEvent::error(format!(
            "command {id} could not be dispatched: {error}"
        )));

        let limit = self.settings.max_dispatch_attempts;
        if limit == 0 || failures < limit {
            return false;
        }
        let Some(command) = self.queue.get(id).cloned() else {
            return false;
        };
        warn!(%id, failures, "Dispatch attempts exhausted, expiring command");
        self.expire_command(command);
        true
    }

    // =========================================================================
    // Shutdown
    // =========================================================================

    /// Stop if running, write every collection, and mark the scheduler
    /// uninitialized so a later `init` reloads from storage.
    pub fn shutdown(&mut self) {
        if self.running {
            self.stop();
        }
        if self.initialized {
            self.queue.persist_all();
            self.initialized = false;
        }
        info!(world = self.queue.world(), "Scheduler shut down");
    }
}

/// A request that passed the synchronous admission checks.
struct Draft {
    valid: ValidatedRequest,
    travel_time: Millis,
    send_time: Millis,
}

/// Resolve both villages concurrently, failing on the first miss.
async fn resolve_villages(villages: &dyn VillageLookup, draft: Draft) -> Result<Command, AdmissionError> {
    let Draft {
        valid,
        travel_time,
        send_time,
    } = draft;
    let (origin, target) = future::try_join(
        lookup_village(villages, VillageSide::Origin, valid.origin),
        lookup_village(villages, VillageSide::Target, valid.target),
    )
    .await?;

    Ok(Command {
        id: CommandId::new(),
        origin,
        target,
        units: valid.units,
        officers: valid.officers,
        movement_type: valid.movement_type,
        arrive_time: valid.arrive_time,
        travel_time,
        send_time,
        dispatch_failures: 0,
        dispatched_units: None,
    })
}

async fn lookup_village(
    villages: &dyn VillageLookup,
    side: VillageSide,
    coords: Coords,
) -> Result<VillageRef, AdmissionError> {
    match villages.village_by_coords(coords).await {
        Ok(Some(info)) => Ok(VillageRef::resolved(coords, info)),
        Ok(None) => Err(AdmissionError::UnknownVillage { side, coords }),
        Err(source) => Err(AdmissionError::Lookup { side, source }),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects, clippy::indexing_slicing)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use courier_store::MemoryStore;
    use courier_types::{ArmyOrder, ArrivalTime, Composition, MovementType, UnitAmount, VillageId};

    use super::*;
    use crate::clock::ManualClock;
    use crate::host::{RecordingTransport, StaticVillages};
    use crate::travel::{ArmyMovementModel, ArmyProfile, EuclideanDistance};

    const NOW: Millis = 1_000_000;

    /// Every army takes exactly one second.
    struct OneSecond;

    impl ArmyMovementModel for OneSecond {
        fn travel_seconds(&self, _army: &ArmyProfile<'_>, _distance: f64) -> Result<f64, TravelError> {
            Ok(1.0)
        }
    }

    struct ClosedTransport;

    impl Transport for ClosedTransport {
        fn emit(&self, _order: &ArmyOrder) -> Result<(), TransportError> {
            Err(TransportError {
                message: "socket closed".to_owned(),
            })
        }
    }

    struct Fixture {
        scheduler: Scheduler,
        clock: ManualClock,
        villages: Arc<StaticVillages>,
        transport: Arc<RecordingTransport>,
        events: Arc<Mutex<Vec<QueueEvent>>>,
    }

    fn fixture_with(transport: Arc<dyn Transport>, recorder: Arc<RecordingTransport>, settings: SchedulerSettings) -> Fixture {
        let clock = ManualClock::new(NOW);
        let troops: Composition = [("spear".to_owned(), 50), ("sword".to_owned(), 10)].into();
        let villages = Arc::new(
            StaticVillages::new()
                .with_own_village(Coords::new(500, 500), VillageId(1), "Home", troops)
                .with_village(Coords::new(505, 505), VillageId(2), "Target"),
        );
        let host = SchedulerHost {
            clock: Arc::new(clock.clone()),
            villages: Arc::clone(&villages) as Arc<dyn VillageLookup>,
            troops: Arc::clone(&villages) as Arc<dyn TroopInventory>,
            transport,
            travel: TravelTimeCalculator::new(Arc::new(EuclideanDistance), Arc::new(OneSecond)),
        };
        let store = QueueStore::new(Box::new(MemoryStore::new()), "w").unwrap();
        let mut scheduler = Scheduler::new(host, store, settings);

        let events = Arc::new(Mutex::new(Vec::new()));
        for kind in EventKind::ALL {
            let sink = Arc::clone(&events);
            scheduler.subscribe(kind, move |event| {
                sink.lock().unwrap().push(event.clone());
                Ok(())
            });
        }
        scheduler.init().unwrap();

        Fixture {
            scheduler,
            clock,
            villages,
            transport: recorder,
            events,
        }
    }

    fn fixture() -> Fixture {
        let recorder = Arc::new(RecordingTransport::new());
        fixture_with(recorder.clone(), recorder, SchedulerSettings::default())
    }

    fn request(units: &[(&str, UnitAmount)], arrive: Millis) -> CommandRequest {
        CommandRequest {
            origin: "500|500".to_owned(),
            target: "505|505".to_owned(),
            units: units.iter().map(|(u, a)| ((*u).to_owned(), *a)).collect(),
            officers: BTreeMap::new(),
            movement_type: MovementType::Attack,
            arrive: ArrivalTime::Millis(arrive),
        }
    }

    fn kinds(events: &Mutex<Vec<QueueEvent>>) -> Vec<EventKind> {
        events.lock().unwrap().iter().map(QueueEvent::kind).collect()
    }

    #[tokio::test]
    async fn admission_derives_send_time() {
        let mut f = fixture();
        let command = f
            .scheduler
            .add_command(&request(&[("spear", UnitAmount::All)], NOW + 5_000))
            .await
            .unwrap();
        assert_eq!(command.travel_time, 1_000);
        assert_eq!(command.send_time, NOW + 4_000);
        assert_eq!(command.origin.id, Some(VillageId(1)));
        assert_eq!(command.target.id, Some(VillageId(2)));
        assert_eq!(f.scheduler.commands(), std::slice::from_ref(&command));
        assert_eq!(kinds(&f.events), vec![EventKind::Add]);
    }

    #[tokio::test]
    async fn late_schedule_is_rejected() {
        let mut f = fixture();
        // send_time == now is not strictly in the future.
        let err = f
            .scheduler
            .add_command(&request(&[("spear", UnitAmount::All)], NOW + 1_000))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            AdmissionError::CommandAlreadyExpiredAtCreation {
                send_time: NOW,
                now: NOW
            }
        );
        assert!(f.scheduler.commands().is_empty());
        assert_eq!(kinds(&f.events), vec![EventKind::Error]);
    }

    #[tokio::test]
    async fn unknown_target_is_rejected() {
        let mut f = fixture();
        let mut req = request(&[("spear", UnitAmount::All)], NOW + 60_000);
        req.target = "600|600".to_owned();
        let err = f.scheduler.add_command(&req).await.unwrap_err();
        assert_eq!(
            err,
            AdmissionError::UnknownVillage {
                side: VillageSide::Target,
                coords: Coords::new(600, 600)
            }
        );
        assert!(f.scheduler.commands().is_empty());
    }

    #[tokio::test]
    async fn admission_requires_init() {
        let recorder = Arc::new(RecordingTransport::new());
        let mut f = fixture_with(recorder.clone(), recorder, SchedulerSettings::default());
        f.scheduler.shutdown();
        let err = f
            .scheduler
            .add_command(&request(&[("spear", UnitAmount::All)], NOW + 60_000))
            .await
            .unwrap_err();
        assert_eq!(err, AdmissionError::NotInitialized);
    }

    #[tokio::test]
    async fn due_command_is_sent_with_resolved_units() {
        let mut f = fixture();
        f.scheduler.start(true);
        let command = f
            .scheduler
            .add_command(&request(
                &[("spear", UnitAmount::All), ("sword", UnitAmount::Reserve(4))],
                NOW + 5_000,
            ))
            .await
            .unwrap();

        f.clock.set(command.send_time);
        assert!(f.scheduler.tick().is_idle());

        f.clock.advance(1);
        let report = f.scheduler.tick();
        assert_eq!(report.sent, 1);

        let expected: Composition = [("spear".to_owned(), 50), ("sword".to_owned(), 6)].into();
        let orders = f.transport.orders();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0].units, expected);
        assert_eq!(orders[0].start_village, VillageId(1));
        assert!(f.scheduler.commands().is_empty());
        let sent = &f.scheduler.sent()[0];
        assert_eq!(sent.dispatched_units.as_ref(), Some(&expected));
        assert_eq!(sent.units, exact_units(&expected));
        assert_eq!(
            kinds(&f.events),
            vec![EventKind::Start, EventKind::Add, EventKind::Send]
        );
    }

    #[tokio::test]
    async fn stopped_scheduler_expires_due_commands() {
        let mut f = fixture();
        let command = f
            .scheduler
            .add_command(&request(&[("spear", UnitAmount::All)], NOW + 5_000))
            .await
            .unwrap();
        f.clock.set(command.send_time + 1);
        let report = f.scheduler.tick();
        assert_eq!(report.expired, 1);
        assert!(f.transport.orders().is_empty());
        assert_eq!(f.scheduler.expired(), std::slice::from_ref(&command));
        assert!(f.scheduler.sent().is_empty());
        assert_eq!(kinds(&f.events), vec![EventKind::Add, EventKind::Expired]);
    }

    #[tokio::test]
    async fn failed_resolution_retries_then_expires() {
        let recorder = Arc::new(RecordingTransport::new());
        let settings = SchedulerSettings {
            max_dispatch_attempts: 3,
        };
        let mut f = fixture_with(recorder.clone(), recorder, settings);
        f.scheduler.start(false);
        let command = f
            .scheduler
            .add_command(&request(&[("sword", UnitAmount::Reserve(20))], NOW + 5_000))
            .await
            .unwrap();
        f.clock.set(command.send_time + 1);

        for attempt in 1..=2 {
            let report = f.scheduler.tick();
            assert_eq!(report.failed, 1);
            assert_eq!(report.expired, 0);
            assert_eq!(f.scheduler.commands()[0].dispatch_failures, attempt);
        }
        let report = f.scheduler.tick();
        assert_eq!((report.failed, report.expired), (1, 1));
        assert!(f.scheduler.commands().is_empty());
        assert_eq!(f.scheduler.expired()[0].dispatch_failures, 3);
        assert!(f.transport.orders().is_empty());
    }

    #[tokio::test]
    async fn shortfall_recovers_before_limit() {
        let mut f = fixture();
        f.scheduler.start(false);
        let command = f
            .scheduler
            .add_command(&request(&[("sword", UnitAmount::Reserve(20))], NOW + 5_000))
            .await
            .unwrap();
        f.clock.set(command.send_time + 1);
        assert_eq!(f.scheduler.tick().failed, 1);

        assert!(f.villages.set_available(VillageId(1), "sword", 25));
        assert_eq!(f.scheduler.tick().sent, 1);
        assert_eq!(f.transport.orders()[0].units.get("sword"), Some(&5));
    }

    #[tokio::test]
    async fn transport_failure_counts_as_dispatch_failure() {
        let recorder = Arc::new(RecordingTransport::new());
        let mut f = fixture_with(Arc::new(ClosedTransport), recorder, SchedulerSettings::default());
        f.scheduler.start(false);
        let command = f
            .scheduler
            .add_command(&request(&[("spear", UnitAmount::Exact(5))], NOW + 5_000))
            .await
            .unwrap();
        f.clock.set(command.send_time + 1);
        assert_eq!(f.scheduler.tick().failed, 1);
        assert_eq!(f.scheduler.commands().len(), 1);
        assert!(f.scheduler.sent().is_empty());
    }

    #[tokio::test]
    async fn manual_removal_emits_remove() {
        let mut f = fixture();
        let command = f
            .scheduler
            .add_command(&request(&[("spear", UnitAmount::All)], NOW + 5_000))
            .await
            .unwrap();
        assert!(f.scheduler.remove_command(command.id, RemoveReason::Removed));
        assert!(!f.scheduler.remove_command(command.id, RemoveReason::Removed));
        assert!(f.scheduler.expired().is_empty());

        let events = f.events.lock().unwrap();
        assert_eq!(
            events[1],
            QueueEvent::Remove {
                found: true,
                command: Some(Box::new(command)),
                manual: true
            }
        );
        assert_eq!(
            events[2],
            QueueEvent::Remove {
                found: false,
                command: None,
                manual: true
            }
        );
    }

    #[test]
    fn start_and_stop_toggle_running() {
        let mut f = fixture();
        assert!(!f.scheduler.is_running());
        f.scheduler.start(true);
        assert!(f.scheduler.is_running());
        f.scheduler.stop();
        assert!(!f.scheduler.is_running());
        assert_eq!(kinds(&f.events), vec![EventKind::Start, EventKind::Stop]);
    }

    #[test]
    fn init_is_idempotent() {
        let mut f = fixture();
        assert!(f.scheduler.is_initialized());
        assert_eq!(f.scheduler.init().unwrap(), InitReport::default());
    }
}
