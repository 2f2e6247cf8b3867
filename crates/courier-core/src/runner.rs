//! Async driver for a [`Scheduler`].
//!
//! [`SchedulerRunner`] owns the scheduler on a single task and interleaves
//! two things:
//!
//! - **Ticks**: a [`tokio::time::interval`] calls [`Scheduler::tick`]. Late
//!   ticks are skipped, never bunched.
//! - **Control requests**: public operations arrive over an mpsc channel
//!   from cloneable [`SchedulerHandle`]s and are answered on oneshot
//!   channels.
//!
//! Because only this task touches the scheduler, ticks and operations never
//! interleave mid-step. The loop ends on [`SchedulerHandle::shutdown`] or
//! when every handle has been dropped, and persists state on the way out.

use std::time::Duration;

use courier_types::{Command, CommandId, CommandRequest, EventKind, QueueEvent, RemoveReason};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

use crate::events::{Handler, HandlerResult, SubscriptionId};
use crate::scheduler::{AdmissionError, Scheduler, SchedulerError, TickReport};

/// The runner task is gone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("scheduler task is no longer running")]
pub struct RunnerClosed;

/// Errors surfaced to callers of a [`SchedulerHandle`].
#[derive(Debug, thiserror::Error)]
pub enum RunnerError {
    /// The runner task has stopped.
    #[error(transparent)]
    Closed(#[from] RunnerClosed),

    /// The scheduler rejected the command.
    #[error(transparent)]
    Admission(#[from] AdmissionError),
}

/// A point-in-time copy of the scheduler's collections.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueueSnapshot {
    /// Whether due commands are being dispatched.
    pub running: bool,
    /// Pending commands, ascending by send time.
    pub pending: Vec<Command>,
    /// The sent ledger.
    pub sent: Vec<Command>,
    /// The expired ledger.
    pub expired: Vec<Command>,
}

/// Totals accumulated over the life of the runner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Ticks executed.
    pub ticks: u64,
    /// Commands dispatched.
    pub sent: usize,
    /// Commands expired by the dispatcher.
    pub expired: usize,
    /// Failed dispatch attempts.
    pub failed: usize,
}

impl RunSummary {
    const fn record(&mut self, report: TickReport) {
        self.ticks = self.ticks.saturating_add(1);
        self.sent = self.sent.saturating_add(report.sent);
        self.expired = self.expired.saturating_add(report.expired);
        self.failed = self.failed.saturating_add(report.failed);
    }
}

enum ControlRequest {
    Add {
        request: Box<CommandRequest>,
        reply: oneshot::Sender<Result<Command, AdmissionError>>,
    },
    Remove {
        id: CommandId,
        reason: RemoveReason,
        reply: oneshot::Sender<bool>,
    },
    Start {
        first_run: bool,
        reply: oneshot::Sender<()>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Snapshot {
        reply: oneshot::Sender<QueueSnapshot>,
    },
    ClearRegisters {
        reply: oneshot::Sender<()>,
    },
    Subscribe {
        kind: EventKind,
        handler: Handler,
        reply: oneshot::Sender<SubscriptionId>,
    },
    Unsubscribe {
        id: SubscriptionId,
        reply: oneshot::Sender<bool>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable access to a scheduler owned by a runner task.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    tx: mpsc::Sender<ControlRequest>,
}

impl SchedulerHandle {
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> ControlRequest,
    ) -> Result<T, RunnerClosed> {
        let (reply, rx) = oneshot::channel();
        self.tx.send(build(reply)).await.map_err(|_closed| RunnerClosed)?;
        rx.await.map_err(|_dropped| RunnerClosed)
    }

    /// Admit a command. See [`Scheduler::add_command`].
    pub async fn add_command(&self, request: CommandRequest) -> Result<Command, RunnerError> {
        let result = self
            .call(|reply| ControlRequest::Add {
                request: Box::new(request),
                reply,
            })
            .await?;
        Ok(result?)
    }

    /// Remove a pending command. See [`Scheduler::remove_command`].
    pub async fn remove_command(&self, id: CommandId, reason: RemoveReason) -> Result<bool, RunnerClosed> {
        self.call(|reply| ControlRequest::Remove { id, reason, reply }).await
    }

    /// Start dispatching due commands.
    pub async fn start(&self, first_run: bool) -> Result<(), RunnerClosed> {
        self.call(|reply| ControlRequest::Start { first_run, reply }).await
    }

    /// Stop dispatching; due commands expire.
    pub async fn stop(&self) -> Result<(), RunnerClosed> {
        self.call(|reply| ControlRequest::Stop { reply }).await
    }

    /// Whether the scheduler is running.
    pub async fn is_running(&self) -> Result<bool, RunnerClosed> {
        Ok(self.snapshot().await?.running)
    }

    /// Copy of the pending queue and both ledgers.
    pub async fn snapshot(&self) -> Result<QueueSnapshot, RunnerClosed> {
        self.call(|reply| ControlRequest::Snapshot { reply }).await
    }

    /// Pending commands, ascending by send time.
    pub async fn commands(&self) -> Result<Vec<Command>, RunnerClosed> {
        Ok(self.snapshot().await?.pending)
    }

    /// The sent ledger.
    pub async fn sent(&self) -> Result<Vec<Command>, RunnerClosed> {
        Ok(self.snapshot().await?.sent)
    }

    /// The expired ledger.
    pub async fn expired(&self) -> Result<Vec<Command>, RunnerClosed> {
        Ok(self.snapshot().await?.expired)
    }

    /// Empty both ledgers.
    pub async fn clear_registers(&self) -> Result<(), RunnerClosed> {
        self.call(|reply| ControlRequest::ClearRegisters { reply }).await
    }

    /// Register a handler on the scheduler's event bus.
    pub async fn subscribe<F>(&self, kind: EventKind, handler: F) -> Result<SubscriptionId, RunnerClosed>
    where
        F: FnMut(&QueueEvent) -> HandlerResult + Send + 'static,
    {
        let handler: Handler = Box::new(handler);
        self.call(|reply| ControlRequest::Subscribe { kind, handler, reply })
            .await
    }

    /// Remove a subscription.
    pub async fn unsubscribe(&self, id: SubscriptionId) -> Result<bool, RunnerClosed> {
        self.call(|reply| ControlRequest::Unsubscribe { id, reply }).await
    }

    /// Ask the runner to persist, stop, and exit.
    pub async fn shutdown(&self) -> Result<(), RunnerClosed> {
        self.call(|reply| ControlRequest::Shutdown { reply }).await
    }
}

// ---------------------------------------------------------------------------
// Runner
// ---------------------------------------------------------------------------

/// Owns a [`Scheduler`] and the receiving end of its control channel.
pub struct SchedulerRunner {
    scheduler: Scheduler,
    rx: mpsc::Receiver<ControlRequest>,
    tick_interval: Duration,
}

impl core::fmt::Debug for SchedulerRunner {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SchedulerRunner")
            .field("scheduler", &self.scheduler)
            .field("tick_interval", &self.tick_interval)
            .finish_non_exhaustive()
    }
}

impl SchedulerRunner {
    /// Wrap `scheduler`, returning the runner and its first handle.
    ///
    /// `capacity` bounds the number of queued control requests.
    pub fn new(scheduler: Scheduler, tick_interval: Duration, capacity: usize) -> (Self, SchedulerHandle) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let runner = Self {
            scheduler,
            rx,
            tick_interval,
        };
        (runner, SchedulerHandle { tx })
    }

    /// Drive the scheduler until shutdown.
    ///
    /// Initializes the scheduler if needed, then ticks on the configured
    /// interval and serves control requests between ticks.
    ///
    /// # Errors
    ///
    /// Returns [`SchedulerError`] if the scheduler cannot be initialized.
    pub async fn run(self) -> Result<RunSummary, SchedulerError> {
        let Self {
            mut scheduler,
            mut rx,
            tick_interval,
        } = self;

        scheduler.init()?;

        let mut interval = tokio::time::interval(tick_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut summary = RunSummary::default();

        info!(
            tick_interval_ms = tick_interval.as_millis(),
            pending = scheduler.commands().len(),
            "Scheduler runner started"
        );

        loop {
            tokio::select! {
                _ = interval.tick() => {
                    summary.record(scheduler.tick());
                }
                request = rx.recv() => {
                    match request {
                        Some(request) => {
                            if serve(&mut scheduler, request).await {
                                break;
                            }
                        }
                        None => {
                            info!("All scheduler handles dropped");
                            scheduler.shutdown();
                            break;
                        }
                    }
                }
            }
        }

        info!(
            ticks = summary.ticks,
            sent = summary.sent,
            expired = summary.expired,
            failed = summary.failed,
            "Scheduler runner ended"
        );
        Ok(summary)
    }
}

/// Spawn a runner for `scheduler` on the current tokio runtime.
pub fn spawn_scheduler(
    scheduler: Scheduler,
    tick_interval: Duration,
    capacity: usize,
) -> (SchedulerHandle, JoinHandle<Result<RunSummary, SchedulerError>>) {
    let (runner, handle) = SchedulerRunner::new(scheduler, tick_interval, capacity);
    (handle, tokio::spawn(runner.run()))
}

/// Apply one control request. Returns `true` once the runner should exit.
async fn serve(scheduler: &mut Scheduler, request: ControlRequest) -> bool {
    match request {
        ControlRequest::Add { request, reply } => {
            let result = scheduler.add_command(&request).await;
            respond(reply, result);
        }
        ControlRequest::Remove { id, reason, reply } => {
            respond(reply, scheduler.remove_command(id, reason));
        }
        ControlRequest::Start { first_run, reply } => {
            scheduler.start(first_run);
            respond(reply, ());
        }
        ControlRequest::Stop { reply } => {
            scheduler.stop();
            respond(reply, ());
        }
        ControlRequest::Snapshot { reply } => {
            respond(
                reply,
                QueueSnapshot {
                    running: scheduler.is_running(),
                    pending: scheduler.commands().to_vec(),
                    sent: scheduler.sent().to_vec(),
                    expired: scheduler.expired().to_vec(),
                },
            );
        }
        ControlRequest::ClearRegisters { reply } => {
            scheduler.clear_registers();
            respond(reply, ());
        }
        ControlRequest::Subscribe { kind, handler, reply } => {
            respond(reply, scheduler.subscribe_boxed(kind, handler));
        }
        ControlRequest::Unsubscribe { id, reply } => {
            respond(reply, scheduler.unsubscribe(id));
        }
        ControlRequest::Shutdown { reply } => {
            info!("Shutdown requested");
            scheduler.shutdown();
            respond(reply, ());
            return true;
        }
    }
    false
}

fn respond<T>(reply: oneshot::Sender<T>, value: T) {
    if reply.send(value).is_err() {
        debug!("Caller went away before the reply");
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::arithmetic_side_effects, clippy::indexing_slicing)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::{Arc, Mutex};

    use courier_store::{KeyValueStore, MemoryStore, QueueStore};
    use courier_types::{ArrivalTime, Composition, Coords, Millis, MovementType, UnitAmount, VillageId};

    use super::*;
    use crate::clock::ManualClock;
    use crate::host::{RecordingTransport, StaticVillages};
    use crate::scheduler::{SchedulerHost, SchedulerSettings};
    use crate::travel::{ArmyMovementModel, ArmyProfile, EuclideanDistance, TravelError, TravelTimeCalculator};

    const NOW: Millis = 5_000_000;
    const TICK: Duration = Duration::from_millis(250);

    struct TwoSeconds;

    impl ArmyMovementModel for TwoSeconds {
        fn travel_seconds(&self, _army: &ArmyProfile<'_>, _distance: f64) -> Result<f64, TravelError> {
            Ok(2.0)
        }
    }

    fn scheduler(backend: MemoryStore, clock: &ManualClock, transport: &Arc<RecordingTransport>) -> Scheduler {
        let troops: Composition = [("axe".to_owned(), 30)].into();
        let villages = Arc::new(
            StaticVillages::new()
                .with_own_village(Coords::new(400, 400), VillageId(7), "Home", troops)
                .with_village(Coords::new(401, 402), VillageId(8), "Target"),
        );
        let host = SchedulerHost {
            clock: Arc::new(clock.clone()),
            villages: villages.clone(),
            troops: villages,
            transport: transport.clone(),
            travel: TravelTimeCalculator::new(Arc::new(EuclideanDistance), Arc::new(TwoSeconds)),
        };
        let store = QueueStore::new(Box::new(backend), "runner").unwrap();
        Scheduler::new(host, store, SchedulerSettings::default())
    }

    fn request(arrive: Millis) -> CommandRequest {
        CommandRequest {
            origin: "400|400".to_owned(),
            target: "401|402".to_owned(),
            units: [("axe".to_owned(), UnitAmount::All)].into(),
            officers: BTreeMap::new(),
            movement_type: MovementType::Attack,
            arrive: ArrivalTime::Millis(arrive),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn ticks_dispatch_due_commands() {
        let clock = ManualClock::new(NOW);
        let transport = Arc::new(RecordingTransport::new());
        let (handle, task) = spawn_scheduler(scheduler(MemoryStore::new(), &clock, &transport), TICK, 8);

        let sends = Arc::new(Mutex::new(0_u32));
        let sink = Arc::clone(&sends);
        handle
            .subscribe(EventKind::Send, move |_| {
                *sink.lock().unwrap() += 1;
                Ok(())
            })
            .await
            .unwrap();

        let command = handle.add_command(request(NOW + 10_000)).await.unwrap();
        assert_eq!(command.send_time, NOW + 8_000);
        handle.start(true).await.unwrap();
        assert!(handle.is_running().await.unwrap());

        tokio::time::sleep(TICK * 3).await;
        assert_eq!(handle.commands().await.unwrap().len(), 1);

        clock.set(command.send_time + 1);
        tokio::time::sleep(TICK * 2).await;

        let snapshot = handle.snapshot().await.unwrap();
        assert!(snapshot.pending.is_empty());
        assert_eq!(snapshot.sent.len(), 1);
        assert_eq!(*sends.lock().unwrap(), 1);
        assert_eq!(transport.orders()[0].units.get("axe"), Some(&30));

        handle.shutdown().await.unwrap();
        let summary = task.await.unwrap().unwrap();
        assert_eq!(summary.sent, 1);
        assert!(summary.ticks >= 4);
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_admission_reaches_caller() {
        let clock = ManualClock::new(NOW);
        let transport = Arc::new(RecordingTransport::new());
        let (handle, _task) = spawn_scheduler(scheduler(MemoryStore::new(), &clock, &transport), TICK, 8);

        let err = handle.add_command(request(NOW)).await.unwrap_err();
        assert!(matches!(
            err,
            RunnerError::Admission(AdmissionError::CommandAlreadyExpiredAtCreation { .. })
        ));
        assert!(handle.commands().await.unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_every_handle_persists_and_exits() {
        let clock = ManualClock::new(NOW);
        let transport = Arc::new(RecordingTransport::new());
        let backend = MemoryStore::new();
        let (handle, task) = spawn_scheduler(scheduler(backend.clone(), &clock, &transport), TICK, 8);

        handle.add_command(request(NOW + 60_000)).await.unwrap();
        drop(handle);
        task.await.unwrap().unwrap();

        let raw = backend.get("runner-queue-commands").unwrap().unwrap();
        let stored: Vec<Command> = serde_json::from_str(&raw).unwrap();
        assert_eq!(stored.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn unreadable_state_fails_the_runner() {
        let clock = ManualClock::new(NOW);
        let transport = Arc::new(RecordingTransport::new());
        let mut backend = MemoryStore::new();
        backend.set("runner-queue-commands", "{not json").unwrap();
        let (handle, task) = spawn_scheduler(scheduler(backend, &clock, &transport), TICK, 8);

        assert!(matches!(task.await.unwrap(), Err(SchedulerError::Store { .. })));
        assert_eq!(handle.start(true).await, Err(RunnerClosed));
    }
}
