//! Courier engine binary.
//!
//! Wires the scheduler to a static host world and runs it until Ctrl-C.
//!
//! # Startup Sequence
//!
//! 1. Load configuration from `courier-config.yaml` (or `COURIER_CONFIG`)
//! 2. Initialize structured logging (tracing)
//! 3. Open the queue store for the configured world
//! 4. Build host capabilities from the `host` section
//! 5. Initialize the scheduler (restores and reconciles persisted state)
//! 6. Spawn the tick loop and admit the configured `plans`
//! 7. Start dispatching and wait for Ctrl-C
//! 8. Shut down, persisting every collection

mod error;
mod host;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use courier_core::config::{LogFormat, LoggingConfig, StorageBackend};
use courier_core::{
    CourierConfig, RunnerError, Scheduler, SchedulerHost, SchedulerSettings, SystemGameClock,
    TravelTimeCalculator, spawn_scheduler,
};
use courier_store::{FileStore, KeyValueStore, MemoryStore, QueueStore};
use courier_types::{CommandRequest, EventKind, QueueEvent};
use serde::de::DeserializeOwned;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::error::EngineError;
use crate::host::{HostConfig, OutboxTransport};

/// Config file read when `COURIER_CONFIG` is unset.
const DEFAULT_CONFIG_PATH: &str = "courier-config.yaml";

/// Application entry point for the engine.
///
/// # Errors
///
/// Returns an error if configuration, storage, or the scheduler fail to
/// come up, or if the scheduler task dies.
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 1. Load configuration.
    let config_path = config_path();
    let config = load_config(&config_path)?;

    // 2. Initialize structured logging.
    init_logging(&config.logging);
    info!(
        config = %config_path.display(),
        world = config.world.id,
        tick_interval_ms = config.scheduler.tick_interval_ms,
        max_dispatch_attempts = config.scheduler.max_dispatch_attempts,
        "courier-engine starting"
    );

    // 3. Open the queue store.
    let store = open_store(&config)?;

    // 4. Build host capabilities.
    let host_config: HostConfig = load_section(&config_path, "host")?;
    let plans: Vec<CommandRequest> = load_section(&config_path, "plans")?;
    let villages = Arc::new(host::build_villages(&host_config));
    let transport = Arc::new(OutboxTransport::open(host_config.outbox.as_deref())?);
    let scheduler_host = SchedulerHost {
        clock: Arc::new(SystemGameClock::new(config.world.server_time_offset_ms)),
        villages: villages.clone(),
        troops: villages,
        transport,
        travel: TravelTimeCalculator::from_config(&config.travel),
    };

    // 5. Initialize the scheduler.
    let mut scheduler = Scheduler::new(
        scheduler_host,
        store,
        SchedulerSettings::from_config(&config.scheduler),
    );
    log_events(&mut scheduler);
    let report = scheduler.init()?;
    info!(
        pending = report.pending,
        expired = report.expired,
        "Persisted queue restored"
    );

    // 6. Spawn the tick loop and admit plans.
    let (handle, task) = spawn_scheduler(
        scheduler,
        Duration::from_millis(config.scheduler.tick_interval_ms),
        config.scheduler.control_capacity,
    );

    for plan in plans {
        let (origin, target) = (plan.origin.clone(), plan.target.clone());
        match handle.add_command(plan).await {
            Ok(command) => info!(
                id = %command.id,
                origin,
                target,
                send_time = command.send_time,
                "Plan scheduled"
            ),
            Err(RunnerError::Admission(e)) => warn!(origin, target, error = %e, "Plan rejected"),
            Err(RunnerError::Closed(e)) => return Err(EngineError::from(e).into()),
        }
    }

    // 7. Start dispatching.
    handle.start(true).await.map_err(EngineError::from)?;
    info!("Scheduler running, press Ctrl-C to stop");

    tokio::signal::ctrl_c()
        .await
        .map_err(|e| EngineError::Signal {
            message: format!("failed to listen for Ctrl-C: {e}"),
        })?;

    // 8. Shut down.
    info!("Ctrl-C received, shutting down");
    handle.shutdown().await.map_err(EngineError::from)?;
    let summary = task.await.map_err(|e| EngineError::Signal {
        message: format!("scheduler task failed: {e}"),
    })??;

    info!(
        ticks = summary.ticks,
        sent = summary.sent,
        expired = summary.expired,
        failed = summary.failed,
        "courier-engine shutdown complete"
    );
    Ok(())
}

fn config_path() -> PathBuf {
    std::env::var_os("COURIER_CONFIG").map_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH), PathBuf::from)
}

/// Load the scheduler configuration, falling back to defaults (plus
/// environment overrides) when the file does not exist.
fn load_config(path: &Path) -> Result<CourierConfig, EngineError> {
    if path.exists() {
        Ok(CourierConfig::from_file(path)?)
    } else {
        let mut config = CourierConfig::default();
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }
}

/// Read one top-level section of the config file.
///
/// A missing file or a missing key yields the section's default.
fn load_section<T>(path: &Path, key: &str) -> Result<T, EngineError>
where
    T: DeserializeOwned + Default,
{
    if !path.exists() {
        return Ok(T::default());
    }
    let contents = std::fs::read_to_string(path).map_err(|e| EngineError::Host {
        message: format!("failed to read config file: {e}"),
    })?;
    let raw: serde_yml::Value = serde_yml::from_str(&contents).map_err(|e| EngineError::Host {
        message: format!("failed to parse config YAML: {e}"),
    })?;
    match raw.get(key) {
        Some(value) if !value.is_null() => {
            serde_yml::from_value(value.clone()).map_err(|e| EngineError::Host {
                message: format!("failed to parse {key} section: {e}"),
            })
        }
        _ => Ok(T::default()),
    }
}

fn init_logging(config: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));
    match config.format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .init(),
    }
}

fn open_store(config: &CourierConfig) -> Result<QueueStore, EngineError> {
    let backend: Box<dyn KeyValueStore> = match config.storage.backend {
        StorageBackend::File => {
            info!(data_dir = %config.storage.data_dir.display(), "Using file store");
            Box::new(FileStore::open(&config.storage.data_dir)?)
        }
        StorageBackend::Memory => {
            warn!("Using memory store, the queue will not survive a restart");
            Box::new(MemoryStore::new())
        }
    };
    Ok(QueueStore::new(backend, config.world.id.clone())?)
}

/// Mirror every queue event into the log.
fn log_events(scheduler: &mut Scheduler) {
    for kind in EventKind::ALL {
        scheduler.subscribe(kind, move |event| {
            match event {
                QueueEvent::Error { reason } => warn!(event = %kind, reason = %reason, "Queue event"),
                other => info!(
                    event = %kind,
                    id = ?other.command().map(|c| c.id),
                    "Queue event"
                ),
            }
            Ok(())
        });
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    const CONFIG: &str = r#"
world:
  id: en42
scheduler:
  tick_interval_ms: 100
host:
  villages:
    - coords: "500|500"
      id: 1
      troops: { spear: 50 }
    - coords: "505|505"
      id: 2
plans:
  - origin: "500|500"
    target: "505|505"
    units: { spear: "*" }
    type: attack
    arrive: "2030-01-01 12:00:00:500"
"#;

    fn write_config(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut file, contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn sections_come_from_one_file() {
        let file = write_config(CONFIG);
        let host: HostConfig = load_section(file.path(), "host").unwrap();
        let plans: Vec<CommandRequest> = load_section(file.path(), "plans").unwrap();
        assert_eq!(host.villages.len(), 2);
        assert_eq!(plans.len(), 1);
        assert_eq!(plans[0].units.len(), 1);
    }

    #[test]
    fn missing_sections_default() {
        let file = write_config("world:\n  id: en42\n");
        let plans: Vec<CommandRequest> = load_section(file.path(), "plans").unwrap();
        assert!(plans.is_empty());
        let host: HostConfig = load_section(Path::new("/nonexistent/courier.yaml"), "host").unwrap();
        assert_eq!(host, HostConfig::default());
    }

    #[test]
    fn malformed_section_is_an_error() {
        let file = write_config("plans: { not: a list }\n");
        let result: Result<Vec<CommandRequest>, _> = load_section(file.path(), "plans");
        assert!(matches!(result, Err(EngineError::Host { .. })));
    }

    #[test]
    fn memory_store_uses_world_namespace() {
        let mut config = CourierConfig::default();
        config.storage.backend = StorageBackend::Memory;
        config.world.id = "en42".to_owned();
        let store = open_store(&config).unwrap();
        assert_eq!(store.pending_key(), "en42-queue-commands");
    }
}
