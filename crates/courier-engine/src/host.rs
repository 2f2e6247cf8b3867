//! Static host world for the engine binary.
//!
//! The engine has no live game connection. Villages and their troops come
//! from the `host` section of the config file, and dispatched orders are
//! appended as JSON lines to an outbox file for another process to pick up.

use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use courier_core::{StaticVillages, Transport, TransportError};
use courier_types::{ArmyOrder, Composition, Coords, VillageId};
use serde::Deserialize;
use tracing::info;

use crate::error::EngineError;

/// The `host` section of `courier-config.yaml`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct HostConfig {
    /// Every village the lookup can resolve.
    #[serde(default)]
    pub villages: Vec<VillageEntry>,

    /// JSON-lines file receiving dispatched orders. Orders are only
    /// logged when unset.
    #[serde(default)]
    pub outbox: Option<PathBuf>,
}

/// One village of the static world.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct VillageEntry {
    /// Map position.
    pub coords: Coords,
    /// Game identifier.
    pub id: VillageId,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Troops at home. Present only for the player's own villages.
    #[serde(default)]
    pub troops: Option<Composition>,
}

/// Build the village table described by `config`.
pub fn build_villages(config: &HostConfig) -> StaticVillages {
    let villages = config
        .villages
        .iter()
        .fold(StaticVillages::new(), |table, entry| match &entry.troops {
            Some(troops) => table.with_own_village(entry.coords, entry.id, &entry.name, troops.clone()),
            None => table.with_village(entry.coords, entry.id, &entry.name),
        });
    info!(villages = villages.len(), "Host villages loaded");
    villages
}

/// Transport that writes each order as one JSON line.
#[derive(Debug)]
pub struct OutboxTransport {
    outbox: Option<(PathBuf, Mutex<File>)>,
}

impl OutboxTransport {
    /// Open (or create) the outbox at `path` for appending. `None` gives a
    /// transport that only logs.
    pub fn open(path: Option<&Path>) -> Result<Self, EngineError> {
        let Some(path) = path else {
            return Ok(Self { outbox: None });
        };
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| EngineError::Host {
                message: format!("failed to open outbox {}: {e}", path.display()),
            })?;
        info!(path = %path.display(), "Outbox opened");
        Ok(Self {
            outbox: Some((path.to_path_buf(), Mutex::new(file))),
        })
    }
}

impl Transport for OutboxTransport {
    fn emit(&self, order: &ArmyOrder) -> Result<(), TransportError> {
        let line = serde_json::to_string(order).map_err(|e| TransportError {
            message: format!("failed to encode order: {e}"),
        })?;
        info!(order = %line, "Order emitted");

        let Some((path, file)) = &self.outbox else {
            return Ok(());
        };
        let mut file = file.lock().map_err(|_poisoned| TransportError {
            message: "outbox lock poisoned".to_owned(),
        })?;
        writeln!(file, "{line}").map_err(|e| TransportError {
            message: format!("failed to write outbox {}: {e}", path.display()),
        })
    }
}
