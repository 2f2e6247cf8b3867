//! Shape checks for proposed commands.
//!
//! Validation is purely syntactic: it parses coordinates and the arrival
//! instant, drops literal-zero unit entries, and normalizes officer flags.
//! Whether the villages exist and whether the command can still make its
//! window is decided later, during admission.

use std::collections::BTreeMap;

use chrono::{DateTime, NaiveDateTime};
use courier_types::{ArrivalTime, CommandRequest, Coords, Millis, MovementType, Officers, UnitMap};

/// Which end of a command a coordinate or village belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VillageSide {
    /// The sending village.
    Origin,
    /// The receiving village.
    Target,
}

impl core::fmt::Display for VillageSide {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(match self {
            Self::Origin => "origin",
            Self::Target => "target",
        })
    }
}

/// Errors raised while checking a proposed command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// A coordinate string is not in `###|###` form.
    #[error("{side} coords format {value:?} is invalid")]
    InvalidCoordinates {
        /// Which end was malformed.
        side: VillageSide,
        /// The rejected input.
        value: String,
    },

    /// No non-zero unit quantity was given.
    #[error("you need to specify an amount of units")]
    NoUnitsSpecified,

    /// The arrival instant could not be parsed.
    #[error("arrival time {value:?} could not be parsed")]
    InvalidArrivalTime {
        /// The rejected input.
        value: String,
    },
}

/// A request that passed validation, in normalized form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    /// Sending village coordinates.
    pub origin: Coords,
    /// Receiving village coordinates.
    pub target: Coords,
    /// Unit quantities with literal zeros removed.
    pub units: UnitMap,
    /// Requested officers, each set to `1`.
    pub officers: Officers,
    /// Kind of movement.
    pub movement_type: MovementType,
    /// Arrival instant in game time.
    pub arrive_time: Millis,
}

/// Validate and normalize a proposed command.
///
/// # Errors
///
/// Returns the first [`ValidationError`] found, checking origin, target,
/// units, then the arrival instant.
pub fn validate(request: &CommandRequest) -> Result<ValidatedRequest, ValidationError> {
    let origin = parse_coords(&request.origin, VillageSide::Origin)?;
    let target = parse_coords(&request.target, VillageSide::Target)?;

    let units = clean_zero_units(&request.units);
    if units.is_empty() {
        return Err(ValidationError::NoUnitsSpecified);
    }

    let arrive_time = parse_arrival(&request.arrive)?;

    Ok(ValidatedRequest {
        origin,
        target,
        units,
        officers: normalize_officers(&request.officers),
        movement_type: request.movement_type,
        arrive_time,
    })
}

fn parse_coords(raw: &str, side: VillageSide) -> Result<Coords, ValidationError> {
    raw.parse()
        .map_err(|_err| ValidationError::InvalidCoordinates {
            side,
            value: raw.to_owned(),
        })
}

/// Drop every literal-zero entry; wildcards and reservations are kept in
/// their canonical form.
pub fn clean_zero_units(units: &UnitMap) -> UnitMap {
    units
        .iter()
        .filter(|(_, amount)| !amount.is_zero())
        .map(|(unit, amount)| (unit.clone(), amount.normalized()))
        .collect()
}

/// Keep the requested officers and set each to the protocol's `1`.
pub fn normalize_officers(officers: &BTreeMap<String, bool>) -> Officers {
    officers
        .iter()
        .filter(|(_, requested)| **requested)
        .map(|(name, _)| (name.clone(), 1))
        .collect()
}

/// Date-time layouts accepted for textual arrival instants (UTC).
const ARRIVAL_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S%.3f",
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.3f",
    "%Y-%m-%dT%H:%M:%S",
];

/// Parse an arrival instant into game-time milliseconds.
///
/// Integers are taken as-is. Strings may be RFC 3339, or
/// `YYYY-MM-DD HH:MM:SS` with an optional `.mmm` or `:mmm` millisecond
/// suffix, read as UTC.
///
/// # Errors
///
/// Returns [`ValidationError::InvalidArrivalTime`] for anything else.
pub fn parse_arrival(arrive: &ArrivalTime) -> Result<Millis, ValidationError> {
    let text = match arrive {
        ArrivalTime::Millis(ms) => return Ok(*ms),
        ArrivalTime::Text(text) => text.trim(),
    };
    let invalid = || ValidationError::InvalidArrivalTime {
        value: text.to_owned(),
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Ok(parsed.timestamp_millis());
    }
    if let Some(ms) = parse_naive(text) {
        return Ok(ms);
    }

    // The game UI writes milliseconds after a colon: `12:00:00:500`.
    let (head, millis) = text.rsplit_once(':').ok_or_else(invalid)?;
    if millis.len() != 3 || !millis.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let base = NaiveDateTime::parse_from_str(head, "%Y-%m-%d %H:%M:%S").map_err(|_err| invalid())?;
    let extra: Millis = millis.parse().map_err(|_err| invalid())?;
    base.and_utc()
        .timestamp_millis()
        .checked_add(extra)
        .ok_or_else(invalid)
}

fn parse_naive(text: &str) -> Option<Millis> {
    ARRIVAL_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(text, format)
            .ok()
            .map(|dt| dt.and_utc().timestamp_millis())
    })
}
