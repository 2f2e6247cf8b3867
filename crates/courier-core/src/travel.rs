//! Transit duration between two villages.
//!
//! The calculation has two injected parts: a [`DistanceModel`] that measures
//! the field distance between coordinates, and an [`ArmyMovementModel`] that
//! turns a composition and a distance into seconds. The calculator combines
//! them and converts to whole milliseconds. It is a pure function of its
//! inputs: no clock, no caching, no state.

use std::collections::BTreeMap;
use std::sync::Arc;

use courier_types::{Coords, Millis, MovementType, Officers, UnitMap};

use crate::config::TravelConfig;

/// Errors raised while computing a travel duration.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TravelError {
    /// The composition names a unit the speed model does not know.
    #[error("unknown unit type: {unit}")]
    UnknownUnitType {
        /// The unrecognized unit type.
        unit: String,
    },

    /// The composition is empty, so there is no slowest unit.
    #[error("cannot compute travel time for an empty army")]
    EmptyArmy,

    /// The model produced a negative, infinite, or NaN duration.
    #[error("travel model produced an invalid duration: {seconds}s")]
    InvalidTravelTime {
        /// The offending value in seconds.
        seconds: f64,
    },
}

/// What the movement model needs to know about an army.
#[derive(Debug, Clone, Copy)]
pub struct ArmyProfile<'a> {
    /// Symbolic unit quantities (every listed type moves).
    pub units: &'a UnitMap,
    /// Requested officers.
    pub officers: &'a Officers,
    /// Kind of movement.
    pub movement_type: MovementType,
}

/// Measures the distance between two map positions, in fields.
pub trait DistanceModel: Send + Sync {
    /// Distance from `origin` to `target`.
    fn distance(&self, origin: Coords, target: Coords) -> f64;
}

/// Derives a transit duration from an army and a distance.
pub trait ArmyMovementModel: Send + Sync {
    /// Seconds the army needs to cover `distance` fields.
    ///
    /// # Errors
    ///
    /// Returns [`TravelError`] if the army cannot be priced.
    fn travel_seconds(&self, army: &ArmyProfile<'_>, distance: f64) -> Result<f64, TravelError>;
}

/// Straight-line distance on the coordinate grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct EuclideanDistance;

impl DistanceModel for EuclideanDistance {
    fn distance(&self, origin: Coords, target: Coords) -> f64 {
        let dx = f64::from(origin.x) - f64::from(target.x);
        let dy = f64::from(origin.y) - f64::from(target.y);
        dx.hypot(dy)
    }
}

/// Speed model where the slowest unit type present governs the army.
///
/// Each unit type has a base pace in minutes per field; world and unit
/// speed multipliers divide it. Officers and movement type do not change
/// the pace.
#[derive(Debug, Clone, PartialEq)]
pub struct UnitSpeedTable {
    minutes_per_field: BTreeMap<String, f64>,
    speed_factor: f64,
}

impl UnitSpeedTable {
    /// Build a table from per-unit paces and the two speed multipliers.
    pub fn new(minutes_per_field: BTreeMap<String, f64>, world_speed: f64, unit_speed: f64) -> Self {
        Self {
            minutes_per_field,
            speed_factor: world_speed * unit_speed,
        }
    }

    /// Build a table from the `travel` configuration section.
    pub fn from_config(config: &TravelConfig) -> Self {
        Self::new(config.unit_speeds.clone(), config.world_speed, config.unit_speed)
    }

    /// Effective minutes per field of the slowest unit in `units`.
    ///
    /// # Errors
    ///
    /// Returns [`TravelError::EmptyArmy`] or [`TravelError::UnknownUnitType`].
    pub fn slowest_pace(&self, units: &UnitMap) -> Result<f64, TravelError> {
        let mut slowest: Option<f64> = None;
        for unit in units.keys() {
            let pace = self
                .minutes_per_field
                .get(unit)
                .copied()
                .ok_or_else(|| TravelError::UnknownUnitType { unit: unit.clone() })?;
            slowest = Some(slowest.map_or(pace, |s| s.max(pace)));
        }
        slowest
            .map(|pace| pace / self.speed_factor)
            .ok_or(TravelError::EmptyArmy)
    }
}

impl ArmyMovementModel for UnitSpeedTable {
    fn travel_seconds(&self, army: &ArmyProfile<'_>, distance: f64) -> Result<f64, TravelError> {
        let pace = self.slowest_pace(army.units)?;
        Ok(pace * 60.0 * distance)
    }
}

/// Combines a distance model and a movement model.
#[derive(Clone)]
pub struct TravelTimeCalculator {
    distance: Arc<dyn DistanceModel>,
    movement: Arc<dyn ArmyMovementModel>,
}

impl core::fmt::Debug for TravelTimeCalculator {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("TravelTimeCalculator").finish_non_exhaustive()
    }
}

impl TravelTimeCalculator {
    /// Create a calculator from injected models.
    pub fn new(distance: Arc<dyn DistanceModel>, movement: Arc<dyn ArmyMovementModel>) -> Self {
        Self { distance, movement }
    }

    /// Euclidean distance with the configured unit speed table.
    pub fn from_config(config: &TravelConfig) -> Self {
        Self::new(
            Arc::new(EuclideanDistance),
            Arc::new(UnitSpeedTable::from_config(config)),
        )
    }

    /// Travel duration in milliseconds, rounded to the nearest millisecond.
    ///
    /// # Errors
    ///
    /// Returns [`TravelError`] if the movement model rejects the army or
    /// produces an unusable duration.
    pub fn travel_time(
        &self,
        origin: Coords,
        target: Coords,
        units: &UnitMap,
        movement_type: MovementType,
        officers: &Officers,
    ) -> Result<Millis, TravelError> {
        let army = ArmyProfile {
            units,
            officers,
            movement_type,
        };
        let distance = self.distance.distance(origin, target);
        let seconds = self.movement.travel_seconds(&army, distance)?;
        seconds_to_millis(seconds)
    }
}

#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn seconds_to_millis(seconds: f64) -> Result<Millis, TravelError> {
    let ms = (seconds * 1000.0).round();
    if !ms.is_finite() || ms < 0.0 || ms >= Millis::MAX as f64 {
        return Err(TravelError::InvalidTravelTime { seconds });
    }
    Ok(ms as Millis)
}
