//! Symbolic unit quantities.
//!
//! A command names how many of each unit type to send. The quantity may be
//! an exact count, the wildcard `"*"` ("everything available when the
//! command goes out"), or a negative number `-k` ("keep `k` at home, send
//! the rest"). The last two are resolved against live troop counts at
//! dispatch time, never at admission.

use std::collections::BTreeMap;

use serde::de::{self, Deserializer, Visitor};
use serde::{Deserialize, Serialize, Serializer};

/// Wire symbol for [`UnitAmount::All`].
pub const WILDCARD: &str = "*";

/// Symbolic unit quantities keyed by unit type (e.g. `"spear"`).
pub type UnitMap = BTreeMap<String, UnitAmount>;

/// Concrete unit counts keyed by unit type, as emitted downstream.
pub type Composition = BTreeMap<String, u32>;

/// A unit quantity as requested by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnitAmount {
    /// Send exactly this many.
    Exact(u32),
    /// Send every unit of this type available at dispatch time.
    All,
    /// Keep this many at home and send the rest.
    Reserve(u32),
}

impl UnitAmount {
    /// Whether this is a literal zero count (dropped at admission).
    pub const fn is_zero(self) -> bool {
        matches!(self, Self::Exact(0))
    }

    /// Canonical form of this amount. Keeping nothing back is the same as
    /// sending everything, so `Reserve(0)` becomes `All`.
    pub const fn normalized(self) -> Self {
        match self {
            Self::Reserve(0) => Self::All,
            other => other,
        }
    }

    /// Build an amount from the protocol's signed integer form.
    ///
    /// Returns `None` if the magnitude does not fit a `u32`.
    pub fn from_signed(value: i64) -> Option<Self> {
        let magnitude = u32::try_from(value.unsigned_abs()).ok()?;
        if value < 0 {
            Some(Self::Reserve(magnitude))
        } else {
            Some(Self::Exact(magnitude))
        }
    }
}

impl core::fmt::Display for UnitAmount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::Exact(n) => write!(f, "{n}"),
            Self::All => f.write_str(WILDCARD),
            Self::Reserve(k) => write!(f, "-{k}"),
        }
    }
}

impl Serialize for UnitAmount {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match *self {
            Self::Exact(n) => serializer.serialize_u32(n),
            Self::All | Self::Reserve(0) => serializer.serialize_str(WILDCARD),
            Self::Reserve(k) => serializer.serialize_i64(-i64::from(k)),
        }
    }
}

/// Turn a resolved composition back into exact unit quantities.
pub fn exact_units(composition: &Composition) -> UnitMap {
    composition
        .iter()
        .map(|(unit, count)| (unit.clone(), UnitAmount::Exact(*count)))
        .collect()
}

struct UnitAmountVisitor;

impl Visitor<'_> for UnitAmountVisitor {
    type Value = UnitAmount;

    fn expecting(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str("an integer unit count or \"*\"")
    }

    fn visit_i64<E: de::Error>(self, v: i64) -> Result<Self::Value, E> {
        UnitAmount::from_signed(v)
            .ok_or_else(|| E::custom(format!("unit count {v} out of range")))
    }

    fn visit_u64<E: de::Error>(self, v: u64) -> Result<Self::Value, E> {
        u32::try_from(v)
            .map(UnitAmount::Exact)
            .map_err(|_err| E::custom(format!("unit count {v} out of range")))
    }

    fn visit_str<E: de::Error>(self, v: &str) -> Result<Self::Value, E> {
        let trimmed = v.trim();
        if trimmed == WILDCARD {
            return Ok(UnitAmount::All);
        }
        trimmed
            .parse::<i64>()
            .map_err(|_err| E::invalid_value(de::Unexpected::Str(v), &self))
            .and_then(|n| self.visit_i64(n))
    }
}

impl<'de> Deserialize<'de> for UnitAmount {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        deserializer.deserialize_any(UnitAmountVisitor)
    }
}
