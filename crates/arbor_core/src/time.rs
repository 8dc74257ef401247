use std::fmt;

use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::{ArborError, ArborResult};

/// A point in time, always normalized to UTC. Values read back from any
/// backend come out as an `Instant` regardless of how the backend stored
/// them.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Instant(DateTime<Utc>);

impl Instant {
    pub fn now() -> Self {
        Self(Utc::now())
    }

    pub fn from_utc(value: DateTime<Utc>) -> Self {
        Self(value)
    }

    pub fn to_utc(self) -> DateTime<Utc> {
        self.0
    }
}

impl fmt::Display for Instant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

impl Serialize for Instant {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0.to_rfc3339_opts(SecondsFormat::Micros, true))
    }
}

impl<'de> Deserialize<'de> for Instant {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        let parsed = DateTime::parse_from_rfc3339(&value).map_err(serde::de::Error::custom)?;
        Ok(Instant(parsed.with_timezone(&Utc)))
    }
}

/// A timestamp as supplied by a caller, before it has been checked for
/// timezone awareness. Only aware inputs can be persisted.
#[derive(Clone, Copy, Debug)]
pub enum InstantInput {
    Aware(DateTime<FixedOffset>),
    Naive(NaiveDateTime),
}

impl InstantInput {
    /// Normalizes an aware input to UTC; naive inputs are rejected rather
    /// than silently assumed to be in any particular zone.
    pub fn into_instant(self) -> ArborResult<Instant> {
        match self {
            InstantInput::Aware(value) => Ok(Instant(value.with_timezone(&Utc))),
            InstantInput::Naive(_) => {
                Err(ArborError::validation("timestamps must have a timezone"))
            }
        }
    }
}

impl From<DateTime<Utc>> for InstantInput {
    fn from(value: DateTime<Utc>) -> Self {
        InstantInput::Aware(value.fixed_offset())
    }
}

impl From<DateTime<FixedOffset>> for InstantInput {
    fn from(value: DateTime<FixedOffset>) -> Self {
        InstantInput::Aware(value)
    }
}

impl From<NaiveDateTime> for InstantInput {
    fn from(value: NaiveDateTime) -> Self {
        InstantInput::Naive(value)
    }
}

impl From<Instant> for InstantInput {
    fn from(value: Instant) -> Self {
        InstantInput::Aware(value.0.fixed_offset())
    }
}
