//! Core fix type: one GPS reading for one tracked animal.
//!
//! Fixes are produced by an external ingestion layer (the core never
//! parses text) and are immutable once constructed. Day/night and
//! home/away are opaque pass-through attributes: clustering and crossing
//! geometry never read them, they only get tallied on results.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::Location;

/// Identity of one tracked animal (e.g. a collar or study id such as `F201`).
///
/// Ordering is lexicographic and is part of every documented tie-break
/// chain, so two runs over the same data always agree on output order.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AnimalId(String);

impl AnimalId {
    /// Create an animal id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AnimalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for AnimalId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for AnimalId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Whether a fix was recorded during daylight or at night.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DayNight {
    /// The sun was up at the fix's location and time.
    Day,
    /// The sun was down.
    Night,
}

/// Whether a fix lies inside the animal's home range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HomeAway {
    /// Inside the home range.
    Home,
    /// Outside the home range.
    Away,
}

/// One GPS location reading for a tracked animal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fix {
    /// The animal this reading belongs to.
    pub animal: AnimalId,
    /// Reading time in UTC. GPS schedules are irregular but sub-hour.
    pub timestamp: DateTime<Utc>,
    /// Planar position in the projected reference system (meters).
    pub location: Location,
    /// Day/night flag supplied by the external solar classifier.
    pub day_night: DayNight,
    /// Home/away flag supplied by ingestion. Pass-through only.
    pub home_away: HomeAway,
    /// Zero-based row order in the source data, preserved for
    /// reporting and as the final determinism tie-break.
    pub row: u32,
}

impl Fix {
    /// Construct a fix. Validation (finite coordinates, bounds, timestamp
    /// ordering) happens during repository assembly, not here.
    #[must_use]
    pub fn new(
        animal: impl Into<AnimalId>,
        timestamp: DateTime<Utc>,
        location: Location,
        day_night: DayNight,
        home_away: HomeAway,
        row: u32,
    ) -> Self {
        Self {
            animal: animal.into(),
            timestamp,
            location,
            day_night,
            home_away,
            row,
        }
    }

    /// Euclidean distance to another fix, in coordinate units (meters).
    #[must_use]
    pub fn distance_to(&self, other: &Fix) -> f64 {
        nalgebra::distance(&self.location, &other.location)
    }

    /// Euclidean distance to an arbitrary point.
    #[must_use]
    pub fn distance_to_point(&self, point: &Location) -> f64 {
        nalgebra::distance(&self.location, point)
    }

    /// Absolute time gap to another fix.
    #[must_use]
    pub fn gap_from(&self, other: &Fix) -> TimeDelta {
        (self.timestamp - other.timestamp).abs()
    }

    /// Absolute time gap to an arbitrary instant.
    #[must_use]
    pub fn gap_from_time(&self, instant: DateTime<Utc>) -> TimeDelta {
        (self.timestamp - instant).abs()
    }
}

/// External day/night classification seam.
///
/// `classify` is invoked once per fix by the ingestion layer, before any
/// analysis, to populate [`Fix::day_night`]. The core itself never calls
/// it: solar position math lives outside this crate.
pub trait DayNightClassifier {
    /// Classify a location/time pair as day or night.
    fn classify(&self, location: &Location, timestamp: DateTime<Utc>) -> DayNight;
}

/// Classifier returning the same answer for every fix. Test stand-in for
/// a real solar implementation.
#[derive(Debug, Clone, Copy)]
pub struct ConstantClassifier(pub DayNight);

impl DayNightClassifier for ConstantClassifier {
    fn classify(&self, _location: &Location, _timestamp: DateTime<Utc>) -> DayNight {
        self.0
    }
}

// ── Serde adapters for chrono::TimeDelta ────────────────────────────────────

/// Serialize `TimeDelta` fields as whole milliseconds (chrono provides no
/// serde impls for durations).
pub(crate) mod duration_ms {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(delta: &TimeDelta, ser: S) -> Result<S::Ok, S::Error> {
        delta.num_milliseconds().serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<TimeDelta, D::Error> {
        let ms = i64::deserialize(de)?;
        TimeDelta::try_milliseconds(ms)
            .ok_or_else(|| serde::de::Error::custom(format!("duration out of range: {ms} ms")))
    }
}

/// Same adapter for `Option<TimeDelta>` fields.
pub(crate) mod duration_ms_opt {
    use chrono::TimeDelta;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    pub fn serialize<S: Serializer>(delta: &Option<TimeDelta>, ser: S) -> Result<S::Ok, S::Error> {
        delta.map(|d| d.num_milliseconds()).serialize(ser)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(de: D) -> Result<Option<TimeDelta>, D::Error> {
        match Option::<i64>::deserialize(de)? {
            None => Ok(None),
            Some(ms) => TimeDelta::try_milliseconds(ms)
                .map(Some)
                .ok_or_else(|| serde::de::Error::custom(format!("duration out of range: {ms} ms"))),
        }
    }
}
