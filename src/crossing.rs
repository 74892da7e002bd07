//! Trajectory crossing detection across animals.
//!
//! A crossing is a pair of fixes from two *different* animals that are
//! close in both space and time — evidence the animals' paths met. The
//! search is a sweep join over one merged stream:
//!
//! 1. Merge all trails into a single stream ordered by time (ties by
//!    animal id, then source row — a total order, so the sweep is
//!    reproducible).
//! 2. Slide a window of width `time_threshold`: fixes older than the
//!    incoming fix by more than the threshold are evicted from the active
//!    set (equal-to-threshold stays).
//! 3. Compare the incoming fix against every active fix of a different
//!    animal; emit a crossing when the distance is within
//!    `spatial_threshold`.
//!
//! Each unordered pair is examined exactly once — when its later fix
//! arrives — so a crossing can never be emitted twice and the result is
//! symmetric in the two animals. The full cross-product is a test oracle
//! only; the window bounds comparison work to temporally close fixes.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::{AnalysisError, Result};
use crate::fix::{AnimalId, Fix};
use crate::repository::FixRepository;
use crate::Location;

// ── Configuration ───────────────────────────────────────────────────────────

/// Parameters controlling crossing detection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CrossingConfig {
    /// Maximum distance (coordinate units) between the two fixes. Must be > 0.
    pub spatial_threshold: f64,
    /// Maximum time gap between the two fixes. Must be > 0.
    #[serde(with = "crate::fix::duration_ms")]
    pub time_threshold: TimeDelta,
}

impl Default for CrossingConfig {
    fn default() -> Self {
        Self {
            spatial_threshold: 200.0,
            time_threshold: TimeDelta::hours(144),
        }
    }
}

impl CrossingConfig {
    /// Fail fast on thresholds that would make the sweep meaningless.
    pub fn validate(&self) -> Result<()> {
        if !(self.spatial_threshold.is_finite() && self.spatial_threshold > 0.0) {
            return Err(AnalysisError::invalid_config(format!(
                "spatial_threshold must be a positive finite number (got {})",
                self.spatial_threshold
            )));
        }
        if self.time_threshold <= TimeDelta::zero() {
            return Err(AnalysisError::invalid_config(format!(
                "time_threshold must be positive (got {} s)",
                self.time_threshold.num_seconds()
            )));
        }
        Ok(())
    }
}

// ── Crossing values ─────────────────────────────────────────────────────────

/// A proximity event between fixes of two different animals.
///
/// The pair is canonically oriented — `fix_a` belongs to the
/// lexicographically smaller animal id — so the same event always
/// serializes identically no matter how it was discovered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Crossing {
    /// Fix of the smaller animal id.
    pub fix_a: Fix,
    /// Fix of the larger animal id.
    pub fix_b: Fix,
    /// Euclidean distance between the two locations.
    pub spatial_distance: f64,
    /// Absolute time gap between the two fixes.
    #[serde(with = "crate::fix::duration_ms")]
    pub temporal_gap: TimeDelta,
    /// Spatial midpoint of the two locations.
    pub midpoint: Location,
}

impl Crossing {
    /// Build a canonically oriented crossing from an unordered fix pair.
    fn between(x: &Fix, y: &Fix) -> Self {
        let (a, b) = if x.animal <= y.animal { (x, y) } else { (y, x) };
        Self {
            spatial_distance: a.distance_to(b),
            temporal_gap: a.gap_from(b),
            midpoint: nalgebra::center(&a.location, &b.location),
            fix_a: a.clone(),
            fix_b: b.clone(),
        }
    }

    /// The two animals involved, in canonical order.
    #[must_use]
    pub fn animals(&self) -> (&AnimalId, &AnimalId) {
        (&self.fix_a.animal, &self.fix_b.animal)
    }

    /// Timestamp of the earlier of the two fixes.
    #[must_use]
    pub fn start_time(&self) -> chrono::DateTime<chrono::Utc> {
        self.fix_a.timestamp.min(self.fix_b.timestamp)
    }
}

// ── The sweep ───────────────────────────────────────────────────────────────

/// Detect crossings across every animal pair in the repository.
///
/// Returns crossings ordered by earlier-fix timestamp, then by the
/// canonical pair identity — the same sequence regardless of the order
/// animals were supplied in. The cancellation token is checked once per
/// stream element; on cancellation all partial results are discarded.
pub fn find_crossings(
    repository: &FixRepository,
    config: &CrossingConfig,
    cancel: &CancelToken,
) -> Result<Vec<Crossing>> {
    config.validate()?;

    // Merge every trail into one totally ordered stream.
    let mut stream: Vec<&Fix> = repository.all_fixes().iter().collect();
    stream.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.animal.cmp(&b.animal))
            .then_with(|| a.row.cmp(&b.row))
    });

    let mut crossings = Vec::new();
    let mut active: VecDeque<&Fix> = VecDeque::new();

    for incoming in stream {
        cancel.checkpoint()?;

        while let Some(oldest) = active.front() {
            if incoming.timestamp - oldest.timestamp > config.time_threshold {
                active.pop_front();
            } else {
                break;
            }
        }

        for candidate in &active {
            if candidate.animal == incoming.animal {
                continue;
            }
            let distance = candidate.distance_to(incoming);
            if distance <= config.spatial_threshold {
                debug!(
                    a = %candidate.animal,
                    b = %incoming.animal,
                    distance,
                    gap_s = (incoming.timestamp - candidate.timestamp).num_seconds(),
                    "crossing detected"
                );
                crossings.push(Crossing::between(candidate, incoming));
            }
        }

        active.push_back(incoming);
    }

    crossings.sort_by(|x, y| {
        x.start_time()
            .cmp(&y.start_time())
            .then_with(|| x.fix_a.animal.cmp(&y.fix_a.animal))
            .then_with(|| x.fix_b.animal.cmp(&y.fix_b.animal))
            .then_with(|| x.fix_a.row.cmp(&y.fix_a.row))
            .then_with(|| x.fix_b.row.cmp(&y.fix_b.row))
    });

    info!(
        fixes = repository.len(),
        crossings = crossings.len(),
        "crossing sweep finished"
    );
    Ok(crossings)
}
