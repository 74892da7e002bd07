//! Point/time attribution queries: which animal was here, then?
//!
//! Given a location and an instant — a carcass found on a survey, a
//! camera-trap hit — `resolve` returns every fix inside the spatial
//! radius *and* the time window, ranked nearest-first. A radius and
//! window of zero restrict the answer to exact coincidence. An empty
//! candidate list is a legitimate answer: nobody we track was there.
//!
//! Candidates come from the repository's grid index (radius query, then
//! exact time filter). Near misses — fixes that failed one constraint but
//! only just — are ranked by a combined closeness score in a separate
//! full scan, and only when both thresholds are positive (the score
//! normalizes by them).

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use tracing::{debug, info};

use crate::error::{AnalysisError, Result};
use crate::fix::{AnimalId, Fix};
use crate::repository::FixRepository;
use crate::Location;

// ── Query ───────────────────────────────────────────────────────────────────

/// One attribution query.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WhodunitQuery {
    /// Where the observation was made.
    pub location: Location,
    /// When the observation was made (UTC).
    pub time: DateTime<Utc>,
    /// Spatial search radius (coordinate units). Must be ≥ 0 and finite;
    /// 0 demands exact spatial coincidence.
    pub spatial_radius: f64,
    /// Temporal search half-width. Must be ≥ 0; 0 demands exact temporal
    /// coincidence.
    #[serde(with = "crate::fix::duration_ms")]
    pub time_window: TimeDelta,
    /// Maximum number of near misses to report. 0 disables the near-miss
    /// scan entirely.
    pub near_miss_limit: usize,
}

impl WhodunitQuery {
    /// Query at a location/time with the default radius (200 units),
    /// window (144 h), and near-miss limit (10).
    #[must_use]
    pub fn new(location: Location, time: DateTime<Utc>) -> Self {
        Self {
            location,
            time,
            spatial_radius: 200.0,
            time_window: TimeDelta::hours(144),
            near_miss_limit: 10,
        }
    }

    /// Fail fast on an unanswerable query.
    pub fn validate(&self) -> Result<()> {
        if !(self.location.x.is_finite() && self.location.y.is_finite()) {
            return Err(AnalysisError::invalid_config(
                "query location must be finite",
            ));
        }
        if !(self.spatial_radius.is_finite() && self.spatial_radius >= 0.0) {
            return Err(AnalysisError::invalid_config(format!(
                "spatial_radius must be ≥ 0 and finite (got {})",
                self.spatial_radius
            )));
        }
        if self.time_window < TimeDelta::zero() {
            return Err(AnalysisError::invalid_config(format!(
                "time_window must not be negative (got {} s)",
                self.time_window.num_seconds()
            )));
        }
        Ok(())
    }
}

// ── Results ─────────────────────────────────────────────────────────────────

/// One fix satisfying both query constraints.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Animal the fix belongs to.
    pub animal: AnimalId,
    /// The matching fix.
    pub fix: Fix,
    /// Distance from the query location.
    pub distance: f64,
    /// Absolute gap from the query time.
    #[serde(with = "crate::fix::duration_ms")]
    pub time_gap: TimeDelta,
}

/// A fix that failed at least one constraint, ranked by how narrowly.
///
/// `closeness` is `distance/radius + time_gap/window`: 2.0 means exactly
/// on both limits, smaller is closer. Present only when both thresholds
/// are positive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NearMiss {
    /// Animal the fix belongs to.
    pub animal: AnimalId,
    /// The near-missing fix.
    pub fix: Fix,
    /// Distance from the query location.
    pub distance: f64,
    /// Absolute gap from the query time.
    #[serde(with = "crate::fix::duration_ms")]
    pub time_gap: TimeDelta,
    /// Combined normalized score; lower is closer.
    pub closeness: f64,
}

/// Everything a query turned up.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WhodunitReport {
    /// Fixes within both constraints, ordered by ascending distance, then
    /// time gap, then animal id, then timestamp.
    pub candidates: Vec<Candidate>,
    /// Closest failures, ordered by ascending closeness.
    pub near_misses: Vec<NearMiss>,
}

// ── Resolution ──────────────────────────────────────────────────────────────

/// Resolve an attribution query against the repository.
pub fn resolve(repository: &FixRepository, query: &WhodunitQuery) -> Result<WhodunitReport> {
    query.validate()?;
    debug!(
        x = query.location.x,
        y = query.location.y,
        time = %query.time,
        radius = query.spatial_radius,
        window_s = query.time_window.num_seconds(),
        "resolving whodunit query"
    );

    let fixes = repository.all_fixes();
    let mut candidates = Vec::new();
    for idx in repository.index().query_radius(&query.location, query.spatial_radius) {
        let fix = &fixes[idx as usize];
        let time_gap = fix.gap_from_time(query.time);
        if time_gap <= query.time_window {
            candidates.push(Candidate {
                animal: fix.animal.clone(),
                distance: fix.distance_to_point(&query.location),
                time_gap,
                fix: fix.clone(),
            });
        }
    }
    candidates.sort_by(|a, b| {
        a.distance
            .partial_cmp(&b.distance)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.time_gap.cmp(&b.time_gap))
            .then_with(|| a.animal.cmp(&b.animal))
            .then_with(|| a.fix.timestamp.cmp(&b.fix.timestamp))
            .then_with(|| a.fix.row.cmp(&b.fix.row))
    });

    let near_misses = rank_near_misses(fixes, query);

    info!(
        candidates = candidates.len(),
        near_misses = near_misses.len(),
        "whodunit query resolved"
    );
    Ok(WhodunitReport {
        candidates,
        near_misses,
    })
}

/// Full scan for the closest constraint failures. The closeness ratio is
/// undefined at zero thresholds, so exact-coincidence queries get none.
fn rank_near_misses(fixes: &[Fix], query: &WhodunitQuery) -> Vec<NearMiss> {
    if query.near_miss_limit == 0
        || query.spatial_radius <= 0.0
        || query.time_window <= TimeDelta::zero()
    {
        return Vec::new();
    }
    let window_s = query.time_window.num_seconds() as f64;

    let mut misses: Vec<NearMiss> = fixes
        .iter()
        .filter_map(|fix| {
            let distance = fix.distance_to_point(&query.location);
            let time_gap = fix.gap_from_time(query.time);
            if distance <= query.spatial_radius && time_gap <= query.time_window {
                return None; // a candidate, not a miss
            }
            let closeness = distance / query.spatial_radius
                + time_gap.num_seconds() as f64 / window_s;
            Some(NearMiss {
                animal: fix.animal.clone(),
                fix: fix.clone(),
                distance,
                time_gap,
                closeness,
            })
        })
        .collect();

    misses.sort_by(|a, b| {
        a.closeness
            .partial_cmp(&b.closeness)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                a.distance
                    .partial_cmp(&b.distance)
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.time_gap.cmp(&b.time_gap))
            .then_with(|| a.animal.cmp(&b.animal))
            .then_with(|| a.fix.timestamp.cmp(&b.fix.timestamp))
            .then_with(|| a.fix.row.cmp(&b.fix.row))
    });
    misses.truncate(query.near_miss_limit);
    misses
}
