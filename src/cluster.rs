//! Single-animal spatio-temporal clustering.
//!
//! Finds runs of fixes that sit close together in both space and time —
//! candidate rest, feeding, or kill sites. The algorithm is a single
//! forward pass over one animal's time-ordered trail:
//!
//! 1. Seed an accumulator with the first fix.
//! 2. For each later fix, compute (a) distance to the accumulator's
//!    running centroid (mean of admitted coordinates) and (b) time gap
//!    from the most recently admitted fix.
//! 3. Admit when both are within their thresholds (closed intervals:
//!    equal-to-threshold admits); otherwise close the accumulator as a
//!    finished cluster and seed a new one with this fix.
//! 4. At end of input, close the final accumulator.
//! 5. Closed clusters below the size/duration minimums are demoted: their
//!    members are reported as unclustered, never discarded.
//!
//! The pass is a pure local fold — no shared state across calls or
//! animals — so per-animal work is independent and freely parallel.

use chrono::{DateTime, TimeDelta, Utc};
use nalgebra::Vector2;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::{AnalysisError, Result};
use crate::fix::{AnimalId, DayNight, Fix, HomeAway};
use crate::repository::FixRepository;
use crate::Location;

// ── Configuration ───────────────────────────────────────────────────────────

/// Parameters controlling cluster formation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Maximum distance (coordinate units) from a fix to the running
    /// centroid for admission. Must be > 0.
    pub spatial_threshold: f64,
    /// Maximum time gap from the most recently admitted fix. Must be > 0.
    #[serde(with = "crate::fix::duration_ms")]
    pub temporal_gap: TimeDelta,
    /// Minimum member count for a closed cluster to be emitted; smaller
    /// ones are demoted to unclustered. Must be ≥ 1 (1 = emit everything).
    pub min_size: usize,
    /// Optional minimum duration (end − start) for a closed cluster;
    /// briefer ones are demoted exactly like too-small ones.
    #[serde(with = "crate::fix::duration_ms_opt")]
    pub min_duration: Option<TimeDelta>,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            spatial_threshold: 200.0,
            temporal_gap: TimeDelta::hours(144),
            min_size: 1,
            min_duration: None,
        }
    }
}

impl ClusterConfig {
    /// Fail fast on thresholds that would make the scan meaningless.
    pub fn validate(&self) -> Result<()> {
        if !(self.spatial_threshold.is_finite() && self.spatial_threshold > 0.0) {
            return Err(AnalysisError::invalid_config(format!(
                "spatial_threshold must be a positive finite number (got {})",
                self.spatial_threshold
            )));
        }
        if self.temporal_gap <= TimeDelta::zero() {
            return Err(AnalysisError::invalid_config(format!(
                "temporal_gap must be positive (got {} s)",
                self.temporal_gap.num_seconds()
            )));
        }
        if self.min_size < 1 {
            return Err(AnalysisError::invalid_config("min_size must be ≥ 1"));
        }
        if let Some(min_duration) = self.min_duration {
            if min_duration < TimeDelta::zero() {
                return Err(AnalysisError::invalid_config(format!(
                    "min_duration must not be negative (got {} s)",
                    min_duration.num_seconds()
                )));
            }
        }
        Ok(())
    }
}

// ── Cluster values ──────────────────────────────────────────────────────────

/// Stable cluster identity: animal id plus start timestamp to the
/// second, e.g. `F201-20090315-043000`. Clusters of one animal whose
/// starts fall in the same second (sub-second gaps are legal input) get
/// an ordinal suffix, so ids are unique within one analysis and
/// identical across repeated runs over the same data.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClusterId(String);

impl ClusterId {
    fn derive(animal: &AnimalId, start: DateTime<Utc>) -> Self {
        Self(format!("{}-{}", animal, start.format("%Y%m%d-%H%M%S")))
    }

    fn with_ordinal(&self, n: usize) -> Self {
        Self(format!("{}-{n}", self.0))
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClusterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A spatio-temporally contiguous group of one animal's fixes.
///
/// Derived, immutable result value: built once by the clustering pass and
/// never mutated afterwards. Summary statistics are measured against the
/// final centroid (the mean of all member coordinates).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cluster {
    /// Stable identity derived from animal and start time.
    pub id: ClusterId,
    /// Owner; every member carries the same animal id.
    pub animal: AnimalId,
    /// Member fixes in admission (time) order. Never empty.
    pub members: Vec<Fix>,
    /// Mean of member coordinates.
    pub centroid: Location,
    /// Timestamp of the first member.
    pub start_time: DateTime<Utc>,
    /// Timestamp of the last member.
    pub end_time: DateTime<Utc>,
    /// `end_time − start_time`.
    #[serde(with = "crate::fix::duration_ms")]
    pub duration: TimeDelta,
    /// Members flagged [`DayNight::Day`].
    pub day_count: usize,
    /// Members flagged [`DayNight::Night`].
    pub night_count: usize,
    /// Members flagged [`HomeAway::Home`]. Tally only; the flag gates nothing.
    pub home_count: usize,
    /// Members flagged [`HomeAway::Away`]. Tally only.
    pub away_count: usize,
    /// Average member distance from the centroid.
    pub mean_member_distance: f64,
    /// Maximum member distance from the centroid — the cluster's
    /// effective spatial extent, used by field-site matching.
    pub max_member_distance: f64,
}

impl Cluster {
    /// Number of member fixes. Clusters are never empty, so there is no
    /// `is_empty` counterpart.
    #[allow(clippy::len_without_is_empty)]
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Build a cluster from a non-empty, time-ordered member run.
    fn from_members(animal: AnimalId, members: Vec<Fix>) -> Self {
        let centroid = centroid_of(&members);
        let start_time = members[0].timestamp;
        let end_time = members[members.len() - 1].timestamp;

        let mut day_count = 0;
        let mut night_count = 0;
        let mut home_count = 0;
        let mut away_count = 0;
        let mut dist_sum = 0.0;
        let mut dist_max = 0.0_f64;
        for member in &members {
            match member.day_night {
                DayNight::Day => day_count += 1,
                DayNight::Night => night_count += 1,
            }
            match member.home_away {
                HomeAway::Home => home_count += 1,
                HomeAway::Away => away_count += 1,
            }
            let d = member.distance_to_point(&centroid);
            dist_sum += d;
            dist_max = dist_max.max(d);
        }

        Self {
            id: ClusterId::derive(&animal, start_time),
            animal,
            centroid,
            start_time,
            end_time,
            duration: end_time - start_time,
            day_count,
            night_count,
            home_count,
            away_count,
            mean_member_distance: dist_sum / members.len() as f64,
            max_member_distance: dist_max,
            members,
        }
    }
}

/// Result of a clustering pass: emitted clusters plus every fix that
/// ended up outside them (isolated fixes and demoted-cluster members).
/// Each input fix appears in exactly one of the two collections.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClusterReport {
    /// Emitted clusters, ordered by animal id then start time.
    pub clusters: Vec<Cluster>,
    /// Fixes outside any emitted cluster, ordered by animal id then time.
    pub unclustered: Vec<Fix>,
}

// ── The clustering pass ─────────────────────────────────────────────────────

/// Open cluster being grown by the fold: members so far plus coordinate
/// sums for the running mean.
struct Accumulator {
    members: Vec<Fix>,
    coord_sum: Vector2<f64>,
}

impl Accumulator {
    fn seed(fix: Fix) -> Self {
        let coord_sum = fix.location.coords;
        Self {
            members: vec![fix],
            coord_sum,
        }
    }

    /// Running centroid: mean of admitted coordinates.
    fn centroid(&self) -> Location {
        Location::from(self.coord_sum / self.members.len() as f64)
    }

    /// Admission test against the running centroid and the most recently
    /// admitted fix. Closed intervals on both axes.
    fn admits(&self, fix: &Fix, config: &ClusterConfig) -> bool {
        let last = &self.members[self.members.len() - 1];
        fix.distance_to_point(&self.centroid()) <= config.spatial_threshold
            && fix.timestamp - last.timestamp <= config.temporal_gap
    }

    fn admit(&mut self, fix: Fix) {
        self.coord_sum += fix.location.coords;
        self.members.push(fix);
    }

    /// Close the accumulator: emit a cluster, or demote its members when
    /// the run is too small or too brief.
    fn close(self, config: &ClusterConfig, report: &mut ClusterReport) {
        let span = self.members[self.members.len() - 1].timestamp - self.members[0].timestamp;
        let too_small = self.members.len() < config.min_size;
        let too_brief = config.min_duration.is_some_and(|min| span < min);
        if too_small || too_brief {
            report.unclustered.extend(self.members);
            return;
        }
        let animal = self.members[0].animal.clone();
        report.clusters.push(Cluster::from_members(animal, self.members));
    }
}

/// Cluster one animal's time-ordered trail.
///
/// The fold described in the module docs. `trail` must hold a single
/// animal's fixes in ascending time order — the order a
/// [`FixRepository`] trail already guarantees.
///
/// Empty input yields an empty report, not an error.
pub fn cluster_trail(trail: &[Fix], config: &ClusterConfig) -> Result<ClusterReport> {
    config.validate()?;
    debug_assert!(
        trail.windows(2).all(|w| w[0].animal == w[1].animal),
        "cluster_trail expects a single animal's trail"
    );

    let mut report = ClusterReport::default();
    let mut open: Option<Accumulator> = None;

    for fix in trail {
        match open.as_mut() {
            Some(acc) if acc.admits(fix, config) => acc.admit(fix.clone()),
            Some(acc) => {
                let finished = std::mem::replace(acc, Accumulator::seed(fix.clone()));
                finished.close(config, &mut report);
            }
            None => open = Some(Accumulator::seed(fix.clone())),
        }
    }
    if let Some(acc) = open {
        acc.close(config, &mut report);
    }

    // Clusters close in time order, so repeated derived ids (same-second
    // starts) are adjacent; suffix the repeats with an ordinal.
    let mut previous: Option<(ClusterId, usize)> = None;
    for cluster in &mut report.clusters {
        match &mut previous {
            Some((base, n)) if *base == cluster.id => {
                *n += 1;
                cluster.id = base.with_ordinal(*n);
            }
            _ => previous = Some((cluster.id.clone(), 1)),
        }
    }

    Ok(report)
}

/// Cluster every animal in the repository.
///
/// Per-animal passes are independent; with the `parallel` feature they fan
/// out onto the rayon pool. Either way the merged output is re-sorted to
/// the documented order (clusters by animal then start time, unclustered
/// by animal then time), so results are identical across thread counts.
///
/// The cancellation token is checked before each animal's pass; on
/// cancellation every partial result is discarded.
pub fn cluster_repository(
    repository: &FixRepository,
    config: &ClusterConfig,
    cancel: &CancelToken,
) -> Result<ClusterReport> {
    config.validate()?;

    let trails: Vec<(&AnimalId, &[Fix])> = repository.trails().collect();
    let partials = cluster_trails(&trails, config, cancel)?;

    let mut report = ClusterReport::default();
    for (animal, partial) in trails.iter().map(|(a, _)| *a).zip(partials) {
        debug!(
            animal = %animal,
            clusters = partial.clusters.len(),
            unclustered = partial.unclustered.len(),
            "trail clustered"
        );
        report.clusters.extend(partial.clusters);
        report.unclustered.extend(partial.unclustered);
    }

    report.clusters.sort_by(|a, b| {
        a.animal
            .cmp(&b.animal)
            .then_with(|| a.start_time.cmp(&b.start_time))
    });
    report.unclustered.sort_by(|a, b| {
        a.animal
            .cmp(&b.animal)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
            .then_with(|| a.row.cmp(&b.row))
    });

    info!(
        animals = trails.len(),
        clusters = report.clusters.len(),
        unclustered = report.unclustered.len(),
        "clustering finished"
    );
    Ok(report)
}

#[cfg(not(feature = "parallel"))]
fn cluster_trails(
    trails: &[(&AnimalId, &[Fix])],
    config: &ClusterConfig,
    cancel: &CancelToken,
) -> Result<Vec<ClusterReport>> {
    trails
        .iter()
        .map(|(_, trail)| {
            cancel.checkpoint()?;
            cluster_trail(trail, config)
        })
        .collect()
}

#[cfg(feature = "parallel")]
fn cluster_trails(
    trails: &[(&AnimalId, &[Fix])],
    config: &ClusterConfig,
    cancel: &CancelToken,
) -> Result<Vec<ClusterReport>> {
    use rayon::prelude::*;

    trails
        .par_iter()
        .map(|(_, trail)| {
            cancel.checkpoint()?;
            cluster_trail(trail, config)
        })
        .collect()
}

fn centroid_of(members: &[Fix]) -> Location {
    let sum: Vector2<f64> = members.iter().map(|f| f.location.coords).sum();
    Location::from(sum / members.len() as f64)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::SpatialBounds;
    use chrono::TimeZone;

    fn fix(animal: &str, hour: u32, minute: u32, x: f64, y: f64, row: u32) -> Fix {
        Fix::new(
            animal,
            Utc.with_ymd_and_hms(2009, 3, 15, hour, minute, 0).unwrap(),
            Location::new(x, y),
            DayNight::Day,
            HomeAway::Home,
            row,
        )
    }

    fn config(spatial: f64, gap_hours: i64, min_size: usize) -> ClusterConfig {
        ClusterConfig {
            spatial_threshold: spatial,
            temporal_gap: TimeDelta::hours(gap_hours),
            min_size,
            min_duration: None,
        }
    }

    #[test]
    fn test_tight_run_forms_one_cluster() {
        // Four fixes within 50 units over hours 0..=3.
        let trail = vec![
            fix("F201", 0, 0, 0.0, 0.0, 0),
            fix("F201", 1, 0, 30.0, 0.0, 1),
            fix("F201", 2, 0, 0.0, 30.0, 2),
            fix("F201", 3, 0, 30.0, 30.0, 3),
        ];
        let report = cluster_trail(&trail, &config(100.0, 2, 1)).unwrap();
        assert_eq!(report.clusters.len(), 1);
        assert!(report.unclustered.is_empty());
        let cluster = &report.clusters[0];
        assert_eq!(cluster.len(), 4);
        assert_eq!(cluster.centroid, Location::new(15.0, 15.0));
        assert_eq!(cluster.duration, TimeDelta::hours(3));
        assert_eq!(cluster.id.as_str(), "F201-20090315-000000");
    }

    #[test]
    fn test_long_gap_splits_clusters() {
        // 9-hour silence between hour 1 and hour 10 splits the run.
        let trail = vec![
            fix("F201", 0, 0, 0.0, 0.0, 0),
            fix("F201", 1, 0, 10.0, 0.0, 1),
            fix("F201", 10, 0, 0.0, 10.0, 2),
            fix("F201", 11, 0, 10.0, 10.0, 3),
        ];
        let report = cluster_trail(&trail, &config(100.0, 2, 1)).unwrap();
        assert_eq!(report.clusters.len(), 2);
        assert_eq!(report.clusters[0].len(), 2);
        assert_eq!(report.clusters[1].len(), 2);
        assert!(report.unclustered.is_empty());
    }

    #[test]
    fn test_distance_to_running_centroid_not_last_fix() {
        // Second fix at 90: admitted (centroid is the seed). Third at 180:
        // 135 from the centroid (45, 0), so it splits even though it is
        // only 90 from the previous fix.
        let trail = vec![
            fix("F201", 0, 0, 0.0, 0.0, 0),
            fix("F201", 1, 0, 90.0, 0.0, 1),
            fix("F201", 2, 0, 180.0, 0.0, 2),
        ];
        let report = cluster_trail(&trail, &config(100.0, 6, 1)).unwrap();
        assert_eq!(report.clusters.len(), 2);
        assert_eq!(report.clusters[0].len(), 2);
        assert_eq!(report.clusters[1].len(), 1);
    }

    #[test]
    fn test_threshold_equality_admits() {
        // Exactly on both thresholds: closed intervals admit.
        let trail = vec![
            fix("F201", 0, 0, 0.0, 0.0, 0),
            fix("F201", 2, 0, 100.0, 0.0, 1),
        ];
        let report = cluster_trail(&trail, &config(100.0, 2, 1)).unwrap();
        assert_eq!(report.clusters.len(), 1);
        assert_eq!(report.clusters[0].len(), 2);
    }

    #[test]
    fn test_same_minute_clusters_get_distinct_ids() {
        // Two singleton clusters 30 s and 5000 units apart: both start in
        // minute 00:00 but the ids carry seconds.
        let trail = vec![
            fix("F201", 0, 0, 0.0, 0.0, 0),
            Fix {
                timestamp: Utc.with_ymd_and_hms(2009, 3, 15, 0, 0, 30).unwrap(),
                ..fix("F201", 0, 0, 5000.0, 0.0, 1)
            },
        ];
        let report = cluster_trail(&trail, &config(100.0, 2, 1)).unwrap();
        assert_eq!(report.clusters.len(), 2);
        assert_ne!(report.clusters[0].id, report.clusters[1].id);
        assert_eq!(report.clusters[0].id.as_str(), "F201-20090315-000000");
        assert_eq!(report.clusters[1].id.as_str(), "F201-20090315-000030");
    }

    #[test]
    fn test_same_second_clusters_get_ordinal_suffixes() {
        // Sub-second gaps are legal input: three far-apart fixes inside
        // one second yield three clusters, suffixed past the first.
        let base = Utc.with_ymd_and_hms(2009, 3, 15, 0, 0, 0).unwrap();
        let trail: Vec<Fix> = (0..3u32)
            .map(|i| Fix {
                timestamp: base + TimeDelta::milliseconds(i64::from(i) * 300),
                ..fix("F201", 0, 0, f64::from(i) * 5000.0, 0.0, i)
            })
            .collect();
        let report = cluster_trail(&trail, &config(100.0, 2, 1)).unwrap();
        assert_eq!(report.clusters.len(), 3);
        assert_eq!(report.clusters[0].id.as_str(), "F201-20090315-000000");
        assert_eq!(report.clusters[1].id.as_str(), "F201-20090315-000000-2");
        assert_eq!(report.clusters[2].id.as_str(), "F201-20090315-000000-3");
    }

    #[test]
    fn test_min_size_demotes_to_unclustered() {
        let trail = vec![
            fix("F201", 0, 0, 0.0, 0.0, 0),
            fix("F201", 1, 0, 10.0, 0.0, 1),
            // Far away single fix: a run of one.
            fix("F201", 2, 0, 5000.0, 0.0, 2),
            fix("F201", 3, 0, 5010.0, 0.0, 3),
        ];
        let report = cluster_trail(&trail, &config(100.0, 2, 3)).unwrap();
        assert!(report.clusters.is_empty());
        assert_eq!(report.unclustered.len(), 4);
    }

    #[test]
    fn test_min_duration_demotes_brief_clusters() {
        let trail = vec![
            fix("F201", 0, 0, 0.0, 0.0, 0),
            fix("F201", 0, 30, 10.0, 0.0, 1),
        ];
        let mut cfg = config(100.0, 2, 1);
        cfg.min_duration = Some(TimeDelta::hours(1));
        let report = cluster_trail(&trail, &cfg).unwrap();
        assert!(report.clusters.is_empty());
        assert_eq!(report.unclustered.len(), 2);
    }

    #[test]
    fn test_reclustering_members_is_idempotent() {
        let trail = vec![
            fix("F201", 0, 0, 0.0, 0.0, 0),
            fix("F201", 1, 0, 40.0, 0.0, 1),
            fix("F201", 2, 0, 0.0, 40.0, 2),
            fix("F201", 3, 0, 40.0, 40.0, 3),
        ];
        let cfg = config(100.0, 2, 1);
        let report = cluster_trail(&trail, &cfg).unwrap();
        assert_eq!(report.clusters.len(), 1);

        let members = report.clusters[0].members.clone();
        let again = cluster_trail(&members, &cfg).unwrap();
        assert_eq!(again.clusters.len(), 1);
        assert_eq!(again.clusters[0].members, members);
    }

    #[test]
    fn test_summary_statistics() {
        let trail = vec![
            fix("F201", 0, 0, -30.0, 0.0, 0),
            Fix {
                day_night: DayNight::Night,
                home_away: HomeAway::Away,
                ..fix("F201", 1, 0, 30.0, 0.0, 1)
            },
        ];
        let report = cluster_trail(&trail, &config(100.0, 2, 1)).unwrap();
        let cluster = &report.clusters[0];
        assert_eq!(cluster.centroid, Location::new(0.0, 0.0));
        assert_eq!(cluster.mean_member_distance, 30.0);
        assert_eq!(cluster.max_member_distance, 30.0);
        assert_eq!(cluster.day_count, 1);
        assert_eq!(cluster.night_count, 1);
        assert_eq!(cluster.home_count, 1);
        assert_eq!(cluster.away_count, 1);
    }

    #[test]
    fn test_empty_trail_is_valid() {
        let report = cluster_trail(&[], &ClusterConfig::default()).unwrap();
        assert!(report.clusters.is_empty());
        assert!(report.unclustered.is_empty());
    }

    #[test]
    fn test_bad_config_fails_fast() {
        assert!(cluster_trail(&[], &config(0.0, 2, 1)).is_err());
        assert!(cluster_trail(&[], &config(f64::NAN, 2, 1)).is_err());
        assert!(cluster_trail(&[], &config(100.0, 0, 1)).is_err());
        assert!(cluster_trail(&[], &config(100.0, 2, 0)).is_err());
        let mut cfg = config(100.0, 2, 1);
        cfg.min_duration = Some(TimeDelta::hours(-1));
        assert!(cluster_trail(&[], &cfg).is_err());
    }

    #[test]
    fn test_repository_driver_orders_output() {
        let rows = vec![
            fix("M3", 0, 0, 100.0, 100.0, 0),
            fix("M3", 1, 0, 110.0, 100.0, 1),
            fix("F201", 0, 0, 0.0, 0.0, 2),
            fix("F201", 1, 0, 10.0, 0.0, 3),
        ];
        let (repo, _) = FixRepository::assemble(rows, SpatialBounds::unbounded()).unwrap();
        let report =
            cluster_repository(&repo, &config(100.0, 2, 1), &CancelToken::new()).unwrap();
        assert_eq!(report.clusters.len(), 2);
        assert_eq!(report.clusters[0].animal, AnimalId::new("F201"));
        assert_eq!(report.clusters[1].animal, AnimalId::new("M3"));
    }

    #[test]
    fn test_cancellation_discards_partials() {
        let rows = vec![fix("F201", 0, 0, 0.0, 0.0, 0), fix("M3", 0, 0, 5.0, 5.0, 1)];
        let (repo, _) = FixRepository::assemble(rows, SpatialBounds::unbounded()).unwrap();
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = cluster_repository(&repo, &ClusterConfig::default(), &cancel).unwrap_err();
        assert!(matches!(err, AnalysisError::Cancelled));
    }
}
