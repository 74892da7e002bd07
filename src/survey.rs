//! Ground-truth reconciliation: match field-verified sites to clusters.
//!
//! Field crews bring back verified site coordinates (carcasses, beds,
//! dens). Matching them against computed clusters answers two questions
//! at once: which cluster explains this site, and which clusters have
//! ground truth behind them.
//!
//! A site matches a cluster when the site-to-centroid distance is within
//! tolerance (the larger of the run-wide tolerance and the site's own),
//! or when the site lies inside the cluster's effective extent (its
//! maximum member distance from the centroid). Per site, the
//! nearest-centroid match is primary and the rest are secondary. A
//! cluster can be primary for at most one site: when two sites both have
//! it nearest, the smaller centroid distance wins (tie: smaller site id)
//! and the losing site keeps only secondary matches — promotion would
//! fake a "nearest" that isn't. Ambiguity is surfaced, never resolved
//! silently.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};

use crate::cluster::{Cluster, ClusterId};
use crate::error::{AnalysisError, Result};
use crate::Location;

// ── Field sites ─────────────────────────────────────────────────────────────

/// Identity of one field-verified site (e.g. a waypoint number).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SiteId(String);

impl SiteId {
    /// Create a site id from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SiteId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SiteId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// An externally verified ground-truth location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSite {
    /// Site identity, unique within one matching call.
    pub id: SiteId,
    /// Verified location in the repository's reference system.
    pub location: Location,
    /// Site-specific tolerance radius; the effective tolerance is the
    /// larger of this and [`MatchConfig::tolerance`].
    pub tolerance_radius: f64,
    /// When the site was verified in the field, if recorded.
    pub verified_on: Option<DateTime<Utc>>,
}

impl FieldSite {
    fn validate(&self) -> Result<()> {
        if !(self.location.x.is_finite() && self.location.y.is_finite()) {
            return Err(AnalysisError::invalid_config(format!(
                "field site {} has a non-finite location",
                self.id
            )));
        }
        if !(self.tolerance_radius.is_finite() && self.tolerance_radius >= 0.0) {
            return Err(AnalysisError::invalid_config(format!(
                "field site {} tolerance_radius must be ≥ 0 and finite (got {})",
                self.id, self.tolerance_radius
            )));
        }
        Ok(())
    }
}

// ── Configuration ───────────────────────────────────────────────────────────

/// Parameters controlling site matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchConfig {
    /// Run-wide site-to-centroid tolerance. Must be ≥ 0 and finite.
    pub tolerance: f64,
    /// Optional temporal gate: when set, a dated site only matches
    /// clusters whose interval lies within this gap of the date.
    #[serde(with = "crate::fix::duration_ms_opt")]
    pub max_time_gap: Option<TimeDelta>,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            tolerance: 200.0,
            max_time_gap: None,
        }
    }
}

impl MatchConfig {
    /// Fail fast on an unusable tolerance.
    pub fn validate(&self) -> Result<()> {
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return Err(AnalysisError::invalid_config(format!(
                "tolerance must be ≥ 0 and finite (got {})",
                self.tolerance
            )));
        }
        if let Some(gap) = self.max_time_gap {
            if gap < TimeDelta::zero() {
                return Err(AnalysisError::invalid_config(format!(
                    "max_time_gap must not be negative (got {} s)",
                    gap.num_seconds()
                )));
            }
        }
        Ok(())
    }
}

// ── Match values ────────────────────────────────────────────────────────────

/// One site-to-cluster association.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SiteMatch {
    /// The field site.
    pub site_id: SiteId,
    /// The matched cluster.
    pub cluster_id: ClusterId,
    /// Distance from the site to the cluster centroid.
    pub centroid_distance: f64,
    /// Whether this is the site's primary (nearest, unclaimed) match.
    pub is_primary: bool,
    /// Gap between the site's verification date and the cluster interval:
    /// zero when the date falls inside it. `None` when the site is undated.
    #[serde(with = "crate::fix::duration_ms_opt")]
    pub time_gap: Option<TimeDelta>,
}

// ── Matching ────────────────────────────────────────────────────────────────

/// Match field sites against computed clusters.
///
/// Output is ordered by site id, then ascending centroid distance, then
/// cluster id. Empty sites or clusters yield an empty result.
pub fn match_sites(
    sites: &[FieldSite],
    clusters: &[Cluster],
    config: &MatchConfig,
) -> Result<Vec<SiteMatch>> {
    config.validate()?;
    for site in sites {
        site.validate()?;
    }
    let mut seen = HashSet::new();
    for site in sites {
        if !seen.insert(&site.id) {
            return Err(AnalysisError::invalid_config(format!(
                "duplicate field site id {}",
                site.id
            )));
        }
    }

    // Sites in id order so conflict resolution never depends on input order.
    let mut ordered: Vec<&FieldSite> = sites.iter().collect();
    ordered.sort_by(|a, b| a.id.cmp(&b.id));

    let mut per_site: Vec<Vec<SiteMatch>> = Vec::with_capacity(ordered.len());
    for site in &ordered {
        let effective_tolerance = config.tolerance.max(site.tolerance_radius);
        let mut matches = Vec::new();
        for cluster in clusters {
            let distance = nalgebra::distance(&site.location, &cluster.centroid);
            let within_tolerance = distance <= effective_tolerance;
            let within_extent = distance <= cluster.max_member_distance;
            if !(within_tolerance || within_extent) {
                continue;
            }
            let time_gap = site.verified_on.map(|date| interval_gap(date, cluster));
            if let (Some(max_gap), Some(gap)) = (config.max_time_gap, time_gap) {
                if gap > max_gap {
                    continue;
                }
            }
            matches.push(SiteMatch {
                site_id: site.id.clone(),
                cluster_id: cluster.id.clone(),
                centroid_distance: distance,
                is_primary: false,
                time_gap,
            });
        }
        matches.sort_by(|a, b| {
            a.centroid_distance
                .partial_cmp(&b.centroid_distance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.cluster_id.cmp(&b.cluster_id))
        });
        debug!(site = %site.id, matches = matches.len(), "site matched");
        per_site.push(matches);
    }

    // Each site's nearest match claims its cluster; the smallest distance
    // (then smallest site id, via the id-ordered walk) holds the claim.
    let mut claims: HashMap<ClusterId, (f64, SiteId)> = HashMap::new();
    for (site, matches) in ordered.iter().zip(&per_site) {
        if let Some(nearest) = matches.first() {
            claims
                .entry(nearest.cluster_id.clone())
                .and_modify(|held| {
                    if nearest.centroid_distance < held.0 {
                        *held = (nearest.centroid_distance, site.id.clone());
                    }
                })
                .or_insert_with(|| (nearest.centroid_distance, site.id.clone()));
        }
    }

    let mut out = Vec::new();
    let mut primaries = 0;
    for (site, mut matches) in ordered.iter().zip(per_site.into_iter()) {
        if let Some(nearest) = matches.first_mut() {
            if claims
                .get(&nearest.cluster_id)
                .is_some_and(|(_, winner)| winner == &site.id)
            {
                nearest.is_primary = true;
                primaries += 1;
            }
        }
        out.extend(matches);
    }

    info!(
        sites = sites.len(),
        clusters = clusters.len(),
        matches = out.len(),
        primaries,
        "site matching finished"
    );
    Ok(out)
}

/// Gap from an instant to a cluster's time interval; zero inside it.
fn interval_gap(date: DateTime<Utc>, cluster: &Cluster) -> TimeDelta {
    if date < cluster.start_time {
        cluster.start_time - date
    } else if date > cluster.end_time {
        date - cluster.end_time
    } else {
        TimeDelta::zero()
    }
}
