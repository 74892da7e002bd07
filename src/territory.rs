//! Per-animal territory outlines.
//!
//! A quick visual summary of the ground one animal covers: take the range
//! center (midpoint of the trail's bounding box), bucket every fix by its
//! bearing from the center into fixed-width sectors, keep the farthest
//! fix in each occupied sector, and join those vertices in bearing order.
//! The result is a star-shaped perimeter polygon — coarse, but cheap and
//! stable, and good enough to eyeball range overlap between animals.
//!
//! Pure computation: the crate returns vertices, the caller draws.

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::cancel::CancelToken;
use crate::error::{AnalysisError, Result};
use crate::fix::{AnimalId, Fix};
use crate::repository::FixRepository;
use crate::Location;

// ── Configuration ───────────────────────────────────────────────────────────

/// Parameters controlling outline resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerritoryConfig {
    /// Sector width in degrees, 1..=120. Smaller sectors trace the range
    /// edge more finely but need denser trails to stay occupied.
    pub sector_degrees: u32,
}

impl Default for TerritoryConfig {
    fn default() -> Self {
        Self { sector_degrees: 10 }
    }
}

impl TerritoryConfig {
    /// Fail fast on a sector width outside 1..=120 degrees.
    pub fn validate(&self) -> Result<()> {
        if !(1..=120).contains(&self.sector_degrees) {
            return Err(AnalysisError::invalid_config(format!(
                "sector_degrees must be in 1..=120 (got {})",
                self.sector_degrees
            )));
        }
        Ok(())
    }
}

// ── Outline values ──────────────────────────────────────────────────────────

/// One perimeter vertex: the farthest fix of one bearing sector.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritoryVertex {
    /// Location of the farthest fix in the sector.
    pub location: Location,
    /// Bearing of that fix from the range center, degrees in [0, 360).
    pub bearing_deg: f64,
    /// Distance of that fix from the range center.
    pub radius: f64,
}

/// Radial perimeter of one animal's range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TerritoryOutline {
    /// The animal outlined.
    pub animal: AnimalId,
    /// Range center: midpoint of the trail's bounding box.
    pub center: Location,
    /// Perimeter vertices in ascending bearing order; ≥ 3.
    pub vertices: Vec<TerritoryVertex>,
    /// Number of trail fixes the outline was computed from.
    pub fix_count: usize,
}

// ── Outline computation ─────────────────────────────────────────────────────

/// Outline one animal's trail.
///
/// Returns `None` when fewer than three sectors end up occupied (too few
/// fixes, or everything collinear through the center) — no polygon can be
/// formed. Fixes exactly at the center carry no bearing and are skipped.
pub fn outline(trail: &[Fix], config: &TerritoryConfig) -> Result<Option<TerritoryOutline>> {
    config.validate()?;
    let Some(first) = trail.first() else {
        return Ok(None);
    };

    let (mut x_min, mut x_max, mut y_min, mut y_max) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
    for fix in trail {
        x_min = x_min.min(fix.location.x);
        x_max = x_max.max(fix.location.x);
        y_min = y_min.min(fix.location.y);
        y_max = y_max.max(fix.location.y);
    }
    let center = Location::new((x_min + x_max) / 2.0, (y_min + y_max) / 2.0);

    let sector_width = f64::from(config.sector_degrees);
    let n_sectors = (360.0 / sector_width).ceil() as usize;
    let mut farthest: Vec<Option<TerritoryVertex>> = vec![None; n_sectors];

    for fix in trail {
        let v = fix.location - center;
        let radius = v.norm();
        if radius == 0.0 {
            continue;
        }
        let bearing_deg = v.y.atan2(v.x).to_degrees().rem_euclid(360.0);
        let sector = ((bearing_deg / sector_width) as usize).min(n_sectors - 1);
        // Larger radius wins; ties keep the earlier fix.
        let replace = farthest[sector]
            .as_ref()
            .is_none_or(|held| radius > held.radius);
        if replace {
            farthest[sector] = Some(TerritoryVertex {
                location: fix.location,
                bearing_deg,
                radius,
            });
        }
    }

    let vertices: Vec<TerritoryVertex> = farthest.into_iter().flatten().collect();
    if vertices.len() < 3 {
        debug!(animal = %first.animal, occupied = vertices.len(), "too few sectors for an outline");
        return Ok(None);
    }
    Ok(Some(TerritoryOutline {
        animal: first.animal.clone(),
        center,
        fix_count: trail.len(),
        vertices,
    }))
}

/// Outline every animal in the repository.
///
/// Animals whose trails yield no polygon are omitted. Output is ordered
/// by animal id; with the `parallel` feature the per-animal work fans out
/// onto the rayon pool and is re-sorted to the same order. The
/// cancellation token is checked before each animal.
pub fn outline_all(
    repository: &FixRepository,
    config: &TerritoryConfig,
    cancel: &CancelToken,
) -> Result<Vec<TerritoryOutline>> {
    config.validate()?;

    let trails: Vec<(&AnimalId, &[Fix])> = repository.trails().collect();
    let partials = outline_trails(&trails, config, cancel)?;

    let mut outlines: Vec<TerritoryOutline> = partials.into_iter().flatten().collect();
    outlines.sort_by(|a, b| a.animal.cmp(&b.animal));

    info!(
        animals = trails.len(),
        outlines = outlines.len(),
        "territory outlines finished"
    );
    Ok(outlines)
}

#[cfg(not(feature = "parallel"))]
fn outline_trails(
    trails: &[(&AnimalId, &[Fix])],
    config: &TerritoryConfig,
    cancel: &CancelToken,
) -> Result<Vec<Option<TerritoryOutline>>> {
    trails
        .iter()
        .map(|(_, trail)| {
            cancel.checkpoint()?;
            outline(trail, config)
        })
        .collect()
}

#[cfg(feature = "parallel")]
fn outline_trails(
    trails: &[(&AnimalId, &[Fix])],
    config: &TerritoryConfig,
    cancel: &CancelToken,
) -> Result<Vec<Option<TerritoryOutline>>> {
    use rayon::prelude::*;

    trails
        .par_iter()
        .map(|(_, trail)| {
            cancel.checkpoint()?;
            outline(trail, config)
        })
        .collect()
}
