//! Validated, immutable fix storage grouped by animal.
//!
//! `FixRepository` is the shared read-only substrate for every analysis:
//! fixes are stored in one flat slab, grouped per animal (animals in
//! lexicographic order), each animal's trail strictly increasing in time.
//! Assembly enforces that invariant up front:
//!
//! 1. Coordinates must be finite and inside the declared [`SpatialBounds`].
//! 2. Per animal, timestamps must be strictly increasing in arrival order;
//!    a regression or an exact duplicate is a defect.
//!
//! A defective fix is excluded, logged, and counted in the [`IngestReport`]
//! — assembly never aborts over bad rows. The repository does NOT sort its
//! input: time ordering is the ingestion layer's contract, and silently
//! reordering would mask upstream corruption.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

use crate::error::{AnalysisError, Result};
use crate::fix::{AnimalId, Fix};
use crate::grid::FixIndex;
use crate::Location;

// ── Coordinate bounds ───────────────────────────────────────────────────────

/// Valid coordinate range for the projected reference system in use.
///
/// Fixes outside the range are rejected at assembly. The default is
/// unbounded (any finite coordinate passes); studies working in a single
/// UTM zone will want the zone's plausible easting/northing window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpatialBounds {
    /// Minimum accepted x (easting), inclusive.
    pub x_min: f64,
    /// Maximum accepted x (easting), inclusive.
    pub x_max: f64,
    /// Minimum accepted y (northing), inclusive.
    pub y_min: f64,
    /// Maximum accepted y (northing), inclusive.
    pub y_max: f64,
}

impl Default for SpatialBounds {
    fn default() -> Self {
        Self {
            x_min: f64::MIN,
            x_max: f64::MAX,
            y_min: f64::MIN,
            y_max: f64::MAX,
        }
    }
}

impl SpatialBounds {
    /// Bounds accepting any finite coordinate.
    #[must_use]
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Bounds over explicit inclusive easting/northing windows.
    #[must_use]
    pub fn new(x_min: f64, x_max: f64, y_min: f64, y_max: f64) -> Self {
        Self {
            x_min,
            x_max,
            y_min,
            y_max,
        }
    }

    /// Fail fast on inverted or non-finite-ordered windows.
    pub fn validate(&self) -> Result<()> {
        if self.x_min.is_nan() || self.x_max.is_nan() || self.y_min.is_nan() || self.y_max.is_nan()
        {
            return Err(AnalysisError::invalid_config("spatial bounds must not be NaN"));
        }
        if self.x_min > self.x_max || self.y_min > self.y_max {
            return Err(AnalysisError::invalid_config(format!(
                "inverted spatial bounds: x [{}, {}], y [{}, {}]",
                self.x_min, self.x_max, self.y_min, self.y_max
            )));
        }
        Ok(())
    }

    /// Whether a point lies inside the window (inclusive edges).
    #[must_use]
    pub fn contains(&self, p: &Location) -> bool {
        p.x >= self.x_min && p.x <= self.x_max && p.y >= self.y_min && p.y <= self.y_max
    }
}

// ── Ingest defects ──────────────────────────────────────────────────────────

/// Why a fix was excluded during assembly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefectKind {
    /// A coordinate was NaN or infinite.
    NonFiniteCoordinate,
    /// The location fell outside the declared [`SpatialBounds`].
    OutOfBounds,
    /// The timestamp was earlier than the animal's previously accepted fix.
    TimestampRegression,
    /// The timestamp exactly equalled the animal's previously accepted fix.
    DuplicateTimestamp,
}

/// One excluded fix, with enough context to chase it back to the source row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixDefect {
    /// Source row of the excluded fix.
    pub row: u32,
    /// Animal the fix claimed to belong to.
    pub animal: AnimalId,
    /// Timestamp carried by the excluded fix.
    pub timestamp: DateTime<Utc>,
    /// Defect classification.
    pub kind: DefectKind,
}

/// Outcome of repository assembly: what was kept, what was dropped and why.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestReport {
    /// Number of fixes accepted into the repository.
    pub accepted: usize,
    /// Every excluded fix, in arrival order.
    pub defects: Vec<FixDefect>,
}

impl IngestReport {
    /// Number of excluded fixes.
    #[must_use]
    pub fn rejected(&self) -> usize {
        self.defects.len()
    }

    /// Number of excluded fixes of one defect class.
    #[must_use]
    pub fn count_of(&self, kind: DefectKind) -> usize {
        self.defects.iter().filter(|d| d.kind == kind).count()
    }
}

// ── The repository ──────────────────────────────────────────────────────────

/// Immutable, time-ordered fix collection grouped by animal.
///
/// Layout: one flat `fixes` slab with animals contiguous and in
/// lexicographic id order; `offsets[i]..offsets[i+1]` is animal `i`'s
/// trail. A planar [`FixIndex`] over the whole slab is built once at
/// assembly for radius queries.
#[derive(Debug, Clone)]
pub struct FixRepository {
    /// All accepted fixes, grouped by animal, per-animal time ascending.
    fixes: Vec<Fix>,
    /// Animal ids in lexicographic order, matching `offsets`.
    animals: Vec<AnimalId>,
    /// Trail boundaries into `fixes`; `len == animals.len() + 1`.
    offsets: Vec<usize>,
    /// Coordinate window the fixes were validated against.
    bounds: SpatialBounds,
    /// Planar grid over `fixes` for radius-bounded candidate queries.
    index: FixIndex,
}

impl FixRepository {
    /// Assemble a repository from fixes in source-row order.
    ///
    /// Rows are taken as they arrive: per animal, each fix must be strictly
    /// later than the animal's previously accepted fix. Offenders (and any
    /// fix with a non-finite or out-of-window coordinate) are excluded and
    /// reported, never silently dropped or reordered.
    ///
    /// Fails fast only on invalid `bounds`; data defects never error.
    pub fn assemble(rows: Vec<Fix>, bounds: SpatialBounds) -> Result<(Self, IngestReport)> {
        bounds.validate()?;

        let total = rows.len();
        let mut trails: BTreeMap<AnimalId, Vec<Fix>> = BTreeMap::new();
        let mut defects = Vec::new();

        for fix in rows {
            let kind = if !(fix.location.x.is_finite() && fix.location.y.is_finite()) {
                Some(DefectKind::NonFiniteCoordinate)
            } else if !bounds.contains(&fix.location) {
                Some(DefectKind::OutOfBounds)
            } else {
                match trails.get(&fix.animal).and_then(|t| t.last()) {
                    Some(prev) if fix.timestamp < prev.timestamp => {
                        Some(DefectKind::TimestampRegression)
                    }
                    Some(prev) if fix.timestamp == prev.timestamp => {
                        Some(DefectKind::DuplicateTimestamp)
                    }
                    _ => None,
                }
            };

            match kind {
                Some(kind) => {
                    warn!(
                        animal = %fix.animal,
                        row = fix.row,
                        timestamp = %fix.timestamp,
                        ?kind,
                        "excluding defective fix"
                    );
                    defects.push(FixDefect {
                        row: fix.row,
                        animal: fix.animal.clone(),
                        timestamp: fix.timestamp,
                        kind,
                    });
                }
                None => trails.entry(fix.animal.clone()).or_default().push(fix),
            }
        }

        let mut animals = Vec::with_capacity(trails.len());
        let mut offsets = Vec::with_capacity(trails.len() + 1);
        let mut fixes = Vec::new();
        offsets.push(0);
        for (animal, trail) in trails {
            debug!(animal = %animal, fixes = trail.len(), "trail assembled");
            animals.push(animal);
            fixes.extend(trail);
            offsets.push(fixes.len());
        }

        let report = IngestReport {
            accepted: fixes.len(),
            defects,
        };
        info!(
            rows = total,
            accepted = report.accepted,
            rejected = report.rejected(),
            animals = animals.len(),
            "repository assembled"
        );

        let index = FixIndex::build(&fixes);
        Ok((
            Self {
                fixes,
                animals,
                offsets,
                bounds,
                index,
            },
            report,
        ))
    }

    /// Total number of fixes across all animals.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fixes.len()
    }

    /// Whether the repository holds no fixes at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fixes.is_empty()
    }

    /// Animal ids in lexicographic order.
    #[must_use]
    pub fn animals(&self) -> &[AnimalId] {
        &self.animals
    }

    /// All fixes, grouped by animal, per-animal time ascending.
    #[must_use]
    pub fn all_fixes(&self) -> &[Fix] {
        &self.fixes
    }

    /// One animal's full trail, time ascending. Empty for unknown animals.
    #[must_use]
    pub fn trail(&self, animal: &AnimalId) -> &[Fix] {
        match self.animals.binary_search(animal) {
            Ok(i) => &self.fixes[self.offsets[i]..self.offsets[i + 1]],
            Err(_) => &[],
        }
    }

    /// Iterate `(animal, trail)` pairs in animal order.
    pub fn trails(&self) -> impl Iterator<Item = (&AnimalId, &[Fix])> {
        self.animals
            .iter()
            .enumerate()
            .map(|(i, a)| (a, &self.fixes[self.offsets[i]..self.offsets[i + 1]]))
    }

    /// Coordinate window this repository was validated against.
    #[must_use]
    pub fn bounds(&self) -> SpatialBounds {
        self.bounds
    }

    /// Radius index over [`all_fixes`](Self::all_fixes).
    #[must_use]
    pub(crate) fn index(&self) -> &FixIndex {
        &self.index
    }

    /// Earliest and latest timestamp across all animals, `None` when empty.
    #[must_use]
    pub fn time_span(&self) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let first = self.fixes.iter().map(|f| f.timestamp).min()?;
        let last = self.fixes.iter().map(|f| f.timestamp).max()?;
        Some((first, last))
    }

    /// A new repository restricted to fixes with `start ≤ timestamp ≤ end`
    /// (closed interval). Order and grouping are preserved; the radius
    /// index is rebuilt over the surviving fixes.
    #[must_use]
    pub fn restricted_to(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let mut animals = Vec::new();
        let mut offsets = vec![0];
        let mut fixes = Vec::new();
        for (animal, trail) in self.trails() {
            let kept = trail
                .iter()
                .filter(|f| f.timestamp >= start && f.timestamp <= end)
                .cloned();
            let before = fixes.len();
            fixes.extend(kept);
            if fixes.len() > before {
                animals.push(animal.clone());
                offsets.push(fixes.len());
            }
        }
        debug!(
            kept = fixes.len(),
            from = %start,
            to = %end,
            "repository restricted by time"
        );
        let index = FixIndex::build(&fixes);
        Self {
            fixes,
            animals,
            offsets,
            bounds: self.bounds,
            index,
        }
    }
}
