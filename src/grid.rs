//! Planar fix index optimized for fast radius searches.
//!
//! `FixIndex` bins fix locations into a uniform grid over their bounding
//! box; each cell maps to a compact slice of fix indices.
//!
//! Query flow:
//! 1. Compute the cell range overlapping the disc around a query point.
//! 2. Scan only fixes in those cells.
//! 3. Apply exact Euclidean filtering against the radius.
//!
//! This keeps search time close to local fix density instead of total
//! dataset size. Results are index-sorted, so a query is deterministic and
//! always equals what a brute-force scan would return.

use crate::fix::Fix;
use crate::Location;

/// Mean fixes per cell the grid resolution aims for.
const TARGET_PER_CELL: usize = 4;
/// Cap on cells along either axis, bounding memory for sparse extents.
const MAX_CELLS_PER_AXIS: u32 = 1024;

/// Uniform planar grid over a set of fix locations.
#[derive(Debug, Clone)]
pub struct FixIndex {
    /// Lower-left corner of the indexed bounding box.
    x_min: f64,
    y_min: f64,
    /// Square cell edge length (coordinate units).
    cell_size: f64,
    /// Grid dimensions.
    n_x: u32,
    n_y: u32,
    /// Indexed locations, parallel to the slice the index was built from.
    points: Vec<Location>,
    /// Cell boundaries into `fix_indices`; `len == n_x * n_y + 1`.
    cell_offsets: Vec<u32>,
    /// Fix indices grouped by cell.
    fix_indices: Vec<u32>,
}

impl FixIndex {
    /// Build an index over the given fixes. Resolution is chosen from the
    /// data extent so cells hold a few fixes each; a degenerate extent
    /// (all fixes coincident, or no fixes) collapses to a single cell.
    #[must_use]
    pub fn build(fixes: &[Fix]) -> Self {
        let points: Vec<Location> = fixes.iter().map(|f| f.location).collect();

        let (mut x_min, mut x_max, mut y_min, mut y_max) = (f64::MAX, f64::MIN, f64::MAX, f64::MIN);
        for p in &points {
            x_min = x_min.min(p.x);
            x_max = x_max.max(p.x);
            y_min = y_min.min(p.y);
            y_max = y_max.max(p.y);
        }

        let extent = if points.is_empty() {
            0.0
        } else {
            (x_max - x_min).max(y_max - y_min)
        };

        if extent <= 0.0 {
            // Empty or fully coincident: one cell holds everything.
            let fix_indices: Vec<u32> = (0..points.len() as u32).collect();
            return Self {
                x_min: if points.is_empty() { 0.0 } else { x_min },
                y_min: if points.is_empty() { 0.0 } else { y_min },
                cell_size: 1.0,
                n_x: 1,
                n_y: 1,
                points,
                cell_offsets: vec![0, fix_indices.len() as u32],
                fix_indices,
            };
        }

        let target_cells = (points.len() / TARGET_PER_CELL).max(1) as f64;
        let cell_size = extent / target_cells.sqrt();
        let n_x = cells_along(x_max - x_min, cell_size);
        let n_y = cells_along(y_max - y_min, cell_size);
        let n_cells = (n_x * n_y) as usize;

        let mut bins: Vec<Vec<u32>> = vec![Vec::new(); n_cells];
        for (fix_idx, p) in points.iter().enumerate() {
            let cell = cell_for(x_min, y_min, cell_size, n_x, n_y, p);
            bins[cell as usize].push(fix_idx as u32);
        }

        let mut cell_offsets = Vec::with_capacity(n_cells + 1);
        let mut fix_indices = Vec::with_capacity(points.len());
        cell_offsets.push(0);
        for cell_bin in bins {
            fix_indices.extend(cell_bin);
            cell_offsets.push(fix_indices.len() as u32);
        }

        Self {
            x_min,
            y_min,
            cell_size,
            n_x,
            n_y,
            points,
            cell_offsets,
            fix_indices,
        }
    }

    /// Number of indexed fixes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether the index covers no fixes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Indices of all fixes within `radius` of `center` (closed interval:
    /// distance equal to the radius is a hit), ascending.
    #[must_use]
    pub fn query_radius(&self, center: &Location, radius: f64) -> Vec<u32> {
        if self.is_empty() {
            return Vec::new();
        }
        let radius = radius.max(0.0);

        let bx_min = self.x_bin(center.x - radius);
        let bx_max = self.x_bin(center.x + radius);
        let by_min = self.y_bin(center.y - radius);
        let by_max = self.y_bin(center.y + radius);

        let mut out = Vec::new();
        for by in by_min..=by_max {
            for bx in bx_min..=bx_max {
                let cell = (by * self.n_x + bx) as usize;
                let start = self.cell_offsets[cell] as usize;
                let end = self.cell_offsets[cell + 1] as usize;
                for flat_idx in start..end {
                    let fix_idx = self.fix_indices[flat_idx];
                    let p = &self.points[fix_idx as usize];
                    if nalgebra::distance(p, center) <= radius {
                        out.push(fix_idx);
                    }
                }
            }
        }

        out.sort_unstable();
        out
    }

    fn x_bin(&self, x: f64) -> u32 {
        clamp_bin((x - self.x_min) / self.cell_size, self.n_x)
    }

    fn y_bin(&self, y: f64) -> u32 {
        clamp_bin((y - self.y_min) / self.cell_size, self.n_y)
    }
}

fn cells_along(span: f64, cell_size: f64) -> u32 {
    let n = (span / cell_size).ceil() as u32;
    n.clamp(1, MAX_CELLS_PER_AXIS)
}

fn cell_for(x_min: f64, y_min: f64, cell_size: f64, n_x: u32, n_y: u32, p: &Location) -> u32 {
    let bx = clamp_bin((p.x - x_min) / cell_size, n_x);
    let by = clamp_bin((p.y - y_min) / cell_size, n_y);
    by * n_x + bx
}

fn clamp_bin(u: f64, n: u32) -> u32 {
    if u <= 0.0 {
        return 0;
    }
    let idx = u.floor() as u32;
    idx.min(n - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fix::{DayNight, HomeAway};
    use chrono::{TimeZone, Utc};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn fix_at(x: f64, y: f64, row: u32) -> Fix {
        Fix::new(
            "F101",
            Utc.with_ymd_and_hms(2009, 3, 15, 6, 0, 0).unwrap() + chrono::TimeDelta::minutes(row as i64),
            Location::new(x, y),
            DayNight::Day,
            HomeAway::Home,
            row,
        )
    }

    #[test]
    fn radius_query_finds_nearby_fixes() {
        let fixes = vec![
            fix_at(0.0, 0.0, 0),
            fix_at(30.0, 40.0, 1), // 50 away
            fix_at(500.0, 500.0, 2),
        ];
        let index = FixIndex::build(&fixes);

        assert_eq!(index.len(), 3);
        assert_eq!(index.query_radius(&Location::new(0.0, 0.0), 60.0), vec![0, 1]);
        // Closed interval: exactly on the radius is a hit.
        assert_eq!(index.query_radius(&Location::new(0.0, 0.0), 50.0), vec![0, 1]);
        assert_eq!(index.query_radius(&Location::new(0.0, 0.0), 49.9), vec![0]);
    }

    #[test]
    fn radius_query_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(7);
        let fixes: Vec<Fix> = (0..500)
            .map(|i| {
                fix_at(
                    rng.random::<f64>() * 10_000.0,
                    rng.random::<f64>() * 10_000.0,
                    i,
                )
            })
            .collect();
        let index = FixIndex::build(&fixes);

        for _ in 0..50 {
            let center = Location::new(
                rng.random::<f64>() * 10_000.0,
                rng.random::<f64>() * 10_000.0,
            );
            let radius = rng.random::<f64>() * 2_000.0;
            let expected: Vec<u32> = fixes
                .iter()
                .enumerate()
                .filter(|(_, f)| f.distance_to_point(&center) <= radius)
                .map(|(i, _)| i as u32)
                .collect();
            assert_eq!(index.query_radius(&center, radius), expected);
        }
    }

    #[test]
    fn coincident_fixes_collapse_to_one_cell() {
        let fixes: Vec<Fix> = (0..10).map(|i| fix_at(473_000.0, 4_192_000.0, i)).collect();
        let index = FixIndex::build(&fixes);

        let hits = index.query_radius(&Location::new(473_000.0, 4_192_000.0), 0.0);
        assert_eq!(hits.len(), 10);
        // Off-center zero-radius query hits nothing.
        assert!(index.query_radius(&Location::new(473_001.0, 4_192_000.0), 0.0).is_empty());
    }

    #[test]
    fn empty_index_returns_nothing() {
        let index = FixIndex::build(&[]);
        assert!(index.is_empty());
        assert!(index.query_radius(&Location::new(0.0, 0.0), 1_000.0).is_empty());
    }
}
