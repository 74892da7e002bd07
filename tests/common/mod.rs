//! Shared builders for the integration suites: synthetic trails with
//! stationary bouts (the pattern clustering is meant to find) and travel
//! legs between them.

// Each test binary uses its own subset of these helpers.
#![allow(dead_code)]

use chrono::{DateTime, TimeDelta, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use collar::{DayNight, Fix, FixRepository, HomeAway, Location, SpatialBounds};

/// Common epoch for synthetic data: a spring morning, mid-study.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2009, 3, 15, 0, 0, 0).unwrap()
}

/// One fix at `base_time() + minutes`, daytime, at home.
pub fn fix(animal: &str, minutes: i64, x: f64, y: f64, row: u32) -> Fix {
    Fix::new(
        animal,
        base_time() + TimeDelta::minutes(minutes),
        Location::new(x, y),
        DayNight::Day,
        HomeAway::Home,
        row,
    )
}

/// Assemble a repository, asserting the rows were all clean.
pub fn repo(rows: Vec<Fix>) -> FixRepository {
    let (repository, report) = FixRepository::assemble(rows, SpatialBounds::unbounded())
        .expect("assembly should not fail on test bounds");
    assert!(
        report.defects.is_empty(),
        "test rows should be defect-free, got {:?}",
        report.defects
    );
    repository
}

/// Synthetic trail: alternating stationary bouts (fixes jittered around a
/// site) and travel legs (widely spaced fixes walking to the next site).
///
/// Sites are laid out on a line `site_spacing` apart, so with jitter well
/// under the clustering threshold each bout becomes exactly one cluster.
/// Returns the trail and the site centers visited.
pub fn bout_trail(
    animal: &str,
    rng: &mut StdRng,
    bouts: usize,
    fixes_per_bout: usize,
    site_spacing: f64,
    jitter_sd: f64,
    row_base: u32,
) -> (Vec<Fix>, Vec<Location>) {
    let jitter = Normal::new(0.0, jitter_sd).expect("finite standard deviation");
    let mut trail = Vec::new();
    let mut sites = Vec::new();
    let mut minutes = 0i64;
    let mut row = row_base;

    for bout in 0..bouts {
        let site = Location::new(bout as f64 * site_spacing, 0.0);
        sites.push(site);

        // Stationary bout: tight in space, one fix every 1-2 hours.
        for _ in 0..fixes_per_bout {
            trail.push(fix(
                animal,
                minutes,
                site.x + jitter.sample(rng),
                site.y + jitter.sample(rng),
                row,
            ));
            minutes += rng.random_range(60..=120);
            row += 1;
        }

        // Travel leg: two fixes strung out toward the next site, far
        // enough from both bouts to stay unclustered.
        if bout + 1 < bouts {
            for step in [0.4, 0.6] {
                trail.push(fix(
                    animal,
                    minutes,
                    site.x + step * site_spacing,
                    400.0,
                    row,
                ));
                minutes += rng.random_range(60..=120);
                row += 1;
            }
        }
    }

    (trail, sites)
}
