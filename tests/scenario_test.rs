//! End-to-end scenarios through the public API: repository assembly, then
//! clustering, crossing detection, attribution, and site matching on
//! small hand-checkable datasets.

mod common;

use chrono::{TimeDelta, TimeZone, Utc};
use common::{base_time, fix, repo};

use collar::{
    cluster_repository, find_crossings, match_sites, resolve, AnimalId, CancelToken,
    ClusterConfig, CrossingConfig, FieldSite, Location, MatchConfig, SiteId, WhodunitQuery,
};

fn cluster_config(spatial: f64, gap_hours: i64) -> ClusterConfig {
    ClusterConfig {
        spatial_threshold: spatial,
        temporal_gap: TimeDelta::hours(gap_hours),
        min_size: 1,
        min_duration: None,
    }
}

#[test]
fn test_tight_hourly_run_forms_one_cluster() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    // Hourly fixes over four hours, all within 50 units of each other.
    let repository = repo(vec![
        fix("X", 0, 0.0, 0.0, 0),
        fix("X", 60, 30.0, 0.0, 1),
        fix("X", 120, 0.0, 30.0, 2),
        fix("X", 180, 30.0, 30.0, 3),
    ]);

    let report =
        cluster_repository(&repository, &cluster_config(100.0, 2), &CancelToken::new()).unwrap();

    assert_eq!(report.clusters.len(), 1);
    assert_eq!(report.clusters[0].len(), 4);
    assert!(report.unclustered.is_empty());
}

#[test]
fn test_nine_hour_silence_splits_the_run() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    // Same geometry, but the animal goes dark between hour 1 and hour 10.
    let repository = repo(vec![
        fix("X", 0, 0.0, 0.0, 0),
        fix("X", 60, 30.0, 0.0, 1),
        fix("X", 600, 0.0, 30.0, 2),
        fix("X", 660, 30.0, 30.0, 3),
    ]);

    let report =
        cluster_repository(&repository, &cluster_config(100.0, 2), &CancelToken::new()).unwrap();

    assert_eq!(report.clusters.len(), 2);
    assert_eq!(report.clusters[0].len(), 2);
    assert_eq!(report.clusters[1].len(), 2);
    assert!(report.unclustered.is_empty());
}

#[test]
fn test_two_animals_meeting_is_one_crossing() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    // A at the origin at 05:00, B ten units east six minutes later.
    let repository = repo(vec![
        fix("A", 300, 0.0, 0.0, 0),
        fix("B", 306, 10.0, 0.0, 1),
    ]);

    let config = CrossingConfig {
        spatial_threshold: 50.0,
        time_threshold: TimeDelta::minutes(30),
    };
    let crossings = find_crossings(&repository, &config, &CancelToken::new()).unwrap();

    assert_eq!(crossings.len(), 1);
    let crossing = &crossings[0];
    assert_eq!(
        crossing.animals(),
        (&AnimalId::new("A"), &AnimalId::new("B"))
    );
    assert_eq!(crossing.spatial_distance, 10.0);
    assert_eq!(crossing.temporal_gap, TimeDelta::minutes(6));
    assert_eq!(crossing.midpoint, Location::new(5.0, 0.0));
}

#[test]
fn test_exact_coincidence_query_names_the_animal() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    let repository = repo(vec![
        fix("A", 120, 473_211.0, 4_192_755.0, 0),
        fix("B", 120, 473_300.0, 4_192_755.0, 1),
    ]);

    // Radius and window of zero: exact coincidence only.
    let query = WhodunitQuery {
        location: Location::new(473_211.0, 4_192_755.0),
        time: base_time() + TimeDelta::minutes(120),
        spatial_radius: 0.0,
        time_window: TimeDelta::zero(),
        near_miss_limit: 0,
    };
    let report = resolve(&repository, &query).unwrap();

    assert_eq!(report.candidates.len(), 1);
    let hit = &report.candidates[0];
    assert_eq!(hit.animal, AnimalId::new("A"));
    assert_eq!(hit.distance, 0.0);
    assert_eq!(hit.time_gap, TimeDelta::zero());
}

#[test]
fn test_site_on_centroid_is_a_primary_match_at_zero_tolerance() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    // Two fixes symmetric about (500, 500): the centroid lands exactly there.
    let repository = repo(vec![
        fix("X", 0, 490.0, 500.0, 0),
        fix("X", 60, 510.0, 500.0, 1),
    ]);
    let clusters = cluster_repository(&repository, &cluster_config(100.0, 2), &CancelToken::new())
        .unwrap()
        .clusters;
    assert_eq!(clusters.len(), 1);
    assert_eq!(clusters[0].centroid, Location::new(500.0, 500.0));

    let site = FieldSite {
        id: SiteId::new("W17"),
        location: Location::new(500.0, 500.0),
        tolerance_radius: 0.0,
        verified_on: None,
    };
    let config = MatchConfig {
        tolerance: 0.0,
        max_time_gap: None,
    };
    let matches = match_sites(&[site], &clusters, &config).unwrap();

    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].centroid_distance, 0.0);
    assert!(matches[0].is_primary);
    assert_eq!(matches[0].cluster_id, clusters[0].id);
}

#[test]
fn test_carcass_survey_walkthrough() {
    let _ = tracing_subscriber::fmt().with_env_filter("info").try_init();

    // ── Step 1: two animals share a valley for one night ──
    let mut rows = Vec::new();
    // F201 beds down at (1000, 1000) for six hours.
    for i in 0..6 {
        rows.push(fix("F201", i * 60, 1000.0 + f64::from(i as u8), 1000.0, i as u32));
    }
    // M3 passes within 80 units of the bed site at hour 2, then leaves.
    rows.push(fix("M3", 125, 1080.0, 1000.0, 10));
    rows.push(fix("M3", 185, 3000.0, 1000.0, 11));
    let repository = repo(rows);

    // ── Step 2: cluster F201's bout ──
    let clusters = cluster_repository(&repository, &cluster_config(200.0, 3), &CancelToken::new())
        .unwrap()
        .clusters;
    let bed = clusters
        .iter()
        .find(|c| c.animal == AnimalId::new("F201"))
        .expect("F201's bout should cluster");
    assert_eq!(bed.len(), 6);
    assert_eq!(bed.duration, TimeDelta::hours(5));

    // ── Step 3: the pass shows up as a crossing ──
    let crossing_config = CrossingConfig {
        spatial_threshold: 100.0,
        time_threshold: TimeDelta::hours(1),
    };
    let crossings = find_crossings(&repository, &crossing_config, &CancelToken::new()).unwrap();
    assert!(!crossings.is_empty());
    assert!(crossings
        .iter()
        .all(|c| c.animals() == (&AnimalId::new("F201"), &AnimalId::new("M3"))));

    // ── Step 4: a field crew verifies a carcass near the bed site ──
    let carcass = FieldSite {
        id: SiteId::new("K-2009-031"),
        location: Location::new(1010.0, 995.0),
        tolerance_radius: 50.0,
        verified_on: Some(Utc.with_ymd_and_hms(2009, 3, 16, 9, 0, 0).unwrap()),
    };
    let match_config = MatchConfig {
        tolerance: 25.0,
        max_time_gap: None,
    };
    let matches = match_sites(&[carcass], &clusters, &match_config).unwrap();
    assert_eq!(matches.len(), 1);
    assert_eq!(matches[0].cluster_id, bed.id);
    assert!(matches[0].is_primary);

    // ── Step 5: whodunit at the carcass puts both animals on the scene ──
    let query = WhodunitQuery::new(
        Location::new(1010.0, 995.0),
        base_time() + TimeDelta::minutes(120),
    );
    let report = resolve(&repository, &query).unwrap();
    let animals: std::collections::BTreeSet<&str> = report
        .candidates
        .iter()
        .map(|c| c.animal.as_str())
        .collect();
    assert!(animals.contains("F201"));
    assert!(animals.contains("M3"));
}
