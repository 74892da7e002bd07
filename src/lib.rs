//! # collar
//!
//! Spatio-temporal analysis of **animal GPS collar data** in Rust.
//!
//! Given time-ordered location readings ("fixes") from tracked animals,
//! `collar` finds the behavior patterns wildlife researchers look for:
//! clusters of nearby, time-proximate fixes from one animal (candidate
//! rest, feeding, or kill sites), crossings where two animals' paths met,
//! attribution queries ("whodunit": who was near this spot at this
//! time?), and matches between field-verified ground-truth sites and
//! computed clusters.
//!
//! ## Features
//!
//! - **Clustering** — single-pass fold over one animal's trail with a
//!   running-centroid admission rule; small runs are demoted, never lost
//! - **Crossing detection** — time-windowed sweep join across animals,
//!   each unordered fix pair examined exactly once
//! - **Whodunit** — radius + time-window attribution with ranked near
//!   misses for the "almost" cases
//! - **Site matching** — tolerance/extent matching of ground-truth sites
//!   against clusters, with explicit primary/secondary ambiguity
//! - **Deterministic** — every result carries a documented total order;
//!   sequential and `parallel` (rayon) runs produce identical output
//! - **Cancellable** — long scans poll a [`CancelToken`] between
//!   outer-loop iterations and discard partial results when it fires
//!
//! ## Example
//!
//! ```
//! use chrono::{TimeDelta, TimeZone, Utc};
//! use collar::{
//!     cluster_repository, find_crossings, CancelToken, ClusterConfig, CrossingConfig,
//!     DayNight, Fix, FixRepository, HomeAway, Location, SpatialBounds,
//! };
//!
//! // Fixes arrive from an external ingestion layer, already parsed.
//! let t0 = Utc.with_ymd_and_hms(2009, 3, 15, 6, 0, 0).unwrap();
//! let rows = vec![
//!     Fix::new("F201", t0, Location::new(0.0, 0.0), DayNight::Day, HomeAway::Home, 0),
//!     Fix::new("F201", t0 + TimeDelta::hours(1), Location::new(30.0, 0.0),
//!         DayNight::Day, HomeAway::Home, 1),
//!     Fix::new("M3", t0 + TimeDelta::minutes(30), Location::new(10.0, 10.0),
//!         DayNight::Day, HomeAway::Away, 2),
//! ];
//! let (repo, report) = FixRepository::assemble(rows, SpatialBounds::unbounded()).unwrap();
//! assert_eq!(report.rejected(), 0);
//!
//! let cancel = CancelToken::new();
//! let clusters = cluster_repository(&repo, &ClusterConfig::default(), &cancel).unwrap();
//! let crossings = find_crossings(&repo, &CrossingConfig::default(), &cancel).unwrap();
//! assert_eq!(clusters.clusters.len(), 2);
//! assert_eq!(crossings.len(), 2);
//! ```
//!
//! ## Component overview
//!
//! 1. **[`FixRepository`]** — validated, immutable fix storage grouped by
//!    animal; coordinate and timestamp defects are excluded and counted,
//!    never fatal
//! 2. **[`cluster_repository`]** / **[`cluster_trail`]** — the clustering
//!    pass; see [`cluster`](mod@cluster) for the admission rule
//! 3. **[`find_crossings`]** — the sweep join; see [`crossing`]
//! 4. **[`resolve`]** — attribution queries; see [`whodunit`]
//! 5. **[`match_sites`]** — ground-truth reconciliation; see [`survey`]
//! 6. **[`outline_all`]** — per-animal territory perimeters; see
//!    [`territory`]
//!
//! Ingestion (delimited-text parsing), day/night solar math (behind the
//! [`DayNightClassifier`] seam), and report formatting all live outside
//! this crate; the core is a pure batch transformation over read-only
//! data.

pub mod cancel;
pub mod cluster;
pub mod crossing;
pub mod error;
pub mod fix;
mod grid;
pub mod repository;
pub mod survey;
pub mod territory;
pub mod whodunit;

pub use cancel::CancelToken;
pub use cluster::{
    cluster_repository, cluster_trail, Cluster, ClusterConfig, ClusterId, ClusterReport,
};
pub use crossing::{find_crossings, Crossing, CrossingConfig};
pub use error::{AnalysisError, Result};
pub use fix::{AnimalId, ConstantClassifier, DayNight, DayNightClassifier, Fix, HomeAway};
pub use repository::{DefectKind, FixDefect, FixRepository, IngestReport, SpatialBounds};
pub use survey::{match_sites, FieldSite, MatchConfig, SiteId, SiteMatch};
pub use territory::{outline, outline_all, TerritoryConfig, TerritoryOutline, TerritoryVertex};
pub use whodunit::{resolve, Candidate, NearMiss, WhodunitQuery, WhodunitReport};

// Commonly used types
// Note: coordinates are 64-bit throughout — projected eastings/northings
// run to seven digits, and centroid means would lose meters at f32.
pub type Location = nalgebra::Point2<f64>;
pub type Displacement = nalgebra::Vector2<f64>;
