//! Orbit Propagation Library
//!
//! TLE catalog ingestion, SGP4 propagation over a uniform sampling grid,
//! and observer-relative geometry (elevation, azimuth, slant range) for a
//! fixed ground observation point.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod parse;
pub mod propagation;
pub mod synthetic;
pub mod transforms;

pub use parse::parse_tle_catalog;
pub use propagation::{sample_catalog, SampledCatalog};

#[derive(Error, Debug)]
pub enum OrbitError {
    #[error("Invalid TLE format: {0}")]
    InvalidTle(String),
    #[error("SGP4 initialization failed for {norad_id}: {reason}")]
    InitFailed { norad_id: u64, reason: String },
    #[error("Propagation failed: {0}")]
    PropagationFailed(String),
    #[error("Invalid sampling window: {0}")]
    InvalidWindow(String),
}

pub type Result<T> = std::result::Result<T, OrbitError>;

/// Constellation tag derived from the catalog name line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Constellation {
    Starlink,
    Oneweb,
    /// Anything else in the catalog. No RF parameters are registered for
    /// these, so they cannot pass the signal-quality filter stage.
    Other,
}

impl Constellation {
    pub fn from_name(name: &str) -> Self {
        let upper = name.trim().to_ascii_uppercase();
        if upper.starts_with("STARLINK") {
            Constellation::Starlink
        } else if upper.starts_with("ONEWEB") {
            Constellation::Oneweb
        } else {
            Constellation::Other
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Constellation::Starlink => "starlink",
            Constellation::Oneweb => "oneweb",
            Constellation::Other => "other",
        }
    }
}

impl std::fmt::Display for Constellation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fixed ground observation point, read-only after startup.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Observer {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_m: f64,
}

impl Default for Observer {
    /// NTPU campus reference site.
    fn default() -> Self {
        Self {
            latitude_deg: 24.9441667,
            longitude_deg: 121.3713889,
            altitude_m: 50.0,
        }
    }
}

/// One catalog entry, immutable after ingest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogRecord {
    pub norad_id: u64,
    pub name: String,
    pub constellation: Constellation,
    pub tle_line1: String,
    pub tle_line2: String,
    pub epoch: DateTime<Utc>,
    /// Revolutions per day (Kozai convention).
    pub mean_motion: f64,
    pub inclination_deg: f64,
    pub raan_deg: f64,
    pub eccentricity: f64,
    pub mean_anomaly_deg: f64,
    pub apogee_km: f64,
    pub perigee_km: f64,
}

/// Uniform sampling grid shared by every satellite in a run.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TimeGrid {
    pub start: DateTime<Utc>,
    pub step_s: u32,
    pub count: usize,
}

impl TimeGrid {
    /// Build a grid covering `window_min` minutes at `step_s` cadence,
    /// inclusive of the start instant.
    pub fn new(start: DateTime<Utc>, window_min: u32, step_s: u32) -> Result<Self> {
        if step_s == 0 {
            return Err(OrbitError::InvalidWindow("step must be positive".into()));
        }
        if window_min == 0 {
            return Err(OrbitError::InvalidWindow("window must be positive".into()));
        }
        let count = (window_min as usize * 60) / step_s as usize + 1;
        Ok(Self { start, step_s, count })
    }

    pub fn instant(&self, index: usize) -> DateTime<Utc> {
        self.start + Duration::seconds(index as i64 * self.step_s as i64)
    }

    pub fn instants(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        (0..self.count).map(|i| self.instant(i))
    }

    pub fn end(&self) -> DateTime<Utc> {
        self.instant(self.count.saturating_sub(1))
    }

    pub fn duration_min(&self) -> f64 {
        (self.count.saturating_sub(1) as f64 * self.step_s as f64) / 60.0
    }

    /// Grid index of a timestamp, if it lies exactly on the grid.
    pub fn index_of(&self, t: DateTime<Utc>) -> Option<usize> {
        let offset = t.signed_duration_since(self.start).num_seconds();
        if offset < 0 || offset % self.step_s as i64 != 0 {
            return None;
        }
        let index = (offset / self.step_s as i64) as usize;
        (index < self.count).then_some(index)
    }
}

/// One propagated state on the grid, with observer-relative geometry
/// attached. Geometry is recomputed from ECI at every sample and never
/// cached across runs.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PositionSample {
    pub timestamp: DateTime<Utc>,
    /// ECI (TEME) position, km.
    pub position_x: f64,
    pub position_y: f64,
    pub position_z: f64,
    /// ECI (TEME) velocity, km/s.
    pub velocity_x: f64,
    pub velocity_y: f64,
    pub velocity_z: f64,
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
    pub elevation_deg: f64,
    pub azimuth_deg: f64,
    pub range_km: f64,
    /// Rate of change of the slant range, km/s. Negative while approaching.
    pub range_rate_km_s: f64,
}

impl PositionSample {
    pub fn position_eci(&self) -> nalgebra::Vector3<f64> {
        nalgebra::Vector3::new(self.position_x, self.position_y, self.position_z)
    }

    pub fn velocity_eci(&self) -> nalgebra::Vector3<f64> {
        nalgebra::Vector3::new(self.velocity_x, self.velocity_y, self.velocity_z)
    }
}

/// Catalog-size-driven execution profile. Full mode propagates every
/// record; development mode caps the per-constellation subset so small
/// fixture catalogs run the lenient filter profile downstream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineMode {
    Full,
    Development,
}

/// Catalog size at or above which full mode is selected.
pub const FULL_MODE_THRESHOLD: usize = 8_000;

impl PipelineMode {
    pub fn from_catalog_size(size: usize) -> Self {
        if size >= FULL_MODE_THRESHOLD {
            PipelineMode::Full
        } else {
            PipelineMode::Development
        }
    }
}

/// Ingest and propagation accounting, surfaced in the stage artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoadStatistics {
    pub records_total: usize,
    pub starlink_count: usize,
    pub oneweb_count: usize,
    pub other_count: usize,
    pub parse_errors: usize,
    pub sgp4_init_failures: usize,
    pub propagation_step_failures: usize,
    pub samples_produced: usize,
}

impl LoadStatistics {
    pub fn count_record(&mut self, constellation: Constellation) {
        self.records_total += 1;
        match constellation {
            Constellation::Starlink => self.starlink_count += 1,
            Constellation::Oneweb => self.oneweb_count += 1,
            Constellation::Other => self.other_count += 1,
        }
    }
}
