//! Candidate Filter Library
//!
//! Reduces a propagated satellite catalog to per-constellation candidate
//! pools through six ordered stages: geographic gate, visibility time,
//! elevation quality, service continuity, signal pre-assessment, and
//! load-balancing selection. Every stage is a hard gate; a satellite
//! failing a single stage is dropped with no partial credit.
//!
//! # Scoring Model (stage six)
//!
//! ```text
//! Total = 0.40 * visibility + 0.25 * elevation + 0.20 * signal + 0.15 * continuity
//! ```
//!
//! | Factor      | Weight | Description                            |
//! |-------------|--------|----------------------------------------|
//! | visibility  | 0.40   | Total visible time over the window     |
//! | elevation   | 0.25   | Peak elevation quality                 |
//! | signal      | 0.20   | Aggregate RSRP estimate                |
//! | continuity  | 0.15   | Disjoint visibility pass count         |
//!
//! The stage-one geographic composite acts as an entry gate and is
//! recorded on the candidate without re-weighting.

use chrono::{DateTime, Utc};
use orbit_propagation::{Constellation, Observer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

pub mod scoring;
pub mod stages;
pub mod visibility;

pub use stages::{run_filter, FilterConfig, FilterOutcome};

/// Stage-six scoring weights.
pub const W_VISIBILITY: f64 = 0.40;
pub const W_ELEVATION: f64 = 0.25;
pub const W_SIGNAL: f64 = 0.20;
pub const W_CONTINUITY: f64 = 0.15;

/// Stage-one geographic composite gate.
pub const GEOGRAPHIC_SCORE_THRESHOLD: f64 = 60.0;

/// Elevation disagreement against the propagation layer that triggers a
/// cross-check warning, degrees.
pub const ELEVATION_CROSS_CHECK_TOLERANCE_DEG: f64 = 1.0;

#[derive(Error, Debug)]
pub enum FilterError {
    #[error("No candidates survived filtering for any constellation")]
    EmptyCandidateSet,
    #[error("Constellation {0} has no filter parameters")]
    UnknownConstellation(Constellation),
}

pub type Result<T> = std::result::Result<T, FilterError>;

/// Per-constellation filter tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstellationParams {
    pub constellation: Constellation,
    pub optimal_inclination_deg: f64,
    pub optimal_altitude_km: f64,
    /// Score lost per km of altitude away from the optimum.
    pub altitude_score_slope: f64,
    pub elevation_mask_deg: f64,
    pub min_visible_time_min: f64,
    pub min_visible_passes: u32,
    pub rsrp_threshold_dbm: f64,
    pub candidate_target: usize,
}

impl ConstellationParams {
    pub fn starlink() -> Self {
        Self {
            constellation: Constellation::Starlink,
            optimal_inclination_deg: 53.0,
            optimal_altitude_km: 550.0,
            altitude_score_slope: 0.1,
            elevation_mask_deg: 5.0,
            min_visible_time_min: 15.0,
            min_visible_passes: 3,
            rsrp_threshold_dbm: -110.0,
            candidate_target: 450,
        }
    }

    pub fn oneweb() -> Self {
        Self {
            constellation: Constellation::Oneweb,
            optimal_inclination_deg: 87.4,
            optimal_altitude_km: 1200.0,
            altitude_score_slope: 0.05,
            elevation_mask_deg: 10.0,
            min_visible_time_min: 15.0,
            min_visible_passes: 3,
            rsrp_threshold_dbm: -110.0,
            candidate_target: 113,
        }
    }

    /// Fallback profile for unregistered constellation tags. Such
    /// satellites can traverse the geometric stages but have no RF
    /// parameters, so stage five always drops them.
    pub fn other() -> Self {
        Self {
            constellation: Constellation::Other,
            optimal_inclination_deg: 0.0,
            optimal_altitude_km: 0.0,
            altitude_score_slope: 0.0,
            elevation_mask_deg: 10.0,
            min_visible_time_min: 15.0,
            min_visible_passes: 3,
            rsrp_threshold_dbm: -110.0,
            candidate_target: 50,
        }
    }
}

/// Visibility summary for one candidate, derived solely from position
/// samples and the constellation elevation mask.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisibilityAnalysis {
    pub satellite_id: u64,
    pub total_visible_time_min: f64,
    pub max_elevation_deg: f64,
    pub visible_passes_count: u32,
    pub avg_pass_duration_min: f64,
    pub best_elevation_time: Option<DateTime<Utc>>,
    /// Mean RSRP estimate over visible samples. Absent when the
    /// constellation has no registered RF parameters or the satellite
    /// was never visible.
    pub signal_strength_estimate_dbm: Option<f64>,
}

impl VisibilityAnalysis {
    pub fn is_empty(&self) -> bool {
        self.visible_passes_count == 0
    }
}

/// Human-readable scoring context carried on every candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringRationale {
    pub visibility_analysis: String,
    pub signal_analysis: String,
    pub continuity_analysis: String,
}

/// Stage-six output: one scored candidate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateScore {
    pub satellite_id: u64,
    pub name: String,
    pub constellation: Constellation,
    /// Carried from the catalog for RAAN-bin diversity analysis.
    pub raan_deg: f64,
    pub total_score: f64,
    pub geographic_relevance_score: f64,
    pub orbital_characteristics_score: f64,
    pub signal_quality_score: f64,
    pub temporal_distribution_score: f64,
    pub visibility_compliance_score: f64,
    pub scoring_rationale: ScoringRationale,
    pub is_selected: bool,
    pub visibility: VisibilityAnalysis,
}

/// Survivor counts after each stage, per constellation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct StageCounts {
    pub input: usize,
    pub geographic: usize,
    pub visibility_time: usize,
    pub elevation_quality: usize,
    pub service_continuity: usize,
    pub signal_quality: usize,
    pub selected: usize,
}

/// Filter accounting surfaced in the stage artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterStatistics {
    pub input_satellites: usize,
    pub stages: BTreeMap<String, StageCounts>,
    /// Satellites dropped for having no position series.
    pub missing_position_data: usize,
    /// Satellites dropped at stage five for unregistered constellations.
    pub missing_parameters: usize,
    /// Samples whose recomputed elevation disagreed with the propagation
    /// layer by more than the tolerance.
    pub elevation_cross_check_warnings: usize,
    pub final_candidates: usize,
    pub development_profile_used: bool,
}

/// Default observer used when no configuration is supplied.
pub fn default_observer() -> Observer {
    Observer::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_six_weights_sum_to_one() {
        let total = W_VISIBILITY + W_ELEVATION + W_SIGNAL + W_CONTINUITY;
        assert!((total - 1.0).abs() < 1e-9, "weights sum to {}", total);
    }

    #[test]
    fn default_params_match_constellation_plan() {
        let starlink = ConstellationParams::starlink();
        assert_eq!(starlink.elevation_mask_deg, 5.0);
        assert_eq!(starlink.candidate_target, 450);

        let oneweb = ConstellationParams::oneweb();
        assert_eq!(oneweb.elevation_mask_deg, 10.0);
        assert_eq!(oneweb.candidate_target, 113);
        assert!(oneweb.optimal_altitude_km > starlink.optimal_altitude_km);
    }
}
