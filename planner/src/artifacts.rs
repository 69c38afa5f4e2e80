//! Stage artifact shapes and JSON writing.
//!
//! Stage 1 and 2 artifacts are large working files and land in the
//! temporary bucket; stages 3 through 6 and the final report land in
//! the permanent bucket for downstream consumers. Every artifact opens
//! with the same metadata block.

use candidate_filter::{CandidateScore, FilterStatistics};
use chrono::{DateTime, Utc};
use coverage_analysis::CoverageReport;
use handover_events::{EventStatistics, HandoverEvent};
use orbit_propagation::{
    Constellation, LoadStatistics, Observer, PipelineMode, PositionSample, TimeGrid,
};
use pool_annealing::PoolSolution;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

pub const ORBIT_ARTIFACT: &str = "tle_loading_and_orbit_calculation_results.json";
pub const FILTER_ARTIFACT: &str = "satellite_filtering_and_candidate_selection_results.json";
pub const EVENT_ARTIFACT: &str = "handover_event_analysis_results.json";
pub const POOL_ARTIFACT: &str = "dynamic_satellite_pool_optimization_results.json";
pub const FINAL_REPORT: &str = "leo_optimization_final_report.json";

/// Common metadata block carried by every artifact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactMetadata {
    pub observer: Observer,
    pub window_start: DateTime<Utc>,
    pub window_duration_min: f64,
    pub step_s: u32,
    pub starlink_count: usize,
    pub oneweb_count: usize,
    pub other_count: usize,
    /// UTC ISO 8601 generation instant.
    pub generated_at: String,
    pub physics_constants_version: String,
    /// Set when a stage deadline expired and the artifact is partial.
    pub truncated: bool,
}

impl ArtifactMetadata {
    pub fn new(
        observer: Observer,
        grid: &TimeGrid,
        statistics: &LoadStatistics,
        truncated: bool,
    ) -> Self {
        Self {
            observer,
            window_start: grid.start,
            window_duration_min: grid.duration_min(),
            step_s: grid.step_s,
            starlink_count: statistics.starlink_count,
            oneweb_count: statistics.oneweb_count,
            other_count: statistics.other_count,
            generated_at: Utc::now().to_rfc3339(),
            physics_constants_version: signal_budget::PHYSICS_CONSTANTS_VERSION.to_string(),
            truncated,
        }
    }
}

/// Stage 1 output: per-satellite sampled positions (temporary bucket).
#[derive(Debug, Serialize, Deserialize)]
pub struct OrbitArtifact {
    pub metadata: ArtifactMetadata,
    pub mode: PipelineMode,
    pub statistics: LoadStatistics,
    pub satellites: BTreeMap<u64, SatelliteOrbitRecord>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SatelliteOrbitRecord {
    pub name: String,
    pub constellation: Constellation,
    pub samples: Vec<PositionSample>,
}

/// Stage 2 output: candidate scores and visibility analyses (temporary
/// bucket).
#[derive(Debug, Serialize, Deserialize)]
pub struct FilterArtifact {
    pub metadata: ArtifactMetadata,
    pub statistics: FilterStatistics,
    pub candidates: BTreeMap<String, Vec<CandidateScore>>,
}

/// Stage 3/4 output: the event catalog (permanent bucket).
#[derive(Debug, Serialize, Deserialize)]
pub struct EventArtifact {
    pub metadata: ArtifactMetadata,
    pub serving_satellite: u64,
    pub neighbor_satellites: Vec<u64>,
    /// Radio-series summary of the serving satellite over the window.
    pub serving_statistics: signal_budget::SeriesStatistics,
    pub statistics: EventStatistics,
    pub events: Vec<HandoverEvent>,
}

/// Stage 5/6 output: the optimized pool and its coverage reports
/// (permanent bucket).
#[derive(Debug, Serialize, Deserialize)]
pub struct PoolArtifact {
    pub metadata: ArtifactMetadata,
    pub solution: PoolSolution,
    pub coverage: BTreeMap<String, CoverageReport>,
}

/// Final run summary (permanent bucket).
#[derive(Debug, Serialize, Deserialize)]
pub struct FinalReport {
    pub metadata: ArtifactMetadata,
    pub pipeline: PipelineStats,
    pub pool: PoolSummary,
    pub handover_events: EventSummary,
    pub compliance: pool_annealing::ComplianceCheck,
    pub unmet_constraints: Vec<String>,
    pub feasible: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineStats {
    pub stages_completed: usize,
    pub total_stages: usize,
    pub stage_durations_s: BTreeMap<String, f64>,
    pub total_duration_s: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSummary {
    pub starlink_count: usize,
    pub oneweb_count: usize,
    pub total_count: usize,
    pub visibility_compliance: f64,
    pub temporal_distribution: f64,
    pub signal_quality: f64,
    pub raan_diversity: f64,
}

impl PoolSummary {
    pub fn from_solution(solution: &PoolSolution) -> Self {
        Self {
            starlink_count: solution.starlink_members.len(),
            oneweb_count: solution.oneweb_members.len(),
            total_count: solution.total_satellites,
            visibility_compliance: solution.fitness.visibility_compliance,
            temporal_distribution: solution.fitness.temporal_distribution,
            signal_quality: solution.fitness.signal_quality,
            raan_diversity: solution.fitness.raan_diversity,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventSummary {
    pub total_events: usize,
    pub a4_events: usize,
    pub a5_events: usize,
    pub d2_events: usize,
    pub recommended: usize,
}

impl EventSummary {
    pub fn from_statistics(statistics: &EventStatistics) -> Self {
        Self {
            total_events: statistics.total_events,
            a4_events: statistics.a4_count,
            a5_events: statistics.a5_count,
            d2_events: statistics.d2_count,
            recommended: statistics.recommended_count,
        }
    }
}

/// Serialize an artifact into its bucket. Parent directories are
/// created on demand; writes go through a buffered writer.
pub fn write_artifact<T: Serialize>(
    bucket: &Path,
    file_name: &str,
    artifact: &T,
) -> std::io::Result<PathBuf> {
    std::fs::create_dir_all(bucket)?;
    let path = bucket.join(file_name);
    let file = File::create(&path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, artifact)?;
    info!(path = %path.display(), "artifact written");
    Ok(path)
}
