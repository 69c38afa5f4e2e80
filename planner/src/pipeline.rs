//! Stage sequencing.
//!
//! Runs the six processing stages in strict order with per-stage
//! duration accounting, writes each stage artifact to its bucket, and
//! produces the final report. No stage is ever skipped or reordered;
//! a stage failure aborts the run with a diagnostic.

use crate::artifacts::{
    self, ArtifactMetadata, EventArtifact, EventSummary, FilterArtifact, FinalReport,
    OrbitArtifact, PipelineStats, PoolArtifact, PoolSummary, SatelliteOrbitRecord,
};
use crate::config::PlannerConfig;
use candidate_filter::{run_filter, CandidateScore, FilterConfig, FilterError};
use coverage_analysis::{analyze_coverage, visible_counts, CoverageError, CoverageReport};
use handover_events::{detect_events, EventError, EventStatistics, HandoverEvent};
use orbit_propagation::{
    parse_tle_catalog, propagation, CatalogRecord, Constellation, LoadStatistics, OrbitError,
    PipelineMode, PositionSample, SampledCatalog, TimeGrid,
};
use pool_annealing::{optimize, AnnealerInput, OptimizerError, PoolCandidate, PoolSolution};
use signal_budget::{compute_catalog_series, series_statistics, SignalContext, SignalSample};
use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

pub const EXIT_SUCCESS: i32 = 0;
pub const EXIT_INFEASIBLE: i32 = 2;
pub const EXIT_STAGE_FAILURE: i32 = 3;
pub const EXIT_CONFIG_INVALID: i32 = 4;

const TOTAL_STAGES: usize = 6;

/// Chunk size between deadline checks during batched propagation.
const PROPAGATION_CHUNK: usize = 256;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Catalog is empty after parsing")]
    EmptyCatalog,
    #[error("Orbit stage failed: {0}")]
    Orbit(#[from] OrbitError),
    #[error("Filter stage failed: {0}")]
    Filter(#[from] FilterError),
    #[error("Event stage failed: {0}")]
    Event(#[from] EventError),
    #[error("Coverage stage failed: {0}")]
    Coverage(#[from] CoverageError),
    #[error("Optimizer stage failed: {0}")]
    Optimizer(#[from] OptimizerError),
    #[error("Insufficient data after truncation: {0}")]
    InsufficientData(String),
    #[error("Artifact write failed: {0}")]
    Io(#[from] std::io::Error),
}

/// What the run produced, for the caller to map onto an exit code.
#[derive(Debug)]
pub struct PipelineOutcome {
    pub solution: PoolSolution,
    pub events_total: usize,
    pub stage_durations_s: BTreeMap<String, f64>,
    pub exit_code: i32,
}

struct StageClock {
    run_start: Instant,
    durations: BTreeMap<String, f64>,
}

impl StageClock {
    fn new() -> Self {
        Self {
            run_start: Instant::now(),
            durations: BTreeMap::new(),
        }
    }

    fn time<T>(&mut self, stage: &str, body: impl FnOnce() -> T) -> T {
        let start = Instant::now();
        info!(stage, "stage started");
        let value = body();
        let elapsed = start.elapsed().as_secs_f64();
        self.durations.insert(stage.to_string(), elapsed);
        info!(stage, elapsed_s = format!("{elapsed:.2}").as_str(), "stage finished");
        value
    }
}

/// Execute the whole pipeline over a parsed TLE text.
pub fn run_pipeline(
    tle_text: &str,
    config: &PlannerConfig,
    temp_bucket: &Path,
    permanent_bucket: &Path,
) -> Result<PipelineOutcome, PipelineError> {
    let mut clock = StageClock::new();
    let deadline = config.stage_deadline_s.map(std::time::Duration::from_secs);

    // Stage 1: TLE loading and orbit sampling
    let (records, mode, sampled, load_stats, truncated) =
        clock.time("stage1_tle_loading", || stage1_load(tle_text, config, deadline))?;

    let grid = sampled.grid;
    let metadata = |stats: &LoadStatistics, truncated: bool| {
        ArtifactMetadata::new(config.observer, &grid, stats, truncated)
    };

    let orbit_artifact = OrbitArtifact {
        metadata: metadata(&load_stats, truncated),
        mode,
        statistics: load_stats.clone(),
        satellites: sampled
            .samples
            .iter()
            .map(|(id, samples)| {
                let record = records.iter().find(|r| r.norad_id == *id);
                (
                    *id,
                    SatelliteOrbitRecord {
                        name: record.map(|r| r.name.clone()).unwrap_or_default(),
                        constellation: record
                            .map(|r| r.constellation)
                            .unwrap_or(Constellation::Other),
                        samples: samples.clone(),
                    },
                )
            })
            .collect(),
    };
    artifacts::write_artifact(temp_bucket, artifacts::ORBIT_ARTIFACT, &orbit_artifact)?;

    // Stage 2: six-stage candidate filtering
    let signal_ctx = SignalContext {
        terminal: config.terminal,
        atmosphere: config.atmosphere,
        starlink_rf: config.starlink_rf.clone(),
        oneweb_rf: config.oneweb_rf.clone(),
    };
    let filter_config = FilterConfig {
        observer: config.observer,
        starlink: config.starlink.clone(),
        oneweb: config.oneweb.clone(),
        development_input_limit: config.development_input_limit,
    };
    let filter_outcome = clock.time("stage2_candidate_filtering", || {
        run_filter(&records, &sampled, mode, &filter_config, &signal_ctx)
    })?;

    let filter_artifact = FilterArtifact {
        metadata: metadata(&load_stats, truncated),
        statistics: filter_outcome.statistics.clone(),
        candidates: filter_outcome
            .candidates
            .iter()
            .map(|(c, list)| (c.as_str().to_string(), list.clone()))
            .collect(),
    };
    artifacts::write_artifact(temp_bucket, artifacts::FILTER_ARTIFACT, &filter_artifact)?;

    // Stage 3: radio time series for serving and neighbors
    let (serving_id, serving_series, neighbor_ids, neighbor_series) =
        clock.time("stage3_signal_timeseries", || {
            stage3_signal_series(&filter_outcome.candidates, &sampled, config, &signal_ctx)
        })?;

    // Stage 4: event detection over the coupled series
    let (events, event_stats) = clock.time("stage4_event_detection", || {
        stage4_detect(&serving_series, &neighbor_series, config)
    })?;

    let event_artifact = EventArtifact {
        metadata: metadata(&load_stats, truncated),
        serving_satellite: serving_id,
        neighbor_satellites: neighbor_ids,
        serving_statistics: series_statistics(&serving_series),
        statistics: event_stats.clone(),
        events,
    };
    artifacts::write_artifact(permanent_bucket, artifacts::EVENT_ARTIFACT, &event_artifact)?;

    // Stage 5: coverage-continuity analysis per constellation
    let coverage = clock.time("stage5_coverage_analysis", || {
        stage5_coverage(&filter_outcome.candidates, &sampled, config)
    })?;

    // Stage 6: simulated-annealing pool optimization
    let solution = clock.time("stage6_pool_optimization", || {
        stage6_optimize(&filter_outcome.candidates, &sampled, config)
    })?;

    let pool_artifact = PoolArtifact {
        metadata: metadata(&load_stats, truncated),
        solution: solution.clone(),
        coverage,
    };
    artifacts::write_artifact(permanent_bucket, artifacts::POOL_ARTIFACT, &pool_artifact)?;

    // Final report
    let total_duration_s = clock.run_start.elapsed().as_secs_f64();
    let report = FinalReport {
        metadata: metadata(&load_stats, truncated),
        pipeline: PipelineStats {
            stages_completed: clock.durations.len(),
            total_stages: TOTAL_STAGES,
            stage_durations_s: clock.durations.clone(),
            total_duration_s,
        },
        pool: PoolSummary::from_solution(&solution),
        handover_events: EventSummary::from_statistics(&event_stats),
        compliance: solution.compliance,
        unmet_constraints: solution
            .compliance
            .unmet_constraints()
            .into_iter()
            .map(String::from)
            .collect(),
        feasible: solution.feasible,
    };
    artifacts::write_artifact(permanent_bucket, artifacts::FINAL_REPORT, &report)?;

    let exit_code = if solution.feasible {
        EXIT_SUCCESS
    } else {
        EXIT_INFEASIBLE
    };

    info!(
        feasible = solution.feasible,
        starlink = solution.starlink_members.len(),
        oneweb = solution.oneweb_members.len(),
        events = event_stats.total_events,
        exit_code,
        "pipeline complete"
    );

    Ok(PipelineOutcome {
        solution,
        events_total: event_stats.total_events,
        stage_durations_s: clock.durations,
        exit_code,
    })
}

type Stage1Output = (
    Vec<CatalogRecord>,
    PipelineMode,
    SampledCatalog,
    LoadStatistics,
    bool,
);

fn stage1_load(
    tle_text: &str,
    config: &PlannerConfig,
    deadline: Option<std::time::Duration>,
) -> Result<Stage1Output, PipelineError> {
    let stage_start = Instant::now();
    let (records, mut load_stats) = parse_tle_catalog(tle_text);
    if records.is_empty() {
        return Err(PipelineError::EmptyCatalog);
    }

    let mode = PipelineMode::from_catalog_size(records.len());
    let records = match mode {
        PipelineMode::Full => records,
        PipelineMode::Development => cap_per_constellation(records, config.development_propagation_cap),
    };

    // Grid anchored at the newest catalog epoch unless configured, so a
    // rerun on the same input reproduces the same samples.
    let start = config
        .window
        .start
        .unwrap_or_else(|| records.iter().map(|r| r.epoch).max().expect("nonempty"));
    let grid = TimeGrid::new(start, config.window.duration_min, config.window.step_s)?;

    // Propagate in chunks so a stage deadline can stop new work between
    // batches; everything sampled so far is kept and flagged truncated.
    let mut samples = BTreeMap::new();
    let mut init_failures = 0usize;
    let mut step_failures = 0usize;
    let mut truncated = false;

    for (chunk_index, chunk) in records.chunks(PROPAGATION_CHUNK).enumerate() {
        if let Some(limit) = deadline {
            // The first chunk always runs; the deadline only stops new
            // work from being issued.
            if chunk_index > 0 && stage_start.elapsed() > limit {
                warn!(
                    propagated = samples.len(),
                    remaining = records.len() - samples.len(),
                    "stage deadline expired, returning partial orbit artifact"
                );
                truncated = true;
                break;
            }
        }
        let chunk_result = propagation::sample_catalog(chunk, &config.observer, grid);
        init_failures += chunk_result.sgp4_init_failures;
        step_failures += chunk_result.propagation_step_failures;
        samples.extend(chunk_result.samples);
    }

    let sampled = SampledCatalog {
        samples,
        grid,
        sgp4_init_failures: init_failures,
        propagation_step_failures: step_failures,
    };

    load_stats.sgp4_init_failures = init_failures;
    load_stats.propagation_step_failures = step_failures;
    load_stats.samples_produced = sampled.samples_produced();

    info!(
        records = records.len(),
        mode = ?mode,
        satellites_sampled = sampled.samples.len(),
        samples = load_stats.samples_produced,
        "orbit sampling complete"
    );

    Ok((records, mode, sampled, load_stats, truncated))
}

/// Development-mode cap: keep catalog order, limit each constellation.
fn cap_per_constellation(records: Vec<CatalogRecord>, cap: usize) -> Vec<CatalogRecord> {
    let mut kept = Vec::with_capacity(records.len().min(cap * 3));
    let mut counts: BTreeMap<Constellation, usize> = BTreeMap::new();
    for record in records {
        let count = counts.entry(record.constellation).or_insert(0);
        if *count < cap {
            *count += 1;
            kept.push(record);
        }
    }
    kept
}

type Stage3Output = (u64, Vec<SignalSample>, Vec<u64>, Vec<Vec<SignalSample>>);

fn stage3_signal_series(
    candidates: &BTreeMap<Constellation, Vec<CandidateScore>>,
    sampled: &SampledCatalog,
    config: &PlannerConfig,
    signal_ctx: &SignalContext,
) -> Result<Stage3Output, PipelineError> {
    // Serving satellite: the best-scored Starlink candidate, falling
    // back to the best of anything else.
    let serving = candidates
        .get(&Constellation::Starlink)
        .and_then(|list| list.first())
        .or_else(|| candidates.values().flatten().next())
        .ok_or(FilterError::EmptyCandidateSet)?;

    if !sampled.samples.contains_key(&serving.satellite_id) {
        return Err(PipelineError::InsufficientData(format!(
            "serving satellite {} has no position series",
            serving.satellite_id
        )));
    }

    // Neighbors: the highest-scored remaining candidates across both
    // constellations, cross-constellation included.
    let mut ranked: Vec<&CandidateScore> = candidates
        .values()
        .flatten()
        .filter(|c| c.satellite_id != serving.satellite_id)
        .collect();
    ranked.sort_by(|a, b| {
        b.total_score
            .partial_cmp(&a.total_score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.satellite_id.cmp(&b.satellite_id))
    });

    let neighbors: Vec<&CandidateScore> = ranked
        .into_iter()
        .filter(|c| {
            let has_samples = sampled.samples.contains_key(&c.satellite_id);
            if !has_samples {
                warn!(
                    satellite_id = c.satellite_id,
                    "neighbor lacks a position series, skipped"
                );
            }
            has_samples
        })
        .take(config.neighbor_count)
        .collect();

    // One rayon task per satellite over the shared grid
    let mut wanted: Vec<(u64, Constellation)> =
        vec![(serving.satellite_id, serving.constellation)];
    wanted.extend(neighbors.iter().map(|c| (c.satellite_id, c.constellation)));
    let mut series_by_id = compute_catalog_series(&wanted, &sampled.samples, signal_ctx);

    let serving_series = series_by_id.remove(&serving.satellite_id).ok_or_else(|| {
        PipelineError::InsufficientData(format!(
            "serving satellite {} produced no radio series",
            serving.satellite_id
        ))
    })?;

    let mut neighbor_ids = Vec::new();
    let mut neighbor_series = Vec::new();
    for candidate in &neighbors {
        if let Some(series) = series_by_id.remove(&candidate.satellite_id) {
            neighbor_ids.push(candidate.satellite_id);
            neighbor_series.push(series);
        }
    }

    info!(
        serving = serving.satellite_id,
        neighbors = neighbor_ids.len(),
        "signal series computed"
    );

    Ok((serving.satellite_id, serving_series, neighbor_ids, neighbor_series))
}

fn stage4_detect(
    serving_series: &[SignalSample],
    neighbor_series: &[Vec<SignalSample>],
    config: &PlannerConfig,
) -> Result<(Vec<HandoverEvent>, EventStatistics), PipelineError> {
    if neighbor_series.is_empty() {
        // A single-candidate catalog has nothing to hand over to; an
        // empty catalog of events is a legal stage output.
        warn!("no neighbors available, event catalog is empty");
        return Ok((Vec::new(), EventStatistics::default()));
    }
    Ok(detect_events(serving_series, neighbor_series, &config.event_thresholds)?)
}

fn stage5_coverage(
    candidates: &BTreeMap<Constellation, Vec<CandidateScore>>,
    sampled: &SampledCatalog,
    config: &PlannerConfig,
) -> Result<BTreeMap<String, CoverageReport>, PipelineError> {
    let mut reports = BTreeMap::new();

    for (constellation, list) in candidates {
        if list.is_empty() {
            continue;
        }
        let (mask, coverage_cfg) = match constellation {
            Constellation::Starlink => {
                (config.starlink.elevation_mask_deg, config.optimizer.starlink_coverage)
            }
            Constellation::Oneweb => {
                (config.oneweb.elevation_mask_deg, config.optimizer.oneweb_coverage)
            }
            Constellation::Other => continue,
        };

        let selected: Vec<&CandidateScore> = list.iter().filter(|c| c.is_selected).collect();
        let series: Vec<&[PositionSample]> = selected
            .iter()
            .filter_map(|c| sampled.samples.get(&c.satellite_id).map(Vec::as_slice))
            .collect();
        let raans: Vec<f64> = selected.iter().map(|c| c.raan_deg).collect();

        let counts = visible_counts(&series, &sampled.grid, mask)?;
        let report = analyze_coverage(&counts, &raans, &sampled.grid, &coverage_cfg)?;
        info!(
            constellation = %constellation,
            average_visible = format!("{:.1}", report.average_visible).as_str(),
            reliability = format!("{:.3}", report.reliability).as_str(),
            raan_bins = report.raan.bins_covered,
            "coverage analyzed"
        );
        reports.insert(constellation.as_str().to_string(), report);
    }

    Ok(reports)
}

fn stage6_optimize(
    candidates: &BTreeMap<Constellation, Vec<CandidateScore>>,
    sampled: &SampledCatalog,
    config: &PlannerConfig,
) -> Result<PoolSolution, PipelineError> {
    let build = |constellation: Constellation, mask: f64| -> Vec<PoolCandidate> {
        candidates
            .get(&constellation)
            .map(|list| {
                list.iter()
                    .filter(|c| c.is_selected)
                    .filter_map(|c| {
                        sampled
                            .samples
                            .get(&c.satellite_id)
                            .map(|samples| PoolCandidate::from_candidate(c, samples, &sampled.grid, mask))
                    })
                    .collect()
            })
            .unwrap_or_default()
    };

    let input = AnnealerInput {
        starlink: build(Constellation::Starlink, config.starlink.elevation_mask_deg),
        oneweb: build(Constellation::Oneweb, config.oneweb.elevation_mask_deg),
    };

    Ok(optimize(input, &config.optimizer)?)
}
