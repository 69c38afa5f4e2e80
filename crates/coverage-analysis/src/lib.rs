//! Coverage Analysis Library
//!
//! Assesses whether a candidate set guarantees continuous coverage of
//! the observer: visibility-gap identification over the sampling grid,
//! a boolean continuous-coverage guarantee, a reliability ratio, and
//! RAAN-bin orbital diversity.
//!
//! All metrics are pure functions of the candidate set and the time
//! grid. Callers must pass only satellites with nominal signal series;
//! degraded satellites (no registered RF parameters) never count toward
//! visibility compliance.

use chrono::{DateTime, Utc};
use orbit_propagation::{PositionSample, TimeGrid};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

/// RAAN space is partitioned into 36 bins of 10 degrees each.
pub const RAAN_BIN_COUNT: usize = 36;
pub const RAAN_BIN_WIDTH_DEG: f64 = 10.0;

#[derive(Error, Debug)]
pub enum CoverageError {
    #[error("Empty time grid")]
    EmptyGrid,
    #[error("Visible-count series length {0} does not match grid length {1}")]
    SeriesLengthMismatch(usize, usize),
}

pub type Result<T> = std::result::Result<T, CoverageError>;

/// Coverage targets for one constellation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoverageConfig {
    /// Fewer simultaneously visible satellites than this opens a gap.
    pub min_visible: usize,
    /// Visible-count band the plan aims to hold.
    pub visible_target_min: usize,
    pub visible_target_max: usize,
    pub max_gap_duration_s: u32,
    pub reliability_threshold: f64,
    pub raan_diversity_target: f64,
}

impl CoverageConfig {
    pub fn starlink() -> Self {
        Self {
            min_visible: 10,
            visible_target_min: 10,
            visible_target_max: 15,
            max_gap_duration_s: 120,
            reliability_threshold: 0.99,
            raan_diversity_target: 0.85,
        }
    }

    pub fn oneweb() -> Self {
        Self {
            min_visible: 3,
            visible_target_min: 3,
            visible_target_max: 6,
            max_gap_duration_s: 120,
            reliability_threshold: 0.99,
            raan_diversity_target: 0.85,
        }
    }
}

/// One maximal run of grid instants below the visibility floor.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CoverageGap {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub duration_s: u32,
    /// Lowest simultaneous visible count observed inside the gap.
    pub min_visible_observed: usize,
    pub critical: bool,
}

/// RAAN-bin diversity summary for a selected set.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RaanDiversity {
    pub bins_covered: usize,
    pub bin_count: usize,
    pub fraction: f64,
    pub target_met: bool,
}

/// Full coverage assessment for one candidate set on one grid.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoverageReport {
    pub average_visible: f64,
    pub min_visible_observed: usize,
    pub max_visible_observed: usize,
    pub gaps: Vec<CoverageGap>,
    pub critical_gap_count: usize,
    /// True when no critical gap exists and the average visible count
    /// clears the configured floor.
    pub continuous_coverage: bool,
    /// Fraction of grid instants at or above the target-band floor.
    pub reliability: f64,
    pub reliability_met: bool,
    pub raan: RaanDiversity,
}

/// Simultaneously visible satellite count at every grid instant.
///
/// A satellite counts at an instant when it has a sample there and its
/// elevation strictly exceeds the mask. The per-satellite reduction is
/// parallel; the final sum is a join.
pub fn visible_counts(
    series: &[&[PositionSample]],
    grid: &TimeGrid,
    elevation_mask_deg: f64,
) -> Result<Vec<usize>> {
    if grid.count == 0 {
        return Err(CoverageError::EmptyGrid);
    }

    let per_satellite: Vec<Vec<bool>> = series
        .par_iter()
        .map(|samples| {
            let mut visible = vec![false; grid.count];
            for sample in *samples {
                if let Some(index) = grid.index_of(sample.timestamp) {
                    visible[index] = sample.elevation_deg > elevation_mask_deg;
                }
            }
            visible
        })
        .collect();

    let mut counts = vec![0usize; grid.count];
    for visible in &per_satellite {
        for (count, v) in counts.iter_mut().zip(visible) {
            if *v {
                *count += 1;
            }
        }
    }
    Ok(counts)
}

/// Identify maximal sub-floor runs in a visible-count series.
pub fn identify_gaps(
    counts: &[usize],
    grid: &TimeGrid,
    config: &CoverageConfig,
) -> Result<Vec<CoverageGap>> {
    if counts.len() != grid.count {
        return Err(CoverageError::SeriesLengthMismatch(counts.len(), grid.count));
    }

    let mut gaps = Vec::new();
    let mut open: Option<(usize, usize)> = None; // (start index, min count)

    for (i, &count) in counts.iter().enumerate() {
        if count < config.min_visible {
            open = Some(match open {
                Some((start, low)) => (start, low.min(count)),
                None => (i, count),
            });
        } else if let Some((start, low)) = open.take() {
            gaps.push(close_gap(start, i - 1, low, grid, config));
        }
    }
    if let Some((start, low)) = open {
        gaps.push(close_gap(start, counts.len() - 1, low, grid, config));
    }

    debug!(gaps = gaps.len(), "gap scan complete");
    Ok(gaps)
}

fn close_gap(
    start: usize,
    end: usize,
    min_observed: usize,
    grid: &TimeGrid,
    config: &CoverageConfig,
) -> CoverageGap {
    let duration_s = ((end - start + 1) as u32) * grid.step_s;
    CoverageGap {
        start: grid.instant(start),
        end: grid.instant(end),
        duration_s,
        min_visible_observed: min_observed,
        critical: duration_s > config.max_gap_duration_s,
    }
}

/// Full coverage assessment from a visible-count series and the RAAN
/// values of the selected satellites.
pub fn analyze_coverage(
    counts: &[usize],
    selected_raans_deg: &[f64],
    grid: &TimeGrid,
    config: &CoverageConfig,
) -> Result<CoverageReport> {
    if counts.is_empty() || grid.count == 0 {
        return Err(CoverageError::EmptyGrid);
    }
    let gaps = identify_gaps(counts, grid, config)?;
    let critical_gap_count = gaps.iter().filter(|g| g.critical).count();

    let average_visible = counts.iter().sum::<usize>() as f64 / counts.len() as f64;
    let reliable_instants = counts
        .iter()
        .filter(|&&c| c >= config.visible_target_min)
        .count();
    let reliability = reliable_instants as f64 / counts.len() as f64;

    let raan = raan_diversity(selected_raans_deg, config.raan_diversity_target);

    Ok(CoverageReport {
        average_visible,
        min_visible_observed: counts.iter().copied().min().unwrap_or(0),
        max_visible_observed: counts.iter().copied().max().unwrap_or(0),
        critical_gap_count,
        continuous_coverage: critical_gap_count == 0
            && average_visible >= config.min_visible as f64,
        reliability,
        reliability_met: reliability >= config.reliability_threshold,
        raan,
        gaps,
    })
}

/// Fraction of 10-degree RAAN bins holding at least one selected
/// satellite.
pub fn raan_diversity(raans_deg: &[f64], target: f64) -> RaanDiversity {
    let mut bins = [false; RAAN_BIN_COUNT];
    for &raan in raans_deg {
        let normalized = raan.rem_euclid(360.0);
        let bin = ((normalized / RAAN_BIN_WIDTH_DEG) as usize).min(RAAN_BIN_COUNT - 1);
        bins[bin] = true;
    }
    let bins_covered = bins.iter().filter(|b| **b).count();
    let fraction = bins_covered as f64 / RAAN_BIN_COUNT as f64;
    RaanDiversity {
        bins_covered,
        bin_count: RAAN_BIN_COUNT,
        fraction,
        target_met: fraction >= target,
    }
}

/// Bins without any selected satellite, used by the optimizer to bias
/// its swap proposals.
pub fn empty_raan_bins(raans_deg: &[f64]) -> Vec<usize> {
    let mut bins = [false; RAAN_BIN_COUNT];
    for &raan in raans_deg {
        let normalized = raan.rem_euclid(360.0);
        let bin = ((normalized / RAAN_BIN_WIDTH_DEG) as usize).min(RAAN_BIN_COUNT - 1);
        bins[bin] = true;
    }
    bins.iter()
        .enumerate()
        .filter_map(|(i, covered)| (!covered).then_some(i))
        .collect()
}

/// Bin index for one RAAN value.
pub fn raan_bin(raan_deg: f64) -> usize {
    ((raan_deg.rem_euclid(360.0) / RAAN_BIN_WIDTH_DEG) as usize).min(RAAN_BIN_COUNT - 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn grid(count: usize) -> TimeGrid {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        // count samples at 30 s
        TimeGrid {
            start,
            step_s: 30,
            count,
        }
    }

    fn config() -> CoverageConfig {
        CoverageConfig {
            min_visible: 2,
            visible_target_min: 2,
            visible_target_max: 4,
            max_gap_duration_s: 120,
            reliability_threshold: 0.99,
            raan_diversity_target: 0.85,
        }
    }

    #[test]
    fn no_gaps_when_floor_holds() {
        let counts = vec![3usize; 20];
        let gaps = identify_gaps(&counts, &grid(20), &config()).unwrap();
        assert!(gaps.is_empty());
    }

    #[test]
    fn short_dip_is_a_noncritical_gap() {
        let mut counts = vec![3usize; 20];
        // 4 samples below floor: 120 s, not above the 120 s limit
        for c in counts.iter_mut().skip(5).take(4) {
            *c = 1;
        }
        let gaps = identify_gaps(&counts, &grid(20), &config()).unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].duration_s, 120);
        assert!(!gaps[0].critical);
        assert_eq!(gaps[0].min_visible_observed, 1);
    }

    #[test]
    fn long_dip_is_critical() {
        let mut counts = vec![3usize; 20];
        for c in counts.iter_mut().skip(5).take(5) {
            *c = 0;
        }
        let gaps = identify_gaps(&counts, &grid(20), &config()).unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].duration_s, 150);
        assert!(gaps[0].critical);
    }

    #[test]
    fn gap_open_at_window_end_is_closed() {
        let mut counts = vec![3usize; 10];
        counts[8] = 0;
        counts[9] = 0;
        let gaps = identify_gaps(&counts, &grid(10), &config()).unwrap();
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].end, grid(10).instant(9));
    }

    #[test]
    fn reliability_counts_band_floor() {
        let mut counts = vec![3usize; 100];
        counts[0] = 1;
        let report = analyze_coverage(&counts, &[0.0], &grid(100), &config()).unwrap();
        assert!((report.reliability - 0.99).abs() < 1e-9);
        assert!(report.reliability_met);
        assert!((report.average_visible - 2.98).abs() < 1e-9);
    }

    #[test]
    fn critical_gap_breaks_the_guarantee() {
        let mut counts = vec![3usize; 100];
        for c in counts.iter_mut().skip(10).take(6) {
            *c = 0;
        }
        let report = analyze_coverage(&counts, &[0.0], &grid(100), &config()).unwrap();
        assert_eq!(report.critical_gap_count, 1);
        assert!(!report.continuous_coverage);
    }

    #[test]
    fn high_reliability_implies_no_critical_gap() {
        // With min_visible equal to the band floor, 0.99 reliability on
        // a 30 s grid leaves at most 1% of instants low, which cannot
        // form a run longer than 120 s on any grid of 500+ instants.
        let mut counts = vec![3usize; 500];
        for c in counts.iter_mut().skip(100).take(4) {
            *c = 1;
        }
        let report = analyze_coverage(&counts, &[0.0], &grid(500), &config()).unwrap();
        assert!(report.reliability >= 0.99);
        assert_eq!(report.critical_gap_count, 0);
    }

    #[test]
    fn raan_diversity_counts_bins_once() {
        // Three satellites in the same bin, one elsewhere
        let d = raan_diversity(&[5.0, 7.0, 9.9, 185.0], 0.85);
        assert_eq!(d.bins_covered, 2);
        assert!(!d.target_met);
    }

    #[test]
    fn raan_diversity_target_needs_31_bins() {
        let raans: Vec<f64> = (0..31).map(|i| i as f64 * 10.0 + 5.0).collect();
        let d = raan_diversity(&raans, 0.85);
        assert_eq!(d.bins_covered, 31);
        assert!(d.target_met);

        let raans: Vec<f64> = (0..30).map(|i| i as f64 * 10.0 + 5.0).collect();
        assert!(!raan_diversity(&raans, 0.85).target_met);
    }

    #[test]
    fn raan_wraparound_lands_in_first_bin() {
        assert_eq!(raan_bin(360.0), 0);
        assert_eq!(raan_bin(-5.0), 35);
        assert_eq!(raan_bin(359.9), 35);
    }

    #[test]
    fn empty_bins_complement_coverage() {
        let raans = [5.0, 15.0, 25.0];
        let empty = empty_raan_bins(&raans);
        assert_eq!(empty.len(), RAAN_BIN_COUNT - 3);
        assert!(!empty.contains(&0));
        assert!(empty.contains(&35));
    }

    #[test]
    fn visible_counts_respect_strict_mask() {
        let start = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap();
        let g = TimeGrid {
            start,
            step_s: 30,
            count: 3,
        };
        let mk = |elev: f64, idx: i64| PositionSample {
            timestamp: start + chrono::Duration::seconds(idx * 30),
            position_x: 0.0,
            position_y: 0.0,
            position_z: 0.0,
            velocity_x: 0.0,
            velocity_y: 0.0,
            velocity_z: 0.0,
            latitude_deg: 0.0,
            longitude_deg: 0.0,
            altitude_km: 550.0,
            elevation_deg: elev,
            azimuth_deg: 0.0,
            range_km: 800.0,
            range_rate_km_s: 0.0,
        };
        // Satellite grazing exactly at the mask at instant 1
        let a = vec![mk(20.0, 0), mk(10.0, 1), mk(3.0, 2)];
        let b = vec![mk(12.0, 0), mk(25.0, 1), mk(30.0, 2)];
        let counts = visible_counts(&[&a, &b], &g, 10.0).unwrap();
        assert_eq!(counts, vec![2, 1, 1]);
    }
}
