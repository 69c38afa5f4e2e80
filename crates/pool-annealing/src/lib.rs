//! Pool Annealing Library
//!
//! Simulated annealing over per-constellation candidate subsets. The
//! optimizer holds a visible-count series per constellation and updates
//! it incrementally as members swap in and out, so every iteration is
//! cheap even with hundreds of candidates.
//!
//! The annealing chain is the only place in the pipeline allowed to
//! draw random numbers, and it draws them from a seeded Pcg64 so a rerun
//! with the same configuration walks the same chain.

use candidate_filter::CandidateScore;
use orbit_propagation::{Constellation, PositionSample, TimeGrid};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod annealing;

pub use annealing::{optimize, AnnealerInput};

#[derive(Error, Debug)]
pub enum OptimizerError {
    #[error("No candidates supplied for any constellation")]
    NoCandidates,
    #[error("Candidate {0} has no visibility series")]
    MissingVisibility(u64),
}

pub type Result<T> = std::result::Result<T, OptimizerError>;

/// Annealing schedule.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AnnealingConfig {
    pub initial_temperature: f64,
    pub cooling_rate: f64,
    pub max_iterations: u32,
    /// Pcg64 seed. Fixed by default so reruns reproduce the chain.
    pub seed: u64,
}

impl Default for AnnealingConfig {
    fn default() -> Self {
        Self {
            initial_temperature: 1000.0,
            cooling_rate: 0.95,
            max_iterations: 5000,
            seed: 0x5eed_2025_0601,
        }
    }
}

/// Inclusive pool-size band, a hard constraint.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PoolSizeBand {
    pub min: usize,
    pub max: usize,
}

impl PoolSizeBand {
    pub fn contains(&self, size: usize) -> bool {
        size >= self.min && size <= self.max
    }
}

/// Fitness weights over the four normalized objectives.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct FitnessWeights {
    pub visibility_compliance: f64,
    pub temporal_distribution: f64,
    pub signal_quality: f64,
    pub raan_diversity: f64,
}

impl Default for FitnessWeights {
    fn default() -> Self {
        Self {
            visibility_compliance: 0.40,
            temporal_distribution: 0.25,
            signal_quality: 0.20,
            raan_diversity: 0.15,
        }
    }
}

/// Complete optimizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub annealing: AnnealingConfig,
    pub starlink_band: PoolSizeBand,
    pub oneweb_band: PoolSizeBand,
    pub starlink_coverage: coverage_analysis::CoverageConfig,
    pub oneweb_coverage: coverage_analysis::CoverageConfig,
    pub weights: FitnessWeights,
    /// Hard floor on visibility compliance.
    pub min_visibility_compliance: f64,
    /// Hard floor on temporal distribution.
    pub min_temporal_distribution: f64,
    /// Compliance-check floor on mean member score (scaled to [0,1]).
    pub min_signal_quality: f64,
    /// Full-catalog member targets. When set, the initial state aims at
    /// these sizes instead of the band maximum.
    pub starlink_member_target: Option<usize>,
    pub oneweb_member_target: Option<usize>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            annealing: AnnealingConfig::default(),
            starlink_band: PoolSizeBand { min: 10, max: 100 },
            oneweb_band: PoolSizeBand { min: 3, max: 50 },
            starlink_coverage: coverage_analysis::CoverageConfig::starlink(),
            oneweb_coverage: coverage_analysis::CoverageConfig::oneweb(),
            weights: FitnessWeights::default(),
            min_visibility_compliance: 0.70,
            min_temporal_distribution: 0.50,
            min_signal_quality: 0.50,
            starlink_member_target: None,
            oneweb_member_target: None,
        }
    }
}

/// One optimizable candidate: identity, score, RAAN, and its visibility
/// bitmap over the shared grid (strictly above the constellation mask).
#[derive(Debug, Clone)]
pub struct PoolCandidate {
    pub satellite_id: u64,
    pub constellation: Constellation,
    pub raan_deg: f64,
    pub total_score: f64,
    pub visible: Vec<bool>,
}

impl PoolCandidate {
    /// Build from a filter candidate and its position series.
    pub fn from_candidate(
        score: &CandidateScore,
        samples: &[PositionSample],
        grid: &TimeGrid,
        elevation_mask_deg: f64,
    ) -> Self {
        let mut visible = vec![false; grid.count];
        for sample in samples {
            if let Some(index) = grid.index_of(sample.timestamp) {
                visible[index] = sample.elevation_deg > elevation_mask_deg;
            }
        }
        Self {
            satellite_id: score.satellite_id,
            constellation: score.constellation,
            raan_deg: score.raan_deg,
            total_score: score.total_score,
            visible,
        }
    }
}

/// Fitness decomposition of one state.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct FitnessBreakdown {
    pub visibility_compliance: f64,
    pub temporal_distribution: f64,
    pub signal_quality: f64,
    pub raan_diversity: f64,
    pub total: f64,
}

/// Compliance dictionary reported with the solution.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct ComplianceCheck {
    pub starlink_target_met: bool,
    pub oneweb_target_met: bool,
    pub visibility_compliance_ok: bool,
    pub temporal_distribution_ok: bool,
    pub signal_quality_ok: bool,
    pub raan_diversity_ok: bool,
}

impl ComplianceCheck {
    pub fn all_met(&self) -> bool {
        self.starlink_target_met
            && self.oneweb_target_met
            && self.visibility_compliance_ok
            && self.temporal_distribution_ok
            && self.signal_quality_ok
            && self.raan_diversity_ok
    }

    pub fn unmet_constraints(&self) -> Vec<&'static str> {
        let mut unmet = Vec::new();
        if !self.starlink_target_met {
            unmet.push("starlink_target_met");
        }
        if !self.oneweb_target_met {
            unmet.push("oneweb_target_met");
        }
        if !self.visibility_compliance_ok {
            unmet.push("visibility_compliance_ok");
        }
        if !self.temporal_distribution_ok {
            unmet.push("temporal_distribution_ok");
        }
        if !self.signal_quality_ok {
            unmet.push("signal_quality_ok");
        }
        if !self.raan_diversity_ok {
            unmet.push("raan_diversity_ok");
        }
        unmet
    }
}

/// Final pool selection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolSolution {
    pub starlink_members: Vec<u64>,
    pub oneweb_members: Vec<u64>,
    pub total_satellites: usize,
    pub fitness: FitnessBreakdown,
    pub feasible: bool,
    pub iterations_run: u32,
    pub compliance: ComplianceCheck,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fitness_weights_sum_to_one() {
        let w = FitnessWeights::default();
        let total = w.visibility_compliance + w.temporal_distribution + w.signal_quality + w.raan_diversity;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn band_membership_is_inclusive() {
        let band = PoolSizeBand { min: 10, max: 100 };
        assert!(!band.contains(9));
        assert!(band.contains(10));
        assert!(band.contains(100));
        assert!(!band.contains(101));
    }

    #[test]
    fn default_schedule_matches_planning_profile() {
        let a = AnnealingConfig::default();
        assert_eq!(a.initial_temperature, 1000.0);
        assert_eq!(a.cooling_rate, 0.95);
        assert_eq!(a.max_iterations, 5000);
    }
}
