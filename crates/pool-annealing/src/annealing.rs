//! The annealing chain.
//!
//! State is a per-constellation membership vector plus an incrementally
//! maintained visible-count series, so a 1-3 member swap costs a few
//! bitmap additions instead of a full re-reduction. The chain is
//! single-threaded by design; annealing state is inherently sequential.

use crate::{
    ComplianceCheck, FitnessBreakdown, OptimizerConfig, OptimizerError, PoolCandidate,
    PoolSizeBand, PoolSolution, Result,
};
use coverage_analysis::{empty_raan_bins, raan_bin, raan_diversity, CoverageConfig};
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use tracing::{debug, info};

/// Candidate pools handed to the optimizer, one per constellation.
#[derive(Debug, Clone, Default)]
pub struct AnnealerInput {
    pub starlink: Vec<PoolCandidate>,
    pub oneweb: Vec<PoolCandidate>,
}

struct Group {
    candidates: Vec<PoolCandidate>,
    band: PoolSizeBand,
    coverage: CoverageConfig,
    selected: Vec<bool>,
    counts: Vec<u32>,
    selected_count: usize,
    score_sum: f64,
}

impl Group {
    fn new(
        mut candidates: Vec<PoolCandidate>,
        band: PoolSizeBand,
        coverage: CoverageConfig,
        member_target: Option<usize>,
        grid_len: usize,
    ) -> Self {
        // Deterministic candidate order: score descending, id ascending
        candidates.sort_by(|a, b| {
            b.total_score
                .partial_cmp(&a.total_score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.satellite_id.cmp(&b.satellite_id))
        });

        let mut group = Self {
            selected: vec![false; candidates.len()],
            counts: vec![0; grid_len],
            selected_count: 0,
            score_sum: 0.0,
            candidates,
            band,
            coverage,
        };

        // Initial state: the best-scored members up to the target size
        let target = member_target
            .unwrap_or(band.max)
            .clamp(band.min, band.max)
            .min(group.candidates.len());
        for i in 0..target {
            group.toggle(i);
        }
        group
    }

    /// Flip one membership bit and maintain the count series.
    fn toggle(&mut self, index: usize) {
        let adding = !self.selected[index];
        self.selected[index] = adding;
        let candidate = &self.candidates[index];
        if adding {
            self.selected_count += 1;
            self.score_sum += candidate.total_score;
            for (count, visible) in self.counts.iter_mut().zip(&candidate.visible) {
                if *visible {
                    *count += 1;
                }
            }
        } else {
            self.selected_count -= 1;
            self.score_sum -= candidate.total_score;
            for (count, visible) in self.counts.iter_mut().zip(&candidate.visible) {
                if *visible {
                    *count -= 1;
                }
            }
        }
    }

    /// Fraction of grid instants with the visible count inside the
    /// target band, inclusive.
    fn visibility_compliance(&self) -> f64 {
        if self.counts.is_empty() {
            return 0.0;
        }
        let hits = self
            .counts
            .iter()
            .filter(|&&c| {
                (c as usize) >= self.coverage.visible_target_min
                    && (c as usize) <= self.coverage.visible_target_max
            })
            .count();
        hits as f64 / self.counts.len() as f64
    }

    /// Uniformity of the visible-count series: one minus the
    /// coefficient of variation, floored at zero.
    fn temporal_distribution(&self) -> f64 {
        if self.counts.is_empty() {
            return 0.0;
        }
        let n = self.counts.len() as f64;
        let mean = self.counts.iter().map(|&c| c as f64).sum::<f64>() / n;
        if mean <= 0.0 {
            return 0.0;
        }
        let variance = self
            .counts
            .iter()
            .map(|&c| {
                let d = c as f64 - mean;
                d * d
            })
            .sum::<f64>()
            / n;
        (1.0 - variance.sqrt() / mean).max(0.0)
    }

    fn selected_raans(&self) -> impl Iterator<Item = f64> + '_ {
        self.candidates
            .iter()
            .zip(&self.selected)
            .filter_map(|(c, &s)| s.then_some(c.raan_deg))
    }

    fn selected_ids(&self) -> Vec<u64> {
        let mut ids: Vec<u64> = self
            .candidates
            .iter()
            .zip(&self.selected)
            .filter_map(|(c, &s)| s.then_some(c.satellite_id))
            .collect();
        ids.sort_unstable();
        ids
    }

    /// Index of the lowest-scoring selected member. Candidates are
    /// score-sorted, so the last selected index is the worst.
    fn worst_selected(&self) -> Option<usize> {
        self.selected.iter().rposition(|&s| s)
    }

    fn size_in_band(&self) -> bool {
        self.band.contains(self.selected_count)
    }
}

struct Evaluation {
    fitness: FitnessBreakdown,
    feasible: bool,
}

struct Annealer<'a> {
    groups: Vec<Group>,
    config: &'a OptimizerConfig,
    rng: Pcg64,
}

impl<'a> Annealer<'a> {
    fn evaluate(&self) -> Evaluation {
        let active: Vec<&Group> = self
            .groups
            .iter()
            .filter(|g| !g.candidates.is_empty())
            .collect();

        let mut compliance = 0.0;
        let mut temporal = 0.0;
        let mut members = 0usize;
        let mut score_sum = 0.0;
        let mut sizes_ok = true;
        for group in &active {
            compliance += group.visibility_compliance();
            temporal += group.temporal_distribution();
            members += group.selected_count;
            score_sum += group.score_sum;
            sizes_ok &= group.size_in_band();
        }
        let n = active.len().max(1) as f64;
        compliance /= n;
        temporal /= n;

        let signal = if members > 0 {
            (score_sum / members as f64 / 100.0).clamp(0.0, 1.0)
        } else {
            0.0
        };

        let raans: Vec<f64> = self.groups.iter().flat_map(|g| g.selected_raans()).collect();
        let raan = raan_diversity(&raans, self.config.starlink_coverage.raan_diversity_target);

        let w = &self.config.weights;
        let total = w.visibility_compliance * compliance
            + w.temporal_distribution * temporal
            + w.signal_quality * signal
            + w.raan_diversity * raan.fraction;

        Evaluation {
            fitness: FitnessBreakdown {
                visibility_compliance: compliance,
                temporal_distribution: temporal,
                signal_quality: signal,
                raan_diversity: raan.fraction,
                total,
            },
            feasible: sizes_ok
                && compliance >= self.config.min_visibility_compliance
                && temporal >= self.config.min_temporal_distribution,
        }
    }

    /// Propose a 1-3 member move as a list of toggles. Swap-ins favor
    /// candidates covering empty RAAN bins; swap-outs favor the
    /// lowest-scoring member.
    fn propose(&mut self) -> Vec<(usize, usize)> {
        let eligible: Vec<usize> = self
            .groups
            .iter()
            .enumerate()
            .filter_map(|(i, g)| (!g.candidates.is_empty()).then_some(i))
            .collect();
        if eligible.is_empty() {
            return Vec::new();
        }

        let empty_bins = {
            let raans: Vec<f64> = self.groups.iter().flat_map(|g| g.selected_raans()).collect();
            empty_raan_bins(&raans)
        };

        let swaps = self.rng.gen_range(1..=3usize);
        let mut toggles: Vec<(usize, usize)> = Vec::new();

        for _ in 0..swaps {
            let gi = eligible[self.rng.gen_range(0..eligible.len())];
            let group = &self.groups[gi];

            let unselected: Vec<usize> = group
                .selected
                .iter()
                .enumerate()
                .filter_map(|(i, &s)| (!s).then_some(i))
                .collect();

            // Swap-in choice: prefer a candidate that fills an empty bin
            let incoming = if !unselected.is_empty() {
                let bin_fillers: Vec<usize> = unselected
                    .iter()
                    .copied()
                    .filter(|&i| empty_bins.contains(&raan_bin(group.candidates[i].raan_deg)))
                    .collect();
                if !bin_fillers.is_empty() && self.rng.gen_bool(0.75) {
                    Some(bin_fillers[self.rng.gen_range(0..bin_fillers.len())])
                } else {
                    Some(unselected[self.rng.gen_range(0..unselected.len())])
                }
            } else {
                None
            };

            // Swap-out choice: bias toward the worst member
            let outgoing = if self.rng.gen_bool(0.5) {
                group.worst_selected()
            } else {
                let selected: Vec<usize> = group
                    .selected
                    .iter()
                    .enumerate()
                    .filter_map(|(i, &s)| s.then_some(i))
                    .collect();
                if selected.is_empty() {
                    None
                } else {
                    Some(selected[self.rng.gen_range(0..selected.len())])
                }
            };

            let can_grow = group.selected_count < group.band.max;
            let can_shrink = group.selected_count > group.band.min;

            match (incoming, outgoing) {
                (Some(inc), Some(out)) => {
                    // Occasionally grow or shrink instead of swapping
                    if can_grow && self.rng.gen_bool(0.15) {
                        toggles.push((gi, inc));
                    } else if can_shrink && self.rng.gen_bool(0.15) {
                        toggles.push((gi, out));
                    } else {
                        toggles.push((gi, inc));
                        toggles.push((gi, out));
                    }
                }
                (Some(inc), None) if can_grow || group.selected_count == 0 => {
                    toggles.push((gi, inc));
                }
                (None, Some(out)) if can_shrink => {
                    toggles.push((gi, out));
                }
                _ => {}
            }
        }

        toggles
    }

    fn apply(&mut self, toggles: &[(usize, usize)]) {
        for &(gi, ci) in toggles {
            self.groups[gi].toggle(ci);
        }
    }

    fn solution(&self, fitness: FitnessBreakdown, feasible: bool, iterations: u32) -> PoolSolution {
        let starlink_members = self.groups[0].selected_ids();
        let oneweb_members = self.groups[1].selected_ids();

        let compliance = ComplianceCheck {
            starlink_target_met: self.groups[0].band.contains(starlink_members.len()),
            oneweb_target_met: self.groups[1].band.contains(oneweb_members.len()),
            visibility_compliance_ok: fitness.visibility_compliance
                >= self.config.min_visibility_compliance,
            temporal_distribution_ok: fitness.temporal_distribution
                >= self.config.min_temporal_distribution,
            signal_quality_ok: fitness.signal_quality >= self.config.min_signal_quality,
            raan_diversity_ok: fitness.raan_diversity
                >= self.config.starlink_coverage.raan_diversity_target,
        };

        PoolSolution {
            total_satellites: starlink_members.len() + oneweb_members.len(),
            starlink_members,
            oneweb_members,
            fitness,
            feasible,
            iterations_run: iterations,
            compliance,
        }
    }
}

/// Run the annealing chain and return the best solution found.
///
/// Never returns an unflagged infeasible solution: when the iteration
/// budget elapses without any state satisfying the hard constraints,
/// the best state seen is returned with `feasible = false`.
pub fn optimize(input: AnnealerInput, config: &OptimizerConfig) -> Result<PoolSolution> {
    if input.starlink.is_empty() && input.oneweb.is_empty() {
        return Err(OptimizerError::NoCandidates);
    }
    let grid_len = input
        .starlink
        .iter()
        .chain(&input.oneweb)
        .map(|c| c.visible.len())
        .max()
        .unwrap_or(0);
    for candidate in input.starlink.iter().chain(&input.oneweb) {
        if candidate.visible.is_empty() {
            return Err(OptimizerError::MissingVisibility(candidate.satellite_id));
        }
    }

    let mut annealer = Annealer {
        groups: vec![
            Group::new(
                input.starlink,
                config.starlink_band,
                config.starlink_coverage,
                config.starlink_member_target,
                grid_len,
            ),
            Group::new(
                input.oneweb,
                config.oneweb_band,
                config.oneweb_coverage,
                config.oneweb_member_target,
                grid_len,
            ),
        ],
        config,
        rng: Pcg64::seed_from_u64(config.annealing.seed),
    };

    let mut current = annealer.evaluate();
    let mut current_energy = -current.fitness.total;

    let mut best_feasible: Option<(FitnessBreakdown, Vec<Vec<bool>>)> = None;
    let mut best_overall = (
        current.fitness,
        annealer.groups.iter().map(|g| g.selected.clone()).collect::<Vec<_>>(),
    );
    if current.feasible {
        best_feasible = Some(best_overall.clone());
    }

    let mut temperature = config.annealing.initial_temperature;
    let mut iterations = 0u32;

    while iterations < config.annealing.max_iterations {
        iterations += 1;

        let toggles = annealer.propose();
        if toggles.is_empty() {
            temperature *= config.annealing.cooling_rate;
            continue;
        }

        annealer.apply(&toggles);
        let proposed = annealer.evaluate();

        // Feasible states never yield to infeasible neighbors
        let rejected_by_constraints = current.feasible && !proposed.feasible;

        let energy = -proposed.fitness.total;
        let delta = energy - current_energy;
        let accepted = !rejected_by_constraints
            && (delta < 0.0
                || annealer.rng.gen::<f64>() < (-delta / temperature.max(1e-12)).exp());

        if accepted {
            current = proposed;
            current_energy = energy;
            if current.fitness.total > best_overall.0.total {
                best_overall = (
                    current.fitness,
                    annealer.groups.iter().map(|g| g.selected.clone()).collect(),
                );
            }
            if current.feasible {
                let improves = best_feasible
                    .as_ref()
                    .map(|(f, _)| current.fitness.total > f.total)
                    .unwrap_or(true);
                if improves {
                    best_feasible = Some((
                        current.fitness,
                        annealer.groups.iter().map(|g| g.selected.clone()).collect(),
                    ));
                }
            }
        } else {
            // Revert: toggles are their own inverse
            annealer.apply(&toggles);
        }

        temperature *= config.annealing.cooling_rate;
    }

    let (fitness, memberships, feasible) = match best_feasible {
        Some((fitness, memberships)) => (fitness, memberships, true),
        None => {
            let (fitness, memberships) = best_overall;
            (fitness, memberships, false)
        }
    };

    // Restore the winning memberships before reading out the solution
    for (group, membership) in annealer.groups.iter_mut().zip(&memberships) {
        for i in 0..group.selected.len() {
            if group.selected[i] != membership[i] {
                group.toggle(i);
            }
        }
    }

    let solution = annealer.solution(fitness, feasible, iterations);
    if feasible {
        info!(
            starlink = solution.starlink_members.len(),
            oneweb = solution.oneweb_members.len(),
            fitness = solution.fitness.total,
            iterations,
            "annealing found a feasible pool"
        );
    } else {
        debug!(iterations, "no feasible state found, returning best infeasible");
    }
    Ok(solution)
}
