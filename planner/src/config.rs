//! Pipeline configuration.
//!
//! One serde tree covers every stage: observer, sampling window,
//! per-constellation filter parameters, event thresholds, terminal and
//! atmosphere profiles, annealing schedule, and coverage targets.
//! Defaults carry the documented planning profile; a config file only
//! needs the fields it overrides. Invalid configuration is fatal at
//! startup (exit code 4).

use candidate_filter::ConstellationParams;
use chrono::{DateTime, Utc};
use handover_events::EventThresholds;
use orbit_propagation::{Constellation, Observer};
use pool_annealing::OptimizerConfig;
use serde::{Deserialize, Serialize};
use signal_budget::{rf_parameters, AtmosphereParams, ConstellationRf, TerminalProfile};
use std::path::Path;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config file: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

fn default_window_duration_min() -> u32 {
    200
}

fn default_window_step_s() -> u32 {
    30
}

/// Sampling window over which the whole plan is computed.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Planning window length, minutes. The default covers at least one
    /// full revolution of both constellations.
    #[serde(default = "default_window_duration_min")]
    pub duration_min: u32,
    #[serde(default = "default_window_step_s")]
    pub step_s: u32,
    /// Grid start. When absent, the newest TLE epoch in the catalog is
    /// used so reruns on the same input reproduce identical grids.
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            duration_min: 200,
            step_s: 30,
            start: None,
        }
    }
}

fn default_starlink_rf() -> ConstellationRf {
    rf_parameters(Constellation::Starlink).expect("registry carries Starlink parameters")
}

fn default_oneweb_rf() -> ConstellationRf {
    rf_parameters(Constellation::Oneweb).expect("registry carries OneWeb parameters")
}

fn default_neighbor_count() -> usize {
    10
}

fn default_development_input_limit() -> usize {
    200
}

fn default_development_propagation_cap() -> usize {
    500
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlannerConfig {
    #[serde(default)]
    pub observer: Observer,
    #[serde(default)]
    pub window: WindowConfig,
    #[serde(default = "ConstellationParams::starlink")]
    pub starlink: ConstellationParams,
    #[serde(default = "ConstellationParams::oneweb")]
    pub oneweb: ConstellationParams,
    /// Downlink RF parameters, defaulting to the versioned registry
    /// values from the public filings.
    #[serde(default = "default_starlink_rf")]
    pub starlink_rf: ConstellationRf,
    #[serde(default = "default_oneweb_rf")]
    pub oneweb_rf: ConstellationRf,
    #[serde(default)]
    pub event_thresholds: EventThresholds,
    #[serde(default)]
    pub terminal: TerminalProfile,
    #[serde(default)]
    pub atmosphere: AtmosphereParams,
    #[serde(default)]
    pub optimizer: OptimizerConfig,
    /// Neighbor list size for event detection.
    #[serde(default = "default_neighbor_count")]
    pub neighbor_count: usize,
    /// Input size below which the filter may use the development
    /// profile.
    #[serde(default = "default_development_input_limit")]
    pub development_input_limit: usize,
    /// Per-constellation propagation cap applied in development mode.
    #[serde(default = "default_development_propagation_cap")]
    pub development_propagation_cap: usize,
    /// Per-stage wall-clock deadline. On expiry a stage stops issuing
    /// new work and its artifact is marked truncated.
    #[serde(default)]
    pub stage_deadline_s: Option<u64>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            observer: Observer::default(),
            window: WindowConfig::default(),
            starlink: ConstellationParams::starlink(),
            oneweb: ConstellationParams::oneweb(),
            starlink_rf: default_starlink_rf(),
            oneweb_rf: default_oneweb_rf(),
            event_thresholds: EventThresholds::default(),
            terminal: TerminalProfile::default(),
            atmosphere: AtmosphereParams::default(),
            optimizer: OptimizerConfig::default(),
            neighbor_count: 10,
            development_input_limit: 200,
            development_propagation_cap: 500,
            stage_deadline_s: None,
        }
    }
}

impl PlannerConfig {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        let config: PlannerConfig = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if !(-90.0..=90.0).contains(&self.observer.latitude_deg)
            || !self.observer.latitude_deg.is_finite()
        {
            return invalid(format!("observer latitude {}", self.observer.latitude_deg));
        }
        if !(-180.0..=180.0).contains(&self.observer.longitude_deg)
            || !self.observer.longitude_deg.is_finite()
        {
            return invalid(format!("observer longitude {}", self.observer.longitude_deg));
        }
        if self.window.duration_min == 0 {
            return invalid("window duration must be positive".into());
        }
        if self.window.step_s == 0 {
            return invalid("window step must be positive".into());
        }
        for params in [&self.starlink, &self.oneweb] {
            if params.elevation_mask_deg < 0.0 || params.elevation_mask_deg >= 90.0 {
                return invalid(format!(
                    "{} elevation mask {}",
                    params.constellation, params.elevation_mask_deg
                ));
            }
            if params.min_visible_time_min < 0.0 {
                return invalid(format!(
                    "{} minimum visible time {}",
                    params.constellation, params.min_visible_time_min
                ));
            }
            if params.candidate_target == 0 {
                return invalid(format!("{} candidate target is zero", params.constellation));
            }
        }
        for (label, rf) in [("starlink", &self.starlink_rf), ("oneweb", &self.oneweb_rf)] {
            if rf.frequency_ghz <= 0.0 {
                return invalid(format!("{label} carrier frequency {}", rf.frequency_ghz));
            }
            if rf.antenna_gain_min_dbi > rf.antenna_gain_max_dbi {
                return invalid(format!("{label} antenna gain range inverted"));
            }
        }
        if self.event_thresholds.hysteresis_db < 0.0 {
            return invalid("hysteresis must be non-negative".into());
        }
        if self.event_thresholds.d2_serving_distance_m <= self.event_thresholds.d2_neighbor_distance_m
        {
            return invalid("D2 serving threshold must exceed the neighbor threshold".into());
        }
        let annealing = &self.optimizer.annealing;
        if !(0.0..1.0).contains(&annealing.cooling_rate) {
            return invalid(format!("cooling rate {}", annealing.cooling_rate));
        }
        if annealing.initial_temperature <= 0.0 {
            return invalid(format!("initial temperature {}", annealing.initial_temperature));
        }
        let w = &self.optimizer.weights;
        let weight_sum = w.visibility_compliance
            + w.temporal_distribution
            + w.signal_quality
            + w.raan_diversity;
        if (weight_sum - 1.0).abs() > 1e-6 {
            return invalid(format!("fitness weights sum to {}", weight_sum));
        }
        for band in [&self.optimizer.starlink_band, &self.optimizer.oneweb_band] {
            if band.min > band.max {
                return invalid(format!("pool band {}..{} inverted", band.min, band.max));
            }
        }
        for coverage in [&self.optimizer.starlink_coverage, &self.optimizer.oneweb_coverage] {
            if !(0.0..=1.0).contains(&coverage.reliability_threshold) {
                return invalid(format!("reliability threshold {}", coverage.reliability_threshold));
            }
            if !(0.0..=1.0).contains(&coverage.raan_diversity_target) {
                return invalid(format!("RAAN diversity target {}", coverage.raan_diversity_target));
            }
        }
        if self.neighbor_count == 0 {
            return invalid("neighbor count must be positive".into());
        }
        if self.development_propagation_cap == 0 {
            return invalid("development propagation cap must be positive".into());
        }
        Ok(())
    }
}
