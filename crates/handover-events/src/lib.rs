//! Handover Events Library
//!
//! Detects 3GPP NTN measurement events over the coupled radio time
//! series of a serving satellite and its neighbor list:
//!
//! - A4: neighbor becomes better than an absolute threshold
//! - A5: serving degrades below one threshold while a neighbor exceeds
//!   another
//! - D2: distance-based LEO trigger on the serving/neighbor slant ranges
//!
//! Detection is deterministic: the same input series always produces the
//! same event log, byte for byte. Confidence is a closed-form function
//! of the margin over the trigger boundary with no injected noise.

use chrono::{DateTime, Utc};
use orbit_propagation::Constellation;
use serde::{Deserialize, Serialize};
use signal_budget::SignalSample;
use std::collections::BTreeMap;
use thiserror::Error;

pub mod detector;

pub use detector::detect_events;

#[derive(Error, Debug)]
pub enum EventError {
    #[error("Serving series is empty")]
    EmptyServingSeries,
    #[error("Neighbor list is empty")]
    NoNeighbors,
}

pub type Result<T> = std::result::Result<T, EventError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    A4,
    A5,
    D2,
}

impl EventType {
    /// Tie-break rank for same-timestamp ordering: A5 before A4 before D2.
    pub fn ordering_rank(&self) -> u8 {
        match self {
            EventType::A5 => 0,
            EventType::A4 => 1,
            EventType::D2 => 2,
        }
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventType::A4 => f.write_str("A4"),
            EventType::A5 => f.write_str("A5"),
            EventType::D2 => f.write_str("D2"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EventPriority {
    High,
    Medium,
    Low,
}

/// Measurement-event thresholds. Defaults follow the NTN planning
/// profile; every field is configuration.
///
/// `time_to_trigger_ms` is recorded into each event's condition map for
/// the radio layer. At the 30 s sampling cadence any sustained trigger
/// already dwells far beyond the 320 ms window, so no additional
/// sustain logic applies at this layer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct EventThresholds {
    pub a4_neighbor_threshold_dbm: f64,
    pub a5_serving_threshold_dbm: f64,
    pub a5_neighbor_threshold_dbm: f64,
    pub hysteresis_db: f64,
    pub time_to_trigger_ms: u32,
    /// Frequency-specific offset O_fn, dB.
    pub frequency_offset_db: f64,
    /// Cell-specific offset O_cn, dB.
    pub cell_offset_db: f64,
    pub d2_serving_distance_m: f64,
    pub d2_neighbor_distance_m: f64,
    pub distance_hysteresis_m: f64,
}

impl Default for EventThresholds {
    fn default() -> Self {
        Self {
            a4_neighbor_threshold_dbm: -115.0,
            a5_serving_threshold_dbm: -125.0,
            a5_neighbor_threshold_dbm: -115.0,
            hysteresis_db: 2.0,
            time_to_trigger_ms: 320,
            frequency_offset_db: 0.0,
            cell_offset_db: 0.0,
            d2_serving_distance_m: 2_000_000.0,
            d2_neighbor_distance_m: 1_000_000.0,
            distance_hysteresis_m: 0.0,
        }
    }
}

/// Frozen view of one satellite's radio sample at the event instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSnapshot {
    pub satellite_id: u64,
    pub constellation: Constellation,
    pub elevation_deg: f64,
    pub range_km: f64,
    pub rsrp_dbm: Option<f64>,
}

impl SampleSnapshot {
    pub fn from_sample(sample: &SignalSample) -> Self {
        Self {
            satellite_id: sample.satellite_id,
            constellation: sample.constellation,
            elevation_deg: sample.elevation_deg,
            range_km: sample.range_km,
            rsrp_dbm: sample.rsrp_dbm,
        }
    }
}

/// One detected measurement event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HandoverEvent {
    pub event_id: String,
    pub event_type: EventType,
    pub priority: EventPriority,
    pub timestamp: DateTime<Utc>,
    pub serving: SampleSnapshot,
    pub neighbor: SampleSnapshot,
    /// Thresholds, hystereses, measured values, and margins that made
    /// the trigger fire, for downstream audit.
    pub trigger_conditions: BTreeMap<String, serde_json::Value>,
    pub description: String,
    pub handover_recommended: bool,
    pub confidence: f64,
}

impl HandoverEvent {
    pub fn cross_constellation(&self) -> bool {
        self.serving.constellation != self.neighbor.constellation
    }
}

/// Aggregate event accounting for the stage artifact.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventStatistics {
    pub total_events: usize,
    pub a4_count: usize,
    pub a5_count: usize,
    pub d2_count: usize,
    pub high_priority: usize,
    pub medium_priority: usize,
    pub low_priority: usize,
    pub recommended_count: usize,
    pub cross_constellation_count: usize,
    pub mean_confidence: f64,
    /// Instants that came within 10 dB of the A4 boundary without firing.
    pub a4_near_misses: usize,
    /// Instants where either A5 condition came within 8 dB.
    pub a5_near_misses: usize,
    /// Instants where either D2 condition came within 500 km.
    pub d2_near_misses: usize,
}

impl EventStatistics {
    pub fn record(&mut self, event: &HandoverEvent) {
        self.total_events += 1;
        match event.event_type {
            EventType::A4 => self.a4_count += 1,
            EventType::A5 => self.a5_count += 1,
            EventType::D2 => self.d2_count += 1,
        }
        match event.priority {
            EventPriority::High => self.high_priority += 1,
            EventPriority::Medium => self.medium_priority += 1,
            EventPriority::Low => self.low_priority += 1,
        }
        if event.handover_recommended {
            self.recommended_count += 1;
        }
        if event.cross_constellation() {
            self.cross_constellation_count += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_rank_puts_a5_first() {
        assert!(EventType::A5.ordering_rank() < EventType::A4.ordering_rank());
        assert!(EventType::A4.ordering_rank() < EventType::D2.ordering_rank());
    }

    #[test]
    fn default_thresholds_match_planning_profile() {
        let t = EventThresholds::default();
        assert_eq!(t.a4_neighbor_threshold_dbm, -115.0);
        assert_eq!(t.a5_serving_threshold_dbm, -125.0);
        assert_eq!(t.a5_neighbor_threshold_dbm, -115.0);
        assert_eq!(t.hysteresis_db, 2.0);
        assert_eq!(t.time_to_trigger_ms, 320);
        assert_eq!(t.d2_serving_distance_m, 2_000_000.0);
        assert_eq!(t.d2_neighbor_distance_m, 1_000_000.0);
    }
}
