//! Event detection over paired serving/neighbor series.
//!
//! Each (serving, neighbor) pair is scanned on the rayon pool; the
//! per-pair event streams are joined into a single sink and sorted once
//! by (timestamp, type rank, neighbor id). All trigger comparisons are
//! strict inequalities, so sitting exactly on a boundary (hysteresis
//! included) does not fire.

use crate::{
    EventError, EventPriority, EventStatistics, EventThresholds, EventType, HandoverEvent,
    Result, SampleSnapshot,
};
use rayon::prelude::*;
use serde_json::json;
use signal_budget::SignalSample;
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Near-miss windows for the detector statistics.
const A4_NEAR_MISS_DB: f64 = 10.0;
const A5_NEAR_MISS_DB: f64 = 8.0;
const D2_NEAR_MISS_M: f64 = 500_000.0;

#[derive(Debug, Default)]
struct PairOutcome {
    events: Vec<HandoverEvent>,
    a4_near_misses: usize,
    a5_near_misses: usize,
    d2_near_misses: usize,
}

/// Scan the serving series against every neighbor series and emit the
/// ordered event log with aggregate statistics.
///
/// Series are paired by timestamp, so a grid instant missing from either
/// side (an omitted propagation step) produces no event at that instant.
pub fn detect_events(
    serving: &[SignalSample],
    neighbors: &[Vec<SignalSample>],
    thresholds: &EventThresholds,
) -> Result<(Vec<HandoverEvent>, EventStatistics)> {
    if serving.is_empty() {
        return Err(EventError::EmptyServingSeries);
    }
    if neighbors.is_empty() {
        return Err(EventError::NoNeighbors);
    }

    let outcomes: Vec<PairOutcome> = neighbors
        .par_iter()
        .map(|neighbor| scan_pair(serving, neighbor, thresholds))
        .collect();

    let mut events = Vec::new();
    let mut statistics = EventStatistics::default();
    for outcome in outcomes {
        statistics.a4_near_misses += outcome.a4_near_misses;
        statistics.a5_near_misses += outcome.a5_near_misses;
        statistics.d2_near_misses += outcome.d2_near_misses;
        events.extend(outcome.events);
    }

    // Single ordered sink: timestamp, then A5 < A4 < D2, then neighbor id
    events.sort_by(|a, b| {
        a.timestamp
            .cmp(&b.timestamp)
            .then_with(|| a.event_type.ordering_rank().cmp(&b.event_type.ordering_rank()))
            .then_with(|| a.neighbor.satellite_id.cmp(&b.neighbor.satellite_id))
    });

    let mut confidence_sum = 0.0;
    for event in &events {
        statistics.record(event);
        confidence_sum += event.confidence;
    }
    if !events.is_empty() {
        statistics.mean_confidence = confidence_sum / events.len() as f64;
    }

    info!(
        total = statistics.total_events,
        a4 = statistics.a4_count,
        a5 = statistics.a5_count,
        d2 = statistics.d2_count,
        recommended = statistics.recommended_count,
        "event detection complete"
    );

    Ok((events, statistics))
}

fn scan_pair(
    serving: &[SignalSample],
    neighbor: &[SignalSample],
    thresholds: &EventThresholds,
) -> PairOutcome {
    let mut outcome = PairOutcome::default();

    // Timestamp-merge over the two series; both are grid-ordered.
    let mut ni = 0usize;
    for s in serving {
        while ni < neighbor.len() && neighbor[ni].timestamp < s.timestamp {
            ni += 1;
        }
        if ni >= neighbor.len() {
            break;
        }
        let n = &neighbor[ni];
        if n.timestamp != s.timestamp {
            continue;
        }

        // Same-instant triggers of different types all emit
        if let Some(event) = detect_a4(s, n, thresholds, &mut outcome.a4_near_misses) {
            outcome.events.push(event);
        }
        if let Some(event) = detect_a5(s, n, thresholds, &mut outcome.a5_near_misses) {
            outcome.events.push(event);
        }
        if let Some(event) = detect_d2(s, n, thresholds, &mut outcome.d2_near_misses) {
            outcome.events.push(event);
        }
    }

    debug!(
        neighbor = neighbor.first().map(|n| n.satellite_id).unwrap_or(0),
        events = outcome.events.len(),
        "pair scan finished"
    );

    outcome
}

fn event_id(event_type: EventType, serving: &SignalSample, neighbor: &SignalSample) -> String {
    format!(
        "{}_{}_{}_{}",
        event_type,
        serving.satellite_id,
        neighbor.satellite_id,
        serving.timestamp.format("%Y%m%dT%H%M%S")
    )
}

fn base_conditions(
    serving: &SignalSample,
    neighbor: &SignalSample,
) -> BTreeMap<String, serde_json::Value> {
    let mut map = BTreeMap::new();
    map.insert(
        "cross_constellation".to_string(),
        json!(serving.constellation != neighbor.constellation),
    );
    map
}

/// A4: `M_n + O_fn + O_cn - Hys > Thresh`.
fn detect_a4(
    serving: &SignalSample,
    neighbor: &SignalSample,
    thresholds: &EventThresholds,
    near_misses: &mut usize,
) -> Option<HandoverEvent> {
    let neighbor_rsrp = neighbor.rsrp_dbm?;
    let offsets = thresholds.frequency_offset_db + thresholds.cell_offset_db;
    let margin = neighbor_rsrp + offsets
        - thresholds.hysteresis_db
        - thresholds.a4_neighbor_threshold_dbm;

    if margin <= 0.0 {
        if margin > -A4_NEAR_MISS_DB {
            *near_misses += 1;
        }
        return None;
    }

    // Saturates 15 dB above the trigger boundary
    let confidence = (margin / 15.0).clamp(0.0, 1.0);

    let mut conditions = base_conditions(serving, neighbor);
    conditions.insert("neighbor_rsrp_dbm".into(), json!(neighbor_rsrp));
    conditions.insert("threshold_dbm".into(), json!(thresholds.a4_neighbor_threshold_dbm));
    conditions.insert("hysteresis_db".into(), json!(thresholds.hysteresis_db));
    conditions.insert("offsets_db".into(), json!(offsets));
    conditions.insert("margin_db".into(), json!(margin));
    conditions.insert("time_to_trigger_ms".into(), json!(thresholds.time_to_trigger_ms));

    Some(HandoverEvent {
        event_id: event_id(EventType::A4, serving, neighbor),
        event_type: EventType::A4,
        priority: EventPriority::Medium,
        timestamp: serving.timestamp,
        serving: SampleSnapshot::from_sample(serving),
        neighbor: SampleSnapshot::from_sample(neighbor),
        trigger_conditions: conditions,
        description: format!(
            "A4: neighbor {} ({}) at {:.1} dBm exceeds trigger {:.1} dBm",
            neighbor.satellite_id,
            neighbor.constellation,
            neighbor_rsrp,
            thresholds.a4_neighbor_threshold_dbm + thresholds.hysteresis_db - offsets,
        ),
        handover_recommended: confidence > 0.6,
        confidence,
    })
}

/// A5: `M_p + Hys < Thresh1` and `M_n + O_fn + O_cn - Hys > Thresh2`.
fn detect_a5(
    serving: &SignalSample,
    neighbor: &SignalSample,
    thresholds: &EventThresholds,
    near_misses: &mut usize,
) -> Option<HandoverEvent> {
    let serving_rsrp = serving.rsrp_dbm?;
    let neighbor_rsrp = neighbor.rsrp_dbm?;
    let offsets = thresholds.frequency_offset_db + thresholds.cell_offset_db;

    // Serving qualifies when its margin goes negative, the neighbor
    // when its margin goes positive
    let serving_margin =
        serving_rsrp + thresholds.hysteresis_db - thresholds.a5_serving_threshold_dbm;
    let neighbor_margin = neighbor_rsrp + offsets
        - thresholds.hysteresis_db
        - thresholds.a5_neighbor_threshold_dbm;

    let serving_degraded = serving_margin < 0.0;
    let neighbor_good = neighbor_margin > 0.0;

    if !(serving_degraded && neighbor_good) {
        let serving_close = !serving_degraded && serving_margin < A5_NEAR_MISS_DB;
        let neighbor_close = !neighbor_good && neighbor_margin > -A5_NEAR_MISS_DB;
        if serving_close || neighbor_close {
            *near_misses += 1;
        }
        return None;
    }

    let rsrp_difference = neighbor_rsrp - serving_rsrp;
    // 25 dB of separation saturates the score
    let confidence = (rsrp_difference / 25.0).clamp(0.0, 1.0);

    let mut conditions = base_conditions(serving, neighbor);
    conditions.insert("serving_rsrp_dbm".into(), json!(serving_rsrp));
    conditions.insert("neighbor_rsrp_dbm".into(), json!(neighbor_rsrp));
    conditions.insert("serving_threshold_dbm".into(), json!(thresholds.a5_serving_threshold_dbm));
    conditions.insert("neighbor_threshold_dbm".into(), json!(thresholds.a5_neighbor_threshold_dbm));
    conditions.insert("hysteresis_db".into(), json!(thresholds.hysteresis_db));
    conditions.insert("serving_margin_db".into(), json!(serving_margin));
    conditions.insert("neighbor_margin_db".into(), json!(neighbor_margin));
    conditions.insert("rsrp_difference_db".into(), json!(rsrp_difference));
    conditions.insert("time_to_trigger_ms".into(), json!(thresholds.time_to_trigger_ms));

    Some(HandoverEvent {
        event_id: event_id(EventType::A5, serving, neighbor),
        event_type: EventType::A5,
        priority: EventPriority::High,
        timestamp: serving.timestamp,
        serving: SampleSnapshot::from_sample(serving),
        neighbor: SampleSnapshot::from_sample(neighbor),
        trigger_conditions: conditions,
        description: format!(
            "A5: serving {} degraded to {:.1} dBm while neighbor {} holds {:.1} dBm",
            serving.satellite_id, serving_rsrp, neighbor.satellite_id, neighbor_rsrp,
        ),
        // A5 is the hard handover case; always recommend
        handover_recommended: true,
        confidence,
    })
}

/// D2: `d_serving - Hys > Thresh1` and `d_neighbor + Hys < Thresh2`,
/// both in meters.
fn detect_d2(
    serving: &SignalSample,
    neighbor: &SignalSample,
    thresholds: &EventThresholds,
    near_misses: &mut usize,
) -> Option<HandoverEvent> {
    let serving_distance_m = serving.range_km * 1000.0;
    let neighbor_distance_m = neighbor.range_km * 1000.0;

    let serving_margin =
        serving_distance_m - thresholds.distance_hysteresis_m - thresholds.d2_serving_distance_m;
    let neighbor_margin =
        thresholds.d2_neighbor_distance_m - neighbor_distance_m - thresholds.distance_hysteresis_m;

    let serving_far = serving_margin > 0.0;
    let neighbor_near = neighbor_margin > 0.0;

    if !(serving_far && neighbor_near) {
        let serving_close = !serving_far && serving_margin > -D2_NEAR_MISS_M;
        let neighbor_close = !neighbor_near && neighbor_margin > -D2_NEAR_MISS_M;
        if serving_close || neighbor_close {
            *near_misses += 1;
        }
        return None;
    }

    let advantage_m = serving_distance_m - neighbor_distance_m;
    // 2000 km of advantage saturates the score
    let confidence = (advantage_m / 2_000_000.0).clamp(0.0, 1.0);

    let mut conditions = base_conditions(serving, neighbor);
    conditions.insert("serving_distance_m".into(), json!(serving_distance_m));
    conditions.insert("neighbor_distance_m".into(), json!(neighbor_distance_m));
    conditions.insert("serving_threshold_m".into(), json!(thresholds.d2_serving_distance_m));
    conditions.insert("neighbor_threshold_m".into(), json!(thresholds.d2_neighbor_distance_m));
    conditions.insert("distance_hysteresis_m".into(), json!(thresholds.distance_hysteresis_m));
    conditions.insert("distance_advantage_m".into(), json!(advantage_m));

    Some(HandoverEvent {
        event_id: event_id(EventType::D2, serving, neighbor),
        event_type: EventType::D2,
        priority: EventPriority::Low,
        timestamp: serving.timestamp,
        serving: SampleSnapshot::from_sample(serving),
        neighbor: SampleSnapshot::from_sample(neighbor),
        trigger_conditions: conditions,
        description: format!(
            "D2: serving {} at {:.0} km out of range while neighbor {} sits at {:.0} km",
            serving.satellite_id,
            serving_distance_m / 1000.0,
            neighbor.satellite_id,
            neighbor_distance_m / 1000.0,
        ),
        handover_recommended: confidence > 0.4,
        confidence,
    })
}
