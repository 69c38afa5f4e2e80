//! Per-satellite visibility analysis over the sampling grid.
//!
//! Elevation is recomputed here from the stored ECI state rather than
//! trusted from the propagation layer; a disagreement beyond the
//! tolerance is a warning, not an error, and the recomputed value wins.

use crate::{ConstellationParams, VisibilityAnalysis, ELEVATION_CROSS_CHECK_TOLERANCE_DEG};
use orbit_propagation::{transforms, Observer, PositionSample};
use signal_budget::{estimate_rsrp, SignalContext};
use tracing::warn;

/// Outcome of one analysis run, with the cross-check counter for the
/// filter statistics.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    pub analysis: VisibilityAnalysis,
    pub cross_check_warnings: usize,
}

/// Walk one satellite's sample series and summarize its visibility
/// against the constellation mask. A sample counts as visible only when
/// its elevation strictly exceeds the mask; grazing contact at exactly
/// the mask stays invisible.
pub fn analyze(
    satellite_id: u64,
    samples: &[PositionSample],
    observer: &Observer,
    params: &ConstellationParams,
    step_s: u32,
    signal_ctx: &SignalContext,
) -> AnalysisOutcome {
    let step_min = step_s as f64 / 60.0;

    let mut total_visible_min = 0.0;
    let mut max_elevation = -90.0f64;
    let mut best_elevation_time = None;
    let mut passes: u32 = 0;
    let mut pass_durations: Vec<f64> = Vec::new();
    let mut current_pass_min: Option<f64> = None;
    let mut rsrp_sum = 0.0;
    let mut rsrp_count = 0usize;
    let mut cross_check_warnings = 0usize;

    for sample in samples {
        let recomputed = transforms::look_angles(
            observer,
            &sample.position_eci(),
            &sample.velocity_eci(),
            sample.timestamp,
        );
        let elevation = recomputed.elevation_deg;

        if (elevation - sample.elevation_deg).abs() > ELEVATION_CROSS_CHECK_TOLERANCE_DEG {
            cross_check_warnings += 1;
            warn!(
                satellite_id,
                recomputed = elevation,
                upstream = sample.elevation_deg,
                "elevation cross-check disagreement"
            );
        }

        let visible = elevation > params.elevation_mask_deg;

        if visible {
            if elevation > max_elevation {
                max_elevation = elevation;
                best_elevation_time = Some(sample.timestamp);
            }
            total_visible_min += step_min;

            if let Some(rsrp) = estimate_rsrp(
                elevation,
                recomputed.range_km,
                sample.altitude_km,
                params.constellation,
                signal_ctx,
            ) {
                rsrp_sum += rsrp;
                rsrp_count += 1;
            }

            current_pass_min = Some(current_pass_min.unwrap_or(0.0) + step_min);
        } else if let Some(duration) = current_pass_min.take() {
            passes += 1;
            pass_durations.push(duration);
        }
    }

    // A pass still open at the end of the window counts
    if let Some(duration) = current_pass_min.take() {
        passes += 1;
        pass_durations.push(duration);
    }

    let avg_pass_duration_min = if pass_durations.is_empty() {
        0.0
    } else {
        pass_durations.iter().sum::<f64>() / pass_durations.len() as f64
    };

    let signal_strength_estimate_dbm = if rsrp_count > 0 {
        Some(rsrp_sum / rsrp_count as f64)
    } else {
        None
    };

    AnalysisOutcome {
        analysis: VisibilityAnalysis {
            satellite_id,
            total_visible_time_min: total_visible_min,
            max_elevation_deg: if passes > 0 { max_elevation } else { -90.0 },
            visible_passes_count: passes,
            avg_pass_duration_min,
            best_elevation_time,
            signal_strength_estimate_dbm,
        },
        cross_check_warnings,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use orbit_propagation::transforms::{ecef_to_eci, geodetic_to_ecef, gmst_rad};
    use orbit_propagation::Constellation;

    /// Build a sample whose geometry places the satellite at the given
    /// elevation as seen from the observer, by construction.
    fn sample_at_elevation(observer: &Observer, elevation_deg: f64, minute: i64) -> PositionSample {
        let time = Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap()
            + chrono::Duration::seconds(minute * 30);
        // Walk north from the observer until the look angle matches
        let mut lo = 0.0f64;
        let mut hi = 45.0f64;
        let mut eci = nalgebra::Vector3::zeros();
        for _ in 0..60 {
            let mid = (lo + hi) / 2.0;
            let ecef = geodetic_to_ecef(observer.latitude_deg + mid, observer.longitude_deg, 550.0);
            eci = ecef_to_eci(&ecef, gmst_rad(time));
            let la = transforms::look_angles(observer, &eci, &nalgebra::Vector3::zeros(), time);
            if la.elevation_deg > elevation_deg {
                lo = mid;
            } else {
                hi = mid;
            }
        }
        let la = transforms::look_angles(observer, &eci, &nalgebra::Vector3::zeros(), time);
        let sub = transforms::eci_to_geodetic(&eci, time);
        PositionSample {
            timestamp: time,
            position_x: eci.x,
            position_y: eci.y,
            position_z: eci.z,
            velocity_x: 0.0,
            velocity_y: 0.0,
            velocity_z: 7.6,
            latitude_deg: sub.latitude_deg,
            longitude_deg: sub.longitude_deg,
            altitude_km: sub.altitude_km,
            elevation_deg: la.elevation_deg,
            azimuth_deg: la.azimuth_deg,
            range_km: la.range_km,
            range_rate_km_s: 0.0,
        }
    }

    fn run(samples: &[PositionSample]) -> VisibilityAnalysis {
        analyze(
            1,
            samples,
            &Observer::default(),
            &ConstellationParams::starlink(),
            30,
            &SignalContext::default(),
        )
        .analysis
    }

    #[test]
    fn grazing_contact_at_mask_is_not_visible() {
        let observer = Observer::default();
        let samples = vec![sample_at_elevation(&observer, 5.0, 0)];
        // Pin the mask to this sample's exact elevation: strictly-above
        // means a grazing contact at the mask itself stays invisible
        let mut params = ConstellationParams::starlink();
        params.elevation_mask_deg = samples[0].elevation_deg;
        let outcome = analyze(1, &samples, &observer, &params, 30, &SignalContext::default());
        assert_eq!(outcome.analysis.visible_passes_count, 0);
        assert_eq!(outcome.analysis.total_visible_time_min, 0.0);
    }

    #[test]
    fn above_mask_accumulates_time_and_passes() {
        let observer = Observer::default();
        let samples: Vec<PositionSample> = (0..4)
            .map(|i| sample_at_elevation(&observer, 20.0 + i as f64, i))
            .collect();
        let analysis = run(&samples);
        assert_eq!(analysis.visible_passes_count, 1);
        assert!((analysis.total_visible_time_min - 2.0).abs() < 1e-9);
        assert!(analysis.max_elevation_deg > 22.0);
        assert!(analysis.signal_strength_estimate_dbm.is_some());
    }

    #[test]
    fn dips_below_mask_split_passes() {
        let observer = Observer::default();
        let samples = vec![
            sample_at_elevation(&observer, 15.0, 0),
            sample_at_elevation(&observer, 2.0, 1),
            sample_at_elevation(&observer, 18.0, 2),
            sample_at_elevation(&observer, 25.0, 3),
        ];
        let analysis = run(&samples);
        assert_eq!(analysis.visible_passes_count, 2);
        assert!((analysis.avg_pass_duration_min - 0.75).abs() < 1e-9);
    }

    #[test]
    fn unknown_constellation_yields_no_signal_estimate() {
        let observer = Observer::default();
        let samples = vec![sample_at_elevation(&observer, 30.0, 0)];
        let mut params = ConstellationParams::starlink();
        params.constellation = Constellation::Other;
        let outcome = analyze(2, &samples, &observer, &params, 30, &SignalContext::default());
        assert_eq!(outcome.analysis.visible_passes_count, 1);
        assert!(outcome.analysis.signal_strength_estimate_dbm.is_none());
    }

    #[test]
    fn best_elevation_timestamp_tracks_peak() {
        let observer = Observer::default();
        let samples = vec![
            sample_at_elevation(&observer, 10.0, 0),
            sample_at_elevation(&observer, 40.0, 1),
            sample_at_elevation(&observer, 12.0, 2),
        ];
        let analysis = run(&samples);
        assert_eq!(analysis.best_elevation_time, Some(samples[1].timestamp));
    }
}
