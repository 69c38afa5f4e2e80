//! Stage-one geographic scoring and stage-six composite scoring.

use crate::{
    CandidateScore, ConstellationParams, ScoringRationale, VisibilityAnalysis, W_CONTINUITY,
    W_ELEVATION, W_SIGNAL, W_VISIBILITY,
};
use orbit_propagation::{CatalogRecord, Constellation, Observer};

/// Geographic relevance composite for the stage-one gate.
///
/// Returns `None` when the orbit's inclination cannot cover the observer
/// latitude at all. Otherwise the composite blends RAAN-longitude
/// relevance (lenient: LEO RAAN drifts across all longitudes, floor 40),
/// inclination closeness, and altitude closeness to the constellation
/// optimum.
pub fn geographic_score(
    record: &CatalogRecord,
    observer: &Observer,
    params: &ConstellationParams,
) -> Option<f64> {
    if record.inclination_deg <= observer.latitude_deg.abs() {
        return None;
    }

    let mut longitude_diff = (record.raan_deg - observer.longitude_deg).abs() % 360.0;
    if longitude_diff > 180.0 {
        longitude_diff = 360.0 - longitude_diff;
    }
    let raan_relevance = (100.0 - longitude_diff * 0.5).max(40.0);

    // Constellations without a registered optimum take a neutral score;
    // they still have to clear the composite gate on RAAN relevance.
    let (inclination_score, altitude_score) = if params.constellation == Constellation::Other {
        (50.0, 50.0)
    } else {
        (
            100.0 - (record.inclination_deg - params.optimal_inclination_deg).abs() * 2.0,
            100.0 - (record.apogee_km - params.optimal_altitude_km).abs() * params.altitude_score_slope,
        )
    };

    Some(raan_relevance * 0.4 + inclination_score * 0.35 + altitude_score * 0.25)
}

/// Stage-six composite over the five sub-scores. The geographic
/// composite from stage one rides along unweighted; it already gated
/// entry into the pipeline.
pub fn final_score(
    record: &CatalogRecord,
    geographic: f64,
    visibility: VisibilityAnalysis,
) -> CandidateScore {
    let visibility_score = (visibility.total_visible_time_min / 30.0 * 100.0).min(100.0);
    let elevation_score = (visibility.max_elevation_deg * 2.0).clamp(0.0, 100.0);
    let signal_score = visibility
        .signal_strength_estimate_dbm
        .map(|rsrp| ((rsrp + 120.0) * 2.0).clamp(0.0, 100.0))
        .unwrap_or(0.0);
    let continuity_score = (visibility.visible_passes_count as f64 * 20.0).min(100.0);

    let total_score = visibility_score * W_VISIBILITY
        + elevation_score * W_ELEVATION
        + signal_score * W_SIGNAL
        + continuity_score * W_CONTINUITY;

    let scoring_rationale = ScoringRationale {
        visibility_analysis: format!(
            "{:.1} min visible, max elevation {:.1} deg",
            visibility.total_visible_time_min, visibility.max_elevation_deg
        ),
        signal_analysis: match visibility.signal_strength_estimate_dbm {
            Some(rsrp) => format!("estimated RSRP {:.1} dBm", rsrp),
            None => "no RSRP estimate available".to_string(),
        },
        continuity_analysis: format!(
            "{} passes, average {:.1} min",
            visibility.visible_passes_count, visibility.avg_pass_duration_min
        ),
    };

    CandidateScore {
        satellite_id: record.norad_id,
        name: record.name.clone(),
        constellation: record.constellation,
        raan_deg: record.raan_deg,
        total_score,
        geographic_relevance_score: geographic,
        orbital_characteristics_score: elevation_score,
        signal_quality_score: signal_score,
        temporal_distribution_score: continuity_score,
        visibility_compliance_score: visibility_score,
        scoring_rationale,
        is_selected: false,
        visibility,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use orbit_propagation::Constellation;

    fn record(inclination: f64, raan: f64, apogee: f64) -> CatalogRecord {
        CatalogRecord {
            norad_id: 1,
            name: "STARLINK-1".to_string(),
            constellation: Constellation::Starlink,
            tle_line1: String::new(),
            tle_line2: String::new(),
            epoch: Utc.with_ymd_and_hms(2025, 6, 1, 0, 0, 0).unwrap(),
            mean_motion: 15.05,
            inclination_deg: inclination,
            raan_deg: raan,
            eccentricity: 0.0001,
            mean_anomaly_deg: 0.0,
            apogee_km: apogee,
            perigee_km: apogee - 2.0,
        }
    }

    fn analysis(visible_min: f64, max_elev: f64, passes: u32, rsrp: Option<f64>) -> VisibilityAnalysis {
        VisibilityAnalysis {
            satellite_id: 1,
            total_visible_time_min: visible_min,
            max_elevation_deg: max_elev,
            visible_passes_count: passes,
            avg_pass_duration_min: if passes > 0 { visible_min / passes as f64 } else { 0.0 },
            best_elevation_time: None,
            signal_strength_estimate_dbm: rsrp,
        }
    }

    #[test]
    fn inclination_gate_rejects_uncovering_orbits() {
        let observer = Observer {
            latitude_deg: 85.0,
            longitude_deg: 0.0,
            altitude_m: 0.0,
        };
        // Starlink shell at 53 degrees cannot reach an 85 degree site
        let score = geographic_score(&record(53.0, 100.0, 550.0), &observer, &ConstellationParams::starlink());
        assert!(score.is_none());

        // A near-polar OneWeb orbit can
        let score = geographic_score(&record(87.4, 100.0, 1200.0), &observer, &ConstellationParams::oneweb());
        assert!(score.is_some());
    }

    #[test]
    fn on_optimum_orbit_scores_high() {
        let observer = Observer::default();
        let score = geographic_score(
            &record(53.0, observer.longitude_deg, 550.0),
            &observer,
            &ConstellationParams::starlink(),
        )
        .unwrap();
        assert!(score > 90.0, "ideal orbit score {}", score);
    }

    #[test]
    fn raan_relevance_floors_at_40() {
        let observer = Observer::default();
        let near = geographic_score(
            &record(53.0, observer.longitude_deg, 550.0),
            &observer,
            &ConstellationParams::starlink(),
        )
        .unwrap();
        let far = geographic_score(
            &record(53.0, observer.longitude_deg + 180.0, 550.0),
            &observer,
            &ConstellationParams::starlink(),
        )
        .unwrap();
        // 0.4 * (100 - 40) spread between best and worst RAAN alignment
        assert!((near - far - 24.0).abs() < 1e-6, "spread {}", near - far);
    }

    #[test]
    fn off_altitude_orbit_loses_score() {
        let observer = Observer::default();
        let on = geographic_score(&record(53.0, 121.0, 550.0), &observer, &ConstellationParams::starlink()).unwrap();
        let off = geographic_score(&record(53.0, 121.0, 900.0), &observer, &ConstellationParams::starlink()).unwrap();
        assert!(on > off);
    }

    #[test]
    fn final_score_blends_weights() {
        let score = final_score(&record(53.0, 121.0, 550.0), 75.0, analysis(30.0, 50.0, 5, Some(-60.0)));
        // visibility 100, elevation 100, signal 100, continuity 100
        assert!((score.total_score - 100.0).abs() < 1e-9);
        assert_eq!(score.geographic_relevance_score, 75.0);
        assert!(!score.is_selected);
    }

    #[test]
    fn missing_rsrp_zeroes_the_signal_component() {
        let with = final_score(&record(53.0, 121.0, 550.0), 70.0, analysis(15.0, 30.0, 3, Some(-60.0)));
        let without = final_score(&record(53.0, 121.0, 550.0), 70.0, analysis(15.0, 30.0, 3, None));
        assert!((with.total_score - without.total_score - W_SIGNAL * 100.0).abs() < 1e-9);
    }

    #[test]
    fn rationale_mentions_the_numbers() {
        let score = final_score(&record(53.0, 121.0, 550.0), 70.0, analysis(22.5, 41.0, 4, Some(-61.5)));
        assert!(score.scoring_rationale.visibility_analysis.contains("22.5"));
        assert!(score.scoring_rationale.signal_analysis.contains("-61.5"));
        assert!(score.scoring_rationale.continuity_analysis.contains('4'));
    }
}
