//! NTN downlink budget.
//!
//! Free-space path loss per ITU-R P.525, gaseous attenuation composed
//! from the P.676 oxygen and water-vapour terms over a P.618 effective
//! path, cloud/fog from P.840, and a P.681-style deterministic fading
//! margin. No random terms anywhere: the same geometry always produces
//! the same budget.

use crate::constants::{
    AtmosphereParams, ConstellationRf, TerminalProfile, DOPPLER_LIMIT_HZ, NR_20MHZ_SUBCARRIERS,
    RSRP_MAX_DBM, RSRP_MIN_DBM, RSRQ_MAX_DB, RSRQ_MIN_DB, SINR_MAX_DB, SINR_MIN_DB,
    THERMAL_NOISE_DBM_HZ,
};
use orbit_propagation::transforms::SPEED_OF_LIGHT_KM_S;

/// Elevation floor used when evaluating the low-elevation path extension
/// for geometry at or below the horizon. Keeps the budget finite so the
/// sample can be clamped and flagged instead of dropped.
const SUB_HORIZON_ELEVATION_DEG: f64 = 0.5;

/// Free-space path loss in dB (ITU-R P.525 form used throughout the
/// processing chain: frequency in GHz, distance in km).
pub fn free_space_path_loss_db(frequency_ghz: f64, distance_km: f64) -> f64 {
    32.45 + 20.0 * frequency_ghz.log10() + 20.0 * distance_km.max(1e-3).log10()
}

/// Effective atmospheric path length in km. 8 km of effective atmosphere
/// stretched by 1/sin(elevation) for elevations of 5 degrees and up, with
/// the documented low-elevation extension below that.
fn atmospheric_path_km(elevation_deg: f64) -> f64 {
    const EFFECTIVE_ATMOSPHERE_KM: f64 = 8.0;
    if elevation_deg >= 5.0 {
        EFFECTIVE_ATMOSPHERE_KM / elevation_deg.to_radians().sin()
    } else {
        let clamped = elevation_deg.max(SUB_HORIZON_ELEVATION_DEG);
        EFFECTIVE_ATMOSPHERE_KM / 5.0f64.to_radians().sin() * (5.0 / clamped)
    }
}

/// Oxygen specific attenuation, dB/km (ITU-R P.676 band fit).
fn oxygen_specific_db_km(frequency_ghz: f64) -> f64 {
    if frequency_ghz < 15.0 {
        0.008
    } else if frequency_ghz < 25.0 {
        0.012 + (frequency_ghz - 15.0) * 0.002
    } else {
        0.032
    }
}

/// Water-vapour specific attenuation, dB/km (ITU-R P.676 band fit scaled
/// by the surface density).
fn water_vapor_specific_db_km(frequency_ghz: f64, density_g_m3: f64) -> f64 {
    if frequency_ghz < 15.0 {
        density_g_m3 * 0.0006
    } else if frequency_ghz < 25.0 {
        density_g_m3 * (0.001 + (frequency_ghz - 15.0) * 0.0002)
    } else {
        density_g_m3 * 0.003
    }
}

/// Cloud and fog attenuation, dB (ITU-R P.840 low-elevation weighting).
fn cloud_loss_db(elevation_deg: f64) -> f64 {
    if elevation_deg < 30.0 {
        0.1 / elevation_deg.max(SUB_HORIZON_ELEVATION_DEG).to_radians().sin()
    } else {
        0.05
    }
}

/// Total gaseous plus cloud attenuation along the slant path, dB.
pub fn atmospheric_loss_db(
    elevation_deg: f64,
    frequency_ghz: f64,
    atmosphere: &AtmosphereParams,
) -> f64 {
    let path_km = atmospheric_path_km(elevation_deg);
    let oxygen = oxygen_specific_db_km(frequency_ghz) * path_km;
    let water = water_vapor_specific_db_km(frequency_ghz, atmosphere.water_vapor_density_g_m3)
        * path_km;
    oxygen + water + cloud_loss_db(elevation_deg)
}

/// Deterministic fading margin, dB. Multipath eases with orbit altitude
/// over the LEO band [400, 2000] km; shadowing eases with elevation.
/// Statistical shape from ITU-R P.681 without any random draw.
pub fn deterministic_fading_db(
    altitude_km: f64,
    elevation_deg: f64,
    atmosphere: &AtmosphereParams,
) -> f64 {
    let height_factor = ((altitude_km - 400.0) / 1600.0).clamp(0.1, 1.0);
    let elevation_factor = elevation_deg.max(0.0).to_radians().sin();

    let multipath = atmosphere.multipath_std_db * (1.0 - height_factor * 0.3);
    let shadowing = atmosphere.shadowing_std_db * (1.0 - elevation_factor * 0.5);
    multipath + shadowing
}

/// Full downlink budget at one instant.
#[derive(Debug, Clone, Copy)]
pub struct LinkBudgetBreakdown {
    pub fspl_db: f64,
    pub atmospheric_loss_db: f64,
    pub fading_db: f64,
    pub received_power_dbm: f64,
    pub rsrp_dbm: f64,
    /// True when the raw RSRP fell outside the working band and was
    /// clamped.
    pub rsrp_clamped: bool,
}

/// Evaluate the received power chain and RSRP for one geometry sample.
pub fn evaluate(
    elevation_deg: f64,
    range_km: f64,
    altitude_km: f64,
    rf: &ConstellationRf,
    terminal: &TerminalProfile,
    atmosphere: &AtmosphereParams,
) -> LinkBudgetBreakdown {
    let fspl_db = free_space_path_loss_db(rf.frequency_ghz, range_km);
    let atm_db = atmospheric_loss_db(elevation_deg, rf.frequency_ghz, atmosphere);
    let fading_db = deterministic_fading_db(altitude_km, elevation_deg, atmosphere);

    // dBW to dBm conversion folded in as +30
    let received_power_dbm = rf.eirp_dbw + terminal.antenna_gain_dbi
        - fspl_db
        - atm_db
        - terminal.implementation_loss_db
        - terminal.polarization_loss_db
        - terminal.pointing_loss_db
        + 30.0;

    let raw_rsrp = received_power_dbm - 10.0 * (NR_20MHZ_SUBCARRIERS as f64).log10() - fading_db;

    // No line of sight below the horizon: the Earth blocks the path, so
    // the sample reports the band floor and is flagged.
    let blocked = elevation_deg <= 0.0;
    let rsrp_dbm = if blocked {
        RSRP_MIN_DBM
    } else {
        raw_rsrp.clamp(RSRP_MIN_DBM, RSRP_MAX_DBM)
    };

    LinkBudgetBreakdown {
        fspl_db,
        atmospheric_loss_db: atm_db,
        fading_db,
        received_power_dbm,
        rsrp_dbm,
        rsrp_clamped: blocked || raw_rsrp != rsrp_dbm,
    }
}

/// Thermal noise floor over the terminal bandwidth, dBm.
pub fn noise_floor_dbm(terminal: &TerminalProfile) -> f64 {
    THERMAL_NOISE_DBM_HZ + 10.0 * terminal.bandwidth_hz.log10() + terminal.noise_figure_db
}

/// Co-channel interference allowance, dB. Tighter geometry above 30
/// degrees sees less of the neighbor beams.
pub fn interference_loss_db(elevation_deg: f64) -> f64 {
    if elevation_deg >= 30.0 {
        3.0
    } else {
        5.0
    }
}

/// SINR from RSRP, clamped to the working band. Returns (value, clamped).
pub fn sinr_db(rsrp_dbm: f64, elevation_deg: f64, terminal: &TerminalProfile) -> (f64, bool) {
    let raw = rsrp_dbm - noise_floor_dbm(terminal) - interference_loss_db(elevation_deg);
    let clamped = raw.clamp(SINR_MIN_DB, SINR_MAX_DB);
    (clamped, raw != clamped)
}

/// RSRQ estimate from SINR and the configured utilization baseline,
/// clamped to the 3GPP TS 36.214 reporting range. At high SINR this
/// converges to -10*log10(12*utilization).
pub fn rsrq_db(sinr_db: f64, terminal: &TerminalProfile) -> f64 {
    let sinr_lin = 10f64.powf(sinr_db / 10.0);
    let raw = -10.0 * (12.0 * (terminal.utilization_baseline + 1.0 / sinr_lin)).log10();
    raw.clamp(RSRQ_MIN_DB, RSRQ_MAX_DB)
}

/// Doppler shift in Hz from the slant-range rate. Approaching geometry
/// (negative range rate) produces a positive shift. Returns the shift
/// and whether it exceeds the NTN budget.
pub fn doppler_shift_hz(frequency_ghz: f64, range_rate_km_s: f64) -> (f64, bool) {
    let shift = -frequency_ghz * 1e9 * range_rate_km_s / SPEED_OF_LIGHT_KM_S;
    (shift, shift.abs() > DOPPLER_LIMIT_HZ)
}

/// One-way propagation delay in milliseconds.
pub fn propagation_delay_ms(range_km: f64) -> f64 {
    range_km / SPEED_OF_LIGHT_KM_S * 1000.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::rf_parameters;
    use approx::assert_relative_eq;
    use orbit_propagation::Constellation;

    fn starlink() -> ConstellationRf {
        rf_parameters(Constellation::Starlink).unwrap()
    }

    #[test]
    fn fspl_follows_p525_form() {
        // 12 GHz at 1000 km: 32.45 + 20log10(12) + 60
        let fspl = free_space_path_loss_db(12.0, 1000.0);
        assert_relative_eq!(fspl, 32.45 + 20.0 * 12.0f64.log10() + 60.0, epsilon = 1e-9);
    }

    #[test]
    fn fspl_grows_with_range() {
        assert!(free_space_path_loss_db(12.0, 2000.0) > free_space_path_loss_db(12.0, 600.0));
    }

    #[test]
    fn atmospheric_loss_grows_toward_horizon() {
        let atm = AtmosphereParams::default();
        let zenith = atmospheric_loss_db(90.0, 20.0, &atm);
        let mid = atmospheric_loss_db(30.0, 20.0, &atm);
        let low = atmospheric_loss_db(5.0, 20.0, &atm);
        let grazing = atmospheric_loss_db(1.0, 20.0, &atm);
        assert!(zenith < mid && mid < low && low < grazing);
    }

    #[test]
    fn low_elevation_extension_is_continuous_at_5_degrees() {
        let atm = AtmosphereParams::default();
        let above = atmospheric_loss_db(5.0, 12.0, &atm);
        let below = atmospheric_loss_db(4.999, 12.0, &atm);
        assert!((above - below).abs() < 0.2, "jump at 5 deg: {} vs {}", above, below);
    }

    #[test]
    fn ka_band_sees_more_gas_loss_than_ku() {
        let atm = AtmosphereParams::default();
        assert!(atmospheric_loss_db(45.0, 20.0, &atm) > atmospheric_loss_db(45.0, 12.0, &atm));
    }

    #[test]
    fn rsrp_within_working_band_at_typical_geometry() {
        let b = evaluate(45.0, 600.0, 550.0, &starlink(), &TerminalProfile::default(), &AtmosphereParams::default());
        assert!(b.rsrp_dbm >= RSRP_MIN_DBM && b.rsrp_dbm <= RSRP_MAX_DBM);
        assert!(!b.rsrp_clamped, "typical geometry should not clamp: {}", b.rsrp_dbm);
    }

    #[test]
    fn sub_horizon_geometry_clamps_to_floor() {
        let b = evaluate(-12.0, 4000.0, 550.0, &starlink(), &TerminalProfile::default(), &AtmosphereParams::default());
        assert_eq!(b.rsrp_dbm, RSRP_MIN_DBM);
        assert!(b.rsrp_clamped);
    }

    #[test]
    fn higher_elevation_improves_rsrp() {
        let t = TerminalProfile::default();
        let atm = AtmosphereParams::default();
        let high = evaluate(60.0, 600.0, 550.0, &starlink(), &t, &atm);
        let low = evaluate(8.0, 1700.0, 550.0, &starlink(), &t, &atm);
        assert!(high.rsrp_dbm > low.rsrp_dbm);
    }

    #[test]
    fn noise_floor_matches_itu_form() {
        let floor = noise_floor_dbm(&TerminalProfile::default());
        // -174 + 10log10(20e6) + 7
        assert_relative_eq!(floor, -174.0 + 73.0103, epsilon = 0.01);
    }

    #[test]
    fn interference_steps_at_30_degrees() {
        assert_eq!(interference_loss_db(30.0), 3.0);
        assert_eq!(interference_loss_db(29.9), 5.0);
    }

    #[test]
    fn rsrq_saturates_at_utilization_limit() {
        let t = TerminalProfile::default();
        let high = rsrq_db(30.0, &t);
        assert_relative_eq!(high, -10.0 * (12.0 * t.utilization_baseline).log10(), epsilon = 0.05);
        // Collapsing SINR drags RSRQ toward the reporting floor
        let low = rsrq_db(-10.0, &t);
        assert!(low < high);
        assert!(low >= RSRQ_MIN_DB);
    }

    #[test]
    fn doppler_sign_and_flagging() {
        // Approaching at 7 km/s on Ku: positive shift, beyond the budget
        let (shift, flagged) = doppler_shift_hz(12.0, -7.0);
        assert!(shift > 0.0);
        assert!(flagged);

        // Slow drift stays inside the budget
        let (small, ok) = doppler_shift_hz(12.0, 0.5);
        assert!(small < 0.0);
        assert!(!ok);
    }

    #[test]
    fn delay_for_600_km_is_about_2_ms() {
        assert_relative_eq!(propagation_delay_ms(600.0), 2.0014, epsilon = 0.01);
    }
}
