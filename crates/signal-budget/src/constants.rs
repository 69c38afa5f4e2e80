//! Versioned physics and RF constants.
//!
//! Every constellation parameter carries the public filing it was taken
//! from. The version tag is stamped into each artifact so downstream
//! consumers can detect a constants change between runs. Values are
//! loaded once at startup and never mutated during a run.

use orbit_propagation::Constellation;
use serde::{Deserialize, Serialize};

/// Bumped whenever a value in this module changes.
pub const PHYSICS_CONSTANTS_VERSION: &str = "ntn-phys-2025.2";

/// Thermal noise floor density, dBm/Hz (ITU-R P.372).
pub const THERMAL_NOISE_DBM_HZ: f64 = -174.0;

/// 100 resource blocks x 12 subcarriers for a 20 MHz NR carrier
/// (3GPP TS 38.214).
pub const NR_20MHZ_SUBCARRIERS: u32 = 1200;

/// 3GPP TS 36.214 RSRQ reporting range.
pub const RSRQ_MIN_DB: f64 = -19.5;
pub const RSRQ_MAX_DB: f64 = -3.0;

/// Working RSRP band; values outside are clamped and flagged.
pub const RSRP_MIN_DBM: f64 = -150.0;
pub const RSRP_MAX_DBM: f64 = -50.0;

/// Working SINR band; values outside are clamped and flagged.
pub const SINR_MIN_DB: f64 = -10.0;
pub const SINR_MAX_DB: f64 = 30.0;

/// NTN LEO Doppler budget; larger shifts are flagged for the radio layer.
pub const DOPPLER_LIMIT_HZ: f64 = 50_000.0;

/// Downlink RF parameters for one constellation, with provenance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConstellationRf {
    pub eirp_dbw: f64,
    pub frequency_ghz: f64,
    pub antenna_gain_min_dbi: f64,
    pub antenna_gain_max_dbi: f64,
    pub antenna_gain_typical_dbi: f64,
    /// Public filing the numbers were taken from.
    pub source: String,
}

/// Registered downlink parameters. Unknown constellations have no entry;
/// their samples are emitted degraded rather than guessed at.
pub fn rf_parameters(constellation: Constellation) -> Option<ConstellationRf> {
    match constellation {
        Constellation::Starlink => Some(ConstellationRf {
            eirp_dbw: 37.5,
            frequency_ghz: 12.0,
            antenna_gain_min_dbi: 0.0,
            antenna_gain_max_dbi: 25.0,
            antenna_gain_typical_dbi: 15.0,
            source: "SpaceX FCC Filing SAT-MOD-20190830-00087".to_string(),
        }),
        Constellation::Oneweb => Some(ConstellationRf {
            eirp_dbw: 40.0,
            frequency_ghz: 20.0,
            antenna_gain_min_dbi: 15.0,
            antenna_gain_max_dbi: 35.0,
            antenna_gain_typical_dbi: 25.0,
            source: "OneWeb ITU Filing API/CR/138A".to_string(),
        }),
        Constellation::Other => None,
    }
}

/// Ground terminal RF profile.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct TerminalProfile {
    pub antenna_gain_dbi: f64,
    pub noise_figure_db: f64,
    pub implementation_loss_db: f64,
    pub polarization_loss_db: f64,
    pub pointing_loss_db: f64,
    pub bandwidth_hz: f64,
    /// Downlink resource utilization assumed for the RSRQ estimate.
    pub utilization_baseline: f64,
}

impl Default for TerminalProfile {
    fn default() -> Self {
        Self {
            antenna_gain_dbi: 25.0,
            noise_figure_db: 7.0,
            implementation_loss_db: 2.0,
            polarization_loss_db: 0.5,
            pointing_loss_db: 0.3,
            bandwidth_hz: 20e6,
            utilization_baseline: 0.85,
        }
    }
}

/// Local atmosphere inputs for the ITU-R P.676 / P.840 terms.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct AtmosphereParams {
    /// Surface water-vapour density, g/m3. The default is the annual
    /// average for the humid subtropical reference site the default
    /// observer sits at, not the drier ITU-R global mean.
    pub water_vapor_density_g_m3: f64,
    /// P.681 LEO channel fading inputs.
    pub multipath_std_db: f64,
    pub shadowing_std_db: f64,
}

impl Default for AtmosphereParams {
    fn default() -> Self {
        Self {
            water_vapor_density_g_m3: 15.0,
            multipath_std_db: 2.0,
            shadowing_std_db: 3.0,
        }
    }
}
