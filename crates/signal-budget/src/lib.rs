//! Signal Budget Library
//!
//! Turns observer-relative geometry samples into radio-layer samples
//! (RSRP, RSRQ, SINR, path loss, Doppler, delay) using the ITU-R budget
//! in [`link_budget`] and the versioned constants in [`constants`].
//!
//! A satellite whose constellation has no registered RF parameters gets
//! a degraded sample with no signal figures; nothing is ever invented to
//! fill the gap.

use chrono::{DateTime, Utc};
use orbit_propagation::{Constellation, PositionSample};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::warn;

pub mod constants;
pub mod link_budget;

pub use constants::{
    rf_parameters, AtmosphereParams, ConstellationRf, TerminalProfile,
    PHYSICS_CONSTANTS_VERSION,
};

#[derive(Error, Debug)]
pub enum SignalError {
    #[error("No RF parameters registered for constellation {0}")]
    MissingConstellationParameters(Constellation),
    #[error("Empty sample series for satellite {0}")]
    EmptySeries(u64),
}

pub type Result<T> = std::result::Result<T, SignalError>;

/// Sample-level quality flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SampleQuality {
    Nominal,
    /// RSRP or SINR fell outside the working band and was clamped.
    Clamped,
    /// Required RF parameters were unavailable; no signal figures.
    Degraded,
}

/// Radio-layer enrichment of one position sample.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignalSample {
    pub satellite_id: u64,
    pub constellation: Constellation,
    pub timestamp: DateTime<Utc>,
    pub elevation_deg: f64,
    pub range_km: f64,
    pub rsrp_dbm: Option<f64>,
    pub rsrq_db: Option<f64>,
    pub sinr_db: Option<f64>,
    pub path_loss_db: Option<f64>,
    pub atmospheric_loss_db: Option<f64>,
    pub doppler_shift_hz: Option<f64>,
    pub propagation_delay_ms: f64,
    pub eirp_dbw: Option<f64>,
    pub antenna_gain_dbi: Option<f64>,
    pub quality: SampleQuality,
    /// Doppler magnitude exceeded the NTN budget at this instant.
    pub doppler_flagged: bool,
}

/// RF inputs resolved once per run. The constellation records default
/// to the versioned registry but are open to configuration overrides;
/// there is deliberately no entry for unregistered constellations.
#[derive(Debug, Clone)]
pub struct SignalContext {
    pub terminal: TerminalProfile,
    pub atmosphere: AtmosphereParams,
    pub starlink_rf: ConstellationRf,
    pub oneweb_rf: ConstellationRf,
}

impl Default for SignalContext {
    fn default() -> Self {
        Self {
            terminal: TerminalProfile::default(),
            atmosphere: AtmosphereParams::default(),
            starlink_rf: rf_parameters(Constellation::Starlink)
                .expect("registry carries Starlink parameters"),
            oneweb_rf: rf_parameters(Constellation::Oneweb)
                .expect("registry carries OneWeb parameters"),
        }
    }
}

impl SignalContext {
    /// Resolved RF parameters for a constellation, `None` when nothing
    /// is registered or configured.
    pub fn rf_for(&self, constellation: Constellation) -> Option<&ConstellationRf> {
        match constellation {
            Constellation::Starlink => Some(&self.starlink_rf),
            Constellation::Oneweb => Some(&self.oneweb_rf),
            Constellation::Other => None,
        }
    }
}

/// Compute the full radio sample for one geometry sample. `rf` is the
/// resolved parameter record for the satellite's constellation; pass
/// `None` for unregistered constellations to get the degraded form.
pub fn compute_sample(
    satellite_id: u64,
    constellation: Constellation,
    position: &PositionSample,
    rf: Option<&ConstellationRf>,
    ctx: &SignalContext,
) -> SignalSample {
    let delay_ms = link_budget::propagation_delay_ms(position.range_km);

    let Some(rf) = rf else {
        return SignalSample {
            satellite_id,
            constellation,
            timestamp: position.timestamp,
            elevation_deg: position.elevation_deg,
            range_km: position.range_km,
            rsrp_dbm: None,
            rsrq_db: None,
            sinr_db: None,
            path_loss_db: None,
            atmospheric_loss_db: None,
            doppler_shift_hz: None,
            propagation_delay_ms: delay_ms,
            eirp_dbw: None,
            antenna_gain_dbi: None,
            quality: SampleQuality::Degraded,
            doppler_flagged: false,
        };
    };

    let budget = link_budget::evaluate(
        position.elevation_deg,
        position.range_km,
        position.altitude_km,
        rf,
        &ctx.terminal,
        &ctx.atmosphere,
    );
    let (sinr, sinr_clamped) =
        link_budget::sinr_db(budget.rsrp_dbm, position.elevation_deg, &ctx.terminal);
    let rsrq = link_budget::rsrq_db(sinr, &ctx.terminal);
    let (doppler, doppler_flagged) =
        link_budget::doppler_shift_hz(rf.frequency_ghz, position.range_rate_km_s);

    let quality = if budget.rsrp_clamped || sinr_clamped {
        SampleQuality::Clamped
    } else {
        SampleQuality::Nominal
    };

    SignalSample {
        satellite_id,
        constellation,
        timestamp: position.timestamp,
        elevation_deg: position.elevation_deg,
        range_km: position.range_km,
        rsrp_dbm: Some(budget.rsrp_dbm),
        rsrq_db: Some(rsrq),
        sinr_db: Some(sinr),
        path_loss_db: Some(budget.fspl_db),
        atmospheric_loss_db: Some(budget.atmospheric_loss_db),
        doppler_shift_hz: Some(doppler),
        propagation_delay_ms: delay_ms,
        eirp_dbw: Some(rf.eirp_dbw),
        antenna_gain_dbi: Some(ctx.terminal.antenna_gain_dbi),
        quality,
        doppler_flagged,
    }
}

/// Compute the radio series for one satellite over its whole grid.
pub fn compute_series(
    satellite_id: u64,
    constellation: Constellation,
    positions: &[PositionSample],
    ctx: &SignalContext,
) -> Result<Vec<SignalSample>> {
    if positions.is_empty() {
        return Err(SignalError::EmptySeries(satellite_id));
    }
    let rf = ctx.rf_for(constellation);
    if rf.is_none() {
        warn!(
            satellite_id,
            constellation = %constellation,
            "no RF parameters registered, emitting degraded series"
        );
    }
    Ok(positions
        .iter()
        .map(|p| compute_sample(satellite_id, constellation, p, rf, ctx))
        .collect())
}

/// Compute radio series for a whole candidate set, one satellite per
/// rayon task. Satellites without a position series are absent from
/// the result.
pub fn compute_catalog_series(
    satellites: &[(u64, Constellation)],
    positions: &BTreeMap<u64, Vec<PositionSample>>,
    ctx: &SignalContext,
) -> BTreeMap<u64, Vec<SignalSample>> {
    satellites
        .par_iter()
        .filter_map(|&(id, constellation)| {
            let series = positions.get(&id)?;
            compute_series(id, constellation, series, ctx)
                .ok()
                .map(|s| (id, s))
        })
        .collect()
}

/// Aggregate figures over one radio series, for artifact summaries and
/// the downstream radio layer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeriesStatistics {
    pub samples: usize,
    pub nominal: usize,
    pub clamped: usize,
    pub degraded: usize,
    pub mean_rsrp_dbm: Option<f64>,
    pub min_rsrp_dbm: Option<f64>,
    pub max_rsrp_dbm: Option<f64>,
    pub max_abs_doppler_hz: Option<f64>,
    pub doppler_flagged: usize,
    pub mean_delay_ms: f64,
}

pub fn series_statistics(series: &[SignalSample]) -> SeriesStatistics {
    let mut stats = SeriesStatistics {
        samples: series.len(),
        ..Default::default()
    };

    let mut rsrp_sum = 0.0;
    let mut rsrp_count = 0usize;
    let mut delay_sum = 0.0;
    for sample in series {
        match sample.quality {
            SampleQuality::Nominal => stats.nominal += 1,
            SampleQuality::Clamped => stats.clamped += 1,
            SampleQuality::Degraded => stats.degraded += 1,
        }
        if sample.doppler_flagged {
            stats.doppler_flagged += 1;
        }
        delay_sum += sample.propagation_delay_ms;
        if let Some(rsrp) = sample.rsrp_dbm {
            rsrp_sum += rsrp;
            rsrp_count += 1;
            stats.min_rsrp_dbm = Some(stats.min_rsrp_dbm.map_or(rsrp, |m: f64| m.min(rsrp)));
            stats.max_rsrp_dbm = Some(stats.max_rsrp_dbm.map_or(rsrp, |m: f64| m.max(rsrp)));
        }
        if let Some(doppler) = sample.doppler_shift_hz {
            let magnitude = doppler.abs();
            stats.max_abs_doppler_hz =
                Some(stats.max_abs_doppler_hz.map_or(magnitude, |m: f64| m.max(magnitude)));
        }
    }
    if rsrp_count > 0 {
        stats.mean_rsrp_dbm = Some(rsrp_sum / rsrp_count as f64);
    }
    if !series.is_empty() {
        stats.mean_delay_ms = delay_sum / series.len() as f64;
    }
    stats
}

/// Lightweight RSRP projection used by the filter engine's signal
/// pre-assessment. Same budget as [`compute_sample`], skipping the
/// SINR/RSRQ/Doppler chain. Returns `None` for unregistered
/// constellations.
pub fn estimate_rsrp(
    elevation_deg: f64,
    range_km: f64,
    altitude_km: f64,
    constellation: Constellation,
    ctx: &SignalContext,
) -> Option<f64> {
    let rf = ctx.rf_for(constellation)?;
    let budget = link_budget::evaluate(
        elevation_deg,
        range_km,
        altitude_km,
        rf,
        &ctx.terminal,
        &ctx.atmosphere,
    );
    Some(budget.rsrp_dbm)
}
