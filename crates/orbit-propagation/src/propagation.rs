//! Batched SGP4 sampling over the planning grid.
//!
//! Each satellite is propagated independently on the rayon pool; the
//! per-satellite element parse and constants initialization happen once
//! per record, then every grid instant is evaluated in sequence.

use crate::transforms::{self, LookAngles};
use crate::{CatalogRecord, Observer, OrbitError, PositionSample, Result, TimeGrid};
use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use rayon::prelude::*;
use std::collections::BTreeMap;
use tracing::{debug, warn};

/// ECI state from one propagation step.
#[derive(Debug, Clone, Copy)]
pub struct StateVector {
    pub position_km: Vector3<f64>,
    pub velocity_km_s: Vector3<f64>,
    pub epoch: DateTime<Utc>,
}

/// Dense sampling result for a catalog subset. Satellites with zero
/// surviving samples are absent from the map.
#[derive(Debug, Clone)]
pub struct SampledCatalog {
    /// NORAD id to ordered sample series, identical grid across entries.
    pub samples: BTreeMap<u64, Vec<PositionSample>>,
    pub grid: TimeGrid,
    pub sgp4_init_failures: usize,
    pub propagation_step_failures: usize,
}

impl SampledCatalog {
    pub fn samples_produced(&self) -> usize {
        self.samples.values().map(Vec::len).sum()
    }
}

/// Propagate one record over the grid, attaching observer geometry to
/// every successful step. Failed steps are skipped, never faked.
pub fn sample_record(
    record: &CatalogRecord,
    observer: &Observer,
    grid: &TimeGrid,
) -> Result<(Vec<PositionSample>, usize)> {
    let elements = sgp4::Elements::from_tle(
        Some(record.name.clone()),
        record.tle_line1.as_bytes(),
        record.tle_line2.as_bytes(),
    )
    .map_err(|e| OrbitError::InvalidTle(format!("{:?}", e)))?;

    let constants = sgp4::Constants::from_elements(&elements).map_err(|e| OrbitError::InitFailed {
        norad_id: record.norad_id,
        reason: format!("{:?}", e),
    })?;

    let epoch_utc = DateTime::<Utc>::from_naive_utc_and_offset(elements.datetime, Utc);

    let mut samples = Vec::with_capacity(grid.count);
    let mut step_failures = 0usize;

    for time in grid.instants() {
        let minutes_since_epoch =
            time.signed_duration_since(epoch_utc).num_seconds() as f64 / 60.0;

        let prediction = match constants.propagate(minutes_since_epoch) {
            Ok(p) => p,
            Err(e) => {
                debug!(
                    norad_id = record.norad_id,
                    %time,
                    error = ?e,
                    "propagation step failed, sample omitted"
                );
                step_failures += 1;
                continue;
            }
        };

        let position = Vector3::new(
            prediction.position[0],
            prediction.position[1],
            prediction.position[2],
        );
        let velocity = Vector3::new(
            prediction.velocity[0],
            prediction.velocity[1],
            prediction.velocity[2],
        );

        samples.push(build_sample(observer, time, &position, &velocity));
    }

    Ok((samples, step_failures))
}

fn build_sample(
    observer: &Observer,
    time: DateTime<Utc>,
    position: &Vector3<f64>,
    velocity: &Vector3<f64>,
) -> PositionSample {
    let subpoint = transforms::eci_to_geodetic(position, time);
    let LookAngles {
        elevation_deg,
        azimuth_deg,
        range_km,
        range_rate_km_s,
    } = transforms::look_angles(observer, position, velocity, time);

    PositionSample {
        timestamp: time,
        position_x: position.x,
        position_y: position.y,
        position_z: position.z,
        velocity_x: velocity.x,
        velocity_y: velocity.y,
        velocity_z: velocity.z,
        latitude_deg: subpoint.latitude_deg,
        longitude_deg: subpoint.longitude_deg,
        altitude_km: subpoint.altitude_km,
        elevation_deg,
        azimuth_deg,
        range_km,
        range_rate_km_s,
    }
}

/// Propagate a catalog subset in parallel. A satellite whose SGP4
/// initialization fails contributes zero samples and is counted; it does
/// not abort the batch.
pub fn sample_catalog(
    records: &[CatalogRecord],
    observer: &Observer,
    grid: TimeGrid,
) -> SampledCatalog {
    let results: Vec<(u64, Result<(Vec<PositionSample>, usize)>)> = records
        .par_iter()
        .map(|record| (record.norad_id, sample_record(record, observer, &grid)))
        .collect();

    let mut samples = BTreeMap::new();
    let mut init_failures = 0usize;
    let mut step_failures = 0usize;

    for (norad_id, result) in results {
        match result {
            Ok((series, steps_failed)) => {
                step_failures += steps_failed;
                if !series.is_empty() {
                    samples.insert(norad_id, series);
                }
            }
            Err(e) => {
                warn!(norad_id, error = %e, "satellite excluded from sampling");
                init_failures += 1;
            }
        }
    }

    debug!(
        satellites = samples.len(),
        init_failures,
        step_failures,
        "catalog sampling complete"
    );

    SampledCatalog {
        samples,
        grid,
        sgp4_init_failures: init_failures,
        propagation_step_failures: step_failures,
    }
}
