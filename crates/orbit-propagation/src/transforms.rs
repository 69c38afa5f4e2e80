//! Coordinate transforms between ECI (TEME), ECEF, geodetic, and
//! observer-topocentric frames.
//!
//! WGS-84 ellipsoid throughout. The TEME-to-ECEF rotation uses Greenwich
//! mean sidereal time of date, which is adequate for link-geometry work
//! at LEO ranges.

use crate::Observer;
use chrono::{DateTime, Utc};
use nalgebra::Vector3;
use std::f64::consts::PI;

pub const EARTH_RADIUS_KM: f64 = 6378.137;
pub const EARTH_FLATTENING: f64 = 1.0 / 298.257223563;
pub const EARTH_ROTATION_RATE_RAD_S: f64 = 7.2921159e-5;
pub const EARTH_MU_KM3_S2: f64 = 398600.4418;
pub const SPEED_OF_LIGHT_KM_S: f64 = 299_792.458;

/// Geodetic subpoint of a satellite state.
#[derive(Debug, Clone, Copy)]
pub struct GeodeticSubpoint {
    pub latitude_deg: f64,
    pub longitude_deg: f64,
    pub altitude_km: f64,
}

/// Observer-relative look angles for one instant.
#[derive(Debug, Clone, Copy)]
pub struct LookAngles {
    /// Degrees above the horizon.
    pub elevation_deg: f64,
    /// Degrees clockwise from north.
    pub azimuth_deg: f64,
    pub range_km: f64,
    /// km/s, negative while the satellite approaches.
    pub range_rate_km_s: f64,
}

/// Greenwich mean sidereal time in radians (IAU 1982 series), normalized
/// to [0, 2pi).
pub fn gmst_rad(time: DateTime<Utc>) -> f64 {
    let unix_s = time.timestamp() as f64 + time.timestamp_subsec_nanos() as f64 * 1e-9;
    let jd = unix_s / 86_400.0 + 2_440_587.5;
    let t = (jd - 2_451_545.0) / 36_525.0;

    let gmst_sec = 67_310.54841
        + (876_600.0 * 3_600.0 + 8_640_184.812866) * t
        + 0.093104 * t * t
        - 6.2e-6 * t * t * t;

    let rad = (gmst_sec % 86_400.0) / 240.0 * (PI / 180.0);
    rad.rem_euclid(2.0 * PI)
}

/// Geodetic coordinates to an ECEF position vector in km.
pub fn geodetic_to_ecef(lat_deg: f64, lon_deg: f64, alt_km: f64) -> Vector3<f64> {
    let lat = lat_deg.to_radians();
    let lon = lon_deg.to_radians();
    let e2 = 2.0 * EARTH_FLATTENING - EARTH_FLATTENING * EARTH_FLATTENING;

    // Radius of curvature in the prime vertical
    let n = EARTH_RADIUS_KM / (1.0 - e2 * lat.sin().powi(2)).sqrt();

    Vector3::new(
        (n + alt_km) * lat.cos() * lon.cos(),
        (n + alt_km) * lat.cos() * lon.sin(),
        (n * (1.0 - e2) + alt_km) * lat.sin(),
    )
}

/// Rotate an ECEF vector into ECI by the given sidereal angle.
pub fn ecef_to_eci(ecef: &Vector3<f64>, gmst: f64) -> Vector3<f64> {
    let (sin_g, cos_g) = gmst.sin_cos();
    Vector3::new(
        cos_g * ecef.x - sin_g * ecef.y,
        sin_g * ecef.x + cos_g * ecef.y,
        ecef.z,
    )
}

/// Rotate an ECI vector into ECEF by the given sidereal angle.
pub fn eci_to_ecef(eci: &Vector3<f64>, gmst: f64) -> Vector3<f64> {
    let (sin_g, cos_g) = gmst.sin_cos();
    Vector3::new(
        cos_g * eci.x + sin_g * eci.y,
        -sin_g * eci.x + cos_g * eci.y,
        eci.z,
    )
}

/// Geodetic subpoint below an ECI position at the given instant.
///
/// Latitude is refined iteratively against the ellipsoid; five rounds
/// converge well below a meter for LEO altitudes.
pub fn eci_to_geodetic(position_eci: &Vector3<f64>, time: DateTime<Utc>) -> GeodeticSubpoint {
    let ecef = eci_to_ecef(position_eci, gmst_rad(time));
    let e2 = 2.0 * EARTH_FLATTENING - EARTH_FLATTENING * EARTH_FLATTENING;

    let longitude_deg = ecef.y.atan2(ecef.x).to_degrees();
    let p = (ecef.x * ecef.x + ecef.y * ecef.y).sqrt();

    let mut lat = ecef.z.atan2(p);
    let mut n = EARTH_RADIUS_KM;
    for _ in 0..5 {
        n = EARTH_RADIUS_KM / (1.0 - e2 * lat.sin().powi(2)).sqrt();
        lat = (ecef.z + e2 * n * lat.sin()).atan2(p);
    }

    let altitude_km = if lat.cos().abs() > 1e-10 {
        p / lat.cos() - n
    } else {
        ecef.z.abs() / lat.sin().abs() - n * (1.0 - e2)
    };

    GeodeticSubpoint {
        latitude_deg: lat.to_degrees(),
        longitude_deg,
        altitude_km,
    }
}

/// Observer-relative elevation, azimuth, slant range, and range rate from
/// an ECI state at the given instant.
pub fn look_angles(
    observer: &Observer,
    position_eci: &Vector3<f64>,
    velocity_eci: &Vector3<f64>,
    time: DateTime<Utc>,
) -> LookAngles {
    let gmst = gmst_rad(time);
    let obs_ecef = geodetic_to_ecef(
        observer.latitude_deg,
        observer.longitude_deg,
        observer.altitude_m / 1000.0,
    );

    // Range vector in ECEF for the topocentric rotation
    let sat_ecef = eci_to_ecef(position_eci, gmst);
    let rel_ecef = sat_ecef - obs_ecef;
    let range_km = rel_ecef.norm();

    let lat = observer.latitude_deg.to_radians();
    let lon = observer.longitude_deg.to_radians();
    let (sin_lat, cos_lat) = lat.sin_cos();
    let (sin_lon, cos_lon) = lon.sin_cos();

    // SEZ components: south, east, zenith
    let s = sin_lat * cos_lon * rel_ecef.x + sin_lat * sin_lon * rel_ecef.y - cos_lat * rel_ecef.z;
    let e = -sin_lon * rel_ecef.x + cos_lon * rel_ecef.y;
    let z = cos_lat * cos_lon * rel_ecef.x + cos_lat * sin_lon * rel_ecef.y + sin_lat * rel_ecef.z;

    let elevation_deg = (z / range_km).asin().to_degrees();
    let azimuth_deg = e.atan2(-s).rem_euclid(2.0 * PI).to_degrees();

    // Range rate from the inertial relative velocity. The observer moves
    // with the Earth: v = omega x r.
    let obs_eci = ecef_to_eci(&obs_ecef, gmst);
    let obs_vel_eci = Vector3::new(
        -EARTH_ROTATION_RATE_RAD_S * obs_eci.y,
        EARTH_ROTATION_RATE_RAD_S * obs_eci.x,
        0.0,
    );
    let rel_eci = position_eci - obs_eci;
    let rel_vel = velocity_eci - obs_vel_eci;
    let range_rate_km_s = rel_eci.dot(&rel_vel) / rel_eci.norm();

    LookAngles {
        elevation_deg,
        azimuth_deg,
        range_km,
        range_rate_km_s,
    }
}
