//! Synthetic TLE fixtures.
//!
//! Formats valid, checksummed TLE line pairs for circular orbits at a
//! caller-supplied epoch. Used by the development profile and by tests;
//! production runs always ingest real catalog files.

use crate::parse::tle_checksum;
use crate::transforms::{EARTH_MU_KM3_S2, EARTH_RADIUS_KM};
use chrono::{DateTime, Datelike, Timelike, Utc};
use std::f64::consts::PI;

/// Mean motion in revolutions per day for a circular orbit at the given
/// altitude.
pub fn mean_motion_rev_day(altitude_km: f64) -> f64 {
    let semi_major = EARTH_RADIUS_KM + altitude_km;
    let n_rad_s = (EARTH_MU_KM3_S2 / semi_major.powi(3)).sqrt();
    n_rad_s * 86_400.0 / (2.0 * PI)
}

/// Build a named three-line record for a near-circular orbit.
/// Returns (name, line1, line2).
pub fn circular_orbit_tle(
    name: &str,
    norad_id: u32,
    inclination_deg: f64,
    raan_deg: f64,
    mean_anomaly_deg: f64,
    altitude_km: f64,
    epoch: DateTime<Utc>,
) -> (String, String, String) {
    let epoch_year = (epoch.year() % 100) as u8;
    let epoch_day = epoch.ordinal() as f64
        + epoch.hour() as f64 / 24.0
        + epoch.minute() as f64 / 1440.0
        + epoch.second() as f64 / 86_400.0;

    let line1 = format_line1(norad_id, epoch_year, epoch_day);
    let line2 = format_line2(
        norad_id,
        inclination_deg,
        raan_deg,
        0.0001,
        0.0,
        mean_anomaly_deg,
        mean_motion_rev_day(altitude_km),
    );

    (name.to_string(), line1, line2)
}

fn format_line1(norad_id: u32, epoch_year: u8, epoch_day: f64) -> String {
    // TLE Line 1: 69 characters
    // Cols: 1(line#) 2(sp) 3-7(norad) 8(class) 9(sp) 10-17(intl desig)
    //       18(sp) 19-20(yr) 21-32(day) 33(sp) 34-43(ndot) 44(sp)
    //       45-52(nddot) 53(sp) 54-61(bstar) 62(sp) 63(etype) 64(sp) 65-68(elset) 69(cksum)
    let line = format!(
        "1 {:05}U 00000A   {:02}{:012.8}  .00000000  00000-0  00000-0 0    1",
        norad_id, epoch_year, epoch_day
    );
    let cksum = tle_checksum(&line);
    format!("{}{}", line, cksum)
}

fn format_line2(
    norad_id: u32,
    inc_deg: f64,
    raan_deg: f64,
    eccentricity: f64,
    arg_perigee_deg: f64,
    mean_anomaly_deg: f64,
    mean_motion: f64,
) -> String {
    // TLE Line 2: 69 characters
    // Cols: 1(line#) 2(sp) 3-7(norad) 8(sp) 9-16(inc) 17(sp) 18-25(raan)
    //       26(sp) 27-33(ecc) 34(sp) 35-42(argp) 43(sp) 44-51(ma)
    //       52(sp) 53-63(mm) 64-68(revnum) 69(cksum)
    let ecc_int = (eccentricity * 10_000_000.0).round() as u64;
    let line = format!(
        "2 {:05} {:>8.4} {:>8.4} {:07} {:>8.4} {:>8.4} {:>11.8}{:05}",
        norad_id, inc_deg, raan_deg, ecc_int, arg_perigee_deg, mean_anomaly_deg, mean_motion, 1u32,
    );
    let cksum = tle_checksum(&line);
    format!("{}{}", line, cksum)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn generated_lines_parse_under_sgp4() {
        let epoch = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let (name, l1, l2) =
            circular_orbit_tle("STARLINK-9100", 91000, 53.0, 120.0, 45.0, 550.0, epoch);

        assert_eq!(l1.len(), 69, "line 1 wrong length for {}", name);
        assert_eq!(l2.len(), 69, "line 2 wrong length for {}", name);

        let elements = sgp4::Elements::from_tle(Some(name), l1.as_bytes(), l2.as_bytes());
        assert!(elements.is_ok(), "failed to parse: {:?}\nL1: {}\nL2: {}", elements.err(), l1, l2);

        let elements = elements.unwrap();
        assert!((elements.inclination - 53.0).abs() < 1e-3);
        assert!((elements.right_ascension - 120.0).abs() < 1e-3);
    }

    #[test]
    fn starlink_period_is_about_96_minutes() {
        let mm = mean_motion_rev_day(550.0);
        let period_min = 1440.0 / mm;
        assert!((period_min - 95.6).abs() < 1.0, "period {}", period_min);
    }

    #[test]
    fn oneweb_period_is_about_109_minutes() {
        let mm = mean_motion_rev_day(1200.0);
        let period_min = 1440.0 / mm;
        assert!((period_min - 109.4).abs() < 1.5, "period {}", period_min);
    }
}
