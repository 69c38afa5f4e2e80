//! Celestrak three-line TLE parsing.
//!
//! Each record is a name line followed by lines 1 and 2. Lines are
//! validated for length and mod-10 checksum before the element set is
//! handed to the SGP4 parser; records failing any check are skipped and
//! counted, never repaired.

use crate::transforms::{EARTH_MU_KM3_S2, EARTH_RADIUS_KM};
use crate::{CatalogRecord, Constellation, LoadStatistics};
use chrono::{DateTime, Utc};
use std::f64::consts::PI;
use tracing::{debug, warn};

const TLE_LINE_LEN: usize = 69;

/// Mod-10 TLE checksum: digits count as themselves, minus signs as 1.
pub fn tle_checksum(line: &str) -> u8 {
    (line
        .bytes()
        .take(TLE_LINE_LEN - 1)
        .map(|b| {
            if b.is_ascii_digit() {
                (b - b'0') as u16
            } else if b == b'-' {
                1u16
            } else {
                0u16
            }
        })
        .sum::<u16>()
        % 10) as u8
}

fn line_valid(line: &str, expected_first: char) -> bool {
    if line.len() != TLE_LINE_LEN {
        return false;
    }
    if !line.starts_with(expected_first) {
        return false;
    }
    let declared = line.as_bytes()[TLE_LINE_LEN - 1];
    declared.is_ascii_digit() && (declared - b'0') == tle_checksum(line)
}

/// Parse a whole catalog text. Malformed records are skipped with a
/// warning and counted in the returned statistics.
pub fn parse_tle_catalog(text: &str) -> (Vec<CatalogRecord>, LoadStatistics) {
    let mut stats = LoadStatistics::default();
    let mut records = Vec::new();

    let lines: Vec<&str> = text
        .lines()
        .map(str::trim_end)
        .filter(|l| !l.trim().is_empty())
        .collect();

    let mut i = 0;
    while i < lines.len() {
        let name = lines[i];
        // A record must start with a name line, not an element line.
        if name.starts_with("1 ") || name.starts_with("2 ") {
            warn!("orphan element line at record boundary, skipping");
            stats.parse_errors += 1;
            i += 1;
            continue;
        }
        if i + 2 >= lines.len() {
            // name line without both element lines
            stats.parse_errors += 1;
            break;
        }
        let line1 = lines[i + 1];
        let line2 = lines[i + 2];
        i += 3;

        match parse_record(name, line1, line2) {
            Ok(record) => {
                stats.count_record(record.constellation);
                records.push(record);
            }
            Err(reason) => {
                warn!(satellite = name, %reason, "skipping malformed TLE record");
                stats.parse_errors += 1;
            }
        }
    }

    debug!(
        records = records.len(),
        parse_errors = stats.parse_errors,
        "catalog parsed"
    );

    (records, stats)
}

fn parse_record(name: &str, line1: &str, line2: &str) -> Result<CatalogRecord, String> {
    if !line_valid(line1, '1') {
        return Err("line 1 failed length or checksum validation".into());
    }
    if !line_valid(line2, '2') {
        return Err("line 2 failed length or checksum validation".into());
    }

    let elements = sgp4::Elements::from_tle(
        Some(name.trim().to_string()),
        line1.as_bytes(),
        line2.as_bytes(),
    )
    .map_err(|e| format!("{:?}", e))?;

    let epoch = DateTime::<Utc>::from_naive_utc_and_offset(elements.datetime, Utc);

    // Semi-major axis from the mean motion gives apogee and perigee
    // altitudes above the mean equatorial radius.
    let n_rad_s = elements.mean_motion * 2.0 * PI / 86_400.0;
    let semi_major_km = (EARTH_MU_KM3_S2 / (n_rad_s * n_rad_s)).cbrt();
    let apogee_km = semi_major_km * (1.0 + elements.eccentricity) - EARTH_RADIUS_KM;
    let perigee_km = semi_major_km * (1.0 - elements.eccentricity) - EARTH_RADIUS_KM;

    Ok(CatalogRecord {
        norad_id: elements.norad_id,
        name: name.trim().to_string(),
        constellation: Constellation::from_name(name),
        tle_line1: line1.to_string(),
        tle_line2: line2.to_string(),
        epoch,
        mean_motion: elements.mean_motion,
        inclination_deg: elements.inclination,
        raan_deg: elements.right_ascension,
        eccentricity: elements.eccentricity,
        mean_anomaly_deg: elements.mean_anomaly,
        apogee_km,
        perigee_km,
    })
}
