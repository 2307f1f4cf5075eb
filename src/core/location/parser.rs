//! Parser for position fix lines.
//!
//! One fix per line:
//! `2025-01-01T12:00:00Z lat=41.0082 lon=28.9784 acc=12.5`
//! (`acc` is optional and in meters).

use chrono::{DateTime, Utc};
use lazy_static::lazy_static;
use regex::Regex;

use crate::core::geo::GeoPoint;
use crate::core::model::LocationSample;

lazy_static! {
    static ref FIX_REGEX: Regex = Regex::new(
        r"^(\S+)\s+lat=(-?\d+(?:\.\d+)?)\s+lon=(-?\d+(?:\.\d+)?)(?:\s+acc=(\d+(?:\.\d+)?))?$"
    )
    .expect("Invalid fix regex");
}

/// Parse a single line. Blank lines, `#` comments and bad fixes yield `None`.
pub fn parse_fix(line: &str) -> Option<LocationSample> {
    // Strip BOM and trim whitespace
    let line = line.trim().trim_start_matches('\u{feff}');
    if line.is_empty() || line.starts_with('#') {
        return None;
    }

    let caps = FIX_REGEX.captures(line)?;
    let timestamp = DateTime::parse_from_rfc3339(caps.get(1)?.as_str())
        .ok()?
        .with_timezone(&Utc);
    let latitude: f64 = caps.get(2)?.as_str().parse().ok()?;
    let longitude: f64 = caps.get(3)?.as_str().parse().ok()?;
    let accuracy_m = match caps.get(4) {
        Some(m) => Some(m.as_str().parse().ok()?),
        None => None,
    };

    let point = GeoPoint::checked(latitude, longitude).ok()?;
    Some(LocationSample::new(point, accuracy_m, timestamp))
}

/// Parse many lines, skipping the ones that are not fixes.
pub fn parse_fixes(lines: &[String]) -> Vec<LocationSample> {
    lines.iter().filter_map(|line| parse_fix(line)).collect()
}
