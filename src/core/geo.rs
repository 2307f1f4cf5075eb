//! Great-circle math on a spherical Earth.

use serde::{Deserialize, Serialize};

use super::error::{Error, Result};

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 coordinate in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Build a point, rejecting anything outside the valid lat/lon ranges.
    pub fn checked(latitude: f64, longitude: f64) -> Result<Self> {
        let point = Self::new(latitude, longitude);
        if point.is_valid() {
            Ok(point)
        } else {
            Err(Error::InvalidCoordinate {
                latitude,
                longitude,
            })
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Distance to `other` in kilometers.
    pub fn distance_km(&self, other: &GeoPoint) -> f64 {
        haversine_km(self, other)
    }

    /// Point reached after travelling `distance_km` along `bearing_deg` (0 = north).
    pub fn offset(&self, bearing_deg: f64, distance_km: f64) -> GeoPoint {
        let angular = distance_km / EARTH_RADIUS_KM;
        let bearing = bearing_deg.to_radians();
        let lat1 = self.latitude.to_radians();
        let lon1 = self.longitude.to_radians();

        let lat2 = (lat1.sin() * angular.cos() + lat1.cos() * angular.sin() * bearing.cos()).asin();
        let lon2 = lon1
            + (bearing.sin() * angular.sin() * lat1.cos())
                .atan2(angular.cos() - lat1.sin() * lat2.sin());

        GeoPoint::new(lat2.to_degrees(), lon2.to_degrees())
    }
}

/// Haversine great-circle distance between two points, in kilometers.
pub fn haversine_km(from: &GeoPoint, to: &GeoPoint) -> f64 {
    let lat1 = from.latitude.to_radians();
    let lat2 = to.latitude.to_radians();
    let delta_lat = (to.latitude - from.latitude).to_radians();
    let delta_lon = (to.longitude - from.longitude).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1.cos() * lat2.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    const ISTANBUL: GeoPoint = GeoPoint::new(41.0082, 28.9784);

    #[test]
    fn test_one_km_north_of_istanbul() {
        // 1 km of latitude is 1/111.195 degrees on a 6371 km sphere
        let north = GeoPoint::new(ISTANBUL.latitude + 1.0 / 111.195, ISTANBUL.longitude);
        let d = haversine_km(&ISTANBUL, &north);
        assert!((d - 1.0).abs() < 0.01, "expected ~1 km, got {d}");
    }

    #[test]
    fn test_offset_matches_distance() {
        let east = ISTANBUL.offset(90.0, 0.3);
        assert!((ISTANBUL.distance_km(&east) - 0.3).abs() < 1e-6);

        let north = ISTANBUL.offset(0.0, 1.0);
        assert!(north.latitude > ISTANBUL.latitude);
        assert!((north.longitude - ISTANBUL.longitude).abs() < 1e-9);
    }

    #[test]
    fn test_zero_distance_and_symmetry() {
        assert_eq!(haversine_km(&ISTANBUL, &ISTANBUL), 0.0);

        let ankara = GeoPoint::new(39.9334, 32.8597);
        let there = haversine_km(&ISTANBUL, &ankara);
        let back = haversine_km(&ankara, &ISTANBUL);
        assert!((there - back).abs() < 1e-9);
        // ~350 km as the crow flies
        assert!((340.0..360.0).contains(&there), "got {there}");
    }

    #[test]
    fn test_checked_rejects_out_of_range() {
        assert!(GeoPoint::checked(41.0, 29.0).is_ok());
        assert!(GeoPoint::checked(91.0, 0.0).is_err());
        assert!(GeoPoint::checked(0.0, -180.5).is_err());
        assert!(GeoPoint::checked(f64::NAN, 0.0).is_err());
    }
}
