//! Data model for geofences and the cached radius circle.

use std::sync::atomic::{AtomicI64, Ordering};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::error::{Error, Result};
use crate::core::geo::GeoPoint;
use crate::core::model::Destination;

/// Largest radius a fence may have; bigger requests are clamped down to it.
pub const MAX_RADIUS_KM: f64 = 0.5;

static LAST_ID_MILLIS: AtomicI64 = AtomicI64::new(0);

/// Opaque geofence identifier (creation time in Unix millis).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GeofenceId(String);

impl GeofenceId {
    /// Allocate a fresh time-based id, unique within this process.
    pub fn generate(now: DateTime<Utc>) -> Self {
        let wanted = now.timestamp_millis();
        let mut last = LAST_ID_MILLIS.load(Ordering::SeqCst);
        loop {
            let next = wanted.max(last + 1);
            match LAST_ID_MILLIS.compare_exchange(last, next, Ordering::SeqCst, Ordering::SeqCst) {
                Ok(_) => return Self(next.to_string()),
                Err(actual) => last = actual,
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for GeofenceId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for GeofenceId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl std::fmt::Display for GeofenceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Validate a requested radius and clamp it to [`MAX_RADIUS_KM`].
pub fn clamp_radius(requested_km: f64) -> Result<f64> {
    if !requested_km.is_finite() || requested_km <= 0.0 {
        return Err(Error::InvalidRadius(requested_km));
    }
    Ok(requested_km.min(MAX_RADIUS_KM))
}

/// What the user confirmed before a fence exists.
#[derive(Debug, Clone)]
pub struct GeofenceDraft {
    pub destination: Destination,
    pub radius_km: f64,
}

impl GeofenceDraft {
    pub fn new(destination: Destination, radius_km: f64) -> Self {
        Self {
            destination,
            radius_km,
        }
    }
}

/// A named point plus a trigger radius.
///
/// Serialized field names match the layout already on users' devices.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Geofence {
    pub id: GeofenceId,
    #[serde(rename = "location")]
    pub target: Destination,
    #[serde(rename = "radius")]
    pub radius_km: f64,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
}

impl Geofence {
    /// Create an active fence from a draft, clamping its radius.
    pub fn new(draft: GeofenceDraft, now: DateTime<Utc>) -> Result<Self> {
        let point = draft.destination.point();
        if !point.is_valid() {
            return Err(Error::InvalidCoordinate {
                latitude: point.latitude,
                longitude: point.longitude,
            });
        }

        Ok(Self {
            id: GeofenceId::generate(now),
            target: draft.destination,
            radius_km: clamp_radius(draft.radius_km)?,
            is_active: true,
            created_at: now,
        })
    }

    /// Copy of this fence with a new radius (clamped). Id and creation time are kept.
    pub fn with_radius(&self, radius_km: f64) -> Result<Self> {
        Ok(Self {
            radius_km: clamp_radius(radius_km)?,
            ..self.clone()
        })
    }

    pub fn with_active(&self, is_active: bool) -> Self {
        Self {
            is_active,
            ..self.clone()
        }
    }

    pub fn center(&self) -> GeoPoint {
        self.target.point()
    }

    /// True when `distance_km` falls inside the trigger radius.
    pub fn contains_distance(&self, distance_km: f64) -> bool {
        distance_km <= self.radius_km
    }
}

/// Last radius circle drawn on the map. Display cache only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmCircle {
    pub center: GeoPoint,
    /// Radius in meters
    pub radius: f64,
}

impl AlarmCircle {
    pub fn for_fence(fence: &Geofence) -> Self {
        Self {
            center: fence.center(),
            radius: fence.radius_km * 1000.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(radius_km: f64) -> GeofenceDraft {
        GeofenceDraft::new(
            Destination::new(GeoPoint::new(41.0082, 28.9784), "Sultanahmet"),
            radius_km,
        )
    }

    #[test]
    fn test_radius_clamped_to_max() {
        let fence = Geofence::new(draft(0.8), Utc::now()).unwrap();
        assert_eq!(fence.radius_km, 0.5);
        assert!(fence.is_active);

        let small = Geofence::new(draft(0.1), Utc::now()).unwrap();
        assert_eq!(small.radius_km, 0.1);
    }

    #[test]
    fn test_invalid_radius_rejected() {
        assert!(matches!(clamp_radius(0.0), Err(Error::InvalidRadius(_))));
        assert!(matches!(clamp_radius(-1.0), Err(Error::InvalidRadius(_))));
        assert!(clamp_radius(f64::NAN).is_err());
        assert!(Geofence::new(draft(0.0), Utc::now()).is_err());
    }

    #[test]
    fn test_invalid_coordinate_rejected() {
        let bad = GeofenceDraft::new(Destination::new(GeoPoint::new(95.0, 0.0), "Nowhere"), 0.3);
        assert!(matches!(
            Geofence::new(bad, Utc::now()),
            Err(Error::InvalidCoordinate { .. })
        ));
    }

    #[test]
    fn test_ids_unique_within_same_millisecond() {
        let now = Utc::now();
        let a = GeofenceId::generate(now);
        let b = GeofenceId::generate(now);
        assert_ne!(a, b);
        assert!(b.as_str().parse::<i64>().unwrap() > a.as_str().parse::<i64>().unwrap());
    }

    #[test]
    fn test_edit_keeps_identity() {
        let fence = Geofence::new(draft(0.2), Utc::now()).unwrap();
        let edited = fence.with_radius(3.0).unwrap();
        assert_eq!(edited.id, fence.id);
        assert_eq!(edited.created_at, fence.created_at);
        assert_eq!(edited.radius_km, MAX_RADIUS_KM);
        assert!(!fence.with_active(false).is_active);
    }

    #[test]
    fn test_serialized_layout() {
        let fence = Geofence::new(draft(0.3), Utc::now()).unwrap();
        let value = serde_json::to_value(&fence).unwrap();
        assert_eq!(value["radius"], 0.3);
        assert_eq!(value["isActive"], true);
        assert_eq!(value["location"]["name"], "Sultanahmet");
        assert!(value["createdAt"].is_string());
        assert!(value["id"].is_string());
    }

    #[test]
    fn test_circle_in_meters() {
        let fence = Geofence::new(draft(0.4), Utc::now()).unwrap();
        let circle = AlarmCircle::for_fence(&fence);
        assert!((circle.radius - 400.0).abs() < 1e-9);
        assert_eq!(circle.center, fence.center());
    }
}
