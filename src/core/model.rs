use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::geo::GeoPoint;

/// One position fix delivered by the location provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub point: GeoPoint,
    /// Horizontal accuracy radius in meters, if the provider reported one
    pub accuracy_m: Option<f64>,
    pub timestamp: DateTime<Utc>,
}

impl LocationSample {
    pub fn new(point: GeoPoint, accuracy_m: Option<f64>, timestamp: DateTime<Utc>) -> Self {
        Self {
            point,
            accuracy_m,
            timestamp,
        }
    }
}

/// A place the user picked as a destination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Destination {
    pub latitude: f64,
    pub longitude: f64,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
}

impl Destination {
    pub fn new(point: GeoPoint, name: impl Into<String>) -> Self {
        Self {
            latitude: point.latitude,
            longitude: point.longitude,
            name: name.into(),
            address: None,
        }
    }

    pub fn point(&self) -> GeoPoint {
        GeoPoint::new(self.latitude, self.longitude)
    }
}
