//! Error type shared by the alarm engine.

use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Storage or feed I/O failed.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Stored data could not be (de)serialized.
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The process is not allowed to read a required resource (location feed, etc).
    #[error("permission denied: {0}")]
    Permission(String),

    #[error("invalid radius {0} km: must be a positive number")]
    InvalidRadius(f64),

    #[error("invalid coordinate ({latitude}, {longitude})")]
    InvalidCoordinate { latitude: f64, longitude: f64 },

    #[error("audio playback failed: {0}")]
    Audio(String),

    /// Place search or naming service failed.
    #[error("geocoding failed: {0}")]
    Geocode(String),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Permission failures need user action; everything else is transient.
    pub fn is_permission(&self) -> bool {
        matches!(self, Self::Permission(_))
    }
}
