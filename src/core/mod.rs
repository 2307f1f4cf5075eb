pub mod alarm;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod geo;
pub mod geocode;
pub mod geofences;
pub mod location;
pub mod model;
pub mod monitor;
pub mod storage;
