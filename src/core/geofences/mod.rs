//! Geofences: named destinations with a trigger radius.
//!
//! Provides the model types and the persistent store.

pub mod model;
pub mod store;
