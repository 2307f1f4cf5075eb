use std::sync::{Arc, RwLock};

use crate::core::model::LocationSample;

/// Most recent accepted position, shared between the feed and the monitor.
#[derive(Clone, Default)]
pub struct LocationCache {
    latest: Arc<RwLock<Option<LocationSample>>>,
}

impl LocationCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&self, sample: LocationSample) {
        let mut latest = self.latest.write().unwrap_or_else(|e| e.into_inner());
        *latest = Some(sample);
    }

    pub fn latest(&self) -> Option<LocationSample> {
        self.latest
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}
