//! Persistent storage for geofences.
//!
//! The whole collection lives under one key and every mutation is a
//! read-modify-write of that collection. Writers are expected to come from a
//! single thread of control; concurrent writers would race (last write wins).

use std::sync::Arc;

use super::model::{AlarmCircle, Geofence, GeofenceId};
use crate::core::error::Result;
use crate::core::storage::KeyValueStore;

/// Storage key of the geofence collection.
pub const ALARMS_KEY: &str = "alarms";
/// Storage key of the cached radius circle.
pub const CIRCLE_KEY: &str = "alarmCircle";

/// Ordered list of geofences on top of a key-value store.
#[derive(Clone)]
pub struct GeofenceStore {
    backend: Arc<dyn KeyValueStore>,
}

impl GeofenceStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// All fences in insertion order. Unreadable storage yields an empty list.
    pub fn list(&self) -> Vec<Geofence> {
        match self.load() {
            Ok(fences) => fences,
            Err(e) => {
                log::warn!("Failed to read geofences, treating as empty: {}", e);
                Vec::new()
            }
        }
    }

    /// Like [`list`](Self::list) but surfaces read/parse failures.
    pub fn load(&self) -> Result<Vec<Geofence>> {
        match self.backend.get(ALARMS_KEY)? {
            Some(content) if !content.trim().is_empty() => Ok(serde_json::from_str(&content)?),
            _ => Ok(Vec::new()),
        }
    }

    pub fn get(&self, id: &GeofenceId) -> Option<Geofence> {
        self.list().into_iter().find(|f| &f.id == id)
    }

    /// Append a fence and persist the full list.
    pub fn add(&self, fence: Geofence) -> Result<()> {
        let mut fences = self.load()?;
        fences.push(fence);
        self.persist(&fences)
    }

    /// Replace the stored fence with the same id. Returns false if none matched.
    pub fn update(&self, fence: Geofence) -> Result<bool> {
        let mut fences = self.load()?;
        let Some(slot) = fences.iter_mut().find(|f| f.id == fence.id) else {
            return Ok(false);
        };
        *slot = fence;
        self.persist(&fences)?;
        Ok(true)
    }

    /// Remove the fence with `id`, returning it. Absent ids are not an error.
    pub fn remove(&self, id: &GeofenceId) -> Result<Option<Geofence>> {
        let mut fences = self.load()?;
        let Some(pos) = fences.iter().position(|f| &f.id == id) else {
            return Ok(None);
        };
        let removed = fences.remove(pos);
        self.persist(&fences)?;
        Ok(Some(removed))
    }

    /// Drop every active fence. Returns how many were removed.
    pub fn remove_all_active(&self) -> Result<usize> {
        let fences = self.load()?;
        let before = fences.len();
        let remaining: Vec<Geofence> = fences.into_iter().filter(|f| !f.is_active).collect();
        let removed = before - remaining.len();
        if removed > 0 {
            self.persist(&remaining)?;
        }
        Ok(removed)
    }

    pub fn save_circle(&self, circle: &AlarmCircle) -> Result<()> {
        let content = serde_json::to_string(circle)?;
        self.backend.set(CIRCLE_KEY, &content)
    }

    /// Last drawn circle, if one was saved and is still readable.
    pub fn load_circle(&self) -> Option<AlarmCircle> {
        let content = self.backend.get(CIRCLE_KEY).ok()??;
        serde_json::from_str(&content).ok()
    }

    fn persist(&self, fences: &[Geofence]) -> Result<()> {
        let content = serde_json::to_string_pretty(fences)?;
        self.backend.set(ALARMS_KEY, &content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::GeoPoint;
    use crate::core::geofences::model::GeofenceDraft;
    use crate::core::model::Destination;
    use crate::core::storage::{JsonFileStore, MemoryStore};
    use chrono::Utc;
    use tempfile::tempdir;

    fn fence(name: &str, active: bool) -> Geofence {
        let draft = GeofenceDraft::new(Destination::new(GeoPoint::new(41.0, 29.0), name), 0.3);
        Geofence::new(draft, Utc::now()).unwrap().with_active(active)
    }

    fn memory_store() -> GeofenceStore {
        GeofenceStore::new(Arc::new(MemoryStore::new()))
    }

    #[test]
    fn test_list_empty_when_absent() {
        let store = memory_store();
        assert!(store.list().is_empty());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_list_empty_when_corrupt() {
        let backend = Arc::new(MemoryStore::new());
        backend.set(ALARMS_KEY, "{not json").unwrap();
        let store = GeofenceStore::new(backend);

        assert!(store.list().is_empty());
        assert!(store.load().is_err());
        // Writes refuse to clobber data we could not read
        assert!(store.add(fence("A", true)).is_err());
    }

    #[test]
    fn test_add_then_list_round_trip() {
        let dir = tempdir().unwrap();
        let store = GeofenceStore::new(Arc::new(JsonFileStore::new(dir.path().to_path_buf())));

        let a = fence("A", true);
        let b = fence("B", false);
        store.add(a.clone()).unwrap();
        store.add(b.clone()).unwrap();

        // Fresh store over the same directory
        let reopened = GeofenceStore::new(Arc::new(JsonFileStore::new(dir.path().to_path_buf())));
        assert_eq!(reopened.list(), vec![a, b]);
    }

    #[test]
    fn test_round_trip_keeps_computed_coordinates_exact() {
        let dir = tempdir().unwrap();
        let store = GeofenceStore::new(Arc::new(JsonFileStore::new(dir.path().to_path_buf())));

        let origin = GeoPoint::new(41.0082, 28.9784);
        let mut points: Vec<GeoPoint> = (0..36)
            .map(|i| origin.offset(f64::from(i) * 10.0, 0.123 + f64::from(i) * 0.017))
            .collect();
        points.push(GeoPoint::new(-0.913_960_290_000_005_7, 83.631_766_050_000_01));

        let fences: Vec<Geofence> = points
            .iter()
            .map(|p| {
                let draft = GeofenceDraft::new(Destination::new(*p, "Computed"), 0.3);
                Geofence::new(draft, Utc::now()).unwrap()
            })
            .collect();
        for fence in &fences {
            store.add(fence.clone()).unwrap();
        }

        let listed = store.list();
        assert_eq!(listed.len(), fences.len());
        for (stored, original) in listed.iter().zip(&fences) {
            assert_eq!(stored.target.latitude.to_bits(), original.target.latitude.to_bits());
            assert_eq!(stored.target.longitude.to_bits(), original.target.longitude.to_bits());
        }
        assert_eq!(listed, fences);
    }

    #[test]
    fn test_remove_and_missing_id() {
        let store = memory_store();
        let a = fence("A", true);
        let b = fence("B", true);
        store.add(a.clone()).unwrap();
        store.add(b.clone()).unwrap();

        let removed = store.remove(&a.id).unwrap();
        assert_eq!(removed.map(|f| f.id), Some(a.id.clone()));
        assert_eq!(store.list(), vec![b]);

        // Removing again is a no-op
        assert!(store.remove(&a.id).unwrap().is_none());
        assert_eq!(store.list().len(), 1);
    }

    #[test]
    fn test_remove_all_active_keeps_inactive() {
        let store = memory_store();
        let active = fence("Active", true);
        let inactive = fence("Inactive", false);
        store.add(active).unwrap();
        store.add(inactive.clone()).unwrap();

        assert_eq!(store.remove_all_active().unwrap(), 1);
        assert_eq!(store.list(), vec![inactive]);
        assert_eq!(store.remove_all_active().unwrap(), 0);
    }

    #[test]
    fn test_update_replaces_in_place() {
        let store = memory_store();
        let a = fence("A", true);
        let b = fence("B", true);
        store.add(a.clone()).unwrap();
        store.add(b.clone()).unwrap();

        assert!(store.update(a.with_active(false)).unwrap());
        let listed = store.list();
        assert_eq!(listed[0].id, a.id);
        assert!(!listed[0].is_active);
        assert_eq!(listed[1], b);

        assert!(!store.update(fence("Ghost", true)).unwrap());
        assert_eq!(store.get(&b.id), Some(b));
    }

    #[test]
    fn test_circle_cache() {
        let store = memory_store();
        assert!(store.load_circle().is_none());

        let circle = AlarmCircle {
            center: GeoPoint::new(41.0, 29.0),
            radius: 500.0,
        };
        store.save_circle(&circle).unwrap();
        assert_eq!(store.load_circle(), Some(circle));
    }
}
