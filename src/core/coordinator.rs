use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;

use super::alarm::notify::{AlarmEvent, AlarmNotifier};
use super::alarm::playback::{AlarmPlayback, VibrationPattern};
use super::alarm::session::AlarmSession;
use super::error::Result;
use super::geofences::model::{AlarmCircle, Geofence, GeofenceDraft, GeofenceId};
use super::geofences::store::GeofenceStore;
use super::model::LocationSample;

/// Result of one proximity check.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    /// No position has been received yet
    NoPosition,
    /// A previous check was still running
    Busy,
    /// Reading fences or computing a distance failed; nothing happened
    Failed,
    /// No active fence contains the position
    Clear { checked: usize },
    /// An alarm started for this fence
    Triggered(AlarmEvent),
    /// Fences are in range but an alarm is already ringing
    AlreadyAlarming { in_range: usize },
}

/// Clears the in-flight flag when a tick ends, even by unwinding.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Ties the fence store, alarm session and outputs together.
///
/// Every user action and every monitor tick goes through here.
pub struct Coordinator {
    store: GeofenceStore,
    session: AlarmSession,
    playback: Arc<dyn AlarmPlayback>,
    notifier: Arc<dyn AlarmNotifier>,
    vibration: VibrationPattern,
    tick_in_flight: AtomicBool,
}

impl Coordinator {
    pub fn new(
        store: GeofenceStore,
        session: AlarmSession,
        playback: Arc<dyn AlarmPlayback>,
        notifier: Arc<dyn AlarmNotifier>,
        vibration: VibrationPattern,
    ) -> Self {
        Self {
            store,
            session,
            playback,
            notifier,
            vibration,
            tick_in_flight: AtomicBool::new(false),
        }
    }

    pub fn store(&self) -> &GeofenceStore {
        &self.store
    }

    pub fn session(&self) -> &AlarmSession {
        &self.session
    }

    /// Compare `position` against every active fence and ring on the first hit.
    pub fn tick(&self, position: Option<&LocationSample>) -> TickOutcome {
        let Some(position) = position else {
            return TickOutcome::NoPosition;
        };

        if self.tick_in_flight.swap(true, Ordering::SeqCst) {
            log::debug!("Skipping proximity check, previous one still running");
            return TickOutcome::Busy;
        }
        let _in_flight = InFlight(&self.tick_in_flight);
        self.evaluate(position)
    }

    fn evaluate(&self, position: &LocationSample) -> TickOutcome {
        let fences = match self.store.load() {
            Ok(fences) => fences,
            Err(e) => {
                log::warn!("Proximity check abandoned, cannot read geofences: {}", e);
                return TickOutcome::Failed;
            }
        };

        // Distances first, so a bad value abandons the tick before anything rings
        let mut candidates = Vec::new();
        for fence in fences.iter().filter(|f| f.is_active) {
            let distance_km = position.point.distance_km(&fence.center());
            if !distance_km.is_finite() {
                log::warn!(
                    "Proximity check abandoned, bad distance to geofence {}",
                    fence.id
                );
                return TickOutcome::Failed;
            }
            log::debug!(
                "Geofence {} ({}): {:.3} km away, radius {:.3} km",
                fence.id,
                fence.target.name,
                distance_km,
                fence.radius_km
            );
            candidates.push((fence, distance_km));
        }

        let checked = candidates.len();
        let mut in_range = 0;
        for (fence, distance_km) in candidates {
            if !fence.contains_distance(distance_km) {
                continue;
            }
            in_range += 1;
            if let Some(event) = self.trigger(fence, distance_km) {
                return TickOutcome::Triggered(event);
            }
        }

        if in_range > 0 {
            TickOutcome::AlreadyAlarming { in_range }
        } else {
            TickOutcome::Clear { checked }
        }
    }

    fn trigger(&self, fence: &Geofence, distance_km: f64) -> Option<AlarmEvent> {
        if self.session.is_active() {
            return None;
        }

        let sound = match self.playback.load_looping() {
            Ok(handle) => Some(handle),
            Err(e) => {
                log::error!("Alarm sound unavailable, alarming without it: {}", e);
                None
            }
        };

        if !self.session.activate(sound) {
            if let Some(handle) = sound {
                if let Err(e) = self.playback.release(handle) {
                    log::error!("Failed to release unused alarm sound: {}", e);
                }
            }
            return None;
        }

        log::info!(
            "Entered geofence {} ({}): {:.0} m from target",
            fence.id,
            fence.target.name,
            distance_km * 1000.0
        );
        self.playback.vibrate(&self.vibration);
        if let Some(handle) = sound {
            if let Err(e) = self.playback.play(handle) {
                log::error!("Failed to start alarm sound: {}", e);
            }
        }

        let event = AlarmEvent::new(fence, distance_km, Utc::now());
        self.notifier.alarm_triggered(&event);
        Some(event)
    }

    /// Create and persist an active fence from what the user confirmed.
    pub fn set_alarm(&self, draft: GeofenceDraft) -> Result<Geofence> {
        let fence = Geofence::new(draft, Utc::now())?;
        self.store.add(fence.clone())?;
        self.remember_circle(&fence);
        log::info!(
            "Geofence {} set: {} within {:.1} km",
            fence.id,
            fence.target.name,
            fence.radius_km
        );
        Ok(fence)
    }

    /// Change a fence's radius (clamped). Returns the stored fence, or `None` if unknown.
    pub fn update_radius(&self, id: &GeofenceId, radius_km: f64) -> Result<Option<Geofence>> {
        let Some(current) = self.store.get(id) else {
            return Ok(None);
        };
        let updated = current.with_radius(radius_km)?;
        if !self.store.update(updated.clone())? {
            return Ok(None);
        }
        self.remember_circle(&updated);
        Ok(Some(updated))
    }

    /// Silence the alarm and drop every active fence.
    ///
    /// Returns how many fences were removed.
    pub fn acknowledge(&self) -> Result<usize> {
        self.silence();
        let removed = self.store.remove_all_active()?;
        log::info!("Alarm acknowledged, removed {} active geofence(s)", removed);
        Ok(removed)
    }

    /// Delete one fence; a ringing alarm is silenced when the fence existed.
    pub fn delete_geofence(&self, id: &GeofenceId) -> Result<bool> {
        let removed = self.store.remove(id)?;
        if removed.is_some() && self.session.is_active() {
            self.silence();
        }
        Ok(removed.is_some())
    }

    /// Stop sound and vibration. Returns false if nothing was ringing.
    pub fn silence(&self) -> bool {
        let was_active = self.session.is_active();
        if let Some(handle) = self.session.deactivate() {
            if let Err(e) = self.playback.release(handle) {
                log::error!("Failed to stop alarm sound: {}", e);
            }
        }
        was_active
    }

    fn remember_circle(&self, fence: &Geofence) {
        if let Err(e) = self.store.save_circle(&AlarmCircle::for_fence(fence)) {
            log::warn!("Failed to save radius circle: {}", e);
        }
    }
}
