//! Shared "is an alarm ringing" state.
//!
//! One session exists per running app and every consumer holds a clone of it.
//! At most one alarm rings at a time; `activate` and `deactivate` are the only
//! ways to change the state.

use std::sync::{Arc, Mutex, MutexGuard};

use super::playback::{AlarmPlayback, SoundHandle};

#[derive(Debug, Default)]
struct SessionState {
    active: bool,
    sound: Option<SoundHandle>,
}

#[derive(Clone)]
pub struct AlarmSession {
    state: Arc<Mutex<SessionState>>,
    playback: Arc<dyn AlarmPlayback>,
}

impl AlarmSession {
    /// A fresh, inactive session. `playback` is used to cancel vibration on deactivate.
    pub fn new(playback: Arc<dyn AlarmPlayback>) -> Self {
        Self {
            state: Arc::new(Mutex::new(SessionState::default())),
            playback,
        }
    }

    /// Mark an alarm as ringing with `sound`.
    ///
    /// Returns false and leaves the state untouched if one is already ringing.
    pub fn activate(&self, sound: Option<SoundHandle>) -> bool {
        let mut state = self.lock();
        if state.active {
            return false;
        }
        state.active = true;
        state.sound = sound;
        true
    }

    /// Stop vibrating and clear the session, handing back the sound to release.
    ///
    /// Calling this while inactive does nothing and returns `None`.
    pub fn deactivate(&self) -> Option<SoundHandle> {
        let sound = {
            let mut state = self.lock();
            if !state.active {
                return None;
            }
            state.active = false;
            state.sound.take()
        };
        self.playback.cancel_vibration();
        sound
    }

    pub fn is_active(&self) -> bool {
        self.lock().active
    }

    pub fn sound(&self) -> Option<SoundHandle> {
        self.lock().sound
    }

    fn lock(&self) -> MutexGuard<'_, SessionState> {
        // State is two plain fields, so a poisoned lock is still consistent
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
