//! Sound and vibration output for a ringing alarm.
//!
//! The engine only talks to `AlarmPlayback`; which device actually makes noise
//! is decided when the app wires things up.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::core::error::Result;

/// Opaque reference to a loaded, looping sound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundHandle(u64);

impl SoundHandle {
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    pub const fn id(&self) -> u64 {
        self.0
    }
}

/// Alternating wait/vibrate durations in milliseconds, starting with a wait.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VibrationPattern(Vec<u64>);

impl VibrationPattern {
    pub fn from_millis(steps: Vec<u64>) -> Self {
        Self(steps)
    }

    /// Delay 0, buzz 500, pause 200, buzz 500.
    pub fn alarm() -> Self {
        Self(vec![0, 500, 200, 500])
    }

    pub fn steps(&self) -> &[u64] {
        &self.0
    }

    /// Length of one pass through the pattern.
    pub fn cycle(&self) -> Duration {
        Duration::from_millis(self.0.iter().sum())
    }

    /// Total time spent vibrating per cycle (odd positions).
    pub fn buzz_time(&self) -> Duration {
        Duration::from_millis(self.0.iter().skip(1).step_by(2).sum())
    }
}

impl Default for VibrationPattern {
    fn default() -> Self {
        Self::alarm()
    }
}

impl fmt::Display for VibrationPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let steps: Vec<String> = self.0.iter().map(|s| s.to_string()).collect();
        write!(f, "[{}] ms", steps.join(", "))
    }
}

/// Output side of an alarm: looped sound plus a repeating vibration.
pub trait AlarmPlayback: Send + Sync {
    /// Load the alarm sound, set to loop, without starting it.
    fn load_looping(&self) -> Result<SoundHandle>;

    fn play(&self, handle: SoundHandle) -> Result<()>;

    /// Stop the sound and free it. Unknown handles are ignored.
    fn release(&self, handle: SoundHandle) -> Result<()>;

    /// Start `pattern`, repeating until cancelled.
    fn vibrate(&self, pattern: &VibrationPattern) {
        log::info!("Vibrating with pattern {} (repeating)", pattern);
    }

    fn cancel_vibration(&self) {
        log::info!("Vibration cancelled");
    }
}

/// Playback that only logs. Used when no audio device is configured.
#[derive(Default)]
pub struct SilentPlayback {
    next_id: AtomicU64,
}

impl SilentPlayback {
    pub fn new() -> Self {
        Self::default()
    }
}

impl AlarmPlayback for SilentPlayback {
    fn load_looping(&self) -> Result<SoundHandle> {
        let handle = SoundHandle::new(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        log::debug!("Prepared silent alarm sound #{}", handle.id());
        Ok(handle)
    }

    fn play(&self, handle: SoundHandle) -> Result<()> {
        log::info!("Alarm sound #{} ringing (no audio output configured)", handle.id());
        Ok(())
    }

    fn release(&self, handle: SoundHandle) -> Result<()> {
        log::info!("Alarm sound #{} stopped", handle.id());
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm_pattern() {
        let pattern = VibrationPattern::alarm();
        assert_eq!(pattern.steps(), &[0, 500, 200, 500]);
        assert_eq!(pattern.cycle(), Duration::from_millis(1200));
        assert_eq!(pattern.buzz_time(), Duration::from_millis(1000));
        assert_eq!(pattern.to_string(), "[0, 500, 200, 500] ms");
    }

    #[test]
    fn test_silent_playback_hands_out_distinct_handles() {
        let playback = SilentPlayback::new();
        let a = playback.load_looping().unwrap();
        let b = playback.load_looping().unwrap();
        assert_ne!(a, b);
        assert!(playback.play(a).is_ok());
        assert!(playback.release(a).is_ok());
    }
}
