//! Alarm output and session state.
//!
//! Architecture:
//! - session.rs: the shared "alarm ringing" flag and its sound handle
//! - playback.rs: sound/vibration output trait and the silent backend
//! - audio.rs: rodio backend (feature `audio`)
//! - notify.rs: alarm events and notification sinks

#[cfg(feature = "audio")]
pub mod audio;
pub mod notify;
pub mod playback;
pub mod session;
