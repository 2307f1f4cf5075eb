//! Background proximity monitor.
//!
//! A single process-wide task checks the cached position against the active
//! geofences on a fixed interval. It is started and stopped explicitly by the
//! app, independent of whatever is on screen.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use super::coordinator::{Coordinator, TickOutcome};
use super::location::cache::LocationCache;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MonitorState {
    /// No timer running
    Idle,
    /// Checking on every tick
    Watching,
    /// An alarm is ringing; ticks continue but cannot start another one
    Alarming,
}

struct RunningMonitor {
    stop_tx: watch::Sender<bool>,
    task: JoinHandle<()>,
}

pub struct ProximityMonitor {
    coordinator: Arc<Coordinator>,
    location: LocationCache,
    interval: Duration,
    running: Mutex<Option<RunningMonitor>>,
}

impl ProximityMonitor {
    pub fn new(coordinator: Arc<Coordinator>, location: LocationCache, interval: Duration) -> Self {
        Self {
            coordinator,
            location,
            interval,
            running: Mutex::new(None),
        }
    }

    /// Start the timer. Must be called inside a tokio runtime.
    ///
    /// Returns false if the monitor was already running.
    pub fn start(&self) -> bool {
        let mut running = self.lock();
        if running.as_ref().is_some_and(|r| !r.task.is_finished()) {
            return false;
        }

        let (stop_tx, stop_rx) = watch::channel(false);
        let task = tokio::spawn(run_loop(
            self.coordinator.clone(),
            self.location.clone(),
            self.interval,
            stop_rx,
        ));
        *running = Some(RunningMonitor { stop_tx, task });
        log::info!("Proximity monitor started, checking every {:?}", self.interval);
        true
    }

    /// Cancel the timer and wait for the task to end.
    ///
    /// A ringing alarm keeps ringing; only the user can silence it.
    pub async fn stop(&self) -> bool {
        let Some(running) = self.lock().take() else {
            return false;
        };
        let _ = running.stop_tx.send(true);
        if let Err(e) = running.task.await {
            log::error!("Proximity monitor task ended abnormally: {}", e);
        }
        log::info!("Proximity monitor stopped");
        true
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .as_ref()
            .is_some_and(|r| !r.task.is_finished())
    }

    pub fn state(&self) -> MonitorState {
        if !self.is_running() {
            MonitorState::Idle
        } else if self.coordinator.session().is_active() {
            MonitorState::Alarming
        } else {
            MonitorState::Watching
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<RunningMonitor>> {
        self.running.lock().unwrap_or_else(|e| e.into_inner())
    }
}

async fn run_loop(
    coordinator: Arc<Coordinator>,
    location: LocationCache,
    period: Duration,
    mut stop_rx: watch::Receiver<bool>,
) {
    // First check one full interval after start
    let mut ticker = interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let position = location.latest();
                let coordinator = coordinator.clone();
                // Storage and playback calls block; keep them off the async workers
                let checked =
                    tokio::task::spawn_blocking(move || coordinator.tick(position.as_ref())).await;
                match checked {
                    Ok(TickOutcome::Triggered(event)) => {
                        log::info!("Alarm triggered for {} ({})", event.name, event.fence_id);
                    }
                    Ok(TickOutcome::NoPosition) => log::debug!("No position yet, skipping check"),
                    Ok(_) => {}
                    Err(e) => log::error!("Proximity check crashed: {}", e),
                }
            }
            changed = stop_rx.changed() => {
                if changed.is_err() || *stop_rx.borrow() {
                    break;
                }
            }
        }
    }
}
