//! Notification surface for triggered alarms.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

use crate::core::geofences::model::{Geofence, GeofenceId};

/// Raised when the monitor starts an alarm.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AlarmEvent {
    pub fence_id: GeofenceId,
    pub name: String,
    pub distance_km: f64,
    pub radius_km: f64,
    pub triggered_at: DateTime<Utc>,
}

impl AlarmEvent {
    pub fn new(fence: &Geofence, distance_km: f64, triggered_at: DateTime<Utc>) -> Self {
        Self {
            fence_id: fence.id.clone(),
            name: fence.target.name.clone(),
            distance_km,
            radius_km: fence.radius_km,
            triggered_at,
        }
    }

    pub fn title(&self) -> &'static str {
        "Destination reached!"
    }

    pub fn message(&self) -> String {
        format!(
            "You are {:.0} m from {} (alarm radius {:.0} m).",
            self.distance_km * 1000.0,
            self.name,
            self.radius_km * 1000.0
        )
    }
}

pub trait AlarmNotifier: Send + Sync {
    fn alarm_triggered(&self, event: &AlarmEvent);
}

/// Writes the alert to the log.
pub struct LogNotifier;

impl AlarmNotifier for LogNotifier {
    fn alarm_triggered(&self, event: &AlarmEvent) {
        log::warn!("{} {}", event.title(), event.message());
    }
}

/// Forwards alerts to whoever shows the acknowledgment prompt.
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<AlarmEvent>,
}

impl ChannelNotifier {
    pub fn new(tx: mpsc::UnboundedSender<AlarmEvent>) -> Self {
        Self { tx }
    }
}

impl AlarmNotifier for ChannelNotifier {
    fn alarm_triggered(&self, event: &AlarmEvent) {
        if self.tx.send(event.clone()).is_err() {
            log::warn!("Alarm prompt is gone; {} {}", event.title(), event.message());
        }
    }
}
