use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use super::alarm::playback::VibrationPattern;
use super::geofences::model::MAX_RADIUS_KM;
use super::location::feed::SubscriptionOptions;

const APP_NAME: &str = "geo_alarm";

/// Where positions come from and how often subscribers see them.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct LocationSettings {
    /// Fix log to follow. `None` means no feed is configured.
    pub feed_path: Option<PathBuf>,
    pub min_interval_ms: u64,
    pub min_displacement_m: f64,
    /// How often the feed file is polled for new fixes
    pub read_interval_ms: u64,
}

impl Default for LocationSettings {
    fn default() -> Self {
        Self {
            feed_path: None,
            min_interval_ms: 5000,
            min_displacement_m: 10.0,
            read_interval_ms: 1000,
        }
    }
}

impl LocationSettings {
    pub fn subscription(&self) -> SubscriptionOptions {
        SubscriptionOptions {
            min_interval: Duration::from_millis(self.min_interval_ms),
            min_displacement_m: self.min_displacement_m,
        }
    }

    pub fn read_interval(&self) -> Duration {
        Duration::from_millis(self.read_interval_ms.max(1))
    }
}

/// Place search and naming.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct GeocoderSettings {
    /// Nominatim server. `None` keeps lookups offline.
    pub nominatim_url: Option<String>,
    pub user_agent: String,
    /// Sent as `Accept-Language`
    pub language: Option<String>,
    /// Comma-separated ISO country codes that restrict search results
    pub country_codes: Option<String>,
    pub result_limit: u32,
    pub timeout_ms: u64,
}

impl Default for GeocoderSettings {
    fn default() -> Self {
        Self {
            nominatim_url: Some("https://nominatim.openstreetmap.org".to_string()),
            user_agent: "GeoAlarm/1.0".to_string(),
            language: None,
            country_codes: None,
            result_limit: 5,
            timeout_ms: 10_000,
        }
    }
}

impl GeocoderSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.max(1))
    }
}

/// Application settings, stored as `settings.json` in the config directory.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(default)]
pub struct Settings {
    /// Where geofences and the circle cache are stored
    pub data_dir: PathBuf,
    /// Interval between proximity checks
    pub poll_interval_ms: u64,
    /// Radius used when `add` is not given one
    pub default_radius_km: f64,
    /// Sound file looped while an alarm rings
    pub alarm_sound: Option<PathBuf>,
    pub vibration_pattern: VibrationPattern,
    pub location: LocationSettings,
    pub geocoder: GeocoderSettings,
    /// Default log filter; `RUST_LOG` wins when set
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        let data_dir = ProjectDirs::from("", "", APP_NAME)
            .map(|dirs| dirs.data_dir().to_path_buf())
            .unwrap_or_else(|| PathBuf::from("./data"));

        Self {
            data_dir,
            poll_interval_ms: 5000,
            default_radius_km: MAX_RADIUS_KM,
            alarm_sound: None,
            vibration_pattern: VibrationPattern::alarm(),
            location: LocationSettings::default(),
            geocoder: GeocoderSettings::default(),
            log_level: "info".to_string(),
        }
    }
}

impl Settings {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    pub fn new(app_config_dir: PathBuf) -> Self {
        Self {
            config_path: app_config_dir.join("settings.json"),
        }
    }

    /// Platform config directory for this app, if the platform has one.
    pub fn default_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", APP_NAME).map(|dirs| dirs.config_dir().to_path_buf())
    }

    pub fn path(&self) -> &Path {
        &self.config_path
    }

    pub fn exists(&self) -> bool {
        self.config_path.exists()
    }

    /// Load settings, falling back to defaults when the file is missing or malformed.
    pub fn load(&self) -> Settings {
        if self.config_path.exists() {
            if let Ok(content) = fs::read_to_string(&self.config_path) {
                match serde_json::from_str(&content) {
                    Ok(settings) => return settings,
                    Err(e) => log::warn!(
                        "Ignoring malformed settings {}: {}",
                        self.config_path.display(),
                        e
                    ),
                }
            }
        }
        Settings::default()
    }

    pub fn save(&self, settings: &Settings) -> io::Result<()> {
        // Ensure directory exists
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(settings)?;
        fs::write(&self.config_path, content)
    }
}
