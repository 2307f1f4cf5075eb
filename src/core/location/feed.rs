//! Location provider backed by a fix log.
//!
//! Tails the file, parses fixes and applies the subscription limits
//! (minimum interval and minimum displacement) before publishing a position.

use std::io;
use std::path::Path;
use std::time::Duration;

use tokio::task::JoinHandle;

use super::cache::LocationCache;
use super::parser;
use super::tailer::FixTailer;
use crate::core::error::{Error, Result};
use crate::core::model::LocationSample;

/// Limits on how often subscribers hear about new positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SubscriptionOptions {
    pub min_interval: Duration,
    pub min_displacement_m: f64,
}

impl Default for SubscriptionOptions {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(5000),
            min_displacement_m: 10.0,
        }
    }
}

/// Drops fixes that arrive too soon or moved too little since the last accepted one.
pub struct UpdateFilter {
    options: SubscriptionOptions,
    last: Option<LocationSample>,
}

impl UpdateFilter {
    pub fn new(options: SubscriptionOptions) -> Self {
        Self {
            options,
            last: None,
        }
    }

    pub fn accept(&mut self, sample: &LocationSample) -> bool {
        if let Some(last) = &self.last {
            // Out-of-order timestamps count as no time passing
            let elapsed = (sample.timestamp - last.timestamp)
                .to_std()
                .unwrap_or(Duration::ZERO);
            let moved_m = last.point.distance_km(&sample.point) * 1000.0;
            if elapsed < self.options.min_interval || moved_m < self.options.min_displacement_m {
                return false;
            }
        }
        self.last = Some(sample.clone());
        true
    }
}

pub struct LocationFeed {
    tailer: FixTailer,
    filter: UpdateFilter,
    latest: Option<LocationSample>,
}

impl LocationFeed {
    /// Open a fix log.
    ///
    /// Fixes already in the file are scanned once so the newest one is available
    /// right away; after that only appended fixes are read.
    pub fn open(path: impl AsRef<Path>, options: SubscriptionOptions) -> Result<Self> {
        let path = path.as_ref();
        let mut tailer = FixTailer::open(path).map_err(|e| open_error(path, e))?;
        tailer.rewind()?;
        let backlog = parser::parse_fixes(&tailer.read_new_lines()?);

        let mut filter = UpdateFilter::new(options);
        let latest = backlog.into_iter().last();
        if let Some(sample) = &latest {
            filter.accept(sample);
        }

        Ok(Self {
            tailer,
            filter,
            latest,
        })
    }

    /// Newly appended fixes that pass the subscription limits.
    pub fn read_updates(&mut self) -> Result<Vec<LocationSample>> {
        let fixes = parser::parse_fixes(&self.tailer.read_new_lines()?);
        if let Some(newest) = fixes.last() {
            self.latest = Some(newest.clone());
        }
        Ok(fixes
            .into_iter()
            .filter(|fix| self.filter.accept(fix))
            .collect())
    }

    /// Best-effort current position, ignoring the subscription limits.
    pub fn current_position(&mut self) -> Result<Option<LocationSample>> {
        let fixes = parser::parse_fixes(&self.tailer.read_new_lines()?);
        for fix in &fixes {
            // Keep the subscription state in step with what we consumed
            self.filter.accept(fix);
        }
        if let Some(newest) = fixes.into_iter().last() {
            self.latest = Some(newest);
        }
        Ok(self.latest.clone())
    }

    pub fn path(&self) -> &Path {
        self.tailer.path()
    }
}

fn open_error(path: &Path, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::PermissionDenied {
        Error::Permission(format!(
            "cannot read location feed {}; grant read access and try again",
            path.display()
        ))
    } else {
        Error::Io(e)
    }
}

/// Publish feed updates into `cache` every `read_interval` until the task is aborted.
pub fn spawn_feed(
    mut feed: LocationFeed,
    cache: LocationCache,
    read_interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        log::info!("Location feed started: {}", feed.path().display());
        if let Some(sample) = feed.latest.clone() {
            cache.update(sample);
        }

        let mut ticker = tokio::time::interval(read_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            ticker.tick().await;
            match feed.read_updates() {
                Ok(updates) => {
                    if let Some(sample) = updates.into_iter().last() {
                        log::debug!(
                            "Position {:.5},{:.5} (accuracy {:?} m)",
                            sample.point.latitude,
                            sample.point.longitude,
                            sample.accuracy_m
                        );
                        cache.update(sample);
                    }
                }
                Err(e) => log::warn!("Error reading location feed: {}", e),
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::geo::GeoPoint;
    use chrono::{TimeZone, Utc};
    use std::fs::File;
    use std::io::Write;
    use tempfile::tempdir;

    fn sample(secs: i64, point: GeoPoint) -> LocationSample {
        LocationSample::new(point, None, Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap())
    }

    #[test]
    fn test_filter_interval_and_displacement() {
        let origin = GeoPoint::new(41.0082, 28.9784);
        let mut filter = UpdateFilter::new(SubscriptionOptions::default());

        assert!(filter.accept(&sample(0, origin)));
        // Far enough but too soon
        assert!(!filter.accept(&sample(2, origin.offset(0.0, 0.05))));
        // Late enough but only 5 m away
        assert!(!filter.accept(&sample(10, origin.offset(0.0, 0.005))));
        // Both limits met
        assert!(filter.accept(&sample(10, origin.offset(0.0, 0.02))));
        // Timestamps going backwards are dropped
        assert!(!filter.accept(&sample(1, origin.offset(0.0, 1.0))));
    }

    #[test]
    fn test_open_primes_latest_fix() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fixes.log");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "2025-01-01T12:00:00Z lat=41.0 lon=29.0").unwrap();
        writeln!(file, "2025-01-01T12:00:10Z lat=41.001 lon=29.0 acc=8").unwrap();

        let mut feed = LocationFeed::open(&path, SubscriptionOptions::default()).unwrap();
        let current = feed.current_position().unwrap().unwrap();
        assert_eq!(current.point, GeoPoint::new(41.001, 29.0));
        assert_eq!(current.accuracy_m, Some(8.0));

        // Nothing new appended yet
        assert!(feed.read_updates().unwrap().is_empty());
    }

    #[test]
    fn test_read_updates_applies_subscription_limits() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fixes.log");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "2025-01-01T12:00:00Z lat=41.0 lon=29.0").unwrap();

        let mut feed = LocationFeed::open(&path, SubscriptionOptions::default()).unwrap();

        writeln!(file, "2025-01-01T12:00:01Z lat=41.01 lon=29.0").unwrap();
        writeln!(file, "2025-01-01T12:00:06Z lat=41.00001 lon=29.0").unwrap();
        writeln!(file, "2025-01-01T12:00:07Z lat=41.002 lon=29.0").unwrap();
        file.sync_all().unwrap();

        let updates = feed.read_updates().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].point, GeoPoint::new(41.002, 29.0));

        // current_position reports the raw newest fix
        assert_eq!(
            feed.current_position().unwrap().unwrap().point,
            GeoPoint::new(41.002, 29.0)
        );
    }

    #[test]
    fn test_binary_garbage_does_not_stall_feed() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fixes.log");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "2025-01-01T12:00:00Z lat=41.0 lon=29.0").unwrap();
        file.write_all(b"\xff\xfe garbage\n").unwrap();

        let mut feed = LocationFeed::open(&path, SubscriptionOptions::default()).unwrap();
        assert_eq!(
            feed.current_position().unwrap().unwrap().point,
            GeoPoint::new(41.0, 29.0)
        );

        file.write_all(b"\x80\x81\n").unwrap();
        writeln!(file, "2025-01-01T12:00:30Z lat=41.01 lon=29.0").unwrap();
        file.sync_all().unwrap();

        let updates = feed.read_updates().unwrap();
        assert_eq!(updates.len(), 1);
        assert_eq!(updates[0].point, GeoPoint::new(41.01, 29.0));
    }

    #[test]
    fn test_missing_feed_is_io_error() {
        let dir = tempdir().unwrap();
        let err = LocationFeed::open(dir.path().join("nope.log"), SubscriptionOptions::default())
            .err()
            .unwrap();
        assert!(matches!(err, Error::Io(_)));
        assert!(!err.is_permission());
    }

    #[tokio::test(start_paused = true)]
    async fn test_spawned_feed_updates_cache() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("fixes.log");
        let mut file = File::create(&path).unwrap();
        writeln!(file, "2025-01-01T12:00:00Z lat=41.0 lon=29.0").unwrap();

        let feed = LocationFeed::open(&path, SubscriptionOptions::default()).unwrap();
        let cache = LocationCache::new();
        let task = spawn_feed(feed, cache.clone(), Duration::from_millis(100));

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(cache.latest().unwrap().point, GeoPoint::new(41.0, 29.0));

        writeln!(file, "2025-01-01T12:00:30Z lat=41.01 lon=29.0").unwrap();
        file.sync_all().unwrap();
        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(cache.latest().unwrap().point, GeoPoint::new(41.01, 29.0));

        task.abort();
    }
}
