use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use chrono::Local;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::core::{
    alarm::{
        notify::{AlarmEvent, AlarmNotifier, ChannelNotifier, LogNotifier},
        playback::{AlarmPlayback, SilentPlayback},
        session::AlarmSession,
    },
    config::{ConfigManager, GeocoderSettings, Settings},
    coordinator::Coordinator,
    geo::GeoPoint,
    geocode,
    geofences::{
        model::{GeofenceDraft, GeofenceId, MAX_RADIUS_KM},
        store::GeofenceStore,
    },
    location::{
        cache::LocationCache,
        feed::{self, LocationFeed},
    },
    model::Destination,
    monitor::ProximityMonitor,
    storage::JsonFileStore,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding settings.json (defaults to the platform config dir)
    #[arg(long, global = true)]
    config_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Write default settings
    Init {
        #[arg(long, short)]
        force: bool,
    },
    /// Set an alarm for a destination found by name or given as coordinates
    Add {
        /// Free-text place search
        #[arg(
            long,
            short,
            conflicts_with_all = ["lat", "lon"],
            required_unless_present_all = ["lat", "lon"]
        )]
        query: Option<String>,
        #[arg(long, allow_hyphen_values = true, requires = "lon")]
        lat: Option<f64>,
        #[arg(long, allow_hyphen_values = true, requires = "lat")]
        lon: Option<f64>,
        /// Which search result to use (1 = best match)
        #[arg(long, default_value_t = 1)]
        pick: usize,
        /// Trigger radius in km (at most 0.5)
        #[arg(long, short)]
        radius: Option<f64>,
        /// Display name (looked up when omitted)
        #[arg(long, short)]
        name: Option<String>,
    },
    /// Show scheduled alarms
    List,
    /// Delete an alarm
    Remove { id: String },
    /// Change an alarm's radius
    Radius { id: String, km: f64 },
    /// Clear every active alarm (a ringing `watch` is silenced from its own prompt)
    #[command(alias = "silence")]
    Clear,
    /// Follow the location feed and ring when a destination is reached
    Watch {
        /// Fix log to follow (overrides settings)
        #[arg(long)]
        feed: Option<PathBuf>,
    },
}

pub fn run() -> ExitCode {
    let args = Args::parse();

    let config_dir = args
        .config_dir
        .or_else(ConfigManager::default_config_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    let config_manager = ConfigManager::new(config_dir);
    let settings = config_manager.load();

    init_logging(&settings.log_level);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to start runtime: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(execute(args.command, settings, &config_manager)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(message) => {
            eprintln!("Error: {}", message);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(default_level: &str) {
    // RUST_LOG overrides the level from settings
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(env_filter)
        .try_init();
}

async fn execute(
    command: Command,
    settings: Settings,
    config_manager: &ConfigManager,
) -> Result<(), String> {
    match command {
        Command::Init { force } => init_settings(config_manager, force),
        Command::Add {
            query,
            lat,
            lon,
            pick,
            radius,
            name,
        } => {
            let geocoder = settings.geocoder.clone();
            let mut destination = match (query, lat, lon) {
                (Some(query), _, _) => find_destination(geocoder, query, pick).await?,
                (None, Some(lat), Some(lon)) => {
                    let point = GeoPoint::new(lat, lon);
                    match &name {
                        Some(name) => Destination::new(point, name.clone()),
                        None => Destination::new(point, lookup_name(geocoder, point).await?),
                    }
                }
                _ => return Err("pass --query or both --lat and --lon".to_string()),
            };
            if let Some(name) = name {
                destination.name = name;
            }

            let coordinator = build_coordinator(&settings, Arc::new(LogNotifier));
            add_alarm(&coordinator, &settings, destination, radius)
        }
        Command::List => {
            let coordinator = build_coordinator(&settings, Arc::new(LogNotifier));
            print_alarms(coordinator.store());
            Ok(())
        }
        Command::Remove { id } => {
            let coordinator = build_coordinator(&settings, Arc::new(LogNotifier));
            let removed = coordinator
                .delete_geofence(&GeofenceId::from(id.clone()))
                .map_err(|e| format!("could not delete alarm: {}", e))?;
            if removed {
                println!("Alarm {} deleted.", id);
            } else {
                println!("No alarm with id {}.", id);
            }
            Ok(())
        }
        Command::Radius { id, km } => {
            let coordinator = build_coordinator(&settings, Arc::new(LogNotifier));
            match coordinator
                .update_radius(&GeofenceId::from(id.clone()), km)
                .map_err(|e| format!("could not change radius: {}", e))?
            {
                Some(fence) => {
                    println!("Alarm {} now rings within {:.2} km.", id, fence.radius_km)
                }
                None => println!("No alarm with id {}.", id),
            }
            Ok(())
        }
        Command::Clear => {
            let coordinator = build_coordinator(&settings, Arc::new(LogNotifier));
            let removed = coordinator
                .acknowledge()
                .map_err(|e| format!("could not clear alarms: {}", e))?;
            println!("Cleared {} active alarm(s).", removed);
            Ok(())
        }
        Command::Watch { feed } => watch(settings, feed).await,
    }
}

fn init_settings(config_manager: &ConfigManager, force: bool) -> Result<(), String> {
    if config_manager.exists() && !force {
        println!(
            "Settings already exist at {} (use --force to overwrite).",
            config_manager.path().display()
        );
        return Ok(());
    }
    config_manager
        .save(&Settings::default())
        .map_err(|e| format!("could not write settings: {}", e))?;
    println!("Wrote default settings to {}.", config_manager.path().display());
    Ok(())
}

fn build_playback(settings: &Settings) -> Arc<dyn AlarmPlayback> {
    #[cfg(feature = "audio")]
    if let Some(path) = &settings.alarm_sound {
        match crate::core::alarm::audio::RodioPlayback::new(path.clone()) {
            Ok(playback) => return Arc::new(playback),
            Err(e) => log::warn!("Audio output unavailable, alarms will be silent: {}", e),
        }
    }

    #[cfg(not(feature = "audio"))]
    if settings.alarm_sound.is_some() {
        log::info!("Built without the `audio` feature; alarm sound setting ignored");
    }

    Arc::new(SilentPlayback::new())
}

fn build_coordinator(settings: &Settings, notifier: Arc<dyn AlarmNotifier>) -> Arc<Coordinator> {
    let store = GeofenceStore::new(Arc::new(JsonFileStore::new(settings.data_dir.clone())));
    let playback = build_playback(settings);
    let session = AlarmSession::new(playback.clone());
    Arc::new(Coordinator::new(
        store,
        session,
        playback,
        notifier,
        settings.vibration_pattern.clone(),
    ))
}

// The geocoder uses a blocking HTTP client, so it is built and dropped off the async workers
async fn lookup_name(settings: GeocoderSettings, point: GeoPoint) -> Result<String, String> {
    tokio::task::spawn_blocking(move || {
        let geocoder = geocode::from_settings(&settings);
        geocode::resolve_name(geocoder.as_ref(), &point)
    })
    .await
    .map_err(|e| format!("place lookup crashed: {}", e))
}

async fn find_destination(
    settings: GeocoderSettings,
    query: String,
    pick: usize,
) -> Result<Destination, String> {
    let lookup = query.clone();
    let mut found = tokio::task::spawn_blocking(move || {
        let geocoder = geocode::from_settings(&settings);
        geocode::search_destinations(geocoder.as_ref(), &lookup)
    })
    .await
    .map_err(|e| format!("place search crashed: {}", e))?;

    if found.is_empty() {
        return Err(format!(
            "no places found for {:?}; try --lat/--lon instead",
            query
        ));
    }
    for (i, place) in found.iter().enumerate() {
        println!(
            "{:>2}. {} ({:.5}, {:.5})",
            i + 1,
            place.address.as_deref().unwrap_or(&place.name),
            place.latitude,
            place.longitude
        );
    }
    if pick == 0 || pick > found.len() {
        return Err(format!("--pick must be between 1 and {}", found.len()));
    }
    Ok(found.swap_remove(pick - 1))
}

fn add_alarm(
    coordinator: &Coordinator,
    settings: &Settings,
    destination: Destination,
    radius: Option<f64>,
) -> Result<(), String> {
    let requested = radius.unwrap_or(settings.default_radius_km);
    let draft = GeofenceDraft::new(destination, requested);

    let fence = coordinator
        .set_alarm(draft)
        .map_err(|e| format!("could not save alarm: {}", e))?;
    if requested > MAX_RADIUS_KM {
        println!("Radius limited to {:.1} km.", MAX_RADIUS_KM);
    }
    println!(
        "Alarm {} set: {} within {:.2} km.",
        fence.id, fence.target.name, fence.radius_km
    );
    Ok(())
}

fn print_alarms(store: &GeofenceStore) {
    let fences = store.list();
    if fences.is_empty() {
        println!("No alarms yet.");
        return;
    }
    for fence in fences {
        println!(
            "{}  {}  {:.2} km  {}  (created {})",
            fence.id,
            if fence.is_active { "active  " } else { "inactive" },
            fence.radius_km,
            fence.target.name,
            fence.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M")
        );
    }
}

fn show_prompt(event: &AlarmEvent) {
    // Terminal bell stands in for the system notification
    println!("\u{7}\n*** {} {}", event.title(), event.message());
    println!("Press Enter to silence.");
}

async fn watch(settings: Settings, feed_override: Option<PathBuf>) -> Result<(), String> {
    let feed_path = feed_override
        .or_else(|| settings.location.feed_path.clone())
        .ok_or("no location feed configured; pass --feed or set location.feed_path")?;

    // Location access must work before the monitor starts
    let location_feed =
        LocationFeed::open(&feed_path, settings.location.subscription()).map_err(|e| {
            if e.is_permission() {
                format!("location access needed: {}", e)
            } else {
                format!("could not open location feed: {}", e)
            }
        })?;

    let (tx, mut alarms_rx) = mpsc::unbounded_channel();
    let coordinator = build_coordinator(&settings, Arc::new(ChannelNotifier::new(tx)));
    let cache = LocationCache::new();
    let feed_task = feed::spawn_feed(
        location_feed,
        cache.clone(),
        settings.location.read_interval(),
    );

    let monitor = ProximityMonitor::new(coordinator.clone(), cache, settings.poll_interval());
    monitor.start();

    println!(
        "Watching {} active alarm(s). Commands: Enter/s = silence, l = list, q = quit.",
        coordinator.store().list().iter().filter(|f| f.is_active).count()
    );

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            Some(event) = alarms_rx.recv() => show_prompt(&event),
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match line.trim() {
                    "" | "s" | "silence" => {
                        if coordinator.session().is_active() {
                            match coordinator.acknowledge() {
                                Ok(removed) => {
                                    println!("Alarm silenced, cleared {} active alarm(s).", removed)
                                }
                                Err(e) => {
                                    println!("Alarm silenced, but clearing alarms failed: {}", e)
                                }
                            }
                        } else {
                            println!("No alarm is ringing.");
                        }
                    }
                    "l" | "list" => print_alarms(coordinator.store()),
                    "q" | "quit" => break,
                    other => println!("Unknown command: {}", other),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    log::warn!("Error reading stdin: {}", e);
                    stdin_open = false;
                }
            },
        }
    }

    monitor.stop().await;
    feed_task.abort();
    // Leaving the app releases the audio device
    coordinator.silence();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> Result<Command, clap::Error> {
        Args::try_parse_from(std::iter::once("geo-alarm").chain(args.iter().copied()))
            .map(|args| args.command)
    }

    #[test]
    fn test_clear_keeps_silence_alias() {
        assert!(matches!(parse(&["clear"]), Ok(Command::Clear)));
        assert!(matches!(parse(&["silence"]), Ok(Command::Clear)));
    }

    #[test]
    fn test_add_takes_query_or_coordinates() {
        match parse(&["add", "--query", "Galata Tower", "--pick", "2"]) {
            Ok(Command::Add {
                query, pick, lat, ..
            }) => {
                assert_eq!(query.as_deref(), Some("Galata Tower"));
                assert_eq!(pick, 2);
                assert_eq!(lat, None);
            }
            _ => panic!("expected add with a query"),
        }

        match parse(&["add", "--lat", "-33.86", "--lon", "151.2", "-r", "0.3"]) {
            Ok(Command::Add {
                lat, lon, radius, ..
            }) => {
                assert_eq!(lat, Some(-33.86));
                assert_eq!(lon, Some(151.2));
                assert_eq!(radius, Some(0.3));
            }
            _ => panic!("expected add with coordinates"),
        }

        assert!(parse(&["add"]).is_err());
        assert!(parse(&["add", "--lat", "41.0"]).is_err());
        assert!(parse(&["add", "-q", "Galata", "--lat", "41.0", "--lon", "29.0"]).is_err());
    }
}
