//! AirMonitor - air quality at the installations nearest to you.
//!
//! Fetches current readings from Airly, keeps them in a local snapshot and
//! shows the snapshot when the network is unavailable.

use std::io;

use anyhow::{Context, Result};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use airmonitor_core::models::{Installation, Measurement};
use airmonitor_core::utils::{format_level, format_reading, format_window, truncate_string};
use airmonitor_core::{AirMonitor, ApiKeyStore, Config, SnapshotCache};

// ============================================================================
// Constants
// ============================================================================

/// Width of the installation name column in the list view
const NAME_COLUMN_WIDTH: usize = 32;

/// Log file name prefix inside the cache directory
const LOG_FILE_PREFIX: &str = "airmonitor.log";

const USAGE: &str = "\
Usage: airmonitor [COMMAND]

Commands:
  refresh      Fetch current readings and update the local snapshot (default)
  cached       Show the local snapshot without network access
  show <ID>    Show all readings of one cached installation
  set-key      Store the Airly API key in the OS keychain
  forget-key   Remove the stored API key from the OS keychain
  help         Show this message

Environment:
  AIRLY_API_KEY   API key (overrides the keychain)
  RUST_LOG        Log filter, e.g. RUST_LOG=debug";

/// Initialize the tracing subscriber for logging.
/// The returned guard flushes the file log when dropped.
fn init_tracing(config: &Config) -> Option<WorkerGuard> {
    // Use RUST_LOG env var to control log level (e.g., RUST_LOG=debug)
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    let (file_layer, guard) = match config.cache_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (
                Some(fmt::layer().with_ansi(false).with_writer(writer)),
                Some(guard),
            )
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(io::stderr))
        .with(file_layer)
        .with(filter)
        .init();

    guard
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env file if present (silently ignore if not found)
    let _ = dotenvy::dotenv();

    let config = Config::load()?;
    let _log_guard = init_tracing(&config);

    let args: Vec<String> = std::env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("refresh");

    match command {
        "refresh" => refresh(&config).await,
        "cached" => show_cached(&config),
        "show" => {
            let id = args
                .get(1)
                .ok_or_else(|| anyhow::anyhow!("Missing installation id\n\n{}", USAGE))?;
            show_installation(&config, id)
        }
        "set-key" => set_key(),
        "forget-key" => {
            ApiKeyStore::delete()?;
            println!("API key removed from keychain.");
            Ok(())
        }
        "help" | "--help" | "-h" => {
            println!("{}", USAGE);
            Ok(())
        }
        other => Err(anyhow::anyhow!("Unknown command: {}\n\n{}", other, USAGE)),
    }
}

async fn refresh(config: &Config) -> Result<()> {
    let api_key = config.api_key()?.ok_or_else(|| {
        anyhow::anyhow!("No Airly API key. Set AIRLY_API_KEY or run `airmonitor set-key`.")
    })?;

    let monitor = AirMonitor::from_config(config, &api_key)?;
    let readings = monitor.measurements_or_cached().await?;
    info!(
        count = readings.measurements.len(),
        from_cache = readings.from_cache,
        "Loaded readings"
    );

    if readings.from_cache {
        eprintln!("Could not refresh, showing cached readings.");
    }
    print_list(&readings.measurements);

    monitor.cache().close()?;
    Ok(())
}

fn open_cache(config: &Config) -> Result<SnapshotCache> {
    let path = config.database_path()?;
    SnapshotCache::open(&path)
        .with_context(|| format!("Failed to open snapshot cache at {}", path.display()))
}

fn show_cached(config: &Config) -> Result<()> {
    let cache = open_cache(config)?;
    print_list(&cache.measurements()?);
    cache.close()?;
    Ok(())
}

fn show_installation(config: &Config, id: &str) -> Result<()> {
    let cache = open_cache(config)?;
    let measurements = cache.measurements()?;

    match measurements.iter().find(|m| m.installation.id == id) {
        Some(measurement) => print_detail(measurement),
        None => match cache.installation(id)? {
            Some(installation) => {
                print_installation(&installation);
                println!("\nNo cached readings for this installation.");
            }
            None => return Err(anyhow::anyhow!("Installation {} is not cached", id)),
        },
    }

    cache.close()?;
    Ok(())
}

fn set_key() -> Result<()> {
    let key = rpassword::prompt_password("Airly API key: ").context("Failed to read API key")?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow::anyhow!("API key must not be empty"));
    }
    ApiKeyStore::store(key)?;
    println!("API key stored in keychain.");
    Ok(())
}

// ============================================================================
// Output
// ============================================================================

fn print_list(measurements: &[Measurement]) {
    if measurements.is_empty() {
        println!("No readings available.");
        return;
    }

    println!(
        "{:<6} {:<width$} {:>6} {:<12} {:>6} {:>6}",
        "ID",
        "INSTALLATION",
        "CAQI",
        "LEVEL",
        "PM2.5",
        "PM10",
        width = NAME_COLUMN_WIDTH
    );
    for m in measurements {
        let index = m.current.primary_index();
        println!(
            "{:<6} {:<width$} {:>6} {:<12} {:>6} {:>6}",
            m.installation.id,
            truncate_string(&m.installation.display_name(), NAME_COLUMN_WIDTH),
            format_reading(index.and_then(|i| i.value)),
            index
                .and_then(|i| i.level.as_deref())
                .map(format_level)
                .unwrap_or_else(|| "-".to_string()),
            format_reading(m.current.value("PM25")),
            format_reading(m.current.value("PM10")),
            width = NAME_COLUMN_WIDTH
        );
    }

    if let Some(first) = measurements.first() {
        println!(
            "\n{}",
            format_window(first.current.from_date_time, first.current.till_date_time)
        );
    }
}

fn print_installation(installation: &Installation) {
    println!("{}", installation.display_name());
    println!(
        "  Location:  {:.5}, {:.5}",
        installation.location.latitude, installation.location.longitude
    );
    if let Some(elevation) = installation.elevation {
        println!("  Elevation: {:.0} m", elevation);
    }
    if let Some(name) = installation.sponsor.as_ref().and_then(|s| s.name.as_deref()) {
        println!("  Sponsor:   {}", name);
    }
}

fn print_detail(measurement: &Measurement) {
    let current = &measurement.current;
    print_installation(&measurement.installation);
    println!(
        "  Window:    {}",
        format_window(current.from_date_time, current.till_date_time)
    );

    if !current.indexes.is_empty() {
        println!("\nIndexes");
        for index in &current.indexes {
            println!(
                "  {:<12} {:>6}  {}",
                index.name,
                format_reading(index.value),
                index.description.as_deref().unwrap_or("")
            );
            if let Some(ref advice) = index.advice {
                println!("  {:<12} {:>6}  {}", "", "", advice);
            }
        }
    }

    if !current.values.is_empty() {
        println!("\nValues");
        for value in &current.values {
            println!("  {:<12} {:>8.2}", value.name, value.value);
        }
    }

    if !current.standards.is_empty() {
        println!("\nStandards");
        for standard in &current.standards {
            println!(
                "  {:<6} {:<8} limit {:>6.1}  {:>5.0}%",
                standard.name, standard.pollutant, standard.limit, standard.percent
            );
        }
    }
}
