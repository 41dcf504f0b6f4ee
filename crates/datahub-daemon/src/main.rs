//! Data Hub daemon
//!
//! Hosts the resource tree, restores persisted defaults, wires configured
//! observations to their sources and runs the built-in sensor client.

mod config;
mod defaults;
mod sensor;

use anyhow::Result;
use clap::Parser;
use datahub_core::{Hub, SampleValue};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use config::Config;
use defaults::DefaultsFile;
use sensor::SensorClient;

/// How often to re-check for a period while the sensor is idle
const IDLE_POLL: Duration = Duration::from_millis(250);

#[derive(Parser, Debug)]
#[command(name = "datahub")]
#[command(about = "Data Hub: routes timestamped samples between apps")]
#[command(version)]
struct Args {
    /// Configuration file path
    #[arg(short, long, default_value = "datahub.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Stop after this many sensor samples
    #[arg(short, long)]
    ticks: Option<u64>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Data Hub v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(&args.config)?;
    let defaults_path = PathBuf::from(&config.daemon.defaults_path);

    let mut hub = Hub::new(config.hub.clone());
    provision(&mut hub, &config, &defaults_path)?;

    if config.sensor.enabled {
        run_sensor(&mut hub, &config, args.ticks).await?;
    } else {
        info!("Sensor disabled, waiting for Ctrl-C");
        tokio::signal::ctrl_c().await?;
    }

    report_observations(&mut hub, &config);

    DefaultsFile::from_hub(&hub).save(&defaults_path)?;
    info!(path = %defaults_path.display(), "Defaults saved");
    Ok(())
}

/// Build the startup tree: app namespaces, stored defaults, observations
fn provision(hub: &mut Hub, config: &Config, defaults_path: &Path) -> Result<()> {
    let root = hub.tree().root();
    for app in &config.apps {
        hub.tree_mut().get_entry(root, &format!("/app/{}", app.name))?;
        info!(app = %app.name, "App namespace provisioned");
    }

    DefaultsFile::load_or_create(defaults_path)?.restore_into(hub);

    for obs in &config.observations {
        hub.create_observation(&obs.path, obs.data_type, &obs.units, obs.filter.clone())?;
        info!(path = %obs.path, data_type = %obs.data_type, "Observation created");
    }
    link_sources(hub, config);
    Ok(())
}

/// Connect each observation to its configured source
///
/// Sources missing from the tree get a Placeholder so the link survives
/// until the producing app creates the real resource.
fn link_sources(hub: &mut Hub, config: &Config) {
    let root = hub.tree().root();
    for obs in &config.observations {
        let Some(source) = &obs.source else {
            continue;
        };
        let linked = hub
            .tree_mut()
            .get_resource(root, source)
            .and_then(|_| hub.set_source(&obs.path, source));
        if let Err(e) = linked {
            warn!(path = %obs.path, source = %source, error = %e, "Could not link observation");
        }
    }
}

async fn run_sensor(hub: &mut Hub, config: &Config, max_ticks: Option<u64>) -> Result<()> {
    let app = &config.sensor.app;
    let mut sensor = SensorClient::start(hub, app)?;

    if sensor.period().is_none() {
        let path = format!("/app/{}/period", app);
        hub.push_path(&path, 0.0, SampleValue::Numeric(config.sensor.period_secs))?;
    }

    let mut ticks = 0u64;
    loop {
        if max_ticks.is_some_and(|max| ticks >= max) {
            info!(ticks, "Tick limit reached");
            break;
        }
        let (wait, sample) = match sensor.period() {
            Some(period) => (period, true),
            None => (IDLE_POLL, false),
        };
        tokio::select! {
            _ = tokio::time::sleep(wait) => {
                if sample {
                    sensor.tick(hub)?;
                    // A recreated source loses its links.
                    link_sources(hub, config);
                    ticks += 1;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Shutting down");
                break;
            }
        }
    }

    sensor.stop(hub);
    Ok(())
}

fn report_observations(hub: &mut Hub, config: &Config) {
    for obs in &config.observations {
        let Ok(entry) = hub.resolve(&obs.path) else {
            continue;
        };
        match hub.stats(entry, None) {
            Ok(Some(stats)) => info!(
                path = %obs.path,
                count = stats.count,
                min = stats.min,
                max = stats.max,
                mean = stats.mean,
                std_dev = stats.std_dev,
                "Observation summary"
            ),
            Ok(None) => info!(path = %obs.path, "Observation buffered nothing"),
            Err(e) => warn!(path = %obs.path, error = %e, "Could not read observation"),
        }
    }
}
