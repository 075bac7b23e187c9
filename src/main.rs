//! Command-line harness for astro-control.
//!
//! Connects a simulated telescope or focuser through the device manager,
//! optionally issues one command, and prints every published event as a JSON
//! line on stdout. Logs go to stderr.
//!
//! ```bash
//! RUST_LOG=debug astro-control --seconds 5 telescope --slew 7.5 -10
//! astro-control focuser --move-by 250
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::{json, Value};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use astro_control::hardware::{SimulatedFocuser, SimulatedTelescope};
use astro_control::{
    AppConfig, DeviceEvent, DeviceKind, DeviceManager, FocuserManager, ManagerOptions,
    Subscription, TelescopeManager,
};

/// Command line arguments
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Drive a simulated telescope or focuser and print its events"
)]
struct Args {
    /// Configuration file; missing files fall back to defaults
    #[arg(short, long, default_value = "config/astro-control.toml")]
    config: PathBuf,

    /// How long to watch events after connecting, in seconds
    #[arg(short, long, default_value_t = 10)]
    seconds: u64,

    #[command(subcommand)]
    device: DeviceCommand,
}

#[derive(Subcommand, Debug)]
enum DeviceCommand {
    /// Connect a simulated telescope mount
    Telescope {
        /// Slew to RA (hours) and Dec (degrees) once connected
        #[arg(
            long,
            num_args = 2,
            value_names = ["RA", "DEC"],
            allow_negative_numbers = true
        )]
        slew: Option<Vec<f64>>,
    },
    /// Connect a simulated focuser
    Focuser {
        /// Move by this many steps once connected
        #[arg(long, allow_negative_numbers = true)]
        move_by: Option<i32>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = AppConfig::load_from(&args.config)
        .with_context(|| format!("loading configuration from {}", args.config.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.application.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let watch_for = Duration::from_secs(args.seconds);
    match args.device {
        DeviceCommand::Telescope { slew } => {
            let sim = SimulatedTelescope::new();
            let manager = TelescopeManager::new(
                sim.factory(),
                ManagerOptions::from_config(&config, &config.telescope),
            );
            let mut events = manager.subscribe();
            manager.connect_configured()?;
            info!("telescope connected at {}", config.telescope.endpoint());

            if let Some(&[ra, dec]) = slew.as_deref() {
                manager.slew_to_coordinates_async(ra, dec)?;
            }
            watch(&mut events, watch_for).await;
            finish(&manager, &mut events)?;
        }
        DeviceCommand::Focuser { move_by } => {
            let sim = SimulatedFocuser::new();
            let manager = FocuserManager::new(
                sim.factory(),
                ManagerOptions::from_config(&config, &config.focuser),
            );
            let mut events = manager.subscribe();
            manager.connect_configured()?;
            info!("focuser connected at {}", config.focuser.endpoint());

            if let Some(amount) = move_by {
                manager.move_by(amount)?;
            }
            watch(&mut events, watch_for).await;
            finish(&manager, &mut events)?;
        }
    }

    Ok(())
}

/// Print events until `duration` elapses or the bus closes.
async fn watch<K: DeviceKind>(events: &mut Subscription<K>, duration: Duration) {
    let deadline = tokio::time::sleep(duration);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            event = events.recv() => match event {
                Some(event) => println!("{}", event_line(&event)),
                None => break,
            },
        }
    }
}

/// Disconnect if still connected and print the teardown events.
fn finish<K: DeviceKind>(manager: &DeviceManager<K>, events: &mut Subscription<K>) -> Result<()> {
    if manager.is_connected() {
        manager.disconnect()?;
    } else {
        warn!("{} was already disconnected", K::NAME);
    }
    while let Some(event) = events.try_recv() {
        println!("{}", event_line(&event));
    }
    Ok(())
}

fn event_line<K: DeviceKind>(event: &DeviceEvent<K>) -> Value {
    let payload = match event {
        DeviceEvent::StatusUpdate(status) => serde_json::to_value(status.as_ref()),
        DeviceEvent::ParametersUpdate(parameters) => serde_json::to_value(parameters.as_ref()),
        DeviceEvent::CapabilitiesUpdate(capabilities) => {
            serde_json::to_value(capabilities.as_ref())
        }
        DeviceEvent::MoveAmountUpdate(amount) => Ok(json!(amount)),
        DeviceEvent::PollingException(error) => Ok(json!(error.to_string())),
        DeviceEvent::MoveCompleted | DeviceEvent::Disconnected => Ok(Value::Null),
    };

    json!({
        "device": K::NAME,
        "event": event.name(),
        "payload": payload.unwrap_or(Value::Null),
    })
}
