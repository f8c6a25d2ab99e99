//! # Handheld Monitor
//!
//! Button, battery and status-overlay controller for single-board-computer
//! handhelds.
//!
//! # Usage
//!
//! ```bash
//! handheld-monitor [CONFIG]
//! ```
//!
//! `CONFIG` defaults to `config/default.toml`. Set `general.debug_log` to
//! write DEBUG-level logs to a file instead of stdout.

use anyhow::{Context, Result};
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use handheld_monitor::app::{App, Collaborators};
use handheld_monitor::config::Config;
use handheld_monitor::controller::SysfsGpio;
use handheld_monitor::hid::uinput::VirtualGamepad;
use handheld_monitor::hid::KeyProfile;
use handheld_monitor::osd::{OsdMode, OsdProcess};
use handheld_monitor::power::{BatteryAdc, SysfsAdc};
use handheld_monitor::system::command::SystemRunner;
use handheld_monitor::system::host::Host;

const DEFAULT_CONFIG: &str = "config/default.toml";

/// Installs the subscriber. With a debug log configured, DEBUG and up go to
/// that file; the returned guard flushes it on drop.
fn init_logging(config: &Config) -> Result<Option<WorkerGuard>> {
    match &config.general.debug_log {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("Failed to open debug log {}", path.display()))?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::from_default_env().add_directive(tracing::Level::DEBUG.into()),
                )
                .with_ansi(false)
                .with_writer(writer)
                .init();
            Ok(Some(guard))
        }
        None => {
            tracing_subscriber::fmt()
                .with_env_filter(
                    EnvFilter::from_default_env().add_directive(tracing::Level::INFO.into()),
                )
                .init();
            Ok(None)
        }
    }
}

async fn run(config: Config) -> Result<i32> {
    let profile = KeyProfile::from_joystick_disabled(config.joystick.disabled);
    let mut gamepad = VirtualGamepad::create(profile, config.joystick.vcc)
        .context("Failed to create virtual gamepad")?;
    gamepad.center_axes(config.joystick.vcc)?;

    let runner = Arc::new(SystemRunner);
    let osd = OsdProcess::launch(
        &config.osd,
        OsdMode::from_joystick_disabled(config.joystick.disabled),
    )
    .await
    .context("Failed to start OSD")?;

    let adc = config
        .battery
        .enabled
        .then(|| Box::new(SysfsAdc::new(&config.battery.adc_path)) as Box<dyn BatteryAdc>);

    let collaborators = Collaborators {
        reader: Arc::new(SysfsGpio::new(&config.general.gpio_root)),
        hid: Arc::new(Mutex::new(gamepad)),
        runner: runner.clone(),
        host: Arc::new(Host::new(runner, config.system.use_sudo)),
        osd: Box::new(osd),
        adc,
    };

    let app = App::new(config, collaborators)?;
    Ok(app.run().await?)
}

#[tokio::main]
async fn main() -> Result<()> {
    let path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG.to_string());
    let config =
        Config::load(&path).with_context(|| format!("Failed to load configuration {}", path))?;

    let guard = init_logging(&config)?;
    info!("Handheld Monitor v{} starting...", env!("CARGO_PKG_VERSION"));
    info!("Configuration loaded from {}", path);

    let code = run(config).await?;
    info!("Exiting with status {}", code);

    drop(guard);
    std::process::exit(code);
}
