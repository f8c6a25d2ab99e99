//! # Radio Control Collaborator
//!
//! Wifi and bluetooth on/off state lives in presence markers on disk (a
//! marker file present means the radio is off), so it survives restarts of
//! the monitor. Refreshing a radio applies the marker state with `rfkill`
//! when it differs from the last state this process applied, then reports
//! what the OSD should show.
//!
//! ## Wifi codes
//!
//! | Code | Meaning |
//! |------|---------|
//! | 0 | off |
//! | 1 | on, no usable signal |
//! | 2 | error (no `wlan0`, or disabling failed) |
//! | 3 | one bar (quality > 5) |
//! | 4 | two bars (quality > 40) |
//! | 5 | three bars (quality > 55) |

use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use super::command::{privileged, CommandRunner};
use crate::config::SystemConfig;

pub const WIFI_OFF: u8 = 0;
pub const WIFI_WARNING: u8 = 1;
pub const WIFI_ERROR: u8 = 2;
pub const WIFI_ONE_BAR: u8 = 3;
pub const WIFI_TWO_BARS: u8 = 4;
pub const WIFI_THREE_BARS: u8 = 5;

const WIRELESS_STATS: &str = "/proc/net/wireless";
const WIFI_INTERFACE: &str = "wlan0:";

/// State last applied to a radio by this process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RadioState {
    Unknown,
    On,
    Off,
}

/// Signal strength of `wlan0` from `/proc/net/wireless` contents: link
/// quality if non-zero, otherwise the magnitude of the signal level.
///
/// Returns `None` when there is no `wlan0` row.
#[must_use]
pub fn parse_wifi_strength(stats: &str) -> Option<u32> {
    let line = stats.lines().find(|line| line.trim_start().starts_with(WIFI_INTERFACE))?;
    let (_, fields) = line.split_once(':')?;
    let mut fields = fields.split_whitespace().skip(1); // status
    let link = parse_stat(fields.next()?);
    let level = parse_stat(fields.next()?);
    Some(if link > 0 { link } else { level })
}

/// Parses `"70."` or `"-40."` into its magnitude.
fn parse_stat(raw: &str) -> u32 {
    raw.trim_end_matches('.')
        .trim_start_matches('-')
        .parse()
        .unwrap_or(0)
}

/// Maps a signal strength onto the wifi code shown by the OSD.
#[must_use]
pub fn wifi_bars(strength: Option<u32>) -> u8 {
    match strength {
        None => WIFI_ERROR,
        Some(s) if s > 55 => WIFI_THREE_BARS,
        Some(s) if s > 40 => WIFI_TWO_BARS,
        Some(s) if s > 5 => WIFI_ONE_BAR,
        Some(_) => WIFI_WARNING,
    }
}

/// Which radio an operation targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Radio {
    Wifi,
    Bluetooth,
}

impl Radio {
    fn rfkill_name(self) -> &'static str {
        match self {
            Radio::Wifi => "wifi",
            Radio::Bluetooth => "bluetooth",
        }
    }

    fn label(self) -> &'static str {
        match self {
            Radio::Wifi => "Wifi",
            Radio::Bluetooth => "BT",
        }
    }
}

/// Wifi and bluetooth radio control
pub struct Radios {
    runner: Arc<dyn CommandRunner>,
    rfkill: String,
    sudo: bool,
    wifi_marker: PathBuf,
    bluetooth_marker: PathBuf,
    wifi_state: Mutex<RadioState>,
    bluetooth_state: Mutex<RadioState>,
}

impl Radios {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, config: &SystemConfig) -> Self {
        Self {
            runner,
            rfkill: config.rfkill.clone(),
            sudo: config.use_sudo,
            wifi_marker: config.wifi_marker.clone(),
            bluetooth_marker: config.bluetooth_marker.clone(),
            wifi_state: Mutex::new(RadioState::Unknown),
            bluetooth_state: Mutex::new(RadioState::Unknown),
        }
    }

    /// Applies the wifi marker state (flipped first when `toggle` is set)
    /// and returns the wifi code for the OSD.
    pub async fn refresh_wifi(&self, toggle: bool) -> u8 {
        let mut state = self.wifi_state.lock().await;
        let enable = self.desired(&self.wifi_marker, toggle);

        if !enable {
            let failed = self.disable(Radio::Wifi, &self.wifi_marker, &mut state).await;
            return if failed { WIFI_ERROR } else { WIFI_OFF };
        }

        // A failed unblock is superseded by the signal reading below
        self.enable(Radio::Wifi, &self.wifi_marker, &mut state).await;

        match self.runner.run(&["cat", WIRELESS_STATS]).await {
            Ok(stats) => {
                let strength = parse_wifi_strength(&stats);
                match strength {
                    Some(s) => info!("Wifi    [{}]strength", s),
                    None => info!("Wifi    [---]strength"),
                }
                wifi_bars(strength)
            }
            Err(e) => {
                warn!("Wifi    : {}", e);
                WIFI_ERROR
            }
        }
    }

    /// Applies the bluetooth marker state (flipped first when `toggle` is
    /// set) and returns whether bluetooth should be shown as enabled.
    pub async fn refresh_bluetooth(&self, toggle: bool) -> bool {
        let mut state = self.bluetooth_state.lock().await;
        let enable = self.desired(&self.bluetooth_marker, toggle);

        if !enable {
            // A radio that refused to turn off is still on
            return self.disable(Radio::Bluetooth, &self.bluetooth_marker, &mut state).await;
        }

        self.enable(Radio::Bluetooth, &self.bluetooth_marker, &mut state).await;

        match self.runner.run(&["hcitool", "dev"]).await {
            Ok(devices) => devices.contains("hci0"),
            Err(e) => {
                warn!("BT    : {}", e);
                false
            }
        }
    }

    fn desired(&self, marker: &Path, toggle: bool) -> bool {
        let on = !marker.exists();
        on ^ toggle
    }

    /// Removes the marker and unblocks the radio if it was not already on.
    /// Returns `true` if unblocking failed.
    async fn enable(&self, radio: Radio, marker: &Path, state: &mut RadioState) -> bool {
        if marker.exists() {
            if let Err(e) = fs::remove_file(marker) {
                warn!("Failed to remove {}: {}", marker.display(), e);
            }
        }
        if *state == RadioState::On {
            return false;
        }
        *state = RadioState::On;
        info!("{}    [ENABLING]", radio.label());

        if radio == Radio::Bluetooth {
            for verb in ["enable", "start"] {
                let argv = privileged(self.sudo, &["systemctl", verb, "hciuart.service"]);
                if let Err(e) = self.runner.run(&argv).await {
                    info!("{}    : {}", radio.label(), e);
                    return true;
                }
            }
        }
        self.rfkill(radio, "unblock").await
    }

    /// Creates the marker and blocks the radio if it was not already off.
    /// Returns `true` if blocking failed.
    async fn disable(&self, radio: Radio, marker: &Path, state: &mut RadioState) -> bool {
        if let Err(e) = OpenOptions::new().create(true).append(true).open(marker) {
            warn!("Failed to create {}: {}", marker.display(), e);
        }
        if *state == RadioState::Off {
            return false;
        }
        *state = RadioState::Off;
        info!("{}    [DISABLING]", radio.label());

        if radio == Radio::Bluetooth {
            for verb in ["disable", "stop"] {
                let argv = privileged(self.sudo, &["systemctl", verb, "hciuart.service"]);
                if let Err(e) = self.runner.run(&argv).await {
                    info!("{}    : {}", radio.label(), e);
                    return true;
                }
            }
        }
        self.rfkill(radio, "block").await
    }

    async fn rfkill(&self, radio: Radio, verb: &str) -> bool {
        let argv = privileged(self.sudo, &[self.rfkill.as_str(), verb, radio.rfkill_name()]);
        match self.runner.run(&argv).await {
            Ok(output) => {
                info!("{}    [{}]", radio.label(), output.trim());
                false
            }
            Err(e) => {
                info!("{}    : {}", radio.label(), e);
                true
            }
        }
    }
}
