//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{MonitorError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub keys: KeysConfig,
    pub general: GeneralConfig,
    pub joystick: JoystickConfig,
    pub battery: BatteryConfig,
    pub osd: OsdConfig,
    pub system: SystemConfig,
    pub timing: TimingConfig,
}

/// Physical line numbers (GPIO, BCM numbering) for every button
#[derive(Debug, Deserialize, Clone)]
pub struct KeysConfig {
    #[serde(default = "default_left")]
    pub left: u32,
    #[serde(default = "default_right")]
    pub right: u32,
    #[serde(default = "default_down")]
    pub down: u32,
    #[serde(default = "default_up")]
    pub up: u32,
    #[serde(default = "default_button_a")]
    pub button_a: u32,
    #[serde(default = "default_button_b")]
    pub button_b: u32,
    #[serde(default = "default_button_x")]
    pub button_x: u32,
    #[serde(default = "default_button_y")]
    pub button_y: u32,
    #[serde(default = "default_button_l1")]
    pub button_l1: u32,
    #[serde(default = "default_button_r1")]
    pub button_r1: u32,
    #[serde(default = "default_select")]
    pub select: u32,
    #[serde(default = "default_start")]
    pub start: u32,
    #[serde(default = "default_quicksave")]
    pub quicksave: u32,

    /// Hotkey modifier line. Absent disables every combo.
    #[serde(default = "default_hotkey")]
    pub hotkey: Option<u32>,
}

/// General hardware configuration
#[derive(Debug, Deserialize, Clone)]
pub struct GeneralConfig {
    /// Line wired to an external power switch; pressed means "shut down"
    #[serde(default)]
    pub shutdown_detect: Option<u32>,

    /// Hall-effect lid sensor; low means "lid closed"
    #[serde(default)]
    pub lid_sensor: Option<u32>,

    /// Write DEBUG-level logs to this file instead of stdout
    #[serde(default)]
    pub debug_log: Option<PathBuf>,

    #[serde(default = "default_gpio_root")]
    pub gpio_root: PathBuf,
}

/// Joystick / HID profile configuration
#[derive(Debug, Deserialize, Clone)]
pub struct JoystickConfig {
    /// Use the keyboard profile instead of the gamepad profile
    #[serde(default)]
    pub disabled: bool,

    #[serde(default = "default_on_by_default")]
    pub on_by_default: bool,

    /// Joystick supply voltage in mV, used as the analog axis maximum
    #[serde(default = "default_vcc")]
    pub vcc: i32,
}

/// Battery monitoring configuration (voltages in hundredths of a volt)
#[derive(Debug, Deserialize, Clone)]
pub struct BatteryConfig {
    #[serde(default = "default_battery_enabled")]
    pub enabled: bool,

    #[serde(default = "default_adc_path")]
    pub adc_path: PathBuf,

    #[serde(default = "default_full_voltage")]
    pub full_voltage: i32,

    #[serde(default = "default_low_voltage")]
    pub low_voltage: i32,

    #[serde(default = "default_shutdown_voltage")]
    pub shutdown_voltage: i32,
}

/// OSD process configuration
#[derive(Debug, Deserialize, Clone)]
pub struct OsdConfig {
    #[serde(default = "default_osd_binary")]
    pub binary: PathBuf,

    /// Directory passed to the OSD as its first argument (images, fonts)
    #[serde(default = "default_resource_dir")]
    pub resource_dir: PathBuf,

    #[serde(default = "default_startup_grace_ms")]
    pub startup_grace_ms: u64,
}

/// External tools and files
#[derive(Debug, Deserialize, Clone)]
pub struct SystemConfig {
    #[serde(default = "default_rfkill")]
    pub rfkill: String,

    #[serde(default = "default_use_sudo")]
    pub use_sudo: bool,

    /// Process stopped before powering off
    #[serde(default = "default_foreground_app")]
    pub foreground_app: String,

    /// Process stopped after the lid-close auto-save
    #[serde(default = "default_emulator_app")]
    pub emulator_app: String,

    #[serde(default = "default_audio_control")]
    pub audio_control: String,

    #[serde(default)]
    pub lid_sound: Option<PathBuf>,

    /// Presence marker: file exists means wifi is off
    #[serde(default = "default_wifi_marker")]
    pub wifi_marker: PathBuf,

    /// Presence marker: file exists means bluetooth is off
    #[serde(default = "default_bluetooth_marker")]
    pub bluetooth_marker: PathBuf,
}

/// Timing configuration
#[derive(Debug, Deserialize, Clone)]
pub struct TimingConfig {
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_edge_poll_ms")]
    pub edge_poll_ms: u64,

    #[serde(default = "default_combo_cooldown_ms")]
    pub combo_cooldown_ms: u64,

    #[serde(default = "default_quickload_hold_ms")]
    pub quickload_hold_ms: u64,

    #[serde(default = "default_low_battery_clear_ms")]
    pub low_battery_clear_ms: u64,

    #[serde(default = "default_shutdown_grace_ms")]
    pub shutdown_grace_ms: u64,
}

// Default value functions
fn default_left() -> u32 { 5 }
fn default_right() -> u32 { 19 }
fn default_down() -> u32 { 13 }
fn default_up() -> u32 { 6 }
fn default_button_a() -> u32 { 26 }
fn default_button_b() -> u32 { 21 }
fn default_button_x() -> u32 { 20 }
fn default_button_y() -> u32 { 16 }
fn default_button_l1() -> u32 { 12 }
fn default_button_r1() -> u32 { 24 }
fn default_select() -> u32 { 17 }
fn default_start() -> u32 { 27 }
fn default_quicksave() -> u32 { 22 }
fn default_hotkey() -> Option<u32> { Some(23) }

fn default_gpio_root() -> PathBuf { PathBuf::from("/sys/class/gpio") }

fn default_on_by_default() -> bool { false }
fn default_vcc() -> i32 { 3300 }

fn default_battery_enabled() -> bool { true }
const DEFAULT_ADC_PATH: &str = "/sys/bus/iio/devices/iio:device0/in_voltage0_raw";

fn default_adc_path() -> PathBuf { PathBuf::from(DEFAULT_ADC_PATH) }
fn default_full_voltage() -> i32 { 420 }
fn default_low_voltage() -> i32 { 340 }
fn default_shutdown_voltage() -> i32 { 320 }

fn default_osd_binary() -> PathBuf { PathBuf::from("./osd/osd") }
fn default_resource_dir() -> PathBuf { PathBuf::from(".") }
fn default_startup_grace_ms() -> u64 { 1000 }

fn default_rfkill() -> String { "rfkill".to_string() }
fn default_use_sudo() -> bool { true }
fn default_foreground_app() -> String { "emulationstation".to_string() }
fn default_emulator_app() -> String { "retroarch".to_string() }
fn default_audio_control() -> String { "PCM".to_string() }
fn default_wifi_marker() -> PathBuf { PathBuf::from("./osd/osdwifi") }
fn default_bluetooth_marker() -> PathBuf { PathBuf::from("./osd/osdbluetooth") }

fn default_debounce_ms() -> u64 { 30 }
fn default_poll_interval_ms() -> u64 { 10_000 }
fn default_edge_poll_ms() -> u64 { 5 }
fn default_combo_cooldown_ms() -> u64 { 500 }
fn default_quickload_hold_ms() -> u64 { 2000 }
fn default_low_battery_clear_ms() -> u64 { 2000 }
fn default_shutdown_grace_ms() -> u64 { 1000 }

pub(crate) fn invalid(message: impl std::fmt::Display) -> MonitorError {
    MonitorError::Invalid(message.to_string())
}

impl TimingConfig {
    /// Settle interval of the debounce gate
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    /// Upper bound of the main loop's interruptible wait
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn edge_poll(&self) -> Duration {
        Duration::from_millis(self.edge_poll_ms)
    }

    pub fn combo_cooldown(&self) -> Duration {
        Duration::from_millis(self.combo_cooldown_ms)
    }

    pub fn quickload_hold(&self) -> Duration {
        Duration::from_millis(self.quickload_hold_ms)
    }

    pub fn low_battery_clear(&self) -> Duration {
        Duration::from_millis(self.low_battery_clear_ms)
    }

    pub fn shutdown_grace(&self) -> Duration {
        Duration::from_millis(self.shutdown_grace_ms)
    }
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Returns
    ///
    /// * `Result<Config>` - Loaded and validated configuration
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use handheld_monitor::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::from_toml(&contents)
    }

    /// Parse and validate configuration from a TOML string
    pub fn from_toml(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Every configured physical line, buttons first, then the optional
    /// hotkey, shutdown-detect and lid lines.
    pub fn physical_lines(&self) -> Vec<u32> {
        let k = &self.keys;
        let mut lines = vec![
            k.left, k.right, k.down, k.up, k.button_a, k.button_b, k.button_x,
            k.button_y, k.button_l1, k.button_r1, k.select, k.start, k.quicksave,
        ];
        lines.extend(k.hotkey);
        lines.extend(self.general.shutdown_detect);
        lines.extend(self.general.lid_sensor);
        lines
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    fn validate(&self) -> Result<()> {
        // No two lines may share a physical id
        let mut seen = HashSet::new();
        for line in self.physical_lines() {
            if !seen.insert(line) {
                return Err(invalid(format!("line {} is assigned more than once", line)));
            }
        }

        // Validate battery thresholds
        let b = &self.battery;
        if b.shutdown_voltage >= b.low_voltage {
            return Err(invalid("shutdown_voltage must be below low_voltage"));
        }
        if b.low_voltage >= b.full_voltage {
            return Err(invalid("low_voltage must be below full_voltage"));
        }
        if b.enabled && b.adc_path.as_os_str().is_empty() {
            return Err(invalid("battery adc_path cannot be empty when enabled"));
        }

        if self.joystick.vcc <= 0 {
            return Err(invalid("joystick vcc must be greater than 0"));
        }

        if self.osd.binary.as_os_str().is_empty() {
            return Err(invalid("osd binary cannot be empty"));
        }
        if self.osd.startup_grace_ms > 10_000 {
            return Err(invalid("startup_grace_ms must be at most 10000"));
        }

        if self.system.rfkill.is_empty() {
            return Err(invalid("rfkill cannot be empty"));
        }
        if self.system.audio_control.is_empty() {
            return Err(invalid("audio_control cannot be empty"));
        }

        // Validate timing fields
        let t = &self.timing;
        for (name, value, max) in [
            ("debounce_ms", t.debounce_ms, 1000),
            ("poll_interval_ms", t.poll_interval_ms, 600_000),
            ("edge_poll_ms", t.edge_poll_ms, 1000),
            ("combo_cooldown_ms", t.combo_cooldown_ms, 10_000),
            ("quickload_hold_ms", t.quickload_hold_ms, 10_000),
            ("low_battery_clear_ms", t.low_battery_clear_ms, 60_000),
            ("shutdown_grace_ms", t.shutdown_grace_ms, 60_000),
        ] {
            if value == 0 || value > max {
                return Err(invalid(format!("{} must be between 1 and {}", name, max)));
            }
        }

        Ok(())
    }
}
