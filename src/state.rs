//! # Shared Device State
//!
//! The single mutable aggregate of the monitor. Edge tasks, the hotkey
//! resolver, the low-battery timer and the polling loop all route their
//! updates through [`SharedState`], which guards [`DeviceState`] with one
//! mutex and carries the override signal that wakes the polling loop early.
//!
//! The mutex is never held across an `.await`: callers copy what they need
//! out of [`SharedState::update`] and talk to collaborators afterwards.

use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::Notify;

/// Power condition derived from the filtered battery voltage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerState {
    Normal,
    LowWarning,
    /// Terminal. The shutdown sequence has been requested.
    ShutdownPending,
}

/// Low-battery value carried in the `l` token of the status frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LowBatteryIndicator {
    None = 0,
    /// Warning is on screen.
    Warning = 1,
    /// Warning was shown and has been auto-hidden.
    Dismissed = 2,
}

impl LowBatteryIndicator {
    /// Numeric value written to the OSD.
    pub fn wire_value(self) -> u8 {
        self as u8
    }

    /// Whether the OSD is currently showing the warning.
    pub fn is_displayed(self) -> bool {
        self == LowBatteryIndicator::Warning
    }
}

/// Everything the status frame is built from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceState {
    pub overlay_visible: bool,
    pub joystick_enabled: bool,
    /// Wifi code: 0 off, 1 warning, 2 error, 3..=5 signal bars.
    pub wifi_bars: u8,
    pub bluetooth_enabled: bool,
    pub volume_percent: u8,
    pub power: PowerState,
    pub battery_percent: u8,
    /// Filtered voltage in hundredths of a volt.
    pub voltage: i32,
    pub info: bool,
    pub charging: bool,
    pub low_battery: LowBatteryIndicator,
}

/// Voltage reported before the first ADC reading (or forever when battery
/// monitoring is disabled).
pub const INITIAL_VOLTAGE: i32 = 410;

impl Default for DeviceState {
    fn default() -> Self {
        Self {
            overlay_visible: false,
            joystick_enabled: false,
            wifi_bars: 2,
            bluetooth_enabled: false,
            volume_percent: 1,
            power: PowerState::Normal,
            battery_percent: 0,
            voltage: INITIAL_VOLTAGE,
            info: false,
            charging: false,
            low_battery: LowBatteryIndicator::None,
        }
    }
}

/// Guarded [`DeviceState`] plus the override (wake) signal.
#[derive(Debug, Default)]
pub struct SharedState {
    inner: Mutex<DeviceState>,
    wake: Notify,
}

impl SharedState {
    #[must_use]
    pub fn new(initial: DeviceState) -> Self {
        Self {
            inner: Mutex::new(initial),
            wake: Notify::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, DeviceState> {
        // Fields are plain data, a poisoned guard is still consistent
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Runs `f` inside the critical section and returns its result.
    pub fn update<R>(&self, f: impl FnOnce(&mut DeviceState) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }

    /// Owned copy of the current state.
    #[must_use]
    pub fn snapshot(&self) -> DeviceState {
        self.lock().clone()
    }

    /// Sets the override signal. If nobody is waiting the signal is kept
    /// until the next [`SharedState::wait_for_refresh`].
    pub fn request_refresh(&self) {
        self.wake.notify_one();
    }

    /// Waits for the override signal or `timeout`, whichever comes first.
    ///
    /// Returns `true` when woken by the override signal.
    pub async fn wait_for_refresh(&self, timeout: Duration) -> bool {
        tokio::time::timeout(timeout, self.wake.notified()).await.is_ok()
    }
}
