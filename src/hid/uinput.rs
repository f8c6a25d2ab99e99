//! # uinput Virtual Device
//!
//! [`HidSink`] backed by a Linux uinput device created through evdev.
//!
//! The device is created once at startup with every key of the selected
//! [`KeyProfile`]. In the gamepad profile it also exposes ABS_X/ABS_Y with
//! range `0..=vcc`, centred once after creation.

use evdev::uinput::{VirtualDevice, VirtualDeviceBuilder};
use evdev::{
    AbsInfo, AbsoluteAxisType, AttributeSet, BusType, EventType, InputEvent, InputId, Key,
    UinputAbsSetup,
};
use tracing::{debug, info};

use super::{HidKey, HidSink, KeyProfile};
use crate::controller::lines::Level;
use crate::error::{MonitorError, Result};

/// Version reported by the virtual device.
const DEVICE_VERSION: u16 = 0x3;

/// Builds the key event for `key` at `level` in `profile`.
#[must_use]
pub fn key_event(profile: KeyProfile, key: HidKey, level: Level) -> InputEvent {
    let value = if level.is_pressed() { 1 } else { 0 };
    InputEvent::new(EventType::KEY, profile.key_code(key).code(), value)
}

/// Virtual gamepad/keyboard registered with uinput
pub struct VirtualGamepad {
    device: VirtualDevice,
    profile: KeyProfile,
    /// Events queued by `emit`, written on `sync`
    pending: Vec<InputEvent>,
}

impl std::fmt::Debug for VirtualGamepad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VirtualGamepad")
            .field("profile", &self.profile)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl VirtualGamepad {
    /// Create the virtual device
    ///
    /// # Arguments
    ///
    /// * `profile` - Key profile selecting the capability set
    /// * `vcc` - Joystick supply in mV, the analog axis maximum
    ///
    /// # Errors
    ///
    /// Returns `Hid` error if `/dev/uinput` cannot be opened or the device
    /// cannot be registered (usually missing permissions).
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use handheld_monitor::hid::KeyProfile;
    /// use handheld_monitor::hid::uinput::VirtualGamepad;
    ///
    /// let mut pad = VirtualGamepad::create(KeyProfile::Gamepad, 3300)?;
    /// pad.center_axes(3300)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn create(profile: KeyProfile, vcc: i32) -> Result<Self> {
        let hid_err = |e: std::io::Error| MonitorError::Hid(format!("uinput: {}", e));

        let mut keys = AttributeSet::<Key>::new();
        for key in HidKey::ALL {
            keys.insert(profile.key_code(key));
        }

        let mut builder = VirtualDeviceBuilder::new()
            .map_err(hid_err)?
            .name(profile.device_name())
            .input_id(InputId::new(BusType::BUS_USB, 0x1, 0x1, DEVICE_VERSION))
            .with_keys(&keys)
            .map_err(hid_err)?;

        if profile.has_axes() {
            for axis in [AbsoluteAxisType::ABS_X, AbsoluteAxisType::ABS_Y] {
                let setup = UinputAbsSetup::new(axis, AbsInfo::new(vcc / 2, 0, vcc, 0, 0, 0));
                builder = builder.with_absolute_axis(&setup).map_err(hid_err)?;
            }
        }

        let device = builder.build().map_err(hid_err)?;
        info!("Created virtual HID device '{}'", profile.device_name());

        Ok(Self {
            device,
            profile,
            pending: Vec::new(),
        })
    }

    /// Sends both analog axes to their centre position (`vcc / 2`).
    ///
    /// Does nothing in the keyboard profile.
    pub fn center_axes(&mut self, vcc: i32) -> Result<()> {
        if !self.profile.has_axes() {
            return Ok(());
        }
        let center = vcc / 2;
        let events = [
            InputEvent::new(EventType::ABSOLUTE, AbsoluteAxisType::ABS_X.0, center),
            InputEvent::new(EventType::ABSOLUTE, AbsoluteAxisType::ABS_Y.0, center),
        ];
        self.device
            .emit(&events)
            .map_err(|e| MonitorError::Hid(format!("Failed to centre axes: {}", e)))?;
        debug!("Centred analog axes at {}", center);
        Ok(())
    }
}

impl HidSink for VirtualGamepad {
    fn emit(&mut self, key: HidKey, level: Level) -> Result<()> {
        self.pending.push(key_event(self.profile, key, level));
        Ok(())
    }

    fn sync(&mut self) -> Result<()> {
        // evdev terminates every write with SYN_REPORT, so an empty write is
        // a bare sync barrier
        let events = std::mem::take(&mut self.pending);
        self.device
            .emit(&events)
            .map_err(|e| MonitorError::Hid(format!("Failed to write events: {}", e)))
    }
}
