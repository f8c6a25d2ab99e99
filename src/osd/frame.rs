//! # Status Frame
//!
//! One ASCII line per update, read by the OSD process from its stdin:
//!
//! ```text
//! s1 v410 b90 t20 w5 a60 j1  u0  l0 off ncharge\n
//! ```
//!
//! | Token | Field | Values |
//! |-------|-------|--------|
//! | `s` | overlay visible | `0`, `1` |
//! | `v` | voltage | hundredths of a volt |
//! | `b` | battery | `0..=100` |
//! | `t` | temperature | always [`TEMPERATURE_PLACEHOLDER`] |
//! | `w` | wifi code | `0..=5` |
//! | `a` | volume | `0..=100` |
//! | `j` | joystick enabled | `0`, `1`, followed by an extra space |
//! | `u` | bluetooth enabled | `0`, `1`, followed by an extra space |
//! | `l` | low battery | `0` none, `1` warning, `2` dismissed |
//! | | info | `on`, `off` |
//! | | charging | `charge`, `ncharge` |
//!
//! The doubled spaces after the `j` and `u` flags are part of the format the
//! OSD parses and must be kept.

use std::fmt;

use crate::state::DeviceState;

/// Reported in the `t` token until a temperature source exists.
pub const TEMPERATURE_PLACEHOLDER: i32 = 20;

/// All values carried by one status line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatusFrame {
    pub overlay: bool,
    pub voltage: i32,
    pub battery_percent: u8,
    pub temperature: i32,
    pub wifi: u8,
    pub volume: u8,
    pub joystick: bool,
    pub bluetooth: bool,
    pub low_battery: u8,
    pub info: bool,
    pub charging: bool,
}

impl StatusFrame {
    /// Frame for the current device state.
    #[must_use]
    pub fn from_state(state: &DeviceState) -> Self {
        Self {
            overlay: state.overlay_visible,
            voltage: state.voltage,
            battery_percent: state.battery_percent,
            temperature: TEMPERATURE_PLACEHOLDER,
            wifi: state.wifi_bars,
            volume: state.volume_percent,
            joystick: state.joystick_enabled,
            bluetooth: state.bluetooth_enabled,
            low_battery: state.low_battery.wire_value(),
            info: state.info,
            charging: state.charging,
        }
    }

    /// Newline-terminated wire form.
    #[must_use]
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Parses one line of the wire form. The trailing newline is required.
    ///
    /// Returns `None` for anything that `encode` would not have produced.
    #[cfg(test)]
    pub(crate) fn parse(line: &str) -> Option<Self> {
        let body = line.strip_suffix('\n')?;
        let (head, tail) = body.split_once(" j")?;

        let mut head = head.split(' ');
        let overlay = flag(field(head.next()?, 's')?)?;
        let voltage = field(head.next()?, 'v')?.parse().ok()?;
        let battery_percent = field(head.next()?, 'b')?.parse().ok()?;
        let temperature = field(head.next()?, 't')?.parse().ok()?;
        let wifi = field(head.next()?, 'w')?.parse().ok()?;
        let volume = field(head.next()?, 'a')?.parse().ok()?;
        if head.next().is_some() {
            return None;
        }

        // "1  u0  l0 off ncharge"
        let mut tail = tail.split(' ');
        let joystick = flag(tail.next()?)?;
        if !tail.next()?.is_empty() {
            return None;
        }
        let bluetooth = flag(field(tail.next()?, 'u')?)?;
        if !tail.next()?.is_empty() {
            return None;
        }
        let low_battery = field(tail.next()?, 'l')?.parse().ok()?;
        let info = match tail.next()? {
            "on" => true,
            "off" => false,
            _ => return None,
        };
        let charging = match tail.next()? {
            "charge" => true,
            "ncharge" => false,
            _ => return None,
        };
        if tail.next().is_some() {
            return None;
        }

        let frame = Self {
            overlay,
            voltage,
            battery_percent,
            temperature,
            wifi,
            volume,
            joystick,
            bluetooth,
            low_battery,
            info,
            charging,
        };
        // Reject non-canonical numbers such as "+5" or "007"
        (frame.encode() == line).then_some(frame)
    }
}

#[cfg(test)]
fn field(token: &str, prefix: char) -> Option<&str> {
    token.strip_prefix(prefix).filter(|rest| !rest.is_empty())
}

#[cfg(test)]
fn flag(raw: &str) -> Option<bool> {
    match raw {
        "1" => Some(true),
        "0" => Some(false),
        _ => None,
    }
}

impl fmt::Display for StatusFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "s{} v{} b{} t{} w{} a{} j{}  u{}  l{} {} {}",
            u8::from(self.overlay),
            self.voltage,
            self.battery_percent,
            self.temperature,
            self.wifi,
            self.volume,
            u8::from(self.joystick),
            u8::from(self.bluetooth),
            self.low_battery,
            if self.info { "on" } else { "off" },
            if self.charging { "charge" } else { "ncharge" },
        )
    }
}
