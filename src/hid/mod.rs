//! # Virtual HID Module
//!
//! Everything the monitor emits to game software goes through a [`HidSink`]:
//! key transitions are queued with [`HidSink::emit`] and committed as one
//! frame with [`HidSink::sync`].
//!
//! Two key profiles exist. The gamepad profile (joystick enabled) uses
//! `BTN_*` codes plus two analog axes; the keyboard profile maps the same
//! buttons onto ordinary keys for front-ends without gamepad support. Both
//! profiles carry the quick-save, quick-load and escape keys.

pub mod uinput;

use evdev::Key;
use std::sync::{Arc, Mutex};

use crate::controller::lines::Level;
use crate::error::Result;

/// Logical keys the monitor can emit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HidKey {
    DpadUp,
    DpadDown,
    DpadLeft,
    DpadRight,
    ButtonA,
    ButtonB,
    ButtonX,
    ButtonY,
    ButtonL1,
    ButtonR1,
    Select,
    Start,
    QuickSave,
    QuickLoad,
    Escape,
}

impl HidKey {
    /// Every key, in capability-registration order.
    pub const ALL: [HidKey; 15] = [
        HidKey::DpadUp,
        HidKey::DpadDown,
        HidKey::DpadLeft,
        HidKey::DpadRight,
        HidKey::ButtonA,
        HidKey::ButtonB,
        HidKey::ButtonX,
        HidKey::ButtonY,
        HidKey::ButtonL1,
        HidKey::ButtonR1,
        HidKey::Select,
        HidKey::Start,
        HidKey::QuickSave,
        HidKey::QuickLoad,
        HidKey::Escape,
    ];
}

/// Capability set of the virtual device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyProfile {
    /// Gamepad buttons and analog axes
    Gamepad,
    /// Plain keyboard keys
    Keyboard,
}

impl KeyProfile {
    /// Picks the profile from the `[joystick] disabled` setting.
    #[must_use]
    pub fn from_joystick_disabled(disabled: bool) -> Self {
        if disabled {
            KeyProfile::Keyboard
        } else {
            KeyProfile::Gamepad
        }
    }

    /// Name the virtual device registers under.
    #[must_use]
    pub fn device_name(self) -> &'static str {
        match self {
            KeyProfile::Gamepad => "OneForAll-GP",
            KeyProfile::Keyboard => "mintyPad",
        }
    }

    /// Whether the profile exposes ABS_X / ABS_Y.
    #[must_use]
    pub fn has_axes(self) -> bool {
        self == KeyProfile::Gamepad
    }

    /// Linux key code for `key` in this profile.
    #[must_use]
    pub fn key_code(self, key: HidKey) -> Key {
        match (self, key) {
            // Shared by both profiles
            (_, HidKey::QuickSave) => Key::KEY_F2,
            (_, HidKey::QuickLoad) => Key::KEY_F4,
            (_, HidKey::Escape) => Key::KEY_ESC,

            (KeyProfile::Gamepad, HidKey::DpadUp) => Key::BTN_DPAD_UP,
            (KeyProfile::Gamepad, HidKey::DpadDown) => Key::BTN_DPAD_DOWN,
            (KeyProfile::Gamepad, HidKey::DpadLeft) => Key::BTN_DPAD_LEFT,
            (KeyProfile::Gamepad, HidKey::DpadRight) => Key::BTN_DPAD_RIGHT,
            (KeyProfile::Gamepad, HidKey::ButtonA) => Key::BTN_SOUTH,
            (KeyProfile::Gamepad, HidKey::ButtonB) => Key::BTN_EAST,
            (KeyProfile::Gamepad, HidKey::ButtonX) => Key::BTN_NORTH,
            (KeyProfile::Gamepad, HidKey::ButtonY) => Key::BTN_WEST,
            (KeyProfile::Gamepad, HidKey::ButtonL1) => Key::BTN_TL,
            (KeyProfile::Gamepad, HidKey::ButtonR1) => Key::BTN_TR,
            (KeyProfile::Gamepad, HidKey::Select) => Key::BTN_SELECT,
            (KeyProfile::Gamepad, HidKey::Start) => Key::BTN_START,

            (KeyProfile::Keyboard, HidKey::DpadUp) => Key::KEY_UP,
            (KeyProfile::Keyboard, HidKey::DpadDown) => Key::KEY_DOWN,
            (KeyProfile::Keyboard, HidKey::DpadLeft) => Key::KEY_LEFT,
            (KeyProfile::Keyboard, HidKey::DpadRight) => Key::KEY_RIGHT,
            (KeyProfile::Keyboard, HidKey::ButtonA) => Key::KEY_LEFTCTRL,
            (KeyProfile::Keyboard, HidKey::ButtonB) => Key::KEY_LEFTALT,
            (KeyProfile::Keyboard, HidKey::ButtonX) => Key::KEY_Z,
            (KeyProfile::Keyboard, HidKey::ButtonY) => Key::KEY_X,
            (KeyProfile::Keyboard, HidKey::ButtonL1) => Key::KEY_G,
            (KeyProfile::Keyboard, HidKey::ButtonR1) => Key::KEY_H,
            (KeyProfile::Keyboard, HidKey::Select) => Key::KEY_SPACE,
            (KeyProfile::Keyboard, HidKey::Start) => Key::KEY_ENTER,
        }
    }
}

/// Destination for key transitions.
pub trait HidSink: Send {
    /// Queues one key transition.
    fn emit(&mut self, key: HidKey, level: Level) -> Result<()>;

    /// Commits every queued transition as one input frame.
    fn sync(&mut self) -> Result<()>;
}

/// HID sink shared between edge tasks.
pub type SharedHid = Arc<Mutex<dyn HidSink>>;

/// Runs `f` with the sink locked. The lock is released before returning, so
/// callers can sleep between an emit and its sync without blocking others.
pub fn with_hid<R>(hid: &SharedHid, f: impl FnOnce(&mut dyn HidSink) -> R) -> R {
    let mut guard = hid.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
    f(&mut *guard)
}

#[cfg(test)]
pub mod mocks {
    use super::*;

    /// One recorded call on [`RecordingHid`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub enum HidRecord {
        Key(HidKey, Level),
        Sync,
    }

    /// HID sink that records every call
    #[derive(Clone, Default)]
    pub struct RecordingHid {
        pub records: Arc<Mutex<Vec<HidRecord>>>,
    }

    impl RecordingHid {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn shared(&self) -> SharedHid {
            Arc::new(Mutex::new(self.clone()))
        }

        pub fn records(&self) -> Vec<HidRecord> {
            self.records.lock().unwrap().clone()
        }

        /// Key transitions only, syncs stripped.
        pub fn keys(&self) -> Vec<(HidKey, Level)> {
            self.records()
                .into_iter()
                .filter_map(|record| match record {
                    HidRecord::Key(key, level) => Some((key, level)),
                    HidRecord::Sync => None,
                })
                .collect()
        }
    }

    impl HidSink for RecordingHid {
        fn emit(&mut self, key: HidKey, level: Level) -> Result<()> {
            self.records.lock().unwrap().push(HidRecord::Key(key, level));
            Ok(())
        }

        fn sync(&mut self) -> Result<()> {
            self.records.lock().unwrap().push(HidRecord::Sync);
            Ok(())
        }
    }
}
