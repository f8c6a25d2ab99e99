//! # Button Lines
//!
//! Static mapping from physical GPIO lines to logical actions, built once at
//! startup from [`KeysConfig`] and immutable afterwards.
//!
//! | Logical action | Config key | HID key (gamepad / keyboard) |
//! |----------------|------------|------------------------------|
//! | DpadUp | `up` | BTN_DPAD_UP / KEY_UP |
//! | DpadDown | `down` | BTN_DPAD_DOWN / KEY_DOWN |
//! | DpadLeft | `left` | BTN_DPAD_LEFT / KEY_LEFT |
//! | DpadRight | `right` | BTN_DPAD_RIGHT / KEY_RIGHT |
//! | ButtonA | `button_a` | BTN_A / KEY_LEFTCTRL |
//! | ButtonB | `button_b` | BTN_B / KEY_LEFTALT |
//! | ButtonX | `button_x` | BTN_X / KEY_Z |
//! | ButtonY | `button_y` | BTN_Y / KEY_X |
//! | ButtonL1 | `button_l1` | BTN_TL / KEY_G |
//! | ButtonR1 | `button_r1` | BTN_TR / KEY_H |
//! | Select | `select` | BTN_SELECT / KEY_SPACE |
//! | Start | `start` | BTN_START / KEY_ENTER |
//! | QuickSave | `quicksave` | KEY_F2 (plus Select) |
//! | HotkeyModifier | `hotkey` | none |

use std::collections::HashMap;
use tokio::time::Instant;

use crate::config::{invalid, KeysConfig};
use crate::error::Result;
use crate::hid::HidKey;

/// What a physical line means to the rest of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogicalAction {
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
    HotkeyModifier,
}

impl LogicalAction {
    /// Key emitted for an ordinary (non-combo) transition of this action.
    #[must_use]
    pub fn hid_key(self) -> Option<HidKey> {
        match self {
            LogicalAction::DpadUp => Some(HidKey::DpadUp),
            LogicalAction::DpadDown => Some(HidKey::DpadDown),
            LogicalAction::DpadLeft => Some(HidKey::DpadLeft),
            LogicalAction::DpadRight => Some(HidKey::DpadRight),
            LogicalAction::ButtonA => Some(HidKey::ButtonA),
            LogicalAction::ButtonB => Some(HidKey::ButtonB),
            LogicalAction::ButtonX => Some(HidKey::ButtonX),
            LogicalAction::ButtonY => Some(HidKey::ButtonY),
            LogicalAction::ButtonL1 => Some(HidKey::ButtonL1),
            LogicalAction::ButtonR1 => Some(HidKey::ButtonR1),
            LogicalAction::Select => Some(HidKey::Select),
            LogicalAction::Start => Some(HidKey::Start),
            LogicalAction::QuickSave => Some(HidKey::QuickSave),
            LogicalAction::HotkeyModifier => None,
        }
    }

    #[must_use]
    pub fn is_modifier(self) -> bool {
        self == LogicalAction::HotkeyModifier
    }

    /// Lines whose ordinary emission is replaced by the combo resolver while
    /// the modifier is held. B, X, Y, L1, R1 and Select keep emitting.
    #[must_use]
    pub fn is_combo_capable(self) -> bool {
        matches!(
            self,
            LogicalAction::DpadUp
                | LogicalAction::DpadDown
                | LogicalAction::DpadLeft
                | LogicalAction::DpadRight
                | LogicalAction::ButtonA
                | LogicalAction::Start
                | LogicalAction::QuickSave
        )
    }
}

/// Logical level of a line after debouncing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Pressed,
    Released,
}

impl Level {
    #[must_use]
    pub fn from_pressed(pressed: bool) -> Self {
        if pressed {
            Level::Pressed
        } else {
            Level::Released
        }
    }

    #[must_use]
    pub fn is_pressed(self) -> bool {
        self == Level::Pressed
    }
}

/// One configured physical line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonLine {
    pub physical_id: u32,
    pub action: LogicalAction,
}

impl ButtonLine {
    #[must_use]
    pub fn new(physical_id: u32, action: LogicalAction) -> Self {
        Self { physical_id, action }
    }

    #[must_use]
    pub fn is_modifier(&self) -> bool {
        self.action.is_modifier()
    }
}

/// A debounced transition, produced by the debounce gate and consumed once.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub line: ButtonLine,
    pub level: Level,
    pub timestamp: Instant,
}

/// Immutable table of all button lines, indexed by physical id.
#[derive(Debug, Clone)]
pub struct LineMap {
    lines: Vec<ButtonLine>,
    by_id: HashMap<u32, usize>,
}

impl LineMap {
    /// Builds the table, rejecting duplicate physical ids.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` error if two lines share a physical id.
    pub fn new(lines: Vec<ButtonLine>) -> Result<Self> {
        let mut by_id = HashMap::with_capacity(lines.len());
        for (index, line) in lines.iter().enumerate() {
            if by_id.insert(line.physical_id, index).is_some() {
                return Err(invalid(format!(
                    "line {} is assigned more than once",
                    line.physical_id
                )));
            }
        }
        Ok(Self { lines, by_id })
    }

    /// Builds the table from the `[keys]` section.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use handheld_monitor::config::Config;
    /// use handheld_monitor::controller::lines::{LineMap, LogicalAction};
    ///
    /// let config = Config::load("config/default.toml")?;
    /// let lines = LineMap::from_keys(&config.keys)?;
    /// assert!(lines.pin_for(LogicalAction::DpadUp).is_some());
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn from_keys(keys: &KeysConfig) -> Result<Self> {
        let mut lines = vec![
            ButtonLine::new(keys.left, LogicalAction::DpadLeft),
            ButtonLine::new(keys.right, LogicalAction::DpadRight),
            ButtonLine::new(keys.down, LogicalAction::DpadDown),
            ButtonLine::new(keys.up, LogicalAction::DpadUp),
            ButtonLine::new(keys.button_a, LogicalAction::ButtonA),
            ButtonLine::new(keys.button_b, LogicalAction::ButtonB),
            ButtonLine::new(keys.button_x, LogicalAction::ButtonX),
            ButtonLine::new(keys.button_y, LogicalAction::ButtonY),
            ButtonLine::new(keys.button_l1, LogicalAction::ButtonL1),
            ButtonLine::new(keys.button_r1, LogicalAction::ButtonR1),
            ButtonLine::new(keys.select, LogicalAction::Select),
            ButtonLine::new(keys.start, LogicalAction::Start),
            ButtonLine::new(keys.quicksave, LogicalAction::QuickSave),
        ];
        if let Some(hotkey) = keys.hotkey {
            lines.push(ButtonLine::new(hotkey, LogicalAction::HotkeyModifier));
        }
        Self::new(lines)
    }

    #[must_use]
    pub fn get(&self, physical_id: u32) -> Option<ButtonLine> {
        self.by_id.get(&physical_id).map(|&index| self.lines[index])
    }

    /// Physical id of the line bound to `action`, if any.
    #[must_use]
    pub fn pin_for(&self, action: LogicalAction) -> Option<u32> {
        self.lines
            .iter()
            .find(|line| line.action == action)
            .map(|line| line.physical_id)
    }

    #[must_use]
    pub fn hotkey(&self) -> Option<ButtonLine> {
        self.lines.iter().copied().find(ButtonLine::is_modifier)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ButtonLine> {
        self.lines.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }
}
