//! # Controller Module
//!
//! Physical button input handling.
//!
//! This module handles:
//! - Mapping GPIO lines to logical actions
//! - Watching lines for edges and debouncing them
//! - Emitting ordinary key transitions to the virtual HID device
//! - Resolving hotkey combos (volume, radios, quick-load, escape)
//! - The shutdown switch and lid sensor lines

pub mod buttons;
pub mod debounce;
pub mod gpio;
pub mod hotkey;
pub mod lid;
pub mod lines;

pub use buttons::ButtonDispatcher;
pub use debounce::DebounceGate;
pub use gpio::{EdgeSource, EdgeWatcher, LineReader, SysfsGpio};
pub use hotkey::{Combo, ComboTiming, HotkeyResolver};
pub use lid::PowerLines;
pub use lines::{ButtonEvent, ButtonLine, Level, LineMap, LogicalAction};
