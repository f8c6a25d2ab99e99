//! # Hotkey Combo Resolver
//!
//! While the hotkey modifier is held, pressing one of the combo lines runs a
//! side effect instead of emitting a key. Lines are read directly from the
//! GPIO reader when the resolver runs, and checked in a fixed priority order:
//!
//! | Priority | Line | Combo | Cooldown |
//! |----------|------|-------|----------|
//! | 1 | Up | volume +10 | combo cooldown |
//! | 2 | Down | volume -10 | combo cooldown |
//! | 3 | Left | toggle wifi | combo cooldown |
//! | 4 | A | toggle bluetooth | combo cooldown |
//! | 5 | QuickSave | quick-load press | quick-load hold |
//! | 6 | Start | escape press/release | combo cooldown |
//!
//! Only the first pressed line fires per run. A combo and its cooldown
//! occupy the resolver; runs that arrive meanwhile still update the info
//! flag but fire nothing.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::gpio::LineReader;
use super::lines::{Level, LineMap, LogicalAction};
use crate::error::Result;
use crate::hid::{with_hid, HidKey, SharedHid};
use crate::state::SharedState;
use crate::system::audio::{volume_down, volume_up, Audio};
use crate::system::radio::Radios;

/// Side effect fired by a hotkey combo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combo {
    VolumeUp,
    VolumeDown,
    ToggleWifi,
    ToggleBluetooth,
    QuickLoad,
    Escape,
}

/// Combo lines in the order they are checked.
pub const PRIORITY: [(LogicalAction, Combo); 6] = [
    (LogicalAction::DpadUp, Combo::VolumeUp),
    (LogicalAction::DpadDown, Combo::VolumeDown),
    (LogicalAction::DpadLeft, Combo::ToggleWifi),
    (LogicalAction::ButtonA, Combo::ToggleBluetooth),
    (LogicalAction::QuickSave, Combo::QuickLoad),
    (LogicalAction::Start, Combo::Escape),
];

/// Combo delays
#[derive(Debug, Clone, Copy)]
pub struct ComboTiming {
    /// Wait after a combo before the next one is recognised
    pub cooldown: Duration,
    /// Wait between the quick-load press and its sync
    pub quickload_hold: Duration,
}

pub struct HotkeyResolver {
    reader: Arc<dyn LineReader>,
    hotkey: Option<u32>,
    /// (pin, combo) in priority order, for configured lines only
    combos: Vec<(u32, Combo)>,
    state: Arc<SharedState>,
    hid: SharedHid,
    audio: Arc<Audio>,
    radios: Arc<Radios>,
    timing: ComboTiming,
    busy: Mutex<()>,
}

impl HotkeyResolver {
    #[must_use]
    pub fn new(
        reader: Arc<dyn LineReader>,
        lines: &LineMap,
        state: Arc<SharedState>,
        hid: SharedHid,
        audio: Arc<Audio>,
        radios: Arc<Radios>,
        timing: ComboTiming,
    ) -> Self {
        let combos = PRIORITY
            .iter()
            .filter_map(|&(action, combo)| lines.pin_for(action).map(|pin| (pin, combo)))
            .collect();

        Self {
            reader,
            hotkey: lines.hotkey().map(|line| line.physical_id),
            combos,
            state,
            hid,
            audio,
            radios,
            timing,
            busy: Mutex::new(()),
        }
    }

    /// Whether the modifier line currently reads pressed. Always `false`
    /// when no modifier is configured.
    ///
    /// # Errors
    ///
    /// Returns `Gpio` error if the modifier line cannot be read.
    pub fn hotkey_held(&self) -> Result<bool> {
        match self.hotkey {
            Some(pin) => self.reader.is_low(pin),
            None => Ok(false),
        }
    }

    /// First pressed combo line in priority order, if the modifier is held.
    ///
    /// # Errors
    ///
    /// Returns `Gpio` error if a line cannot be read.
    pub fn pressed_combo(&self) -> Result<Option<Combo>> {
        if !self.hotkey_held()? {
            return Ok(None);
        }
        for &(pin, combo) in &self.combos {
            if self.reader.is_low(pin)? {
                return Ok(Some(combo));
            }
        }
        Ok(None)
    }

    /// Mirrors the overlay into the info flag, requests a refresh and fires
    /// at most one combo.
    ///
    /// Returns the combo that fired.
    ///
    /// # Errors
    ///
    /// Returns `Gpio` error if a line cannot be read, or `Hid` error if a
    /// key combo could not be emitted.
    pub async fn snapshot(&self) -> Result<Option<Combo>> {
        self.state.update(|s| s.info = s.overlay_visible);
        self.state.request_refresh();

        let Ok(_busy) = self.busy.try_lock() else {
            debug!("Combo still cooling down, skipping");
            return Ok(None);
        };

        let combo = self.pressed_combo()?;
        if let Some(combo) = combo {
            info!("Hotkey combo: {:?}", combo);
            self.fire(combo).await?;
            self.state.request_refresh();
        }
        Ok(combo)
    }

    async fn fire(&self, combo: Combo) -> Result<()> {
        match combo {
            Combo::VolumeUp | Combo::VolumeDown => {
                let step: fn(u8) -> u8 = if combo == Combo::VolumeUp {
                    volume_up
                } else {
                    volume_down
                };
                let volume = self.state.update(|s| {
                    s.volume_percent = step(s.volume_percent);
                    s.volume_percent
                });
                self.audio.set_level(volume).await;
                tokio::time::sleep(self.timing.cooldown).await;
            }
            Combo::ToggleWifi => {
                let bars = self.radios.refresh_wifi(true).await;
                self.state.update(|s| s.wifi_bars = bars);
                tokio::time::sleep(self.timing.cooldown).await;
            }
            Combo::ToggleBluetooth => {
                let enabled = self.radios.refresh_bluetooth(true).await;
                self.state.update(|s| s.bluetooth_enabled = enabled);
                tokio::time::sleep(self.timing.cooldown).await;
            }
            Combo::QuickLoad => {
                // Released by the quick-save line's own release event
                with_hid(&self.hid, |hid| hid.emit(HidKey::QuickLoad, Level::Pressed))?;
                tokio::time::sleep(self.timing.quickload_hold).await;
                with_hid(&self.hid, |hid| hid.sync())?;
            }
            Combo::Escape => {
                with_hid(&self.hid, |hid| hid.emit(HidKey::Escape, Level::Pressed))?;
                tokio::time::sleep(self.timing.cooldown).await;
                with_hid(&self.hid, |hid| {
                    hid.emit(HidKey::Escape, Level::Released)?;
                    hid.sync()
                })?;
            }
        }
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use tokio::time::Instant;

    #[tokio::test(start_paused = true)]
    async fn test_no_combo_without_hotkey() {
        let rig = rig();
        rig.lines.set_low(UP, true);
        assert_eq!(rig.resolver.snapshot().await.unwrap(), None);
        assert!(rig.runner.calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_hotkey_up_raises_volume_by_ten() {
        let rig = rig();
        rig.state.update(|s| s.volume_percent = 50);
        rig.lines.set_low(HOTKEY, true);
        rig.lines.set_low(UP, true);

        let start = Instant::now();
        assert_eq!(rig.resolver.snapshot().await.unwrap(), Some(Combo::VolumeUp));
        assert!(start.elapsed() >= Duration::from_millis(500));
        assert_eq!(rig.state.snapshot().volume_percent, 60);
        assert_eq!(rig.runner.calls(), vec!["amixer sset -q PCM 60%"]);
        assert!(rig.hid.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_volume_clamped_at_bounds() {
        let rig = rig();
        rig.state.update(|s| s.volume_percent = 95);
        rig.lines.set_low(HOTKEY, true);
        rig.lines.set_low(UP, true);
        rig.resolver.snapshot().await.unwrap();
        assert_eq!(rig.state.snapshot().volume_percent, 100);

        rig.lines.set_low(UP, false);
        rig.lines.set_low(DOWN, true);
        rig.state.update(|s| s.volume_percent = 4);
        rig.resolver.snapshot().await.unwrap();
        assert_eq!(rig.state.snapshot().volume_percent, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_priority_only_first_line_fires() {
        let rig = rig();
        rig.lines.set_low(HOTKEY, true);
        rig.lines.set_low(START, true);
        rig.lines.set_low(LEFT, true);
        rig.lines.set_low(DOWN, true);
        rig.state.update(|s| s.volume_percent = 50);

        assert_eq!(rig.resolver.snapshot().await.unwrap(), Some(Combo::VolumeDown));
        assert_eq!(rig.state.snapshot().volume_percent, 40);
        // Neither wifi nor escape ran
        assert_eq!(rig.runner.calls(), vec!["amixer sset -q PCM 40%"]);
        assert!(rig.hid.records().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_left_toggles_wifi() {
        let rig = rig();
        rig.lines.set_low(HOTKEY, true);
        rig.lines.set_low(LEFT, true);

        assert_eq!(rig.resolver.snapshot().await.unwrap(), Some(Combo::ToggleWifi));
        // No marker existed, so the toggle turns wifi off
        assert_eq!(rig.state.snapshot().wifi_bars, 0);
        assert_eq!(rig.runner.count("rfkill block wifi"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_a_toggles_bluetooth() {
        let rig = rig();
        rig.state.update(|s| s.bluetooth_enabled = true);
        rig.lines.set_low(HOTKEY, true);
        rig.lines.set_low(A, true);

        assert_eq!(rig.resolver.snapshot().await.unwrap(), Some(Combo::ToggleBluetooth));
        assert!(!rig.state.snapshot().bluetooth_enabled);
        assert_eq!(rig.runner.count("rfkill block bluetooth"), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_quicksave_combo_presses_quickload() {
        let rig = rig();
        rig.lines.set_low(HOTKEY, true);
        rig.lines.set_low(QUICKSAVE, true);

        let start = Instant::now();
        assert_eq!(rig.resolver.snapshot().await.unwrap(), Some(Combo::QuickLoad));
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(
            rig.hid.records(),
            vec![
                crate::hid::mocks::HidRecord::Key(HidKey::QuickLoad, Level::Pressed),
                crate::hid::mocks::HidRecord::Sync,
            ]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_combo_pulses_escape() {
        let rig = rig();
        rig.lines.set_low(HOTKEY, true);
        rig.lines.set_low(START, true);

        assert_eq!(rig.resolver.snapshot().await.unwrap(), Some(Combo::Escape));
        assert_eq!(
            rig.hid.keys(),
            vec![(HidKey::Escape, Level::Pressed), (HidKey::Escape, Level::Released)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_right_has_no_combo() {
        let rig = rig();
        rig.lines.set_low(HOTKEY, true);
        rig.lines.set_low(RIGHT, true);
        rig.lines.set_low(B, true);
        assert_eq!(rig.resolver.snapshot().await.unwrap(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_snapshot_mirrors_overlay_and_requests_refresh() {
        let rig = rig();
        rig.state.update(|s| s.overlay_visible = true);
        rig.resolver.snapshot().await.unwrap();
        assert!(rig.state.snapshot().info);
        assert!(rig.state.wait_for_refresh(Duration::ZERO).await);

        rig.state.update(|s| s.overlay_visible = false);
        rig.resolver.snapshot().await.unwrap();
        assert!(!rig.state.snapshot().info);
    }

    #[tokio::test(start_paused = true)]
    async fn test_combo_during_cooldown_is_skipped() {
        let rig = rig();
        rig.state.update(|s| s.volume_percent = 50);
        rig.lines.set_low(HOTKEY, true);
        rig.lines.set_low(UP, true);

        let first = {
            let resolver = rig.resolver.clone();
            tokio::spawn(async move { resolver.snapshot().await })
        };
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(rig.resolver.snapshot().await.unwrap(), None);
        assert_eq!(first.await.unwrap().unwrap(), Some(Combo::VolumeUp));
        assert_eq!(rig.state.snapshot().volume_percent, 60);

        // After the cooldown the next press fires again
        assert_eq!(rig.resolver.snapshot().await.unwrap(), Some(Combo::VolumeUp));
        assert_eq!(rig.state.snapshot().volume_percent, 70);
    }

    #[tokio::test(start_paused = true)]
    async fn test_read_error_propagates() {
        let rig = rig();
        rig.lines.fail_line(HOTKEY);
        assert!(rig.resolver.snapshot().await.is_err());
        assert!(rig.resolver.hotkey_held().is_err());
    }

    #[test]
    fn test_without_hotkey_line_nothing_is_held() {
        let rig = rig();
        let mut keys = rig.config.keys.clone();
        keys.hotkey = None;
        let map = LineMap::from_keys(&keys).unwrap();
        let resolver = HotkeyResolver::new(
            rig.lines.clone(),
            &map,
            rig.state.clone(),
            rig.hid.shared(),
            Arc::new(Audio::new(rig.runner.clone(), "PCM")),
            Arc::new(Radios::new(rig.runner.clone(), &rig.config.system)),
            ComboTiming {
                cooldown: Duration::from_millis(500),
                quickload_hold: Duration::from_secs(2),
            },
        );
        rig.lines.set_low(HOTKEY, true);
        assert!(!resolver.hotkey_held().unwrap());
        assert_eq!(resolver.pressed_combo().unwrap(), None);
    }
}
