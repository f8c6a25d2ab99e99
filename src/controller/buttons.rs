//! # Button Dispatch
//!
//! Turns debounced [`ButtonEvent`]s into HID output or hotkey combos.
//!
//! - The modifier line never emits. It sets the overlay flag from its level
//!   and runs the combo resolver.
//! - The quick-save line always emits Select, plus QuickLoad instead of
//!   QuickSave when the modifier is held at that moment.
//! - Combo-capable lines run the resolver instead of emitting while the
//!   modifier is held. Every other line emits its key.
//!
//! Key transitions are followed by the settle interval and then a sync.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::hotkey::HotkeyResolver;
use super::lines::{ButtonEvent, Level, LogicalAction};
use crate::error::Result;
use crate::hid::{with_hid, HidKey, SharedHid};
use crate::state::SharedState;

pub struct ButtonDispatcher {
    hid: SharedHid,
    state: Arc<SharedState>,
    resolver: Arc<HotkeyResolver>,
    settle: Duration,
}

impl ButtonDispatcher {
    /// # Arguments
    ///
    /// * `hid` - Sink for key transitions
    /// * `state` - Shared device state (overlay flag)
    /// * `resolver` - Hotkey combo resolver
    /// * `settle` - Spacing between a key transition and its sync
    #[must_use]
    pub fn new(
        hid: SharedHid,
        state: Arc<SharedState>,
        resolver: Arc<HotkeyResolver>,
        settle: Duration,
    ) -> Self {
        Self {
            hid,
            state,
            resolver,
            settle,
        }
    }

    /// Handles one debounced event.
    ///
    /// # Errors
    ///
    /// Returns `Gpio` error if the modifier line cannot be read, or `Hid`
    /// error if the virtual device rejects the transition.
    pub async fn handle(&self, event: ButtonEvent) -> Result<()> {
        let action = event.line.action;
        debug!(
            "Pin: {}, Action: {:?}, Event: {}",
            event.line.physical_id,
            action,
            if event.level.is_pressed() { "press" } else { "release" }
        );

        match action {
            LogicalAction::HotkeyModifier => {
                self.state
                    .update(|s| s.overlay_visible = event.level.is_pressed());
                // Combo failures must not stop the overlay from toggling
                if let Err(e) = self.resolver.snapshot().await {
                    warn!("Hotkey combo failed: {}", e);
                }
                Ok(())
            }
            LogicalAction::QuickSave => {
                let save_key = if self.resolver.hotkey_held()? {
                    HidKey::QuickLoad
                } else {
                    HidKey::QuickSave
                };
                self.emit(&[(HidKey::Select, event.level), (save_key, event.level)])
                    .await
            }
            _ if action.is_combo_capable() && self.resolver.hotkey_held()? => {
                self.resolver.snapshot().await.map(|_| ())
            }
            _ => match action.hid_key() {
                Some(key) => self.emit(&[(key, event.level)]).await,
                None => Ok(()),
            },
        }
    }

    async fn emit(&self, keys: &[(HidKey, Level)]) -> Result<()> {
        with_hid(&self.hid, |hid| {
            keys.iter().try_for_each(|&(key, level)| hid.emit(key, level))
        })?;
        tokio::time::sleep(self.settle).await;
        with_hid(&self.hid, |hid| hid.sync())
    }
}
