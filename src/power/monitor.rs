//! # Power State Machine
//!
//! Evaluated once per polling cycle against the filtered voltage:
//!
//! ```text
//!            v < low                      v < shutdown
//!   NORMAL ----------> LOW_WARNING ----------------------> SHUTDOWN_PENDING
//!      ^                    |                                   ^
//!      +---- v >= low ------+                                   |
//!      |                                                        |
//!      +----------------------- v < shutdown -------------------+
//! ```
//!
//! Entering LOW_WARNING shows the warning and arms a one-shot timer that
//! dismisses it. The timer only touches the displayed indicator, never the
//! power state. Returning to NORMAL cancels a pending timer.
//! SHUTDOWN_PENDING is terminal; only the evaluation that enters it reports
//! [`Transition::Shutdown`].

use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::AbortHandle;
use tracing::{info, warn};

use super::battery::battery_percent;
use crate::config::BatteryConfig;
use crate::state::{LowBatteryIndicator, PowerState, SharedState};

/// Voltage thresholds in hundredths of a volt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Thresholds {
    pub full: i32,
    pub low: i32,
    pub shutdown: i32,
}

impl Thresholds {
    #[must_use]
    pub fn from_config(config: &BatteryConfig) -> Self {
        Self {
            full: config.full_voltage,
            low: config.low_voltage,
            shutdown: config.shutdown_voltage,
        }
    }

    /// Battery percentage for `voltage` within these thresholds.
    #[must_use]
    pub fn percent(&self, voltage: i32) -> u8 {
        battery_percent(voltage, self.shutdown, self.full)
    }
}

/// Power state change produced by one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// NORMAL to LOW_WARNING
    LowWarning,
    /// LOW_WARNING back to NORMAL
    Recovered,
    /// Into SHUTDOWN_PENDING. Reported once per process.
    Shutdown,
}

pub struct PowerMonitor {
    thresholds: Thresholds,
    clear_after: Duration,
    clear_timer: Mutex<Option<AbortHandle>>,
}

impl PowerMonitor {
    /// # Arguments
    ///
    /// * `thresholds` - Full, low and shutdown voltages
    /// * `clear_after` - Delay before the low-battery warning is hidden
    #[must_use]
    pub fn new(thresholds: Thresholds, clear_after: Duration) -> Self {
        Self {
            thresholds,
            clear_after,
            clear_timer: Mutex::new(None),
        }
    }

    #[must_use]
    pub fn thresholds(&self) -> Thresholds {
        self.thresholds
    }

    /// Applies `voltage` to the power state in `state`.
    ///
    /// Every transition requests a status refresh. Must be called from
    /// within a Tokio runtime; entering LOW_WARNING spawns the auto-clear
    /// timer.
    pub fn evaluate(&self, voltage: i32, state: &Arc<SharedState>) -> Option<Transition> {
        let t = self.thresholds;
        let transition = state.update(|s| match s.power {
            PowerState::ShutdownPending => None,
            _ if voltage < t.shutdown => {
                s.power = PowerState::ShutdownPending;
                s.info = true;
                Some(Transition::Shutdown)
            }
            PowerState::Normal if voltage < t.low => {
                s.power = PowerState::LowWarning;
                s.low_battery = LowBatteryIndicator::Warning;
                Some(Transition::LowWarning)
            }
            PowerState::LowWarning if voltage >= t.low => {
                s.power = PowerState::Normal;
                s.low_battery = LowBatteryIndicator::None;
                Some(Transition::Recovered)
            }
            _ => None,
        })?;

        match transition {
            Transition::Shutdown => warn!("Low Voltage Shutdown Triggered ({})", voltage),
            Transition::LowWarning => {
                info!("Triggering Low Batt warning ({})", voltage);
                self.arm_clear_timer(state);
            }
            Transition::Recovered => {
                info!("Battery recovered ({})", voltage);
                self.cancel_clear_timer();
            }
        }
        state.request_refresh();
        Some(transition)
    }

    fn timer_slot(&self) -> std::sync::MutexGuard<'_, Option<AbortHandle>> {
        self.clear_timer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn arm_clear_timer(&self, state: &Arc<SharedState>) {
        let state = state.clone();
        let delay = self.clear_after;
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let dismissed = state.update(|s| {
                let showing = s.low_battery.is_displayed();
                if showing {
                    s.low_battery = LowBatteryIndicator::Dismissed;
                }
                showing
            });
            if dismissed {
                info!("Turning off low battery");
                state.request_refresh();
            }
        });

        if let Some(previous) = self.timer_slot().replace(handle.abort_handle()) {
            previous.abort();
        }
    }

    fn cancel_clear_timer(&self) {
        if let Some(handle) = self.timer_slot().take() {
            handle.abort();
        }
    }
}

impl Drop for PowerMonitor {
    fn drop(&mut self) {
        self.cancel_clear_timer();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAR: Duration = Duration::from_secs(2);

    fn monitor() -> PowerMonitor {
        PowerMonitor::new(
            Thresholds {
                full: 420,
                low: 340,
                shutdown: 320,
            },
            CLEAR,
        )
    }

    fn power(state: &SharedState) -> (PowerState, LowBatteryIndicator) {
        let snapshot = state.snapshot();
        (snapshot.power, snapshot.low_battery)
    }

    #[tokio::test(start_paused = true)]
    async fn test_normal_voltage_stays_normal() {
        let monitor = monitor();
        let state = Arc::new(SharedState::default());

        assert_eq!(monitor.evaluate(410, &state), None);
        assert_eq!(power(&state), (PowerState::Normal, LowBatteryIndicator::None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_low_voltage_warns_then_clears_display_only() {
        let monitor = monitor();
        let state = Arc::new(SharedState::default());

        assert_eq!(monitor.evaluate(339, &state), Some(Transition::LowWarning));
        assert_eq!(power(&state), (PowerState::LowWarning, LowBatteryIndicator::Warning));
        assert!(state.wait_for_refresh(Duration::ZERO).await);

        tokio::time::sleep(CLEAR + Duration::from_millis(1)).await;
        assert_eq!(power(&state), (PowerState::LowWarning, LowBatteryIndicator::Dismissed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_warning_is_not_rearmed_while_low() {
        let monitor = monitor();
        let state = Arc::new(SharedState::default());

        monitor.evaluate(339, &state);
        tokio::time::sleep(CLEAR + Duration::from_millis(1)).await;
        assert_eq!(monitor.evaluate(335, &state), None);
        assert_eq!(power(&state).1, LowBatteryIndicator::Dismissed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovery_cancels_pending_clear() {
        let monitor = monitor();
        let state = Arc::new(SharedState::default());

        monitor.evaluate(339, &state);
        tokio::time::sleep(Duration::from_millis(500)).await;
        assert_eq!(monitor.evaluate(345, &state), Some(Transition::Recovered));
        assert_eq!(power(&state), (PowerState::Normal, LowBatteryIndicator::None));

        tokio::time::sleep(CLEAR * 2).await;
        assert_eq!(power(&state), (PowerState::Normal, LowBatteryIndicator::None));
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_reported_exactly_once() {
        let monitor = monitor();
        let state = Arc::new(SharedState::default());

        assert_eq!(monitor.evaluate(319, &state), Some(Transition::Shutdown));
        assert_eq!(monitor.evaluate(319, &state), None);
        assert_eq!(monitor.evaluate(100, &state), None);

        let snapshot = state.snapshot();
        assert_eq!(snapshot.power, PowerState::ShutdownPending);
        assert!(snapshot.info);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_supersedes_warning() {
        let monitor = monitor();
        let state = Arc::new(SharedState::default());

        monitor.evaluate(339, &state);
        assert_eq!(monitor.evaluate(300, &state), Some(Transition::Shutdown));
        // Recovery is impossible once shutdown is pending
        assert_eq!(monitor.evaluate(410, &state), None);
        assert_eq!(power(&state).0, PowerState::ShutdownPending);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_timer_after_shutdown_is_harmless() {
        let monitor = monitor();
        let state = Arc::new(SharedState::default());

        monitor.evaluate(339, &state);
        monitor.evaluate(310, &state);
        tokio::time::sleep(CLEAR + Duration::from_millis(1)).await;
        assert_eq!(
            power(&state),
            (PowerState::ShutdownPending, LowBatteryIndicator::Dismissed)
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_from_normal_skips_warning() {
        let monitor = monitor();
        let state = Arc::new(SharedState::default());

        assert_eq!(monitor.evaluate(319, &state), Some(Transition::Shutdown));
        assert_eq!(power(&state).1, LowBatteryIndicator::None);
    }

    #[test]
    fn test_thresholds_percent() {
        let t = Thresholds {
            full: 420,
            low: 340,
            shutdown: 320,
        };
        assert_eq!(t.percent(320), 0);
        assert_eq!(t.percent(420), 100);
        assert_eq!(t.percent(410), 90);
    }
}
