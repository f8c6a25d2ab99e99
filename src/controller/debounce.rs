//! # Debounce Gate
//!
//! Mechanical switches bounce for a few milliseconds after every transition.
//! The gate waits a fixed settle interval after an edge and then samples the
//! line once. The sample is reported even when the line has returned to its
//! previous level; there is no second look and no retry.

use std::time::Duration;
use tokio::time::Instant;

use super::gpio::LineReader;
use super::lines::{ButtonEvent, ButtonLine, Level};
use crate::error::Result;

/// Default settle interval.
pub const DEFAULT_SETTLE: Duration = Duration::from_millis(30);

#[derive(Debug, Clone, Copy)]
pub struct DebounceGate {
    settle: Duration,
}

impl Default for DebounceGate {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE)
    }
}

impl DebounceGate {
    #[must_use]
    pub fn new(settle: Duration) -> Self {
        Self { settle }
    }

    #[must_use]
    pub fn settle(&self) -> Duration {
        self.settle
    }

    /// Waits out the settle interval, then samples `line` once.
    ///
    /// Only the calling task sleeps; other lines and the polling loop keep
    /// running.
    ///
    /// # Errors
    ///
    /// Returns `Gpio` error if the line cannot be read.
    pub async fn sample(&self, reader: &dyn LineReader, line: ButtonLine) -> Result<ButtonEvent> {
        let level = self.level(reader, line.physical_id).await?;
        Ok(ButtonEvent {
            line,
            level,
            timestamp: Instant::now(),
        })
    }

    /// Same as [`DebounceGate::sample`] for lines without a logical action
    /// (shutdown switch, lid sensor).
    pub async fn level(&self, reader: &dyn LineReader, line: u32) -> Result<Level> {
        tokio::time::sleep(self.settle).await;
        Ok(Level::from_pressed(reader.is_low(line)?))
    }
}
