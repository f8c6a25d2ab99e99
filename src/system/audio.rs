//! # Audio Level Collaborator
//!
//! Reads the output level from `amixer` once at startup and sets it with
//! `amixer sset` on every volume combo. Setting is fire-and-forget.

use std::sync::Arc;
use tracing::{info, warn};

use super::command::CommandRunner;

/// Volume change per combo press, in percent.
pub const VOLUME_STEP: u8 = 10;

/// Maximum volume in percent.
pub const VOLUME_MAX: u8 = 100;

/// `current + VOLUME_STEP`, clamped to 100.
#[must_use]
pub fn volume_up(current: u8) -> u8 {
    current.saturating_add(VOLUME_STEP).min(VOLUME_MAX)
}

/// `current - VOLUME_STEP`, clamped to 0.
#[must_use]
pub fn volume_down(current: u8) -> u8 {
    current.min(VOLUME_MAX).saturating_sub(VOLUME_STEP)
}

/// Extracts the percentage from the first `Left:` line of `amixer` output,
/// e.g. `Front Left: Playback 52428 [80%] [on]` gives 80.
#[must_use]
pub fn parse_left_level(output: &str) -> Option<u8> {
    let line = output.lines().find(|line| line.contains("Left:"))?;
    let open = line.find('[')?;
    let close = open + line[open..].find(']')?;
    let value: u32 = line[open + 1..close].trim_end_matches('%').trim().parse().ok()?;
    Some(value.min(u32::from(VOLUME_MAX)) as u8)
}

/// `amixer` wrapper for one simple mixer control
pub struct Audio {
    runner: Arc<dyn CommandRunner>,
    control: String,
}

impl Audio {
    /// # Arguments
    ///
    /// * `runner` - Command runner used for every `amixer` call
    /// * `control` - Simple mixer control to set (e.g. "PCM")
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, control: impl Into<String>) -> Self {
        Self {
            runner,
            control: control.into(),
        }
    }

    /// Current output level in percent, 0 if it cannot be determined.
    pub async fn read_level(&self) -> u8 {
        match self.runner.run(&["amixer"]).await {
            Ok(output) => parse_left_level(&output).unwrap_or_else(|| {
                info!("Audio Err    : no level in amixer output");
                0
            }),
            Err(e) => {
                info!("Audio Err    : {}", e);
                0
            }
        }
    }

    /// Sets the output level. Failures are logged only.
    pub async fn set_level(&self, percent: u8) {
        let level = format!("{}%", percent.min(VOLUME_MAX));
        if let Err(e) = self
            .runner
            .run(&["amixer", "sset", "-q", &self.control, &level])
            .await
        {
            warn!("Failed to set volume to {}: {}", level, e);
        }
    }
}
