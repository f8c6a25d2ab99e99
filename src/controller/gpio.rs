//! # GPIO Line Access
//!
//! Reads the current level of physical lines and turns level changes into
//! edge notifications.
//!
//! Line direction, pull-ups and export are set up outside this program; the
//! monitor only reads `<gpio_root>/gpio<N>/value`. Every button is wired
//! active-low (pressed pulls the line to ground), so [`LineReader::is_low`]
//! doubles as "is pressed".

use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tracing::debug;

use crate::error::{MonitorError, Result};

/// Current level of a physical line.
pub trait LineReader: Send + Sync {
    /// Returns `true` when `line` is pulled low.
    fn is_low(&self, line: u32) -> Result<bool>;
}

/// Source of edge notifications for one line.
#[async_trait]
pub trait EdgeSource: Send {
    /// Completes on the next transition of the line. Transitions that
    /// happen while nobody is waiting are coalesced.
    async fn next_edge(&mut self) -> Result<()>;
}

/// [`LineReader`] over the sysfs GPIO interface
#[derive(Debug, Clone)]
pub struct SysfsGpio {
    root: PathBuf,
}

impl SysfsGpio {
    /// # Examples
    ///
    /// ```no_run
    /// use handheld_monitor::controller::gpio::{LineReader, SysfsGpio};
    ///
    /// let gpio = SysfsGpio::new("/sys/class/gpio");
    /// let pressed = gpio.is_low(17)?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn value_path(&self, line: u32) -> PathBuf {
        self.root.join(format!("gpio{}", line)).join("value")
    }
}

impl LineReader for SysfsGpio {
    fn is_low(&self, line: u32) -> Result<bool> {
        let path = self.value_path(line);
        let raw = fs::read_to_string(&path).map_err(|e| {
            MonitorError::Gpio(format!("Failed to read {}: {}", path.display(), e))
        })?;
        parse_level(raw.trim()).ok_or_else(|| {
            MonitorError::Gpio(format!("Unexpected value {:?} in {}", raw, path.display()))
        })
    }
}

/// Parses a sysfs value: `"0"` is low, `"1"` is high.
fn parse_level(raw: &str) -> Option<bool> {
    match raw {
        "0" => Some(true),
        "1" => Some(false),
        _ => None,
    }
}

/// Edge detector that samples a line at a fixed interval.
pub struct EdgeWatcher {
    reader: Arc<dyn LineReader>,
    line: u32,
    interval: Duration,
    last: Option<bool>,
}

impl EdgeWatcher {
    #[must_use]
    pub fn new(reader: Arc<dyn LineReader>, line: u32, interval: Duration) -> Self {
        Self {
            reader,
            line,
            interval,
            last: None,
        }
    }
}

#[async_trait]
impl EdgeSource for EdgeWatcher {
    async fn next_edge(&mut self) -> Result<()> {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let low = self.reader.is_low(self.line)?;
            match self.last {
                // First sample is the baseline, not an edge
                None => self.last = Some(low),
                Some(previous) if previous != low => {
                    self.last = Some(low);
                    debug!("Edge on line {} (low: {})", self.line, low);
                    return Ok(());
                }
                Some(_) => {}
            }
        }
    }
}
