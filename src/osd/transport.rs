//! OSD child process transport.
//!
//! The OSD is launched once as `binary resource_dir full|nojoystick` with a
//! piped stdin. Each update sends SIGUSR1 to the child, then writes one
//! status line and flushes.

use async_trait::async_trait;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, ChildStdin, Command};
use tracing::{debug, info, warn};

use super::frame::StatusFrame;
use crate::config::OsdConfig;
use crate::error::{MonitorError, Result};

/// Time allowed for the child to exit after SIGTERM before it is killed.
const TERMINATE_TIMEOUT: Duration = Duration::from_secs(1);

/// Destination for status frames.
#[async_trait]
pub trait OsdSink: Send + Sync {
    /// Notifies the OSD and writes one frame.
    async fn send(&mut self, frame: &StatusFrame) -> Result<()>;

    /// Stops the OSD. Never fails; problems are logged.
    async fn terminate(&mut self);
}

/// Layout the OSD draws, passed as its second argument.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OsdMode {
    /// Includes the joystick indicator
    Full,
    NoJoystick,
}

impl OsdMode {
    #[must_use]
    pub fn from_joystick_disabled(disabled: bool) -> Self {
        if disabled {
            OsdMode::NoJoystick
        } else {
            OsdMode::Full
        }
    }

    #[must_use]
    pub fn as_arg(self) -> &'static str {
        match self {
            OsdMode::Full => "full",
            OsdMode::NoJoystick => "nojoystick",
        }
    }
}

/// Running OSD child process
pub struct OsdProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    pid: libc::pid_t,
}

impl OsdProcess {
    /// Spawns the OSD and checks that it survives the startup grace period.
    ///
    /// # Errors
    ///
    /// Returns `OsdLaunch` error if the binary cannot be started or has
    /// already exited when the grace period ends.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use handheld_monitor::config::Config;
    /// use handheld_monitor::osd::transport::{OsdMode, OsdProcess};
    ///
    /// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
    /// let config = Config::load("config/default.toml")?;
    /// let osd = OsdProcess::launch(&config.osd, OsdMode::Full).await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn launch(config: &OsdConfig, mode: OsdMode) -> Result<Self> {
        info!("Starting OSD: {} ({})", config.binary.display(), mode.as_arg());

        let mut child = Command::new(&config.binary)
            .arg(&config.resource_dir)
            .arg(mode.as_arg())
            .stdin(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| MonitorError::OsdLaunch(format!("{}: {}", config.binary.display(), e)))?;

        let pid = child
            .id()
            .and_then(|id| libc::pid_t::try_from(id).ok())
            .ok_or_else(|| MonitorError::OsdLaunch("OSD exited during spawn".to_string()))?;
        let stdin = child.stdin.take();

        tokio::time::sleep(Duration::from_millis(config.startup_grace_ms)).await;
        if let Some(status) = child.try_wait()? {
            return Err(MonitorError::OsdLaunch(format!(
                "OSD exited during startup with {}",
                status
            )));
        }

        debug!("OSD running with pid {}", pid);
        Ok(Self { child, stdin, pid })
    }
}

fn send_signal(pid: libc::pid_t, signal: libc::c_int) -> Result<()> {
    // SAFETY: kill(2) has no memory-safety preconditions
    let rc = unsafe { libc::kill(pid, signal) };
    if rc != 0 {
        return Err(MonitorError::Osd(format!(
            "Failed to signal OSD: {}",
            std::io::Error::last_os_error()
        )));
    }
    Ok(())
}

#[async_trait]
impl OsdSink for OsdProcess {
    async fn send(&mut self, frame: &StatusFrame) -> Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| MonitorError::Osd("OSD input is closed".to_string()))?;

        send_signal(self.pid, libc::SIGUSR1)?;
        let line = frame.encode();
        stdin.write_all(line.as_bytes()).await?;
        stdin.flush().await?;
        debug!("OSD <- {}", line.trim_end());
        Ok(())
    }

    async fn terminate(&mut self) {
        self.stdin.take();
        if let Err(e) = send_signal(self.pid, libc::SIGTERM) {
            warn!("{}", e);
        }
        match tokio::time::timeout(TERMINATE_TIMEOUT, self.child.wait()).await {
            Ok(Ok(status)) => info!("OSD exited with {}", status),
            Ok(Err(e)) => warn!("Failed to reap OSD: {}", e),
            Err(_) => {
                warn!("OSD ignored SIGTERM, killing it");
                if let Err(e) = self.child.kill().await {
                    warn!("Failed to kill OSD: {}", e);
                }
            }
        }
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// OSD sink that records every line it is sent
    #[derive(Clone, Default)]
    pub struct RecordingOsd {
        pub lines: Arc<Mutex<Vec<String>>>,
        pub terminated: Arc<Mutex<bool>>,
        pub fail_sends: Arc<Mutex<bool>>,
    }

    impl RecordingOsd {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }

        pub fn frames(&self) -> Vec<StatusFrame> {
            self.lines()
                .iter()
                .map(|line| StatusFrame::parse(line).unwrap())
                .collect()
        }

        pub fn is_terminated(&self) -> bool {
            *self.terminated.lock().unwrap()
        }

        pub fn set_fail_sends(&self, fail: bool) {
            *self.fail_sends.lock().unwrap() = fail;
        }
    }

    #[async_trait]
    impl OsdSink for RecordingOsd {
        async fn send(&mut self, frame: &StatusFrame) -> Result<()> {
            if *self.fail_sends.lock().unwrap() {
                return Err(MonitorError::Osd("Broken pipe".to_string()));
            }
            self.lines.lock().unwrap().push(frame.encode());
            Ok(())
        }

        async fn terminate(&mut self) {
            *self.terminated.lock().unwrap() = true;
        }
    }
}
