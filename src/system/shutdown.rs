//! # Shutdown Sequencer
//!
//! Terminal action shared by the power state machine, the shutdown-detect
//! line and the lid sensor. The first caller wins; every later or concurrent
//! call returns immediately without touching the host.
//!
//! Sequence: stop the foreground application, wait the grace period, request
//! power-off, then hand the exit status to the exit hook. Failures of the
//! host commands do not stop the sequence.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use super::host::HostControl;

/// Called once at the end of the sequence with the process exit status.
pub type ExitHook = Box<dyn Fn(i32) + Send + Sync>;

pub struct ShutdownSequencer {
    host: Arc<dyn HostControl>,
    foreground_app: String,
    grace: Duration,
    started: AtomicBool,
    exit: ExitHook,
}

impl ShutdownSequencer {
    /// # Arguments
    ///
    /// * `host` - Host controller used to stop processes and power off
    /// * `foreground_app` - Process stopped before power-off
    /// * `grace` - Wait between stopping the application and powering off
    /// * `exit` - Receives the exit status once the sequence completes
    pub fn new(
        host: Arc<dyn HostControl>,
        foreground_app: impl Into<String>,
        grace: Duration,
        exit: ExitHook,
    ) -> Self {
        Self {
            host,
            foreground_app: foreground_app.into(),
            grace,
            started: AtomicBool::new(false),
            exit,
        }
    }

    /// Whether the sequence has been entered.
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.started.load(Ordering::SeqCst)
    }

    /// Runs the sequence unless it has already been entered.
    ///
    /// Returns `true` for the call that actually ran it.
    pub async fn run(&self, reason: &str) -> bool {
        if self
            .started
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Shutdown already in progress, ignoring request ({})", reason);
            return false;
        }

        info!("SHUTDOWN ({})", reason);
        self.host.stop_process(&self.foreground_app).await;
        tokio::time::sleep(self.grace).await;
        self.host.power_off().await;
        (self.exit)(0);
        true
    }
}

impl std::fmt::Debug for ShutdownSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShutdownSequencer")
            .field("foreground_app", &self.foreground_app)
            .field("grace", &self.grace)
            .field("started", &self.is_started())
            .finish_non_exhaustive()
    }
}
