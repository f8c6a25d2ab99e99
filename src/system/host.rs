//! Host-level commands used on the shutdown and lid-close paths.

use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

use super::command::{privileged, CommandRunner};

/// Process and power control of the host.
#[async_trait]
pub trait HostControl: Send + Sync {
    /// Stops every process named `name`. Failures are logged only.
    async fn stop_process(&self, name: &str);

    /// Requests an immediate system halt. Failures are logged only.
    async fn power_off(&self);

    /// Plays a sound file and waits for playback to finish.
    async fn play_sound(&self, path: &Path);
}

/// [`HostControl`] backed by `killall`, `shutdown` and `aplay`
pub struct Host {
    runner: Arc<dyn CommandRunner>,
    sudo: bool,
}

impl Host {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, sudo: bool) -> Self {
        Self { runner, sudo }
    }
}

#[async_trait]
impl HostControl for Host {
    async fn stop_process(&self, name: &str) {
        info!("Stopping {}", name);
        let argv = privileged(self.sudo, &["killall", name]);
        if let Err(e) = self.runner.run(&argv).await {
            warn!("Failed to stop {}: {}", name, e);
        }
    }

    async fn power_off(&self) {
        info!("Powering off");
        let argv = privileged(self.sudo, &["shutdown", "-h", "now"]);
        if let Err(e) = self.runner.run(&argv).await {
            warn!("Power off request failed: {}", e);
        }
    }

    async fn play_sound(&self, path: &Path) {
        let path = path.to_string_lossy();
        if let Err(e) = self.runner.run(&["aplay", path.as_ref()]).await {
            warn!("Failed to play {}: {}", path, e);
        }
    }
}

#[cfg(test)]
pub mod mocks {
    use super::*;
    use std::sync::Mutex;

    /// Records host actions in order, as readable strings.
    #[derive(Clone, Default)]
    pub struct RecordingHost {
        pub actions: Arc<Mutex<Vec<String>>>,
    }

    impl RecordingHost {
        pub fn new() -> Arc<Self> {
            Arc::new(Self::default())
        }

        pub fn actions(&self) -> Vec<String> {
            self.actions.lock().unwrap().clone()
        }

        fn record(&self, action: String) {
            self.actions.lock().unwrap().push(action);
        }
    }

    #[async_trait]
    impl HostControl for RecordingHost {
        async fn stop_process(&self, name: &str) {
            self.record(format!("stop {}", name));
        }

        async fn power_off(&self) {
            self.record("power_off".to_string());
        }

        async fn play_sound(&self, path: &Path) {
            self.record(format!("play {}", path.display()));
        }
    }
}
