//! # Power Lines
//!
//! Handlers for the two optional lines that end the session: an external
//! shutdown switch and a hall-effect lid sensor. Both finish in the
//! [`ShutdownSequencer`].
//!
//! Closing the lid first triggers the emulator's save hotkey
//! (Select + QuickSave), waits for the save, stops the emulator and plays
//! the lid sound before shutting down.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::lines::Level;
use crate::error::Result;
use crate::hid::{with_hid, HidKey, SharedHid};
use crate::system::host::HostControl;
use crate::system::shutdown::ShutdownSequencer;

/// Wait after the save hotkey before the emulator is stopped.
pub const SAVE_WAIT: Duration = Duration::from_secs(3);

/// Wait after stopping the emulator before the lid sound.
pub const EMULATOR_EXIT_WAIT: Duration = Duration::from_secs(2);

pub struct PowerLines {
    hid: SharedHid,
    host: Arc<dyn HostControl>,
    sequencer: Arc<ShutdownSequencer>,
    emulator_app: String,
    lid_sound: Option<PathBuf>,
    settle: Duration,
    lid_closing: AtomicBool,
}

impl PowerLines {
    #[must_use]
    pub fn new(
        hid: SharedHid,
        host: Arc<dyn HostControl>,
        sequencer: Arc<ShutdownSequencer>,
        emulator_app: impl Into<String>,
        lid_sound: Option<PathBuf>,
        settle: Duration,
    ) -> Self {
        Self {
            hid,
            host,
            sequencer,
            emulator_app: emulator_app.into(),
            lid_sound,
            settle,
            lid_closing: AtomicBool::new(false),
        }
    }

    /// Shutdown switch: pressed runs the shutdown sequence.
    pub async fn on_shutdown_line(&self, level: Level) {
        if level.is_pressed() {
            self.sequencer.run("shutdown switch").await;
        }
    }

    /// Lid sensor: a low (pressed) level means the lid is closed.
    ///
    /// A failed auto-save is logged and the shutdown still runs.
    pub async fn on_lid(&self, level: Level) {
        info!("Hall effect sensor tripped: {}", if level.is_pressed() { "closed" } else { "open" });
        if !level.is_pressed() {
            return;
        }
        if self.lid_closing.swap(true, Ordering::SeqCst) {
            debug!("Lid close already in progress");
            return;
        }

        if let Err(e) = self.auto_save().await {
            warn!("Auto-save before lid shutdown failed: {}", e);
        }

        tokio::time::sleep(SAVE_WAIT).await;
        self.host.stop_process(&self.emulator_app).await;
        tokio::time::sleep(EMULATOR_EXIT_WAIT).await;
        if let Some(sound) = &self.lid_sound {
            self.host.play_sound(sound).await;
        }
        self.sequencer.run("lid closed").await;
    }

    /// Presses and releases Select + QuickSave.
    async fn auto_save(&self) -> Result<()> {
        for level in [Level::Pressed, Level::Released] {
            with_hid(&self.hid, |hid| {
                hid.emit(HidKey::Select, level)?;
                hid.emit(HidKey::QuickSave, level)
            })?;
            tokio::time::sleep(self.settle).await;
            with_hid(&self.hid, |hid| hid.sync())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::MonitorError;
    use crate::hid::mocks::{HidRecord, RecordingHid};
    use crate::hid::{HidSink, SharedHid};
    use crate::system::host::mocks::RecordingHost;
    use std::sync::Mutex;
    use tokio::time::Instant;

    /// Accepts key transitions but fails every sync.
    struct UnsyncableHid;

    impl HidSink for UnsyncableHid {
        fn emit(&mut self, _key: HidKey, _level: Level) -> Result<()> {
            Ok(())
        }

        fn sync(&mut self) -> Result<()> {
            Err(MonitorError::Hid("device gone".to_string()))
        }
    }

    struct Fixture {
        hid: RecordingHid,
        host: Arc<RecordingHost>,
        exits: Arc<Mutex<Vec<i32>>>,
        lines: PowerLines,
    }

    fn fixture(lid_sound: Option<PathBuf>) -> Fixture {
        let hid = RecordingHid::new();
        fixture_with(hid.clone(), hid.shared(), lid_sound)
    }

    fn fixture_with(hid: RecordingHid, sink: SharedHid, lid_sound: Option<PathBuf>) -> Fixture {
        let host = RecordingHost::new();
        let exits = Arc::new(Mutex::new(Vec::new()));
        let recorder = exits.clone();
        let sequencer = Arc::new(ShutdownSequencer::new(
            host.clone(),
            "emulationstation",
            Duration::from_secs(1),
            Box::new(move |code| recorder.lock().unwrap().push(code)),
        ));
        let lines = PowerLines::new(
            sink,
            host.clone(),
            sequencer,
            "retroarch",
            lid_sound,
            Duration::from_millis(30),
        );
        Fixture {
            hid,
            host,
            exits,
            lines,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_line_pressed_runs_sequence() {
        let f = fixture(None);
        f.lines.on_shutdown_line(Level::Pressed).await;
        assert_eq!(f.host.actions(), vec!["stop emulationstation", "power_off"]);
        assert_eq!(*f.exits.lock().unwrap(), vec![0]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_line_released_is_ignored() {
        let f = fixture(None);
        f.lines.on_shutdown_line(Level::Released).await;
        assert!(f.host.actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lid_close_saves_then_shuts_down() {
        let f = fixture(Some(PathBuf::from("/opt/osd/lid_beep.wav")));

        let start = Instant::now();
        f.lines.on_lid(Level::Pressed).await;
        assert!(start.elapsed() >= SAVE_WAIT + EMULATOR_EXIT_WAIT + Duration::from_secs(1));

        assert_eq!(
            f.hid.records(),
            vec![
                HidRecord::Key(HidKey::Select, Level::Pressed),
                HidRecord::Key(HidKey::QuickSave, Level::Pressed),
                HidRecord::Sync,
                HidRecord::Key(HidKey::Select, Level::Released),
                HidRecord::Key(HidKey::QuickSave, Level::Released),
                HidRecord::Sync,
            ]
        );
        assert_eq!(
            f.host.actions(),
            vec![
                "stop retroarch",
                "play /opt/osd/lid_beep.wav",
                "stop emulationstation",
                "power_off",
            ]
        );
        assert_eq!(f.exits.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lid_open_does_nothing() {
        let f = fixture(None);
        f.lines.on_lid(Level::Released).await;
        assert!(f.hid.records().is_empty());
        assert!(f.host.actions().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_lid_bounce_runs_sequence_once() {
        let f = fixture(None);
        tokio::join!(f.lines.on_lid(Level::Pressed), f.lines.on_lid(Level::Pressed));
        assert_eq!(f.hid.keys().len(), 4);
        assert_eq!(f.exits.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_lid_close_after_switch_shutdown_does_not_rerun() {
        let f = fixture(None);
        f.lines.on_shutdown_line(Level::Pressed).await;
        f.lines.on_lid(Level::Pressed).await;
        assert_eq!(f.exits.lock().unwrap().len(), 1);
        assert_eq!(
            f.host.actions().iter().filter(|a| *a == "power_off").count(),
            1
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_lid_close_shuts_down_when_auto_save_fails() {
        let f = fixture_with(
            RecordingHid::new(),
            Arc::new(Mutex::new(UnsyncableHid)),
            None,
        );

        f.lines.on_lid(Level::Pressed).await;
        assert_eq!(
            f.host.actions(),
            vec!["stop retroarch", "stop emulationstation", "power_off"]
        );
        assert_eq!(*f.exits.lock().unwrap(), vec![0]);

        // Later closes stay ignored once the sequence has run
        f.lines.on_lid(Level::Pressed).await;
        assert_eq!(f.exits.lock().unwrap().len(), 1);
    }
}
