//! # Application
//!
//! Wires the collaborators together and runs the monitor:
//!
//! - one task per monitored line: edge watcher, debounce gate, handler
//! - the polling loop: battery, power state machine, status frame, then an
//!   interruptible wait of up to the poll interval
//!
//! Both sides meet only in [`SharedState`]. Anything user-visible requests a
//! refresh, which cuts the wait short so the next frame goes out promptly.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::controller::{
    ButtonDispatcher, ComboTiming, DebounceGate, EdgeSource, EdgeWatcher, HotkeyResolver,
    LineMap, LineReader, PowerLines,
};
use crate::error::Result;
use crate::hid::SharedHid;
use crate::osd::{OsdSink, StatusFrame};
use crate::power::{BatteryAdc, BatteryReader, PowerMonitor, Thresholds, Transition};
use crate::state::SharedState;
use crate::system::audio::Audio;
use crate::system::command::CommandRunner;
use crate::system::host::HostControl;
use crate::system::radio::Radios;
use crate::system::shutdown::ShutdownSequencer;

/// Pause before watching a line again after it could not be read.
const LINE_RETRY: Duration = Duration::from_secs(1);

/// External collaborators the monitor drives.
pub struct Collaborators {
    pub reader: Arc<dyn LineReader>,
    pub hid: SharedHid,
    pub runner: Arc<dyn CommandRunner>,
    pub host: Arc<dyn HostControl>,
    pub osd: Box<dyn OsdSink>,
    /// `None` when battery monitoring is disabled
    pub adc: Option<Box<dyn BatteryAdc>>,
}

pub struct App {
    config: Config,
    state: Arc<SharedState>,
    lines: LineMap,
    reader: Arc<dyn LineReader>,
    dispatcher: Arc<ButtonDispatcher>,
    power_lines: Arc<PowerLines>,
    power: PowerMonitor,
    battery: Option<BatteryReader>,
    osd: Box<dyn OsdSink>,
    sequencer: Arc<ShutdownSequencer>,
    audio: Arc<Audio>,
    radios: Arc<Radios>,
    exit: watch::Receiver<Option<i32>>,
}

impl App {
    /// Builds the monitor from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns `Invalid` error if the line table cannot be built.
    pub fn new(config: Config, collaborators: Collaborators) -> Result<Self> {
        let Collaborators {
            reader,
            hid,
            runner,
            host,
            osd,
            adc,
        } = collaborators;

        let lines = LineMap::from_keys(&config.keys)?;
        let state = Arc::new(SharedState::default());
        let timing = &config.timing;

        let audio = Arc::new(Audio::new(runner.clone(), config.system.audio_control.clone()));
        let radios = Arc::new(Radios::new(runner, &config.system));

        let resolver = Arc::new(HotkeyResolver::new(
            reader.clone(),
            &lines,
            state.clone(),
            hid.clone(),
            audio.clone(),
            radios.clone(),
            ComboTiming {
                cooldown: timing.combo_cooldown(),
                quickload_hold: timing.quickload_hold(),
            },
        ));
        let dispatcher = Arc::new(ButtonDispatcher::new(
            hid.clone(),
            state.clone(),
            resolver,
            timing.debounce(),
        ));

        let (exit_tx, exit) = watch::channel(None);
        let sequencer = Arc::new(ShutdownSequencer::new(
            host.clone(),
            config.system.foreground_app.clone(),
            timing.shutdown_grace(),
            Box::new(move |code| {
                exit_tx.send_replace(Some(code));
            }),
        ));
        let power_lines = Arc::new(PowerLines::new(
            hid,
            host,
            sequencer.clone(),
            config.system.emulator_app.clone(),
            config.system.lid_sound.clone(),
            timing.debounce(),
        ));

        let power = PowerMonitor::new(
            Thresholds::from_config(&config.battery),
            timing.low_battery_clear(),
        );
        let battery = adc.map(BatteryReader::new);

        Ok(Self {
            config,
            state,
            lines,
            reader,
            dispatcher,
            power_lines,
            power,
            battery,
            osd,
            sequencer,
            audio,
            radios,
            exit,
        })
    }

    /// Shared device state.
    #[must_use]
    pub fn state(&self) -> Arc<SharedState> {
        self.state.clone()
    }

    /// Reads the initial volume and radio states.
    pub async fn init_state(&self) {
        let volume = self.audio.read_level().await;
        let wifi = self.radios.refresh_wifi(false).await;
        let bluetooth = self.radios.refresh_bluetooth(false).await;
        let joystick = self.config.joystick.on_by_default;

        self.state.update(|s| {
            s.volume_percent = volume;
            s.wifi_bars = wifi;
            s.bluetooth_enabled = bluetooth;
            s.joystick_enabled = joystick;
        });
        info!(
            "Initial state: volume {}%, wifi {}, bluetooth {}",
            volume, wifi, bluetooth
        );
    }

    /// One polling cycle: battery, power state, status frame.
    ///
    /// A shutdown transition sends its final frame and then runs the
    /// shutdown sequence before returning.
    ///
    /// # Errors
    ///
    /// Returns `Adc` error if the battery cannot be read (nothing is sent
    /// in that case), or `Osd`/`Io` error if the frame cannot be written.
    pub async fn poll_cycle(&mut self) -> Result<Option<Transition>> {
        if let Some(battery) = self.battery.as_mut() {
            let voltage = battery.read_voltage()?;
            let percent = self.power.thresholds().percent(voltage);
            info!("Battery Voltage {}", voltage);
            info!("Battery Percent {}", percent);
            self.state.update(|s| {
                s.voltage = voltage;
                s.battery_percent = percent;
            });
        }

        let voltage = self.state.snapshot().voltage;
        let transition = self.power.evaluate(voltage, &self.state);

        let frame = StatusFrame::from_state(&self.state.snapshot());
        let sent = self.osd.send(&frame).await;

        if transition == Some(Transition::Shutdown) {
            self.sequencer.run("low battery").await;
        }
        sent.map(|_| transition)
    }

    /// Runs until a signal arrives or the shutdown sequence completes.
    ///
    /// Returns the process exit status.
    ///
    /// # Errors
    ///
    /// Returns `Io` error if the signal handlers cannot be installed.
    pub async fn run(mut self) -> Result<i32> {
        self.init_state().await;
        let tasks = self.spawn_line_tasks();
        let mut sigterm = signal(SignalKind::terminate())?;
        let poll_interval = self.config.timing.poll_interval();

        info!("Monitoring {} lines", tasks.len());

        let code = loop {
            if let Some(code) = *self.exit.borrow_and_update() {
                break code;
            }

            if let Err(e) = self.poll_cycle().await {
                warn!("Poll cycle failed: {}", e);
            }

            tokio::select! {
                woken = self.state.wait_for_refresh(poll_interval) => {
                    if woken {
                        debug!("Refresh requested");
                    }
                }
                _ = self.exit.changed() => {}
                _ = tokio::signal::ctrl_c() => {
                    info!("Received Ctrl+C, shutting down...");
                    break 0;
                }
                _ = sigterm.recv() => {
                    info!("Received SIGTERM, shutting down...");
                    break 0;
                }
            }
        };

        for task in &tasks {
            task.abort();
        }
        self.osd.terminate().await;
        Ok(code)
    }

    fn spawn_line_tasks(&self) -> Vec<JoinHandle<()>> {
        let edge_poll = self.config.timing.edge_poll();
        let gate = DebounceGate::new(self.config.timing.debounce());
        let mut tasks = Vec::with_capacity(self.lines.len() + 2);

        for &line in self.lines.iter() {
            let reader = self.reader.clone();
            let dispatcher = self.dispatcher.clone();
            tasks.push(tokio::spawn(watch_line(
                self.reader.clone(),
                line.physical_id,
                edge_poll,
                move || {
                    let reader = reader.clone();
                    let dispatcher = dispatcher.clone();
                    async move {
                        let event = gate.sample(reader.as_ref(), line).await?;
                        dispatcher.handle(event).await
                    }
                },
            )));
        }

        if let Some(pin) = self.config.general.shutdown_detect {
            let reader = self.reader.clone();
            let power_lines = self.power_lines.clone();
            tasks.push(tokio::spawn(watch_line(
                self.reader.clone(),
                pin,
                edge_poll,
                move || {
                    let reader = reader.clone();
                    let power_lines = power_lines.clone();
                    async move {
                        let level = gate.level(reader.as_ref(), pin).await?;
                        power_lines.on_shutdown_line(level).await;
                        Ok(())
                    }
                },
            )));
        }

        if let Some(pin) = self.config.general.lid_sensor {
            let reader = self.reader.clone();
            let power_lines = self.power_lines.clone();
            tasks.push(tokio::spawn(watch_line(
                self.reader.clone(),
                pin,
                edge_poll,
                move || {
                    let reader = reader.clone();
                    let power_lines = power_lines.clone();
                    async move {
                        let level = gate.level(reader.as_ref(), pin).await?;
                        power_lines.on_lid(level).await;
                        Ok(())
                    }
                },
            )));
        }

        tasks
    }
}

/// Calls `on_edge` after every edge on `pin`, forever. Errors are logged and
/// never end the watch.
async fn watch_line<F, Fut>(
    reader: Arc<dyn LineReader>,
    pin: u32,
    edge_poll: Duration,
    mut on_edge: F,
) where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let mut watcher = EdgeWatcher::new(reader, pin, edge_poll);
    debug!("Watching line {}", pin);
    loop {
        if let Err(e) = watcher.next_edge().await {
            warn!("Line {}: {}", pin, e);
            tokio::time::sleep(LINE_RETRY).await;
            continue;
        }
        if let Err(e) = on_edge().await {
            warn!("Line {}: {}", pin, e);
        }
    }
}
