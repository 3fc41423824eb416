//! The control loop.
//!
//! One loop runs per process, in the [`Mode`] chosen at startup. Each tick
//! does the mode's unit of work, then the scheduler sleeps out the rest of
//! the period:
//!
//! ```text
//!   ┌─► stop requested? ──yes──► release held keys ──► exit
//!   │        │ no
//!   │        ▼
//!   │   tick (mode-specific)
//!   │     local-full:            grab ─► detect ×2 ─► pair ─► triangulate
//!   │                            ─► key regions ─► edges ─► inject/forward
//!   │     remote-detect-receiver: receive frame pair ─► (same as above)
//!   │     capture-only-sender:   grab ─► JPEG ─► frame records
//!   │     remote-receiver:       key signals ─► inject
//!   │     dummy-sender:          scripted key signal
//!   │     dummy-receiver:        key signals ─► log
//!   │        │
//!   │   apply pending tuning
//!   │        │
//!   └── sleep rest of period
//! ```
//!
//! Nothing that fails inside a tick stops the loop: the failing unit of
//! work is skipped with a warning. Only [`ControlLoop::initialize`] can
//! fail, before the first tick.

mod edges;
mod error;
mod matching;
mod mode;
mod pipeline;
mod scheduler;
mod stage;
mod stop;

pub use edges::{EdgeDetector, EdgePolicy};
pub use error::StartupError;
pub use matching::{match_fingers, nearest_by_x, FingerPair};
pub use mode::{Dispatch, Mode};
pub use pipeline::{BoxedInjector, BoxedStage, DummyScript, EventSink, Forwarder, Pipeline};
pub use scheduler::{TickScheduler, TickTiming};
pub use stage::{DetectionStage, TickDetections};
pub use stop::StopSignal;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, trace, warn};

use crate::capture::{check_resolution, self_test, CameraPairSource, CaptureError, FrameSource};
use crate::config::{ConfigError, ConfigFile};
use crate::detector::FingerDetector;
use crate::diagnostics::FrameDumper;
use crate::event::{KeyEvent, KeyState};
use crate::frame::{CameraId, FramePair};
use crate::geometry::SpaceConverter;
use crate::injector::{KeyBackend, KeyInjector};
use crate::keyboard::{KeyMap, KeyRegionStore, VirtualKeyboard};
use crate::telemetry::{LoopMetrics, LoopSnapshot};
use crate::transport::{FrameSender, KeySignalReceiver, KeySignalSender, SendOutcome, UdpFrameReceiver};
use crate::tuning::{ConfigFileTuner, SharedTuning, TuningState};

/// Most key signals handled in one tick.
pub const MAX_SIGNALS_PER_TICK: usize = 64;

/// What a tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// The tick's work ran; `events` key events were dispatched.
    Processed { events: usize },
    /// Input was unusable (bad frame, transport error); nothing dispatched.
    Skipped,
    /// No input arrived within the receive timeout.
    Idle,
    /// The input source has no more frames; the loop stops.
    Exhausted,
}

/// Loop settings independent of the mode.
#[derive(Debug, Clone, PartialEq)]
pub struct LoopSettings {
    pub fps: u32,
    pub edge_policy: EdgePolicy,
    /// Expected frame size; frames of another size are skipped.
    pub frame_size: (u32, u32),
}

impl LoopSettings {
    pub fn from_config(config: &ConfigFile) -> Self {
        Self {
            fps: config.session.fps,
            edge_policy: EdgePolicy::from_repeat_flag(config.session.send_repeat_key_down),
            frame_size: (config.capture.width, config.capture.height),
        }
    }
}

/// Fixed-rate loop driving one [`Pipeline`].
#[derive(Debug)]
pub struct ControlLoop {
    pipeline: Pipeline,
    settings: LoopSettings,
    edges: EdgeDetector,
    scheduler: TickScheduler,
    stop: StopSignal,
    metrics: Arc<LoopMetrics>,
    tuning: Option<SharedTuning>,
    tuner: Option<ConfigFileTuner>,
    dumper: Option<FrameDumper>,
    tick: u64,
}

fn required<'a>(value: &'a Option<String>, key: &str) -> Result<&'a str, ConfigError> {
    value
        .as_deref()
        .ok_or_else(|| ConfigError::Invalid(format!("{} is not set", key)))
}

fn open_cameras(config: &ConfigFile) -> Result<Box<dyn FrameSource>, StartupError> {
    let top = required(&config.capture.top_source, "capture.top_source")?;
    let front = required(&config.capture.front_source, "capture.front_source")?;
    let (width, height) = (config.capture.width, config.capture.height);
    let mut source: Box<dyn FrameSource> = Box::new(CameraPairSource::open(top, front, width, height)?);
    self_test(source.as_mut(), width, height)?;
    Ok(source)
}

fn build_stage(config: &ConfigFile) -> Result<BoxedStage, StartupError> {
    let converter = SpaceConverter::new(&config.camera_geometry())?;
    let keymap = KeyMap::load(&config.keyboard.keymap)?;
    let store: Box<dyn KeyRegionStore> = Box::new(keymap);
    Ok(DetectionStage::new(
        FingerDetector::new(CameraId::Top, config.detector_top.clone()),
        FingerDetector::new(CameraId::Front, config.detector_front.clone()),
        converter,
        VirtualKeyboard::new(store),
        config.session.circle_x_distance_threshold,
    ))
}

impl ControlLoop {
    /// Build the loop for the configured mode.
    ///
    /// Opens and self-tests the cameras, loads the key map and binds
    /// sockets as the mode requires. Any failure here is fatal.
    pub fn initialize(config: &ConfigFile, backend: Box<dyn KeyBackend>) -> Result<Self, StartupError> {
        config.validate()?;
        let session = &config.session;
        let net = &config.network;
        let timeout = Duration::from_millis(net.receive_timeout_ms);

        let pipeline = match session.mode {
            Mode::LocalFull => {
                let source = open_cameras(config)?;
                let stage = build_stage(config)?;
                let sink = match session.dispatch {
                    Dispatch::Inject => EventSink::inject(backend),
                    Dispatch::Forward => EventSink::forward(KeySignalSender::connect(&net.address, net.port)?),
                };
                Pipeline::LocalFull { source, stage, sink }
            }
            Mode::RemoteReceiver => Pipeline::RemoteReceiver {
                receiver: KeySignalReceiver::bind(&net.bind_address, net.port, timeout)?,
                injector: KeyInjector::new(backend),
                accept_repeat_down: session.receive_repeat_key_down,
            },
            Mode::CaptureOnlySender => Pipeline::CaptureOnlySender {
                source: open_cameras(config)?,
                sender: FrameSender::connect(&net.address, net.port, net.jpeg_quality)?,
            },
            Mode::RemoteDetectReceiver => Pipeline::RemoteDetectReceiver {
                source: Box::new(UdpFrameReceiver::bind(&net.bind_address, net.port, timeout)?),
                stage: build_stage(config)?,
                sink: EventSink::inject(backend),
            },
            Mode::DummySender => Pipeline::DummySender {
                sender: KeySignalSender::connect(&net.address, net.port)?,
                script: DummyScript::new(session.dummy_keys.clone()),
            },
            Mode::DummyReceiver => Pipeline::DummyReceiver {
                receiver: KeySignalReceiver::bind(&net.bind_address, net.port, timeout)?,
            },
        };

        let mut control = Self::new(pipeline, LoopSettings::from_config(config));
        if session.mode.uses_detection() {
            control = control.with_tuning(
                TuningState::new(config.detector_top.clone(), config.detector_front.clone()).shared(),
            );
            if let Some(dir) = &config.diagnostics.dump_dir {
                control.dumper = FrameDumper::new(dir, config.diagnostics.dump_every)?;
            }
        }
        info!(mode = %session.mode, fps = session.fps, "Control loop initialized");
        Ok(control)
    }

    /// Loop over an already built pipeline.
    pub fn new(pipeline: Pipeline, settings: LoopSettings) -> Self {
        Self {
            pipeline,
            edges: EdgeDetector::new(settings.edge_policy),
            scheduler: TickScheduler::new(settings.fps),
            settings,
            stop: StopSignal::new(),
            metrics: Arc::new(LoopMetrics::new()),
            tuning: None,
            tuner: None,
            dumper: None,
            tick: 0,
        }
    }

    /// Read detector parameters from `tuning` between ticks.
    pub fn with_tuning(mut self, tuning: SharedTuning) -> Self {
        self.tuning = Some(tuning);
        self
    }

    /// Reload detector parameters when the config file at `path` changes.
    /// Has no effect in modes without detection.
    pub fn with_config_tuner(mut self, path: impl Into<PathBuf>) -> Self {
        if let Some(tuning) = &self.tuning {
            self.tuner = Some(ConfigFileTuner::new(path, Arc::clone(tuning)));
        }
        self
    }

    pub fn with_dumper(mut self, dumper: FrameDumper) -> Self {
        self.dumper = Some(dumper);
        self
    }

    pub fn mode(&self) -> Mode {
        self.pipeline.mode()
    }

    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }

    /// Handle for requesting a stop from another thread.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    pub fn metrics(&self) -> Arc<LoopMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Shared tuning state, for modes that detect.
    pub fn tuning(&self) -> Option<SharedTuning> {
        self.tuning.clone()
    }

    /// Run until stopped, then release every held key.
    pub fn run(&mut self) -> LoopSnapshot {
        info!(
            mode = %self.mode(),
            period_ms = self.scheduler.period().as_secs_f64() * 1000.0,
            "Control loop running"
        );
        self.apply_tuning();

        while !self.stop.is_stopped() {
            let tick_start = Instant::now();
            let outcome = self.tick();
            self.apply_tuning();

            if outcome == TickOutcome::Exhausted {
                info!("Input exhausted, stopping");
                self.stop.stop();
                break;
            }
            if let TickTiming::Overran(by) = self.scheduler.wait(tick_start) {
                if outcome != TickOutcome::Idle {
                    self.metrics.tick_overran();
                    trace!(tick = self.tick, overrun_us = by.as_micros() as u64, "Tick overran period");
                }
            }
        }

        let released = self.shutdown();
        let snapshot = self.metrics.snapshot();
        info!(released, ticks = snapshot.ticks, "Control loop stopped");
        snapshot
    }

    /// Release every key this loop pressed. Safe to call more than once.
    pub fn shutdown(&mut self) -> usize {
        let released = self.pipeline.release_all();
        for _ in 0..released {
            self.metrics.key_up();
        }
        released
    }

    /// Run one tick without pacing.
    pub fn tick(&mut self) -> TickOutcome {
        let tick = self.tick;
        self.tick += 1;

        let outcome = match &mut self.pipeline {
            Pipeline::LocalFull { source, stage, sink } | Pipeline::RemoteDetectReceiver { source, stage, sink } => {
                match grab_checked(source.as_mut(), self.settings.frame_size) {
                    Ok(frames) => {
                        let detections = stage.process(&frames);
                        self.metrics.fingers_matched(detections.positions.len());
                        if let Some(dumper) = &self.dumper {
                            dump(dumper, tick, &frames, &detections);
                        }
                        let events = self.edges.update(&detections.pressing);
                        for &event in &events {
                            record(&self.metrics, event);
                            sink.dispatch(event);
                        }
                        TickOutcome::Processed { events: events.len() }
                    }
                    Err(outcome) => outcome,
                }
            }
            Pipeline::CaptureOnlySender { source, sender } => {
                match grab_checked(source.as_mut(), self.settings.frame_size) {
                    Ok(frames) => match sender.send_pair(&frames) {
                        Ok(SendOutcome::Sent { sequence_id }) => {
                            trace!(sequence_id, "Frame pair sent");
                            self.metrics.frame_sent();
                            TickOutcome::Processed { events: 0 }
                        }
                        Ok(SendOutcome::Dropped) => {
                            self.metrics.frame_dropped();
                            TickOutcome::Skipped
                        }
                        Err(e) => {
                            warn!(error = %e, "Frame pair not sent");
                            self.metrics.frame_dropped();
                            TickOutcome::Skipped
                        }
                    },
                    Err(outcome) => outcome,
                }
            }
            Pipeline::RemoteReceiver {
                receiver,
                injector,
                accept_repeat_down,
            } => match receiver.recv_batch(MAX_SIGNALS_PER_TICK) {
                Ok(signals) if signals.is_empty() => TickOutcome::Idle,
                Ok(signals) => {
                    let mut events = 0;
                    for signal in signals {
                        self.metrics.signal_received();
                        let event = KeyEvent::from(signal);
                        if event.state == KeyState::Down && !*accept_repeat_down && injector.is_down(event.key) {
                            trace!(key = event.key, "Dropping repeated key down");
                            continue;
                        }
                        if event.state == KeyState::Up && !injector.is_down(event.key) {
                            trace!(key = event.key, "Up for key not held, ignoring");
                            continue;
                        }
                        record(&self.metrics, event);
                        injector.dispatch(event);
                        events += 1;
                    }
                    TickOutcome::Processed { events }
                }
                Err(e) => {
                    warn!(error = %e, "Key signal receive failed");
                    TickOutcome::Skipped
                }
            },
            Pipeline::DummySender { sender, script } => match script.next_event() {
                Some(event) => {
                    if let Err(e) = sender.send(event.into()) {
                        warn!(event = %event, error = %e, "Key signal not sent");
                        TickOutcome::Skipped
                    } else {
                        debug!(event = %event, "Dummy key signal sent");
                        record(&self.metrics, event);
                        TickOutcome::Processed { events: 1 }
                    }
                }
                None => TickOutcome::Idle,
            },
            Pipeline::DummyReceiver { receiver } => match receiver.recv_batch(MAX_SIGNALS_PER_TICK) {
                Ok(signals) if signals.is_empty() => TickOutcome::Idle,
                Ok(signals) => {
                    for signal in &signals {
                        self.metrics.signal_received();
                        info!(code = signal.code, state = %signal.state, "Key signal");
                    }
                    TickOutcome::Processed { events: 0 }
                }
                Err(e) => {
                    warn!(error = %e, "Key signal receive failed");
                    TickOutcome::Skipped
                }
            },
        };

        self.metrics.tick_completed();
        if outcome == TickOutcome::Skipped {
            self.metrics.tick_skipped();
        }
        outcome
    }

    /// Poll the config tuner and apply changed parameters. Between ticks
    /// only.
    fn apply_tuning(&mut self) {
        if let Some(tuner) = &mut self.tuner {
            tuner.poll();
        }
        if let (Some(tuning), Some(stage)) = (&self.tuning, self.pipeline.stage_mut()) {
            stage.apply_tuning(tuning);
        }
    }
}

fn record(metrics: &LoopMetrics, event: KeyEvent) {
    match event.state {
        KeyState::Down => metrics.key_down(),
        KeyState::Up => metrics.key_up(),
    }
}

/// Grab a pair and check its size, mapping failures to the tick outcome.
fn grab_checked(source: &mut dyn FrameSource, (width, height): (u32, u32)) -> Result<FramePair, TickOutcome> {
    let frames = match source.grab() {
        Ok(frames) => frames,
        Err(CaptureError::Timeout(waited)) => {
            trace!(?waited, "No frames this tick");
            return Err(TickOutcome::Idle);
        }
        Err(CaptureError::Exhausted) => return Err(TickOutcome::Exhausted),
        Err(e) => {
            warn!(source = %source.describe(), error = %e, "Frame grab failed, skipping tick");
            return Err(TickOutcome::Skipped);
        }
    };
    if let Err(e) = check_resolution(&frames, width, height) {
        warn!(error = %e, "Rejecting frame pair");
        return Err(TickOutcome::Skipped);
    }
    Ok(frames)
}

fn dump(dumper: &FrameDumper, tick: u64, frames: &FramePair, detections: &TickDetections) {
    if !dumper.should_dump(tick) {
        return;
    }
    for (camera, detection) in [(CameraId::Top, &detections.top), (CameraId::Front, &detections.front)] {
        if let Err(e) = dumper.dump(tick, camera, frames.get(camera), &detection.circles, &detection.mask) {
            warn!(error = %e, "Diagnostics dump failed");
        }
    }
}
