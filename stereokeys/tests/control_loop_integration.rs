//! Integration tests for the control loop.
//!
//! These tests drive complete ticks through in-memory and loopback
//! collaborators:
//! - synthetic fingertip frames → detection → key regions → injected events
//! - held keys released on shutdown
//! - key signals and frame records over loopback UDP
//! - fixed-rate pacing
//!
//! Run with: `cargo test --test control_loop_integration`

use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use image::{Rgb, RgbImage};
use imageproc::drawing::draw_filled_circle_mut;
use parking_lot::Mutex;

use stereokeys::capture::{CaptureError, FrameSource, MemoryFrameSource};
use stereokeys::control::{
    BoxedStage, ControlLoop, DetectionStage, DummyScript, EdgePolicy, EventSink, LoopSettings, Pipeline,
    TickOutcome,
};
use stereokeys::detector::{BilateralParams, DetectorParams, FingerDetector, HoughParams, HsvRange};
use stereokeys::event::KeyEvent;
use stereokeys::frame::{CameraId, FramePair};
use stereokeys::geometry::{CameraGeometry, SpaceConverter};
use stereokeys::injector::{KeyBackend, KeyInjector, RecordingBackend};
use stereokeys::keyboard::{KeyMap, KeyRegion, KeyRegionStore, VirtualKeyboard};
use stereokeys::transport::{
    FrameSender, KeySignal, KeySignalReceiver, KeySignalSender, UdpFrameReceiver,
};

// ============================================================================
// Helper Functions
// ============================================================================

const WIDTH: u32 = 80;
const HEIGHT: u32 = 60;
const KEY: u32 = 4;
const TIMEOUT: Duration = Duration::from_millis(500);

const BACKGROUND: Rgb<u8> = Rgb([20, 120, 40]);
const NAIL: Rgb<u8> = Rgb([230, 20, 40]);

/// Small parameter set that finds a red disc on green quickly.
fn light_params() -> DetectorParams {
    DetectorParams {
        bilateral: BilateralParams {
            diameter: 3,
            sigma_color: 20.0,
            sigma_space: 3.0,
        },
        pre_morphology_iterations: 1,
        hsv: HsvRange {
            h_min: 340.0,
            h_max: 380.0,
            s_min: 0.5,
            s_max: 1.0,
            v_min: 100.0,
            v_max: 255.0,
        },
        nail_morphology_iterations: 1,
        median_ksize: 3,
        hough: HoughParams {
            dp: 1.0,
            min_dist: 8.0,
            param1: 60.0,
            param2: 8.0,
            min_radius: 4,
            max_radius: 14,
        },
    }
}

/// One key large enough to contain any fingertip near the cameras' x axis.
fn stage() -> BoxedStage {
    let keymap = KeyMap::from_regions(vec![KeyRegion {
        id: KEY,
        x: -1000.0,
        y: -1000.0,
        w: 2000.0,
        h: 3000.0,
        s: 1.0e6,
    }])
    .unwrap();
    let store: Box<dyn KeyRegionStore> = Box::new(keymap);
    let geometry = CameraGeometry {
        image_size: (WIDTH, HEIGHT),
        ..CameraGeometry::default()
    };
    DetectionStage::new(
        FingerDetector::new(CameraId::Top, light_params()),
        FingerDetector::new(CameraId::Front, light_params()),
        SpaceConverter::new(&geometry).unwrap(),
        VirtualKeyboard::new(store),
        6.0,
    )
}

/// Both cameras see a fingertip at the image centre column.
fn finger_pair() -> FramePair {
    let frame = || {
        let mut frame = RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);
        draw_filled_circle_mut(&mut frame, (40, 30), 10, NAIL);
        frame
    };
    FramePair::new(frame(), frame())
}

fn blank_pair() -> FramePair {
    let frame = || RgbImage::from_pixel(WIDTH, HEIGHT, BACKGROUND);
    FramePair::new(frame(), frame())
}

fn settings(policy: EdgePolicy) -> LoopSettings {
    LoopSettings {
        fps: 200,
        edge_policy: policy,
        frame_size: (WIDTH, HEIGHT),
    }
}

fn local_loop(pairs: Vec<FramePair>, policy: EdgePolicy) -> (ControlLoop, RecordingBackend) {
    let backend = RecordingBackend::new();
    let pipeline = Pipeline::LocalFull {
        source: Box::new(MemoryFrameSource::once(pairs)),
        stage: stage(),
        sink: EventSink::inject(Box::new(backend.clone())),
    };
    (ControlLoop::new(pipeline, settings(policy)), backend)
}

fn boxed(backend: &RecordingBackend) -> Box<dyn KeyBackend> {
    Box::new(backend.clone())
}

fn signal(event: KeyEvent) -> KeySignal {
    KeySignal::from(event)
}

// ============================================================================
// Local detection
// ============================================================================

#[test]
fn test_fingertip_presses_then_releases_key() {
    let (mut control, backend) = local_loop(
        vec![finger_pair(), finger_pair(), blank_pair()],
        EdgePolicy::EdgeOnly,
    );

    let snapshot = control.run();

    assert_eq!(backend.events(), vec![KeyEvent::down(KEY), KeyEvent::up(KEY)]);
    assert_eq!(snapshot.key_downs, 1);
    assert_eq!(snapshot.key_ups, 1);
    assert!(snapshot.fingers_matched >= 2);
}

#[test]
fn test_held_key_released_on_shutdown() {
    let (mut control, backend) = local_loop(vec![finger_pair()], EdgePolicy::EdgeOnly);

    control.run();

    // Exactly one up per held key, issued by the shutdown path.
    assert_eq!(backend.events(), vec![KeyEvent::down(KEY), KeyEvent::up(KEY)]);
    assert_eq!(control.shutdown(), 0);
    assert_eq!(backend.events().len(), 2);
}

#[test]
fn test_repeat_down_policy_repeats_while_held() {
    let (mut control, backend) = local_loop(vec![finger_pair(), finger_pair()], EdgePolicy::RepeatDown);

    control.run();

    assert_eq!(
        backend.events(),
        vec![KeyEvent::down(KEY), KeyEvent::down(KEY), KeyEvent::up(KEY)]
    );
}

#[test]
fn test_blank_frames_press_nothing() {
    let (mut control, backend) = local_loop(vec![blank_pair(), blank_pair()], EdgePolicy::EdgeOnly);

    assert_eq!(control.tick(), TickOutcome::Processed { events: 0 });
    assert_eq!(control.tick(), TickOutcome::Processed { events: 0 });
    assert_eq!(control.tick(), TickOutcome::Exhausted);
    assert!(backend.events().is_empty());
}

#[test]
fn test_tuning_applies_between_ticks() {
    let (mut control, backend) = local_loop(vec![finger_pair(), finger_pair()], EdgePolicy::EdgeOnly);
    let tuning = stereokeys::tuning::TuningState::new(light_params(), light_params()).shared();
    control = control.with_tuning(tuning.clone());

    assert_eq!(control.tick(), TickOutcome::Processed { events: 1 });

    // A blue hue window matches neither the nail nor the background, hiding
    // the fingertip from the top camera on the next tick.
    let mut blind = light_params();
    blind.hsv.h_min = 200.0;
    blind.hsv.h_max = 240.0;
    tuning.lock().update_top(blind);

    control.run();
    assert_eq!(backend.events(), vec![KeyEvent::down(KEY), KeyEvent::up(KEY)]);
}

// ============================================================================
// Distributed modes
// ============================================================================

#[test]
fn test_remote_receiver_drops_repeated_downs() {
    let receiver = KeySignalReceiver::bind("127.0.0.1", 0, TIMEOUT).unwrap();
    let port = receiver.local_addr().unwrap().port();
    let backend = RecordingBackend::new();
    let pipeline = Pipeline::RemoteReceiver {
        receiver,
        injector: KeyInjector::new(boxed(&backend)),
        accept_repeat_down: false,
    };
    let mut control = ControlLoop::new(pipeline, settings(EdgePolicy::EdgeOnly));

    let sender = KeySignalSender::connect("127.0.0.1", port).unwrap();
    for event in [KeyEvent::down(KEY), KeyEvent::down(KEY), KeyEvent::up(KEY), KeyEvent::up(9)] {
        sender.send(signal(event)).unwrap();
    }
    thread::sleep(Duration::from_millis(50));

    assert_eq!(control.tick(), TickOutcome::Processed { events: 2 });
    assert_eq!(backend.events(), vec![KeyEvent::down(KEY), KeyEvent::up(KEY)]);
    assert_eq!(control.metrics().snapshot().signals_received, 4);
}

#[test]
fn test_remote_receiver_can_accept_repeated_downs() {
    let receiver = KeySignalReceiver::bind("127.0.0.1", 0, TIMEOUT).unwrap();
    let port = receiver.local_addr().unwrap().port();
    let backend = RecordingBackend::new();
    let pipeline = Pipeline::RemoteReceiver {
        receiver,
        injector: KeyInjector::new(boxed(&backend)),
        accept_repeat_down: true,
    };
    let mut control = ControlLoop::new(pipeline, settings(EdgePolicy::EdgeOnly));

    let sender = KeySignalSender::connect("127.0.0.1", port).unwrap();
    sender.send(signal(KeyEvent::down(KEY))).unwrap();
    sender.send(signal(KeyEvent::down(KEY))).unwrap();
    thread::sleep(Duration::from_millis(50));

    control.tick();
    assert_eq!(backend.drain(), vec![KeyEvent::down(KEY), KeyEvent::down(KEY)]);

    // Shutdown releases the held key once.
    assert_eq!(control.shutdown(), 1);
    assert_eq!(backend.events(), vec![KeyEvent::up(KEY)]);
}

#[test]
fn test_remote_receiver_idle_without_signals() {
    let receiver = KeySignalReceiver::bind("127.0.0.1", 0, Duration::from_millis(20)).unwrap();
    let pipeline = Pipeline::RemoteReceiver {
        receiver,
        injector: KeyInjector::new(boxed(&RecordingBackend::new())),
        accept_repeat_down: false,
    };
    let mut control = ControlLoop::new(pipeline, settings(EdgePolicy::EdgeOnly));
    assert_eq!(control.tick(), TickOutcome::Idle);
}

#[test]
fn test_frames_detected_on_remote_host() {
    let frame_receiver = UdpFrameReceiver::bind("127.0.0.1", 0, TIMEOUT).unwrap();
    let port = frame_receiver.local_addr().unwrap().port();

    let mut sender_loop = ControlLoop::new(
        Pipeline::CaptureOnlySender {
            source: Box::new(MemoryFrameSource::once(vec![finger_pair()])),
            sender: FrameSender::connect("127.0.0.1", port, 95).unwrap(),
        },
        settings(EdgePolicy::EdgeOnly),
    );

    let backend = RecordingBackend::new();
    let mut receiver_loop = ControlLoop::new(
        Pipeline::RemoteDetectReceiver {
            source: Box::new(frame_receiver),
            stage: stage(),
            sink: EventSink::inject(Box::new(backend.clone())),
        },
        settings(EdgePolicy::EdgeOnly),
    );

    assert_eq!(sender_loop.tick(), TickOutcome::Processed { events: 0 });
    assert_eq!(receiver_loop.tick(), TickOutcome::Processed { events: 1 });
    assert_eq!(backend.events(), vec![KeyEvent::down(KEY)]);

    assert_eq!(receiver_loop.shutdown(), 1);
    assert_eq!(backend.events(), vec![KeyEvent::down(KEY), KeyEvent::up(KEY)]);
}

#[test]
fn test_dummy_sender_to_receiver() {
    let receiver = KeySignalReceiver::bind("127.0.0.1", 0, TIMEOUT).unwrap();
    let port = receiver.local_addr().unwrap().port();

    let mut sender_loop = ControlLoop::new(
        Pipeline::DummySender {
            sender: KeySignalSender::connect("127.0.0.1", port).unwrap(),
            script: DummyScript::new(vec![4, 5]),
        },
        settings(EdgePolicy::EdgeOnly),
    );
    let mut receiver_loop = ControlLoop::new(Pipeline::DummyReceiver { receiver }, settings(EdgePolicy::EdgeOnly));

    for _ in 0..3 {
        sender_loop.tick();
    }
    thread::sleep(Duration::from_millis(50));

    assert_eq!(receiver_loop.tick(), TickOutcome::Processed { events: 0 });
    assert_eq!(receiver_loop.metrics().snapshot().signals_received, 3);
}

// ============================================================================
// Pacing
// ============================================================================

/// Blank frames whose grab takes `work`, or `slow_work` on every
/// `slow_every`th call. Logs when each grab started and finished.
struct TimedSource {
    work: Duration,
    slow_work: Duration,
    slow_every: usize,
    calls: usize,
    log: Arc<Mutex<Vec<(Instant, Instant)>>>,
}

impl FrameSource for TimedSource {
    fn grab(&mut self) -> Result<FramePair, CaptureError> {
        let started = Instant::now();
        self.calls += 1;
        let work = if self.calls % self.slow_every == 0 {
            self.slow_work
        } else {
            self.work
        };
        thread::sleep(work);
        self.log.lock().push((started, Instant::now()));
        Ok(blank_pair())
    }

    fn describe(&self) -> String {
        "timed blank frames".to_string()
    }
}

#[test]
fn test_loop_paces_to_fps_and_stops_on_signal() {
    const PERIOD: Duration = Duration::from_millis(20);
    const TOLERANCE: Duration = Duration::from_millis(2);

    let log = Arc::new(Mutex::new(Vec::new()));
    let source = TimedSource {
        work: Duration::from_millis(3),
        slow_work: Duration::from_millis(30),
        slow_every: 4,
        calls: 0,
        log: Arc::clone(&log),
    };
    let mut control = ControlLoop::new(
        Pipeline::LocalFull {
            source: Box::new(source),
            stage: stage(),
            sink: EventSink::inject(Box::new(RecordingBackend::new())),
        },
        LoopSettings {
            fps: 50,
            edge_policy: EdgePolicy::EdgeOnly,
            frame_size: (WIDTH, HEIGHT),
        },
    );

    let stop = control.stop_signal();
    let stopper = thread::spawn(move || {
        thread::sleep(Duration::from_millis(400));
        stop.stop();
    });

    let start = Instant::now();
    let snapshot = control.run();
    let elapsed = start.elapsed();
    stopper.join().unwrap();

    let log = log.lock().clone();
    assert_eq!(log.len() as u64, snapshot.ticks);
    assert!(log.len() >= 8, "ticks = {}", log.len());

    // A tick never starts while the previous one is still working.
    for pair in log.windows(2) {
        let (_, previous_end) = pair[0];
        let (next_start, _) = pair[1];
        assert!(next_start >= previous_end);
    }

    // Fast ticks wait out the period; slow ones are followed at once.
    let mut intervals: Vec<Duration> = log.windows(2).map(|pair| pair[1].0 - pair[0].0).collect();
    intervals.sort();
    let median = intervals[intervals.len() / 2];
    assert!(median + TOLERANCE >= PERIOD, "median interval = {median:?}");
    assert!(intervals[0] + TOLERANCE >= PERIOD, "shortest interval = {:?}", intervals[0]);
    assert!(snapshot.overruns >= 1, "overruns = {}", snapshot.overruns);

    let max_ticks = (elapsed.as_millis() / PERIOD.as_millis()) as u64 + 1;
    assert!(snapshot.ticks <= max_ticks, "ticks = {}, max = {}", snapshot.ticks, max_ticks);
}
