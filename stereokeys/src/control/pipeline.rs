//! Mode-specific component bundles.
//!
//! Each [`Mode`] runs a different subset of the components. Rather than one
//! struct of optional parts, [`Pipeline`] holds exactly the parts its mode
//! needs, built once at startup.

use std::collections::BTreeSet;

use tracing::{debug, warn};

use super::mode::Mode;
use super::stage::DetectionStage;
use crate::capture::FrameSource;
use crate::event::{KeyEvent, KeyState};
use crate::injector::{KeyBackend, KeyInjector};
use crate::keyboard::{KeyId, KeyRegionStore};
use crate::transport::{FrameSender, KeySignalReceiver, KeySignalSender};

/// Detection stage over any key-region store.
pub type BoxedStage = DetectionStage<Box<dyn KeyRegionStore>>;

/// Injector over any key backend.
pub type BoxedInjector = KeyInjector<Box<dyn KeyBackend>>;

/// Sends key signals and remembers which keys the remote side holds.
#[derive(Debug)]
pub struct Forwarder {
    sender: KeySignalSender,
    held: BTreeSet<KeyId>,
}

impl Forwarder {
    pub fn new(sender: KeySignalSender) -> Self {
        Self {
            sender,
            held: BTreeSet::new(),
        }
    }

    pub fn dispatch(&mut self, event: KeyEvent) {
        match event.state {
            KeyState::Down => {
                self.held.insert(event.key);
            }
            KeyState::Up => {
                self.held.remove(&event.key);
            }
        }
        if let Err(e) = self.sender.send(event.into()) {
            warn!(event = %event, error = %e, "Key signal not sent");
        }
    }

    /// Send an up for every key sent down and not yet released.
    pub fn release_all(&mut self) -> usize {
        let held: Vec<KeyId> = self.held.iter().copied().collect();
        for &key in &held {
            self.dispatch(KeyEvent::up(key));
        }
        held.len()
    }
}

/// Where detected key events go.
#[derive(Debug)]
pub enum EventSink {
    /// Local key injection.
    Inject(BoxedInjector),
    /// Key signals to a remote receiver.
    Forward(Forwarder),
}

impl EventSink {
    pub fn inject(backend: Box<dyn KeyBackend>) -> Self {
        EventSink::Inject(KeyInjector::new(backend))
    }

    pub fn forward(sender: KeySignalSender) -> Self {
        EventSink::Forward(Forwarder::new(sender))
    }

    pub fn dispatch(&mut self, event: KeyEvent) {
        match self {
            EventSink::Inject(injector) => injector.dispatch(event),
            EventSink::Forward(forwarder) => forwarder.dispatch(event),
        }
    }

    pub fn release_all(&mut self) -> usize {
        match self {
            EventSink::Inject(injector) => injector.release_all(),
            EventSink::Forward(forwarder) => forwarder.release_all(),
        }
    }
}

/// Scripted key presses for `dummy-sender`: down then up for each key in
/// turn, one event per tick, forever.
#[derive(Debug, Clone)]
pub struct DummyScript {
    keys: Vec<KeyId>,
    next: usize,
    pressed: Option<KeyId>,
}

impl DummyScript {
    pub fn new(keys: Vec<KeyId>) -> Self {
        Self {
            keys,
            next: 0,
            pressed: None,
        }
    }

    /// Next event, or `None` when there are no keys to script.
    pub fn next_event(&mut self) -> Option<KeyEvent> {
        if let Some(key) = self.pressed.take() {
            return Some(KeyEvent::up(key));
        }
        let key = *self.keys.get(self.next)?;
        self.next = (self.next + 1) % self.keys.len();
        self.pressed = Some(key);
        Some(KeyEvent::down(key))
    }

    /// Up event for a key left pressed, if any.
    pub fn release(&mut self) -> Option<KeyEvent> {
        self.pressed.take().map(KeyEvent::up)
    }
}

/// The components one mode runs.
pub enum Pipeline {
    LocalFull {
        source: Box<dyn FrameSource>,
        stage: BoxedStage,
        sink: EventSink,
    },
    RemoteReceiver {
        receiver: KeySignalReceiver,
        injector: BoxedInjector,
        /// Inject a down for a key already held instead of dropping it.
        accept_repeat_down: bool,
    },
    CaptureOnlySender {
        source: Box<dyn FrameSource>,
        sender: FrameSender,
    },
    RemoteDetectReceiver {
        source: Box<dyn FrameSource>,
        stage: BoxedStage,
        sink: EventSink,
    },
    DummySender {
        sender: KeySignalSender,
        script: DummyScript,
    },
    DummyReceiver {
        receiver: KeySignalReceiver,
    },
}

impl Pipeline {
    pub fn mode(&self) -> Mode {
        match self {
            Pipeline::LocalFull { .. } => Mode::LocalFull,
            Pipeline::RemoteReceiver { .. } => Mode::RemoteReceiver,
            Pipeline::CaptureOnlySender { .. } => Mode::CaptureOnlySender,
            Pipeline::RemoteDetectReceiver { .. } => Mode::RemoteDetectReceiver,
            Pipeline::DummySender { .. } => Mode::DummySender,
            Pipeline::DummyReceiver { .. } => Mode::DummyReceiver,
        }
    }

    /// Detection stage, for modes that detect.
    pub fn stage_mut(&mut self) -> Option<&mut BoxedStage> {
        match self {
            Pipeline::LocalFull { stage, .. } | Pipeline::RemoteDetectReceiver { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Release every key this pipeline pressed. Returns how many.
    pub fn release_all(&mut self) -> usize {
        let released = match self {
            Pipeline::LocalFull { sink, .. } | Pipeline::RemoteDetectReceiver { sink, .. } => sink.release_all(),
            Pipeline::RemoteReceiver { injector, .. } => injector.release_all(),
            Pipeline::DummySender { sender, script } => match script.release() {
                Some(event) => {
                    if let Err(e) = sender.send(event.into()) {
                        warn!(event = %event, error = %e, "Key signal not sent");
                    }
                    1
                }
                None => 0,
            },
            Pipeline::CaptureOnlySender { .. } | Pipeline::DummyReceiver { .. } => 0,
        };
        debug!(mode = %self.mode(), released, "Released held keys");
        released
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("mode", &self.mode())
            .finish_non_exhaustive()
    }
}
