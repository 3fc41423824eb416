//! Key injection.
//!
//! [`KeyBackend`] is the seam to whatever actually delivers key events (an
//! OS keyboard driver, a log, a test recorder). [`KeyInjector`] sits in
//! front of a backend and tracks which keys it has pressed, so that every
//! held key can be released on shutdown.
//!
//! Backends:
//!
//! - `UinputBackend` (Linux): a uinput virtual keyboard, so events reach
//!   every application like real key presses.
//! - [`LogBackend`]: logs events, for dry runs.
//! - [`RecordingBackend`]: keeps events for inspection.

pub mod hid;
#[cfg(target_os = "linux")]
mod uinput;

#[cfg(target_os = "linux")]
pub use uinput::{UinputBackend, UinputError, DEFAULT_DEVICE_NAME};

use std::collections::BTreeSet;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, info, trace, warn};

use crate::event::{KeyEvent, KeyState};
use crate::keyboard::KeyId;

/// Failure reported by a key backend.
#[derive(Debug, Error)]
#[error("key backend failed to emit {event}: {reason}")]
pub struct InjectError {
    pub event: KeyEvent,
    pub reason: String,
}

/// Delivers key transitions.
pub trait KeyBackend: Send {
    fn emit(&mut self, event: KeyEvent) -> Result<(), InjectError>;
}

impl<B: KeyBackend + ?Sized> KeyBackend for Box<B> {
    fn emit(&mut self, event: KeyEvent) -> Result<(), InjectError> {
        (**self).emit(event)
    }
}

/// Backend that only logs events.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogBackend;

impl KeyBackend for LogBackend {
    fn emit(&mut self, event: KeyEvent) -> Result<(), InjectError> {
        info!(key = event.key, state = %event.state, "Key event");
        Ok(())
    }
}

/// Backend that appends events to a shared list.
#[derive(Debug, Default, Clone)]
pub struct RecordingBackend {
    events: Arc<Mutex<Vec<KeyEvent>>>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of everything emitted so far.
    pub fn events(&self) -> Vec<KeyEvent> {
        self.events.lock().clone()
    }

    /// Take and clear the recorded events.
    pub fn drain(&self) -> Vec<KeyEvent> {
        std::mem::take(&mut *self.events.lock())
    }
}

impl KeyBackend for RecordingBackend {
    fn emit(&mut self, event: KeyEvent) -> Result<(), InjectError> {
        self.events.lock().push(event);
        Ok(())
    }
}

/// Tracks held keys in front of a backend.
///
/// Down events are always forwarded (repeat-down policies rely on it). An
/// up event is forwarded only for a key currently held; otherwise it is a
/// no-op. Dropping the injector releases every held key once.
pub struct KeyInjector<B: KeyBackend> {
    backend: B,
    down: BTreeSet<KeyId>,
}

impl<B: KeyBackend> KeyInjector<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            down: BTreeSet::new(),
        }
    }

    /// Apply one event.
    pub fn dispatch(&mut self, event: KeyEvent) {
        match event.state {
            KeyState::Down => {
                self.down.insert(event.key);
            }
            KeyState::Up => {
                if !self.down.remove(&event.key) {
                    trace!(key = event.key, "Up for key not held, ignoring");
                    return;
                }
            }
        }
        if let Err(e) = self.backend.emit(event) {
            warn!(error = %e, "Key event not delivered");
        }
    }

    /// Whether `key` is held.
    pub fn is_down(&self, key: KeyId) -> bool {
        self.down.contains(&key)
    }

    /// Keys currently held, ascending.
    pub fn down_keys(&self) -> impl Iterator<Item = KeyId> + '_ {
        self.down.iter().copied()
    }

    /// Release every held key, returning how many were released.
    pub fn release_all(&mut self) -> usize {
        let held: Vec<KeyId> = self.down.iter().copied().collect();
        for &key in &held {
            self.dispatch(KeyEvent::up(key));
        }
        if !held.is_empty() {
            debug!(count = held.len(), "Released held keys");
        }
        held.len()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }
}

impl<B: KeyBackend> Drop for KeyInjector<B> {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl<B: KeyBackend> std::fmt::Debug for KeyInjector<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyInjector")
            .field("down", &self.down)
            .finish_non_exhaustive()
    }
}
