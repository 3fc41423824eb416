//! Key events through a uinput virtual keyboard.
//!
//! The kernel treats the device like any other keyboard, so events reach
//! X11, Wayland compositors and text consoles alike. Creating it needs
//! write access to `/dev/uinput`.

use std::io;

use evdev::uinput::VirtualDevice;
use evdev::{AttributeSet, BusType, EventType, InputEvent, InputId, KeyCode};
use thiserror::Error;
use tracing::{info, trace};

use super::hid;
use super::{InjectError, KeyBackend};
use crate::event::{KeyEvent, KeyState};

/// Device name shown by `evtest` and `/proc/bus/input/devices`.
pub const DEFAULT_DEVICE_NAME: &str = "stereokeys virtual keyboard";

/// Failure creating the virtual keyboard.
#[derive(Debug, Error)]
#[error("failed to create uinput keyboard: {0}")]
pub struct UinputError(#[source] pub io::Error);

/// Backend emitting through a uinput virtual keyboard.
pub struct UinputBackend {
    device: VirtualDevice,
}

impl UinputBackend {
    /// Create a keyboard named [`DEFAULT_DEVICE_NAME`].
    pub fn create() -> Result<Self, UinputError> {
        Self::with_name(DEFAULT_DEVICE_NAME)
    }

    /// Create a keyboard that can emit every translated HID usage.
    pub fn with_name(name: &str) -> Result<Self, UinputError> {
        let mut keys = AttributeSet::<KeyCode>::new();
        for code in hid::mapped_keycodes() {
            keys.insert(KeyCode::new(code));
        }

        let device = VirtualDevice::builder()
            .map_err(UinputError)?
            .name(name)
            .input_id(InputId::new(BusType::BUS_VIRTUAL, 0x5354, 0x4b59, 1))
            .with_keys(&keys)
            .map_err(UinputError)?
            .build()
            .map_err(UinputError)?;

        info!(name, keys = keys.iter().count(), "Virtual keyboard created");
        Ok(Self { device })
    }
}

/// Kernel key event for a key transition.
pub(crate) fn key_input_event(event: KeyEvent) -> Result<InputEvent, InjectError> {
    let code = hid::linux_keycode(event.key).ok_or_else(|| InjectError {
        event,
        reason: format!("HID usage {:#04x} has no Linux key code", event.key),
    })?;
    let value = match event.state {
        KeyState::Down => 1,
        KeyState::Up => 0,
    };
    Ok(InputEvent::new(EventType::KEY.0, code, value))
}

impl KeyBackend for UinputBackend {
    fn emit(&mut self, event: KeyEvent) -> Result<(), InjectError> {
        let input = key_input_event(event)?;
        // `emit` follows the batch with a SYN_REPORT.
        self.device.emit(&[input]).map_err(|e| InjectError {
            event,
            reason: e.to_string(),
        })?;
        trace!(key = event.key, code = input.code(), state = %event.state, "Key event emitted");
        Ok(())
    }
}

impl std::fmt::Debug for UinputBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UinputBackend").finish_non_exhaustive()
    }
}
