//! Key events.

use std::fmt;

use crate::keyboard::KeyId;

/// Direction of a key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum KeyState {
    Up,
    Down,
}

impl KeyState {
    /// Wire value used by key-signal records.
    pub fn as_u8(self) -> u8 {
        match self {
            KeyState::Up => 0,
            KeyState::Down => 1,
        }
    }

    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(KeyState::Up),
            1 => Some(KeyState::Down),
            _ => None,
        }
    }
}

impl fmt::Display for KeyState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyState::Up => f.write_str("up"),
            KeyState::Down => f.write_str("down"),
        }
    }
}

/// A single key transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyEvent {
    pub key: KeyId,
    pub state: KeyState,
}

impl KeyEvent {
    pub fn down(key: KeyId) -> Self {
        Self {
            key,
            state: KeyState::Down,
        }
    }

    pub fn up(key: KeyId) -> Self {
        Self {
            key,
            state: KeyState::Up,
        }
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.state, self.key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_state_wire_values() {
        assert_eq!(KeyState::Up.as_u8(), 0);
        assert_eq!(KeyState::Down.as_u8(), 1);
        assert_eq!(KeyState::from_u8(1), Some(KeyState::Down));
        assert_eq!(KeyState::from_u8(2), None);
    }

    #[test]
    fn test_event_display() {
        assert_eq!(KeyEvent::down(30).to_string(), "down(30)");
        assert_eq!(KeyEvent::up(4).to_string(), "up(4)");
    }
}
