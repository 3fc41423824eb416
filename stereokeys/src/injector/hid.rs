//! USB HID keyboard usages to Linux input key codes.
//!
//! Key maps and key signals carry USB HID usage ids (keyboard page 0x07).
//! The kernel input layer wants its own `KEY_*` codes; this is the same
//! translation the kernel's HID driver applies to a physical keyboard.

use crate::keyboard::KeyId;

/// `(usage, KEY_* code)` for every translated usage, ascending by usage.
const USAGE_TO_KEYCODE: &[(KeyId, u16)] = &[
    // Letters a..z
    (0x04, 30),
    (0x05, 48),
    (0x06, 46),
    (0x07, 32),
    (0x08, 18),
    (0x09, 33),
    (0x0A, 34),
    (0x0B, 35),
    (0x0C, 23),
    (0x0D, 36),
    (0x0E, 37),
    (0x0F, 38),
    (0x10, 50),
    (0x11, 49),
    (0x12, 24),
    (0x13, 25),
    (0x14, 16),
    (0x15, 19),
    (0x16, 31),
    (0x17, 20),
    (0x18, 22),
    (0x19, 47),
    (0x1A, 17),
    (0x1B, 45),
    (0x1C, 21),
    (0x1D, 44),
    // Digits 1..9, 0
    (0x1E, 2),
    (0x1F, 3),
    (0x20, 4),
    (0x21, 5),
    (0x22, 6),
    (0x23, 7),
    (0x24, 8),
    (0x25, 9),
    (0x26, 10),
    (0x27, 11),
    // Enter, Escape, Backspace, Tab, Space
    (0x28, 28),
    (0x29, 1),
    (0x2A, 14),
    (0x2B, 15),
    (0x2C, 57),
    // - = [ ] \ non-US # ; ' ` , . /
    (0x2D, 12),
    (0x2E, 13),
    (0x2F, 26),
    (0x30, 27),
    (0x31, 43),
    (0x32, 43),
    (0x33, 39),
    (0x34, 40),
    (0x35, 41),
    (0x36, 51),
    (0x37, 52),
    (0x38, 53),
    (0x39, 58),
    // F1..F12
    (0x3A, 59),
    (0x3B, 60),
    (0x3C, 61),
    (0x3D, 62),
    (0x3E, 63),
    (0x3F, 64),
    (0x40, 65),
    (0x41, 66),
    (0x42, 67),
    (0x43, 68),
    (0x44, 87),
    (0x45, 88),
    // Print screen, scroll lock, pause, navigation block, arrows
    (0x46, 99),
    (0x47, 70),
    (0x48, 119),
    (0x49, 110),
    (0x4A, 102),
    (0x4B, 104),
    (0x4C, 111),
    (0x4D, 107),
    (0x4E, 109),
    (0x4F, 106),
    (0x50, 105),
    (0x51, 108),
    (0x52, 103),
    // Keypad
    (0x53, 69),
    (0x54, 98),
    (0x55, 55),
    (0x56, 74),
    (0x57, 78),
    (0x58, 96),
    (0x59, 79),
    (0x5A, 80),
    (0x5B, 81),
    (0x5C, 75),
    (0x5D, 76),
    (0x5E, 77),
    (0x5F, 71),
    (0x60, 72),
    (0x61, 73),
    (0x62, 82),
    (0x63, 83),
    // Non-US backslash, application
    (0x64, 86),
    (0x65, 127),
    // Modifiers
    (0xE0, 29),
    (0xE1, 42),
    (0xE2, 56),
    (0xE3, 125),
    (0xE4, 97),
    (0xE5, 54),
    (0xE6, 100),
    (0xE7, 126),
];

/// Linux key code for a HID keyboard usage.
pub fn linux_keycode(usage: KeyId) -> Option<u16> {
    USAGE_TO_KEYCODE
        .binary_search_by_key(&usage, |&(u, _)| u)
        .ok()
        .map(|i| USAGE_TO_KEYCODE[i].1)
}

/// Every key code a translated usage can produce.
pub fn mapped_keycodes() -> impl Iterator<Item = u16> {
    USAGE_TO_KEYCODE.iter().map(|&(_, code)| code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_sorted_by_usage() {
        assert!(USAGE_TO_KEYCODE.windows(2).all(|w| w[0].0 < w[1].0));
    }

    #[test]
    fn test_common_keys() {
        // a, z, 1, 0, Enter, Space, left shift
        assert_eq!(linux_keycode(0x04), Some(30));
        assert_eq!(linux_keycode(0x1D), Some(44));
        assert_eq!(linux_keycode(0x1E), Some(2));
        assert_eq!(linux_keycode(0x27), Some(11));
        assert_eq!(linux_keycode(0x28), Some(28));
        assert_eq!(linux_keycode(0x2C), Some(57));
        assert_eq!(linux_keycode(0xE1), Some(42));
    }

    #[test]
    fn test_unmapped_usages() {
        assert_eq!(linux_keycode(0), None);
        assert_eq!(linux_keycode(0x03), None);
        assert_eq!(linux_keycode(0x66), None);
        assert_eq!(linux_keycode(0x1_0004), None);
    }
}
