//! Virtual keyboard: maps triangulated fingertips to pressed keys.
//!
//! Lookups are moved into the keyboard plane by a fixed horizontal
//! offset, `x_shift = -max(x + w) / 2`, computed once from the key map.
//! Each tick the pressed set is rebuilt from empty: [`VirtualKeyboard::reset`]
//! then one [`VirtualKeyboard::add_test`] per fingertip.

mod store;

pub use store::{KeyId, KeyMap, KeyMapError, KeyRegion, KeyRegionStore};

use std::collections::HashSet;

use tracing::{debug, warn};

/// Keys actuated during one tick. A key appears at most once however many
/// fingertips hit it.
pub type PressingKeys = HashSet<KeyId>;

/// Per-tick key actuation state over a key-region store.
#[derive(Debug)]
pub struct VirtualKeyboard<S> {
    store: S,
    x_shift: f64,
    pressing: PressingKeys,
}

impl<S: KeyRegionStore> VirtualKeyboard<S> {
    pub fn new(store: S) -> Self {
        let x_shift = match store.max_right_edge() {
            Some(right) => -right / 2.0,
            None => {
                warn!("Key map has no regions; no key can be pressed");
                0.0
            }
        };
        debug!(x_shift, "Virtual keyboard ready");
        Self {
            store,
            x_shift,
            pressing: PressingKeys::new(),
        }
    }

    /// Horizontal offset applied to every lookup.
    pub fn x_shift(&self) -> f64 {
        self.x_shift
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Clear the pressed set at the start of a tick.
    pub fn reset(&mut self) {
        self.pressing.clear();
    }

    /// Look up one fingertip at `(x + x_shift, y)` with the given stroke.
    /// Returns the ids hit by this lookup.
    pub fn add_test(&mut self, x: f64, y: f64, stroke: f64) -> Vec<KeyId> {
        let hits = self.store.query(x + self.x_shift, y, stroke);
        self.pressing.extend(hits.iter().copied());
        hits
    }

    /// Keys pressed so far this tick.
    pub fn pressing_keys(&self) -> &PressingKeys {
        &self.pressing
    }
}
