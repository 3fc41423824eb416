//! Key-region storage.
//!
//! The keyboard layout is a list of rectangles in the keyboard plane, each
//! with a maximum stroke depth. Layouts are kept in a JSON key-map file:
//!
//! ```json
//! {
//!   "regions": [
//!     { "id": 4, "x": 0.0, "y": 0.0, "w": 18.0, "h": 18.0, "s": 30.0 }
//!   ]
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

/// Identifier of a key, as understood by the key-injection backend.
pub type KeyId = u32;

/// A key rectangle plus its actuation depth.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct KeyRegion {
    pub id: KeyId,
    pub x: f64,
    pub y: f64,
    pub w: f64,
    pub h: f64,
    /// Maximum stroke depth; a fingertip actuates the key while its stroke is
    /// at most this value.
    pub s: f64,
}

impl KeyRegion {
    /// Inclusive rectangle and stroke test.
    pub fn contains(&self, x: f64, y: f64, stroke: f64) -> bool {
        self.x <= x && x <= self.x + self.w && self.y <= y && y <= self.y + self.h && self.s >= stroke
    }

    pub fn right_edge(&self) -> f64 {
        self.x + self.w
    }
}

/// Errors loading or validating a key map.
#[derive(Debug, Error)]
pub enum KeyMapError {
    #[error("failed to read key map {}: {}", .path.display(), .source)]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse key map {}: {}", .path.display(), .source)]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("key region {id} is invalid: {reason}")]
    InvalidRegion { id: KeyId, reason: &'static str },
}

/// Read-only spatial query service over key regions.
pub trait KeyRegionStore: Send {
    /// Ids of every region containing `(x, y)` whose stroke depth is at
    /// least `stroke`.
    fn query(&self, x: f64, y: f64, stroke: f64) -> Vec<KeyId>;

    /// Largest `x + w` over all regions, or `None` when empty.
    fn max_right_edge(&self) -> Option<f64>;
}

impl<S: KeyRegionStore + ?Sized> KeyRegionStore for Box<S> {
    fn query(&self, x: f64, y: f64, stroke: f64) -> Vec<KeyId> {
        (**self).query(x, y, stroke)
    }

    fn max_right_edge(&self) -> Option<f64> {
        (**self).max_right_edge()
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct KeyMapFile {
    regions: Vec<KeyRegion>,
}

/// In-memory key-region store.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct KeyMap {
    regions: Vec<KeyRegion>,
}

impl KeyMap {
    /// Build a key map, rejecting regions with negative or non-finite
    /// extents.
    pub fn from_regions(regions: Vec<KeyRegion>) -> Result<Self, KeyMapError> {
        for region in &regions {
            let values = [region.x, region.y, region.w, region.h, region.s];
            if values.iter().any(|v| !v.is_finite()) {
                return Err(KeyMapError::InvalidRegion {
                    id: region.id,
                    reason: "non-finite value",
                });
            }
            if region.w < 0.0 || region.h < 0.0 {
                return Err(KeyMapError::InvalidRegion {
                    id: region.id,
                    reason: "negative width or height",
                });
            }
        }
        Ok(Self { regions })
    }

    /// Load a JSON key map.
    pub fn load(path: &Path) -> Result<Self, KeyMapError> {
        let content = fs::read_to_string(path).map_err(|source| KeyMapError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let file: KeyMapFile =
            serde_json::from_str(&content).map_err(|source| KeyMapError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        let map = Self::from_regions(file.regions)?;
        info!(path = %path.display(), regions = map.len(), "Key map loaded");
        Ok(map)
    }

    /// Write the key map as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), KeyMapError> {
        let file = KeyMapFile {
            regions: self.regions.clone(),
        };
        let content = serde_json::to_string_pretty(&file).map_err(|source| KeyMapError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        fs::write(path, content).map_err(|source| KeyMapError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn regions(&self) -> &[KeyRegion] {
        &self.regions
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }
}

impl KeyRegionStore for KeyMap {
    fn query(&self, x: f64, y: f64, stroke: f64) -> Vec<KeyId> {
        self.regions
            .iter()
            .filter(|r| r.contains(x, y, stroke))
            .map(|r| r.id)
            .collect()
    }

    fn max_right_edge(&self) -> Option<f64> {
        self.regions.iter().map(KeyRegion::right_edge).reduce(f64::max)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn region(id: KeyId, x: f64, y: f64, s: f64) -> KeyRegion {
        KeyRegion {
            id,
            x,
            y,
            w: 10.0,
            h: 10.0,
            s,
        }
    }

    #[test]
    fn test_query_edges_are_inclusive() {
        let map = KeyMap::from_regions(vec![region(1, 0.0, 0.0, 50.0)]).unwrap();
        assert_eq!(map.query(0.0, 0.0, 0.0), vec![1]);
        assert_eq!(map.query(10.0, 10.0, 50.0), vec![1]);
        assert!(map.query(10.01, 5.0, 0.0).is_empty());
        assert!(map.query(5.0, -0.01, 0.0).is_empty());
    }

    #[test]
    fn test_query_respects_stroke_depth() {
        let map = KeyMap::from_regions(vec![region(1, 0.0, 0.0, 30.0)]).unwrap();
        assert_eq!(map.query(5.0, 5.0, 29.9), vec![1]);
        assert!(map.query(5.0, 5.0, 30.1).is_empty());
    }

    #[test]
    fn test_query_returns_overlapping_regions() {
        let map = KeyMap::from_regions(vec![
            region(1, 0.0, 0.0, 30.0),
            region(2, 5.0, 5.0, 30.0),
            region(3, 40.0, 0.0, 30.0),
        ])
        .unwrap();
        let mut hits = map.query(7.0, 7.0, 0.0);
        hits.sort_unstable();
        assert_eq!(hits, vec![1, 2]);
    }

    #[test]
    fn test_max_right_edge() {
        let map = KeyMap::from_regions(vec![region(1, 0.0, 0.0, 1.0), region(2, 90.0, 0.0, 1.0)])
            .unwrap();
        assert_eq!(map.max_right_edge(), Some(100.0));
        assert_eq!(KeyMap::default().max_right_edge(), None);
    }

    #[test]
    fn test_invalid_region_rejected() {
        let bad = KeyRegion {
            w: -1.0,
            ..region(7, 0.0, 0.0, 1.0)
        };
        let err = KeyMap::from_regions(vec![bad]).unwrap_err();
        assert!(matches!(err, KeyMapError::InvalidRegion { id: 7, .. }));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keymap.json");
        let map = KeyMap::from_regions(vec![region(4, 0.0, 0.0, 30.0), region(5, 20.0, 0.0, 25.0)])
            .unwrap();

        map.save(&path).unwrap();
        let loaded = KeyMap::load(&path).unwrap();
        assert_eq!(loaded, map);
    }

    #[test]
    fn test_load_missing_file() {
        let dir = TempDir::new().unwrap();
        let err = KeyMap::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, KeyMapError::Io { .. }));
    }

    #[test]
    fn test_load_malformed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("keymap.json");
        std::fs::write(&path, "{ \"regions\": [ { \"id\": 1 } ] }").unwrap();
        let err = KeyMap::load(&path).unwrap_err();
        assert!(matches!(err, KeyMapError::Parse { .. }));
        assert!(err.to_string().contains("keymap.json"));
    }
}
