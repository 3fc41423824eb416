//! Live detector tuning.
//!
//! A tuning collaborator (a GUI, a config-file watcher) writes new detector
//! parameters into a [`TuningState`]. The control loop polls it between
//! ticks and applies a whole snapshot at once, so a detection never runs
//! with a mix of old and new parameters.
//!
//! ```text
//!   tuner ──update_*──► SharedTuning (revision++) ──snapshot_since──► loop
//!                                                      (between ticks)
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use crate::config::ConfigFile;
use crate::detector::DetectorParams;
use crate::frame::CameraId;

/// Minimum time between config file checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Detector parameters for both cameras, versioned by revision.
#[derive(Debug, Clone, PartialEq)]
pub struct TuningState {
    pub top: DetectorParams,
    pub front: DetectorParams,
    revision: u64,
}

/// Tuning state shared between a tuner and the control loop.
pub type SharedTuning = Arc<Mutex<TuningState>>;

impl TuningState {
    pub fn new(top: DetectorParams, front: DetectorParams) -> Self {
        Self {
            top,
            front,
            revision: 0,
        }
    }

    /// Wrap in a [`SharedTuning`].
    pub fn shared(self) -> SharedTuning {
        Arc::new(Mutex::new(self))
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    pub fn update_top(&mut self, params: DetectorParams) {
        if self.top != params {
            self.top = params;
            self.revision += 1;
        }
    }

    pub fn update_front(&mut self, params: DetectorParams) {
        if self.front != params {
            self.front = params;
            self.revision += 1;
        }
    }

    /// Copy of the state if it changed after `revision`.
    pub fn snapshot_since(&self, revision: u64) -> Option<TuningState> {
        (self.revision != revision).then(|| self.clone())
    }
}

/// Tuner that reloads detector sections when the config file changes.
#[derive(Debug)]
pub struct ConfigFileTuner {
    path: PathBuf,
    tuning: SharedTuning,
    interval: Duration,
    last_check: Option<Instant>,
    last_modified: Option<SystemTime>,
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

impl ConfigFileTuner {
    pub fn new(path: impl Into<PathBuf>, tuning: SharedTuning) -> Self {
        let path = path.into();
        let last_modified = modified(&path);
        Self {
            path,
            tuning,
            interval: DEFAULT_POLL_INTERVAL,
            last_check: None,
            last_modified,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reload the file if its modification time moved. Returns whether
    /// new parameters were pushed.
    ///
    /// An unreadable or invalid file keeps the current parameters.
    pub fn poll(&mut self) -> bool {
        let now = Instant::now();
        if let Some(last) = self.last_check {
            if now.duration_since(last) < self.interval {
                return false;
            }
        }
        self.last_check = Some(now);

        let current = modified(&self.path);
        if current.is_none() || current == self.last_modified {
            return false;
        }
        self.last_modified = current;

        let config = match ConfigFile::load_from(&self.path) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "Ignoring tuning reload");
                return false;
            }
        };
        let (width, height) = (config.capture.width, config.capture.height);
        for camera in [CameraId::Top, CameraId::Front] {
            if let Err(e) = config.detector(camera).check(width, height) {
                warn!(path = %self.path.display(), camera = %camera, error = %e, "Ignoring tuning reload");
                return false;
            }
        }

        let mut state = self.tuning.lock();
        let before = state.revision();
        state.update_top(config.detector_top);
        state.update_front(config.detector_front);
        let changed = state.revision() != before;
        if changed {
            info!(path = %self.path.display(), revision = state.revision(), "Detector tuning reloaded");
        } else {
            debug!(path = %self.path.display(), "Config changed without detector updates");
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use tempfile::TempDir;

    fn bump_mtime(path: &Path) {
        let later = SystemTime::now() + Duration::from_secs(5);
        filetime::set_file_mtime(path, FileTime::from_system_time(later)).unwrap();
    }

    fn state() -> TuningState {
        TuningState::new(DetectorParams::top_default(), DetectorParams::front_default())
    }

    #[test]
    fn test_snapshot_only_after_change() {
        let mut tuning = state();
        assert!(tuning.snapshot_since(0).is_none());

        let mut params = DetectorParams::top_default();
        params.median_ksize = 7;
        tuning.update_top(params.clone());

        let snapshot = tuning.snapshot_since(0).unwrap();
        assert_eq!(snapshot.top, params);
        assert!(tuning.snapshot_since(snapshot.revision()).is_none());
    }

    #[test]
    fn test_identical_update_keeps_revision() {
        let mut tuning = state();
        tuning.update_front(DetectorParams::front_default());
        assert_eq!(tuning.revision(), 0);
    }

    #[test]
    fn test_shared_state_visible_across_handles() {
        let shared = state().shared();
        let handle = Arc::clone(&shared);
        let mut params = DetectorParams::front_default();
        params.pre_morphology_iterations = 2;
        handle.lock().update_front(params);
        assert_eq!(shared.lock().revision(), 1);
    }

    #[test]
    fn test_file_tuner_reloads_changed_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        ConfigFile::default().save_to(&path).unwrap();

        let shared = state().shared();
        let mut tuner = ConfigFileTuner::new(&path, Arc::clone(&shared)).with_interval(Duration::ZERO);
        assert!(!tuner.poll());

        let mut config = ConfigFile::default();
        config.detector_top.median_ksize = 9;
        config.save_to(&path).unwrap();
        // Force a distinct modification time on coarse filesystems.
        bump_mtime(&path);

        assert!(tuner.poll());
        assert_eq!(shared.lock().top.median_ksize, 9);
    }

    #[test]
    fn test_file_tuner_ignores_invalid_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        std::fs::write(&path, "[session]\nfps = fast\n").unwrap();

        let shared = state().shared();
        let mut tuner = ConfigFileTuner::new(&path, Arc::clone(&shared)).with_interval(Duration::ZERO);
        bump_mtime(&path);

        assert!(!tuner.poll());
        assert_eq!(shared.lock().revision(), 0);
    }

    #[test]
    fn test_file_tuner_rejects_unbounded_detector_values() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.ini");
        ConfigFile::default().save_to(&path).unwrap();

        let shared = state().shared();
        let mut tuner = ConfigFileTuner::new(&path, Arc::clone(&shared)).with_interval(Duration::ZERO);

        let mut config = ConfigFile::default();
        config.detector_front.bilateral.diameter = i32::MAX;
        config.save_to(&path).unwrap();
        bump_mtime(&path);

        assert!(!tuner.poll());
        assert_eq!(shared.lock().revision(), 0);
        assert_eq!(shared.lock().front, DetectorParams::front_default());
    }
}
