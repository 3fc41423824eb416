//! Session configuration.
//!
//! Settings come from three layers, later layers winning:
//!
//! ```text
//!   built-in defaults  <  INI config file  <  command-line flags
//! ```
//!
//! The file is plain INI, one section per concern. Missing keys keep their
//! defaults, so a file only needs the values that differ:
//!
//! ```ini
//! [session]
//! mode = local-full
//! fps = 30
//!
//! [capture]
//! top_source = /data/frames/top
//! front_source = /data/frames/front
//!
//! [detector.front]
//! h_min = 356.33
//! h_max = 390
//! ```
//!
//! [`ConfigFile::validate`] must pass before the control loop is built.

mod error;
mod keys;
mod parse;

pub use error::ConfigError;
pub use keys::ConfigKey;

use std::fs;
use std::path::{Path, PathBuf};

use ini::Ini;

use crate::control::{Dispatch, Mode};
use crate::detector::DetectorParams;
use crate::frame::CameraId;
use crate::geometry::{CameraGeometry, RealPosition, SpaceConverter};
use crate::keyboard::KeyId;

/// Default target frame rate.
pub const DEFAULT_FPS: u32 = 30;

/// Default UDP port for both record types.
pub const DEFAULT_PORT: u16 = 30000;

/// Default JPEG quality for frame records.
pub const DEFAULT_JPEG_QUALITY: u8 = 60;

/// Default receive timeout; long enough to cover a few frame periods.
pub const DEFAULT_RECEIVE_TIMEOUT_MS: u64 = 200;

/// Default maximum horizontal distance, in pixels, between paired top and
/// front circles.
pub const DEFAULT_CIRCLE_X_DISTANCE_THRESHOLD: f32 = 6.0;

/// Default key map file.
pub const DEFAULT_KEYMAP_FILE: &str = "keymap.json";

/// Session-wide settings.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSettings {
    pub mode: Mode,
    pub fps: u32,
    pub circle_x_distance_threshold: f32,
    /// Emit a down event for every pressed key on every tick.
    pub send_repeat_key_down: bool,
    /// Inject received repeated downs instead of dropping them.
    pub receive_repeat_key_down: bool,
    pub dispatch: Dispatch,
    /// Keys cycled by `dummy-sender`.
    pub dummy_keys: Vec<KeyId>,
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            mode: Mode::LocalFull,
            fps: DEFAULT_FPS,
            circle_x_distance_threshold: DEFAULT_CIRCLE_X_DISTANCE_THRESHOLD,
            send_repeat_key_down: false,
            receive_repeat_key_down: false,
            dispatch: Dispatch::Inject,
            // USB HID usages for a, b, c.
            dummy_keys: vec![4, 5, 6],
        }
    }
}

/// Camera sources and frame size.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureSettings {
    /// Directory, file or glob pattern with top camera frames.
    pub top_source: Option<String>,
    /// Directory, file or glob pattern with front camera frames.
    pub front_source: Option<String>,
    pub width: u32,
    pub height: u32,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            top_source: None,
            front_source: None,
            width: 640,
            height: 480,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct KeyboardSettings {
    pub keymap: PathBuf,
}

impl Default for KeyboardSettings {
    fn default() -> Self {
        Self {
            keymap: PathBuf::from(DEFAULT_KEYMAP_FILE),
        }
    }
}

/// UDP endpoints.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkSettings {
    /// Remote host for senders.
    pub address: String,
    pub port: u16,
    /// Local address receivers bind to.
    pub bind_address: String,
    pub jpeg_quality: u8,
    pub receive_timeout_ms: u64,
}

impl Default for NetworkSettings {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: DEFAULT_PORT,
            bind_address: "0.0.0.0".to_string(),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            receive_timeout_ms: DEFAULT_RECEIVE_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    /// Directory for the log file; stderr only when unset.
    pub directory: Option<PathBuf>,
    pub level: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            directory: None,
            level: "info".to_string(),
        }
    }
}

/// Periodic dumps of annotated frames and masks.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DiagnosticsSettings {
    pub dump_dir: Option<PathBuf>,
    /// Dump every N-th tick; 0 disables dumping.
    pub dump_every: u32,
}

/// Complete configuration for one session.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigFile {
    pub session: SessionSettings,
    pub capture: CaptureSettings,
    pub detector_top: DetectorParams,
    pub detector_front: DetectorParams,
    /// Camera placement. The image size is taken from `capture`.
    pub geometry: CameraGeometry,
    pub keyboard: KeyboardSettings,
    pub network: NetworkSettings,
    pub logging: LoggingSettings,
    pub diagnostics: DiagnosticsSettings,
}

impl Default for ConfigFile {
    fn default() -> Self {
        Self {
            session: SessionSettings::default(),
            capture: CaptureSettings::default(),
            detector_top: DetectorParams::top_default(),
            detector_front: DetectorParams::front_default(),
            geometry: CameraGeometry::default(),
            keyboard: KeyboardSettings::default(),
            network: NetworkSettings::default(),
            logging: LoggingSettings::default(),
            diagnostics: DiagnosticsSettings::default(),
        }
    }
}

/// Default config file location: `<config dir>/stereokeys/config.ini`.
pub fn config_file_path() -> PathBuf {
    dirs::config_dir()
        .map(|dir| dir.join("stereokeys").join("config.ini"))
        .unwrap_or_else(|| PathBuf::from("stereokeys.ini"))
}

fn detector_section(camera: CameraId) -> &'static str {
    match camera {
        CameraId::Top => "detector.top",
        CameraId::Front => "detector.front",
    }
}

fn position(values: [f64; 3]) -> RealPosition {
    RealPosition::new(values[0], values[1], values[2])
}

fn optional_path(value: &Option<PathBuf>) -> String {
    value
        .as_ref()
        .map(|p| p.display().to_string())
        .unwrap_or_default()
}

impl ConfigFile {
    /// Load a config file over the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    /// Load `path` if it exists, otherwise return the defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load_from(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse INI text over the defaults.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Self::from_ini(&Ini::load_from_str(text)?)
    }

    /// Write the full configuration, creating parent directories.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        let write_error = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(write_error)?;
            }
        }
        self.to_ini().write_to_file(path).map_err(write_error)
    }

    /// Full configuration as INI text.
    pub fn to_ini_string(&self) -> Result<String, ConfigError> {
        let mut buf = Vec::new();
        self.to_ini().write_to(&mut buf).map_err(ConfigError::Serialize)?;
        Ok(String::from_utf8_lossy(&buf).into_owned())
    }

    /// Geometry with the image size of the capture settings.
    pub fn camera_geometry(&self) -> CameraGeometry {
        CameraGeometry {
            image_size: (self.capture.width, self.capture.height),
            ..self.geometry.clone()
        }
    }

    pub fn detector(&self, camera: CameraId) -> &DetectorParams {
        match camera {
            CameraId::Top => &self.detector_top,
            CameraId::Front => &self.detector_front,
        }
    }

    /// Check that the configuration can drive a session.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        let s = &self.session;

        if s.fps == 0 || s.fps > 1000 {
            return invalid(format!("fps must be between 1 and 1000, got {}", s.fps));
        }
        if !s.circle_x_distance_threshold.is_finite() || s.circle_x_distance_threshold < 0.0 {
            return invalid(format!(
                "circle_x_distance_threshold must be a non-negative number, got {}",
                s.circle_x_distance_threshold
            ));
        }
        if self.capture.width == 0 || self.capture.height == 0 {
            return invalid(format!(
                "frame size must be non-zero, got {}x{}",
                self.capture.width, self.capture.height
            ));
        }
        if s.mode.uses_cameras()
            && (self.capture.top_source.is_none() || self.capture.front_source.is_none())
        {
            return invalid(format!(
                "mode {} needs capture.top_source and capture.front_source",
                s.mode
            ));
        }
        if s.mode == Mode::DummySender && s.dummy_keys.is_empty() {
            return invalid("mode dummy-sender needs at least one session.dummy_keys entry".to_string());
        }
        if !(1..=100).contains(&self.network.jpeg_quality) {
            return invalid(format!(
                "jpeg_quality must be between 1 and 100, got {}",
                self.network.jpeg_quality
            ));
        }
        if self.network.receive_timeout_ms == 0 {
            return invalid("receive_timeout_ms must be positive".to_string());
        }
        for camera in [CameraId::Top, CameraId::Front] {
            self.detector(camera)
                .check(self.capture.width, self.capture.height)
                .map_err(|e| ConfigError::InvalidValue {
                    section: detector_section(camera).to_string(),
                    key: e.key.to_string(),
                    value: e.value,
                    reason: e.reason,
                })?;
        }
        if s.mode.uses_detection() {
            SpaceConverter::new(&self.camera_geometry())
                .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        }
        Ok(())
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let d = Self::default();

        let session = SessionSettings {
            mode: parse::value(ini, "session", "mode", d.session.mode)?,
            fps: parse::value(ini, "session", "fps", d.session.fps)?,
            circle_x_distance_threshold: parse::value(
                ini,
                "session",
                "circle_x_distance_threshold",
                d.session.circle_x_distance_threshold,
            )?,
            send_repeat_key_down: parse::flag(
                ini,
                "session",
                "send_repeat_key_down",
                d.session.send_repeat_key_down,
            )?,
            receive_repeat_key_down: parse::flag(
                ini,
                "session",
                "receive_repeat_key_down",
                d.session.receive_repeat_key_down,
            )?,
            dispatch: parse::value(ini, "session", "dispatch", d.session.dispatch)?,
            dummy_keys: parse::list(ini, "session", "dummy_keys", d.session.dummy_keys)?,
        };

        let capture = CaptureSettings {
            top_source: parse::optional(ini, "capture", "top_source", d.capture.top_source),
            front_source: parse::optional(ini, "capture", "front_source", d.capture.front_source),
            width: parse::value(ini, "capture", "width", d.capture.width)?,
            height: parse::value(ini, "capture", "height", d.capture.height)?,
        };

        let g = &d.geometry;
        let top_position = [g.top_position.x, g.top_position.y, g.top_position.z];
        let front_position = [g.front_position.x, g.front_position.y, g.front_position.z];
        let sensor = [g.sensor_size.0, g.sensor_size.1];
        let sensor = parse::numbers(ini, "geometry", "camera_sensor_size", sensor)?;
        let geometry = CameraGeometry {
            top_position: position(parse::numbers(ini, "geometry", "top_camera_position", top_position)?),
            front_position: position(parse::numbers(
                ini,
                "geometry",
                "front_camera_position",
                front_position,
            )?),
            top_angle_x_deg: parse::value(ini, "geometry", "top_camera_angle_x", g.top_angle_x_deg)?,
            fov_diagonal_deg: parse::value(ini, "geometry", "camera_fov_diagonal", g.fov_diagonal_deg)?,
            sensor_size: (sensor[0], sensor[1]),
            image_size: (capture.width, capture.height),
        };

        let keyboard = KeyboardSettings {
            keymap: parse::value(ini, "keyboard", "keymap", d.keyboard.keymap)?,
        };

        let network = NetworkSettings {
            address: parse::value(ini, "network", "address", d.network.address)?,
            port: parse::value(ini, "network", "port", d.network.port)?,
            bind_address: parse::value(ini, "network", "bind_address", d.network.bind_address)?,
            jpeg_quality: parse::value(ini, "network", "jpeg_quality", d.network.jpeg_quality)?,
            receive_timeout_ms: parse::value(
                ini,
                "network",
                "receive_timeout_ms",
                d.network.receive_timeout_ms,
            )?,
        };

        let logging = LoggingSettings {
            directory: parse::optional(ini, "logging", "directory", None).map(PathBuf::from),
            level: parse::value(ini, "logging", "level", d.logging.level)?,
        };

        let diagnostics = DiagnosticsSettings {
            dump_dir: parse::optional(ini, "diagnostics", "dump_dir", None).map(PathBuf::from),
            dump_every: parse::value(ini, "diagnostics", "dump_every", d.diagnostics.dump_every)?,
        };

        Ok(Self {
            session,
            capture,
            detector_top: detector_from_ini(ini, CameraId::Top)?,
            detector_front: detector_from_ini(ini, CameraId::Front)?,
            geometry,
            keyboard,
            network,
            logging,
            diagnostics,
        })
    }

    fn to_ini(&self) -> Ini {
        let mut ini = Ini::new();
        let s = &self.session;
        ini.with_section(Some("session"))
            .set("mode", s.mode.to_string())
            .set("fps", s.fps.to_string())
            .set("circle_x_distance_threshold", s.circle_x_distance_threshold.to_string())
            .set("send_repeat_key_down", s.send_repeat_key_down.to_string())
            .set("receive_repeat_key_down", s.receive_repeat_key_down.to_string())
            .set("dispatch", s.dispatch.to_string())
            .set("dummy_keys", parse::join(&s.dummy_keys));

        let c = &self.capture;
        ini.with_section(Some("capture"))
            .set("top_source", c.top_source.clone().unwrap_or_default())
            .set("front_source", c.front_source.clone().unwrap_or_default())
            .set("width", c.width.to_string())
            .set("height", c.height.to_string());

        for camera in [CameraId::Top, CameraId::Front] {
            detector_to_ini(&mut ini, camera, self.detector(camera));
        }

        let g = &self.geometry;
        ini.with_section(Some("geometry"))
            .set(
                "top_camera_position",
                parse::join(&[g.top_position.x, g.top_position.y, g.top_position.z]),
            )
            .set(
                "front_camera_position",
                parse::join(&[g.front_position.x, g.front_position.y, g.front_position.z]),
            )
            .set("top_camera_angle_x", g.top_angle_x_deg.to_string())
            .set("camera_fov_diagonal", g.fov_diagonal_deg.to_string())
            .set("camera_sensor_size", parse::join(&[g.sensor_size.0, g.sensor_size.1]));

        ini.with_section(Some("keyboard"))
            .set("keymap", self.keyboard.keymap.display().to_string());

        let n = &self.network;
        ini.with_section(Some("network"))
            .set("address", n.address.clone())
            .set("port", n.port.to_string())
            .set("bind_address", n.bind_address.clone())
            .set("jpeg_quality", n.jpeg_quality.to_string())
            .set("receive_timeout_ms", n.receive_timeout_ms.to_string());

        ini.with_section(Some("logging"))
            .set("directory", optional_path(&self.logging.directory))
            .set("level", self.logging.level.clone());

        ini.with_section(Some("diagnostics"))
            .set("dump_dir", optional_path(&self.diagnostics.dump_dir))
            .set("dump_every", self.diagnostics.dump_every.to_string());

        ini
    }
}

fn detector_from_ini(ini: &Ini, camera: CameraId) -> Result<DetectorParams, ConfigError> {
    let section = detector_section(camera);
    let d = DetectorParams::default_for(camera);
    let mut p = d.clone();

    p.bilateral.diameter = parse::value(ini, section, "bilateral_d", d.bilateral.diameter)?;
    p.bilateral.sigma_color = parse::value(ini, section, "bilateral_sigma_color", d.bilateral.sigma_color)?;
    p.bilateral.sigma_space = parse::value(ini, section, "bilateral_sigma_space", d.bilateral.sigma_space)?;
    p.pre_morphology_iterations = parse::value(ini, section, "pre_morphology", d.pre_morphology_iterations)?;
    p.hsv.h_min = parse::value(ini, section, "h_min", d.hsv.h_min)?;
    p.hsv.h_max = parse::value(ini, section, "h_max", d.hsv.h_max)?;
    p.hsv.s_min = parse::value(ini, section, "s_min", d.hsv.s_min)?;
    p.hsv.s_max = parse::value(ini, section, "s_max", d.hsv.s_max)?;
    p.hsv.v_min = parse::value(ini, section, "v_min", d.hsv.v_min)?;
    p.hsv.v_max = parse::value(ini, section, "v_max", d.hsv.v_max)?;
    p.nail_morphology_iterations = parse::value(ini, section, "nail_morphology", d.nail_morphology_iterations)?;
    p.median_ksize = parse::value(ini, section, "median_ksize", d.median_ksize)?;
    p.hough.dp = parse::value(ini, section, "dp", d.hough.dp)?;
    p.hough.min_dist = parse::value(ini, section, "min_dist", d.hough.min_dist)?;
    p.hough.param1 = parse::value(ini, section, "param1", d.hough.param1)?;
    p.hough.param2 = parse::value(ini, section, "param2", d.hough.param2)?;
    p.hough.min_radius = parse::value(ini, section, "min_radius", d.hough.min_radius)?;
    p.hough.max_radius = parse::value(ini, section, "max_radius", d.hough.max_radius)?;
    Ok(p)
}

fn detector_to_ini(ini: &mut Ini, camera: CameraId, p: &DetectorParams) {
    ini.with_section(Some(detector_section(camera)))
        .set("bilateral_d", p.bilateral.diameter.to_string())
        .set("bilateral_sigma_color", p.bilateral.sigma_color.to_string())
        .set("bilateral_sigma_space", p.bilateral.sigma_space.to_string())
        .set("pre_morphology", p.pre_morphology_iterations.to_string())
        .set("h_min", p.hsv.h_min.to_string())
        .set("h_max", p.hsv.h_max.to_string())
        .set("s_min", p.hsv.s_min.to_string())
        .set("s_max", p.hsv.s_max.to_string())
        .set("v_min", p.hsv.v_min.to_string())
        .set("v_max", p.hsv.v_max.to_string())
        .set("nail_morphology", p.nail_morphology_iterations.to_string())
        .set("median_ksize", p.median_ksize.to_string())
        .set("dp", p.hough.dp.to_string())
        .set("min_dist", p.hough.min_dist.to_string())
        .set("param1", p.hough.param1.to_string())
        .set("param2", p.hough.param2.to_string())
        .set("min_radius", p.hough.min_radius.to_string())
        .set("max_radius", p.hough.max_radius.to_string());
}
