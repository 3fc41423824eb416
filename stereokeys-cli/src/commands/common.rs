//! Common types and utilities shared across CLI commands.

use std::path::{Path, PathBuf};

use clap::ValueEnum;
use stereokeys::config::{config_file_path, ConfigFile};
use stereokeys::control::{Dispatch, Mode};
use stereokeys::frame::CameraId;

use crate::error::CliError;

/// Session mode selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum ModeArg {
    /// Cameras, detection and key output on this host
    LocalFull,
    /// Inject key signals received from a remote host
    RemoteReceiver,
    /// Stream camera frames to a remote host
    CaptureOnlySender,
    /// Detect fingertips in frames received from a remote host
    RemoteDetectReceiver,
    /// Send scripted key signals (transport test)
    DummySender,
    /// Log received key signals (transport test)
    DummyReceiver,
}

impl From<ModeArg> for Mode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::LocalFull => Mode::LocalFull,
            ModeArg::RemoteReceiver => Mode::RemoteReceiver,
            ModeArg::CaptureOnlySender => Mode::CaptureOnlySender,
            ModeArg::RemoteDetectReceiver => Mode::RemoteDetectReceiver,
            ModeArg::DummySender => Mode::DummySender,
            ModeArg::DummyReceiver => Mode::DummyReceiver,
        }
    }
}

/// Key event destination for `local-full`.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum DispatchArg {
    /// Inject keys on this host
    Inject,
    /// Forward key signals to a remote receiver
    Forward,
}

impl From<DispatchArg> for Dispatch {
    fn from(dispatch: DispatchArg) -> Self {
        match dispatch {
            DispatchArg::Inject => Dispatch::Inject,
            DispatchArg::Forward => Dispatch::Forward,
        }
    }
}

/// Camera selection for CLI arguments.
#[derive(Debug, Clone, Copy, ValueEnum, PartialEq)]
pub enum CameraArg {
    Top,
    Front,
}

impl From<CameraArg> for CameraId {
    fn from(camera: CameraArg) -> Self {
        match camera {
            CameraArg::Top => CameraId::Top,
            CameraArg::Front => CameraId::Front,
        }
    }
}

/// Config file to use: the `--config` path, else the default location.
pub fn resolve_config_path(cli_path: Option<&Path>) -> PathBuf {
    cli_path.map(Path::to_path_buf).unwrap_or_else(config_file_path)
}

/// Load the config file, falling back to defaults when it does not exist.
pub fn load_config(path: &Path) -> Result<ConfigFile, CliError> {
    Ok(ConfigFile::load_or_default(path)?)
}
