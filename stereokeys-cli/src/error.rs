//! CLI error type.

use std::fmt;
use std::path::PathBuf;

use stereokeys::config::ConfigError;
use stereokeys::control::StartupError;
use stereokeys::diagnostics::DumpError;
use stereokeys::geometry::GeometryError;
use stereokeys::keyboard::KeyMapError;
use stereokeys::logging::LoggingError;

/// Errors surfaced to the user by CLI commands.
#[derive(Debug)]
pub enum CliError {
    /// Bad arguments or settings, with a message for the user.
    Config(String),
    ConfigFile(ConfigError),
    Startup(StartupError),
    Logging(LoggingError),
    KeyMap(KeyMapError),
    Geometry(GeometryError),
    Dump(DumpError),
    Image {
        path: PathBuf,
        source: image::ImageError,
    },
    #[cfg(target_os = "linux")]
    Uinput(stereokeys::injector::UinputError),
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "{}", msg),
            CliError::ConfigFile(e) => write!(f, "{}", e),
            CliError::Startup(e) => write!(f, "Startup failed: {}", e),
            CliError::Logging(e) => write!(f, "Logging setup failed: {}", e),
            CliError::KeyMap(e) => write!(f, "{}", e),
            CliError::Geometry(e) => write!(f, "{}", e),
            CliError::Dump(e) => write!(f, "{}", e),
            CliError::Image { path, source } => {
                write!(f, "Failed to read image {}: {}", path.display(), source)
            }
            #[cfg(target_os = "linux")]
            CliError::Uinput(e) => write!(
                f,
                "{} (is /dev/uinput writable? use --dry-run to log keys instead)",
                e
            ),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Config(_) => None,
            CliError::ConfigFile(e) => Some(e),
            CliError::Startup(e) => Some(e),
            CliError::Logging(e) => Some(e),
            CliError::KeyMap(e) => Some(e),
            CliError::Geometry(e) => Some(e),
            CliError::Dump(e) => Some(e),
            CliError::Image { source, .. } => Some(source),
            #[cfg(target_os = "linux")]
            CliError::Uinput(e) => Some(e),
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::ConfigFile(e)
    }
}

#[cfg(target_os = "linux")]
impl From<stereokeys::injector::UinputError> for CliError {
    fn from(e: stereokeys::injector::UinputError) -> Self {
        CliError::Uinput(e)
    }
}

impl From<StartupError> for CliError {
    fn from(e: StartupError) -> Self {
        CliError::Startup(e)
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<KeyMapError> for CliError {
    fn from(e: KeyMapError) -> Self {
        CliError::KeyMap(e)
    }
}

impl From<GeometryError> for CliError {
    fn from(e: GeometryError) -> Self {
        CliError::Geometry(e)
    }
}

impl From<DumpError> for CliError {
    fn from(e: DumpError) -> Self {
        CliError::Dump(e)
    }
}
