//! Session modes.

use std::fmt;
use std::str::FromStr;

/// Which units run in this process and where key events go. Fixed for the
/// lifetime of the process.
///
/// | Mode                     | Input          | Detection | Output        |
/// |--------------------------|----------------|-----------|---------------|
/// | `local-full`             | cameras        | yes       | inject/forward|
/// | `remote-receiver`        | key signals    | no        | inject        |
/// | `capture-only-sender`    | cameras        | no        | frame records |
/// | `remote-detect-receiver` | frame records  | yes       | inject        |
/// | `dummy-sender`           | scripted keys  | no        | key signals   |
/// | `dummy-receiver`         | key signals    | no        | log           |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    LocalFull,
    RemoteReceiver,
    CaptureOnlySender,
    RemoteDetectReceiver,
    DummySender,
    DummyReceiver,
}

impl Mode {
    pub const ALL: [Mode; 6] = [
        Mode::LocalFull,
        Mode::RemoteReceiver,
        Mode::CaptureOnlySender,
        Mode::RemoteDetectReceiver,
        Mode::DummySender,
        Mode::DummyReceiver,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Mode::LocalFull => "local-full",
            Mode::RemoteReceiver => "remote-receiver",
            Mode::CaptureOnlySender => "capture-only-sender",
            Mode::RemoteDetectReceiver => "remote-detect-receiver",
            Mode::DummySender => "dummy-sender",
            Mode::DummyReceiver => "dummy-receiver",
        }
    }

    /// Whether this mode reads local cameras.
    pub fn uses_cameras(self) -> bool {
        matches!(self, Mode::LocalFull | Mode::CaptureOnlySender)
    }

    /// Whether this mode runs the finger detectors.
    pub fn uses_detection(self) -> bool {
        matches!(self, Mode::LocalFull | Mode::RemoteDetectReceiver)
    }

    /// Whether this mode presses keys on the local host, given where
    /// `local-full` dispatches.
    pub fn injects_keys(self, dispatch: Dispatch) -> bool {
        match self {
            Mode::LocalFull => dispatch == Dispatch::Inject,
            Mode::RemoteReceiver | Mode::RemoteDetectReceiver => true,
            Mode::CaptureOnlySender | Mode::DummySender | Mode::DummyReceiver => false,
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mode::ALL
            .into_iter()
            .find(|mode| mode.as_str() == s)
            .ok_or_else(|| {
                let known: Vec<&str> = Mode::ALL.iter().map(|m| m.as_str()).collect();
                format!("unknown mode '{}' (expected one of: {})", s, known.join(", "))
            })
    }
}

/// Where `local-full` sends its key events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Dispatch {
    /// Inject through the local key backend.
    #[default]
    Inject,
    /// Send key signals to a remote receiver.
    Forward,
}

impl fmt::Display for Dispatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dispatch::Inject => f.write_str("inject"),
            Dispatch::Forward => f.write_str("forward"),
        }
    }
}

impl FromStr for Dispatch {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "inject" => Ok(Dispatch::Inject),
            "forward" => Ok(Dispatch::Forward),
            other => Err(format!("unknown dispatch '{}' (expected inject or forward)", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_round_trip() {
        for mode in Mode::ALL {
            assert_eq!(mode.to_string().parse::<Mode>(), Ok(mode));
        }
    }

    #[test]
    fn test_unknown_mode_lists_choices() {
        let err = "main".parse::<Mode>().unwrap_err();
        assert!(err.contains("local-full"));
        assert!(err.contains("dummy-receiver"));
    }

    #[test]
    fn test_mode_capabilities() {
        assert!(Mode::LocalFull.uses_cameras());
        assert!(Mode::LocalFull.uses_detection());
        assert!(Mode::CaptureOnlySender.uses_cameras());
        assert!(!Mode::CaptureOnlySender.uses_detection());
        assert!(Mode::RemoteDetectReceiver.uses_detection());
        assert!(!Mode::RemoteDetectReceiver.uses_cameras());
        assert!(!Mode::DummySender.uses_cameras());
    }

    #[test]
    fn test_modes_that_inject() {
        assert!(Mode::LocalFull.injects_keys(Dispatch::Inject));
        assert!(!Mode::LocalFull.injects_keys(Dispatch::Forward));
        assert!(Mode::RemoteReceiver.injects_keys(Dispatch::Forward));
        assert!(Mode::RemoteDetectReceiver.injects_keys(Dispatch::Inject));
        assert!(!Mode::DummyReceiver.injects_keys(Dispatch::Inject));
        assert!(!Mode::CaptureOnlySender.injects_keys(Dispatch::Inject));
    }

    #[test]
    fn test_dispatch_parsing() {
        assert_eq!("forward".parse::<Dispatch>(), Ok(Dispatch::Forward));
        assert_eq!(Dispatch::default(), Dispatch::Inject);
        assert!("both".parse::<Dispatch>().is_err());
    }
}
