//! Configuration error types.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// Errors loading, editing or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {}: {}", .path.display(), .source)]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] ini::ParseError),

    #[error("failed to write config file {}: {}", .path.display(), .source)]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to serialize config: {0}")]
    Serialize(#[source] io::Error),

    #[error("invalid value '{value}' for {section}.{key}: {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },

    #[error("unknown config key '{0}'")]
    UnknownKey(String),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_value_display() {
        let err = ConfigError::InvalidValue {
            section: "session".to_string(),
            key: "fps".to_string(),
            value: "fast".to_string(),
            reason: "invalid digit found in string".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "invalid value 'fast' for session.fps: invalid digit found in string"
        );
    }

    #[test]
    fn test_unknown_key_display() {
        let err = ConfigError::UnknownKey("session.colour".to_string());
        assert!(err.to_string().contains("session.colour"));
    }
}
