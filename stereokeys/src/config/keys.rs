//! Dotted config keys for `config get` / `config set`.
//!
//! A key is `<section>.<name>`, where the section may itself contain dots
//! (`detector.top.median_ksize`). Values are read and written through the
//! INI representation, so `set` applies exactly the parsing rules a config
//! file would.

use std::fmt;
use std::str::FromStr;

use ini::Ini;

use super::{parse, ConfigError, ConfigFile};

/// A known configuration key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigKey {
    section: String,
    name: String,
}

impl ConfigKey {
    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Every key, in file order.
    pub fn all() -> Vec<ConfigKey> {
        ConfigFile::default()
            .to_ini()
            .iter()
            .filter_map(|(section, props)| section.map(|s| (s.to_string(), props)))
            .flat_map(|(section, props)| {
                props
                    .iter()
                    .map(|(name, _)| ConfigKey {
                        section: section.clone(),
                        name: name.to_string(),
                    })
                    .collect::<Vec<_>>()
            })
            .collect()
    }
}

impl fmt::Display for ConfigKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.section, self.name)
    }
}

impl FromStr for ConfigKey {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (section, name) = s
            .rsplit_once('.')
            .ok_or_else(|| ConfigError::UnknownKey(s.to_string()))?;
        let key = ConfigKey {
            section: section.to_string(),
            name: name.to_string(),
        };
        if ConfigKey::all().contains(&key) {
            Ok(key)
        } else {
            Err(ConfigError::UnknownKey(s.to_string()))
        }
    }
}

impl ConfigFile {
    /// Current value of `key` as written in a config file.
    pub fn get(&self, key: &ConfigKey) -> String {
        let ini = self.to_ini();
        parse::raw(&ini, &key.section, &key.name)
            .unwrap_or_default()
            .to_string()
    }

    /// Set `key` from its textual form.
    pub fn set(&mut self, key: &ConfigKey, value: &str) -> Result<(), ConfigError> {
        let mut ini: Ini = self.to_ini();
        ini.with_section(Some(key.section.as_str()))
            .set(key.name.as_str(), value);
        *self = ConfigFile::from_ini(&ini)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::control::Mode;

    #[test]
    fn test_parse_known_key() {
        let key: ConfigKey = "session.fps".parse().unwrap();
        assert_eq!(key.section(), "session");
        assert_eq!(key.name(), "fps");
        assert_eq!(key.to_string(), "session.fps");
    }

    #[test]
    fn test_parse_dotted_section() {
        let key: ConfigKey = "detector.front.median_ksize".parse().unwrap();
        assert_eq!(key.section(), "detector.front");
    }

    #[test]
    fn test_unknown_key_rejected() {
        assert!("session.colour".parse::<ConfigKey>().is_err());
        assert!("fps".parse::<ConfigKey>().is_err());
    }

    #[test]
    fn test_all_keys_cover_every_section() {
        let keys = ConfigKey::all();
        for section in [
            "session",
            "capture",
            "detector.top",
            "detector.front",
            "geometry",
            "keyboard",
            "network",
            "logging",
            "diagnostics",
        ] {
            assert!(keys.iter().any(|k| k.section() == section), "missing {}", section);
        }
    }

    #[test]
    fn test_get_and_set() {
        let mut config = ConfigFile::default();
        let key: ConfigKey = "session.mode".parse().unwrap();
        assert_eq!(config.get(&key), "local-full");

        config.set(&key, "remote-receiver").unwrap();
        assert_eq!(config.session.mode, Mode::RemoteReceiver);
    }

    #[test]
    fn test_set_rejects_invalid_value() {
        let mut config = ConfigFile::default();
        let key: ConfigKey = "network.port".parse().unwrap();
        assert!(config.set(&key, "seventy").is_err());
        assert_eq!(config.network.port, 30000);
    }
}
