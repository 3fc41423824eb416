//! INI value helpers.

use std::fmt::Display;
use std::str::FromStr;

use ini::Ini;

use super::ConfigError;

/// Raw value of `section.key`, trimmed.
pub(crate) fn raw<'a>(ini: &'a Ini, section: &str, key: &str) -> Option<&'a str> {
    ini.section(Some(section))
        .and_then(|props| props.get(key))
        .map(str::trim)
}

fn invalid(section: &str, key: &str, value: &str, reason: impl Display) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.to_string(),
    }
}

/// Parse `section.key`, falling back to `default` when absent.
pub(crate) fn value<T>(ini: &Ini, section: &str, key: &str, default: T) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    match raw(ini, section, key) {
        None => Ok(default),
        Some(s) => s.parse().map_err(|e| invalid(section, key, s, e)),
    }
}

/// Boolean accepting `true/false`, `yes/no`, `on/off` and `1/0`.
pub(crate) fn flag(ini: &Ini, section: &str, key: &str, default: bool) -> Result<bool, ConfigError> {
    match raw(ini, section, key) {
        None => Ok(default),
        Some(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "yes" | "on" | "1" => Ok(true),
            "false" | "no" | "off" | "0" => Ok(false),
            _ => Err(invalid(section, key, s, "expected true or false")),
        },
    }
}

/// Optional string; an empty value means unset.
pub(crate) fn optional(ini: &Ini, section: &str, key: &str, default: Option<String>) -> Option<String> {
    match raw(ini, section, key) {
        None => default,
        Some("") => None,
        Some(s) => Some(s.to_string()),
    }
}

/// Comma-separated list of exactly `N` numbers.
pub(crate) fn numbers<const N: usize>(
    ini: &Ini,
    section: &str,
    key: &str,
    default: [f64; N],
) -> Result<[f64; N], ConfigError> {
    let Some(s) = raw(ini, section, key) else {
        return Ok(default);
    };
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    if parts.len() != N {
        return Err(invalid(section, key, s, format!("expected {} comma-separated numbers", N)));
    }
    let mut out = [0.0; N];
    for (slot, part) in out.iter_mut().zip(parts) {
        *slot = part.parse().map_err(|e| invalid(section, key, s, e))?;
    }
    Ok(out)
}

/// Comma-separated list of any length.
pub(crate) fn list<T>(ini: &Ini, section: &str, key: &str, default: Vec<T>) -> Result<Vec<T>, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    let Some(s) = raw(ini, section, key) else {
        return Ok(default);
    };
    s.split(',')
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| part.parse().map_err(|e| invalid(section, key, s, e)))
        .collect()
}

/// Format numbers as a comma-separated list.
pub(crate) fn join<T: Display>(values: &[T]) -> String {
    values
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
