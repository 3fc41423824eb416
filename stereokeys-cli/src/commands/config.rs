//! Configuration management CLI commands.
//!
//! Provides `config init`, `config get`, `config set`, `config list`, and
//! `config path` for viewing and modifying settings from the command line.

use std::path::Path;

use clap::Subcommand;
use stereokeys::config::{ConfigFile, ConfigKey};

use super::common::load_config;
use crate::error::CliError;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Write a config file with every setting at its default
    Init {
        /// Overwrite an existing config file
        #[arg(long)]
        force: bool,
    },

    /// Get a configuration value
    Get {
        /// Configuration key in format section.key (e.g., session.fps)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key in format section.key (e.g., session.fps)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration settings
    List,

    /// Show the configuration file path
    Path,
}

/// Run a config subcommand against the config file at `path`.
pub fn run(command: ConfigCommands, path: &Path) -> Result<(), CliError> {
    match command {
        ConfigCommands::Init { force } => run_init(path, force),
        ConfigCommands::Get { key } => run_get(path, &key),
        ConfigCommands::Set { key, value } => run_set(path, &key, &value),
        ConfigCommands::List => run_list(path),
        ConfigCommands::Path => run_path(path),
    }
}

fn parse_key(key: &str) -> Result<ConfigKey, CliError> {
    key.parse().map_err(|_| {
        CliError::Config(format!(
            "Unknown configuration key '{}'. Use 'stereokeys config list' to see available keys.",
            key
        ))
    })
}

/// Write the default configuration.
fn run_init(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "Config file {} already exists. Use --force to overwrite it.",
            path.display()
        )));
    }
    ConfigFile::default().save_to(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

/// Get a configuration value.
fn run_get(path: &Path, key: &str) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let config = load_config(path)?;
    let value = config.get(&config_key);

    if value.is_empty() {
        println!("(not set)");
    } else {
        println!("{}", value);
    }

    Ok(())
}

/// Set a configuration value.
fn run_set(path: &Path, key: &str, value: &str) -> Result<(), CliError> {
    let config_key = parse_key(key)?;
    let mut config = load_config(path)?;
    config.set(&config_key, value)?;
    config.save_to(path)?;

    println!("Set {} = {}", config_key, value);

    Ok(())
}

/// List all configuration settings.
fn run_list(path: &Path) -> Result<(), CliError> {
    let config = load_config(path)?;

    println!("Configuration Settings");
    println!("======================");
    println!();

    let mut current_section = String::new();

    for key in ConfigKey::all() {
        // Print section header when section changes
        if key.section() != current_section {
            if !current_section.is_empty() {
                println!();
            }
            println!("[{}]", key.section());
            current_section = key.section().to_string();
        }

        let value = config.get(&key);
        if value.is_empty() {
            println!("  {} = (not set)", key.name());
        } else {
            println!("  {} = {}", key.name(), value);
        }
    }

    Ok(())
}

/// Show the configuration file path.
fn run_path(path: &Path) -> Result<(), CliError> {
    println!("{}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_refuses_to_overwrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");

        run_init(&path, false).unwrap();
        assert!(path.exists());
        assert!(matches!(run_init(&path, false), Err(CliError::Config(_))));
        run_init(&path, true).unwrap();
    }

    #[test]
    fn test_set_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");

        run_set(&path, "session.fps", "15").unwrap();
        let config = ConfigFile::load_from(&path).unwrap();
        assert_eq!(config.session.fps, 15);
    }

    #[test]
    fn test_set_rejects_bad_value_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.ini");

        assert!(run_set(&path, "session.fps", "fast").is_err());
        assert!(!path.exists());
    }

    #[test]
    fn test_unknown_key() {
        assert!(matches!(parse_key("session.colour"), Err(CliError::Config(_))));
    }
}
