//! Stereokeys CLI - Command-line interface
//!
//! Runs keyboard sessions and offers the tools needed to set one up:
//! configuration editing, key map inspection, single-image detection and
//! single-point triangulation.

mod commands;
mod error;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use stereokeys::logging::{init_logging, LoggingConfig};

use commands::common::{load_config, resolve_config_path, CameraArg};
use commands::config::ConfigCommands;
use commands::convert::ConvertArgs;
use commands::detect::DetectArgs;
use commands::keymap::KeymapCommands;
use commands::run::RunArgs;
use error::CliError;

#[derive(Parser)]
#[command(name = "stereokeys")]
#[command(version = stereokeys::VERSION)]
#[command(about = "Touch-free virtual keyboard driven by two cameras", long_about = None)]
struct Cli {
    /// Config file (defaults to the per-user config location)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log at debug level
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a keyboard session
    Run(RunArgs),

    /// View or modify configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },

    /// Inspect and query the key map
    Keymap {
        #[command(subcommand)]
        command: KeymapCommands,
    },

    /// Triangulate a fingertip from its top and front pixel coordinates
    Convert {
        /// Top camera x pixel
        top_x: f64,
        /// Top camera y pixel
        top_y: f64,
        /// Front camera x pixel
        front_x: f64,
        /// Front camera y pixel
        front_y: f64,
        /// Project the result back into both cameras
        #[arg(long)]
        check: bool,
    },

    /// Run the finger detector on one image
    Detect {
        /// Image to analyse
        image: PathBuf,
        /// Camera whose detector settings to use
        #[arg(long, value_enum, default_value = "front")]
        camera: CameraArg,
        /// Write the detector mask here
        #[arg(long)]
        mask: Option<PathBuf>,
        /// Write the image with detected circles drawn here
        #[arg(long)]
        annotate: Option<PathBuf>,
    },
}

fn main() {
    if let Err(e) = run() {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}

fn run() -> Result<(), CliError> {
    let cli = Cli::parse();
    let config_path = resolve_config_path(cli.config.as_deref());

    // `run` sets up logging from its own configuration.
    let _log_guard = match &cli.command {
        Commands::Run(_) => None,
        _ => {
            let level = if cli.verbose { "debug" } else { "warn" };
            Some(init_logging(&LoggingConfig::default().with_level(level))?)
        }
    };

    match cli.command {
        Commands::Run(args) => commands::run::run(args, &config_path, cli.verbose),
        Commands::Config { command } => commands::config::run(command, &config_path),
        Commands::Keymap { command } => {
            let config = load_config(&config_path)?;
            commands::keymap::run(command, &config.keyboard.keymap)
        }
        Commands::Convert {
            top_x,
            top_y,
            front_x,
            front_y,
            check,
        } => {
            let config = load_config(&config_path)?;
            let args = ConvertArgs {
                top: (top_x, top_y),
                front: (front_x, front_y),
                check,
            };
            commands::convert::run(args, &config)
        }
        Commands::Detect {
            image,
            camera,
            mask,
            annotate,
        } => {
            let config = load_config(&config_path)?;
            let args = DetectArgs {
                image,
                camera: camera.into(),
                mask,
                annotate,
            };
            commands::detect::run(args, &config)
        }
    }
}
