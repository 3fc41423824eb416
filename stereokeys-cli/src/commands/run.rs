//! Run command - start a keyboard session in the configured mode.

use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Args;
use stereokeys::config::ConfigFile;
use stereokeys::control::{ControlLoop, Dispatch, Mode, StopSignal};
use stereokeys::injector::{KeyBackend, LogBackend};
use stereokeys::logging::{init_logging, LoggingConfig};
use stereokeys::telemetry::LoopSnapshot;
use tracing::info;

use super::common::{load_config, DispatchArg, ModeArg};
use crate::error::CliError;

/// How often progress is printed while a session runs.
const PROGRESS_INTERVAL: Duration = Duration::from_secs(30);

/// Arguments for the run command. Each one overrides its config setting.
#[derive(Debug, Default, Args)]
pub struct RunArgs {
    /// Session mode
    #[arg(long, value_enum)]
    pub mode: Option<ModeArg>,

    /// Ticks per second
    #[arg(long)]
    pub fps: Option<u32>,

    /// Top camera frames: directory, file, or glob pattern
    #[arg(long)]
    pub top: Option<String>,

    /// Front camera frames: directory, file, or glob pattern
    #[arg(long)]
    pub front: Option<String>,

    /// Expected frame width in pixels
    #[arg(long)]
    pub width: Option<u32>,

    /// Expected frame height in pixels
    #[arg(long)]
    pub height: Option<u32>,

    /// Key map file
    #[arg(long)]
    pub keymap: Option<PathBuf>,

    /// Remote host for sending modes
    #[arg(long)]
    pub address: Option<String>,

    /// UDP port shared by sender and receiver
    #[arg(long)]
    pub port: Option<u16>,

    /// Local address receiving modes bind to
    #[arg(long)]
    pub bind: Option<String>,

    /// Where local-full sends key events
    #[arg(long, value_enum)]
    pub dispatch: Option<DispatchArg>,

    /// Emit a key down for every pressed key on every tick
    #[arg(long)]
    pub repeat_down: bool,

    /// Inject repeated key downs received from the network
    #[arg(long)]
    pub accept_repeat_down: bool,

    /// Largest x distance in pixels for pairing top and front fingertips
    #[arg(long)]
    pub threshold: Option<f32>,

    /// Directory for annotated frame dumps
    #[arg(long)]
    pub dump_dir: Option<PathBuf>,

    /// Dump every N-th tick (defaults to 1 when --dump-dir is given)
    #[arg(long)]
    pub dump_every: Option<u32>,

    /// Reload detector settings when the config file changes
    #[arg(long)]
    pub watch_config: bool,

    /// Log key events instead of pressing keys through uinput
    #[arg(long)]
    pub dry_run: bool,
}

/// Fold command-line overrides into the loaded configuration.
pub fn apply_overrides(config: &mut ConfigFile, args: &RunArgs) {
    if let Some(mode) = args.mode {
        config.session.mode = mode.into();
    }
    if let Some(fps) = args.fps {
        config.session.fps = fps;
    }
    if let Some(dispatch) = args.dispatch {
        config.session.dispatch = dispatch.into();
    }
    if let Some(threshold) = args.threshold {
        config.session.circle_x_distance_threshold = threshold;
    }
    if args.repeat_down {
        config.session.send_repeat_key_down = true;
    }
    if args.accept_repeat_down {
        config.session.receive_repeat_key_down = true;
    }

    if let Some(top) = &args.top {
        config.capture.top_source = Some(top.clone());
    }
    if let Some(front) = &args.front {
        config.capture.front_source = Some(front.clone());
    }
    if let Some(width) = args.width {
        config.capture.width = width;
    }
    if let Some(height) = args.height {
        config.capture.height = height;
    }

    if let Some(keymap) = &args.keymap {
        config.keyboard.keymap = keymap.clone();
    }

    if let Some(address) = &args.address {
        config.network.address = address.clone();
    }
    if let Some(port) = args.port {
        config.network.port = port;
    }
    if let Some(bind) = &args.bind {
        config.network.bind_address = bind.clone();
    }

    if let Some(dir) = &args.dump_dir {
        config.diagnostics.dump_dir = Some(dir.clone());
        if config.diagnostics.dump_every == 0 {
            config.diagnostics.dump_every = 1;
        }
    }
    if let Some(every) = args.dump_every {
        config.diagnostics.dump_every = every;
    }
}

/// Key backend for the session: a uinput keyboard when the mode presses
/// keys here, otherwise (or with `--dry-run`) a logging backend.
pub fn key_backend(config: &ConfigFile, dry_run: bool) -> Result<Box<dyn KeyBackend>, CliError> {
    let session = &config.session;
    if dry_run || !session.mode.injects_keys(session.dispatch) {
        return Ok(Box::new(LogBackend));
    }
    uinput_backend()
}

#[cfg(target_os = "linux")]
fn uinput_backend() -> Result<Box<dyn KeyBackend>, CliError> {
    Ok(Box::new(stereokeys::injector::UinputBackend::create()?))
}

#[cfg(not(target_os = "linux"))]
fn uinput_backend() -> Result<Box<dyn KeyBackend>, CliError> {
    Err(CliError::Config(
        "Key injection needs Linux uinput; use --dry-run to log key events instead.".to_string(),
    ))
}

/// Run the run command.
pub fn run(args: RunArgs, config_path: &Path, verbose: bool) -> Result<(), CliError> {
    let mut config = load_config(config_path)?;
    apply_overrides(&mut config, &args);

    let mut logging = LoggingConfig::from(&config.logging);
    if verbose {
        logging = logging.with_level("debug");
    }
    let _log_guard = init_logging(&logging)?;
    info!(version = stereokeys::VERSION, config = %config_path.display(), "Starting session");

    print_banner(&config, &logging, args.dry_run);

    let backend = key_backend(&config, args.dry_run)?;
    let mut control = ControlLoop::initialize(&config, backend)?;
    if args.watch_config {
        if config.session.mode.uses_detection() {
            println!("Watching {} for detector changes", config_path.display());
        }
        control = control.with_config_tuner(config_path);
    }

    // Set up signal handler for graceful shutdown
    let stop = control.stop_signal();
    let handler_stop = stop.clone();
    ctrlc::set_handler(move || {
        println!();
        println!("Received shutdown signal, releasing keys...");
        handler_stop.stop();
    })
    .map_err(|e| CliError::Config(format!("Failed to set signal handler: {}", e)))?;
    spawn_quit_listener(stop.clone());
    spawn_progress_reporter(&control, stop);

    println!("Press Ctrl+C or type q then Enter to stop");
    println!();

    let snapshot = control.run();
    print_summary(&snapshot);
    Ok(())
}

fn print_banner(config: &ConfigFile, logging: &LoggingConfig, dry_run: bool) {
    let session = &config.session;
    let net = &config.network;

    println!("Stereokeys v{}", stereokeys::VERSION);
    println!("==============");
    println!();
    println!("Mode:    {}", session.mode);
    println!("Rate:    {} fps", session.fps);
    if session.mode.uses_cameras() {
        println!(
            "Top:     {}",
            config.capture.top_source.as_deref().unwrap_or("(not set)")
        );
        println!(
            "Front:   {}",
            config.capture.front_source.as_deref().unwrap_or("(not set)")
        );
        println!("Frames:  {}x{}", config.capture.width, config.capture.height);
    }
    if session.mode.uses_detection() {
        println!("Keymap:  {}", config.keyboard.keymap.display());
    }
    if session.mode.injects_keys(session.dispatch) {
        let keys = if dry_run { "logged (dry run)" } else { "uinput" };
        println!("Keys:    {}", keys);
    }
    match session.mode {
        Mode::LocalFull if session.dispatch == Dispatch::Forward => {
            println!("Forward: {}:{}", net.address, net.port);
        }
        Mode::CaptureOnlySender | Mode::DummySender => {
            println!("Remote:  {}:{}", net.address, net.port);
        }
        Mode::RemoteReceiver | Mode::RemoteDetectReceiver | Mode::DummyReceiver => {
            println!("Listen:  {}:{}", net.bind_address, net.port);
        }
        _ => {}
    }
    if let Some(file) = logging.log_file() {
        println!("Log:     {}", file.display());
    }
    println!();
}

/// Stop the session when `q` is entered on stdin. End of input is ignored
/// so that sessions started without a terminal keep running.
fn spawn_quit_listener(stop: StopSignal) {
    std::thread::spawn(move || {
        let stdin = std::io::stdin();
        for line in stdin.lock().lines() {
            match line {
                Ok(line) if line.trim().eq_ignore_ascii_case("q") => {
                    println!("Stopping...");
                    stop.stop();
                    break;
                }
                Ok(_) => {}
                Err(_) => break,
            }
        }
    });
}

fn spawn_progress_reporter(control: &ControlLoop, stop: StopSignal) {
    let metrics = control.metrics();
    std::thread::spawn(move || {
        let mut waited = Duration::ZERO;
        let step = Duration::from_millis(100);
        while !stop.is_stopped() {
            std::thread::sleep(step);
            waited += step;
            if waited >= PROGRESS_INTERVAL {
                let snapshot = metrics.snapshot();
                if snapshot.ticks > 0 {
                    println!("{}", snapshot);
                }
                waited = Duration::ZERO;
            }
        }
    });
}

fn print_summary(snapshot: &LoopSnapshot) {
    println!();
    println!("Session Summary");
    println!("───────────────");
    println!(
        "  Ticks:     {} ({:.1}/s, {:.0}% overran, {} skipped)",
        snapshot.ticks,
        snapshot.ticks_per_second(),
        snapshot.overrun_rate() * 100.0,
        snapshot.skipped_ticks
    );
    println!("  Fingers:   {} matched", snapshot.fingers_matched);
    println!("  Keys:      {} down, {} up", snapshot.key_downs, snapshot.key_ups);
    if snapshot.frames_sent > 0 || snapshot.frames_dropped > 0 {
        println!(
            "  Frames:    {} sent, {} dropped",
            snapshot.frames_sent, snapshot.frames_dropped
        );
    }
    if snapshot.signals_received > 0 {
        println!("  Signals:   {} received", snapshot.signals_received);
    }
    println!("  Uptime:    {}", snapshot.uptime_human());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_overrides_keeps_config() {
        let mut config = ConfigFile::default();
        apply_overrides(&mut config, &RunArgs::default());
        assert_eq!(config, ConfigFile::default());
    }

    #[test]
    fn test_overrides_replace_settings() {
        let mut config = ConfigFile::default();
        let args = RunArgs {
            mode: Some(ModeArg::RemoteReceiver),
            fps: Some(60),
            port: Some(40000),
            bind: Some("127.0.0.1".to_string()),
            dispatch: Some(DispatchArg::Forward),
            accept_repeat_down: true,
            top: Some("frames/top".to_string()),
            width: Some(320),
            ..RunArgs::default()
        };
        apply_overrides(&mut config, &args);

        assert_eq!(config.session.mode, Mode::RemoteReceiver);
        assert_eq!(config.session.fps, 60);
        assert_eq!(config.session.dispatch, Dispatch::Forward);
        assert!(config.session.receive_repeat_key_down);
        assert!(!config.session.send_repeat_key_down);
        assert_eq!(config.network.port, 40000);
        assert_eq!(config.network.bind_address, "127.0.0.1");
        assert_eq!(config.capture.top_source.as_deref(), Some("frames/top"));
        assert_eq!(config.capture.width, 320);
        assert_eq!(config.capture.height, 480);
    }

    #[test]
    fn test_dry_run_and_non_injecting_modes_log_keys() {
        let mut config = ConfigFile::default();
        assert!(key_backend(&config, true).is_ok());

        config.session.mode = Mode::DummyReceiver;
        assert!(key_backend(&config, false).is_ok());

        config.session.mode = Mode::LocalFull;
        config.session.dispatch = Dispatch::Forward;
        assert!(key_backend(&config, false).is_ok());
    }

    #[test]
    fn test_dump_dir_enables_dumping() {
        let mut config = ConfigFile::default();
        let args = RunArgs {
            dump_dir: Some(PathBuf::from("/tmp/dumps")),
            ..RunArgs::default()
        };
        apply_overrides(&mut config, &args);
        assert_eq!(config.diagnostics.dump_every, 1);

        let args = RunArgs {
            dump_dir: Some(PathBuf::from("/tmp/dumps")),
            dump_every: Some(10),
            ..RunArgs::default()
        };
        apply_overrides(&mut config, &args);
        assert_eq!(config.diagnostics.dump_every, 10);
    }
}
