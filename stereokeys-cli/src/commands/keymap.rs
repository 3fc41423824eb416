//! Keymap commands - inspect the key map and query it by hand.

use std::path::{Path, PathBuf};

use clap::Subcommand;
use stereokeys::keyboard::{KeyMap, KeyRegionStore, VirtualKeyboard};

use crate::error::CliError;

/// Keymap subcommands.
#[derive(Debug, Subcommand)]
pub enum KeymapCommands {
    /// List the key regions and the horizontal shift applied to lookups
    Show {
        /// Key map file (defaults to keyboard.keymap from the config)
        #[arg(long)]
        keymap: Option<PathBuf>,
    },

    /// Report which keys a fingertip at the given position would press
    Query {
        /// Horizontal position in mm, before the shift
        #[arg(allow_hyphen_values = true)]
        x: f64,

        /// Depth position in mm
        #[arg(allow_hyphen_values = true)]
        y: f64,

        /// Stroke (height above the key plane) in mm
        #[arg(allow_hyphen_values = true)]
        stroke: f64,

        /// Key map file (defaults to keyboard.keymap from the config)
        #[arg(long)]
        keymap: Option<PathBuf>,
    },
}

/// Run a keymap subcommand. `default_keymap` comes from the config file.
pub fn run(command: KeymapCommands, default_keymap: &Path) -> Result<(), CliError> {
    match command {
        KeymapCommands::Show { keymap } => run_show(keymap.as_deref().unwrap_or(default_keymap)),
        KeymapCommands::Query {
            x,
            y,
            stroke,
            keymap,
        } => run_query(keymap.as_deref().unwrap_or(default_keymap), x, y, stroke),
    }
}

fn run_show(path: &Path) -> Result<(), CliError> {
    let keymap = KeyMap::load(path)?;

    println!("Key Map: {}", path.display());
    println!("================");
    println!();
    println!("  Regions: {}", keymap.len());
    if let Some(right) = keymap.max_right_edge() {
        println!("  Right edge: {:.1} mm (x shift {:.1} mm)", right, -right / 2.0);
    }
    println!();
    println!("  {:>6}  {:>8}  {:>8}  {:>8}  {:>8}  {:>8}", "id", "x", "y", "w", "h", "s");
    for region in keymap.regions() {
        println!(
            "  {:>6}  {:>8.1}  {:>8.1}  {:>8.1}  {:>8.1}  {:>8.1}",
            region.id, region.x, region.y, region.w, region.h, region.s
        );
    }

    Ok(())
}

fn run_query(path: &Path, x: f64, y: f64, stroke: f64) -> Result<(), CliError> {
    let mut keyboard = VirtualKeyboard::new(KeyMap::load(path)?);
    let mut hits = keyboard.add_test(x, y, stroke);
    hits.sort_unstable();

    println!(
        "Query at ({:.1}, {:.1}) stroke {:.1} -> shifted x {:.1}",
        x,
        y,
        stroke,
        x + keyboard.x_shift()
    );
    if hits.is_empty() {
        println!("  No key pressed");
    } else {
        let ids: Vec<String> = hits.iter().map(|id| id.to_string()).collect();
        println!("  Pressed: {}", ids.join(", "));
    }

    Ok(())
}
