//! CLI subcommands.

pub mod common;
pub mod config;
pub mod convert;
pub mod detect;
pub mod keymap;
pub mod run;
