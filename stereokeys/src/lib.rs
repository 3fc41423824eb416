//! Stereokeys - a touch-free virtual keyboard driven by two cameras.
//!
//! A top-down and a frontal camera watch a fingertip. Every tick the
//! fingertip is located in both frames, triangulated into a 3D point, and
//! tested against a map of key regions; changes in the set of pressed keys
//! become key-down and key-up events.
//!
//! ```text
//!   top frame ──► FingerDetector ─┐
//!                                 ├─► pair by x ─► SpaceConverter ─► VirtualKeyboard
//!   front frame ─► FingerDetector ┘                                      │
//!                                                                        ▼
//!                     KeyInjector / key signals ◄── EdgeDetector ◄── pressed keys
//! ```
//!
//! The [`control`] module runs this per tick in one of six modes, some of
//! which split the pipeline across two hosts over UDP ([`transport`]).

pub mod capture;
pub mod config;
pub mod control;
pub mod detector;
pub mod diagnostics;
pub mod event;
pub mod frame;
pub mod geometry;
pub mod injector;
pub mod keyboard;
pub mod logging;
pub mod telemetry;
pub mod transport;
pub mod tuning;

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
