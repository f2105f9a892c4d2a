//! Command-line interface for sketch-gate.
//!
//! Provides commands for chatting about drawings, enhancing sketches and
//! listing the available enhancement styles.

mod commands;

pub use commands::{parse_cli, run, run_with_cli, Cli, Commands};
