//! CLI commands

pub mod config;
pub mod presets;
pub mod simulate;
