//! Command implementations for the potion CLI
//!
//! Each command reads its inputs from disk and delegates to the `potion`
//! library.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use potion::Settings;
use tracing::debug;

pub mod render;
pub mod templates;
pub mod tokens;

/// Engine settings from an optional TOML file. Missing keys keep their
/// defaults.
pub fn load_settings(config: Option<&Path>) -> Result<Settings> {
    let Some(path) = config else {
        return Ok(Settings::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read settings file {}", path.display()))?;
    let settings: Settings = toml::from_str(&text)
        .with_context(|| format!("Invalid settings file {}", path.display()))?;
    debug!(path = %path.display(), "loaded settings");
    Ok(settings)
}

pub fn read_file(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))
}
