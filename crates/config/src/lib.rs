//! Configuration loading for Gymfreek applications
//!
//! Provides utilities for loading and saving configuration files from the
//! shared Gymfreek config directory (~/.config/gymfreek/).
//!
//! Call [`init`] at application startup to bootstrap the config directory.
//! Records that must never be observed half-written after a crash (session
//! tokens, sync markers) should go through [`save_json_atomic`].

use anyhow::{Context, Result};
use serde::de::DeserializeOwned;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Initialize the Gymfreek config directory.
///
/// Creates ~/.config/gymfreek/ if it doesn't exist.
/// Call this once at application startup.
pub fn init() -> Result<PathBuf> {
    ensure_config_dir()
}

/// Get the Gymfreek config directory (~/.config/gymfreek/)
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("gymfreek"))
}

/// Get the path to a config file within the Gymfreek config directory
pub fn config_path(filename: &str) -> Option<PathBuf> {
    config_dir().map(|p| p.join(filename))
}

/// Load and parse a JSON config file from the Gymfreek config directory
pub fn load_json<T: DeserializeOwned>(filename: &str) -> Result<T> {
    let path = config_path(filename).context("Could not determine config directory")?;
    load_json_file(&path)
}

/// Load and parse a JSON file from an arbitrary path
pub fn load_json_file<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Check if a config file exists in the Gymfreek config directory
pub fn config_exists(filename: &str) -> bool {
    config_path(filename).is_some_and(|p| p.exists())
}

/// Ensure the Gymfreek config directory exists
pub fn ensure_config_dir() -> Result<PathBuf> {
    let dir = config_dir().context("Could not determine config directory")?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create config directory: {}", dir.display()))?;
    Ok(dir)
}

/// Save a value as JSON to a config file in the Gymfreek config directory
pub fn save_json<T: serde::Serialize>(filename: &str, value: &T) -> Result<()> {
    let dir = ensure_config_dir()?;
    let path = dir.join(filename);
    let content = serde_json::to_string_pretty(value)?;
    std::fs::write(&path, content)
        .with_context(|| format!("Failed to write config file: {}", path.display()))?;
    Ok(())
}

/// Save a value as JSON to a config file, atomically.
///
/// See [`write_json_atomic`] for the durability guarantee.
pub fn save_json_atomic<T: serde::Serialize>(filename: &str, value: &T) -> Result<()> {
    let dir = ensure_config_dir()?;
    write_json_atomic(&dir.join(filename), value)
}

/// Write a value as JSON to an arbitrary path, atomically.
///
/// The content is written to a temporary file in the same directory, flushed
/// to disk, and renamed over the destination. A reader (or a restart after a
/// crash) observes either the old record or the new one, never a partial
/// write.
pub fn write_json_atomic<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let content = serde_json::to_string_pretty(value)?;

    // The temp file must live in the destination directory: rename is only
    // atomic within a single filesystem.
    let mut tmp_name = path
        .file_name()
        .context("Atomic write target has no file name")?
        .to_os_string();
    tmp_name.push(".tmp");
    let tmp_path = path.with_file_name(tmp_name);

    let mut file = std::fs::File::create(&tmp_path)
        .with_context(|| format!("Failed to create temp file: {}", tmp_path.display()))?;
    file.write_all(content.as_bytes())
        .with_context(|| format!("Failed to write temp file: {}", tmp_path.display()))?;
    file.sync_all()
        .with_context(|| format!("Failed to flush temp file: {}", tmp_path.display()))?;
    drop(file);

    std::fs::rename(&tmp_path, path)
        .with_context(|| format!("Failed to replace config file: {}", path.display()))?;
    Ok(())
}
