//! Configuration management.
//!
//! Two settings are required to talk to the server: its base URL and an API
//! key. Each is resolved in priority order:
//!
//! 1. Command-line flag (`--url`, `--api-key`)
//! 2. Environment variable (`QSYNC_URL`, `QSYNC_API_KEY`), via clap's `env`
//! 3. `~/.qsync/config.json` (`{"url": "...", "api_key": "..."}`)
//!
//! The mirror directory defaults to `./queries` and never comes from the
//! config file, so one config can serve many checkouts.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default mirror directory, relative to the working directory.
pub const DEFAULT_MIRROR_DIR: &str = "queries";

/// Contents of `~/.qsync/config.json`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
}

/// Fully resolved settings for a sync run.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Server base URL without trailing slash.
    pub base_url: String,
    /// API key sent in the `Authorization` header.
    pub api_key: String,
    /// Root of the local mirror.
    pub mirror_dir: PathBuf,
}

/// Get the global qsync directory location (`~/.qsync`).
#[must_use]
pub fn global_qsync_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".qsync"))
}

/// Get the config file path.
#[must_use]
pub fn config_path() -> Option<PathBuf> {
    global_qsync_dir().map(|dir| dir.join("config.json"))
}

/// Load a config file. A missing file yields the empty config.
///
/// # Errors
///
/// Returns an error if the file exists but cannot be read or parsed.
pub fn load_config(path: &Path) -> Result<FileConfig> {
    if !path.exists() {
        return Ok(FileConfig::default());
    }

    let content = fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Failed to read {}: {e}", path.display())))?;

    serde_json::from_str(&content)
        .map_err(|e| Error::Config(format!("Failed to parse {}: {e}", path.display())))
}

/// Resolve the mirror directory from an explicit value or the default.
#[must_use]
pub fn resolve_mirror_dir(explicit: Option<&Path>) -> PathBuf {
    explicit.map_or_else(|| PathBuf::from(DEFAULT_MIRROR_DIR), Path::to_path_buf)
}

/// Resolve settings from explicit values, falling back to the config file.
///
/// # Errors
///
/// Returns [`Error::Config`] if the URL or API key is missing, or the URL is
/// not an http(s) URL.
pub fn resolve_settings(
    url: Option<&str>,
    api_key: Option<&str>,
    mirror_dir: Option<&Path>,
) -> Result<Settings> {
    let file = match (non_empty(url), non_empty(api_key)) {
        (Some(_), Some(_)) => FileConfig::default(),
        _ => match config_path() {
            Some(path) => load_config(&path)?,
            None => FileConfig::default(),
        },
    };

    settings_from(url, api_key, mirror_dir, &file)
}

/// Combine explicit values with a loaded config file.
///
/// # Errors
///
/// Same as [`resolve_settings`].
pub fn settings_from(
    url: Option<&str>,
    api_key: Option<&str>,
    mirror_dir: Option<&Path>,
    file: &FileConfig,
) -> Result<Settings> {
    let base_url = non_empty(url)
        .or_else(|| non_empty(file.url.as_deref()))
        .ok_or_else(|| Error::Config("Missing server URL".to_string()))?;

    if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
        return Err(Error::Config(format!(
            "Server URL must start with http:// or https://, got '{base_url}'"
        )));
    }

    let api_key = non_empty(api_key)
        .or_else(|| non_empty(file.api_key.as_deref()))
        .ok_or_else(|| Error::Config("Missing API key".to_string()))?;

    Ok(Settings {
        base_url: base_url.trim_end_matches('/').to_string(),
        api_key: api_key.to_string(),
        mirror_dir: resolve_mirror_dir(mirror_dir),
    })
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}
