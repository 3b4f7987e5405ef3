use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::warn;

use crate::version::registries::github::DEFAULT_API_BASE_URL;

// =============================================================================
// Time-related constants
// =============================================================================

/// Minimum interval between automatic update checks in milliseconds (1 hour)
pub const DEFAULT_CHECK_INTERVAL_MS: i64 = 60 * 60 * 1000;

/// Timeout for release fetches in milliseconds (30 seconds)
pub const FETCH_TIMEOUT_MS: i64 = 30_000;

/// Default repository whose releases are tracked
pub const DEFAULT_REPOSITORY: &str = "release-channel/release-channel";

/// Default base URL for release downloads
pub const DEFAULT_WEB_BASE_URL: &str = "https://github.com";

/// Updater configuration structure
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct UpdaterConfig {
    /// Repository in "owner/name" form
    pub repository: String,
    pub api_base_url: String,
    pub web_base_url: String,
    /// Minimum interval between automatic checks in milliseconds
    pub check_interval: i64,
}

impl Default for UpdaterConfig {
    fn default() -> Self {
        Self {
            repository: DEFAULT_REPOSITORY.to_string(),
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            web_base_url: DEFAULT_WEB_BASE_URL.to_string(),
            check_interval: DEFAULT_CHECK_INTERVAL_MS,
        }
    }
}

impl UpdaterConfig {
    /// Load configuration from `path`, falling back to defaults when the
    /// file is missing or unreadable
    pub fn load(path: &Path) -> Self {
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!("Failed to read config {:?}: {}", path, e);
                return Self::default();
            }
        };

        serde_json::from_str(&content).unwrap_or_else(|e| {
            warn!("Invalid config {:?}: {}", path, e);
            Self::default()
        })
    }
}

/// Returns the path to the data directory for release-channel.
/// Uses $XDG_DATA_HOME/release-channel if XDG_DATA_HOME is set,
/// otherwise falls back to ~/.local/share/release-channel,
/// or ./release-channel if neither is available.
pub fn data_dir() -> PathBuf {
    data_dir_with_env(std::env::var("XDG_DATA_HOME").ok(), dirs::home_dir())
}

/// Returns the path to the database file.
pub fn db_path() -> PathBuf {
    data_dir().join("updates.db")
}

/// Returns the path to the log file.
pub fn log_path() -> PathBuf {
    data_dir().join("release-channel.log")
}

/// Returns the path to the config file.
pub fn config_path() -> PathBuf {
    data_dir().join("config.json")
}

/// Returns the directory downloads are staged in.
pub fn download_dir() -> PathBuf {
    data_dir().join("downloads")
}

fn data_dir_with_env(xdg_data_home: Option<String>, home_dir: Option<PathBuf>) -> PathBuf {
    let data_dir = xdg_data_home
        .map(PathBuf::from)
        .or_else(|| home_dir.map(|home| home.join(".local/share")))
        .unwrap_or_else(|| PathBuf::from("."));

    data_dir.join("release-channel")
}
