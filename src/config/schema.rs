//! Configuration schema

use crate::rules::MatchScope;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// General settings
    #[serde(default)]
    pub general: GeneralConfig,

    /// Watched folder
    #[serde(default)]
    pub watch: WatchConfig,

    /// Rule store location
    #[serde(default)]
    pub store: StoreConfig,

    /// How matched files are handled
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneralConfig {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Path to log file
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Enable desktop notifications for errors
    #[serde(default)]
    pub notifications_enabled: bool,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            log_file: None,
            notifications_enabled: false,
        }
    }
}

/// Configuration for the watched folder
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatchConfig {
    /// Folder to watch (defaults to the user's download directory)
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Milliseconds to wait after a file appears before handling it
    #[serde(default = "default_settle_delay")]
    pub settle_delay_ms: u64,

    /// Milliseconds in which repeated creation events for one path are merged.
    /// Removing or renaming the path away ends the window early.
    #[serde(default = "default_dedupe_window")]
    pub dedupe_window_ms: u64,
}

impl Default for WatchConfig {
    fn default() -> Self {
        Self {
            path: None,
            settle_delay_ms: default_settle_delay(),
            dedupe_window_ms: default_dedupe_window(),
        }
    }
}

/// Rule store location
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StoreConfig {
    /// Path of the rules file (defaults to beside the executable)
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Matching and moving behaviour
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Match keywords against the full path or only the file name
    #[serde(default)]
    pub match_scope: MatchScope,

    /// Create a rule's destination folder when it is missing
    #[serde(default = "default_true")]
    pub create_missing_destinations: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            match_scope: MatchScope::default(),
            create_missing_destinations: true,
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_settle_delay() -> u64 {
    500
}

fn default_dedupe_window() -> u64 {
    1000
}

fn default_true() -> bool {
    true
}
