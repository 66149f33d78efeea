//! Configuration management

mod schema;

pub use schema::{Config, DispatchConfig, GeneralConfig, StoreConfig, WatchConfig};

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::rules::RuleStore;

impl Config {
    /// Load configuration from a file or default location
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = path
            .map(PathBuf::from)
            .or_else(Self::default_path)
            .context("Could not determine config path")?;

        if config_path.exists() {
            let content = std::fs::read_to_string(&config_path)
                .with_context(|| format!("Failed to read config from {}", config_path.display()))?;

            let config: Config = toml::from_str(&content).with_context(|| {
                format!("Failed to parse config from {}", config_path.display())
            })?;

            Ok(config)
        } else if path.is_some() {
            anyhow::bail!("Config file not found: {}", config_path.display())
        } else {
            Ok(Self::default())
        }
    }

    /// Get the default config file path
    /// Uses the platform config directory (via dirs::config_dir), falling back to ~/.config
    pub fn default_path() -> Option<PathBuf> {
        let config_base =
            dirs::config_dir().or_else(|| dirs::home_dir().map(|d| d.join(".config")))?;
        Some(config_base.join("dropsort").join("config.toml"))
    }

    /// Folder to watch: the configured path, else the user's download directory
    pub fn watch_target(&self) -> Option<PathBuf> {
        match &self.watch.path {
            Some(path) => Some(crate::expand_path(path)),
            None => dirs::download_dir().or_else(|| dirs::home_dir().map(|h| h.join("Downloads"))),
        }
    }

    /// Rule store location: the configured path, else beside the executable
    pub fn store_path(&self) -> Option<PathBuf> {
        match &self.store.path {
            Some(path) => Some(crate::expand_path(path)),
            None => RuleStore::default_path(),
        }
    }

    /// Log file with `~` and variables expanded
    pub fn log_file(&self) -> Option<PathBuf> {
        self.general.log_file.as_deref().map(crate::expand_path)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.watch.settle_delay_ms)
    }

    pub fn dedupe_window(&self) -> Duration {
        Duration::from_millis(self.watch.dedupe_window_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("config.toml");

        assert!(Config::load(Some(&missing)).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(
            &path,
            format!(
                "[watch]\npath = \"{}\"\nsettle_delay_ms = 0\n",
                dir.path().display()
            ),
        )
        .unwrap();

        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.watch_target(), Some(dir.path().to_path_buf()));
        assert_eq!(config.settle_delay(), Duration::ZERO);
        assert_eq!(config.dedupe_window(), Duration::from_secs(1));
    }

    #[test]
    fn test_load_reports_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[watch\n").unwrap();

        let err = Config::load(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_store_path_override() {
        let mut config = Config::default();
        config.store.path = Some(PathBuf::from("/srv/rules.json"));
        assert_eq!(config.store_path(), Some(PathBuf::from("/srv/rules.json")));

        config.store.path = None;
        let default = config.store_path().unwrap();
        assert!(default.ends_with(crate::rules::STORE_FILE_NAME));
    }
}
