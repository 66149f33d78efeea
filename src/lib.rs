//! dropsort - keyword-routed download dispatcher
//!
//! Watches the download folder and moves each new file into the folder of the
//! first keyword rule whose keyword appears in the file's path.

pub mod config;
pub mod dispatcher;
pub mod logging;
pub mod mover;
pub mod notifications;
pub mod pidfile;
pub mod rules;
pub mod watcher;

pub use config::Config;
pub use dispatcher::{DispatchSettings, Dispatcher, DispatcherService, Outcome, ServiceState};
pub use mover::{MoveError, MoveFailure, move_file};
pub use rules::{MatchScope, Rule, RuleEngine, RuleError, RuleSet, RuleStore, StoreError};
pub use watcher::{CandidateEvent, WatchError, Watcher};

/// Current version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Expand ~ and environment variables ($VAR, ${VAR}) in a path
pub fn expand_path(path: &std::path::Path) -> std::path::PathBuf {
    let path_str = path.to_string_lossy();

    // First expand ~ prefix
    let expanded = if let Some(stripped) = path_str.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            home.join(stripped).to_string_lossy().to_string()
        } else {
            path_str.to_string()
        }
    } else if path_str == "~" {
        if let Some(home) = dirs::home_dir() {
            home.to_string_lossy().to_string()
        } else {
            path_str.to_string()
        }
    } else {
        path_str.to_string()
    };

    // Then expand $VAR and ${VAR} patterns
    use std::sync::LazyLock;
    static ENV_RE: LazyLock<regex::Regex> = LazyLock::new(|| {
        regex::Regex::new(r"\$\{([^}]+)\}|\$([A-Za-z_][A-Za-z0-9_]*)").expect("invalid env regex")
    });

    let result = ENV_RE.replace_all(&expanded, |caps: &regex::Captures| {
        let var_name = caps
            .get(1)
            .or_else(|| caps.get(2))
            .map(|m| m.as_str())
            .unwrap_or("");
        std::env::var(var_name).unwrap_or_else(|_| caps[0].to_string())
    });

    std::path::PathBuf::from(result.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn test_expand_home() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        assert_eq!(expand_path(Path::new("~/Downloads")), home.join("Downloads"));
        assert_eq!(expand_path(Path::new("~")), home);
    }

    #[test]
    fn test_unknown_variable_left_alone() {
        let path = Path::new("/data/$DROPSORT_SURELY_UNSET_VAR/x");
        assert_eq!(expand_path(path), path);
    }

    #[test]
    fn test_plain_path_unchanged() {
        assert_eq!(
            expand_path(Path::new("/srv/docs/invoices")),
            Path::new("/srv/docs/invoices")
        );
    }
}
