//! Dispatcher - reacts to one new file at a time
//!
//! Each candidate event goes through: discard directories, wait out the settle
//! delay, read a fresh snapshot of the rule store, match, and move.

mod service;

pub use service::{DispatcherService, RunSummary, ServiceState};

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::mover::{self, MoveError, MoveFailure, MoveOptions};
use crate::rules::{MatchScope, Rule, RuleEngine, RuleStore, StoreError};
use crate::notifications::{self, Alert};
use crate::watcher::CandidateEvent;

/// Tunables for event handling
#[derive(Debug, Clone)]
pub struct DispatchSettings {
    /// Pause between a file appearing and it being inspected
    pub settle_delay: Duration,
    pub match_scope: MatchScope,
    pub move_options: MoveOptions,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        Self {
            settle_delay: Duration::from_millis(500),
            match_scope: MatchScope::default(),
            move_options: MoveOptions::default(),
        }
    }
}

impl DispatchSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            settle_delay: config.settle_delay(),
            match_scope: config.dispatch.match_scope,
            move_options: MoveOptions {
                create_missing_destinations: config.dispatch.create_missing_destinations,
            },
        }
    }
}

/// What happened to one candidate event
#[derive(Debug)]
pub enum Outcome {
    /// The new entry was a directory
    IgnoredDirectory,
    /// No keyword matched; the file stays where it is
    NoMatch,
    /// The file was moved
    Moved { keyword: String, to: PathBuf },
    /// A rule matched but the move failed
    MoveFailed { keyword: String, error: MoveError },
    /// The rules could not be read; matching was skipped
    StoreUnavailable(StoreError),
    /// Shutdown arrived before the file was touched
    Abandoned,
    /// The dispatch task panicked; the file may or may not have moved
    Crashed(String),
}

impl Outcome {
    pub fn is_moved(&self) -> bool {
        matches!(self, Outcome::Moved { .. })
    }
}

/// Handles candidate events against the shared rule store
#[derive(Debug, Clone)]
pub struct Dispatcher {
    store: RuleStore,
    settings: DispatchSettings,
}

impl Dispatcher {
    pub fn new(store: RuleStore, settings: DispatchSettings) -> Self {
        Self { store, settings }
    }

    pub fn store(&self) -> &RuleStore {
        &self.store
    }

    pub fn settings(&self) -> &DispatchSettings {
        &self.settings
    }

    /// Handle one event end to end.
    ///
    /// If `cancel` fires during the settle delay the event is abandoned without
    /// touching the file. Once the move has started it runs to completion.
    pub async fn handle(&self, event: CandidateEvent, cancel: &CancellationToken) -> Outcome {
        if event.is_directory {
            debug!("Ignoring new directory: {}", event.path.display());
            return Outcome::IgnoredDirectory;
        }

        info!("New file: {}", event.path.display());

        if !self.settings.settle_delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!("Abandoned during settle delay: {}", event.path.display());
                    return Outcome::Abandoned;
                }
                _ = tokio::time::sleep(self.settings.settle_delay) => {}
            }
        }

        let this = self.clone();
        let path = event.path;
        joined(tokio::task::spawn_blocking(move || this.dispatch(&path)).await)
    }

    /// Match and move a file that is ready now (no settle delay)
    pub fn dispatch(&self, path: &Path) -> Outcome {
        let rule = match self.preview(path) {
            Ok(Some(rule)) => rule,
            Ok(None) => {
                debug!("No keyword matched: {}", path.display());
                return Outcome::NoMatch;
            }
            Err(e) => {
                warn!("Skipping {}: {}", path.display(), e);
                return Outcome::StoreUnavailable(e);
            }
        };

        match mover::move_file(path, &rule.destination, self.settings.move_options) {
            Ok(to) => {
                info!(
                    "Moved {} -> {} (keyword '{}')",
                    path.display(),
                    to.display(),
                    rule.keyword
                );
                Outcome::Moved {
                    keyword: rule.keyword,
                    to,
                }
            }
            Err(error) => {
                report_failure(&rule.keyword, &error);
                Outcome::MoveFailed {
                    keyword: rule.keyword,
                    error,
                }
            }
        }
    }

    /// Rule that would route `path`, read from a fresh store snapshot
    pub fn preview(&self, path: &Path) -> Result<Option<Rule>, StoreError> {
        let rules = self.store.load()?;
        let engine = RuleEngine::new(rules).with_scope(self.settings.match_scope);
        Ok(engine.evaluate(path))
    }
}

fn joined(result: Result<Outcome, JoinError>) -> Outcome {
    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            error!("Dispatch task failed: {}", e);
            Outcome::Crashed(e.to_string())
        }
    }
}

fn report_failure(keyword: &str, error: &MoveError) {
    match error.failure() {
        MoveFailure::SourceNotFound => {
            warn!("File vanished before it could be moved: {}", error);
        }
        MoveFailure::PermissionDenied | MoveFailure::Other => {
            error!("Move for keyword '{}' failed: {}", keyword, error);
            notifications::send(Alert::MoveFailed { keyword, error });
        }
    }
}
