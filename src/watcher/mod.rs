//! Directory watcher - reports new entries in the watch target

mod handler;

pub use handler::EventFilter;

use notify::{Config, RecommendedWatcher, RecursiveMode, Watcher as NotifyWatcher};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::notifications::{self, Alert};

/// A new entry that appeared directly under the watch target
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEvent {
    pub path: PathBuf,
    pub is_directory: bool,
}

/// Failures that prevent watching from starting
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("watch target does not exist: {}", .0.display())]
    TargetMissing(PathBuf),

    #[error("watch target is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("cannot access watch target {}: {source}", .path.display())]
    Inaccessible {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to initialize file notifications: {0}")]
    Backend(#[from] notify::Error),

    #[error("watcher is already running")]
    AlreadyRunning,
}

/// Whether the watcher currently holds a subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Stopped,
    Running,
}

/// Non-recursive watcher over a single directory
pub struct Watcher {
    target: PathBuf,
    dedupe_window: Duration,
    inner: Option<RecommendedWatcher>,
}

impl Watcher {
    /// Create a watcher for `target`, checking that it is an accessible directory
    pub fn new(target: &Path, dedupe_window: Duration) -> Result<Self, WatchError> {
        let canonical = std::fs::canonicalize(target).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                WatchError::TargetMissing(target.to_path_buf())
            } else {
                WatchError::Inaccessible {
                    path: target.to_path_buf(),
                    source,
                }
            }
        })?;

        if !canonical.is_dir() {
            return Err(WatchError::NotADirectory(target.to_path_buf()));
        }

        std::fs::read_dir(&canonical).map_err(|source| WatchError::Inaccessible {
            path: target.to_path_buf(),
            source,
        })?;

        Ok(Self {
            target: canonical,
            dedupe_window,
            inner: None,
        })
    }

    /// Canonical path of the watched directory
    pub fn target(&self) -> &Path {
        &self.target
    }

    pub fn state(&self) -> WatcherState {
        if self.inner.is_some() {
            WatcherState::Running
        } else {
            WatcherState::Stopped
        }
    }

    /// Subscribe to creation events.
    ///
    /// Events arrive on the returned channel as they happen; the watcher never
    /// waits for a previous event to be handled. The channel closes on [`stop`].
    ///
    /// [`stop`]: Watcher::stop
    pub fn start(&mut self) -> Result<mpsc::UnboundedReceiver<CandidateEvent>, WatchError> {
        if self.inner.is_some() {
            return Err(WatchError::AlreadyRunning);
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let mut filter = EventFilter::new(self.target.clone(), self.dedupe_window);
        let target = self.target.clone();

        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    for candidate in filter.candidates(&event) {
                        debug!("Created: {}", candidate.path.display());
                        if tx.send(candidate).is_err() {
                            debug!("Dispatcher gone, dropping event");
                        }
                    }
                }
                Err(e) => {
                    error!("Watch error: {}", e);
                    notifications::send(Alert::WatchFailed {
                        target: &target,
                        error: &e,
                    });
                }
            },
            Config::default(),
        )?;

        watcher.watch(&self.target, RecursiveMode::NonRecursive)?;
        info!("Watching: {} (recursive: false)", self.target.display());

        self.inner = Some(watcher);
        Ok(rx)
    }

    /// Drop the subscription. Safe to call when already stopped.
    pub fn stop(&mut self) {
        if let Some(mut watcher) = self.inner.take() {
            if let Err(e) = watcher.unwatch(&self.target) {
                debug!("Unwatch failed: {}", e);
            }
            info!("Stopped watching: {}", self.target.display());
        }
    }
}

impl Drop for Watcher {
    fn drop(&mut self) {
        self.stop();
    }
}
