//! Turns raw notify events into candidate file events

use indexmap::IndexMap;
use notify::event::{CreateKind, ModifyKind};
use notify::{Event, EventKind};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::trace;

use super::CandidateEvent;

/// Maximum number of entries in the dedupe map before forcing a cleanup
const MAX_DEDUPE_ENTRIES: usize = 10_000;

/// Keeps creation events for direct children of the watch target and
/// collapses repeated notifications for the same path
pub struct EventFilter {
    /// Directory whose direct children are of interest
    target: PathBuf,

    /// Recently emitted paths (IndexMap preserves insertion order for fair cleanup)
    recent: IndexMap<PathBuf, Instant>,

    /// Window in which a repeat for the same path is dropped
    window: Duration,
}

impl EventFilter {
    /// Create a filter for the given target directory
    pub fn new(target: PathBuf, window: Duration) -> Self {
        Self {
            target,
            recent: IndexMap::new(),
            window,
        }
    }

    /// Candidate events carried by a notify event; empty for anything but creation.
    ///
    /// A path that is removed or renamed away is forgotten, so a later file
    /// with the same name counts as new even inside the dedupe window.
    pub fn candidates(&mut self, event: &Event) -> Vec<CandidateEvent> {
        let kind = match &event.kind {
            EventKind::Create(kind) => kind,
            EventKind::Remove(_) => {
                self.forget(event.paths.iter());
                return Vec::new();
            }
            EventKind::Modify(ModifyKind::Name(_)) => {
                self.forget(event.paths.iter().filter(|p| !p.exists()));
                return Vec::new();
            }
            other => {
                trace!("Ignoring event kind: {:?}", other);
                return Vec::new();
            }
        };

        let now = Instant::now();
        let mut candidates = Vec::new();

        for path in &event.paths {
            if path.parent() != Some(self.target.as_path()) {
                trace!("Ignoring nested path: {}", path.display());
                continue;
            }

            let repeated = self
                .recent
                .get(path)
                .is_some_and(|&last| now.duration_since(last) <= self.window);
            if repeated {
                trace!("Dropping repeated creation: {}", path.display());
                continue;
            }
            self.recent.insert(path.clone(), now);

            let is_directory = match kind {
                CreateKind::Folder => true,
                CreateKind::File => false,
                _ => path.is_dir(),
            };

            candidates.push(CandidateEvent {
                path: path.clone(),
                is_directory,
            });
        }

        if self.recent.len() > MAX_DEDUPE_ENTRIES {
            self.cleanup();
        }

        candidates
    }

    fn forget<'a>(&mut self, paths: impl Iterator<Item = &'a PathBuf>) {
        for path in paths {
            if self.recent.shift_remove(path).is_some() {
                trace!("Forgot {}", path.display());
            }
        }
    }

    /// Clean up old entries
    pub fn cleanup(&mut self) {
        let now = Instant::now();
        let threshold = self.window * 10;

        self.recent
            .retain(|_, &mut last| now.duration_since(last) < threshold);
    }
}
