//! Keyword rules - the shared rule store, validation and matching

mod engine;
mod store;

pub use engine::{MatchScope, RuleEngine};
pub use store::{RuleStore, STORE_FILE_NAME, StoreError};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// A keyword routed to a destination directory
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rule {
    /// Substring looked up in the path of each new file
    pub keyword: String,

    /// Directory that matching files are moved into
    pub destination: PathBuf,
}

impl Rule {
    /// Create a new rule
    pub fn new(keyword: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            keyword: keyword.into(),
            destination: destination.into(),
        }
    }

    /// Build a rule from user input, rejecting anything that must never be persisted.
    ///
    /// The keyword is trimmed and must not be empty (an empty keyword would match
    /// every file). The destination has `~` and `$VAR` expanded, is made absolute,
    /// and must be an existing directory. With `create` set, a missing destination
    /// is created instead of rejected.
    pub fn validated(keyword: &str, destination: &Path, create: bool) -> Result<Self, RuleError> {
        let keyword = keyword.trim();
        if keyword.is_empty() {
            return Err(RuleError::EmptyKeyword);
        }
        if destination.as_os_str().is_empty() {
            return Err(RuleError::EmptyDestination);
        }

        let expanded = crate::expand_path(destination);
        let destination = std::path::absolute(&expanded).unwrap_or(expanded);

        match std::fs::metadata(&destination) {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => return Err(RuleError::DestinationIsFile(destination)),
            Err(_) if create => {
                std::fs::create_dir_all(&destination).map_err(|source| {
                    RuleError::CreateDestination {
                        path: destination.clone(),
                        source,
                    }
                })?;
            }
            Err(_) => return Err(RuleError::DestinationMissing(destination)),
        }

        Ok(Self::new(keyword, destination))
    }
}

/// Reasons a rule is refused before it reaches the store
#[derive(Debug, Error)]
pub enum RuleError {
    #[error("keyword must not be empty")]
    EmptyKeyword,

    #[error("destination must not be empty")]
    EmptyDestination,

    #[error("destination is an existing file: {}", .0.display())]
    DestinationIsFile(PathBuf),

    #[error("destination does not exist: {}", .0.display())]
    DestinationMissing(PathBuf),

    #[error("failed to create destination {}: {source}", .path.display())]
    CreateDestination {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("keyword '{0}' already exists")]
    DuplicateKeyword(String),
}

/// All rules, keyed by keyword and iterated in insertion order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RuleSet {
    rules: IndexMap<String, PathBuf>,
}

impl RuleSet {
    /// Create an empty rule set
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Destination registered for a keyword
    pub fn get(&self, keyword: &str) -> Option<&Path> {
        self.rules.get(keyword).map(PathBuf::as_path)
    }

    pub fn contains(&self, keyword: &str) -> bool {
        self.rules.contains_key(keyword)
    }

    /// Insert a rule, returning the destination it replaced.
    ///
    /// Replacing an existing keyword keeps its position in the ordering.
    pub fn insert(&mut self, rule: Rule) -> Option<PathBuf> {
        self.rules.insert(rule.keyword, rule.destination)
    }

    /// Remove a rule by keyword, preserving the order of the others
    pub fn remove(&mut self, keyword: &str) -> Option<PathBuf> {
        self.rules.shift_remove(keyword)
    }

    /// Iterate keywords and destinations in match order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.rules.iter().map(|(k, d)| (k.as_str(), d.as_path()))
    }

    /// Drop entries with an empty keyword, returning how many were removed
    pub(crate) fn drop_empty_keywords(&mut self) -> usize {
        let before = self.rules.len();
        self.rules.retain(|keyword, _| !keyword.is_empty());
        before - self.rules.len()
    }
}

impl FromIterator<Rule> for RuleSet {
    fn from_iter<I: IntoIterator<Item = Rule>>(iter: I) -> Self {
        let mut set = Self::new();
        for rule in iter {
            set.insert(rule);
        }
        set
    }
}
