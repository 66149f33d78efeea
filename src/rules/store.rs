//! Rule store shared by the editor front end and the daemon
//!
//! The store is a small JSON document, `{"keywords": {"<keyword>": "<destination>"}}`,
//! opened and closed on every call so the two processes never hold it
//! concurrently. Writers replace the file through a sibling temp file so readers
//! always see a complete document; readers take no lock.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::{Rule, RuleError, RuleSet};

/// File name of the store, placed beside the executable by default
pub const STORE_FILE_NAME: &str = "dropsort-rules.json";

/// Top-level key holding the rules
const RULES_KEY: &str = "keywords";

/// Serializes writers within this process; the advisory file lock covers other processes
static WRITE_LOCK: Mutex<()> = Mutex::new(());

/// Errors raised while reading or writing the store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("rule store {} is unreadable: {source}", .path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("rule store {} is corrupt: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("rule store {} has an unexpected shape: {reason}", .path.display())]
    Schema { path: PathBuf, reason: String },

    #[error("failed to write rule store {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    InvalidRule(#[from] RuleError),
}

impl StoreError {
    /// Whether the stored rules could not be read (as opposed to a refused write)
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Unreadable { .. } | StoreError::Corrupt { .. } | StoreError::Schema { .. }
        )
    }
}

/// Shapes accepted for the rules value. Only the mapping is ever written;
/// the sequence forms are upgraded on load.
#[derive(Deserialize)]
#[serde(untagged)]
enum StoredRules {
    Mapping(IndexMap<String, PathBuf>),
    Pairs(Vec<(String, PathBuf)>),
    Records(Vec<Rule>),
}

impl From<StoredRules> for RuleSet {
    fn from(stored: StoredRules) -> Self {
        match stored {
            StoredRules::Mapping(map) => map
                .into_iter()
                .map(|(keyword, destination)| Rule::new(keyword, destination))
                .collect(),
            StoredRules::Pairs(pairs) => pairs
                .into_iter()
                .map(|(keyword, destination)| Rule::new(keyword, destination))
                .collect(),
            StoredRules::Records(records) => records.into_iter().collect(),
        }
    }
}

#[derive(Serialize)]
struct StoreDocument<'a> {
    keywords: &'a RuleSet,
}

/// Handle to the persisted rules
#[derive(Debug, Clone)]
pub struct RuleStore {
    path: PathBuf,
}

impl RuleStore {
    /// Create a handle for the store at the given path
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Default store location: beside the running executable
    pub fn default_path() -> Option<PathBuf> {
        let exe = std::env::current_exe().ok()?;
        Some(exe.parent()?.join(STORE_FILE_NAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the current rules.
    ///
    /// A missing file or a document without a rules key is the normal,
    /// not-yet-initialized state and yields an empty set.
    pub fn load(&self) -> Result<RuleSet, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("Rule store not created yet: {}", self.path.display());
                return Ok(RuleSet::new());
            }
            Err(source) => {
                return Err(StoreError::Unreadable {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        if content.trim().is_empty() {
            return Ok(RuleSet::new());
        }

        let document: serde_json::Value =
            serde_json::from_str(&content).map_err(|source| StoreError::Corrupt {
                path: self.path.clone(),
                source,
            })?;

        let serde_json::Value::Object(mut document) = document else {
            return Err(self.schema_error("top level is not an object"));
        };

        let rules = match document.remove(RULES_KEY) {
            None | Some(serde_json::Value::Null) => return Ok(RuleSet::new()),
            Some(value) => value,
        };

        let stored = StoredRules::deserialize(rules).map_err(|_| {
            self.schema_error(format!(
                "'{}' must map keywords to destination paths",
                RULES_KEY
            ))
        })?;

        let mut rules = RuleSet::from(stored);
        let dropped = rules.drop_empty_keywords();
        if dropped > 0 {
            warn!(
                "Ignoring {} rule(s) with an empty keyword in {}",
                dropped,
                self.path.display()
            );
        }

        Ok(rules)
    }

    /// Replace the persisted rules with `rules`
    pub fn save(&self, rules: &RuleSet) -> Result<(), StoreError> {
        self.with_write_lock(|| self.write(rules))
    }

    /// Add a rule, returning the destination it replaced.
    ///
    /// An existing keyword is refused unless `replace` is set. An unreadable
    /// store is set aside and recreated.
    pub fn add(&self, rule: Rule, replace: bool) -> Result<Option<PathBuf>, StoreError> {
        if rule.keyword.is_empty() {
            return Err(RuleError::EmptyKeyword.into());
        }

        self.with_write_lock(|| {
            let mut rules = self.load_for_edit()?;
            if rules.contains(&rule.keyword) && !replace {
                return Err(RuleError::DuplicateKeyword(rule.keyword).into());
            }
            let previous = rules.insert(rule);
            self.write(&rules)?;
            Ok(previous)
        })
    }

    /// Remove a rule by keyword, returning its destination if it existed
    pub fn remove(&self, keyword: &str) -> Result<Option<PathBuf>, StoreError> {
        self.with_write_lock(|| {
            let mut rules = self.load_for_edit()?;
            let removed = rules.remove(keyword);
            if removed.is_some() {
                self.write(&rules)?;
            }
            Ok(removed)
        })
    }

    /// Load for a read-modify-write cycle, recovering from an unreadable store
    fn load_for_edit(&self) -> Result<RuleSet, StoreError> {
        match self.load() {
            Ok(rules) => Ok(rules),
            Err(e) if e.is_unavailable() => {
                let aside = self.path.with_extension("json.corrupt");
                warn!("{}; moving it to {} and starting empty", e, aside.display());
                std::fs::rename(&self.path, &aside).map_err(|source| StoreError::Write {
                    path: self.path.clone(),
                    source,
                })?;
                Ok(RuleSet::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Run `f` holding the in-process mutex and the advisory lock file
    fn with_write_lock<T>(
        &self,
        f: impl FnOnce() -> Result<T, StoreError>,
    ) -> Result<T, StoreError> {
        let _guard = WRITE_LOCK.lock().unwrap_or_else(|e| e.into_inner());

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|source| self.write_error(source))?;
        }

        let lock_path = self.path.with_extension("json.lock");
        let lock_file = std::fs::OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&lock_path)
            .map_err(|source| StoreError::Write {
                path: lock_path.clone(),
                source,
            })?;

        use fs2::FileExt;
        lock_file
            .lock_exclusive()
            .map_err(|source| StoreError::Write {
                path: lock_path.clone(),
                source,
            })?;

        let result = f();

        let _ = lock_file.unlock();

        result
    }

    /// Write the document through a temp file and rename it into place
    fn write(&self, rules: &RuleSet) -> Result<(), StoreError> {
        if rules.iter().any(|(keyword, _)| keyword.is_empty()) {
            return Err(RuleError::EmptyKeyword.into());
        }

        let content = serde_json::to_string_pretty(&StoreDocument { keywords: rules })
            .map_err(|e| self.write_error(std::io::Error::other(e)))?;

        let file_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| STORE_FILE_NAME.to_string());
        let tmp_path = self
            .path
            .with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()));

        let written = (|| -> std::io::Result<()> {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(content.as_bytes())?;
            file.write_all(b"\n")?;
            file.sync_all()?;
            std::fs::rename(&tmp_path, &self.path)
        })();

        if let Err(source) = written {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(self.write_error(source));
        }

        info!(
            "Saved {} rule(s) to {}",
            rules.len(),
            self.path.display()
        );
        Ok(())
    }

    fn schema_error(&self, reason: impl Into<String>) -> StoreError {
        StoreError::Schema {
            path: self.path.clone(),
            reason: reason.into(),
        }
    }

    fn write_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Write {
            path: self.path.clone(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &tempfile::TempDir) -> RuleStore {
        RuleStore::new(dir.path().join(STORE_FILE_NAME))
    }

    #[test]
    fn test_load_missing_store_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let rules = store.load().unwrap();
        assert!(rules.is_empty());
        assert!(!store.path().exists());
    }

    #[test]
    fn test_load_without_rules_key_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), r#"{"other": 1}"#).unwrap();

        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_save_then_load_roundtrip_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let rules: RuleSet = [
            Rule::new("zeta", "/z"),
            Rule::new("alpha", "/a"),
            Rule::new("invoice", "/docs"),
        ]
        .into_iter()
        .collect();
        store.save(&rules).unwrap();

        let loaded = store.load().unwrap();
        assert_eq!(loaded, rules);
        let order: Vec<&str> = loaded.iter().map(|(k, _)| k).collect();
        assert_eq!(order, ["zeta", "alpha", "invoice"]);

        let before = std::fs::read_to_string(store.path()).unwrap();
        store.save(&loaded).unwrap();
        let after = std::fs::read_to_string(store.path()).unwrap();
        assert_eq!(before, after);
        assert_eq!(store.load().unwrap(), rules);
    }

    #[test]
    fn test_edits_keep_insertion_order() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        store.add(Rule::new("report", "/reports"), false).unwrap();
        store.add(Rule::new("invoice", "/docs"), false).unwrap();
        store.add(Rule::new("alpha", "/a"), false).unwrap();
        store.remove("invoice").unwrap();
        store.add(Rule::new("report", "/elsewhere"), true).unwrap();

        let rules = store.load().unwrap();
        let order: Vec<&str> = rules.iter().map(|(k, _)| k).collect();
        assert_eq!(order, ["report", "alpha"]);
        assert_eq!(rules.get("report"), Some(Path::new("/elsewhere")));

        let raw = std::fs::read_to_string(store.path()).unwrap();
        assert!(raw.find("\"report\"").unwrap() < raw.find("\"alpha\"").unwrap());
    }

    #[test]
    fn test_persisted_shape_is_keyword_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store
            .save(&[Rule::new("invoice", "/docs")].into_iter().collect())
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(store.path()).unwrap()).unwrap();
        assert_eq!(raw["keywords"]["invoice"], "/docs");
    }

    #[test]
    fn test_legacy_sequence_shapes_are_upgraded() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        std::fs::write(
            store.path(),
            r#"{"keywords": [["invoice", "/docs"], ["photo", "/pics"]]}"#,
        )
        .unwrap();
        let rules = store.load().unwrap();
        assert_eq!(rules.get("invoice"), Some(Path::new("/docs")));
        assert_eq!(rules.len(), 2);

        std::fs::write(
            store.path(),
            r#"{"keywords": [{"keyword": "invoice", "destination": "/docs"}]}"#,
        )
        .unwrap();
        assert_eq!(store.load().unwrap().get("invoice"), Some(Path::new("/docs")));

        std::fs::write(store.path(), r#"{"keywords": []}"#).unwrap();
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn test_unexpected_shapes_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        for doc in [
            r#"{"keywords": ["invoice", "photo"]}"#,
            r#"{"keywords": 42}"#,
            r#"{"keywords": {"invoice": 7}}"#,
            r#"["invoice"]"#,
        ] {
            std::fs::write(store.path(), doc).unwrap();
            let err = store.load().unwrap_err();
            assert!(matches!(err, StoreError::Schema { .. }), "{doc}: {err}");
            assert!(err.is_unavailable());
        }
    }

    #[test]
    fn test_corrupt_store_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "{not json").unwrap();

        let err = store.load().unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        assert!(err.is_unavailable());
    }

    #[test]
    fn test_empty_keywords_dropped_on_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(
            store.path(),
            r#"{"keywords": {"": "/everything", "invoice": "/docs"}}"#,
        )
        .unwrap();

        let rules = store.load().unwrap();
        assert_eq!(rules.len(), 1);
        assert!(rules.contains("invoice"));
    }

    #[test]
    fn test_save_refuses_empty_keyword() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let err = store
            .save(&[Rule::new("", "/everything")].into_iter().collect())
            .unwrap_err();
        assert!(matches!(err, StoreError::InvalidRule(RuleError::EmptyKeyword)));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_add_creates_store_and_refuses_duplicates() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        assert_eq!(store.add(Rule::new("invoice", "/docs"), false).unwrap(), None);
        assert!(store.path().exists());

        let err = store
            .add(Rule::new("invoice", "/elsewhere"), false)
            .unwrap_err();
        assert!(matches!(
            err,
            StoreError::InvalidRule(RuleError::DuplicateKeyword(_))
        ));
        assert_eq!(store.load().unwrap().get("invoice"), Some(Path::new("/docs")));

        let previous = store.add(Rule::new("invoice", "/elsewhere"), true).unwrap();
        assert_eq!(previous, Some(PathBuf::from("/docs")));
        assert_eq!(
            store.load().unwrap().get("invoice"),
            Some(Path::new("/elsewhere"))
        );
    }

    #[test]
    fn test_add_recovers_corrupt_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        std::fs::write(store.path(), "garbage").unwrap();

        store.add(Rule::new("invoice", "/docs"), false).unwrap();

        let rules = store.load().unwrap();
        assert_eq!(rules.len(), 1);
        assert!(store.path().with_extension("json.corrupt").exists());
    }

    #[test]
    fn test_remove() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);
        store.add(Rule::new("invoice", "/docs"), false).unwrap();
        store.add(Rule::new("photo", "/pics"), false).unwrap();

        assert_eq!(
            store.remove("invoice").unwrap(),
            Some(PathBuf::from("/docs"))
        );
        assert_eq!(store.remove("invoice").unwrap(), None);

        let rules = store.load().unwrap();
        assert_eq!(rules.len(), 1);
        assert!(rules.contains("photo"));
    }

    #[test]
    fn test_concurrent_adds_in_process_are_serialized() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(&dir);

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                std::thread::spawn(move || {
                    store
                        .add(Rule::new(format!("kw{i}"), format!("/dest/{i}")), false)
                        .unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(store.load().unwrap().len(), 8);
    }
}
