//! Rule engine - picks the destination for a new file

use serde::{Deserialize, Serialize};
use std::borrow::Cow;
use std::path::Path;
use tracing::{debug, trace};

use super::{Rule, RuleSet};

/// Which part of the path keywords are looked up in
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchScope {
    /// The full path of the file
    #[default]
    Path,
    /// Only the final path component
    FileName,
}

/// Engine for evaluating keyword rules against files
pub struct RuleEngine {
    rules: RuleSet,
    scope: MatchScope,
}

impl RuleEngine {
    /// Create a new rule engine matching against full paths
    pub fn new(rules: RuleSet) -> Self {
        Self {
            rules,
            scope: MatchScope::default(),
        }
    }

    /// Use a different match scope
    pub fn with_scope(mut self, scope: MatchScope) -> Self {
        self.scope = scope;
        self
    }

    /// Return the first rule whose keyword occurs in the path.
    ///
    /// Keywords are tried in insertion order and compared case-sensitively.
    /// Empty keywords never match.
    pub fn evaluate(&self, path: &Path) -> Option<Rule> {
        let haystack = self.haystack(path)?;

        for (keyword, destination) in self.rules.iter() {
            if keyword.is_empty() {
                trace!("Skipping empty keyword");
                continue;
            }

            if haystack.contains(keyword) {
                debug!("Keyword '{}' matched: {}", keyword, path.display());
                return Some(Rule::new(keyword, destination));
            }
        }

        None
    }

    /// Get all rules
    pub fn rules(&self) -> &RuleSet {
        &self.rules
    }

    fn haystack<'a>(&self, path: &'a Path) -> Option<Cow<'a, str>> {
        match self.scope {
            MatchScope::Path => Some(path.to_string_lossy()),
            MatchScope::FileName => path.file_name().map(|n| n.to_string_lossy()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn engine(rules: &[(&str, &str)]) -> RuleEngine {
        RuleEngine::new(rules.iter().map(|(k, d)| Rule::new(*k, *d)).collect())
    }

    #[test]
    fn test_evaluate_matching_rule() {
        let engine = engine(&[("invoice", "/docs")]);

        let result = engine.evaluate(Path::new("/dl/report_invoice.pdf"));
        assert_eq!(result.map(|r| r.destination), Some(PathBuf::from("/docs")));

        assert!(engine.evaluate(Path::new("/dl/random.bin")).is_none());
    }

    #[test]
    fn test_first_match_wins() {
        let engine = engine(&[("report", "/reports"), ("invoice", "/docs")]);

        for _ in 0..10 {
            let rule = engine.evaluate(Path::new("/dl/report_invoice.pdf")).unwrap();
            assert_eq!(rule.keyword, "report");
            assert_eq!(rule.destination, PathBuf::from("/reports"));
        }

        let swapped = self::engine(&[("invoice", "/docs"), ("report", "/reports")]);
        let rule = swapped.evaluate(Path::new("/dl/report_invoice.pdf")).unwrap();
        assert_eq!(rule.keyword, "invoice");
    }

    #[test]
    fn test_match_is_case_sensitive() {
        let engine = engine(&[("Invoice", "/docs")]);

        assert!(engine.evaluate(Path::new("/dl/invoice.pdf")).is_none());
        assert!(engine.evaluate(Path::new("/dl/Invoice.pdf")).is_some());
    }

    #[test]
    fn test_empty_keyword_never_matches() {
        let engine = engine(&[("", "/everything"), ("invoice", "/docs")]);

        assert!(engine.evaluate(Path::new("/dl/random.bin")).is_none());
        let rule = engine.evaluate(Path::new("/dl/invoice.pdf")).unwrap();
        assert_eq!(rule.keyword, "invoice");
    }

    #[test]
    fn test_path_scope_sees_directories() {
        let engine = engine(&[("work", "/work")]);

        assert!(engine.evaluate(Path::new("/home/work/dl/a.txt")).is_some());

        let engine = self::engine(&[("work", "/work")]).with_scope(MatchScope::FileName);
        assert!(engine.evaluate(Path::new("/home/work/dl/a.txt")).is_none());
        assert!(engine.evaluate(Path::new("/home/dl/work_notes.txt")).is_some());
    }
}
