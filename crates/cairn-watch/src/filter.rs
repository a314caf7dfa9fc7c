//! Exclusion rules for discovered paths.

use std::path::Path;

use glob::{MatchOptions, Pattern};

use crate::error::WatchError;

/// `*` and `?` never match a path separator.
const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled set of shell-style glob patterns matched against full paths.
#[derive(Debug, Clone, Default)]
pub struct ExcludeSet {
    patterns: Vec<Pattern>,
}

impl ExcludeSet {
    /// Compile `patterns`, failing on the first invalid one.
    pub fn new<I, S>(patterns: I) -> Result<Self, WatchError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns = patterns
            .into_iter()
            .map(|p| {
                let p = p.as_ref();
                Pattern::new(p).map_err(|source| WatchError::Pattern {
                    pattern: p.to_string(),
                    source,
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True when `path` itself matches a pattern.
    pub fn matches(&self, path: &Path) -> bool {
        self.patterns
            .iter()
            .any(|p| p.matches_path_with(path, MATCH_OPTIONS))
    }

    /// True when `path` or any of its ancestors down to `root` matches a
    /// pattern.
    ///
    /// A path inside an excluded directory is excluded as well. Ancestors
    /// above `root` are never consulted, the same as a walk from `root`.
    pub fn covers(&self, root: &Path, path: &Path) -> bool {
        !self.is_empty()
            && path
                .ancestors()
                .take_while(|p| p.starts_with(root))
                .any(|p| self.matches(p))
    }
}
