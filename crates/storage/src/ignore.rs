//! `.gitignore`-style ignore rules.
//!
//! Matching is delegated to [`ignore::gitignore`], so the full gitignore
//! syntax applies: character classes, `**`, anchoring on a leading or inner
//! `/`, directory-only patterns with a trailing `/`, and `!` negation where
//! the last matching rule wins. A path is also ignored when one of its parent
//! directories is.

use crate::error::{ErrorKind, Result};
use ::ignore::gitignore::{Gitignore, GitignoreBuilder};
use std::path::{Component, Path, PathBuf};

const STANDARD: [&str; 3] = [".git/", ".DS_Store", "Thumbs.db"];

/// An ordered set of ignore rules.
///
/// # Examples
///
/// ```
/// use pubsite_storage::IgnoreRules;
///
/// let rules = IgnoreRules::new(["*.log", "drafts/*", "!drafts/keep.html"]).unwrap();
/// assert!(rules.is_ignored("logs/debug.log", false));
/// assert!(rules.is_ignored("drafts/wip.html", false));
/// assert!(!rules.is_ignored("drafts/keep.html", false));
/// assert!(!rules.is_ignored("index.html", false));
/// ```
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    patterns: Vec<String>,
    matcher: Gitignore,
}

impl Default for IgnoreRules {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            matcher: Gitignore::empty(),
        }
    }
}

impl IgnoreRules {
    /// Compile a list of rules, in order.
    ///
    /// Blank lines and `#` comments are skipped.
    pub fn new<I, S>(patterns: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let patterns: Vec<String> = patterns
            .into_iter()
            .map(|pattern| pattern.as_ref().trim().to_string())
            .filter(|line| !line.is_empty() && !line.starts_with('#'))
            .collect();
        let matcher = build(&patterns)?;
        Ok(Self { patterns, matcher })
    }

    /// Rules that every deployment skips unless explicitly negated.
    pub fn standard() -> Self {
        // The standard patterns are static and known to compile.
        Self::new(STANDARD).unwrap_or_default()
    }

    /// Append another rule set; its rules take precedence over ours.
    pub fn extend(mut self, other: IgnoreRules) -> Result<Self> {
        self.patterns.extend(other.patterns);
        self.matcher = build(&self.patterns)?;
        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// The source patterns, in evaluation order.
    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.patterns.iter().map(String::as_str)
    }

    /// Whether a source-relative path is excluded.
    ///
    /// `is_dir` decides whether directory-only patterns (`build/`) apply to
    /// the path itself. Its parents are always matched as directories.
    pub fn is_ignored(&self, path: impl AsRef<Path>, is_dir: bool) -> bool {
        let path = normalize(path.as_ref());
        if path.as_os_str().is_empty() || self.matcher.is_empty() {
            return false;
        }
        self.matcher.matched_path_or_any_parents(&path, is_dir).is_ignore()
    }
}

/// Drop root, `.` and `..` components; the matcher expects a plain relative path.
fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part),
            _ => None,
        })
        .collect()
}

fn build(patterns: &[String]) -> Result<Gitignore> {
    let mut builder = GitignoreBuilder::new("");
    for line in patterns {
        builder.add_line(None, line).map_err(|_| ErrorKind::InvalidPattern(line.clone()))?;
    }
    Ok(builder.build().map_err(|e| ErrorKind::InvalidPattern(e.to_string()))?)
}
