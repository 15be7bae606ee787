// src/matcher/mod.rs

//! Ordered include/exclude pattern matching against a root directory.
//!
//! Patterns are evaluated in list order and the last pattern that matches a
//! path decides the outcome:
//!
//! - a plain glob (`src/**/*.rs`) includes the path,
//! - a negated glob (`!target/**`) excludes it and, for directories, tells
//!   walkers not to descend,
//! - [`IGNORE_VCS`] excludes whatever git ignores at that position,
//! - [`IGNORE_HIDDEN`] is a negated glob for dotfiles.
//!
//! `.git` directories and submodule roots stay excluded whenever
//! [`IGNORE_VCS`] is present, whatever the later patterns say.

pub mod patterns;
pub(crate) mod vcs;

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::errors::{GuardError, Result};
use crate::watch::path_utils::{absolutize, relative_str};

pub use patterns::{default_patterns, IGNORE_HIDDEN, IGNORE_VCS};
use patterns::{compile, Rule};
use vcs::VcsRules;

/// Outcome of matching one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MatchResult {
    /// The path is included.
    pub matched: bool,
    /// The path was explicitly excluded by a negative pattern.
    pub negative: bool,
}

impl MatchResult {
    /// Whether a walker should skip the children of this entry.
    pub fn prunes(&self, is_dir: bool) -> bool {
        is_dir && self.negative
    }
}

/// Compiled pattern set anchored at an absolute root directory.
pub struct Matcher {
    root: PathBuf,
    rules: Vec<Rule>,
    vcs: Option<VcsRules>,
}

impl fmt::Debug for Matcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Matcher")
            .field("root", &self.root)
            .field("rules", &self.rules)
            .field("vcs", &self.vcs.is_some())
            .finish()
    }
}

impl Matcher {
    /// Build a matcher for `root` and the ordered `patterns`.
    ///
    /// Fails when the root cannot be resolved, a glob is malformed, or
    /// [`IGNORE_VCS`] is used and git cannot locate a repository.
    pub fn new<S: AsRef<str>>(root: impl AsRef<Path>, patterns: &[S]) -> Result<Self> {
        let root = root.as_ref();
        let root = if root.as_os_str().is_empty() {
            Path::new(".")
        } else {
            root
        };
        let root = root.canonicalize().map_err(|source| GuardError::RootDir {
            path: root.to_path_buf(),
            source,
        })?;

        let rules = patterns
            .iter()
            .map(|p| compile(&root, p.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        let vcs = if rules.iter().any(|r| matches!(r, Rule::IgnoreVcs)) {
            Some(VcsRules::discover(&root)?)
        } else {
            None
        };

        debug!(root = ?root, rules = ?rules, "built matcher");

        Ok(Self { root, rules, vcs })
    }

    /// Absolute, canonical root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Root-relative, slash-separated form of `path` (`"."` for the root).
    pub fn relative(&self, path: &Path) -> Option<String> {
        relative_str(&self.root, &absolutize(&self.root, path))
    }

    /// Paths named literally by a positive pattern that exist but live
    /// outside the root; walkers never reach them on their own.
    pub fn external_literals(&self) -> Vec<PathBuf> {
        self.rules
            .iter()
            .filter_map(|rule| match rule {
                Rule::Literal {
                    path,
                    negative: false,
                } if !path.starts_with(&self.root) && path.exists() => Some(path.clone()),
                _ => None,
            })
            .collect()
    }

    /// Classify `path` (absolute, or relative to the root).
    ///
    /// Errors when the path can be related neither to the root nor to any
    /// absolute pattern.
    pub fn is_match(&mut self, path: &Path, is_dir: bool) -> Result<MatchResult> {
        let abs = absolutize(&self.root, path);
        let rel = relative_str(&self.root, &abs);

        if rel.is_none() && !self.has_absolute_rules() {
            return Err(GuardError::OutsideRoot(abs));
        }

        let mut result = MatchResult::default();
        let mut vcs_present = false;

        for rule in &self.rules {
            if let Rule::IgnoreVcs = rule {
                vcs_present = true;
                if let Some(vcs) = self.vcs.as_mut() {
                    if vcs.is_ignored(&abs, is_dir) {
                        result = MatchResult {
                            matched: false,
                            negative: true,
                        };
                    }
                }
                continue;
            }

            if let Some(negative) = rule.evaluate(&abs, rel.as_deref()) {
                result = MatchResult {
                    matched: !negative,
                    negative,
                };
            }
        }

        if vcs_present {
            if let Some(vcs) = self.vcs.as_ref() {
                if vcs.is_vcs_internal(&abs, is_dir) {
                    result = MatchResult {
                        matched: false,
                        negative: true,
                    };
                }
            }
        }

        Ok(result)
    }

    fn has_absolute_rules(&self) -> bool {
        self.rules.iter().any(|rule| match rule {
            Rule::Literal { .. } => true,
            Rule::Glob { absolute, .. } => *absolute,
            Rule::IgnoreVcs => false,
        })
    }
}
