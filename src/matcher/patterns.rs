// src/matcher/patterns.rs

//! Compilation of pattern strings into match rules.

use std::fmt;
use std::path::{Path, PathBuf};

use globset::{GlobBuilder, GlobMatcher};

use crate::errors::{GuardError, Result};
use crate::watch::path_utils::{absolutize, clean};

/// Special pattern: exclude everything the VCS ignores (`.gitignore` files,
/// the global excludes file, `.git` directories and submodule roots).
pub const IGNORE_VCS: &str = "!g";

/// Special pattern: exclude hidden files and directories (dotfiles).
///
/// Behaves like `!**/.*` for every real name, `..cache` included. The `?`
/// only keeps the root's own relative form `.` from matching, which would
/// otherwise prune the whole walk.
pub const IGNORE_HIDDEN: &str = "!**/.?*";

/// Patterns used when a guard is given none: everything, minus VCS ignores.
pub fn default_patterns() -> Vec<String> {
    vec!["**".to_string(), IGNORE_VCS.to_string()]
}

/// One compiled entry of the ordered pattern list.
#[derive(Clone)]
pub(crate) enum Rule {
    IgnoreVcs,
    Glob {
        source: String,
        /// Match against absolute paths instead of root-relative ones.
        absolute: bool,
        matchers: Vec<GlobMatcher>,
        negative: bool,
    },
    /// A pattern without glob metacharacters resolves to exactly one path.
    Literal { path: PathBuf, negative: bool },
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rule::IgnoreVcs => f.write_str("IgnoreVcs"),
            Rule::Glob { source, negative, .. } => f
                .debug_struct("Glob")
                .field("source", source)
                .field("negative", negative)
                .finish_non_exhaustive(),
            Rule::Literal { path, negative } => f
                .debug_struct("Literal")
                .field("path", path)
                .field("negative", negative)
                .finish(),
        }
    }
}

impl Rule {
    /// Evaluate this rule against a path. `rel` is the root-relative form, if
    /// the path lives under the root. Returns `Some(negative)` on a match.
    pub(crate) fn evaluate(&self, abs: &Path, rel: Option<&str>) -> Option<bool> {
        match self {
            Rule::IgnoreVcs => None,
            Rule::Literal { path, negative } => (path == abs).then_some(*negative),
            Rule::Glob {
                absolute,
                matchers,
                negative,
                ..
            } => {
                let candidate = if *absolute {
                    abs.to_string_lossy().replace('\\', "/")
                } else {
                    rel?.to_string()
                };
                matchers
                    .iter()
                    .any(|m| m.is_match(&candidate))
                    .then_some(*negative)
            }
        }
    }
}

/// Compile a single pattern, anchoring it to `root`.
pub(crate) fn compile(root: &Path, pattern: &str) -> Result<Rule> {
    if pattern == IGNORE_VCS {
        return Ok(Rule::IgnoreVcs);
    }

    let (negative, body) = match pattern.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, pattern),
    };

    if body.is_empty() {
        return Err(GuardError::ConfigError(format!(
            "empty pattern {pattern:?}"
        )));
    }

    if !has_glob_meta(body) {
        return Ok(Rule::Literal {
            path: absolutize(root, Path::new(body)),
            negative,
        });
    }

    let (text, absolute) = anchor(root, body);

    let mut matchers = vec![build_glob(pattern, &text)?];
    // `dir/**` also matches `dir` itself: `**` may stand for zero segments.
    if let Some(prefix) = text.strip_suffix("/**") {
        if !prefix.is_empty() {
            matchers.push(build_glob(pattern, prefix)?);
        }
    }

    Ok(Rule::Glob {
        source: pattern.to_string(),
        absolute,
        matchers,
        negative,
    })
}

/// Return the glob text relative to `root` when possible, else the absolute
/// glob text and `true`.
fn anchor(root: &Path, body: &str) -> (String, bool) {
    let slashed = body.replace('\\', "/");
    if Path::new(body).is_absolute() {
        let root_str = root.to_string_lossy().replace('\\', "/");
        if let Some(rest) = slashed.strip_prefix(&format!("{root_str}/")) {
            return (rest.to_string(), false);
        }
        return (slashed, true);
    }

    let mut text = slashed.as_str();
    while let Some(rest) = text.strip_prefix("./") {
        text = rest;
    }
    let text = text.trim_end_matches('/');
    if text.is_empty() {
        (".".to_string(), false)
    } else if text.contains("..") {
        // Patterns reaching above the root are matched as absolute globs.
        let joined = clean(&root.join(text));
        (joined.to_string_lossy().replace('\\', "/"), true)
    } else {
        (text.to_string(), false)
    }
}

fn build_glob(pattern: &str, text: &str) -> Result<GlobMatcher> {
    let glob = GlobBuilder::new(text)
        .literal_separator(true)
        .backslash_escape(!cfg!(windows))
        .build()
        .map_err(|source| GuardError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
    Ok(glob.compile_matcher())
}

fn has_glob_meta(s: &str) -> bool {
    s.contains(['*', '?', '[', '{'])
}
