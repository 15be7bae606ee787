// src/matcher/vcs.rs

//! Git ignore rules, loaded lazily per directory.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Command;

use ignore::gitignore::{Gitignore, GitignoreBuilder};
use regex::Regex;
use tracing::{debug, warn};

use crate::errors::{GuardError, Result};

/// Ignore rules for the repository that contains the watch root.
///
/// `per_dir` grows while the tree is walked and events arrive; it is mutated
/// in place, so a `VcsRules` must only be used from one task at a time.
#[derive(Debug)]
pub(crate) struct VcsRules {
    repo_root: PathBuf,
    submodules: Vec<PathBuf>,
    global: Option<Gitignore>,
    per_dir: HashMap<PathBuf, Option<Gitignore>>,
}

impl VcsRules {
    /// Locate the repository containing `root` and load the global rules.
    ///
    /// Fails when `git` cannot be run or `root` is not inside a repository.
    pub(crate) fn discover(root: &Path) -> Result<Self> {
        let top = git(root, &["rev-parse", "--show-toplevel"])?;
        let repo_root = PathBuf::from(top.trim());
        let repo_root = repo_root.canonicalize().unwrap_or(repo_root);

        let submodules = list_submodules(&repo_root);
        let global = load_global(&repo_root);

        debug!(repo_root = ?repo_root, submodules = submodules.len(), "loaded vcs rules");

        Ok(Self {
            repo_root,
            submodules,
            global,
            per_dir: HashMap::new(),
        })
    }

    /// `.git` directories and submodule roots are always excluded.
    pub(crate) fn is_vcs_internal(&self, path: &Path, is_dir: bool) -> bool {
        if !is_dir {
            return false;
        }
        if path.file_name().is_some_and(|name| name == ".git") {
            return true;
        }
        self.submodules.iter().any(|sub| sub == path)
    }

    /// Whether the ignore files between `path` and the repository root
    /// exclude it. The nearest ignore file that has an opinion wins.
    pub(crate) fn is_ignored(&mut self, path: &Path, is_dir: bool) -> bool {
        if path == self.repo_root || !path.starts_with(&self.repo_root) {
            return false;
        }
        let Some(parent) = path.parent() else {
            return false;
        };

        let mut dirs: Vec<PathBuf> = Vec::new();
        for dir in parent.ancestors() {
            dirs.push(dir.to_path_buf());
            if dir == self.repo_root {
                break;
            }
        }

        for dir in dirs {
            let rules = self
                .per_dir
                .entry(dir.clone())
                .or_insert_with(|| load_dir_rules(&dir, &self.repo_root));
            if let Some(gi) = rules {
                let m = gi.matched_path_or_any_parents(path, is_dir);
                if m.is_ignore() {
                    return true;
                }
                if m.is_whitelist() {
                    return false;
                }
            }
        }

        self.global
            .as_ref()
            .is_some_and(|gi| gi.matched_path_or_any_parents(path, is_dir).is_ignore())
    }
}

/// Run a git subcommand in `dir` and return its stdout.
fn git(dir: &Path, args: &[&str]) -> Result<String> {
    let output = Command::new("git")
        .args(args)
        .current_dir(dir)
        .output()
        .map_err(|e| GuardError::Vcs(format!("cannot run `git {}`: {e}", args.join(" "))))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(GuardError::Vcs(format!(
            "`git {}` failed in {:?}: {}",
            args.join(" "),
            dir,
            stderr.trim()
        )));
    }

    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

fn list_submodules(repo_root: &Path) -> Vec<PathBuf> {
    let out = match git(repo_root, &["submodule", "status"]) {
        Ok(out) => out,
        Err(err) => {
            debug!(error = %err, "no submodule listing");
            return Vec::new();
        }
    };
    parse_submodule_status(&out)
        .into_iter()
        .map(|rel| repo_root.join(rel))
        .collect()
}

/// Extract the paths from `git submodule status` output, e.g.
/// ` 1a2b3c4 vendor/lib (v1.0)` or `-1a2b3c4 vendor/other`.
pub(crate) fn parse_submodule_status(out: &str) -> Vec<String> {
    let Ok(re) = Regex::new(r"^[ +\-U]?[0-9a-f]+ (.+?)(?: \(.*\))?$") else {
        return Vec::new();
    };
    out.lines()
        .filter_map(|line| re.captures(line))
        .map(|caps| caps[1].to_string())
        .collect()
}

fn load_dir_rules(dir: &Path, repo_root: &Path) -> Option<Gitignore> {
    let mut builder = GitignoreBuilder::new(dir);
    let mut found = false;

    let mut files = vec![dir.join(".gitignore")];
    if dir == repo_root {
        files.push(repo_root.join(".git").join("info").join("exclude"));
    }

    for file in files.iter().filter(|f| f.is_file()) {
        found = true;
        if let Some(err) = builder.add(file) {
            warn!(file = ?file, error = %err, "problem reading ignore file");
        }
    }

    if !found {
        return None;
    }

    match builder.build() {
        Ok(gi) => Some(gi),
        Err(err) => {
            warn!(dir = ?dir, error = %err, "ignoring unparsable ignore rules");
            None
        }
    }
}

/// Global excludes: `core.excludesFile` (or git's XDG default) plus
/// `~/.gitignore_global`.
fn load_global(repo_root: &Path) -> Option<Gitignore> {
    let mut candidates = Vec::new();

    match git(repo_root, &["config", "--path", "--get", "core.excludesFile"]) {
        Ok(out) if !out.trim().is_empty() => candidates.push(PathBuf::from(out.trim())),
        _ => {
            let xdg = std::env::var_os("XDG_CONFIG_HOME")
                .map(PathBuf::from)
                .filter(|p| p.is_absolute())
                .or_else(|| dirs::home_dir().map(|h| h.join(".config")));
            if let Some(base) = xdg {
                candidates.push(base.join("git").join("ignore"));
            }
        }
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".gitignore_global"));
    }

    let mut builder = GitignoreBuilder::new(repo_root);
    let mut found = false;
    for file in candidates.iter().filter(|f| f.is_file()) {
        found = true;
        if let Some(err) = builder.add(file) {
            warn!(file = ?file, error = %err, "problem reading global ignore file");
        }
    }
    if !found {
        return None;
    }
    builder.build().ok()
}
