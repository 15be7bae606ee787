// src/walk/mod.rs

//! Depth-first traversal of a matcher's root.
//!
//! [`Walker`] is a lazy iterator over matching entries: directories that match
//! negatively are not descended into. It is finite and cannot be restarted;
//! build a new one for the next pass. [`Walker::post_order`] materialises the
//! walk with every directory placed after its children, which is the order
//! bottom-up deletion needs.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::WalkDir;

use crate::errors::Result;
use crate::matcher::Matcher;

/// One matching entry produced by a walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkEntry {
    pub path: PathBuf,
    pub is_dir: bool,
    /// 0 for the directory the walk started from.
    pub depth: usize,
    /// False only for directories yielded because of
    /// [`WalkOptions::all_dirs`].
    pub matched: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct WalkOptions {
    /// Follow symbolic links (off by default; cyclic links are reported as
    /// errors when on).
    pub follow_links: bool,
    /// Visit siblings in file-name order instead of directory order.
    pub sorted: bool,
    /// Also yield directories that were descended into without matching.
    pub all_dirs: bool,
}

/// Lazy walk over the entries of `matcher.root()` that match.
pub struct Walker<'m> {
    matcher: &'m mut Matcher,
    inner: walkdir::IntoIter,
    all_dirs: bool,
}

impl<'m> Walker<'m> {
    pub fn new(matcher: &'m mut Matcher, opts: WalkOptions) -> Self {
        let root = matcher.root().to_path_buf();
        Self::under(matcher, &root, opts)
    }

    /// Walk only the subtree at `start` (absolute, below the matcher root).
    pub fn under(matcher: &'m mut Matcher, start: &Path, opts: WalkOptions) -> Self {
        let mut walk = WalkDir::new(start).follow_links(opts.follow_links);
        if opts.sorted {
            walk = walk.sort_by_file_name();
        }
        Self {
            matcher,
            inner: walk.into_iter(),
            all_dirs: opts.all_dirs,
        }
    }

    /// Drain the walk, ordering every directory after all of its children.
    pub fn post_order(self) -> Result<Vec<WalkEntry>> {
        let mut entries = self.collect::<Result<Vec<_>>>()?;
        entries.reverse();
        Ok(entries)
    }

    /// Matching directories only, deepest first.
    pub fn bottom_up_dirs(self) -> Result<Vec<WalkEntry>> {
        let mut dirs = self.post_order()?;
        dirs.retain(|e| e.is_dir);
        Ok(dirs)
    }
}

impl Iterator for Walker<'_> {
    type Item = Result<WalkEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let entry = match self.inner.next()? {
                Ok(entry) => entry,
                Err(err) => return Some(Err(err.into())),
            };

            let is_dir = entry.file_type().is_dir();
            let depth = entry.depth();
            let result = match self.matcher.is_match(entry.path(), is_dir) {
                Ok(result) => result,
                Err(err) => return Some(Err(err)),
            };

            if result.prunes(is_dir) {
                self.inner.skip_current_dir();
            }

            if result.matched || (self.all_dirs && is_dir && !result.negative) {
                return Some(Ok(WalkEntry {
                    path: entry.into_path(),
                    is_dir,
                    depth,
                    matched: result.matched,
                }));
            }
        }
    }
}

/// Paths under `dir` (excluding `dir` itself) matched by `patterns`.
pub fn list<S: AsRef<str>>(dir: impl AsRef<Path>, patterns: &[S]) -> Result<Vec<PathBuf>> {
    let mut matcher = Matcher::new(dir, patterns)?;
    Walker::new(&mut matcher, WalkOptions::default())
        .filter_map(|entry| match entry {
            Ok(e) if e.depth == 0 => None,
            Ok(e) => Some(Ok(e.path)),
            Err(err) => Some(Err(err)),
        })
        .collect()
}

/// Delete every file under `dir` matched by `patterns`, then every matched
/// directory left empty, deepest first. `dir` itself is never removed.
///
/// Returns the number of removed entries.
pub fn remove_matching<S: AsRef<str>>(dir: impl AsRef<Path>, patterns: &[S]) -> Result<usize> {
    let mut matcher = Matcher::new(dir, patterns)?;
    let root = matcher.root().to_path_buf();
    let entries = Walker::new(&mut matcher, WalkOptions::default()).post_order()?;

    let mut removed = 0;
    for entry in entries.iter().filter(|e| !e.is_dir) {
        fs::remove_file(&entry.path)?;
        debug!(path = ?entry.path, "removed file");
        removed += 1;
    }
    for entry in entries.iter().filter(|e| e.is_dir && e.path != root) {
        if fs::read_dir(&entry.path)?.next().is_none() {
            fs::remove_dir(&entry.path)?;
            debug!(path = ?entry.path, "removed directory");
            removed += 1;
        }
    }
    Ok(removed)
}
