// src/watch/path_utils.rs

//! Path helpers shared by the matcher, the walker and the guard session.

use std::path::{Component, Path, PathBuf};

/// Convert a path into a string relative to `root`, with forward slashes.
///
/// - First we try a direct `strip_prefix(root)`.
/// - If that fails (e.g. due to symlinks or different absolute prefixes),
///   we canonicalize both paths and try again.
///
/// The root itself is reported as `"."`. Returns `None` if the path cannot be
/// related to `root`.
pub fn relative_str(root: &Path, path: &Path) -> Option<String> {
    if let Ok(rel) = path.strip_prefix(root) {
        return Some(slash_str(rel));
    }

    // macOS reports /private/var/... for /var/... and similar aliases.
    if let (Ok(root_canon), Ok(path_canon)) = (root.canonicalize(), path.canonicalize()) {
        if let Ok(rel) = path_canon.strip_prefix(&root_canon) {
            return Some(slash_str(rel));
        }
    }

    None
}

/// Like [`relative_str`], but paths outside `root` are expressed with `..`
/// steps instead of being rejected. Falls back to the path itself when the
/// two share no prefix at all (different drives).
pub fn relative_or_parent(root: &Path, path: &Path) -> String {
    if let Some(rel) = relative_str(root, path) {
        return rel;
    }

    let root = clean(root);
    let path = clean(path);
    let root_parts: Vec<Component<'_>> = root.components().collect();
    let path_parts: Vec<Component<'_>> = path.components().collect();
    let common = root_parts
        .iter()
        .zip(&path_parts)
        .take_while(|(a, b)| a == b)
        .count();
    if common == 0 {
        return slash_str(&path);
    }

    let mut rel = PathBuf::new();
    for _ in common..root_parts.len() {
        rel.push("..");
    }
    for part in &path_parts[common..] {
        rel.push(part.as_os_str());
    }
    slash_str(&rel)
}

/// Lexically normalise a path: drop `.` components and fold `..` into the
/// preceding component. Does not touch the filesystem.
pub fn clean(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    if out.as_os_str().is_empty() {
        out.push(".");
    }
    out
}

/// Absolute form of `path`, resolved against `root` when relative.
pub fn absolutize(root: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        clean(path)
    } else {
        clean(&root.join(path))
    }
}

fn slash_str(rel: &Path) -> String {
    let s = rel.to_string_lossy().replace('\\', "/");
    if s.is_empty() { ".".to_string() } else { s }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relative_str_uses_forward_slashes_and_dot_for_root() {
        let root = Path::new("/work/app");
        assert_eq!(relative_str(root, Path::new("/work/app/src/main.rs")).as_deref(), Some("src/main.rs"));
        assert_eq!(relative_str(root, root).as_deref(), Some("."));
        assert_eq!(relative_str(root, Path::new("/elsewhere/x")), None);
    }

    #[test]
    fn relative_or_parent_steps_out_of_the_root() {
        let root = Path::new("/work/app");
        assert_eq!(relative_or_parent(root, Path::new("/work/app/src/a.rs")), "src/a.rs");
        assert_eq!(relative_or_parent(root, Path::new("/work/shared.toml")), "../shared.toml");
        assert_eq!(relative_or_parent(root, Path::new("/etc/x/y.conf")), "../../etc/x/y.conf");
    }

    #[test]
    fn clean_folds_dots() {
        assert_eq!(clean(Path::new("/a/./b/../c")), PathBuf::from("/a/c"));
        assert_eq!(clean(Path::new("./")), PathBuf::from("."));
        assert_eq!(clean(Path::new("../x")), PathBuf::from("../x"));
    }
}
