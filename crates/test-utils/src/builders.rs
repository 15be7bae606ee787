#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

use kitguard::guard::GuardConfig;
use kitguard::types::{StopPolicy, WatcherMode};
use tempfile::TempDir;

/// Builder for `GuardConfig` with test-friendly defaults: polling watcher
/// with a short interval, no initial run, kill on stop.
pub struct GuardConfigBuilder {
    config: GuardConfig,
}

impl GuardConfigBuilder {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            config: GuardConfig {
                dir: dir.into(),
                prefix: Some("test |".to_string()),
                poll_interval: Duration::from_millis(50),
                debounce: Duration::from_millis(300),
                no_init_run: true,
                watcher: WatcherMode::Poll,
                stop_policy: StopPolicy::Kill,
                kill_timeout: Duration::from_secs(2),
                ..GuardConfig::default()
            },
        }
    }

    pub fn debounce(mut self, d: Duration) -> Self {
        self.config.debounce = d;
        self
    }

    pub fn poll_interval(mut self, d: Duration) -> Self {
        self.config.poll_interval = d;
        self
    }

    pub fn init_run(mut self, val: bool) -> Self {
        self.config.no_init_run = !val;
        self
    }

    pub fn watcher(mut self, mode: WatcherMode) -> Self {
        self.config.watcher = mode;
        self
    }

    pub fn stop_policy(mut self, policy: StopPolicy) -> Self {
        self.config.stop_policy = policy;
        self
    }

    pub fn kill_timeout(mut self, d: Duration) -> Self {
        self.config.kill_timeout = d;
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.config.env.push((key.to_string(), value.to_string()));
        self
    }

    pub fn build(self) -> GuardConfig {
        self.config
    }
}

/// Temporary directory tree for filesystem tests.
pub struct TempTree {
    dir: TempDir,
}

impl TempTree {
    pub fn new() -> Self {
        Self {
            dir: tempfile::tempdir().expect("failed to create temp dir"),
        }
    }

    /// Canonical root (macOS temp dirs live behind a symlink).
    pub fn root(&self) -> PathBuf {
        self.dir
            .path()
            .canonicalize()
            .expect("failed to canonicalize temp dir")
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.root().join(rel)
    }

    /// Write `contents` to `rel`, creating parent directories.
    pub fn file(&self, rel: &str, contents: &str) -> PathBuf {
        let path = self.path(rel);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("failed to create parent dirs");
        }
        fs::write(&path, contents).expect("failed to write file");
        path
    }

    pub fn dir(&self, rel: &str) -> PathBuf {
        let path = self.path(rel);
        fs::create_dir_all(&path).expect("failed to create dir");
        path
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.path(rel).exists()
    }

    /// `git init` the root. Returns `false` when git is not installed, so
    /// callers can skip VCS-dependent assertions.
    pub fn git_init(&self) -> bool {
        self.git(&["init", "--quiet"])
    }

    /// Run `git <args>` in the root, quietly. `false` if git is missing or
    /// the command failed.
    pub fn git(&self, args: &[&str]) -> bool {
        Command::new("git")
            .args(args)
            .current_dir(self.root())
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Whether the root already lives inside some git checkout.
    pub fn inside_git_checkout(&self) -> bool {
        Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(self.root())
            .output()
            .map(|o| o.status.success())
            .unwrap_or(false)
    }

    /// Root-relative paths with forward slashes, sorted.
    pub fn relative_all(&self, paths: &[PathBuf]) -> Vec<String> {
        let root = self.root();
        let mut out: Vec<String> = paths
            .iter()
            .map(|p| relative(&root, p))
            .collect();
        out.sort();
        out
    }
}

impl Default for TempTree {
    fn default() -> Self {
        Self::new()
    }
}

fn relative(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}
