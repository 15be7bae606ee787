// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{GuardFile, RawGuardFile};
use crate::errors::Result;

/// Load a guard file from a given path and return the raw `RawGuardFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawGuardFile> {
    let contents = fs::read_to_string(path.as_ref())?;
    parse_str(&contents)
}

/// Deserialize guard-file TOML held in memory.
pub fn parse_str(contents: &str) -> Result<RawGuardFile> {
    Ok(toml::from_str(contents)?)
}

/// Load a guard file from path and validate it:
///
/// - reads TOML and applies defaults (durations, patterns, stop policy),
/// - checks there is at least one `[[guard]]`,
/// - checks every guard has a program to run and a non-zero kill timeout.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<GuardFile> {
    let raw = load_from_path(&path)?;
    GuardFile::try_from(raw)
}

/// `Kitguard.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Kitguard.toml")
}

/// Directory that relative `dir` entries of the guard file at `path` are
/// resolved against.
///
/// - If the path has a non-empty parent (e.g. "configs/Kitguard.toml"),
///   that directory is used.
/// - A bare filename like "Kitguard.toml" resolves to the current working
///   directory.
pub fn config_base_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::errors::GuardError;
    use crate::types::{StopPolicy, WatcherMode};

    #[test]
    fn parses_guards_with_defaults() {
        let raw = parse_str(
            r#"
            [[guard]]
            cmd = ["cargo", "test"]

            [[guard]]
            cmd = ["./serve", "{{path}}"]
            patterns = ["web/**", "!web/tmp/**"]
            dir = "app"
            prefix = "web |@cyan"
            debounce = "1s"
            poll_interval = "50ms"
            watcher = "poll"
            stop_policy = "kill"
            kill_timeout = "2s"
            env = { RUST_LOG = "debug" }
            "#,
        )
        .unwrap();
        let file = GuardFile::try_from(raw).unwrap();
        let [first, second] = file.guards() else {
            panic!("expected two guards");
        };

        assert!(first.patterns.is_empty());
        assert_eq!(first.debounce, Duration::from_millis(300));
        assert_eq!(first.kill_timeout, Duration::from_secs(5));
        assert_eq!(first.stop_policy, StopPolicy::LetFinish);
        assert_eq!(first.watcher, WatcherMode::Auto);

        assert_eq!(second.debounce, Duration::from_secs(1));
        assert_eq!(second.poll_interval, Duration::from_millis(50));
        assert_eq!(second.watcher, WatcherMode::Poll);
        assert_eq!(second.stop_policy, StopPolicy::Kill);

        let cfg = second.guard_config(Path::new("/base"));
        assert_eq!(cfg.dir, PathBuf::from("/base/app"));
        assert_eq!(cfg.env, vec![("RUST_LOG".to_string(), "debug".to_string())]);
    }

    #[test]
    fn rejects_invalid_files() {
        let cases = [
            "",
            "[[guard]]\ncmd = []",
            "[[guard]]\ncmd = [\"\"]",
            "[[guard]]\ncmd = [\"x\"]\nkill_timeout = \"0s\"",
        ];
        for toml in cases {
            let raw = parse_str(toml).unwrap();
            let err = GuardFile::try_from(raw).unwrap_err();
            assert!(matches!(err, GuardError::ConfigError(_)), "{toml:?}: {err:?}");
        }
    }

    #[test]
    fn bad_durations_and_unknown_fields_fail_to_parse() {
        assert!(matches!(
            parse_str("[[guard]]\ncmd = [\"x\"]\ndebounce = \"soon\""),
            Err(GuardError::TomlError(_))
        ));
        assert!(matches!(
            parse_str("[[guard]]\ncmd = [\"x\"]\nwatch = []"),
            Err(GuardError::TomlError(_))
        ));
    }

    #[test]
    fn loads_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("Kitguard.toml");
        fs::write(&path, "[[guard]]\ncmd = [\"make\"]\n").unwrap();
        let file = load_and_validate(&path).unwrap();
        assert_eq!(file.guards()[0].cmd, ["make"]);
        assert_eq!(config_base_dir(&path), dir.path());
    }
}
