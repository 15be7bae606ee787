// src/cli.rs

//! CLI argument parsing using `clap`.
//!
//! Several guards can share one command line, separated by `---`:
//!
//! ```text
//! kitguard -w 'src/**' -- cargo test --- -w 'web/**' -p 'web |@cyan' -- npm start
//! ```

use std::ffi::OsString;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, ValueEnum};

use crate::guard::GuardConfig;
use crate::types::{parse_duration, StopPolicy, WatcherMode};

/// Separator between guard invocations on one command line.
pub const GUARD_SEPARATOR: &str = "---";

/// Command-line arguments for one `kitguard` guard.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "kitguard",
    version,
    about = "Restart a command whenever files matching a pattern change.",
    long_about = None
)]
pub struct CliArgs {
    /// Pattern to watch (repeatable, evaluated in order, last match wins).
    ///
    /// Prefix with `!` to exclude; `!g` excludes what git ignores.
    /// Default: `**` and `!g`.
    #[arg(short = 'w', long = "watch", value_name = "PATTERN")]
    pub patterns: Vec<String>,

    /// Directory to watch and run the command in.
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub dir: PathBuf,

    /// Output prefix, optionally coloured: `"app |@green"`.
    #[arg(short, long, value_name = "PREFIX")]
    pub prefix: Option<String>,

    /// Do not run the command until the first change.
    #[arg(short = 'n', long)]
    pub no_init_run: bool,

    /// Polling interval when the polling watcher is used.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration, default_value = "300ms")]
    pub poll: Duration,

    /// Changes closer together than this restart the command once.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration, default_value = "300ms")]
    pub debounce: Duration,

    /// Clear the terminal before each run.
    #[arg(long)]
    pub clear_screen: bool,

    /// Run the command in a pseudo-terminal with the terminal in raw mode.
    #[arg(long)]
    pub raw: bool,

    /// File watching backend.
    #[arg(long, value_enum, value_name = "MODE", default_value = "auto")]
    pub watcher: WatcherMode,

    /// Grace period before a killed run is killed forcibly.
    #[arg(long, value_name = "DURATION", value_parser = parse_duration, default_value = "5s")]
    pub kill_timeout: Duration,

    /// Load `[[guard]]` tables from a TOML file instead of flags.
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `KITGUARD_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL")]
    pub log_level: Option<LogLevel>,

    /// Print the resolved guards and what they would watch, run nothing.
    #[arg(long)]
    pub dry_run: bool,

    /// Command to run, after `--`.
    #[arg(last = true, value_name = "CMD")]
    pub cmd: Vec<String>,
}

impl CliArgs {
    /// Runtime configuration for this invocation. Ctrl-C kills runs in
    /// flight, so the CLI always uses [`StopPolicy::Kill`].
    pub fn guard_config(&self) -> GuardConfig {
        GuardConfig {
            dir: self.dir.clone(),
            prefix: self.prefix.clone(),
            poll_interval: self.poll,
            debounce: self.debounce,
            no_init_run: self.no_init_run,
            clear_screen: self.clear_screen,
            raw: self.raw,
            watcher: self.watcher,
            stop_policy: StopPolicy::Kill,
            kill_timeout: self.kill_timeout,
            ..GuardConfig::default()
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Split `argv` (including the program name) at [`GUARD_SEPARATOR`] and
/// parse every group as its own invocation.
pub fn parse_invocations<I, T>(argv: I) -> Result<Vec<CliArgs>, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString>,
{
    let mut argv = argv.into_iter().map(Into::into);
    let program = argv.next().unwrap_or_else(|| OsString::from("kitguard"));

    let mut groups: Vec<Vec<OsString>> = vec![Vec::new()];
    for arg in argv {
        if arg == GUARD_SEPARATOR {
            groups.push(Vec::new());
        } else if let Some(group) = groups.last_mut() {
            group.push(arg);
        }
    }

    groups
        .into_iter()
        .map(|group| CliArgs::try_parse_from(std::iter::once(program.clone()).chain(group)))
        .collect()
}

/// Parse the process arguments, exiting with a usage message on error.
pub fn parse() -> Vec<CliArgs> {
    parse_invocations(std::env::args_os()).unwrap_or_else(|err| err.exit())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_flags_and_command() {
        let inv = parse_invocations([
            "kitguard", "-w", "src/**", "-w", "!src/gen/**", "-n", "--debounce", "1s", "--",
            "cargo", "test", "--", "--nocapture",
        ])
        .unwrap();
        assert_eq!(inv.len(), 1);
        let args = &inv[0];
        assert_eq!(args.patterns, ["src/**", "!src/gen/**"]);
        assert!(args.no_init_run);
        assert_eq!(args.debounce, Duration::from_secs(1));
        assert_eq!(args.poll, Duration::from_millis(300));
        assert_eq!(args.cmd, ["cargo", "test", "--", "--nocapture"]);

        let cfg = args.guard_config();
        assert_eq!(cfg.stop_policy, StopPolicy::Kill);
        assert_eq!(cfg.dir, PathBuf::from("."));
    }

    #[test]
    fn splits_multiple_guards() {
        let inv = parse_invocations([
            "kitguard", "-w", "a/**", "--", "make", "a", "---", "-d", "web", "--watcher", "poll",
            "--", "npm", "start",
        ])
        .unwrap();
        assert_eq!(inv.len(), 2);
        assert_eq!(inv[0].cmd, ["make", "a"]);
        assert_eq!(inv[1].dir, PathBuf::from("web"));
        assert_eq!(inv[1].watcher, WatcherMode::Poll);
        assert_eq!(inv[1].cmd, ["npm", "start"]);
    }

    #[test]
    fn rejects_bad_durations() {
        assert!(parse_invocations(["kitguard", "--poll", "fast", "--", "x"]).is_err());
    }
}
