use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use clap::ValueEnum;
use serde::Deserialize;

/// Kind of filesystem change carried by a [`GuardEvent`](crate::watch::GuardEvent).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    Create,
    Write,
    Remove,
    Rename,
    Chmod,
}

impl Op {
    /// Upper-case name substituted for the `{{op}}` placeholder.
    pub fn as_str(&self) -> &'static str {
        match self {
            Op::Create => "CREATE",
            Op::Write => "WRITE",
            Op::Remove => "REMOVE",
            Op::Rename => "RENAME",
            Op::Chmod => "CHMOD",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happens to a run that is still in flight when the guard is stopped.
///
/// - `LetFinish`: the watcher closes and the command keeps running until it
///   exits on its own (default).
/// - `Kill`: the process tree of the in-flight run is killed and the stop
///   waits for its completion signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopPolicy {
    #[default]
    LetFinish,
    Kill,
}

impl FromStr for StopPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().replace('-', "_").as_str() {
            "let_finish" => Ok(StopPolicy::LetFinish),
            "kill" => Ok(StopPolicy::Kill),
            other => Err(format!(
                "invalid stop_policy: {other} (expected \"let_finish\" or \"kill\")"
            )),
        }
    }
}

/// Which filesystem notification backend a guard uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum WatcherMode {
    /// OS-native notifications, falling back to polling when unavailable.
    #[default]
    Auto,
    Native,
    Poll,
}

/// Parse a simple duration string like `"300ms"`, `"3s"`, `"1m"`, `"2h"`.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty duration string".to_string());
    }

    let idx = s
        .chars()
        .position(|c| !c.is_ascii_digit())
        .ok_or_else(|| format!("duration '{s}' is missing a unit suffix"))?;

    let (num_part, unit_part) = s.split_at(idx);
    let value: u64 = num_part
        .parse()
        .map_err(|e| format!("invalid duration number '{}': {}", num_part, e))?;
    let unit = unit_part.trim().to_lowercase();

    match unit.as_str() {
        "ms" => Ok(Duration::from_millis(value)),
        "s" => Ok(Duration::from_secs(value)),
        "m" => Ok(Duration::from_secs(value * 60)),
        "h" => Ok(Duration::from_secs(value * 60 * 60)),
        _ => Err(format!(
            "unsupported duration unit '{}'; expected ms, s, m, or h",
            unit
        )),
    }
}
