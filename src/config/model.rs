// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Deserializer};

use crate::guard::GuardConfig;
use crate::types::{parse_duration, StopPolicy, WatcherMode};

/// A guard file as read from TOML, before validation.
///
/// ```toml
/// [[guard]]
/// cmd = ["cargo", "test"]
/// patterns = ["src/**/*.rs", "!g"]
/// prefix = "test |@green"
/// debounce = "500ms"
///
/// [[guard]]
/// cmd = ["npm", "run", "dev"]
/// dir = "web"
/// stop_policy = "kill"
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RawGuardFile {
    #[serde(default)]
    pub guard: Vec<GuardSpec>,
}

/// Validated guard file. Construct via `TryFrom<RawGuardFile>`.
#[derive(Debug, Clone)]
pub struct GuardFile {
    guards: Vec<GuardSpec>,
}

impl GuardFile {
    pub(crate) fn new_unchecked(guards: Vec<GuardSpec>) -> Self {
        Self { guards }
    }

    pub fn guards(&self) -> &[GuardSpec] {
        &self.guards
    }

    pub fn into_guards(self) -> Vec<GuardSpec> {
        self.guards
    }
}

/// One `[[guard]]` table.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GuardSpec {
    /// Program and arguments; may contain `{{path}}`, `{{op}}`, `{{file}}`.
    pub cmd: Vec<String>,

    /// Ordered patterns; empty means `["**", "!g"]`.
    #[serde(default)]
    pub patterns: Vec<String>,

    #[serde(default = "default_dir")]
    pub dir: PathBuf,

    /// `"name |@color"`; derived from the program name when absent.
    #[serde(default)]
    pub prefix: Option<String>,

    #[serde(default = "default_interval", deserialize_with = "duration")]
    pub poll_interval: Duration,

    #[serde(default = "default_interval", deserialize_with = "duration")]
    pub debounce: Duration,

    #[serde(default)]
    pub no_init_run: bool,

    #[serde(default)]
    pub clear_screen: bool,

    #[serde(default)]
    pub raw: bool,

    #[serde(default)]
    pub watcher: WatcherMode,

    #[serde(default)]
    pub stop_policy: StopPolicy,

    #[serde(default = "default_kill_timeout", deserialize_with = "duration")]
    pub kill_timeout: Duration,

    #[serde(default)]
    pub env: BTreeMap<String, String>,

    #[serde(default)]
    pub follow_links: bool,
}

impl GuardSpec {
    /// Runtime configuration for this guard. Relative `dir`s are resolved
    /// against `base` (the directory of the guard file).
    pub fn guard_config(&self, base: &std::path::Path) -> GuardConfig {
        GuardConfig {
            dir: if self.dir.is_absolute() {
                self.dir.clone()
            } else {
                base.join(&self.dir)
            },
            prefix: self.prefix.clone(),
            poll_interval: self.poll_interval,
            debounce: self.debounce,
            no_init_run: self.no_init_run,
            clear_screen: self.clear_screen,
            raw: self.raw,
            watcher: self.watcher,
            stop_policy: self.stop_policy,
            kill_timeout: self.kill_timeout,
            env: self.env.clone().into_iter().collect(),
            follow_links: self.follow_links,
        }
    }
}

fn default_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_interval() -> Duration {
    Duration::from_millis(300)
}

fn default_kill_timeout() -> Duration {
    Duration::from_secs(5)
}

fn duration<'de, D>(deserializer: D) -> Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let s = String::deserialize(deserializer)?;
    parse_duration(&s).map_err(serde::de::Error::custom)
}
